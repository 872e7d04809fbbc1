use std::fmt;
use thiserror::Error;
use velocity::InvalidReading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    StateStore,
    MetricsSink,
    SideTable,
}

impl Collaborator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateStore => "state_store",
            Self::MetricsSink => "metrics_sink",
            Self::SideTable => "side_table",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidReading),

    #[error("{collaborator} unavailable: {source:#}")]
    CollaboratorUnavailable {
        collaborator: Collaborator,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown consistency mode `{0}` (expected `last-writer-wins` or `per-device`)")]
    UnknownConsistencyMode(String),
}
