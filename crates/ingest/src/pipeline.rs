use metrics::IngestMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use velocity::{
    parse_reading, LastState, MetricsSink, OutcomeKind, Reading, SideTable, StateStore,
    VelocityEngine, VelocityResult,
};

use crate::clock::Clock;
use crate::error::{Collaborator, IngestError};
use crate::locks::DeviceLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsistencyMode {
    #[default]
    LastWriterWins,
    PerDevice,
}

impl FromStr for ConsistencyMode {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-writer-wins" => Ok(Self::LastWriterWins),
            "per-device" => Ok(Self::PerDevice),
            other => Err(IngestError::UnknownConsistencyMode(other.to_string())),
        }
    }
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastWriterWins => f.write_str("last-writer-wins"),
            Self::PerDevice => f.write_str("per-device"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    Done,
    Skipped,
    Failed(String),
}

impl SideEffect {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub result: VelocityResult,
    pub kind: OutcomeKind,
    pub state_read: SideEffect,
    pub state_write: SideEffect,
    pub point_write: SideEffect,
    pub side_table: SideEffect,
}

impl IngestReport {
    pub fn failed_collaborators(&self) -> Vec<Collaborator> {
        let mut failed = Vec::new();
        if self.state_read.is_failed() || self.state_write.is_failed() {
            failed.push(Collaborator::StateStore);
        }
        if self.point_write.is_failed() {
            failed.push(Collaborator::MetricsSink);
        }
        if self.side_table.is_failed() {
            failed.push(Collaborator::SideTable);
        }
        failed
    }
}

/// Collaborator failures are logged and counted but never fail the call:
/// the computed result is always returned and each side effect is attempted
/// regardless of the others.
pub struct IngestPipeline {
    engine: VelocityEngine,
    state_store: Arc<dyn StateStore>,
    sink: Arc<dyn MetricsSink>,
    side_table: Option<Arc<dyn SideTable>>,
    clock: Arc<dyn Clock>,
    metrics: IngestMetrics,
    consistency: ConsistencyMode,
    locks: DeviceLocks,
}

impl IngestPipeline {
    pub fn new(
        engine: VelocityEngine,
        state_store: Arc<dyn StateStore>,
        sink: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
        metrics: IngestMetrics,
    ) -> Self {
        Self {
            engine,
            state_store,
            sink,
            side_table: None,
            clock,
            metrics,
            consistency: ConsistencyMode::default(),
            locks: DeviceLocks::new(),
        }
    }

    pub fn with_side_table(mut self, side_table: Arc<dyn SideTable>) -> Self {
        self.side_table = Some(side_table);
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyMode) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn engine(&self) -> &VelocityEngine {
        &self.engine
    }

    pub fn consistency(&self) -> ConsistencyMode {
        self.consistency
    }

    pub async fn ingest(&self, payload: &serde_json::Value) -> Result<IngestReport, IngestError> {
        let reading = match parse_reading(payload, self.engine.capabilities()) {
            Ok(reading) => reading,
            Err(problems) => {
                self.metrics.observe_invalid_input();
                warn!(reason = %problems, "rejected reading");
                return Err(IngestError::InvalidInput(problems));
            }
        };
        Ok(self.ingest_reading(reading).await)
    }

    pub async fn ingest_reading(&self, reading: Reading) -> IngestReport {
        let _guard = match self.consistency {
            ConsistencyMode::PerDevice => Some(self.locks.acquire(&reading.device_id).await),
            ConsistencyMode::LastWriterWins => None,
        };
        let device_id = reading.device_id.as_str();
        let now = self.clock.now();

        let (previous, state_read) = match self.state_store.get(device_id).await {
            Ok(state) => (state, SideEffect::Done),
            Err(source) => {
                let failure = self.collaborator_failed(Collaborator::StateStore, device_id, source);
                (LastState::empty(), failure)
            }
        };

        let outcome = self.engine.process(&reading, &previous, now);
        self.metrics.observe_reading(outcome.kind.as_str());
        match (outcome.kind, outcome.result.total_velocity) {
            (OutcomeKind::ZeroInterval, velocity) => warn!(
                device_id = %device_id,
                policy = %self.engine.zero_interval(),
                velocity = ?velocity,
                "no time elapsed since previous reading"
            ),
            (OutcomeKind::Unmeasurable, _) => warn!(
                device_id = %device_id,
                "displacement too large for a finite velocity"
            ),
            (OutcomeKind::Initialized, _) => {
                debug!(device_id = %device_id, "initializing device state")
            }
            (OutcomeKind::Measured, _) => {}
        }
        if let Some(total_velocity) = outcome.result.total_velocity {
            self.metrics.observe_velocity(total_velocity);
        }

        let state_write = self
            .attempt(
                Collaborator::StateStore,
                device_id,
                self.state_store.put(device_id, &outcome.new_state),
            )
            .await;

        let point_write = self
            .attempt(
                Collaborator::MetricsSink,
                device_id,
                self.sink.write(&outcome.point),
            )
            .await;

        let side_table = match (self.side_table(), outcome.result.total_velocity) {
            (Some(table), Some(total_velocity)) => {
                self.attempt(
                    Collaborator::SideTable,
                    device_id,
                    table.update_flowrate(device_id, total_velocity),
                )
                .await
            }
            _ => SideEffect::Skipped,
        };

        info!(
            device_id = %device_id,
            outcome = outcome.kind.as_str(),
            total_velocity = ?outcome.result.total_velocity,
            "reading processed"
        );

        IngestReport {
            result: outcome.result,
            kind: outcome.kind,
            state_read,
            state_write,
            point_write,
            side_table,
        }
    }

    fn side_table(&self) -> Option<&Arc<dyn SideTable>> {
        if self.engine.capabilities().side_table {
            self.side_table.as_ref()
        } else {
            None
        }
    }

    async fn attempt<F>(&self, collaborator: Collaborator, device_id: &str, call: F) -> SideEffect
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        match call.await {
            Ok(()) => SideEffect::Done,
            Err(source) => self.collaborator_failed(collaborator, device_id, source),
        }
    }

    fn collaborator_failed(
        &self,
        collaborator: Collaborator,
        device_id: &str,
        source: anyhow::Error,
    ) -> SideEffect {
        self.metrics.observe_collaborator_failure(collaborator.as_str());
        let err = IngestError::CollaboratorUnavailable {
            collaborator,
            source,
        };
        warn!(device_id = %device_id, error = %err, "collaborator call failed");
        SideEffect::Failed(err.to_string())
    }
}
