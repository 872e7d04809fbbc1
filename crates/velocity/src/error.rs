use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VelocityError {
    #[error("unknown zero interval policy `{0}` (expected `null` or `clamp`)")]
    UnknownZeroIntervalPolicy(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvalidReading {
    pub not_an_object: bool,
    pub missing: Vec<&'static str>,
    pub malformed: Vec<&'static str>,
}

impl InvalidReading {
    pub fn not_an_object() -> Self {
        Self {
            not_an_object: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.not_an_object && self.missing.is_empty() && self.malformed.is_empty()
    }
}

impl std::error::Error for InvalidReading {}

impl fmt::Display for InvalidReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.not_an_object {
            return f.write_str("payload must be a JSON object");
        }
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing required fields: {}", self.missing.join(", ")));
        }
        if !self.malformed.is_empty() {
            parts.push(format!("malformed fields: {}", self.malformed.join(", ")));
        }
        f.write_str(&parts.join("; "))
    }
}
