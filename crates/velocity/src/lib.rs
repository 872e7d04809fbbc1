pub mod collaborators;
pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod validate;

pub use collaborators::{MetricsSink, SideTable, StateStore};
pub use engine::{Outcome, OutcomeKind, VelocityEngine};
pub use error::{InvalidReading, VelocityError};
pub use memory::{InMemoryMetricsSink, InMemorySideTable, InMemoryStateStore};
pub use model::{
    format_display_time, Baseline, Capabilities, LastState, Reading, TelemetryPoint,
    VelocityResult, ZeroIntervalPolicy, DISPLAY_TIME_FORMAT,
};
pub use validate::parse_reading;
