use anyhow::Result;
use async_trait::async_trait;

use crate::model::{LastState, TelemetryPoint};

/// `get` returns [`LastState::empty`] when nothing is stored; an `Err` means
/// the store itself could not be reached. `put` overwrites unconditionally.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, device_id: &str) -> Result<LastState>;

    async fn put(&self, device_id: &str, state: &LastState) -> Result<()>;
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write(&self, point: &TelemetryPoint) -> Result<()>;
}

#[async_trait]
pub trait SideTable: Send + Sync {
    async fn update_flowrate(&self, device_id: &str, total_velocity: f64) -> Result<()>;
}
