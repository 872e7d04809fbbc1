use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::collaborators::{MetricsSink, SideTable, StateStore};
use crate::model::{LastState, TelemetryPoint};

#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<String, LastState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, device_id: &str, state: LastState) {
        self.states.write().await.insert(device_id.to_string(), state);
    }

    pub async fn snapshot(&self, device_id: &str) -> Option<LastState> {
        self.states.read().await.get(device_id).copied()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, device_id: &str) -> Result<LastState> {
        let states = self.states.read().await;
        Ok(states.get(device_id).copied().unwrap_or_default())
    }

    async fn put(&self, device_id: &str, state: &LastState) -> Result<()> {
        let mut states = self.states.write().await;
        states.insert(device_id.to_string(), *state);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMetricsSink {
    points: Arc<RwLock<Vec<TelemetryPoint>>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn points(&self) -> Vec<TelemetryPoint> {
        self.points.read().await.clone()
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn write(&self, point: &TelemetryPoint) -> Result<()> {
        self.points.write().await.push(point.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySideTable {
    flowrates: Arc<RwLock<HashMap<String, f64>>>,
}

impl InMemorySideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn flowrate(&self, device_id: &str) -> Option<f64> {
        self.flowrates.read().await.get(device_id).copied()
    }
}

#[async_trait]
impl SideTable for InMemorySideTable {
    async fn update_flowrate(&self, device_id: &str, total_velocity: f64) -> Result<()> {
        self.flowrates
            .write()
            .await
            .insert(device_id.to_string(), total_velocity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_device_reads_as_sentinel() {
        let store = InMemoryStateStore::new();
        let state = store.get("unknown").await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn put_overwrites_previous_state() {
        let store = InMemoryStateStore::new();
        store.put("d1", &LastState::at(1.0, 1.0, 10)).await.unwrap();
        store.put("d1", &LastState::at(2.0, 3.0, 20)).await.unwrap();
        assert_eq!(store.get("d1").await.unwrap(), LastState::at(2.0, 3.0, 20));
    }
}
