use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle locks are dropped once the map grows past this many devices.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Clone, Default)]
pub struct DeviceLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, device_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn same_device_waits_for_release() {
        let locks = DeviceLocks::new();
        let guard = locks.acquire("d1").await;

        let blocked = timeout(Duration::from_millis(20), locks.acquire("d1")).await;
        assert!(blocked.is_err(), "second acquire should wait");

        drop(guard);
        let acquired = timeout(Duration::from_millis(200), locks.acquire("d1")).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn different_devices_do_not_contend() {
        let locks = DeviceLocks::new();
        let _d1 = locks.acquire("d1").await;
        let d2 = timeout(Duration::from_millis(200), locks.acquire("d2")).await;
        assert!(d2.is_ok());
        assert_eq!(locks.tracked().await, 2);
    }
}
