use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use velocity::{LastState, StateStore};

use crate::blob::BlobStore;

pub const DEFAULT_STATE_BUCKET: &str = "last-readings";

const STATE_CONTENT_TYPE: &str = "application/json";

pub fn state_key(device_id: &str) -> String {
    format!("{device_id}_lastReadings.json")
}

pub struct BlobStateStore<B: BlobStore> {
    blobs: Arc<B>,
    bucket: String,
}

impl<B: BlobStore> BlobStateStore<B> {
    pub fn new(blobs: Arc<B>, bucket: impl Into<String>) -> Self {
        Self {
            blobs,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl<B: BlobStore + 'static> StateStore for BlobStateStore<B> {
    async fn get(&self, device_id: &str) -> Result<LastState> {
        let key = state_key(device_id);
        let Some(body) = self.blobs.get_object(&self.bucket, &key).await? else {
            debug!(device_id = %device_id, bucket = %self.bucket, "no stored state for device");
            return Ok(LastState::empty());
        };
        serde_json::from_slice(&body)
            .with_context(|| format!("corrupt state object {}/{}", self.bucket, key))
    }

    async fn put(&self, device_id: &str, state: &LastState) -> Result<()> {
        let body = serde_json::to_vec(state)?;
        self.blobs
            .put_object(
                &self.bucket,
                &state_key(device_id),
                body,
                Some(STATE_CONTENT_TYPE),
            )
            .await
    }
}
