use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Store;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()>;
}

#[async_trait]
impl BlobStore for Store {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let body = sqlx::query_scalar("SELECT body FROM blobs WHERE bucket = ?1 AND key = ?2")
            .bind(bucket)
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(body)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO blobs (bucket, key, body, content_type, updated_at_ms) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (bucket, key) DO UPDATE SET body = excluded.body, \
             content_type = excluded.content_type, updated_at_ms = excluded.updated_at_ms",
        )
        .bind(bucket)
        .bind(key)
        .bind(body)
        .bind(content_type)
        .bind(ts_ms)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    objects: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let objects = self.objects.read().await;
        Ok(objects.get(&(bucket.to_string(), key.to_string())).cloned())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<()> {
        let mut objects = self.objects.write().await;
        objects.insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }
}
