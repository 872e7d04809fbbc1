use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use velocity::SideTable;

use crate::blob::BlobStore;

pub const DEFAULT_SIDE_TABLE_BUCKET: &str = "drain";
pub const DEFAULT_SIDE_TABLE_KEY: &str = "coordinates.csv";
/// Zero-based index of the `flowrate` column; column 0 holds the device id.
pub const FLOWRATE_COLUMN: usize = 3;

const CSV_CONTENT_TYPE: &str = "text/csv";

pub struct CsvFlowrateTable<B: BlobStore> {
    blobs: Arc<B>,
    bucket: String,
    key: String,
}

impl<B: BlobStore> CsvFlowrateTable<B> {
    pub fn new(blobs: Arc<B>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            blobs,
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl<B: BlobStore + 'static> SideTable for CsvFlowrateTable<B> {
    async fn update_flowrate(&self, device_id: &str, total_velocity: f64) -> Result<()> {
        let content = self
            .blobs
            .get_object(&self.bucket, &self.key)
            .await?
            .ok_or_else(|| anyhow!("side table {}/{} does not exist", self.bucket, self.key))?;

        let (updated, matched) = rewrite_flowrate(&content, device_id, total_velocity)?;
        debug!(device_id = %device_id, rows = matched, "flowrate rows updated");

        self.blobs
            .put_object(&self.bucket, &self.key, updated, Some(CSV_CONTENT_TYPE))
            .await
    }
}

/// Set the flowrate cell of every row keyed by `device_id`, padding short
/// rows. Returns the new document and the number of rows changed.
pub(crate) fn rewrite_flowrate(
    content: &[u8],
    device_id: &str,
    total_velocity: f64,
) -> Result<(Vec<u8>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content);
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(content.len()));

    let flowrate = format!("{total_velocity:?}");
    let mut matched = 0;
    for record in reader.records() {
        let record = record?;
        if record.get(0) != Some(device_id) {
            writer.write_record(&record)?;
            continue;
        }
        let mut row: Vec<&str> = record.iter().collect();
        if row.len() <= FLOWRATE_COLUMN {
            row.resize(FLOWRATE_COLUMN + 1, "");
        }
        row[FLOWRATE_COLUMN] = &flowrate;
        writer.write_record(&row)?;
        matched += 1;
    }

    let body = writer.into_inner().map_err(|err| anyhow!(err.to_string()))?;
    Ok((body, matched))
}
