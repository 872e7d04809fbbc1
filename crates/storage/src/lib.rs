use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;
use velocity::{MetricsSink, TelemetryPoint};

mod blob;
mod side_table;
mod state_store;

pub use blob::{BlobStore, InMemoryBlobStore};
pub use side_table::{CsvFlowrateTable, DEFAULT_SIDE_TABLE_BUCKET, DEFAULT_SIDE_TABLE_KEY, FLOWRATE_COLUMN};
pub use state_store::{state_key, BlobStateStore, DEFAULT_STATE_BUCKET};

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");

pub const REQUIRED_TABLES: &[&str] = &["runs", "incidents", "blobs", "telemetry_points"];

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(path: &str) -> Result<Self> {
        // Every connection to `sqlite::memory:` is its own database.
        let max_connections = if path.starts_with("sqlite::memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(path)
            .await?;
        run_init_sql(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_run(&self, run_id: &str, git_sha: Option<&str>) -> Result<()> {
        let host = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT OR REPLACE INTO runs (run_id, started_at_ms, git_sha, host) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(git_sha)
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_incident(
        &self,
        run_id: &str,
        severity: &str,
        kind: &str,
        message: &str,
    ) -> Result<()> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO incidents (run_id, ts_ms, severity, kind, message) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(severity)
        .bind(kind)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn validate_required_tables(&self) -> Result<Vec<String>> {
        let present: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&self.pool)
                .await?;
        Ok(REQUIRED_TABLES
            .iter()
            .filter(|table| !present.iter().any(|name| name == *table))
            .map(|table| table.to_string())
            .collect())
    }

    pub async fn recent_points(&self, device_id: &str, limit: i64) -> Result<Vec<TelemetryPoint>> {
        let rows: Vec<PointRow> = sqlx::query_as(
            "SELECT device_id, ts_micros, x_axis, y_axis, total_velocity, battery, longitude, latitude \
             FROM telemetry_points WHERE device_id = ?1 ORDER BY ts_micros DESC, id DESC LIMIT ?2",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TelemetryPoint::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct PointRow {
    device_id: String,
    ts_micros: i64,
    x_axis: f64,
    y_axis: f64,
    total_velocity: Option<f64>,
    battery: f64,
    longitude: Option<f64>,
    latitude: Option<f64>,
}

impl From<PointRow> for TelemetryPoint {
    fn from(row: PointRow) -> Self {
        Self {
            device_id: row.device_id,
            timestamp_micros: row.ts_micros,
            x_axis: row.x_axis,
            y_axis: row.y_axis,
            total_velocity: row.total_velocity,
            battery: row.battery,
            longitude: row.longitude,
            latitude: row.latitude,
        }
    }
}

#[async_trait]
impl MetricsSink for Store {
    async fn write(&self, point: &TelemetryPoint) -> Result<()> {
        sqlx::query(
            "INSERT INTO telemetry_points \
             (device_id, ts_micros, x_axis, y_axis, total_velocity, battery, longitude, latitude) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&point.device_id)
        .bind(point.timestamp_micros)
        .bind(point.x_axis)
        .bind(point.y_axis)
        .bind(point.total_velocity)
        .bind(point.battery)
        .bind(point.longitude)
        .bind(point.latitude)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub async fn init_sqlite(path: &str) -> Result<Store> {
    let store = Store::connect(path).await?;
    info!(path = path, "sqlite initialized");
    Ok(store)
}

async fn run_init_sql(pool: &SqlitePool) -> Result<()> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}
