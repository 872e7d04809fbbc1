mod config;

use std::sync::Arc;

use clap::Parser;
use ingest::{IngestPipeline, SystemClock};
use ingest_ipc::{dispatch, run_server, HealthStatus};
use metrics::{IngestMetrics, MetricsHandle};
use storage::{init_sqlite, BlobStateStore, CsvFlowrateTable, Store};
use tokio::{signal, task};
use tracing::{info, warn, Level};
use uuid::Uuid;
use velocity::VelocityEngine;

use crate::config::{ensure_sqlite_parent_dir, validate_sqlite_path, Args};

fn log_startup(args: &Args, run_id: &str) {
    info!(path = %args.sqlite_path, "sqlite path configured");
    info!(socket = %args.socket, "ingest socket bind planned");
    info!(addr = %args.metrics_addr, "metrics bind planned");
    info!(
        geo = args.geo,
        side_table = args.side_table,
        zero_interval = %args.zero_interval,
        consistency = %args.consistency,
        "velocity engine configured"
    );
    info!(%run_id, "run initialized");
}

fn build_pipeline(args: &Args, store: Store, metrics: IngestMetrics) -> IngestPipeline {
    let blobs = Arc::new(store.clone());
    let engine = VelocityEngine::new(args.capabilities(), args.zero_interval);
    let state_store = BlobStateStore::new(blobs.clone(), args.state_bucket.clone());

    let pipeline = IngestPipeline::new(
        engine,
        Arc::new(state_store),
        Arc::new(store),
        Arc::new(SystemClock),
        metrics,
    )
    .with_consistency(args.consistency);

    if args.side_table {
        pipeline.with_side_table(Arc::new(CsvFlowrateTable::new(
            blobs,
            args.side_table_bucket.clone(),
            args.side_table_key.clone(),
        )))
    } else {
        pipeline
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    validate_sqlite_path(&args.sqlite_path)?;
    info!(
        sqlite = %args.sqlite_path,
        socket = %args.socket,
        "booting velocityd"
    );

    ensure_sqlite_parent_dir(&args.sqlite_path)?;

    let run_id = Uuid::new_v4().to_string();
    let store = init_sqlite(&args.sqlite_path).await?;
    store.insert_run(&run_id, option_env!("GIT_SHA")).await?;
    log_startup(&args, &run_id);

    let missing_tables = store.validate_required_tables().await?;
    if !missing_tables.is_empty() {
        warn!(tables = ?missing_tables, "sqlite missing required tables");
        if let Err(err) = store
            .log_incident(
                &run_id,
                "warning",
                "db_schema_missing",
                &format!(
                    "sqlite missing required tables: {}",
                    missing_tables.join(", ")
                ),
            )
            .await
        {
            warn!(error = ?err, "failed to log missing schema incident");
        }
    }

    let metrics = MetricsHandle::new();
    let ingest_metrics = metrics.ingest()?;
    let metrics_addr = args.metrics_addr;
    task::spawn(async move {
        if let Err(err) = metrics.serve(metrics_addr).await {
            tracing::error!(error = ?err, "metrics server error");
        }
    });

    let pipeline = Arc::new(build_pipeline(&args, store.clone(), ingest_metrics));
    let health = Arc::new(HealthStatus {
        run_id: run_id.clone(),
        capabilities: args.capabilities(),
        zero_interval: args.zero_interval,
        consistency: args.consistency,
    });

    info!(
        run_id = %run_id,
        sqlite = %args.sqlite_path,
        socket = %args.socket,
        metrics_addr = %args.metrics_addr,
        "ready"
    );
    if let Err(err) = store
        .log_incident(&run_id, "info", "ready", "velocityd booted and ready")
        .await
    {
        warn!(error = ?err, "failed to record ready incident");
    }

    let server = run_server(&args.socket, move |req| {
        let pipeline = Arc::clone(&pipeline);
        let health = Arc::clone(&health);
        async move { dispatch(&pipeline, &health, req).await }
    });

    tokio::select! {
        result = server => {
            if let Err(err) = &result {
                tracing::error!(error = ?err, "ingest server failed");
            }
            result
        }
        _ = signal::ctrl_c() => {
            info!(run_id = %run_id, "shutting down");
            let _ = std::fs::remove_file(&args.socket);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use storage::{state_key, BlobStore};
    use tracing_subscriber::fmt::MakeWriter;
    use velocity::OutcomeKind;

    #[derive(Clone)]
    struct VecWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for VecWriter {
        type Writer = VecWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn startup_logs_include_configuration() {
        let args = Args::parse_from([
            "velocityd",
            "--sqlite-path",
            "sqlite:///tmp/test.db",
            "--socket",
            "/tmp/test.sock",
            "--metrics-addr",
            "127.0.0.1:9000",
            "--zero-interval",
            "clamp",
        ]);
        let run_id = Uuid::nil().to_string();
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = VecWriter(buffer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_writer(writer)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            log_startup(&args, &run_id);
        });

        let output =
            String::from_utf8(buffer.lock().unwrap().clone()).expect("log output should be utf8");
        assert!(output.contains("sqlite path configured"));
        assert!(output.contains("ingest socket bind planned"));
        assert!(output.contains("metrics bind planned"));
        assert!(output.contains("velocity engine configured"));
        assert!(output.contains("clamp"));
        assert!(output.contains("run initialized"));
        assert!(output.contains(&args.sqlite_path));
        assert!(output.contains(&args.socket));
        assert!(output.contains(&args.metrics_addr.to_string()));
        assert!(output.contains(&run_id));
    }

    #[tokio::test]
    async fn pipeline_persists_through_sqlite_collaborators() {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("velocity.db").display());
        let args = Args::parse_from(["velocityd", "--sqlite-path", url.as_str(), "--side-table", "true"]);
        let store = init_sqlite(&args.sqlite_path).await.expect("sqlite");
        store
            .put_object(
                &args.side_table_bucket,
                &args.side_table_key,
                b"d1,-122.4,37.7,0.0\n".to_vec(),
                Some("text/csv"),
            )
            .await
            .expect("seed side table");

        let pipeline = build_pipeline(
            &args,
            store.clone(),
            IngestMetrics::detached().expect("metrics"),
        );
        let report = pipeline
            .ingest(&serde_json::json!({
                "x_axis": 1,
                "y_axis": 2,
                "device_id": "d1",
                "battery": 77
            }))
            .await
            .expect("reading should be accepted");

        assert_eq!(report.kind, OutcomeKind::Initialized);
        assert!(report.failed_collaborators().is_empty());

        let blob = store
            .get_object(&args.state_bucket, &state_key("d1"))
            .await
            .expect("blob read")
            .expect("state blob should exist");
        let state: serde_json::Value = serde_json::from_slice(&blob).expect("json state");
        assert_eq!(state["lastX"], 1.0);
        assert_eq!(state["lastY"], 2.0);

        let points = store.recent_points("d1", 5).await.expect("points");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].total_velocity, None);
    }
}
