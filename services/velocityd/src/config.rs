use std::{fs, net::SocketAddr, path::Path};

use anyhow::bail;
use clap::{ArgAction, Parser};
use ingest::ConsistencyMode;
use ingest_ipc::DEFAULT_SOCKET_PATH;
use storage::{DEFAULT_SIDE_TABLE_BUCKET, DEFAULT_SIDE_TABLE_KEY, DEFAULT_STATE_BUCKET};
use velocity::{Capabilities, ZeroIntervalPolicy};

const MEMORY_PREFIX: &str = "sqlite::memory:";
const URL_PREFIX: &str = "sqlite://";

#[derive(Parser, Debug)]
#[command(name = "velocityd", about = "Derives device velocity from positional telemetry")]
pub struct Args {
    #[arg(long, env = "SQLITE_PATH", default_value = "sqlite://velocity.db?mode=rwc")]
    pub sqlite_path: String,

    #[arg(long, env = "INGEST_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    pub socket: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9109")]
    pub metrics_addr: SocketAddr,

    /// Accept and echo longitude/latitude.
    #[arg(long, env = "GEO_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub geo: bool,

    /// Mirror measured velocity into the CSV flowrate table.
    #[arg(long, env = "SIDE_TABLE_ENABLED", default_value_t = false, action = ArgAction::Set)]
    pub side_table: bool,

    /// `null` or `clamp`.
    #[arg(long, env = "ZERO_INTERVAL_POLICY", default_value = "null")]
    pub zero_interval: ZeroIntervalPolicy,

    /// `last-writer-wins` or `per-device`.
    #[arg(long, env = "CONSISTENCY_MODE", default_value = "last-writer-wins")]
    pub consistency: ConsistencyMode,

    #[arg(long, env = "STATE_BUCKET", default_value = DEFAULT_STATE_BUCKET)]
    pub state_bucket: String,

    #[arg(long, env = "SIDE_TABLE_BUCKET", default_value = DEFAULT_SIDE_TABLE_BUCKET)]
    pub side_table_bucket: String,

    #[arg(long, env = "SIDE_TABLE_KEY", default_value = DEFAULT_SIDE_TABLE_KEY)]
    pub side_table_key: String,
}

impl Args {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            geo: self.geo,
            side_table: self.side_table,
        }
    }
}

pub fn validate_sqlite_path(path: &str) -> anyhow::Result<()> {
    if path.starts_with(MEMORY_PREFIX) {
        return Ok(());
    }

    if !path.starts_with(URL_PREFIX) {
        bail!("sqlite path must start with `sqlite://` or use `sqlite::memory:`");
    }

    if file_part(path).is_empty() {
        bail!("sqlite path is missing a filesystem component after `sqlite://`");
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(path: &str) -> anyhow::Result<()> {
    if path.starts_with(MEMORY_PREFIX) || !path.starts_with(URL_PREFIX) {
        return Ok(());
    }

    if let Some(parent) = Path::new(file_part(path)).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    Ok(())
}

fn file_part(path: &str) -> &str {
    let rest = path.trim_start_matches(URL_PREFIX);
    rest.split_once('?').map(|(file, _)| file).unwrap_or(rest)
}
