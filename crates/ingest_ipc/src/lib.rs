use anyhow::Result;
use ingest::{ConsistencyMode, IngestError, IngestPipeline};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};
use velocity::{Capabilities, VelocityResult, ZeroIntervalPolicy};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/velocityd.sock";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "payload")]
pub enum IngestRequest {
    Ingest(serde_json::Value),
    Health,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HealthStatus {
    pub run_id: String,
    pub capabilities: Capabilities,
    pub zero_interval: ZeroIntervalPolicy,
    pub consistency: ConsistencyMode,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Internal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum IngestResponse {
    Reading(VelocityResult),
    Healthy(HealthStatus),
    Error(ErrorBody),
}

impl IngestResponse {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::Error(ErrorBody {
            kind: ErrorKind::InvalidInput,
            message: message.into(),
        })
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Error(ErrorBody {
            kind: ErrorKind::Internal,
            message: message.into(),
        })
    }
}

pub async fn dispatch(
    pipeline: &IngestPipeline,
    health: &HealthStatus,
    req: IngestRequest,
) -> IngestResponse {
    match req {
        IngestRequest::Health => IngestResponse::Healthy(health.clone()),
        IngestRequest::Ingest(payload) => match pipeline.ingest(&payload).await {
            Ok(report) => IngestResponse::Reading(report.result),
            Err(IngestError::InvalidInput(problems)) => {
                IngestResponse::invalid_input(problems.to_string())
            }
            Err(err) => IngestResponse::internal(err.to_string()),
        },
    }
}

pub async fn run_server<F, Fut>(socket_path: &str, handler: F) -> Result<()>
where
    F: Fn(IngestRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = IngestResponse> + Send + 'static,
{
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    let handler = Arc::new(handler);
    info!(socket = socket_path, "ingest socket listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(stream, handler).await {
                warn!(error = ?err, "ingest connection error");
            }
        });
    }
}

async fn handle_stream<F, Fut>(stream: UnixStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(IngestRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = IngestResponse> + Send + 'static,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    let n = reader.read_line(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }
    let resp = match serde_json::from_str::<IngestRequest>(buf.trim()) {
        Ok(req) => handler(req).await,
        Err(err) => IngestResponse::invalid_input(format!("malformed request: {err}")),
    };
    let line = serde_json::to_string(&resp)? + "\n";
    write_half.write_all(line.as_bytes()).await?;
    Ok(())
}

pub async fn send_request(socket_path: &str, req: &IngestRequest) -> Result<IngestResponse> {
    let mut stream = UnixStream::connect(socket_path).await?;
    let line = serde_json::to_string(req)? + "\n";
    stream.write_all(line.as_bytes()).await?;
    let (read_half, _) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    let _ = reader.read_line(&mut buf).await?;
    let resp: IngestResponse = serde_json::from_str(buf.trim())?;
    Ok(resp)
}
