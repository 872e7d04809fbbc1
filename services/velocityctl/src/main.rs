use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ingest_ipc::{send_request, IngestRequest, IngestResponse, DEFAULT_SOCKET_PATH};
use serde_json::{json, Map, Value};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "INGEST_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Health,
    /// Send one reading built from flags.
    Send {
        #[arg(long)]
        device_id: String,
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
        #[arg(long)]
        battery: f64,
        #[arg(long, allow_negative_numbers = true)]
        longitude: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        latitude: Option<f64>,
    },
    /// Send a raw JSON payload as-is.
    Raw { payload: String },
}

fn reading_payload(
    device_id: String,
    x: f64,
    y: f64,
    battery: f64,
    longitude: Option<f64>,
    latitude: Option<f64>,
) -> Value {
    let mut payload = Map::new();
    payload.insert("device_id".into(), json!(device_id));
    payload.insert("x_axis".into(), json!(x));
    payload.insert("y_axis".into(), json!(y));
    payload.insert("battery".into(), json!(battery));
    if let Some(longitude) = longitude {
        payload.insert("longitude".into(), json!(longitude));
    }
    if let Some(latitude) = latitude {
        payload.insert("latitude".into(), json!(latitude));
    }
    Value::Object(payload)
}

fn build_request(command: Command) -> Result<IngestRequest> {
    Ok(match command {
        Command::Health => IngestRequest::Health,
        Command::Send {
            device_id,
            x,
            y,
            battery,
            longitude,
            latitude,
        } => IngestRequest::Ingest(reading_payload(
            device_id, x, y, battery, longitude, latitude,
        )),
        Command::Raw { payload } => IngestRequest::Ingest(
            serde_json::from_str(&payload).context("payload is not valid JSON")?,
        ),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let req = build_request(cli.command)?;

    let resp = send_request(&cli.socket, &req).await?;
    println!("{}", serde_json::to_string(&resp)?);
    if let IngestResponse::Error(body) = resp {
        bail!("velocityd rejected the request: {}", body.message);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_builds_wire_payload() {
        let cli = Cli::parse_from([
            "velocityctl",
            "send",
            "--device-id",
            "d1",
            "--x",
            "-3",
            "--y",
            "4",
            "--battery",
            "90",
            "--latitude",
            "37.7",
        ]);
        match build_request(cli.command).unwrap() {
            IngestRequest::Ingest(payload) => assert_eq!(
                payload,
                json!({"device_id": "d1", "x_axis": -3.0, "y_axis": 4.0, "battery": 90.0, "latitude": 37.7})
            ),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn raw_rejects_bad_json() {
        let cli = Cli::parse_from(["velocityctl", "raw", "{not json"]);
        assert!(build_request(cli.command).is_err());
    }
}
