use anyhow::Result;
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{info, warn};

const VELOCITY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 50.0, 100.0];

#[derive(Clone, Default)]
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ingest(&self) -> Result<IngestMetrics> {
        IngestMetrics::register(&self.registry)
    }

    pub fn render(&self) -> Result<String> {
        render(&self.registry)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let registry = self.registry.clone();
        let make_svc = make_service_fn(move |_| {
            let registry = registry.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let registry = registry.clone();
                    async move { Ok::<_, hyper::Error>(scrape(&registry)) }
                }))
            }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }
}

fn render(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

fn scrape(registry: &Registry) -> Response<Body> {
    match render(registry) {
        Ok(text) => {
            let mut response = Response::new(Body::from(text));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));
            response
        }
        Err(err) => {
            warn!(error = ?err, "failed to encode metrics");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

#[derive(Clone)]
pub struct IngestMetrics {
    readings: IntCounterVec,
    invalid_input: IntCounter,
    collaborator_failures: IntCounterVec,
    velocity: Histogram,
}

impl IngestMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let readings = IntCounterVec::new(
            Opts::new("velocity_readings_total", "Readings processed by outcome"),
            &["outcome"],
        )?;
        let invalid_input = IntCounter::new(
            "velocity_invalid_input_total",
            "Payloads rejected before processing",
        )?;
        let collaborator_failures = IntCounterVec::new(
            Opts::new(
                "velocity_collaborator_failures_total",
                "Failed calls to the state store, sink or side table",
            ),
            &["collaborator"],
        )?;
        let velocity = Histogram::with_opts(
            HistogramOpts::new("velocity_total_velocity", "Computed velocity magnitudes")
                .buckets(VELOCITY_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(readings.clone()))?;
        registry.register(Box::new(invalid_input.clone()))?;
        registry.register(Box::new(collaborator_failures.clone()))?;
        registry.register(Box::new(velocity.clone()))?;

        Ok(Self {
            readings,
            invalid_input,
            collaborator_failures,
            velocity,
        })
    }

    pub fn detached() -> Result<Self> {
        Self::register(&Registry::new())
    }

    pub fn observe_reading(&self, outcome: &str) {
        self.readings.with_label_values(&[outcome]).inc();
    }

    pub fn observe_invalid_input(&self) {
        self.invalid_input.inc();
    }

    pub fn observe_collaborator_failure(&self, collaborator: &str) {
        self.collaborator_failures
            .with_label_values(&[collaborator])
            .inc();
    }

    pub fn observe_velocity(&self, total_velocity: f64) {
        self.velocity.observe(total_velocity);
    }

    pub fn readings(&self, outcome: &str) -> u64 {
        self.readings.with_label_values(&[outcome]).get()
    }

    pub fn invalid_inputs(&self) -> u64 {
        self.invalid_input.get()
    }

    pub fn collaborator_failures(&self, collaborator: &str) -> u64 {
        self.collaborator_failures
            .with_label_values(&[collaborator])
            .get()
    }
}
