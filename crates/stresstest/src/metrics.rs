use crate::engine::accumulator::{Outcome, TransportErrorKind};
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Prometheus view of a single run. Each run owns its own registry.
pub struct RunMetrics {
    registry: Registry,
    in_flight: IntGauge,
    responses: IntCounterVec,
    transport_errors: IntCounterVec,
    pending_tasks: IntGauge,
    pending_high_water: AtomicUsize,
}

impl RunMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let in_flight = IntGauge::new(
            "stresstest_in_flight_requests",
            "Number of requests currently awaiting a response",
        )?;
        let responses = IntCounterVec::new(
            Opts::new(
                "stresstest_responses_total",
                "Total number of HTTP responses received, by status code",
            ),
            &["code"],
        )?;
        let transport_errors = IntCounterVec::new(
            Opts::new(
                "stresstest_transport_errors_total",
                "Total number of requests that failed before a response arrived",
            ),
            &["kind"],
        )?;

        let pending_tasks = IntGauge::new(
            "stresstest_pending_tasks",
            "Number of launched request tasks not yet reaped by the dispatcher",
        )?;

        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(pending_tasks.clone()))?;
        registry.register(Box::new(responses.clone()))?;
        registry.register(Box::new(transport_errors.clone()))?;

        Ok(Self {
            registry,
            in_flight,
            responses,
            transport_errors,
            pending_tasks,
            pending_high_water: AtomicUsize::new(0),
        })
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.get()
    }

    pub fn track_pending_tasks(&self, pending: usize) {
        self.pending_tasks.set(pending as i64);
        self.pending_high_water.fetch_max(pending, Ordering::Relaxed);
    }

    /// Largest number of unreaped tasks the dispatcher held at once.
    pub fn pending_tasks_high_water(&self) -> usize {
        self.pending_high_water.load(Ordering::Relaxed)
    }

    pub fn observe(&self, outcome: Outcome) {
        match outcome {
            Outcome::Status(code) => {
                let code = code.to_string();
                self.responses.with_label_values(&[code.as_str()]).inc()
            }
            Outcome::Transport(kind) => self
                .transport_errors
                .with_label_values(&[kind.as_str()])
                .inc(),
            Outcome::Aborted => self.transport_errors.with_label_values(&["aborted"]).inc(),
        }
    }

    pub fn transport_errors(&self, kind: TransportErrorKind) -> u64 {
        self.transport_errors.with_label_values(&[kind.as_str()]).get()
    }

    pub fn render(&self) -> String {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# Error encoding metrics: {}", e);
        }

        String::from_utf8(buffer).unwrap_or_else(|_| "# Error: Invalid UTF8".to_string())
    }
}

/// Keeps the in-flight gauge honest for the lifetime of one request.
pub struct InFlightGuard<'a> {
    gauge: &'a IntGauge,
}

impl<'a> InFlightGuard<'a> {
    pub fn new(metrics: &'a RunMetrics) -> Self {
        metrics.in_flight.inc();
        Self {
            gauge: &metrics.in_flight,
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

fn metrics_response(req: &Request<Body>, metrics: &RunMetrics) -> Response<Body> {
    match req.uri().path() {
        "/health" => Response::new(Body::from("OK")),
        "/metrics" => Response::new(Body::from(metrics.render())),
        _ => {
            let mut not_found = Response::new(Body::from("Not Found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            not_found
        }
    }
}

/// Binds the observability endpoint and serves it until `shutdown` fires.
/// Returns the bound address so callers can log or probe it.
pub fn spawn_metrics_server(
    addr: SocketAddr,
    metrics: Arc<RunMetrics>,
    shutdown: CancellationToken,
) -> Result<SocketAddr, hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let metrics = Arc::clone(&metrics);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let response = metrics_response(&req, &metrics);
                async move { Ok::<_, Infallible>(response) }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    let local_addr = server.local_addr();
    let graceful = server.with_graceful_shutdown(async move { shutdown.cancelled().await });

    info!(addr = %local_addr, "Observability server online");

    tokio::spawn(async move {
        if let Err(e) = graceful.await {
            error!(error = %e, "Observability server failed");
        }
    });

    Ok(local_addr)
}
