use crate::engine::accumulator::{Accumulator, Outcome, TransportErrorKind};
use crate::metrics::{InFlightGuard, RunMetrics};
use hyper::client::HttpConnector;
use hyper::{Body, Client, Uri};
use hyper_tls::HttpsConnector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;
use tracing::{debug, warn};

pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

pub fn build_client(pool_max_idle_per_host: usize) -> HttpClient {
    let https = HttpsConnector::new();
    Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .build::<_, Body>(https)
}

fn transport_kind(e: &hyper::Error) -> TransportErrorKind {
    if e.is_connect() {
        TransportErrorKind::Connect
    } else if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_closed() || e.is_incomplete_message() {
        TransportErrorKind::Closed
    } else {
        TransportErrorKind::Other
    }
}

/// Issues one GET and reports what happened. The response body is dropped unread.
pub async fn perform_request(
    client: &HttpClient,
    target: &Uri,
    request_timeout: Option<Duration>,
) -> Outcome {
    let response = client.get(target.clone());

    let result = match request_timeout {
        Some(limit) => match timeout(limit, response).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url = %target, timeout_ms = limit.as_millis() as u64, "Request timed out");
                return Outcome::Transport(TransportErrorKind::Timeout);
            }
        },
        None => response.await,
    };

    match result {
        Ok(resp) => Outcome::Status(resp.status().as_u16()),
        Err(e) => {
            let kind = transport_kind(&e);
            warn!(url = %target, kind = %kind, error = %e, "Request failed");
            Outcome::Transport(kind)
        }
    }
}

/// Everything a request task needs, cloned cheaply per launch.
#[derive(Clone)]
pub struct TaskContext {
    pub client: HttpClient,
    pub target: Uri,
    pub request_timeout: Option<Duration>,
    pub accumulator: Arc<Accumulator>,
    pub metrics: Arc<RunMetrics>,
}

/// Performs one attempt and records it exactly once. The admission permit is
/// released only after the record, so a freed slot always implies a visible result.
pub async fn run_task(index: u64, ctx: TaskContext, permit: OwnedSemaphorePermit) -> Outcome {
    let outcome = {
        let _in_flight = InFlightGuard::new(&ctx.metrics);
        perform_request(&ctx.client, &ctx.target, ctx.request_timeout).await
    };

    ctx.accumulator.record(outcome);
    ctx.metrics.observe(outcome);
    debug!(request = index, outcome = ?outcome, "Request finished");

    drop(permit);
    outcome
}
