//! In-process HTTP target for integration tests.
#![allow(dead_code)]

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode, Uri};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

type StatusFn = Box<dyn Fn(usize) -> StatusCode + Send + Sync>;

struct State {
    hits: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
    status_for: StatusFn,
}

pub struct TestServer {
    pub addr: SocketAddr,
    state: Arc<State>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn uri(&self) -> Uri {
        self.url().parse().unwrap()
    }

    /// Number of requests the server has seen.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Highest number of requests handled at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle(state: Arc<State>) -> Result<Response<Body>, Infallible> {
    let index = state.hits.fetch_add(1, Ordering::SeqCst);
    let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak.fetch_max(active, Ordering::SeqCst);

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    state.active.fetch_sub(1, Ordering::SeqCst);

    let mut response = Response::new(Body::empty());
    *response.status_mut() = (state.status_for)(index);
    Ok(response)
}

/// Starts a server that answers call number `n` (0-based) with `status_for(n)`,
/// after sleeping `delay`.
pub async fn start_with_delay<F>(delay: Duration, status_for: F) -> TestServer
where
    F: Fn(usize) -> StatusCode + Send + Sync + 'static,
{
    let state = Arc::new(State {
        hits: AtomicUsize::new(0),
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
        delay,
        status_for: Box::new(status_for),
    });

    let svc_state = Arc::clone(&state);
    let make_svc = make_service_fn(move |_conn| {
        let state = Arc::clone(&svc_state);
        async move {
            Ok::<_, Infallible>(service_fn(move |_req: Request<Body>| {
                handle(Arc::clone(&state))
            }))
        }
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let server = Server::bind(&addr).serve(make_svc);
    let addr = server.local_addr();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.with_graceful_shutdown(async move {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        state,
        shutdown: Some(tx),
    }
}

pub async fn start<F>(status_for: F) -> TestServer
where
    F: Fn(usize) -> StatusCode + Send + Sync + 'static,
{
    start_with_delay(Duration::ZERO, status_for).await
}

/// A loopback address with nothing listening on it.
pub fn refused_uri() -> Uri {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr).parse().unwrap()
}
