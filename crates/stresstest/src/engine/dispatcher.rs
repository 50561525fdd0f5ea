//! Bounded request dispatcher.
//!
//! Admission is a counting semaphore with `concurrency` permits. The dispatch
//! loop acquires a permit before every launch, so no more than `concurrency`
//! tasks are ever in flight, and each task hands its permit back as soon as it
//! has recorded its outcome. All tasks live in a `JoinSet`; the dispatcher only
//! returns after draining it, which makes every accumulator write visible to
//! whoever reads the summary.

use crate::engine::accumulator::{Accumulator, Outcome, RunSummary};
use crate::engine::task::{run_task, HttpClient, TaskContext};
use crate::metrics::RunMetrics;
use hyper::Uri;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Validated parameters of one run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// The URL exactly as the user gave it; this is what the report shows.
    pub url: String,
    pub target: Uri,
    pub requests: u64,
    pub concurrency: usize,
    /// `None` waits on each request indefinitely.
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("accumulator still referenced after every task was joined")]
    AccumulatorShared,
}

fn reap(
    joined: Result<Option<Outcome>, JoinError>,
    accumulator: &Accumulator,
    metrics: &RunMetrics,
) {
    if let Err(e) = joined {
        error!(error = %e, "Request task died before recording its outcome");
        accumulator.record(Outcome::Aborted);
        metrics.observe(Outcome::Aborted);
    }
}

/// Runs `plan.requests` GETs against `plan.target` with at most
/// `plan.concurrency` in flight, then returns the sealed summary.
///
/// `requests` and `concurrency` must both be positive; callers validate them.
/// Cancelling `shutdown` stops further launches and abandons in-flight
/// requests, which are then left out of the executed count.
pub async fn dispatch(
    plan: &RunPlan,
    client: HttpClient,
    metrics: Arc<RunMetrics>,
    shutdown: CancellationToken,
) -> Result<RunSummary, DispatchError> {
    debug_assert!(plan.requests > 0 && plan.concurrency > 0);

    let accumulator = Arc::new(Accumulator::new(plan.url.clone(), plan.requests));
    let admission = Arc::new(Semaphore::new(plan.concurrency.min(Semaphore::MAX_PERMITS)));
    let ctx = TaskContext {
        client,
        target: plan.target.clone(),
        request_timeout: plan.request_timeout,
        accumulator: Arc::clone(&accumulator),
        metrics: Arc::clone(&metrics),
    };

    info!(
        url = %plan.target,
        requests = plan.requests,
        concurrency = plan.concurrency,
        "Starting stress test"
    );

    let mut tasks = JoinSet::new();
    let start = Instant::now();

    for index in 0..plan.requests {
        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                warn!(launched = index, "Run cancelled, no further requests will be launched");
                break;
            }
            permit = Arc::clone(&admission).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Admission semaphore closed");
                    break;
                }
            },
        };

        let ctx = ctx.clone();
        let token = shutdown.clone();
        tasks.spawn(async move {
            tokio::select! {
                outcome = run_task(index, ctx, permit) => Some(outcome),
                _ = token.cancelled() => None,
            }
        });

        // Finished tasks are dropped as we go so the set stays bounded by
        // the concurrency limit rather than the request count.
        while let Some(joined) = tasks.try_join_next() {
            reap(joined, &accumulator, &metrics);
        }
        metrics.track_pending_tasks(tasks.len());
    }
    drop(ctx);

    while let Some(joined) = tasks.join_next().await {
        reap(joined, &accumulator, &metrics);
    }

    let elapsed = start.elapsed();
    let accumulator = Arc::into_inner(accumulator).ok_or(DispatchError::AccumulatorShared)?;
    let summary = accumulator.finish(elapsed);

    info!(
        executed = summary.executed,
        success = summary.success,
        failures = summary.failure_total(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Stress test finished"
    );

    Ok(summary)
}
