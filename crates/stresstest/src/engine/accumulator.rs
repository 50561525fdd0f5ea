//! Run statistics shared by every request task of a single run.
//!
//! All counters live behind one mutex, so recording an outcome (bumping the
//! executed count and classifying the status) is a single indivisible update.
//! Once the dispatcher has joined every task it consumes the accumulator with
//! [`Accumulator::finish`] and hands out an immutable [`RunSummary`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Why a request never produced an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Closed,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Closed => "closed",
            TransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A response was received, whatever its status code.
    Status(u16),
    Transport(TransportErrorKind),
    /// The task died before it could record anything.
    Aborted,
}

/// Failure bucket key. Ordering puts HTTP codes first in numeric order,
/// then transport errors, then aborted tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    Status(u16),
    Transport,
    Aborted,
}

/// Returns `None` for statuses in `[200, 300)`, otherwise the failure bucket.
pub fn classify(status: u16) -> Option<FailureKind> {
    if (200..300).contains(&status) {
        None
    } else {
        Some(FailureKind::Status(status))
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Counters {
    pub executed: u64,
    pub success: u64,
    pub failures: BTreeMap<FailureKind, u64>,
}

impl Counters {
    pub fn failure_total(&self) -> u64 {
        self.failures.values().sum()
    }
}

pub struct Accumulator {
    target: String,
    total_requested: u64,
    counters: Mutex<Counters>,
}

impl Accumulator {
    pub fn new(target: impl Into<String>, total_requested: u64) -> Self {
        Self {
            target: target.into(),
            total_requested,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn total_requested(&self) -> u64 {
        self.total_requested
    }

    // A panic while holding the guard cannot leave a half-applied record:
    // every mutation below is a plain integer bump.
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records one finished attempt under the lock.
    pub fn record(&self, outcome: Outcome) {
        let mut counters = self.lock();
        counters.executed += 1;

        let failure = match outcome {
            Outcome::Status(code) => classify(code),
            Outcome::Transport(_) => Some(FailureKind::Transport),
            Outcome::Aborted => Some(FailureKind::Aborted),
        };

        match failure {
            None => counters.success += 1,
            Some(kind) => *counters.failures.entry(kind).or_insert(0) += 1,
        }
    }

    /// Consistent copy of the counters, taken under the lock.
    pub fn snapshot(&self) -> Counters {
        self.lock().clone()
    }

    /// Seals the run. Taking `self` by value means no task can still hold a
    /// reference when the summary is produced.
    pub fn finish(self, elapsed: Duration) -> RunSummary {
        let counters = self.counters.into_inner().unwrap_or_else(|e| e.into_inner());
        RunSummary {
            target: self.target,
            total_requested: self.total_requested,
            executed: counters.executed,
            success: counters.success,
            failures: counters.failures,
            elapsed,
        }
    }
}

/// Read-only statistics of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub target: String,
    pub total_requested: u64,
    pub executed: u64,
    pub success: u64,
    pub failures: BTreeMap<FailureKind, u64>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn failure_total(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn failures_for(&self, kind: FailureKind) -> u64 {
        self.failures.get(&kind).copied().unwrap_or(0)
    }
}
