pub mod accumulator;
pub mod dispatcher;
pub mod task;

pub use accumulator::{classify, Accumulator, FailureKind, Outcome, RunSummary, TransportErrorKind};
pub use dispatcher::{dispatch, DispatchError, RunPlan};
pub use task::{build_client, perform_request, HttpClient};
