pub mod app;
pub mod cli;
pub mod engine;
pub mod metrics;
pub mod report;

pub use engine::dispatcher::{dispatch, RunPlan};
pub use engine::accumulator::{Accumulator, RunSummary};
