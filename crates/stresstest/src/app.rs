use crate::cli::{self, Command};
use crate::engine::{build_client, dispatch};
use crate::metrics::{spawn_metrics_server, RunMetrics};
use crate::report::write_report;
use std::ffi::OsString;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Parses `args`, runs the stress test and writes the report to `out`.
///
/// Invalid arguments print the error and usage text to `out` and return
/// `Ok(())` without issuing any request.
pub async fn run_from_args<I, T, W>(
    args: I,
    out: &mut W,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
    W: Write,
{
    let settings = match cli::parse(args) {
        Ok(Command::Run(settings)) => settings,
        Ok(Command::Help(text)) => {
            write!(out, "{}", text)?;
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, "Invalid arguments, nothing to run");
            writeln!(out, "Erro: {}", e)?;
            write!(out, "{}", cli::usage())?;
            out.flush()?;
            return Ok(());
        }
    };

    let metrics = Arc::new(
        RunMetrics::new().map_err(|e| format!("failed to create run metrics: {}", e))?,
    );

    // Lives as long as the run; also torn down by an outer shutdown.
    let run_token = shutdown.child_token();

    if settings.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.metrics.port));
        match spawn_metrics_server(addr, Arc::clone(&metrics), run_token.clone()) {
            Ok(bound) => info!(addr = %bound, "Serving run metrics"),
            Err(e) => error!(port = settings.metrics.port, error = %e, "Could not start metrics server"),
        }
    }

    let client = build_client(settings.pool_max_idle_per_host);
    let result = dispatch(&settings.plan, client, metrics, shutdown).await;
    run_token.cancel();

    let summary = result?;
    write_report(out, &summary)?;
    Ok(())
}
