//! Command-line surface: flag parsing, config merging and argument validation.
//!
//! Flags are accepted in the single-dash form (`-url`, `-requests`) as well as
//! the usual `--url`. A repeated flag keeps its last value. Values given on the
//! command line win over the config file.

use crate::engine::dispatcher::RunPlan;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use hyper::Uri;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use stresstest_common::{Config, ConfigError, MetricsConfig};
use thiserror::Error;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "stresstest",
    about = "Fires HTTP GET requests at a URL with bounded concurrency",
    override_usage = "stresstest -url <URL> -requests <N> -concurrency <N> [OPTIONS]",
    args_override_self = true
)]
pub struct Args {
    /// The URL to stress test
    #[arg(long)]
    pub url: Option<String>,

    /// Number of requests to perform
    #[arg(long, allow_negative_numbers = true)]
    pub requests: Option<i64>,

    /// Number of multiple requests to make at a time
    #[arg(long, allow_negative_numbers = true)]
    pub concurrency: Option<i64>,

    /// YAML config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Per-request deadline in milliseconds (0 disables it)
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("URL é obrigatória")]
    MissingUrl,
    #[error("requests e concurrency devem ser maiores que zero")]
    NonPositiveCounts,
    #[error("URL inválida: {0}")]
    InvalidUrl(String),
    #[error("{0}")]
    Parse(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything the app needs to start a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub plan: RunPlan,
    pub pool_max_idle_per_host: usize,
    pub metrics: MetricsConfig,
}

#[derive(Debug)]
pub enum Command {
    Run(Settings),
    /// `--help` or `--version` was requested; the payload is the text to print.
    Help(String),
}

/// Rewrites Go-style `-flag` into `--flag`. Short negatives such as `-5` are left alone.
pub fn normalize_flag(arg: OsString) -> OsString {
    match arg.to_str() {
        Some(s)
            if s.starts_with('-')
                && !s.starts_with("--")
                && s.len() > 2
                && s[1..].starts_with(|c: char| c.is_ascii_alphabetic()) =>
        {
            OsString::from(format!("-{}", s))
        }
        _ => arg,
    }
}

pub fn usage() -> String {
    Args::command().render_help().to_string()
}

/// `Url` leaves a handful of characters in queries that `Uri` refuses.
fn escape_for_uri(serialized: &str) -> String {
    let mut out = String::with_capacity(serialized.len());
    for c in serialized.chars() {
        match c {
            ' ' | '"' | '<' | '>' | '\\' | '^' | '`' | '{' | '|' | '}' => {
                out.push_str(&format!("%{:02X}", c as u32))
            }
            _ => out.push(c),
        }
    }
    out
}

fn parse_target(raw: &str) -> Result<Uri, ArgumentError> {
    let invalid = || ArgumentError::InvalidUrl(raw.to_string());

    let mut parsed = Url::parse(raw).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
        return Err(invalid());
    }
    // Fragments never go on the wire.
    parsed.set_fragment(None);

    escape_for_uri(parsed.as_str())
        .parse::<Uri>()
        .map_err(|_| invalid())
}

/// Merges parsed flags over the config file and validates the result.
pub fn resolve(args: Args) -> Result<Settings, ArgumentError> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let url = args.url.unwrap_or(config.run.url);
    let requests = args.requests.unwrap_or(config.run.requests);
    let concurrency = args.concurrency.unwrap_or(config.run.concurrency);
    let timeout_ms = args
        .timeout_ms
        .unwrap_or(config.client.request_timeout_ms);

    if url.trim().is_empty() {
        return Err(ArgumentError::MissingUrl);
    }
    if requests <= 0 || concurrency <= 0 {
        return Err(ArgumentError::NonPositiveCounts);
    }
    let url = url.trim().to_string();
    let target = parse_target(&url)?;

    Ok(Settings {
        plan: RunPlan {
            url,
            target,
            requests: requests as u64,
            concurrency: usize::try_from(concurrency).unwrap_or(usize::MAX),
            request_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        },
        pool_max_idle_per_host: config.client.pool_max_idle_per_host,
        metrics: config.metrics,
    })
}

/// Parses a full argv (program name first).
pub fn parse<I, T>(args: I) -> Result<Command, ArgumentError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut iter = args.into_iter().map(Into::<OsString>::into);
    let argv: Vec<OsString> = iter
        .next()
        .into_iter()
        .chain(iter.map(normalize_flag))
        .collect();

    match Args::try_parse_from(argv) {
        Ok(args) => resolve(args).map(Command::Run),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            Ok(Command::Help(e.to_string()))
        }
        Err(e) => {
            let rendered = e.to_string();
            let first = rendered.lines().next().unwrap_or_default();
            Err(ArgumentError::Parse(
                first.trim_start_matches("error: ").to_string(),
            ))
        }
    }
}
