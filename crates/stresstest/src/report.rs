//! Text rendering of a finished run.

use crate::engine::accumulator::{FailureKind, RunSummary};
use std::fmt::Write as _;
use std::io;

const RULE: &str = "=========================================";

fn failure_label(kind: FailureKind) -> String {
    match kind {
        FailureKind::Status(code) => code.to_string(),
        FailureKind::Transport => "erro".to_string(),
        FailureKind::Aborted => "abortada".to_string(),
    }
}

/// Renders the report. Failure lines come out in ascending status-code order,
/// followed by the transport and aborted buckets when present.
pub fn render(summary: &RunSummary) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Relatório de Stress Test");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "URL Testada: {}", summary.target);
    let _ = writeln!(out, "Total de Requisições: {}", summary.total_requested);
    let _ = writeln!(out, "Requisições Executadas: {}", summary.executed);
    let _ = writeln!(out, "Duração Total: {:.2}s", summary.elapsed.as_secs_f64());
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Detalhes das Respostas:");
    let _ = writeln!(out, "  Código (200): {} Sucesso", summary.success);
    for (kind, count) in &summary.failures {
        let _ = writeln!(out, "  Código ({}): {} Falha", failure_label(*kind), count);
    }
    let _ = writeln!(out, "{}", RULE);

    out
}

pub fn write_report<W: io::Write>(writer: &mut W, summary: &RunSummary) -> io::Result<()> {
    writer.write_all(render(summary).as_bytes())?;
    writer.flush()
}
