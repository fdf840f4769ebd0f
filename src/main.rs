//! Binary entrypoint: read JSON lines from stdin, write JSON lines to stdout.
//!
//! Each input line is an InboundIncident. One IncidentReport line is
//! emitted per valid incident and one ErrorOutput line per invalid one;
//! after EOF, one ClusterOutput line is emitted per kind with at least one
//! analyzed incident. Diagnostics go to stderr via RUST_LOG.

use std::io::{self, BufRead, Write};

use tracing_subscriber::EnvFilter;
use triage_engine::types::{ClusterOutput, ErrorOutput, IncidentKind};
use triage_engine::{Engine, InboundIncident};

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let stdin = io::stdin();
  let stdout = io::stdout();
  let mut out = io::BufWriter::new(stdout.lock());
  let engine = Engine::with_defaults();

  // Parse every line up front; the whole batch is analyzed at once so the
  // clustering barrier sees all incidents.
  let mut inputs: Vec<InboundIncident> = Vec::new();
  for line in stdin.lock().lines() {
    let line = match line {
      Ok(l) => l,
      Err(e) => {
        let _ = writeln!(io::stderr(), "triage-engine: read error: {}", e);
        std::process::exit(1);
      }
    };

    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    match serde_json::from_str::<InboundIncident>(trimmed) {
      Ok(raw) => inputs.push(raw),
      Err(e) => {
        let err = ErrorOutput::new(format!("json parse: {}", e));
        let _ = serde_json::to_writer(&mut out, &err);
        let _ = writeln!(out);
      }
    }
  }

  let batch = engine.analyze_batch(&inputs);

  for report in &batch.reports {
    let _ = serde_json::to_writer(&mut out, report);
    let _ = writeln!(out);
  }
  for failure in &batch.failures {
    let err = ErrorOutput::new(failure.error.clone()).with_field(format!("line {}", failure.line));
    let _ = serde_json::to_writer(&mut out, &err);
    let _ = writeln!(out);
  }

  if !batch.anr_clusters.is_empty() {
    let output = ClusterOutput {
      kind: IncidentKind::Anr,
      groups: batch.anr_clusters,
    };
    let _ = serde_json::to_writer(&mut out, &output);
    let _ = writeln!(out);
  }
  if !batch.tombstone_clusters.is_empty() {
    let output = ClusterOutput {
      kind: IncidentKind::Tombstone,
      groups: batch.tombstone_clusters,
    };
    let _ = serde_json::to_writer(&mut out, &output);
    let _ = writeln!(out);
  }

  let _ = out.flush();
}
