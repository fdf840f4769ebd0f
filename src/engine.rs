//! Core engine: per-incident diagnosis, parallel batch analysis, and the
//! clustering join point.

use rayon::prelude::*;

use crate::chains;
use crate::cluster;
use crate::config::Config;
use crate::deadlock;
use crate::graph::WaitForGraph;
use crate::normalize;
use crate::types::*;

/// The triage engine. Stateless between runs; all tunables live in Config.
pub struct Engine {
  config: Config,
}

impl Engine {
  pub fn new(config: Config) -> Self {
    Self { config }
  }

  pub fn with_defaults() -> Self {
    Self::new(Config::default())
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Diagnose one incident: wait-for graph, deadlock cycles, priority
  /// inversions, blocking chains, critical paths. Pure and deterministic.
  pub fn analyze_incident(
    &self,
    incident: &IncidentRecord,
    threads: &[ThreadRecord],
    skipped_records: usize,
  ) -> IncidentReport {
    let graph = WaitForGraph::build(threads);
    let deadlock_report =
      deadlock::detect(&graph, threads, incident.pid.as_deref(), &self.config);
    let blocking_chains = chains::blocking_chains(&graph, threads, &self.config);
    let critical_paths = chains::critical_paths(&graph, &self.config);

    IncidentReport {
      incident_id: incident.id.clone(),
      kind: incident.kind(),
      process_name: incident.process_name.clone(),
      has_deadlock: deadlock_report.has_deadlock,
      cross_process: deadlock_report.cross_process,
      cycles: deadlock_report.cycles,
      priority_inversions: deadlock_report.priority_inversions,
      blocking_chains,
      critical_paths,
      unresolved_waits: graph.unresolved_waits.clone(),
      skipped_records: skipped_records + graph.skipped_records,
    }
  }

  /// Analyze a batch of inbound incidents.
  ///
  /// Per-file analysis fans out across the rayon pool; a failing file is
  /// captured as a FileError and never aborts the batch. Clustering runs
  /// after every per-file analysis has completed, single-threaded over
  /// sorted input.
  pub fn analyze_batch(&self, inputs: &[InboundIncident]) -> BatchReport {
    let outcomes: Vec<Result<(IncidentRecord, IncidentReport), FileError>> = inputs
      .par_iter()
      .enumerate()
      .map(|(idx, raw)| match normalize::normalize(raw, &self.config) {
        Ok((incident, threads, skipped)) => {
          let report = self.analyze_incident(&incident, &threads, skipped);
          Ok((incident, report))
        }
        Err(e) => Err(FileError {
          line: idx + 1,
          error: e.to_string(),
        }),
      })
      .collect();

    let mut incidents = Vec::new();
    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
      match outcome {
        Ok((incident, report)) => {
          incidents.push(incident);
          reports.push(report);
        }
        Err(failure) => {
          tracing::warn!(line = failure.line, error = %failure.error, "skipping file");
          failures.push(failure);
        }
      }
    }

    tracing::debug!(
      analyzed = incidents.len(),
      failed = failures.len(),
      "per-file analysis complete, clustering"
    );
    let anr_clusters = cluster::cluster(IncidentKind::Anr, &incidents, &self.config);
    let tombstone_clusters = cluster::cluster(IncidentKind::Tombstone, &incidents, &self.config);

    BatchReport {
      reports,
      failures,
      anr_clusters,
      tombstone_clusters,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn inbound_anr(process: &str, file: &str) -> InboundIncident {
    InboundIncident {
      kind: "anr".into(),
      process_name: process.into(),
      id: None,
      pid: Some("1234".into()),
      file_name: file.into(),
      file_path: format!("/data/anr/{}", file),
      timestamp: Some("2025-03-01T09:30:00Z".into()),
      severity: Some("high".into()),
      root_cause: "main thread blocked on binder call".into(),
      key_stack: "at android.os.BinderProxy.transactNative(Binder.java:100)".into(),
      feature_tags: vec!["binder".into()],
      anr_type: "input".into(),
      wait_time_ms: Some(8000),
      signal_type: String::new(),
      signal_code: String::new(),
      fault_addr: String::new(),
      crash_function: String::new(),
      crash_library: String::new(),
      abort_message: String::new(),
      stack_fingerprint: None,
      threads: vec![],
    }
  }

  fn blocked_thread(tid: &str, holder: &str) -> InboundThread {
    InboundThread {
      tid: tid.into(),
      name: format!("Thread-{}", tid),
      priority: Some(5),
      state: "Blocked".into(),
      held_locks: vec![],
      waiting_locks: vec![format!("0x{}", holder)],
      waiting_on: Some(InboundWaitTarget {
        holder_tid: holder.into(),
        holder_pid: None,
      }),
      backtrace: vec![],
    }
  }

  #[test]
  fn deadlock_flows_through_to_report() {
    let engine = Engine::with_defaults();
    let mut raw = inbound_anr("com.example.app", "anr_01.txt");
    raw.threads = vec![
      blocked_thread("1", "2"),
      blocked_thread("2", "3"),
      blocked_thread("3", "1"),
    ];

    let batch = engine.analyze_batch(&[raw]);
    assert_eq!(batch.reports.len(), 1);
    let report = &batch.reports[0];
    assert!(report.has_deadlock);
    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.cycles[0].tids, vec!["1", "2", "3"]);
  }

  #[test]
  fn failing_file_does_not_abort_batch() {
    let engine = Engine::with_defaults();
    let good = inbound_anr("com.example.app", "anr_01.txt");
    let mut bad = inbound_anr("com.example.app", "anr_02.txt");
    bad.timestamp = Some("not-a-date".into());
    let also_good = inbound_anr("com.example.other", "anr_03.txt");

    let batch = engine.analyze_batch(&[good, bad, also_good]);
    assert_eq!(batch.reports.len(), 2);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].line, 2);
    assert!(batch.failures[0].error.contains("timestamp"));
  }

  #[test]
  fn clusters_partition_the_batch() {
    let engine = Engine::with_defaults();
    let inputs: Vec<InboundIncident> = (1..=4)
      .map(|i| inbound_anr("com.example.app", &format!("anr_{:02}.txt", i)))
      .collect();

    let batch = engine.analyze_batch(&inputs);
    let clustered: usize = batch.anr_clusters.iter().map(|g| g.member_ids.len()).sum();
    assert_eq!(clustered, 4);
    assert!(batch.tombstone_clusters.is_empty());
  }

  #[test]
  fn empty_batch_is_fine() {
    let engine = Engine::with_defaults();
    let batch = engine.analyze_batch(&[]);
    assert!(batch.reports.is_empty());
    assert!(batch.failures.is_empty());
    assert!(batch.anr_clusters.is_empty());
    assert!(batch.tombstone_clusters.is_empty());
  }

  #[test]
  fn batch_report_order_matches_input_order() {
    let engine = Engine::with_defaults();
    let inputs = vec![
      inbound_anr("com.example.one", "anr_b.txt"),
      inbound_anr("com.example.two", "anr_a.txt"),
    ];
    let batch = engine.analyze_batch(&inputs);
    assert_eq!(batch.reports[0].process_name, "com.example.one");
    assert_eq!(batch.reports[1].process_name, "com.example.two");
  }
}
