//! Core types for the triage engine (JSON contracts + internal models).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inbound types (JSON contract — what the parser sends, one object per file)
// ---------------------------------------------------------------------------

/// One inbound incident from stdin. Unknown fields are silently ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundIncident {
  pub kind: String,
  pub process_name: String,
  #[serde(default)]
  pub id: Option<String>,
  #[serde(default)]
  pub pid: Option<String>,
  #[serde(default)]
  pub file_name: String,
  #[serde(default)]
  pub file_path: String,
  #[serde(default)]
  pub timestamp: Option<String>,
  #[serde(default)]
  pub severity: Option<String>,
  #[serde(default)]
  pub root_cause: String,
  #[serde(default)]
  pub key_stack: String,
  #[serde(default)]
  pub feature_tags: Vec<String>,
  // ANR-specific scalars.
  #[serde(default)]
  pub anr_type: String,
  #[serde(default)]
  pub wait_time_ms: Option<u64>,
  // Tombstone-specific scalars.
  #[serde(default)]
  pub signal_type: String,
  #[serde(default)]
  pub signal_code: String,
  #[serde(default)]
  pub fault_addr: String,
  #[serde(default)]
  pub crash_function: String,
  #[serde(default)]
  pub crash_library: String,
  #[serde(default)]
  pub abort_message: String,
  #[serde(default)]
  pub stack_fingerprint: Option<String>,
  #[serde(default)]
  pub threads: Vec<InboundThread>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundThread {
  #[serde(default)]
  pub tid: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub priority: Option<i32>,
  #[serde(default)]
  pub state: String,
  #[serde(default)]
  pub held_locks: Vec<String>,
  #[serde(default)]
  pub waiting_locks: Vec<String>,
  #[serde(default)]
  pub waiting_on: Option<InboundWaitTarget>,
  #[serde(default)]
  pub backtrace: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundWaitTarget {
  pub holder_tid: String,
  #[serde(default)]
  pub holder_pid: Option<String>,
}

// ---------------------------------------------------------------------------
// Enums (normalized)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentKind {
  Anr,
  Tombstone,
}

impl IncidentKind {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.to_ascii_lowercase().as_str() {
      "anr" => Some(Self::Anr),
      "tombstone" | "crash" | "native" => Some(Self::Tombstone),
      _ => None,
    }
  }
}

/// Ordered severity: aggregation across a cluster takes the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Unknown,
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  pub fn from_str_loose(s: &str) -> Self {
    match s.to_ascii_lowercase().as_str() {
      "low" | "minor" => Self::Low,
      "medium" | "moderate" => Self::Medium,
      "high" | "major" => Self::High,
      "critical" | "fatal" => Self::Critical,
      _ => Self::Unknown,
    }
  }
}

/// Thread scheduler/VM state as reported in the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
  Runnable,
  Sleeping,
  Wait,
  TimedWait,
  Blocked,
  Suspended,
  Native,
  Monitor,
  Zombie,
  Unknown,
}

impl ThreadState {
  pub fn from_str_loose(s: &str) -> Self {
    match s.to_ascii_lowercase().as_str() {
      "runnable" | "running" => Self::Runnable,
      "sleeping" => Self::Sleeping,
      "wait" | "waiting" => Self::Wait,
      "timedwait" | "timed_wait" | "timedwaiting" => Self::TimedWait,
      "blocked" => Self::Blocked,
      "suspended" => Self::Suspended,
      "native" => Self::Native,
      "monitor" => Self::Monitor,
      "zombie" => Self::Zombie,
      _ => Self::Unknown,
    }
  }
}

// ---------------------------------------------------------------------------
// Internal normalized types
// ---------------------------------------------------------------------------

/// Resolved holder of the lock/monitor a thread is waiting on.
/// `holder_pid` is present only for cross-process waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitTarget {
  pub holder_tid: String,
  pub holder_pid: Option<String>,
}

/// One thread from one incident's dump. `tid` is unique within the incident.
#[derive(Debug, Clone)]
pub struct ThreadRecord {
  pub tid: String,
  pub name: String,
  pub priority: Option<i32>,
  pub state: ThreadState,
  pub held_locks: Vec<String>,
  pub waiting_locks: Vec<String>,
  pub waiting_on: Option<WaitTarget>,
  pub backtrace: Vec<String>,
}

/// Kind-specific incident fields.
#[derive(Debug, Clone)]
pub enum IncidentDetails {
  Anr {
    anr_type: String,
    wait_time_ms: Option<u64>,
  },
  Tombstone {
    signal_type: String,
    signal_code: String,
    fault_addr: String,
    crash_function: String,
    crash_library: String,
    abort_message: String,
    stack_fingerprint: Option<String>,
  },
}

/// Canonical per-file incident summary after normalization.
#[derive(Debug, Clone)]
pub struct IncidentRecord {
  pub id: String,
  pub process_name: String,
  pub pid: Option<String>,
  pub file_name: String,
  pub file_path: String,
  pub timestamp: Option<DateTime<Utc>>,
  pub severity_hint: Severity,
  pub root_cause_text: String,
  pub key_stack_text: String,
  /// Lowercased, deduplicated, sorted.
  pub feature_tags: Vec<String>,
  pub details: IncidentDetails,
}

impl IncidentRecord {
  pub fn kind(&self) -> IncidentKind {
    match self.details {
      IncidentDetails::Anr { .. } => IncidentKind::Anr,
      IncidentDetails::Tombstone { .. } => IncidentKind::Tombstone,
    }
  }
}

// ---------------------------------------------------------------------------
// Per-incident findings
// ---------------------------------------------------------------------------

/// A deadlock cycle in the wait-for graph, normalized to start at the
/// smallest tid (numeric-aware ordering).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
  pub tids: Vec<String>,
}

/// A high-priority thread waiting on a lock held by a low-priority thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityInversion {
  pub high_tid: String,
  pub high_priority: i32,
  pub low_tid: String,
  pub low_priority: i32,
  /// The contended locks (sorted).
  pub locks: Vec<String>,
}

/// A root blocker plus everyone transitively blocked behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockingChain {
  pub blocker_tid: String,
  /// Sorted tids of all transitively blocked threads.
  pub blocked_tids: Vec<String>,
  pub impact_count: usize,
  pub high_priority_blocked_count: usize,
  pub severity: Severity,
}

/// A walk along wait edges, truncated to the display cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriticalPath {
  pub tids: Vec<String>,
  /// Nodes cut off by the display cap; 0 when the full walk fits.
  pub omitted: usize,
}

impl CriticalPath {
  /// "t1 -> t2 -> t3 +2 more" — omitted nodes are marked, never silent.
  pub fn display(&self) -> String {
    let mut s = self.tids.join(" -> ");
    if self.omitted > 0 {
      s.push_str(&format!(" +{} more", self.omitted));
    }
    s
  }
}

/// Cycle detector output for one incident.
#[derive(Debug, Clone)]
pub struct DeadlockReport {
  pub has_deadlock: bool,
  pub cycles: Vec<Cycle>,
  /// True if any cycle edge crossed a process boundary.
  pub cross_process: bool,
  pub priority_inversions: Vec<PriorityInversion>,
}

// ---------------------------------------------------------------------------
// Cluster groups
// ---------------------------------------------------------------------------

/// A set of incidents judged similar enough to report as one problem.
/// Groups of one kind form a partition over that kind's incidents.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterGroup {
  /// Sorted incident ids.
  pub member_ids: Vec<String>,
  pub representative_title: String,
  /// Mean pairwise similarity among members; 100.0 for singletons.
  pub confidence: f64,
  pub aggregate_severity: Severity,
  /// Sorted, deduplicated.
  pub affected_processes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Output types (JSON contract — what we emit)
// ---------------------------------------------------------------------------

/// Per-incident diagnosis, one line per analyzed file.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentReport {
  pub incident_id: String,
  pub kind: IncidentKind,
  pub process_name: String,
  pub has_deadlock: bool,
  pub cross_process: bool,
  pub cycles: Vec<Cycle>,
  pub priority_inversions: Vec<PriorityInversion>,
  pub blocking_chains: Vec<BlockingChain>,
  pub critical_paths: Vec<CriticalPath>,
  /// Threads that wait on a lock with no resolvable holder (sorted).
  pub unresolved_waits: Vec<String>,
  /// Thread records dropped for missing a tid.
  pub skipped_records: usize,
}

/// Cluster summary for one incident kind, emitted after the batch completes.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterOutput {
  pub kind: IncidentKind,
  pub groups: Vec<ClusterGroup>,
}

/// A single file that failed validation; never aborts the batch.
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
  /// 1-based position in the batch input.
  pub line: usize,
  pub error: String,
}

/// Everything produced by one batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
  pub reports: Vec<IncidentReport>,
  pub failures: Vec<FileError>,
  pub anr_clusters: Vec<ClusterGroup>,
  pub tombstone_clusters: Vec<ClusterGroup>,
}

/// Structured error output for invalid input lines.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

// ---------------------------------------------------------------------------
// Ordering helpers
// ---------------------------------------------------------------------------

/// Compare tids numerically when both parse as integers, lexicographically
/// otherwise. Numeric tids sort before non-numeric ones.
pub fn tid_cmp(a: &str, b: &str) -> std::cmp::Ordering {
  match (a.parse::<u64>(), b.parse::<u64>()) {
    (Ok(x), Ok(y)) => x.cmp(&y),
    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
    (Err(_), Err(_)) => a.cmp(b),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn severity_ordering_matches_aggregation_rule() {
    assert!(Severity::Critical > Severity::High);
    assert!(Severity::High > Severity::Medium);
    assert!(Severity::Medium > Severity::Low);
    assert!(Severity::Low > Severity::Unknown);
  }

  #[test]
  fn kind_parses_loosely() {
    assert_eq!(IncidentKind::from_str_loose("ANR"), Some(IncidentKind::Anr));
    assert_eq!(
      IncidentKind::from_str_loose("Tombstone"),
      Some(IncidentKind::Tombstone)
    );
    assert_eq!(IncidentKind::from_str_loose("logcat"), None);
  }

  #[test]
  fn thread_state_unrecognized_maps_to_unknown() {
    assert_eq!(ThreadState::from_str_loose("TimedWaiting"), ThreadState::TimedWait);
    assert_eq!(ThreadState::from_str_loose("???"), ThreadState::Unknown);
  }

  #[test]
  fn tid_cmp_is_numeric_aware() {
    assert_eq!(tid_cmp("2", "10"), std::cmp::Ordering::Less);
    assert_eq!(tid_cmp("10", "10"), std::cmp::Ordering::Equal);
    assert_eq!(tid_cmp("7", "main"), std::cmp::Ordering::Less);
    assert_eq!(tid_cmp("binder:1", "binder:2"), std::cmp::Ordering::Less);
  }

  #[test]
  fn critical_path_display_marks_omitted() {
    let full = CriticalPath {
      tids: vec!["1".into(), "5".into()],
      omitted: 0,
    };
    assert_eq!(full.display(), "1 -> 5");

    let cut = CriticalPath {
      tids: vec!["1".into(), "5".into()],
      omitted: 3,
    };
    assert_eq!(cut.display(), "1 -> 5 +3 more");
  }
}
