//! Normalize inbound incidents into canonical internal models.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::EngineError;
use crate::fingerprint;
use crate::types::*;

/// Parse and normalize one inbound incident.
///
/// Returns the canonical incident, its thread records, and the number of
/// thread records skipped for missing a tid. Skipped records never
/// participate in any graph or score.
pub fn normalize(
  raw: &InboundIncident,
  config: &Config,
) -> Result<(IncidentRecord, Vec<ThreadRecord>, usize), EngineError> {
  let kind = IncidentKind::from_str_loose(&raw.kind)
    .ok_or_else(|| EngineError::validation("kind", "expected anr|tombstone"))?;

  if raw.process_name.is_empty() {
    return Err(EngineError::validation("process_name", "must not be empty"));
  }

  let timestamp: Option<DateTime<Utc>> = match &raw.timestamp {
    Some(ts) => Some(
      DateTime::parse_from_rfc3339(ts)
        .map_err(|e| EngineError::validation("timestamp", &format!("invalid RFC3339: {}", e)))?
        .with_timezone(&Utc),
    ),
    None => None,
  };

  let severity_hint = raw
    .severity
    .as_deref()
    .map(Severity::from_str_loose)
    .unwrap_or(Severity::Unknown);

  let mut feature_tags: Vec<String> = raw
    .feature_tags
    .iter()
    .map(|t| t.trim().to_ascii_lowercase())
    .filter(|t| !t.is_empty())
    .collect();
  feature_tags.sort();
  feature_tags.dedup();

  let mut skipped = 0usize;
  let threads: Vec<ThreadRecord> = raw
    .threads
    .iter()
    .filter_map(|t| {
      if t.tid.is_empty() {
        skipped += 1;
        return None;
      }
      Some(ThreadRecord {
        tid: t.tid.clone(),
        name: t.name.clone(),
        priority: t.priority,
        state: ThreadState::from_str_loose(&t.state),
        held_locks: t.held_locks.clone(),
        waiting_locks: t.waiting_locks.clone(),
        waiting_on: t.waiting_on.as_ref().map(|w| WaitTarget {
          holder_tid: w.holder_tid.clone(),
          holder_pid: w.holder_pid.clone(),
        }),
        backtrace: t.backtrace.clone(),
      })
    })
    .collect();

  let details = match kind {
    IncidentKind::Anr => IncidentDetails::Anr {
      anr_type: raw.anr_type.clone(),
      wait_time_ms: raw.wait_time_ms,
    },
    IncidentKind::Tombstone => {
      // A missing fingerprint is computed from the key stack so the
      // exact-match shortcut still applies to parser output without one.
      let stack_fingerprint = match &raw.stack_fingerprint {
        Some(fp) if !fp.is_empty() => Some(fp.clone()),
        _ if !raw.key_stack.is_empty() => {
          let frames: Vec<&str> = raw.key_stack.lines().collect();
          Some(fingerprint::stack_fingerprint(&frames, config.fingerprint_max_frames))
        }
        _ => None,
      };
      IncidentDetails::Tombstone {
        signal_type: raw.signal_type.clone(),
        signal_code: raw.signal_code.clone(),
        fault_addr: raw.fault_addr.clone(),
        crash_function: raw.crash_function.clone(),
        crash_library: raw.crash_library.clone(),
        abort_message: raw.abort_message.clone(),
        stack_fingerprint,
      }
    }
  };

  let id = match &raw.id {
    Some(id) if !id.is_empty() => id.clone(),
    _ => fingerprint::incident_id(&raw.process_name, &raw.file_path, timestamp.as_ref()),
  };

  let incident = IncidentRecord {
    id,
    process_name: raw.process_name.clone(),
    pid: raw.pid.clone(),
    file_name: raw.file_name.clone(),
    file_path: raw.file_path.clone(),
    timestamp,
    severity_hint,
    root_cause_text: raw.root_cause.clone(),
    key_stack_text: raw.key_stack.clone(),
    feature_tags,
    details,
  };

  Ok((incident, threads, skipped))
}
