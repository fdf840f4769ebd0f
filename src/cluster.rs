//! Density-based clustering of analyzed incidents, one kind at a time.
//!
//! Distance is `100 - score`. With a minimum cluster size of 1 every
//! incident lands in exactly one group, so the output is a true partition
//! of the input.

use crate::config::Config;
use crate::similarity;
use crate::types::{ClusterGroup, IncidentDetails, IncidentKind, IncidentRecord, Severity};

/// Partition all incidents of `kind` into cluster groups.
///
/// Input is pre-sorted by the stable key (file_name, file_path, id) so the
/// partition and titles are reproducible regardless of arrival order.
/// Fewer than 2 incidents is not an error: singletons get their own group.
pub fn cluster(
  kind: IncidentKind,
  incidents: &[IncidentRecord],
  config: &Config,
) -> Vec<ClusterGroup> {
  let mut sorted: Vec<&IncidentRecord> = incidents.iter().filter(|i| i.kind() == kind).collect();
  sorted.sort_by(|a, b| {
    a.file_name
      .cmp(&b.file_name)
      .then_with(|| a.file_path.cmp(&b.file_path))
      .then_with(|| a.id.cmp(&b.id))
  });

  let n = sorted.len();
  if n == 0 {
    return Vec::new();
  }

  // Pairwise score matrix; distance = 100 - score, diagonal forced to 0.
  let mut scores = vec![vec![0.0f64; n]; n];
  for i in 0..n {
    scores[i][i] = 100.0;
    for j in (i + 1)..n {
      let s = similarity::score(sorted[i], sorted[j], config);
      scores[i][j] = s;
      scores[j][i] = s;
    }
  }

  let eps = match kind {
    IncidentKind::Anr => config.anr_eps,
    IncidentKind::Tombstone => config.tombstone_eps,
  };

  // Density expansion: with min cluster size 1 every point is a core
  // point, so this reduces to connected components of the eps-neighbor
  // graph, visited in sorted order.
  let mut assignment: Vec<Option<usize>> = vec![None; n];
  let mut next_cluster = 0usize;
  for seed in 0..n {
    if assignment[seed].is_some() {
      continue;
    }
    let cluster_id = next_cluster;
    next_cluster += 1;

    let mut queue = vec![seed];
    while let Some(i) = queue.pop() {
      if assignment[i].is_some() {
        continue;
      }
      assignment[i] = Some(cluster_id);
      for j in 0..n {
        if assignment[j].is_none() && 100.0 - scores[i][j] <= eps {
          queue.push(j);
        }
      }
    }
  }

  let mut groups = Vec::with_capacity(next_cluster);
  for cluster_id in 0..next_cluster {
    let indices: Vec<usize> = (0..n).filter(|i| assignment[*i] == Some(cluster_id)).collect();
    let members: Vec<&IncidentRecord> = indices.iter().map(|i| sorted[*i]).collect();

    let mut member_ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
    member_ids.sort();

    let confidence = if indices.len() < 2 {
      100.0
    } else {
      let mut sum = 0.0;
      let mut pairs = 0usize;
      for (x, i) in indices.iter().enumerate() {
        for j in indices.iter().skip(x + 1) {
          sum += scores[*i][*j];
          pairs += 1;
        }
      }
      (sum / pairs as f64 * 100.0).round() / 100.0
    };

    let aggregate_severity = members
      .iter()
      .map(|m| m.severity_hint)
      .max()
      .unwrap_or(Severity::Unknown);

    let mut affected_processes: Vec<String> =
      members.iter().map(|m| m.process_name.clone()).collect();
    affected_processes.sort();
    affected_processes.dedup();

    groups.push(ClusterGroup {
      member_ids,
      representative_title: representative_title(kind, &members, config),
      confidence,
      aggregate_severity,
      affected_processes,
    });
  }
  groups
}

/// Pick a group title by strict priority: explicit pattern tag, cleaned
/// abort message, crash site, signal/ANR-type label, majority feature tag,
/// then a generic fallback.
fn representative_title(kind: IncidentKind, members: &[&IncidentRecord], config: &Config) -> String {
  // (1) Explicit normalized crash-pattern tag.
  for member in members {
    for tag in &member.feature_tags {
      if let Some(suffix) = tag.strip_prefix("pattern:") {
        return title_for_tag(suffix)
          .map(str::to_string)
          .unwrap_or_else(|| humanize_tag(suffix));
      }
    }
  }

  // (2) Cleaned/truncated abort message.
  for member in members {
    if let IncidentDetails::Tombstone { abort_message, .. } = &member.details {
      if !abort_message.is_empty() {
        return clean_abort_message(abort_message, config.title_max_len);
      }
    }
  }

  // (3) Crash site: function @ library.
  for member in members {
    if let IncidentDetails::Tombstone {
      crash_function,
      crash_library,
      ..
    } = &member.details
    {
      if !crash_function.is_empty() {
        let function = similarity::strip_offset(crash_function);
        return if crash_library.is_empty() {
          function
        } else {
          let library = crash_library.rsplit('/').next().unwrap_or(crash_library);
          format!("{} @ {}", function, library)
        };
      }
    }
  }

  // (4) Signal label for tombstones, ANR-type label for ANRs.
  for member in members {
    match &member.details {
      IncidentDetails::Tombstone { signal_type, .. } if !signal_type.is_empty() => {
        return format!("{} crash", signal_type);
      }
      IncidentDetails::Anr { anr_type, .. } if !anr_type.is_empty() => {
        return format!("{} ANR", anr_type);
      }
      _ => {}
    }
  }

  // (5) Majority feature tag mapped through the fixed title table.
  if let Some(title) = majority_tag_title(members) {
    return title.to_string();
  }

  // (6) Generic fallback.
  match kind {
    IncidentKind::Anr => "Uncategorized ANR group".to_string(),
    IncidentKind::Tombstone => "Uncategorized crash group".to_string(),
  }
}

/// A tag carried by more than half the members and known to the title
/// table; ties break lexicographically.
fn majority_tag_title(members: &[&IncidentRecord]) -> Option<&'static str> {
  let mut counts: Vec<(&str, usize)> = Vec::new();
  for member in members {
    for tag in &member.feature_tags {
      match counts.iter_mut().find(|(t, _)| *t == tag.as_str()) {
        Some((_, c)) => *c += 1,
        None => counts.push((tag.as_str(), 1)),
      }
    }
  }
  counts.retain(|(tag, count)| *count * 2 > members.len() && title_for_tag(tag).is_some());
  counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
  counts.first().and_then(|(tag, _)| title_for_tag(tag))
}

fn title_for_tag(tag: &str) -> Option<&'static str> {
  match tag {
    "binder" => Some("Binder communication stall"),
    "io" => Some("File I/O wait"),
    "network" => Some("Network wait"),
    "ui" => Some("UI thread stall"),
    "lock" => Some("Lock contention"),
    "webview" => Some("WebView issue"),
    "native" => Some("Native crash"),
    "oom" => Some("Out of memory"),
    "gc" => Some("GC pressure"),
    _ => None,
  }
}

fn humanize_tag(tag: &str) -> String {
  let spaced = tag.replace(['-', '_'], " ");
  let mut chars = spaced.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    None => spaced,
  }
}

/// Map known abort-message shapes to canonical phrases and truncate.
fn clean_abort_message(message: &str, max_len: usize) -> String {
  let trimmed = message.trim();
  let lower = trimmed.to_ascii_lowercase();

  if lower.contains("assertion") && lower.contains("failed") {
    return format!("Assertion failure: {}", truncate_chars(trimmed, max_len));
  }
  if lower.contains("check failed") {
    return format!("Runtime check failure: {}", truncate_chars(trimmed, max_len));
  }
  if lower.contains("fortify") {
    return format!("FORTIFY violation: {}", truncate_chars(trimmed, max_len));
  }
  truncate_chars(trimmed, max_len)
}

fn truncate_chars(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let cut: String = s.chars().take(max_len).collect();
    format!("{}...", cut.trim_end())
  }
}
