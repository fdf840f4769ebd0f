//! Deadlock cycle detection (Tarjan SCC) and priority-inversion flagging.

use std::cmp::min;
use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::graph::WaitForGraph;
use crate::types::{tid_cmp, Cycle, DeadlockReport, PriorityInversion, ThreadRecord};

struct TarjanData {
  index: usize,
  indices: HashMap<String, usize>,
  lowlinks: HashMap<String, usize>,
  stack: Vec<String>,
  on_stack: HashSet<String>,
  sccs: Vec<Vec<String>>,
}

/// Detect deadlock cycles and priority inversions for one incident.
///
/// Deterministic: nodes are visited in sorted tid order and cycles are
/// normalized, de-duplicated, and sorted before return, so a fixed graph
/// always produces the same cycle set.
pub fn detect(
  graph: &WaitForGraph,
  threads: &[ThreadRecord],
  incident_pid: Option<&str>,
  config: &Config,
) -> DeadlockReport {
  let mut data = TarjanData {
    index: 0,
    indices: HashMap::new(),
    lowlinks: HashMap::new(),
    stack: Vec::new(),
    on_stack: HashSet::new(),
    sccs: Vec::new(),
  };

  for node in graph.nodes() {
    if !data.indices.contains_key(&node) {
      strongconnect(&node, graph, &mut data);
    }
  }

  // An SCC of >= 2 nodes is a deadlock cycle. Each thread waits on at most
  // one holder, so such an SCC is a simple ring; reconstruct its order by
  // walking forward edges from the smallest member.
  let mut cycles: Vec<Cycle> = Vec::new();
  let mut seen: HashSet<Vec<String>> = HashSet::new();
  for scc in &data.sccs {
    if scc.len() < 2 {
      continue;
    }
    let tids = ring_order(scc, graph);
    if seen.insert(tids.clone()) {
      cycles.push(Cycle { tids });
    }
  }
  cycles.sort_by(|a, b| cmp_tid_seq(&a.tids, &b.tids));

  let cross_process = cycles.iter().any(|cycle| {
    cycle_edges(cycle).any(|(from, to)| match graph.edge(from, to) {
      Some(edge) => match (&edge.holder_pid, incident_pid) {
        (Some(holder), Some(pid)) => holder != pid,
        (Some(_), None) => true,
        (None, _) => false,
      },
      None => false,
    })
  });

  let priority_inversions = find_priority_inversions(threads, config);

  DeadlockReport {
    has_deadlock: !cycles.is_empty(),
    cycles,
    cross_process,
    priority_inversions,
  }
}

fn strongconnect(node: &str, graph: &WaitForGraph, data: &mut TarjanData) {
  data.indices.insert(node.to_string(), data.index);
  data.lowlinks.insert(node.to_string(), data.index);
  data.index += 1;
  data.stack.push(node.to_string());
  data.on_stack.insert(node.to_string());

  if let Some(w) = graph.waits_on.get(node) {
    if !data.indices.contains_key(w) {
      strongconnect(w, graph, data);
      let v_low = data.lowlinks[node];
      let w_low = data.lowlinks[w];
      data.lowlinks.insert(node.to_string(), min(v_low, w_low));
    } else if data.on_stack.contains(w) {
      let v_low = data.lowlinks[node];
      let w_index = data.indices[w];
      data.lowlinks.insert(node.to_string(), min(v_low, w_index));
    }
  }

  if data.lowlinks[node] == data.indices[node] {
    let mut scc = Vec::new();
    loop {
      let w = data.stack.pop().expect("Tarjan stack holds every visited node");
      data.on_stack.remove(&w);
      scc.push(w.clone());
      if w == node {
        break;
      }
    }
    data.sccs.push(scc);
  }
}

/// Walk the ring starting from the smallest tid; this is the normalized
/// cycle order used for de-duplication.
fn ring_order(scc: &[String], graph: &WaitForGraph) -> Vec<String> {
  let start = scc
    .iter()
    .min_by(|a, b| tid_cmp(a, b))
    .expect("SCC is non-empty")
    .clone();
  let members: HashSet<&String> = scc.iter().collect();

  let mut tids = vec![start.clone()];
  let mut current = start.clone();
  while let Some(next) = graph.waits_on.get(&current) {
    if *next == start || !members.contains(next) {
      break;
    }
    tids.push(next.clone());
    current = next.clone();
  }
  tids
}

/// Consecutive (from, to) pairs of the cycle, wrapping back to the start.
fn cycle_edges(cycle: &Cycle) -> impl Iterator<Item = (&str, &str)> + '_ {
  let n = cycle.tids.len();
  (0..n).map(move |i| (cycle.tids[i].as_str(), cycle.tids[(i + 1) % n].as_str()))
}

fn cmp_tid_seq(a: &[String], b: &[String]) -> std::cmp::Ordering {
  for (x, y) in a.iter().zip(b.iter()) {
    let ord = tid_cmp(x, y);
    if ord != std::cmp::Ordering::Equal {
      return ord;
    }
  }
  a.len().cmp(&b.len())
}

/// A high-priority thread whose waiting locks intersect the held locks of
/// a low-priority thread. Flagged even without a true cycle.
fn find_priority_inversions(threads: &[ThreadRecord], config: &Config) -> Vec<PriorityInversion> {
  let mut sorted: Vec<&ThreadRecord> = threads.iter().filter(|t| !t.tid.is_empty()).collect();
  sorted.sort_by(|a, b| tid_cmp(&a.tid, &b.tid));

  let mut findings = Vec::new();
  for high in &sorted {
    let high_priority = match high.priority {
      Some(p) if p <= config.high_priority_max => p,
      _ => continue,
    };
    if high.waiting_locks.is_empty() {
      continue;
    }
    for low in &sorted {
      let low_priority = match low.priority {
        Some(p) if p >= config.low_priority_min => p,
        _ => continue,
      };
      if low.tid == high.tid {
        continue;
      }
      let mut locks: Vec<String> = high
        .waiting_locks
        .iter()
        .filter(|l| low.held_locks.contains(l))
        .cloned()
        .collect();
      if locks.is_empty() {
        continue;
      }
      locks.sort();
      locks.dedup();
      findings.push(PriorityInversion {
        high_tid: high.tid.clone(),
        high_priority,
        low_tid: low.tid.clone(),
        low_priority,
        locks,
      });
    }
  }
  findings
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{ThreadState, WaitTarget};

  fn thread(tid: &str, waiting_on: Option<&str>) -> ThreadRecord {
    ThreadRecord {
      tid: tid.into(),
      name: format!("Thread-{}", tid),
      priority: None,
      state: ThreadState::Blocked,
      held_locks: vec![],
      waiting_locks: vec![],
      waiting_on: waiting_on.map(|h| WaitTarget {
        holder_tid: h.into(),
        holder_pid: None,
      }),
      backtrace: vec![],
    }
  }

  fn cross_thread(tid: &str, holder: &str, holder_pid: &str) -> ThreadRecord {
    let mut t = thread(tid, Some(holder));
    t.waiting_on = Some(WaitTarget {
      holder_tid: holder.into(),
      holder_pid: Some(holder_pid.into()),
    });
    t
  }

  #[test]
  fn three_thread_cycle_is_detected_once() {
    let threads = vec![
      thread("1", Some("2")),
      thread("2", Some("3")),
      thread("3", Some("1")),
    ];
    let graph = WaitForGraph::build(&threads);
    let report = detect(&graph, &threads, None, &Config::default());

    assert!(report.has_deadlock);
    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.cycles[0].tids, vec!["1", "2", "3"]);
    assert!(!report.cross_process);
  }

  #[test]
  fn linear_chain_has_no_deadlock() {
    let threads = vec![thread("1", Some("2")), thread("2", Some("3")), thread("3", None)];
    let graph = WaitForGraph::build(&threads);
    let report = detect(&graph, &threads, None, &Config::default());

    assert!(!report.has_deadlock);
    assert!(report.cycles.is_empty());
  }

  #[test]
  fn cycle_order_is_stable_under_input_reordering() {
    let a = vec![thread("1", Some("2")), thread("2", Some("3")), thread("3", Some("1"))];
    let b = vec![thread("3", Some("1")), thread("1", Some("2")), thread("2", Some("3"))];

    let ra = detect(&WaitForGraph::build(&a), &a, None, &Config::default());
    let rb = detect(&WaitForGraph::build(&b), &b, None, &Config::default());
    assert_eq!(ra.cycles, rb.cycles);
  }

  #[test]
  fn normalization_starts_at_smallest_tid() {
    let threads = vec![
      thread("12", Some("7")),
      thread("7", Some("30")),
      thread("30", Some("12")),
    ];
    let graph = WaitForGraph::build(&threads);
    let report = detect(&graph, &threads, None, &Config::default());
    assert_eq!(report.cycles[0].tids, vec!["7", "30", "12"]);
  }

  #[test]
  fn two_independent_cycles_both_reported() {
    let threads = vec![
      thread("1", Some("2")),
      thread("2", Some("1")),
      thread("8", Some("9")),
      thread("9", Some("8")),
    ];
    let graph = WaitForGraph::build(&threads);
    let report = detect(&graph, &threads, None, &Config::default());

    assert_eq!(report.cycles.len(), 2);
    assert_eq!(report.cycles[0].tids, vec!["1", "2"]);
    assert_eq!(report.cycles[1].tids, vec!["8", "9"]);
  }

  #[test]
  fn cross_process_cycle_is_flagged() {
    let threads = vec![cross_thread("1", "2", "999"), thread("2", Some("1"))];
    let graph = WaitForGraph::build(&threads);
    let report = detect(&graph, &threads, Some("1234"), &Config::default());

    assert!(report.has_deadlock);
    assert!(report.cross_process);
  }

  #[test]
  fn same_process_holder_pid_is_not_cross_process() {
    let threads = vec![cross_thread("1", "2", "1234"), thread("2", Some("1"))];
    let graph = WaitForGraph::build(&threads);
    let report = detect(&graph, &threads, Some("1234"), &Config::default());
    assert!(!report.cross_process);
  }

  #[test]
  fn empty_graph_returns_empty_findings() {
    let graph = WaitForGraph::build(&[]);
    let report = detect(&graph, &[], None, &Config::default());
    assert!(!report.has_deadlock);
    assert!(report.cycles.is_empty());
    assert!(report.priority_inversions.is_empty());
  }

  #[test]
  fn priority_inversion_without_cycle() {
    let mut high = thread("1", None);
    high.priority = Some(2);
    high.waiting_locks = vec!["0x1000".into()];
    let mut low = thread("19", None);
    low.priority = Some(9);
    low.held_locks = vec!["0x1000".into(), "0x2000".into()];

    let threads = vec![high, low];
    let graph = WaitForGraph::build(&threads);
    let report = detect(&graph, &threads, None, &Config::default());

    assert!(!report.has_deadlock);
    assert_eq!(report.priority_inversions.len(), 1);
    let inv = &report.priority_inversions[0];
    assert_eq!(inv.high_tid, "1");
    assert_eq!(inv.low_tid, "19");
    assert_eq!(inv.locks, vec!["0x1000".to_string()]);
  }

  #[test]
  fn mid_priority_pair_is_not_inverted() {
    let mut a = thread("1", None);
    a.priority = Some(6);
    a.waiting_locks = vec!["0x1000".into()];
    let mut b = thread("2", None);
    b.priority = Some(7);
    b.held_locks = vec!["0x1000".into()];

    let threads = vec![a, b];
    let graph = WaitForGraph::build(&threads);
    let report = detect(&graph, &threads, None, &Config::default());
    assert!(report.priority_inversions.is_empty());
  }
}
