//! Wait-for graph: "thread A is blocked on a resource held by thread B".
//!
//! Built from one incident's thread records only; edges never cross
//! incidents and a holder is never fabricated for an unresolved wait.

use std::collections::HashMap;

use crate::types::{tid_cmp, ThreadRecord};

/// One resolved wait edge. `holder_pid` is present only when the holder
/// lives in another process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitEdge {
  pub from: String,
  pub to: String,
  pub holder_pid: Option<String>,
}

/// Directed wait-for graph with adjacency in both directions.
#[derive(Debug, Clone, Default)]
pub struct WaitForGraph {
  /// tid -> the single holder it waits on.
  pub waits_on: HashMap<String, String>,
  /// holder tid -> sorted tids of its direct waiters.
  pub blocked_by: HashMap<String, Vec<String>>,
  pub edges: Vec<WaitEdge>,
  /// Threads with non-empty waiting locks but no resolvable holder (sorted).
  pub unresolved_waits: Vec<String>,
  /// Records dropped for missing a tid.
  pub skipped_records: usize,
}

impl WaitForGraph {
  /// Build the graph from one incident's thread records.
  ///
  /// A record contributes an edge only when `waiting_on.holder_tid` is
  /// resolved; records missing a tid are skipped entirely.
  pub fn build(threads: &[ThreadRecord]) -> Self {
    let mut graph = Self::default();

    for thread in threads {
      if thread.tid.is_empty() {
        graph.skipped_records += 1;
        continue;
      }

      match &thread.waiting_on {
        Some(target) if !target.holder_tid.is_empty() => {
          graph
            .waits_on
            .insert(thread.tid.clone(), target.holder_tid.clone());
          graph
            .blocked_by
            .entry(target.holder_tid.clone())
            .or_default()
            .push(thread.tid.clone());
          graph.edges.push(WaitEdge {
            from: thread.tid.clone(),
            to: target.holder_tid.clone(),
            holder_pid: target.holder_pid.clone(),
          });
        }
        _ => {
          if !thread.waiting_locks.is_empty() {
            graph.unresolved_waits.push(thread.tid.clone());
          }
        }
      }
    }

    for waiters in graph.blocked_by.values_mut() {
      waiters.sort_by(|a, b| tid_cmp(a, b));
    }
    graph.unresolved_waits.sort_by(|a, b| tid_cmp(a, b));
    graph
      .edges
      .sort_by(|a, b| tid_cmp(&a.from, &b.from).then_with(|| tid_cmp(&a.to, &b.to)));

    graph
  }

  /// All tids participating in at least one edge, sorted.
  pub fn nodes(&self) -> Vec<String> {
    let mut nodes: Vec<String> = self
      .edges
      .iter()
      .flat_map(|e| [e.from.clone(), e.to.clone()])
      .collect();
    nodes.sort_by(|a, b| tid_cmp(a, b));
    nodes.dedup();
    nodes
  }

  /// The edge from `from` to `to`, if present.
  pub fn edge(&self, from: &str, to: &str) -> Option<&WaitEdge> {
    self.edges.iter().find(|e| e.from == from && e.to == to)
  }
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

  #[test]
  fn builds_both_directions() {
    let threads = vec![thread("1", Some("5")), thread("3", Some("5")), thread("5", None)];
    let graph = WaitForGraph::build(&threads);

    assert_eq!(graph.waits_on.get("1"), Some(&"5".to_string()));
    assert_eq!(graph.waits_on.get("3"), Some(&"5".to_string()));
    assert_eq!(graph.blocked_by.get("5"), Some(&vec!["1".to_string(), "3".to_string()]));
    assert_eq!(graph.edges.len(), 2);
  }

  #[test]
  fn unresolved_wait_produces_no_edge() {
    let mut t = thread("7", None);
    t.waiting_locks = vec!["0xdead".into()];
    let graph = WaitForGraph::build(&[t]);

    assert!(graph.edges.is_empty());
    assert_eq!(graph.unresolved_waits, vec!["7".to_string()]);
  }

  #[test]
  fn record_without_tid_is_skipped() {
    let mut t = thread("", Some("2"));
    t.waiting_locks = vec!["0xbeef".into()];
    let graph = WaitForGraph::build(&[t, thread("2", None)]);

    assert_eq!(graph.skipped_records, 1);
    assert!(graph.edges.is_empty());
    assert!(graph.unresolved_waits.is_empty());
  }

  #[test]
  fn empty_input_empty_graph() {
    let graph = WaitForGraph::build(&[]);
    assert!(graph.edges.is_empty());
    assert!(graph.nodes().is_empty());
    assert_eq!(graph.skipped_records, 0);
  }

  #[test]
  fn rebuild_is_identical() {
    let threads = vec![thread("2", Some("1")), thread("10", Some("2")), thread("1", None)];
    let a = WaitForGraph::build(&threads);
    let b = WaitForGraph::build(&threads);
    assert_eq!(a.edges, b.edges);
    assert_eq!(a.nodes(), b.nodes());
  }
}
