//! Blocking chains and critical paths over the wait-for graph.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::Config;
use crate::graph::WaitForGraph;
use crate::types::{tid_cmp, BlockingChain, CriticalPath, Severity, ThreadRecord};

/// Rank root blockers by the set of threads transitively stuck behind them.
///
/// A root blocker holds at least one waiter and is not itself waiting;
/// threads inside a deadlock cycle are reported by the cycle detector
/// instead. Chains are sorted by (high-priority blocked desc, impact desc),
/// then blocker tid to make the order total.
pub fn blocking_chains(
  graph: &WaitForGraph,
  threads: &[ThreadRecord],
  config: &Config,
) -> Vec<BlockingChain> {
  let priorities: HashMap<&str, i32> = threads
    .iter()
    .filter_map(|t| t.priority.map(|p| (t.tid.as_str(), p)))
    .collect();

  let mut chains: Vec<BlockingChain> = graph
    .blocked_by
    .keys()
    .filter(|holder| !graph.waits_on.contains_key(*holder))
    .map(|holder| {
      let blocked = impact_set(graph, holder);
      let impact_count = blocked.len();
      let high_priority_blocked_count = blocked
        .iter()
        .filter(|tid| {
          priorities
            .get(tid.as_str())
            .is_some_and(|p| *p <= config.high_priority_max)
        })
        .count();

      let severity = if high_priority_blocked_count > 0 {
        Severity::Critical
      } else if impact_count > config.impact_high_threshold {
        Severity::High
      } else {
        Severity::Medium
      };

      let mut blocked_tids: Vec<String> = blocked.into_iter().collect();
      blocked_tids.sort_by(|a, b| tid_cmp(a, b));

      BlockingChain {
        blocker_tid: holder.clone(),
        blocked_tids,
        impact_count,
        high_priority_blocked_count,
        severity,
      }
    })
    .collect();

  chains.sort_by(|a, b| {
    b.high_priority_blocked_count
      .cmp(&a.high_priority_blocked_count)
      .then_with(|| b.impact_count.cmp(&a.impact_count))
      .then_with(|| tid_cmp(&a.blocker_tid, &b.blocker_tid))
  });
  chains
}

/// Everyone transitively blocked on `holder`, via breadth-first traversal
/// of reverse wait edges.
fn impact_set(graph: &WaitForGraph, holder: &str) -> HashSet<String> {
  let mut seen: HashSet<String> = HashSet::new();
  let mut queue: VecDeque<&str> = VecDeque::new();
  queue.push_back(holder);

  while let Some(current) = queue.pop_front() {
    if let Some(waiters) = graph.blocked_by.get(current) {
      for waiter in waiters {
        if waiter != holder && seen.insert(waiter.clone()) {
          queue.push_back(waiter);
        }
      }
    }
  }
  seen
}

/// Wait chains worth showing: the walk from the main thread, plus the
/// single globally longest walk when it differs.
///
/// A walk follows forward wait edges until a node has no outgoing edge or
/// an already-visited node recurs (cycle boundary — the path stops, it
/// never loops). Walks over the display cap are truncated with an explicit
/// omitted count.
pub fn critical_paths(graph: &WaitForGraph, config: &Config) -> Vec<CriticalPath> {
  let main_walk = walk(graph, &config.main_thread_tid);

  let mut longest: Vec<String> = Vec::new();
  for node in graph.nodes() {
    let candidate = walk(graph, &node);
    if candidate.len() > longest.len() {
      longest = candidate;
    }
  }

  let mut paths = Vec::new();
  if main_walk.len() >= 2 {
    paths.push(truncate(main_walk.clone(), config));
  }
  if longest.len() >= 2 && longest != main_walk {
    paths.push(truncate(longest, config));
  }
  paths
}

fn walk(graph: &WaitForGraph, start: &str) -> Vec<String> {
  if !graph.waits_on.contains_key(start) {
    return Vec::new();
  }
  let mut visited: HashSet<String> = HashSet::new();
  let mut tids = vec![start.to_string()];
  visited.insert(start.to_string());

  let mut current = start.to_string();
  while let Some(next) = graph.waits_on.get(&current) {
    if !visited.insert(next.clone()) {
      break;
    }
    tids.push(next.clone());
    current = next.clone();
  }
  tids
}

fn truncate(tids: Vec<String>, config: &Config) -> CriticalPath {
  let cap = config.critical_path_display_cap;
  if tids.len() <= cap {
    CriticalPath { tids, omitted: 0 }
  } else {
    let omitted = tids.len() - cap;
    CriticalPath {
      tids: tids.into_iter().take(cap).collect(),
      omitted,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{ThreadState, WaitTarget};

  fn thread(tid: &str, priority: Option<i32>, waiting_on: Option<&str>) -> ThreadRecord {
    ThreadRecord {
      tid: tid.into(),
      name: format!("Thread-{}", tid),
      priority,
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
  fn linear_chain_reports_single_root_blocker() {
    let threads = vec![
      thread("1", None, Some("2")),
      thread("2", None, Some("3")),
      thread("3", None, None),
    ];
    let graph = WaitForGraph::build(&threads);
    let chains = blocking_chains(&graph, &threads, &Config::default());

    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].blocker_tid, "3");
    assert_eq!(chains[0].impact_count, 2);
    assert_eq!(chains[0].blocked_tids, vec!["1", "2"]);
  }

  #[test]
  fn chain_severity_follows_fixed_rule() {
    // Main thread (priority 5) stuck behind "9": critical.
    let threads = vec![thread("1", Some(5), Some("9")), thread("9", Some(5), None)];
    let graph = WaitForGraph::build(&threads);
    let chains = blocking_chains(&graph, &threads, &Config::default());
    assert_eq!(chains[0].severity, Severity::Critical);
    assert_eq!(chains[0].high_priority_blocked_count, 1);

    // Five low-priority waiters: high.
    let threads: Vec<ThreadRecord> = (2..=5)
      .map(|i| thread(&i.to_string(), Some(9), Some("9")))
      .chain([thread("9", Some(9), None)])
      .collect();
    let graph = WaitForGraph::build(&threads);
    let chains = blocking_chains(&graph, &threads, &Config::default());
    assert_eq!(chains[0].impact_count, 4);
    assert_eq!(chains[0].severity, Severity::High);

    // One low-priority waiter: medium.
    let threads = vec![thread("2", Some(9), Some("9")), thread("9", Some(9), None)];
    let graph = WaitForGraph::build(&threads);
    let chains = blocking_chains(&graph, &threads, &Config::default());
    assert_eq!(chains[0].severity, Severity::Medium);
  }

  #[test]
  fn chains_sorted_by_high_priority_then_impact() {
    // Blocker "50": 2 waiters, one high-priority.
    // Blocker "60": 3 waiters, none high-priority.
    let threads = vec![
      thread("1", Some(2), Some("50")),
      thread("20", Some(9), Some("50")),
      thread("30", Some(9), Some("60")),
      thread("31", Some(9), Some("60")),
      thread("32", Some(9), Some("60")),
      thread("50", Some(9), None),
      thread("60", Some(9), None),
    ];
    let graph = WaitForGraph::build(&threads);
    let chains = blocking_chains(&graph, &threads, &Config::default());

    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].blocker_tid, "50");
    assert_eq!(chains[1].blocker_tid, "60");
    assert!(chains[0].impact_count < chains[1].impact_count);
  }

  #[test]
  fn transitive_waiters_are_counted() {
    let threads = vec![
      thread("1", None, Some("2")),
      thread("2", None, Some("3")),
      thread("4", None, Some("3")),
      thread("3", None, None),
    ];
    let graph = WaitForGraph::build(&threads);
    let chains = blocking_chains(&graph, &threads, &Config::default());

    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].blocker_tid, "3");
    assert_eq!(chains[0].impact_count, 3);
    assert_eq!(chains[0].blocked_tids, vec!["1", "2", "4"]);
  }

  #[test]
  fn main_thread_walk_is_reported_first() {
    let threads = vec![
      thread("1", None, Some("7")),
      thread("7", None, Some("9")),
      thread("9", None, None),
    ];
    let graph = WaitForGraph::build(&threads);
    let paths = critical_paths(&graph, &Config::default());

    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].tids, vec!["1", "7", "9"]);
    assert_eq!(paths[0].omitted, 0);
  }

  #[test]
  fn globally_longest_walk_is_also_reported() {
    let threads = vec![
      thread("1", None, Some("9")),
      thread("9", None, None),
      thread("4", None, Some("5")),
      thread("5", None, Some("6")),
      thread("6", None, Some("7")),
      thread("7", None, None),
    ];
    let graph = WaitForGraph::build(&threads);
    let paths = critical_paths(&graph, &Config::default());

    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0].tids, vec!["1", "9"]);
    assert_eq!(paths[1].tids, vec!["4", "5", "6", "7"]);
  }

  #[test]
  fn walk_stops_at_cycle_boundary() {
    let threads = vec![
      thread("1", None, Some("2")),
      thread("2", None, Some("3")),
      thread("3", None, Some("2")),
    ];
    let graph = WaitForGraph::build(&threads);
    let paths = critical_paths(&graph, &Config::default());

    // 1 -> 2 -> 3, then the edge back to 2 is a revisit: stop, no loop.
    assert_eq!(paths[0].tids, vec!["1", "2", "3"]);
  }

  #[test]
  fn long_walk_is_truncated_with_marker() {
    let mut threads: Vec<ThreadRecord> = (1..=11)
      .map(|i| thread(&i.to_string(), None, Some(&(i + 1).to_string())))
      .collect();
    threads.push(thread("12", None, None));

    let graph = WaitForGraph::build(&threads);
    let config = Config::default();
    let paths = critical_paths(&graph, &config);

    assert_eq!(paths[0].tids.len(), config.critical_path_display_cap);
    assert_eq!(paths[0].omitted, 12 - config.critical_path_display_cap);
    assert!(paths[0].display().ends_with("+4 more"));
  }

  #[test]
  fn no_edges_no_paths() {
    let graph = WaitForGraph::build(&[]);
    assert!(critical_paths(&graph, &Config::default()).is_empty());
    assert!(blocking_chains(&graph, &[], &Config::default()).is_empty());
  }
}
