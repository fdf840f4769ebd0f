//! Pairwise incident similarity: a fixed deterministic weighted formula.
//!
//! `score` is total: kind mismatch scores 0, missing fields degrade to a
//! zero contribution, and two mutually absent fields compare as equal —
//! that last rule is what keeps `score(a, a) == 100` for every record.

use std::collections::HashSet;

use crate::config::Config;
use crate::types::{IncidentDetails, IncidentKind, IncidentRecord};

/// Score two incidents in [0, 100]. Symmetric; 0 across kinds.
pub fn score(a: &IncidentRecord, b: &IncidentRecord, config: &Config) -> f64 {
  if a.kind() != b.kind() {
    return 0.0;
  }
  if a.id == b.id {
    return 100.0;
  }
  match a.kind() {
    IncidentKind::Anr => AnrScorer.score_pair(a, b, config),
    IncidentKind::Tombstone => TombstoneScorer.score_pair(a, b, config),
  }
}

/// One scorer per incident kind, sharing the sub-score primitives below.
trait KindScorer {
  fn score_pair(&self, a: &IncidentRecord, b: &IncidentRecord, config: &Config) -> f64;
}

struct AnrScorer;

impl KindScorer for AnrScorer {
  fn score_pair(&self, a: &IncidentRecord, b: &IncidentRecord, config: &Config) -> f64 {
    let w = &config.anr_weights;
    let (anr_type_a, anr_type_b) = match (&a.details, &b.details) {
      (IncidentDetails::Anr { anr_type: x, .. }, IncidentDetails::Anr { anr_type: y, .. }) => (x, y),
      _ => return 0.0,
    };

    w.process_name * exact_match(&a.process_name, &b.process_name)
      + w.root_cause * text_similarity(&a.root_cause_text, &b.root_cause_text)
      + w.key_stack * stack_similarity(&a.key_stack_text, &b.key_stack_text, config)
      + w.feature_tags * jaccard(&a.feature_tags, &b.feature_tags)
      + w.severity * bool_score(a.severity_hint == b.severity_hint)
      + w.anr_type * exact_match(anr_type_a, anr_type_b)
      + w.time_proximity * time_proximity(a, b, config)
  }
}

struct TombstoneScorer;

impl KindScorer for TombstoneScorer {
  fn score_pair(&self, a: &IncidentRecord, b: &IncidentRecord, config: &Config) -> f64 {
    let (sig_a, func_a, fp_a, sig_b, func_b, fp_b) = match (&a.details, &b.details) {
      (
        IncidentDetails::Tombstone {
          signal_type: sig_a,
          crash_function: func_a,
          stack_fingerprint: fp_a,
          ..
        },
        IncidentDetails::Tombstone {
          signal_type: sig_b,
          crash_function: func_b,
          stack_fingerprint: fp_b,
          ..
        },
      ) => (sig_a, func_a, fp_a, sig_b, func_b, fp_b),
      _ => return 0.0,
    };

    // Equal fingerprints mean "very likely the same bug site": short-circuit
    // past the weighted sum.
    if let (Some(x), Some(y)) = (fp_a, fp_b) {
      if !x.is_empty() && x == y {
        return config.fingerprint_short_circuit_score;
      }
    }

    let w = &config.tombstone_weights;
    w.stack * stack_similarity(&a.key_stack_text, &b.key_stack_text, config)
      + w.crash_function * exact_match(&strip_offset(func_a), &strip_offset(func_b))
      + w.process_name * exact_match(&a.process_name, &b.process_name)
      + w.root_cause * text_similarity(&a.root_cause_text, &b.root_cause_text)
      + w.feature_tags * jaccard(&a.feature_tags, &b.feature_tags)
      + w.severity * bool_score(a.severity_hint == b.severity_hint)
      + w.signal_type * exact_match(sig_a, sig_b)
  }
}

// ---------------------------------------------------------------------------
// Sub-score primitives
// ---------------------------------------------------------------------------

fn bool_score(matched: bool) -> f64 {
  if matched {
    1.0
  } else {
    0.0
  }
}

/// 1.0 when the strings are equal (including both empty), else 0.
fn exact_match(a: &str, b: &str) -> f64 {
  bool_score(a == b)
}

/// Blend of token-set Jaccard (0.4), edit-distance ratio over the first
/// 100 chars (0.4), and substring containment (0.2).
pub fn text_similarity(a: &str, b: &str) -> f64 {
  if a.is_empty() && b.is_empty() {
    return 1.0;
  }
  if a.is_empty() || b.is_empty() {
    return 0.0;
  }

  let token_score = {
    let ta = tokens(a);
    let tb = tokens(b);
    set_jaccard(&ta, &tb)
  };

  let edit_score = {
    let ca: Vec<char> = a.chars().take(100).collect();
    let cb: Vec<char> = b.chars().take(100).collect();
    let longest = ca.len().max(cb.len());
    if longest == 0 {
      1.0
    } else {
      1.0 - levenshtein(&ca, &cb) as f64 / longest as f64
    }
  };

  let containment_score = if a.contains(b) || b.contains(a) {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() as f64 / long.len() as f64
  } else {
    0.0
  };

  0.4 * token_score + 0.4 * edit_score + 0.2 * containment_score
}

/// Compare two key stacks.
///
/// Native frames ("pc <addr> <library> (<function>)") are compared on
/// library, offset-stripped function, and address proximity. Anything else
/// falls back to hierarchical class/method comparison blended with keyword
/// overlap and a categorical problem-pattern match.
pub fn stack_similarity(a: &str, b: &str, config: &Config) -> f64 {
  if a.is_empty() && b.is_empty() {
    return 1.0;
  }
  if a.is_empty() || b.is_empty() {
    return 0.0;
  }

  if let (Some(fa), Some(fb)) = (parse_native_frame(a), parse_native_frame(b)) {
    let library_score = if fa.library == fb.library {
      1.0
    } else if basename(&fa.library) == basename(&fb.library) {
      0.3
    } else {
      0.0
    };

    let func_a = strip_offset(&fa.function);
    let func_b = strip_offset(&fb.function);
    let function_score = if func_a == func_b {
      1.0
    } else if unqualified(&func_a) == unqualified(&func_b) {
      0.3
    } else {
      0.0
    };

    let pc_score = if fa.addr.abs_diff(fb.addr) <= config.pc_window {
      1.0
    } else {
      0.0
    };

    return 0.4 * library_score + 0.5 * function_score + 0.1 * pc_score;
  }

  let hierarchy_score = match (parse_class_method(a), parse_class_method(b)) {
    (Some(ma), Some(mb)) => {
      if ma.class == mb.class && ma.method == mb.method {
        1.0
      } else if ma.class == mb.class {
        0.6
      } else if !ma.package.is_empty() && ma.package == mb.package {
        0.3
      } else {
        0.0
      }
    }
    _ => 0.0,
  };

  let keyword_score = set_jaccard(&tokens(a), &tokens(b));

  let tag_score = match (problem_pattern(a), problem_pattern(b)) {
    (Some(x), Some(y)) => bool_score(x == y),
    (None, None) => 1.0,
    _ => 0.0,
  };

  (hierarchy_score + keyword_score + tag_score) / 3.0
}

/// |intersection| / |union| over tag slices; 1.0 when both are empty.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
  let sa: HashSet<&str> = a.iter().map(String::as_str).collect();
  let sb: HashSet<&str> = b.iter().map(String::as_str).collect();
  if sa.is_empty() && sb.is_empty() {
    return 1.0;
  }
  let intersection = sa.intersection(&sb).count();
  let union = sa.union(&sb).count();
  intersection as f64 / union as f64
}

/// Tiered credit for incidents close in time; both-missing timestamps
/// compare as equal, one-missing contributes 0.
fn time_proximity(a: &IncidentRecord, b: &IncidentRecord, config: &Config) -> f64 {
  match (&a.timestamp, &b.timestamp) {
    (Some(x), Some(y)) => {
      let diff = (*x - *y).num_seconds().abs();
      if diff < config.time_full_secs {
        1.0
      } else if diff < config.time_near_secs {
        config.time_near_credit
      } else if diff < config.time_far_secs {
        config.time_far_credit
      } else {
        0.0
      }
    }
    (None, None) => 1.0,
    _ => 0.0,
  }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

struct NativeFrame {
  addr: u64,
  library: String,
  function: String,
}

/// Parse a tombstone frame like
/// "#00 pc 0000004a2c /system/lib64/libbinder.so (IPCThreadState::transact+204)".
fn parse_native_frame(stack: &str) -> Option<NativeFrame> {
  let line = stack.lines().next()?;
  let tokens: Vec<&str> = line.split_whitespace().collect();
  let pc_pos = tokens.iter().position(|t| *t == "pc")?;

  let addr_token = tokens.get(pc_pos + 1)?;
  let addr = u64::from_str_radix(addr_token.trim_start_matches("0x"), 16).ok()?;
  let library = tokens.get(pc_pos + 2)?.to_string();

  let open = line.find('(')?;
  let close = line.rfind(')')?;
  if close <= open {
    return None;
  }
  let function = line[open + 1..close].to_string();

  Some(NativeFrame {
    addr,
    library,
    function,
  })
}

struct ClassMethod {
  package: String,
  class: String,
  method: String,
}

/// Extract package/class/method from a managed frame like
/// "at com.example.app.MainActivity.onCreate(MainActivity.java:42)".
fn parse_class_method(stack: &str) -> Option<ClassMethod> {
  let line = stack.lines().next()?.trim();
  let line = line.strip_prefix("at ").unwrap_or(line);
  let qualified = match line.find('(') {
    Some(pos) => &line[..pos],
    None => line,
  };

  let parts: Vec<&str> = qualified.split('.').collect();
  if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
    return None;
  }
  let method = parts[parts.len() - 1].to_string();
  let class = parts[parts.len() - 2].to_string();
  let package = parts[..parts.len() - 2].join(".");

  Some(ClassMethod {
    package,
    class,
    method,
  })
}

/// Categorical problem pattern of a stack, by keyword.
fn problem_pattern(stack: &str) -> Option<&'static str> {
  let lower = stack.to_ascii_lowercase();
  if lower.contains("binder") {
    Some("binder")
  } else if lower.contains("webview") {
    Some("webview")
  } else if lower.contains("lock") || lower.contains("monitor") || lower.contains("synchroniz") {
    Some("lock")
  } else if lower.contains("socket") || lower.contains("http") || lower.contains("network") {
    Some("network")
  } else if lower.contains("sqlite") || lower.contains("file") || lower.contains("read") || lower.contains("write") {
    Some("io")
  } else if lower.contains("view") || lower.contains("choreographer") || lower.contains("inputdispatch") {
    Some("ui")
  } else {
    None
  }
}

/// "transact+204" -> "transact".
pub fn strip_offset(function: &str) -> String {
  match function.rfind('+') {
    Some(pos)
      if pos > 0
        && !function[pos + 1..].is_empty()
        && function[pos + 1..].chars().all(|c| c.is_ascii_digit()) =>
    {
      function[..pos].to_string()
    }
    _ => function.to_string(),
  }
}

/// Last path segment of a library path.
fn basename(path: &str) -> &str {
  path.rsplit('/').next().unwrap_or(path)
}

/// Unqualified name: the suffix after the last "::" or '.'.
fn unqualified(function: &str) -> &str {
  let after_colons = function.rsplit("::").next().unwrap_or(function);
  after_colons.rsplit('.').next().unwrap_or(after_colons)
}

fn tokens(s: &str) -> HashSet<String> {
  s.to_ascii_lowercase()
    .split(|c: char| !c.is_alphanumeric())
    .filter(|t| !t.is_empty())
    .map(str::to_string)
    .collect()
}

fn set_jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
  if a.is_empty() && b.is_empty() {
    return 1.0;
  }
  let intersection = a.intersection(b).count();
  let union = a.union(b).count();
  intersection as f64 / union as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
  if a.is_empty() {
    return b.len();
  }
  if b.is_empty() {
    return a.len();
  }

  let mut prev: Vec<usize> = (0..=b.len()).collect();
  let mut curr = vec![0usize; b.len() + 1];

  for (i, ca) in a.iter().enumerate() {
    curr[0] = i + 1;
    for (j, cb) in b.iter().enumerate() {
      let cost = if ca == cb { 0 } else { 1 };
      curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
    }
    std::mem::swap(&mut prev, &mut curr);
  }
  prev[b.len()]
}
