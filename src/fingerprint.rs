//! Stable fingerprints and incident ids, hashed with blake3.

use chrono::{DateTime, Utc};

/// Strip the parts of a frame that vary between builds of the same bug
/// site: `#NN` ordinals, `pc <addr>` prefixes, and `+<offset>` suffixes.
fn canonical_frame(frame: &str) -> String {
  let mut tokens: Vec<&str> = frame.split_whitespace().collect();

  if let Some(first) = tokens.first() {
    if first.starts_with('#') {
      tokens.remove(0);
    }
  }
  if tokens.first() == Some(&"pc") {
    tokens.remove(0);
    // The address token follows "pc".
    if !tokens.is_empty() {
      tokens.remove(0);
    }
  }

  let joined = tokens.join(" ");
  match joined.rfind('+') {
    Some(pos)
      if !joined[pos + 1..].trim_end_matches(')').is_empty()
        && joined[pos + 1..].trim_end_matches(')').chars().all(|c| c.is_ascii_digit()) =>
    {
      let mut s = joined[..pos].to_string();
      if joined.ends_with(')') {
        s.push(')');
      }
      s
    }
    _ => joined,
  }
}

/// Compute a stable fingerprint from the top `max_frames` stack frames.
///
/// Frames are canonicalized first so the same bug site hashes identically
/// across builds. Returns 32 hex chars.
pub fn stack_fingerprint(frames: &[&str], max_frames: usize) -> String {
  let mut hasher = blake3::Hasher::new();
  for frame in frames.iter().take(max_frames) {
    hasher.update(canonical_frame(frame).as_bytes());
    hasher.update(b"|");
  }
  let hex = hasher.finalize().to_hex();
  hex[..32].to_string()
}

/// Stable incident id: "inc-" + 16 hex chars from process, path, and time.
pub fn incident_id(
  process_name: &str,
  file_path: &str,
  timestamp: Option<&DateTime<Utc>>,
) -> String {
  let mut hasher = blake3::Hasher::new();
  hasher.update(process_name.as_bytes());
  hasher.update(b"|");
  hasher.update(file_path.as_bytes());
  hasher.update(b"|");
  if let Some(ts) = timestamp {
    hasher.update(ts.format("%Y-%m-%dT%H:%M:%S").to_string().as_bytes());
  }
  let hex = hasher.finalize().to_hex();
  format!("inc-{}", &hex[..16])
}
