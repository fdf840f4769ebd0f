//! Engine configuration with sane defaults.
//!
//! All thresholds and weight tables live here as immutable values passed by
//! reference into each component; nothing reads module-level state.

/// Similarity weights for ANR incident pairs. Sums to 100.
#[derive(Debug, Clone)]
pub struct AnrWeights {
  pub process_name: f64,
  pub root_cause: f64,
  pub key_stack: f64,
  pub feature_tags: f64,
  pub severity: f64,
  pub anr_type: f64,
  pub time_proximity: f64,
}

impl Default for AnrWeights {
  fn default() -> Self {
    Self {
      process_name: 15.0,
      root_cause: 20.0,
      key_stack: 25.0,
      feature_tags: 20.0,
      severity: 5.0,
      anr_type: 5.0,
      time_proximity: 10.0,
    }
  }
}

/// Similarity weights for Tombstone incident pairs. Sums to 100.
#[derive(Debug, Clone)]
pub struct TombstoneWeights {
  pub stack: f64,
  pub crash_function: f64,
  pub process_name: f64,
  pub root_cause: f64,
  pub feature_tags: f64,
  pub severity: f64,
  pub signal_type: f64,
}

impl Default for TombstoneWeights {
  fn default() -> Self {
    Self {
      stack: 40.0,
      crash_function: 20.0,
      process_name: 5.0,
      root_cause: 10.0,
      feature_tags: 10.0,
      severity: 5.0,
      signal_type: 10.0,
    }
  }
}

/// Tunable thresholds for graph analysis, scoring, and clustering.
#[derive(Debug, Clone)]
pub struct Config {
  /// Numeric priority at or below which a thread counts as high-priority.
  pub high_priority_max: i32,
  /// Numeric priority at or above which a thread counts as low-priority.
  pub low_priority_min: i32,
  /// Blocking chains with more impacted threads than this are "high".
  pub impact_high_threshold: usize,
  /// Max nodes shown in a critical path before "+N more" truncation.
  pub critical_path_display_cap: usize,
  /// The designated main thread tid.
  pub main_thread_tid: String,
  /// Max stack frames hashed into a fingerprint.
  pub fingerprint_max_frames: usize,
  /// Byte window within which two program counters count as matching.
  pub pc_window: u64,
  /// Clustering radius for ANR incidents (distance = 100 - score).
  pub anr_eps: f64,
  /// Clustering radius for Tombstone incidents; tighter than ANR.
  pub tombstone_eps: f64,
  /// Minimum cluster size; 1 means every incident lands in some group.
  pub min_cluster_size: usize,
  /// Score returned when both stack fingerprints are present and equal.
  pub fingerprint_short_circuit_score: f64,
  /// Time-proximity tiers: within `time_full_secs` scores 1.0, within
  /// `time_near_secs` scores `time_near_credit`, within `time_far_secs`
  /// scores `time_far_credit`, else 0.
  pub time_full_secs: i64,
  pub time_near_secs: i64,
  pub time_far_secs: i64,
  pub time_near_credit: f64,
  pub time_far_credit: f64,
  /// Max chars of an abort message used in a cluster title.
  pub title_max_len: usize,
  pub anr_weights: AnrWeights,
  pub tombstone_weights: TombstoneWeights,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      high_priority_max: 5,
      low_priority_min: 8,
      impact_high_threshold: 3,
      critical_path_display_cap: 8,
      main_thread_tid: "1".to_string(),
      fingerprint_max_frames: 5,
      pc_window: 4096,
      anr_eps: 35.0,
      tombstone_eps: 25.0,
      min_cluster_size: 1,
      fingerprint_short_circuit_score: 95.0,
      time_full_secs: 60,
      time_near_secs: 300,
      time_far_secs: 3600,
      time_near_credit: 0.7,
      time_far_credit: 0.3,
      title_max_len: 60,
      anr_weights: AnrWeights::default(),
      tombstone_weights: TombstoneWeights::default(),
    }
  }
}
