use std::time::Duration;

/// Wall clock budget of a solution whose CPU limit is `cpu_time_limit`
pub fn real_time_limit(cpu_time_limit: Duration) -> Duration {
  cpu_time_limit * 3 / 2 + Duration::from_millis(500)
}

/// Cap `ratio` by the runtime decay: full score up to `lambda * time_limit`,
/// then linearly down to 0 at `time_limit`.
pub fn decay_ratio(ratio: f64, runtime: Duration, time_limit: Duration, lambda: f64) -> f64 {
  if lambda >= 1.0 || time_limit.is_zero() {
    return ratio;
  }
  let x = runtime.as_secs_f64();
  let t = time_limit.as_secs_f64();
  ratio.min((x / t - 1.0) / (lambda - 1.0)).max(0.0)
}

pub fn group_score(score: i64, ratio: f64) -> i64 {
  (score as f64 * ratio).round() as i64
}

/// Whether the remaining tests of a group can no longer change its score
pub fn is_group_decided(score: i64, ratio: f64) -> bool {
  ratio < 1e-6 && group_score(score, ratio) == 0
}
