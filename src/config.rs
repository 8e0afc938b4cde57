use std::env;
use std::time::Duration;

/// Process-wide protocol configuration. Intervals are fixed per process,
/// not per call; only `wait_for_completion` takes a caller timeout.
#[derive(Debug, Clone)]
pub struct Config {
  /// Identity of the shared comment thread used as the coordination channel.
  pub thread_id: String,
  pub run_id: String,
  pub job_id: String,
  /// Wait after an optimistic append before reading back competing entries.
  pub settle_delay: Duration,
  pub heartbeat_interval: Duration,
  /// Peers whose last heartbeat is older than this are excluded from discovery.
  pub peer_ttl: Duration,
  pub poll_interval: Duration,
  pub completion_timeout: Duration,
}

impl Config {
  pub fn from_env() -> Self {
    Self {
      thread_id: env::var("COORD_THREAD_ID").unwrap_or_else(|_| "coordination".into()),
      run_id: env::var("COORD_RUN_ID").unwrap_or_else(|_| "local".into()),
      job_id: env::var("COORD_JOB_ID").unwrap_or_else(|_| "0".into()),
      settle_delay: secs_from_env("COORD_SETTLE_DELAY_SECS", 2),
      heartbeat_interval: secs_from_env("COORD_HEARTBEAT_SECS", 60),
      peer_ttl: secs_from_env("COORD_PEER_TTL_SECS", 300),
      poll_interval: secs_from_env("COORD_POLL_SECS", 30),
      completion_timeout: secs_from_env("COORD_COMPLETION_TIMEOUT_SECS", 3600),
    }
  }

  pub fn node_id(&self) -> String {
    format!("{}-{}", self.run_id, self.job_id)
  }
}

fn secs_from_env(key: &str, default: u64) -> Duration {
  let secs = env::var(key)
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(default);
  Duration::from_secs(secs)
}
