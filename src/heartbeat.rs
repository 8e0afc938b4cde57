use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;
use crate::coordinator::Coordinator;
use crate::ticker::{Cancel, Ticker};

/// Owns the background heartbeat loop of one node.
pub struct HeartbeatHandle {
  cancel: Cancel,
  handle: JoinHandle<()>,
}

/// Start the liveness loop: emit a heartbeat, wait one interval, repeat until
/// cancelled. A failed heartbeat is logged and the loop keeps going.
pub fn spawn_heartbeat(coordinator: Arc<Coordinator>) -> HeartbeatHandle {
  let (cancel, mut ticker) = Ticker::new(coordinator.config().heartbeat_interval);
  let handle = tokio::spawn(async move {
    loop {
      if let Err(e) = coordinator.heartbeat().await {
        error!("heartbeat failed: {}", e);
      }
      if !ticker.tick().await {
        break;
      }
    }
    // Best effort; depart() swallows its own failure.
    coordinator.depart().await;
  });
  HeartbeatHandle { cancel, handle }
}

impl HeartbeatHandle {
  /// Stop the loop and wait for its departure note. Never blocks on the
  /// channel beyond the append attempt already bounded by its retry budget.
  pub async fn shutdown(self) {
    self.cancel.cancel();
    let _ = self.handle.await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::{ChannelClient, MemoryChannel};
  use crate::codec::{self, Message};
  use crate::config::Config;
  use std::time::Duration;

  fn test_config() -> Config {
    Config {
      thread_id: "t".into(),
      run_id: "run".into(),
      job_id: "hb".into(),
      settle_delay: Duration::from_secs(2),
      heartbeat_interval: Duration::from_secs(60),
      peer_ttl: Duration::from_secs(300),
      poll_interval: Duration::from_secs(30),
      completion_timeout: Duration::from_secs(3600),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn emits_heartbeats_and_departs_on_shutdown() {
    let channel = MemoryChannel::new();
    let coordinator = Arc::new(Coordinator::new(channel.clone(), test_config()));
    coordinator.announce(crate::models::NodeStatus::Ready, None).await.unwrap();

    let handle = spawn_heartbeat(coordinator.clone());
    tokio::time::sleep(Duration::from_secs(130)).await;
    handle.shutdown().await;

    let entries = channel.list().await.unwrap();
    let heartbeats = entries
      .iter()
      .filter(|e| matches!(codec::decode(&e.body), Some(Message::Heartbeat(_))))
      .count();
    // One immediate beat plus one per elapsed interval.
    assert!(heartbeats >= 3, "expected >= 3 heartbeats, saw {}", heartbeats);

    // Shutdown appended a departure announcement after the initial one.
    let announces = entries
      .iter()
      .filter(|e| matches!(codec::decode(&e.body), Some(Message::NodeAnnounce(_))))
      .count();
    assert_eq!(announces, 2);
  }

  #[tokio::test(start_paused = true)]
  async fn shutdown_is_prompt_mid_interval() {
    let channel = MemoryChannel::new();
    let coordinator = Arc::new(Coordinator::new(channel, test_config()));

    let handle = spawn_heartbeat(coordinator);
    tokio::time::sleep(Duration::from_secs(1)).await;
    // Well inside the first 60s interval; must not wait it out.
    handle.shutdown().await;
  }
}
