use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::catalog::{self, Catalog};
use crate::channel::ChannelClient;
use crate::codec::{self, Message};
use crate::config::Config;
use crate::election::{claim_ballots, earliest_winner, election_ballots};
use crate::models::{
  Heartbeat, NetworkStatus, Node, NodeStatus, ProgressReport, Task, TaskStatus,
};
use crate::progress;
use crate::registry;

/// Per-process coordination context over one shared comment channel.
///
/// Holds no derived state: leadership is the only flag kept locally, and even
/// that is just the cached outcome of an election replay. Everything else is
/// recomputed from `list()` on demand.
pub struct Coordinator {
  channel: Arc<dyn ChannelClient>,
  config: Config,
  node_id: String,
  started_at: DateTime<Utc>,
  is_leader: AtomicBool,
}

impl Coordinator {
  pub fn new(channel: Arc<dyn ChannelClient>, config: Config) -> Self {
    let node_id = config.node_id();
    Self {
      channel,
      config,
      node_id,
      started_at: Utc::now(),
      is_leader: AtomicBool::new(false),
    }
  }

  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  pub fn is_leader(&self) -> bool {
    self.is_leader.load(Ordering::SeqCst)
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  fn self_node(&self, status: NodeStatus, current_task: Option<String>) -> Node {
    Node {
      node_id: self.node_id.clone(),
      job_id: self.config.job_id.clone(),
      run_id: self.config.run_id.clone(),
      is_leader: self.is_leader(),
      status,
      current_task,
      started_at: self.started_at,
      last_heartbeat: Utc::now(),
    }
  }

  /// Announce this node on the channel. Re-announcing appends a fresh entry;
  /// the previous one stays in the log and is superseded on replay.
  pub async fn announce(&self, status: NodeStatus, current_task: Option<String>) -> Result<()> {
    let node = self.self_node(status, current_task);
    self.channel.append(&codec::encode(&Message::NodeAnnounce(node))).await?;
    info!("announced presence: {}", self.node_id);
    Ok(())
  }

  /// Optimistic leader election: append a ballot, wait out the settle delay,
  /// then replay every ballot and take the earliest by server time. Every
  /// node replaying the same channel state computes the same winner.
  pub async fn elect_leader(&self) -> Result<bool> {
    let ballot = Message::LeaderElection {
      node_id: self.node_id.clone(),
      nonce: Uuid::new_v4().simple().to_string(),
    };
    self.channel.append(&codec::encode(&ballot)).await?;

    sleep(self.config.settle_delay).await;

    let entries = self.channel.list().await?;
    let ballots = election_ballots(&entries);
    let won = earliest_winner(&ballots).is_some_and(|w| w.node_id == self.node_id);
    self.is_leader.store(won, Ordering::SeqCst);

    if won {
      info!("elected leader: {}", self.node_id);
      self.announce(NodeStatus::Ready, None).await?;
    } else {
      debug!("following; leader election lost by {}", self.node_id);
    }
    Ok(won)
  }

  /// Nodes with a heartbeat inside the TTL window. Stale ones remain in the
  /// log but are excluded here.
  pub async fn discover_peers(&self) -> Result<Vec<Node>> {
    let entries = self.channel.list().await?;
    let peers = registry::live_peers(&entries, Utc::now(), self.config.peer_ttl);
    debug!("discovered {} active peers", peers.len());
    Ok(peers)
  }

  /// Publish the full task list: a human-readable summary comment for anyone
  /// reading the thread, then the structured snapshot entry that supersedes
  /// any prior snapshot. The summary carries no marker, so replay skips it.
  /// Leader-only.
  pub async fn publish_tasks(&self, tasks: &[Task]) -> Result<()> {
    if !self.is_leader() {
      bail!("only the leader can publish tasks");
    }
    self.channel.append(&publish_summary(tasks)).await?;
    let snapshot = tasks
      .iter()
      .map(|t| (t.task_id.clone(), t.clone()))
      .collect();
    self.channel.append(&codec::encode(&Message::TasksData(snapshot))).await?;
    info!("published {} tasks", tasks.len());
    Ok(())
  }

  pub async fn catalog(&self) -> Result<Catalog> {
    let entries = self.channel.list().await?;
    Ok(catalog::replay_catalog(&entries))
  }

  pub async fn get_available_tasks(&self) -> Result<Vec<Task>> {
    Ok(self.catalog().await?.available())
  }

  /// Two-phase optimistic claim, same race as the election but scoped to one
  /// task id. Losing is a normal outcome; callers move on to another task.
  pub async fn claim_task(&self, task_id: &str) -> Result<bool> {
    let claim = Message::Claim {
      task_id: task_id.into(),
      node_id: self.node_id.clone(),
      nonce: Uuid::new_v4().simple().to_string(),
    };
    self.channel.append(&codec::encode(&claim)).await?;

    sleep(self.config.settle_delay).await;

    let entries = self.channel.list().await?;
    let ballots = claim_ballots(&entries, task_id);
    let won = earliest_winner(&ballots).is_some_and(|w| w.node_id == self.node_id);
    if won {
      info!("claimed task {}", task_id);
    } else {
      debug!("task {} claimed by another node", task_id);
    }
    Ok(won)
  }

  /// Fire-and-forget progress entry. Only report on tasks this node won.
  pub async fn report_progress(
    &self,
    task_id: &str,
    status: TaskStatus,
    percent: u8,
    message: &str,
  ) -> Result<()> {
    let report = ProgressReport {
      task_id: task_id.into(),
      node_id: self.node_id.clone(),
      status,
      percent: percent.min(100),
      message: message.into(),
      timestamp: Utc::now(),
    };
    self.channel.append(&codec::encode(&Message::Progress(report))).await?;
    debug!("reported {} at {}%", task_id, percent);
    Ok(())
  }

  pub async fn heartbeat(&self) -> Result<()> {
    let heartbeat = Heartbeat {
      node_id: self.node_id.clone(),
      timestamp: Utc::now(),
      status: "alive".into(),
    };
    self.channel.append(&codec::encode(&Message::Heartbeat(heartbeat))).await?;
    Ok(())
  }

  /// Best-effort departure note; failure is logged, never propagated, so it
  /// cannot block shutdown.
  pub async fn depart(&self) {
    let role = if self.is_leader() { "leader" } else { "worker" };
    let node = self.self_node(NodeStatus::Completed, None);
    if let Err(e) = self
      .channel
      .append(&codec::encode(&Message::NodeAnnounce(node)))
      .await
    {
      warn!("departure announcement failed for {} ({}): {}", self.node_id, role, e);
    } else {
      info!("node departing: {} ({})", self.node_id, role);
    }
  }

  /// One replay combining peers, catalog and progress into the view exposed
  /// to dashboards and CLIs.
  pub async fn network_status(&self) -> Result<NetworkStatus> {
    let entries = self.channel.list().await?;
    let nodes = registry::live_peers(&entries, Utc::now(), self.config.peer_ttl);
    let catalog = catalog::replay_catalog(&entries);
    let task_status = progress::aggregate(&entries);

    Ok(NetworkStatus {
      active_nodes: nodes.len(),
      total_tasks: catalog.total(),
      available_tasks: catalog.available().len(),
      completed_tasks: progress::count_with_status(&task_status, TaskStatus::Completed),
      in_progress_tasks: progress::count_with_status(&task_status, TaskStatus::InProgress),
      failed_tasks: progress::count_with_status(&task_status, TaskStatus::Failed),
      nodes,
      task_status,
    })
  }

  /// Poll until every published task has a terminal report, or the timeout
  /// elapses. Returns the outcome as a bool; partial completion is for the
  /// caller to judge. The predicate is checked before the first sleep.
  pub async fn wait_for_completion(&self, timeout: std::time::Duration) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
      let entries = self.channel.list().await?;
      let total = catalog::replay_catalog(&entries).total();
      let reports = progress::aggregate(&entries);
      if progress::all_terminal(&reports, total) {
        let completed = progress::count_with_status(&reports, TaskStatus::Completed);
        let failed = progress::count_with_status(&reports, TaskStatus::Failed);
        info!("all tasks finished: {} completed, {} failed", completed, failed);
        return Ok(true);
      }
      if Instant::now() + self.config.poll_interval > deadline {
        warn!("timed out waiting for task completion");
        return Ok(false);
      }
      sleep(self.config.poll_interval).await;
    }
  }
}

fn publish_summary(tasks: &[Task]) -> String {
  let lines: Vec<String> = tasks
    .iter()
    .map(|t| {
      format!(
        "- [ ] **{}**: {} (priority: {:?}, est: {}h)",
        t.task_id,
        t.title,
        t.priority,
        t.estimated_hours
      )
    })
    .collect();
  format!(
    "## Available Tasks\n\n{}\n\nTotal tasks: {}",
    lines.join("\n"),
    tasks.len()
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::MemoryChannel;
  use std::time::Duration;

  fn test_config(job_id: &str) -> Config {
    Config {
      thread_id: "test-thread".into(),
      run_id: "run-1".into(),
      job_id: job_id.into(),
      settle_delay: Duration::from_secs(2),
      heartbeat_interval: Duration::from_secs(60),
      peer_ttl: Duration::from_secs(300),
      poll_interval: Duration::from_secs(30),
      completion_timeout: Duration::from_secs(3600),
    }
  }

  fn coordinator(channel: &Arc<MemoryChannel>, job_id: &str) -> Coordinator {
    Coordinator::new(channel.clone(), test_config(job_id))
  }

  #[tokio::test(start_paused = true)]
  async fn race_window_produces_a_single_leader_on_both_nodes() {
    let channel = MemoryChannel::new();
    let a = Arc::new(coordinator(&channel, "a"));
    let b = Arc::new(coordinator(&channel, "b"));

    // Both candidates append inside the settle window; A lands first.
    let (a_won, b_won) = tokio::join!(a.elect_leader(), b.elect_leader());
    let a_won = a_won.unwrap();
    let b_won = b_won.unwrap();

    assert!(a_won);
    assert!(!b_won);
    assert!(a.is_leader());
    assert!(!b.is_leader());
  }

  #[tokio::test(start_paused = true)]
  async fn election_replay_is_deterministic_for_late_observers() {
    let channel = MemoryChannel::new();
    let first = coordinator(&channel, "first");
    assert!(first.elect_leader().await.unwrap());

    // A node joining later replays the same entries and reaches the same
    // verdict about itself.
    let late = coordinator(&channel, "late");
    assert!(!late.elect_leader().await.unwrap());
    assert!(!late.is_leader());
  }

  #[tokio::test(start_paused = true)]
  async fn concurrent_claims_admit_exactly_one_winner() {
    let channel = MemoryChannel::new();
    let leader = coordinator(&channel, "leader");
    assert!(leader.elect_leader().await.unwrap());
    leader
      .publish_tasks(&[crate::models::Task::new("t1", "t1", crate::models::Priority::High, 1.0)])
      .await
      .unwrap();

    let claimants: Vec<Arc<Coordinator>> = (0..4)
      .map(|i| Arc::new(coordinator(&channel, &format!("w{}", i))))
      .collect();
    let results = futures::future::join_all(
      claimants.iter().map(|c| c.claim_task("t1")),
    )
    .await;

    let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(winners, 1);

    let catalog = leader.catalog().await.unwrap();
    assert_eq!(catalog.tasks["t1"].status, TaskStatus::Claimed);
  }

  #[tokio::test(start_paused = true)]
  async fn non_leader_cannot_publish() {
    let channel = MemoryChannel::new();
    let node = coordinator(&channel, "w");
    assert!(node.publish_tasks(&[]).await.is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn publish_appends_summary_before_snapshot() {
    let channel = MemoryChannel::new();
    let leader = coordinator(&channel, "leader");
    assert!(leader.elect_leader().await.unwrap());

    let before = channel.list().await.unwrap().len();
    leader
      .publish_tasks(&[crate::models::Task::new("t1", "Build parser", crate::models::Priority::High, 2.0)])
      .await
      .unwrap();

    let entries = channel.list().await.unwrap();
    assert_eq!(entries.len(), before + 2);

    // Readable checklist first; it is not a protocol message and replay
    // skips it.
    let summary = &entries[before];
    assert!(summary.body.starts_with("## Available Tasks"));
    assert!(summary.body.contains("**t1**: Build parser"));
    assert!(codec::decode(&summary.body).is_none());

    // Structured snapshot follows and is the one the catalog replays.
    assert!(matches!(
      codec::decode(&entries[before + 1].body),
      Some(Message::TasksData(_))
    ));
    assert_eq!(leader.catalog().await.unwrap().total(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn completion_returns_immediately_when_all_terminal() {
    let channel = MemoryChannel::new();
    let leader = coordinator(&channel, "leader");
    assert!(leader.elect_leader().await.unwrap());

    let tasks: Vec<_> = ["t1", "t2", "t3"]
      .iter()
      .map(|t| crate::models::Task::new(t, t, crate::models::Priority::Low, 1.0))
      .collect();
    leader.publish_tasks(&tasks).await.unwrap();

    leader.report_progress("t1", TaskStatus::Completed, 100, "done").await.unwrap();
    leader.report_progress("t2", TaskStatus::Completed, 100, "done").await.unwrap();
    leader.report_progress("t3", TaskStatus::Failed, 20, "boom").await.unwrap();

    let started = Instant::now();
    let done = leader.wait_for_completion(Duration::from_secs(3600)).await.unwrap();
    assert!(done);
    // Predicate is checked before the first poll sleep.
    assert!(started.elapsed() < leader.config().poll_interval);
  }

  #[tokio::test(start_paused = true)]
  async fn completion_times_out_with_false() {
    let channel = MemoryChannel::new();
    let leader = coordinator(&channel, "leader");
    assert!(leader.elect_leader().await.unwrap());
    leader
      .publish_tasks(&[crate::models::Task::new("t1", "t1", crate::models::Priority::Low, 1.0)])
      .await
      .unwrap();

    let done = leader.wait_for_completion(Duration::from_secs(90)).await.unwrap();
    assert!(!done);
  }

  #[tokio::test(start_paused = true)]
  async fn network_status_combines_all_views() {
    let channel = MemoryChannel::new();
    let leader = coordinator(&channel, "leader");
    assert!(leader.elect_leader().await.unwrap());

    let worker = coordinator(&channel, "w1");
    worker.announce(NodeStatus::Ready, None).await.unwrap();

    let peers = leader.discover_peers().await.unwrap();
    assert_eq!(peers.len(), 2);
    assert!(peers.iter().any(|n| n.is_leader));

    let tasks: Vec<_> = ["t1", "t2"]
      .iter()
      .map(|t| crate::models::Task::new(t, t, crate::models::Priority::Medium, 1.0))
      .collect();
    leader.publish_tasks(&tasks).await.unwrap();

    assert!(worker.claim_task("t1").await.unwrap());
    worker.report_progress("t1", TaskStatus::InProgress, 30, "working").await.unwrap();

    let remaining = leader.get_available_tasks().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].task_id, "t2");

    let status = leader.network_status().await.unwrap();
    assert_eq!(status.active_nodes, 2);
    assert_eq!(status.total_tasks, 2);
    assert_eq!(status.available_tasks, 1);
    assert_eq!(status.in_progress_tasks, 1);
    assert_eq!(status.completed_tasks, 0);
    assert_eq!(status.task_status["t1"].node_id, worker.node_id());
  }
}
