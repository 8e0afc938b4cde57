use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};
use crate::coordinator::Coordinator;
use crate::heartbeat::spawn_heartbeat;
use crate::models::{NodeStatus, Task, TaskStatus};

static IDLE_BACKOFF: Duration = Duration::from_secs(10);
static LOST_CLAIM_BACKOFF: Duration = Duration::from_secs(5);

/// The opaque task body supplied by the embedding application. The runner
/// wraps it in progress reporting; it never interprets the work itself.
pub trait TaskExecutor: Send + Sync {
  fn execute(&self, task: &Task) -> impl Future<Output = Result<()>> + Send;
}

impl<F, Fut> TaskExecutor for F
where
  F: Fn(Task) -> Fut + Send + Sync,
  Fut: Future<Output = Result<()>> + Send,
{
  fn execute(&self, task: &Task) -> impl Future<Output = Result<()>> + Send {
    self(task.clone())
  }
}

/// Announce, elect, then run the role this node ended up with. Returns true
/// when every published task reached a terminal state before the configured
/// completion timeout.
pub async fn run_node<E: TaskExecutor>(
  coordinator: Arc<Coordinator>,
  planned_tasks: Vec<Task>,
  executor: E,
) -> Result<bool> {
  coordinator.announce(NodeStatus::Initializing, None).await?;
  let is_leader = coordinator.elect_leader().await?;

  if is_leader {
    run_as_leader(coordinator, planned_tasks, executor).await
  } else {
    run_as_worker(coordinator, executor).await
  }
}

/// Leader: publish the plan, keep a heartbeat going, work the queue like any
/// other node, and wait for the network to finish.
pub async fn run_as_leader<E: TaskExecutor>(
  coordinator: Arc<Coordinator>,
  tasks: Vec<Task>,
  executor: E,
) -> Result<bool> {
  info!("running as leader: {}", coordinator.node_id());
  coordinator.publish_tasks(&tasks).await?;
  let heartbeat = spawn_heartbeat(coordinator.clone());

  // The heartbeat loop must be stopped (and its departure note appended)
  // even when the run itself fails.
  let result: Result<bool> = async {
    work_loop(&coordinator, &executor).await?;
    let timeout = coordinator.config().completion_timeout;
    let done = coordinator.wait_for_completion(timeout).await?;

    let status = coordinator.network_status().await?;
    info!(
      "final status: {} nodes, {} completed, {} failed",
      status.active_nodes, status.completed_tasks, status.failed_tasks
    );
    Ok(done)
  }
  .await;

  heartbeat.shutdown().await;
  result
}

/// Worker: claim and execute until every published task is terminal. There is
/// no leader failover; if the leader dies, workers keep draining the last
/// published snapshot.
pub async fn run_as_worker<E: TaskExecutor>(
  coordinator: Arc<Coordinator>,
  executor: E,
) -> Result<bool> {
  info!("running as worker: {}", coordinator.node_id());
  let heartbeat = spawn_heartbeat(coordinator.clone());

  let result: Result<bool> = async {
    work_loop(&coordinator, &executor).await?;
    let timeout = coordinator.config().completion_timeout;
    coordinator.wait_for_completion(timeout).await
  }
  .await;

  heartbeat.shutdown().await;
  result
}

/// Discover, claim, execute, report — until nothing claimable is left and all
/// published work is terminal. An empty queue is not an error, only a reason
/// to back off and look again.
async fn work_loop<E: TaskExecutor>(coordinator: &Coordinator, executor: &E) -> Result<()> {
  loop {
    let catalog = coordinator.catalog().await?;
    let available = catalog.available();

    if available.is_empty() {
      // Claims are never released in this protocol, so an empty queue with a
      // published snapshot means nothing will become claimable again; hand
      // over to the completion waiter. Before the first snapshot, keep polling.
      if catalog.total() > 0 {
        return Ok(());
      }
      sleep(IDLE_BACKOFF).await;
      continue;
    }

    let task = &available[0];
    if coordinator.claim_task(&task.task_id).await? {
      execute_claimed(coordinator, executor, task).await;
    } else {
      sleep(LOST_CLAIM_BACKOFF).await;
    }
  }
}

/// Run one won task, bracketed by progress reports. Failures of the body are
/// reported as a failed task, not bubbled out of the loop.
async fn execute_claimed<E: TaskExecutor>(coordinator: &Coordinator, executor: &E, task: &Task) {
  let report = |status, percent, message: String| async move {
    if let Err(e) = coordinator.report_progress(&task.task_id, status, percent, &message).await {
      error!("progress report for {} failed: {}", task.task_id, e);
    }
  };

  report(TaskStatus::InProgress, 0, "starting task execution".into()).await;
  if let Err(e) = coordinator
    .announce(NodeStatus::Working, Some(task.task_id.clone()))
    .await
  {
    error!("working announcement failed: {}", e);
  }

  match executor.execute(task).await {
    Ok(()) => {
      info!("task {} completed", task.task_id);
      report(TaskStatus::Completed, 100, "task completed successfully".into()).await;
    }
    Err(e) => {
      error!("task {} failed: {}", task.task_id, e);
      report(TaskStatus::Failed, 0, format!("task failed: {}", e)).await;
    }
  }
}
