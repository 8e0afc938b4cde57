use anyhow::Result;
use std::env;
use std::sync::Arc;
use tracing::info;
use commnet::channel::{ChannelClient, MemoryChannel, RetryingChannel};
use commnet::config::Config;
use commnet::coordinator::Coordinator;
use commnet::models::{Priority, Task};
use commnet::runner::run_node;

/// Demo run: several logical nodes coordinate over one in-memory channel in
/// this process. Real deployments run one node per process against a shared
/// comment thread behind the same `ChannelClient` trait.
#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let node_count: usize = env::var("COORD_NODES")
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(3);

  let channel: Arc<dyn ChannelClient> =
    Arc::new(RetryingChannel::new(MemoryChannel::new()));

  let plan = vec![
    Task::new("parse-input", "Parse the input corpus", Priority::High, 2.0),
    Task::new("build-index", "Build the search index", Priority::Medium, 3.5),
    Task::new("verify-output", "Verify generated artifacts", Priority::Low, 1.0),
    Task::new("publish-report", "Publish the summary report", Priority::Critical, 0.5),
  ];

  let mut handles = Vec::new();
  for job in 0..node_count {
    let mut config = Config::from_env();
    config.job_id = job.to_string();
    let coordinator = Arc::new(Coordinator::new(channel.clone(), config));
    let plan = plan.clone();
    handles.push(tokio::spawn(async move {
      run_node(coordinator, plan, execute_task).await
    }));
  }

  let mut all_done = true;
  for result in futures::future::join_all(handles).await {
    all_done &= result??;
  }
  info!("run finished, all tasks terminal: {}", all_done);
  Ok(())
}

async fn execute_task(task: Task) -> Result<()> {
  info!("executing {}: {}", task.task_id, task.title);
  // Stand-in for real work; each task costs a second per estimated hour.
  let secs = task.estimated_hours.max(0.0) as u64 + 1;
  tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
  Ok(())
}
