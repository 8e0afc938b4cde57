use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Initializing,
  Ready,
  Working,
  Completed,
  Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Available,
  Claimed,
  InProgress,
  Completed,
  Failed,
}

impl TaskStatus {
  /// Position along available -> claimed -> in_progress -> terminal.
  /// Derived task state must never move backwards along this rank.
  pub fn rank(self) -> u8 {
    match self {
      TaskStatus::Available => 0,
      TaskStatus::Claimed => 1,
      TaskStatus::InProgress => 2,
      TaskStatus::Completed | TaskStatus::Failed => 3,
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, TaskStatus::Completed | TaskStatus::Failed)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  Low,
  Medium,
  High,
  Critical,
}

/// One participating process, as last announced on the channel. Nodes are
/// never mutated in place; current state is always replayed from entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
  pub node_id: String,
  pub job_id: String,
  pub run_id: String,
  pub is_leader: bool,
  pub status: NodeStatus,
  pub current_task: Option<String>,
  pub started_at: DateTime<Utc>,
  pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
  pub task_id: String,
  pub title: String,
  pub description: String,
  pub priority: Priority,
  pub estimated_hours: f64,
  pub required_skills: BTreeSet<String>,
  pub dependencies: BTreeSet<String>,
  pub status: TaskStatus,
  pub claimed_by: Option<String>,
  pub claimed_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
  pub fn new(task_id: &str, title: &str, priority: Priority, estimated_hours: f64) -> Self {
    Self {
      task_id: task_id.into(),
      title: title.into(),
      description: String::new(),
      priority,
      estimated_hours,
      required_skills: BTreeSet::new(),
      dependencies: BTreeSet::new(),
      status: TaskStatus::Available,
      claimed_by: None,
      claimed_at: None,
      completed_at: None,
    }
  }
}

/// Latest-by-timestamp report per task is the authoritative one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
  pub task_id: String,
  pub node_id: String,
  pub status: TaskStatus,
  pub percent: u8,
  pub message: String,
  pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
  pub node_id: String,
  pub timestamp: DateTime<Utc>,
  pub status: String,
}

/// Snapshot view handed to dashboards and CLIs.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
  pub active_nodes: usize,
  pub total_tasks: usize,
  pub available_tasks: usize,
  pub completed_tasks: usize,
  pub in_progress_tasks: usize,
  pub failed_tasks: usize,
  pub nodes: Vec<Node>,
  pub task_status: HashMap<String, ProgressReport>,
}
