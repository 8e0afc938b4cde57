use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use crate::channel::Entry;
use crate::codec::{self, Message};
use crate::election::{Ballot, earliest_winner};
use crate::models::{Task, TaskStatus};

/// The latest published task snapshot with overlays applied. A re-publication
/// fully supersedes the previous snapshot; nothing carries over.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  pub tasks: BTreeMap<String, Task>,
  pub published_at: Option<DateTime<Utc>>,
}

impl Catalog {
  pub fn total(&self) -> usize {
    self.tasks.len()
  }

  pub fn available(&self) -> Vec<Task> {
    self.tasks
      .values()
      .filter(|t| t.status == TaskStatus::Available)
      .cloned()
      .collect()
  }
}

/// Replay the channel into the current catalog: take the latest TASKS_DATA
/// snapshot as authoritative, then fold in claim winners and progress reports
/// observed after the snapshot's timestamp. Derived status only ever advances
/// along the task lifecycle; a late or contradicting entry cannot regress it.
pub fn replay_catalog(entries: &[Entry]) -> Catalog {
  let snapshot = entries
    .iter()
    .filter_map(|entry| match codec::decode(&entry.body) {
      Some(Message::TasksData(tasks)) => Some((entry.created_at, entry.id, tasks)),
      _ => None,
    })
    .max_by_key(|(created_at, id, _)| (*created_at, *id));

  let Some((published_at, _, mut tasks)) = snapshot else {
    return Catalog::default();
  };

  let overlays: Vec<&Entry> = entries.iter().filter(|e| e.created_at > published_at).collect();

  // Claim overlay: per task, the earliest competing claim is the winner.
  let mut claims: BTreeMap<String, Vec<Ballot>> = BTreeMap::new();
  for entry in &overlays {
    if let Some(Message::Claim { task_id, node_id, .. }) = codec::decode(&entry.body) {
      if tasks.contains_key(&task_id) {
        claims.entry(task_id).or_default().push(Ballot {
          node_id,
          created_at: entry.created_at,
          entry_id: entry.id,
        });
      }
    }
  }
  for (task_id, ballots) in &claims {
    if let Some(winner) = earliest_winner(ballots) {
      if let Some(task) = tasks.get_mut(task_id) {
        if TaskStatus::Claimed.rank() > task.status.rank() {
          task.status = TaskStatus::Claimed;
          task.claimed_by = Some(winner.node_id.clone());
          task.claimed_at = Some(winner.created_at);
        }
      }
    }
  }

  // Progress overlay: latest report per task, applied without regression.
  for entry in &overlays {
    if let Some(Message::Progress(report)) = codec::decode(&entry.body) {
      if let Some(task) = tasks.get_mut(&report.task_id) {
        if report.status.rank() >= task.status.rank() {
          task.status = report.status;
          if report.status.is_terminal() {
            task.completed_at = Some(report.timestamp);
          }
        }
      }
    }
  }

  Catalog { tasks, published_at: Some(published_at) }
}
