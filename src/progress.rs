use std::collections::HashMap;
use crate::channel::Entry;
use crate::codec::{self, Message};
use crate::models::{ProgressReport, TaskStatus};

/// Latest report per task id, by report timestamp. Idempotent: the same set
/// of entries yields the same map no matter how often or in what order it is
/// re-read.
pub fn aggregate(entries: &[Entry]) -> HashMap<String, ProgressReport> {
  let mut latest: HashMap<String, ProgressReport> = HashMap::new();
  for entry in entries {
    if let Some(Message::Progress(report)) = codec::decode(&entry.body) {
      match latest.get(&report.task_id) {
        Some(current) if current.timestamp >= report.timestamp => {}
        _ => {
          latest.insert(report.task_id.clone(), report);
        }
      }
    }
  }
  latest
}

pub fn count_with_status(reports: &HashMap<String, ProgressReport>, status: TaskStatus) -> usize {
  reports.values().filter(|r| r.status == status).count()
}

/// The completion predicate polled by `wait_for_completion`: every published
/// task has reached a terminal report.
pub fn all_terminal(reports: &HashMap<String, ProgressReport>, total: usize) -> bool {
  let terminal = reports.values().filter(|r| r.status.is_terminal()).count();
  total > 0 && terminal >= total
}
