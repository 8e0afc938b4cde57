use chrono::{DateTime, Utc};
use crate::channel::Entry;
use crate::codec::{self, Message};

/// One optimistic claim in a race, either for leadership or for a task.
#[derive(Debug, Clone)]
pub struct Ballot {
  pub node_id: String,
  pub created_at: DateTime<Utc>,
  pub entry_id: u64,
}

/// Earliest server-assigned time wins; entry id breaks exact ties so every
/// replayer computes the same winner from the same channel state.
pub fn earliest_winner(ballots: &[Ballot]) -> Option<&Ballot> {
  ballots.iter().min_by_key(|b| (b.created_at, b.entry_id))
}

/// All leadership ballots in the log, unparseable entries skipped.
pub fn election_ballots(entries: &[Entry]) -> Vec<Ballot> {
  entries
    .iter()
    .filter_map(|entry| match codec::decode(&entry.body) {
      Some(Message::LeaderElection { node_id, .. }) => Some(Ballot {
        node_id,
        created_at: entry.created_at,
        entry_id: entry.id,
      }),
      _ => None,
    })
    .collect()
}

/// All ballots racing for one task id.
pub fn claim_ballots(entries: &[Entry], task_id: &str) -> Vec<Ballot> {
  entries
    .iter()
    .filter_map(|entry| match codec::decode(&entry.body) {
      Some(Message::Claim { task_id: claimed, node_id, .. }) if claimed == task_id => {
        Some(Ballot {
          node_id,
          created_at: entry.created_at,
          entry_id: entry.id,
        })
      }
      _ => None,
    })
    .collect()
}
