use std::collections::BTreeMap;
use crate::models::{Heartbeat, Node, ProgressReport, Task};

/// Tag prefixing every protocol entry so coordination traffic can share a
/// thread with ordinary human comments.
pub static MARKER: &str = "[p2p]";

/// The six protocol message kinds. Anything on the channel that does not
/// decode into one of these is treated as unparseable and skipped by replay.
#[derive(Debug, Clone)]
pub enum Message {
  LeaderElection { node_id: String, nonce: String },
  NodeAnnounce(Node),
  TasksData(BTreeMap<String, Task>),
  Claim { task_id: String, node_id: String, nonce: String },
  Progress(ProgressReport),
  Heartbeat(Heartbeat),
}

pub fn encode(message: &Message) -> String {
  match message {
    Message::LeaderElection { node_id, nonce } => {
      format!("{MARKER} LEADER_ELECTION|{node_id}|{nonce}")
    }
    Message::NodeAnnounce(node) => {
      format!("{MARKER} NODE_ANNOUNCE|{}", serde_json::to_string(node).unwrap_or_default())
    }
    Message::TasksData(tasks) => {
      format!("{MARKER} TASKS_DATA|{}", serde_json::to_string(tasks).unwrap_or_default())
    }
    Message::Claim { task_id, node_id, nonce } => {
      format!("{MARKER} CLAIM|{task_id}|{node_id}|{nonce}")
    }
    Message::Progress(report) => {
      format!("{MARKER} PROGRESS|{}", serde_json::to_string(report).unwrap_or_default())
    }
    Message::Heartbeat(heartbeat) => {
      format!("{MARKER} HEARTBEAT|{}", serde_json::to_string(heartbeat).unwrap_or_default())
    }
  }
}

/// Strict decode: `None` means the entry is not a well-formed protocol
/// message. Replay loops skip those explicitly instead of aborting.
pub fn decode(body: &str) -> Option<Message> {
  let tagged = body.strip_prefix(MARKER)?.strip_prefix(' ')?;
  let (kind, payload) = tagged.split_once('|')?;
  match kind {
    "LEADER_ELECTION" => {
      let (node_id, nonce) = payload.split_once('|')?;
      if node_id.is_empty() {
        return None;
      }
      Some(Message::LeaderElection { node_id: node_id.into(), nonce: nonce.into() })
    }
    "CLAIM" => {
      let mut fields = payload.splitn(3, '|');
      let task_id = fields.next()?;
      let node_id = fields.next()?;
      let nonce = fields.next()?;
      if task_id.is_empty() || node_id.is_empty() {
        return None;
      }
      Some(Message::Claim {
        task_id: task_id.into(),
        node_id: node_id.into(),
        nonce: nonce.into(),
      })
    }
    "NODE_ANNOUNCE" => serde_json::from_str(payload).ok().map(Message::NodeAnnounce),
    "TASKS_DATA" => serde_json::from_str(payload).ok().map(Message::TasksData),
    "PROGRESS" => serde_json::from_str(payload).ok().map(Message::Progress),
    "HEARTBEAT" => serde_json::from_str(payload).ok().map(Message::Heartbeat),
    _ => None,
  }
}
