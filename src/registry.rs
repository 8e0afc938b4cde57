use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use crate::channel::Entry;
use crate::codec::{self, Message};
use crate::models::Node;

/// Fold announce and heartbeat entries into the last-known record per node.
/// Heartbeats only refresh `last_heartbeat` of a node that has announced;
/// a heartbeat from a never-announced node carries no identity to register.
pub fn replay_nodes(entries: &[Entry]) -> HashMap<String, Node> {
  let mut nodes: HashMap<String, Node> = HashMap::new();
  for entry in entries {
    match codec::decode(&entry.body) {
      Some(Message::NodeAnnounce(node)) => {
        nodes.insert(node.node_id.clone(), node);
      }
      Some(Message::Heartbeat(heartbeat)) => {
        if let Some(node) = nodes.get_mut(&heartbeat.node_id) {
          if heartbeat.timestamp > node.last_heartbeat {
            node.last_heartbeat = heartbeat.timestamp;
          }
        }
      }
      _ => {}
    }
  }
  nodes
}

/// Nodes whose last heartbeat is within the TTL as of `now`. Stale nodes stay
/// in the log forever; they are only filtered out of this live view.
pub fn live_peers(entries: &[Entry], now: DateTime<Utc>, ttl: Duration) -> Vec<Node> {
  let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::MAX);
  let mut peers: Vec<Node> = replay_nodes(entries)
    .into_values()
    .filter(|node| now - node.last_heartbeat <= ttl)
    .collect();
  peers.sort_by(|a, b| a.node_id.cmp(&b.node_id));
  peers
}
