use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Serialize, Deserialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::warn;

static MAX_RETRIES: usize = 5;
static DELAY: u64 = 100;

/// One appended comment as the channel stored it. `created_at` is the
/// server-assigned time; the whole protocol orders entries by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
  pub id: u64,
  pub body: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ChannelError {
  #[error("channel unavailable: {0}")]
  Unavailable(String),
}

/// The sole I/O boundary of the protocol. Strictly append-only: no update or
/// delete exists, every reader replays `list()` and derives state itself.
///
/// Correctness of election and claim resolution assumes `list()` returns one
/// total order identical for every reader. A channel that only converges
/// eventually can expose transient dual-leader or dual-claim views; that
/// assumption is inherited from the coordination model, not worked around here.
#[async_trait]
pub trait ChannelClient: Send + Sync {
  async fn append(&self, body: &str) -> Result<Entry, ChannelError>;
  async fn list(&self) -> Result<Vec<Entry>, ChannelError>;
}

/// Retries transient channel failures with exponential backoff before they
/// ever reach protocol logic.
pub struct RetryingChannel<C> {
  inner: C,
}

impl<C: ChannelClient> RetryingChannel<C> {
  pub fn new(inner: C) -> Self {
    Self { inner }
  }
}

#[async_trait]
impl<C: ChannelClient> ChannelClient for RetryingChannel<C> {
  async fn append(&self, body: &str) -> Result<Entry, ChannelError> {
    Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || {
      self.inner.append(body)
    })
      .await
      .map_err(|e| {
        warn!("append failed after {} retries: {}", MAX_RETRIES, e);
        e
      })
  }

  async fn list(&self) -> Result<Vec<Entry>, ChannelError> {
    Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || {
      self.inner.list()
    })
      .await
  }
}

#[derive(Default)]
struct MemoryLog {
  entries: Vec<Entry>,
  last_at: Option<DateTime<Utc>>,
}

/// In-process channel with strictly increasing server timestamps. Backs the
/// demo binary and tests; production deployments adapt an issue-tracker
/// comment API behind the same trait.
#[derive(Default)]
pub struct MemoryChannel {
  log: Mutex<MemoryLog>,
}

impl MemoryChannel {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }
}

#[async_trait]
impl ChannelClient for MemoryChannel {
  async fn append(&self, body: &str) -> Result<Entry, ChannelError> {
    let mut log = self.log.lock().await;
    let now = Utc::now();
    // Appends inside one tick still get distinct, ordered timestamps.
    let created_at = match log.last_at {
      Some(last) if now <= last => last + ChronoDuration::milliseconds(1),
      _ => now,
    };
    log.last_at = Some(created_at);
    let entry = Entry {
      id: log.entries.len() as u64 + 1,
      body: body.into(),
      created_at,
    };
    log.entries.push(entry.clone());
    Ok(entry)
  }

  async fn list(&self) -> Result<Vec<Entry>, ChannelError> {
    Ok(self.log.lock().await.entries.clone())
  }
}

#[async_trait]
impl<C: ChannelClient + ?Sized> ChannelClient for Arc<C> {
  async fn append(&self, body: &str) -> Result<Entry, ChannelError> {
    (**self).append(body).await
  }

  async fn list(&self) -> Result<Vec<Entry>, ChannelError> {
    (**self).list().await
  }
}
