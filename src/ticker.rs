use std::time::Duration;
use tokio::sync::watch;

/// Cancellable fixed-interval timer. Loops sleep through `tick()` instead of
/// a bare `sleep`, so the owning process can stop them at a tick boundary.
pub struct Ticker {
  interval: Duration,
  cancelled: watch::Receiver<bool>,
}

/// Cancels the paired ticker when `cancel()` is called or the handle drops.
pub struct Cancel {
  tx: watch::Sender<bool>,
}

impl Cancel {
  pub fn cancel(&self) {
    let _ = self.tx.send(true);
  }
}

impl Ticker {
  pub fn new(interval: Duration) -> (Cancel, Ticker) {
    let (tx, rx) = watch::channel(false);
    (Cancel { tx }, Ticker { interval, cancelled: rx })
  }

  /// Waits one interval. Returns false once cancelled; the current iteration
  /// is never interrupted, only the wait for the next one.
  pub async fn tick(&mut self) -> bool {
    if *self.cancelled.borrow() {
      return false;
    }
    tokio::select! {
      _ = tokio::time::sleep(self.interval) => !*self.cancelled.borrow(),
      _ = self.cancelled.changed() => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn ticks_until_cancelled() {
    let (cancel, mut ticker) = Ticker::new(Duration::from_secs(1));
    assert!(ticker.tick().await);
    assert!(ticker.tick().await);
    cancel.cancel();
    assert!(!ticker.tick().await);
    assert!(!ticker.tick().await);
  }

  #[tokio::test(start_paused = true)]
  async fn cancellation_interrupts_the_wait() {
    let (cancel, mut ticker) = Ticker::new(Duration::from_secs(3600));
    let waiter = tokio::spawn(async move { ticker.tick().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    assert!(!waiter.await.unwrap());
  }
}
