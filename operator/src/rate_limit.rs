use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

/// Coalescing "time to reconcile" signal.
#[async_trait]
pub trait RateLimiter: Send {
    /// Ask for a tick. Never blocks; repeated requests may be merged.
    fn request_tick(&self);

    /// Resolves once for every outstanding request, possibly merging several.
    /// Must be cancel-safe: it is polled inside `tokio::select!`.
    async fn ready(&mut self);
}

/// Merges bursts of requests into one tick and spaces ticks at least
/// `min_interval` apart.
pub struct TickLimiter {
    requests: mpsc::Sender<()>,
    pending: mpsc::Receiver<()>,
    min_interval: Duration,
    next_allowed: Option<Instant>,
}

impl TickLimiter {
    pub fn new(min_interval: Duration) -> Self {
        // A single slot: a request made while one is queued is already covered.
        let (requests, pending) = mpsc::channel(1);
        Self {
            requests,
            pending,
            min_interval,
            next_allowed: None,
        }
    }
}

#[async_trait]
impl RateLimiter for TickLimiter {
    fn request_tick(&self) {
        let _ = self.requests.try_send(());
    }

    async fn ready(&mut self) {
        if let Some(at) = self.next_allowed {
            sleep_until(at).await;
        }
        if self.pending.recv().await.is_none() {
            // we hold a sender, so this never happens
            std::future::pending::<()>().await;
        }
        self.next_allowed = Some(Instant::now() + self.min_interval);
    }
}
