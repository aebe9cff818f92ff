//! Shutdown coordination for the guard service.

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks (HTTP server, rate limit sweeper, config reload loop)
/// each hold a receiver and stop when the signal is broadcast.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Broadcast the shutdown signal to every subscriber.
    pub fn trigger(&self) {
        let receivers = self.tx.send(()).unwrap_or(0);
        tracing::info!(receivers, "Shutdown triggered");
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once the signal arrives or every sender is gone.
pub async fn wait(mut rx: broadcast::Receiver<()>) {
    // Lagged cannot happen with a single message; any result means stop.
    let _ = rx.recv().await;
}
