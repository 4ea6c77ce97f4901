//! One-shot stop signal shared between a connection and its loops

use tokio::sync::watch;

#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }
}

impl ShutdownSignal {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once triggered, immediately if already triggered
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // Sender is owned by `self`, the channel stays open.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}
