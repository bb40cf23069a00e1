//! Cooperative cancellation.
//!
//! One root [`CancelSource`] per run; every engine holds a cheap
//! [`CancelToken`] clone and consults it at suspension points. Delivery is a
//! watch channel so late subscribers still observe an earlier cancel.

use tokio::sync::watch;

/// Owning side of the cancellation scope.
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

/// Cloneable handle observed by engines.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal cancellation to every token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Token that can never be cancelled, for one-shot subcommands that run
    /// outside the orchestrator.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Leak the sender so the channel stays open for the process lifetime.
        std::mem::forget(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when cancellation is signalled. Never resolves for
    /// [`CancelToken::never`].
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // Sender dropped without cancelling; park forever so select! arms
        // relying on this future do not spuriously fire.
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_observes_cancel() {
        let source = CancelSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());
        source.cancel();
        assert!(token.is_cancelled());
        token.cancelled().await; // resolves immediately
    }

    #[tokio::test]
    async fn never_token_stays_live() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        let wait = tokio::time::timeout(std::time::Duration::from_millis(20), token.cancelled());
        assert!(wait.await.is_err(), "never token must not resolve");
    }
}
