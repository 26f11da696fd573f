//! Cooperative cancellation signal.
//!
//! Callers hold the `watch::Sender<bool>` half and flip it to `true` to ask
//! in-flight scheduling or expression evaluation to stop. The receiving side
//! is polled, never awaited, so it works from synchronous code.

use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// A signal that is never cancelled.
    pub fn none() -> Self {
        Self { rx: None }
    }

    /// Create a sender/signal pair.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx: Some(rx) })
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_never_cancelled() {
        assert!(!Cancellation::none().is_cancelled());
        assert!(!Cancellation::default().is_cancelled());
    }

    #[test]
    fn channel_reflects_sender() {
        let (tx, cancel) = Cancellation::channel();
        assert!(!cancel.is_cancelled());
        tx.send(true).unwrap();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn dropped_sender_keeps_last_value() {
        let (tx, cancel) = Cancellation::channel();
        drop(tx);
        assert!(!cancel.is_cancelled());
    }
}
