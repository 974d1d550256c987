//! A cancellable context standing in for the enclosing `context.Context`
//! that spec §5 requires every suspension point to select against.
//!
//! Modeled as a channel that is closed on cancellation: `done()` hands
//! out clones of a [`crossbeam_channel::Receiver`] that becomes ready
//! (with a closed-channel error) the instant the context is cancelled,
//! so call sites can `select!` between useful work and cancellation the
//! same way Go code selects on `ctx.Done()`.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::EngineError;

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done_rx) = bounded(0);
        Context {
            inner: Arc::new(Inner {
                done_tx: Mutex::new(Some(done_tx)),
                done_rx,
            }),
        }
    }

    /// Cancel this context and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.inner.done_tx.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.done_is_closed()
    }

    fn done_is_closed(&self) -> bool {
        self.inner.done_tx.lock().is_none()
    }

    /// Receiver that becomes ready once this context is cancelled.
    /// Clone it freely; all clones observe the same cancellation.
    pub fn done(&self) -> Receiver<()> {
        self.inner.done_rx.clone()
    }

    pub fn err(&self) -> Option<EngineError> {
        if self.done_is_closed() {
            Some(EngineError::Cancelled)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_cancelled() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());
        assert!(ctx.err().is_none());
    }

    #[test]
    fn cancel_is_observable_from_clones() {
        let ctx = Context::new();
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.err(), Some(EngineError::Cancelled));
    }

    #[test]
    fn cancel_is_idempotent() {
        let ctx = Context::new();
        ctx.cancel();
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }
}
