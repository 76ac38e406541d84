//! Cooperative cancellation shared between the workflow and module runs

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// A cloneable cancellation signal
///
/// Cancelling a token cancels every child created from it. Cancelling a
/// child leaves its parent untouched.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: watch::Sender<bool>,
    children: Mutex<Vec<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.state.borrow()
    }

    pub fn cancel(&self) {
        if self.inner.state.send_replace(true) {
            return;
        }
        let children = std::mem::take(&mut *self.children());
        for child in children {
            child.cancel();
        }
    }

    /// Create a token that is cancelled together with this one
    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut children = self.children();
        if self.is_cancelled() {
            child.cancel();
        } else {
            children.retain(|c| !c.is_cancelled());
            children.push(child.clone());
        }
        child
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail while awaited.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    fn children(&self) -> MutexGuard<'_, Vec<CancellationToken>> {
        match self.inner.children.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
