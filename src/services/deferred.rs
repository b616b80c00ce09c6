//! Single-assignment deferred value
//!
//! Resolves at most once; every waiter observes the same value. A resolved
//! instance is never reset - session boundaries swap in a fresh instance.

use std::sync::Arc;
use tokio::sync::watch;

pub struct Deferred<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Resolve with `value`. Returns false if already resolved.
    pub fn complete(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn is_completed(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// True if both handles refer to the same instance
    pub fn same_instance(&self, other: &Deferred<T>) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    /// Wait until resolved
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            // Sender dropped without a value: never resolves
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
