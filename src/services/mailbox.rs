//! Conflated single-slot mailbox
//!
//! Writing always succeeds and overwrites any unconsumed value. Reading
//! waits until a value is present and consumes it, so a slow consumer only
//! ever sees the most recent value. Values are never observed out of
//! arrival order, but intermediate ones may be skipped.

use crate::infra::error::TelemetryError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

pub struct Mailbox<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot { value: None, closed: false }),
                notify: Notify::new(),
            }),
        }
    }

    /// Store a value, replacing any unconsumed one.
    /// Returns true if an unconsumed value was overwritten.
    /// Writes after `close` are discarded.
    pub fn offer(&self, value: T) -> bool {
        let replaced = {
            let mut slot = self.shared.slot.lock();
            if slot.closed {
                return false;
            }
            slot.value.replace(value).is_some()
        };
        self.shared.notify.notify_one();
        replaced
    }

    /// Take the current value without waiting
    pub fn try_recv(&self) -> Option<T> {
        self.shared.slot.lock().value.take()
    }

    /// Wait for the next value. Fails once the mailbox is closed and empty.
    pub async fn recv(&self) -> Result<T, TelemetryError> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent offer or close is not missed
            notified.as_mut().enable();

            {
                let mut slot = self.shared.slot.lock();
                if let Some(value) = slot.value.take() {
                    return Ok(value);
                }
                if slot.closed {
                    return Err(TelemetryError::MailboxClosed);
                }
            }

            notified.await;
        }
    }

    /// Close the mailbox and wake every waiting consumer
    pub fn close(&self) {
        self.shared.slot.lock().closed = true;
        self.shared.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.slot.lock().closed
    }
}
