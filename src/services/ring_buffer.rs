//! Bounded, thread-safe buffer of recent location fixes
//!
//! Newest entries sit at the front. When full, the oldest (back) entry is
//! evicted before the new one is inserted.

use parking_lot::Mutex;
use std::collections::VecDeque;

pub struct RingBuffer<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, items: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the front, evicting the oldest sample if full
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            items.pop_back();
        }
        items.push_front(item);
    }

    /// Copy of the current contents, newest first
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().iter().cloned().collect()
    }

    /// Newest sample, if any
    pub fn latest(&self) -> Option<T> {
        self.items.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}
