//! Before/after capture windows around triggering events
//!
//! A window is registered with a snapshot of the samples seen before the
//! trigger. Every new sample is appended to all in-flight windows; a window
//! whose post-buffer reaches the threshold fires its completion callback once
//! and is removed. `flush_all` fires every remaining window regardless of
//! size so nothing is lost at session end.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Completion callback: (pre-buffer, post-buffer)
pub type WindowCallback<T> = Box<dyn FnOnce(Vec<T>, Vec<T>) + Send>;

/// Identifier of an in-flight window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct CaptureWindow<T> {
    pre: Vec<T>,
    post: Vec<T>,
    on_complete: WindowCallback<T>,
}

type Fired<T> = SmallVec<[(WindowId, CaptureWindow<T>); 4]>;

/// Tracks all in-flight capture windows
pub struct WindowTracker<T> {
    threshold: usize,
    next_id: AtomicU64,
    windows: Mutex<FxHashMap<WindowId, CaptureWindow<T>>>,
}

impl<T: Clone> WindowTracker<T> {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            next_id: AtomicU64::new(1),
            windows: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Register a window with the given pre-trigger snapshot
    pub fn register(&self, pre: Vec<T>, on_complete: WindowCallback<T>) -> WindowId {
        let id = WindowId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(window_id = %id, pre_len = %pre.len(), "capture_window_registered");
        self.windows.lock().insert(
            id,
            CaptureWindow { pre, post: Vec::with_capacity(self.threshold), on_complete },
        );
        id
    }

    /// Feed a sample to every in-flight window, firing the full ones.
    /// Returns the number of windows that fired.
    pub fn on_sample(&self, sample: T) -> usize {
        let fired: Fired<T> = {
            let mut windows = self.windows.lock();
            if windows.is_empty() {
                return 0;
            }
            for window in windows.values_mut() {
                window.post.push(sample.clone());
            }
            let full: SmallVec<[WindowId; 4]> = windows
                .iter()
                .filter(|(_, w)| w.post.len() >= self.threshold)
                .map(|(id, _)| *id)
                .collect();
            full.into_iter().filter_map(|id| windows.remove(&id).map(|w| (id, w))).collect()
        };
        Self::fire(fired, "capture_window_completed")
    }

    /// Fire every in-flight window now. Returns the number fired.
    pub fn flush_all(&self) -> usize {
        let fired: Fired<T> = self.windows.lock().drain().collect();
        Self::fire(fired, "capture_window_flushed")
    }

    /// Number of windows still collecting
    pub fn in_flight(&self) -> usize {
        self.windows.lock().len()
    }

    // Callbacks run outside the lock, in registration order
    fn fire(mut fired: Fired<T>, msg: &'static str) -> usize {
        fired.sort_by_key(|(id, _)| *id);
        let count = fired.len();
        for (id, window) in fired {
            debug!(window_id = %id, post_len = %window.post.len(), "{}", msg);
            (window.on_complete)(window.pre, window.post);
        }
        count
    }
}
