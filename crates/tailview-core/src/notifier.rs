//! Rate-limited listener notification.
//!
//! A source calls [`ListenerCollection::on_read`] with its row count every
//! time it grows. Each listener has its own [`ListenerNotifier`] cursor which
//! turns those raw counts into `Appended` notifications according to the
//! listener's two limits:
//!
//! - `max_line_count`: report as soon as that many rows are pending, and
//!   never report more than that many rows in one notification.
//! - `max_wait`: report pending rows once that much time has passed since
//!   the last report.
//!
//! Removals are clipped to what a listener has actually been told, and a
//! reset is only forwarded when the listener has seen rows since the last
//! one.

use crate::source::{same_listener, LogSourceListener};
use crate::types::LogSourceModification;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// ListenerNotifier
// ---------------------------------------------------------------------------

/// Delivery cursor of a single listener.
pub struct ListenerNotifier {
    listener: Arc<dyn LogSourceListener>,
    max_wait: Duration,
    max_line_count: usize,
    /// Number of rows the listener has been told about.
    last_count: usize,
    last_report: Instant,
}

impl ListenerNotifier {
    /// Creates the cursor and immediately tells the listener to start from an
    /// empty source.
    pub fn new(listener: Arc<dyn LogSourceListener>, max_wait: Duration, max_line_count: usize) -> Self {
        let notifier = Self {
            listener,
            max_wait,
            max_line_count: max_line_count.max(1),
            last_count: 0,
            last_report: Instant::now(),
        };
        notifier.listener.on_modified(LogSourceModification::Reset);
        notifier
    }

    pub fn listener(&self) -> &Arc<dyn LogSourceListener> {
        &self.listener
    }

    /// Number of rows reported to the listener so far.
    pub fn last_count(&self) -> usize {
        self.last_count
    }

    /// The source now holds `count` rows.
    ///
    /// A count below what was reported means the tail was removed.
    pub fn on_read(&mut self, count: usize) {
        if count < self.last_count {
            self.remove(count, self.last_count - count);
            return;
        }

        let pending = count - self.last_count;
        if pending == 0 {
            return;
        }
        if pending >= self.max_line_count || self.last_report.elapsed() >= self.max_wait {
            self.report(count);
        }
    }

    /// The source was reset. Suppressed when the listener has seen no rows
    /// since its last reset.
    pub fn reset(&mut self) {
        if self.last_count == 0 {
            return;
        }
        self.listener.on_modified(LogSourceModification::Reset);
        self.last_count = 0;
        self.last_report = Instant::now();
    }

    /// Rows `[first, first + count)` and everything after them were removed.
    ///
    /// Only the portion the listener was told about is forwarded.
    pub fn remove(&mut self, first: usize, count: usize) {
        let end = first.saturating_add(count).min(self.last_count);
        if end > first {
            self.listener
                .on_modified(LogSourceModification::removed(first, end - first));
        }
        self.last_count = self.last_count.min(first);
    }

    /// Reports every pending row regardless of the limits.
    pub fn flush(&mut self, count: usize) {
        if count < self.last_count {
            self.remove(count, self.last_count - count);
        } else if count > self.last_count {
            self.report(count);
        } else {
            self.last_report = Instant::now();
        }
    }

    fn report(&mut self, count: usize) {
        while self.last_count < count {
            let chunk = (count - self.last_count).min(self.max_line_count);
            self.listener
                .on_modified(LogSourceModification::appended(self.last_count, chunk));
            self.last_count += chunk;
        }
        self.last_report = Instant::now();
    }
}

impl std::fmt::Debug for ListenerNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerNotifier")
            .field("max_wait", &self.max_wait)
            .field("max_line_count", &self.max_line_count)
            .field("last_count", &self.last_count)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ListenerCollection
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CollectionState {
    /// Row count of the owning source as last announced.
    count: usize,
    notifiers: Vec<ListenerNotifier>,
}

/// The listeners of one source plus the source's current row count.
///
/// Listener callbacks run while the collection's lock is held, so a listener
/// must not call back into the collection that notifies it.
#[derive(Default)]
pub struct ListenerCollection {
    state: Mutex<CollectionState>,
}

impl ListenerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener`; adding the same listener twice is a no-op.
    ///
    /// The listener receives a `Reset` followed by every current row right
    /// away, chunked by its line limit. Its rate limit only applies to later
    /// growth.
    pub fn add_listener(&self, listener: Arc<dyn LogSourceListener>, max_wait: Duration, max_line_count: usize) {
        let mut state = self.state.lock();
        if state
            .notifiers
            .iter()
            .any(|notifier| same_listener(notifier.listener(), &listener))
        {
            return;
        }
        let mut notifier = ListenerNotifier::new(listener, max_wait, max_line_count);
        notifier.flush(state.count);
        state.notifiers.push(notifier);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) {
        self.state
            .lock()
            .notifiers
            .retain(|notifier| !same_listener(notifier.listener(), listener));
    }

    /// Drops every listener without notifying them.
    pub fn clear(&self) {
        self.state.lock().notifiers.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row count last announced through [`on_read`](Self::on_read).
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// The source now holds `count` rows.
    pub fn on_read(&self, count: usize) {
        let mut state = self.state.lock();
        state.count = count;
        for notifier in &mut state.notifiers {
            notifier.on_read(count);
        }
    }

    /// The source was reset to empty.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.count = 0;
        for notifier in &mut state.notifiers {
            notifier.reset();
        }
    }

    /// Rows from `first` onwards were removed; `count` is how many rows the
    /// source held past `first` before the removal.
    pub fn remove(&self, first: usize, count: usize) {
        let mut state = self.state.lock();
        state.count = state.count.min(first);
        for notifier in &mut state.notifiers {
            notifier.remove(first, count);
        }
    }

    /// Forces delivery of every pending row to every listener.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        let count = state.count;
        for notifier in &mut state.notifiers {
            notifier.flush(count);
        }
    }
}

impl std::fmt::Debug for ListenerCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ListenerCollection")
            .field("count", &state.count)
            .field("listeners", &state.notifiers.len())
            .finish()
    }
}
