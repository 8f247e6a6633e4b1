//! Listener adapters that turn upstream notifications into queue entries.
//!
//! Upstreams call their listeners from arbitrary threads. These adapters only
//! push onto an unbounded crossbeam channel and return; the owning source
//! drains the channel from its own periodic task.

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use tailview_core::{LogSourceListener, LogSourceModification};

/// Forwards every modification, tagged with `tag`, into a channel.
pub(crate) struct QueueListener<T> {
    tag: T,
    sender: Sender<(T, LogSourceModification)>,
}

impl<T: Copy + Send + Sync + 'static> QueueListener<T> {
    pub(crate) fn new(tag: T, sender: Sender<(T, LogSourceModification)>) -> Arc<Self> {
        Arc::new(Self { tag, sender })
    }
}

impl<T: Copy + Send + Sync + std::fmt::Debug + 'static> LogSourceListener for QueueListener<T> {
    fn on_modified(&self, modification: LogSourceModification) {
        tracing::trace!(tag = ?self.tag, %modification, "queued");
        // The receiving source may already be gone; nothing left to notify.
        let _ = self.sender.send((self.tag, modification));
    }
}

/// Unbounded multi-producer queue of tagged modifications.
pub(crate) fn pending_queue<T>() -> (Sender<(T, LogSourceModification)>, Receiver<(T, LogSourceModification)>) {
    crossbeam_channel::unbounded()
}
