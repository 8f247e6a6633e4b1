//! A listener that remembers what it was told.

use parking_lot::Mutex;
use std::sync::Arc;
use tailview::{LogSourceListener, LogSourceModification};

#[derive(Default)]
pub struct Recorder {
    modifications: Mutex<Vec<LogSourceModification>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything recorded since the last call.
    pub fn take(&self) -> Vec<LogSourceModification> {
        std::mem::take(&mut *self.modifications.lock())
    }

    /// Row count a consumer replaying the recorded modifications would hold.
    pub fn replayed_count(modifications: &[LogSourceModification]) -> usize {
        modifications.iter().fold(0, |count, modification| match modification {
            LogSourceModification::Reset => 0,
            LogSourceModification::Appended(section) => section.end().unwrap_or(count),
            LogSourceModification::Removed(section) => section.index.value().unwrap_or(count),
        })
    }
}

impl LogSourceListener for Recorder {
    fn on_modified(&self, modification: LogSourceModification) {
        self.modifications.lock().push(modification);
    }
}
