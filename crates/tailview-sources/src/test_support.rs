use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tailview_core::{LogSourceListener, LogSourceModification};

/// Records every modification it is told about.
#[derive(Default)]
pub(crate) struct Recorder {
    modifications: Mutex<Vec<LogSourceModification>>,
}

impl Recorder {
    pub(crate) fn take(&self) -> Vec<LogSourceModification> {
        std::mem::take(&mut *self.modifications.lock())
    }
}

impl LogSourceListener for Recorder {
    fn on_modified(&self, modification: LogSourceModification) {
        self.modifications.lock().push(modification);
    }
}

/// A whole-second timestamp relative to a fixed origin.
pub(crate) fn at(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).single()
}
