//! Compresses everything one processing pass did to the merged index into
//! the fewest notifications listeners need.

use tailview_core::LogSourceModification;

/// What one pass changed, relative to the rows listeners already knew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergedChanges {
    /// Rows before the pass.
    initial_count: usize,
    /// The view was emptied at some point during the pass.
    reset: bool,
    /// Lowest previously existing row that changed.
    first_removed: Option<usize>,
}

impl MergedChanges {
    pub(crate) fn new(initial_count: usize) -> Self {
        Self {
            initial_count,
            reset: false,
            first_removed: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.reset = true;
        self.first_removed = None;
    }

    /// Every row from `index` on is no longer what listeners were told.
    /// Rows listeners never saw need no removal.
    pub(crate) fn remove_from(&mut self, index: usize) {
        if self.reset || index >= self.initial_count {
            return;
        }
        self.first_removed = Some(self.first_removed.map_or(index, |first| first.min(index)));
    }

    pub(crate) fn first_removed(&self) -> Option<usize> {
        self.first_removed
    }

    /// The notifications turning the old view into one of `final_count`
    /// rows: a reset or a single removal, then a single append.
    pub(crate) fn into_modifications(self, final_count: usize) -> Vec<LogSourceModification> {
        let mut modifications = Vec::with_capacity(2);
        let unchanged = if self.reset {
            modifications.push(LogSourceModification::Reset);
            0
        } else if let Some(first) = self.first_removed {
            modifications.push(LogSourceModification::removed(first, self.initial_count - first));
            first
        } else {
            self.initial_count
        };
        if final_count > unchanged {
            modifications.push(LogSourceModification::appended(unchanged, final_count - unchanged));
        }
        modifications
    }
}
