//! The ordering and grouping metadata of a merged view.
//!
//! One [`MergedRow`] per visible row, kept sorted by timestamp. The index
//! stores no log content: it only maps merged rows to `(source, row)` and
//! assigns merged log entry indices.
//!
//! Processing a batch applies resets first, then removals, then appends.
//! Appended rows are stable-sorted by timestamp before insertion, so each
//! one lands after every row with an equal or earlier timestamp and rows of
//! equal timestamp keep their arrival order.

use super::changes::MergedChanges;
use chrono::{DateTime, Utc};
use tailview_core::column::columns;
use tailview_core::{
    ColumnDescriptor, LogBuffer, LogBufferExt, LogEntryIndex, LogEntrySourceId, LogLineIndex, LogSourceModification,
};

/// Where one merged row comes from and which merged entry it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergedRow {
    pub(crate) source_id: LogEntrySourceId,
    pub(crate) source_row: usize,
    /// Log entry index of the row within its own source.
    pub(crate) original_entry: LogEntryIndex,
    pub(crate) merged_entry: LogEntryIndex,
    pub(crate) timestamp: DateTime<Utc>,
}

impl MergedRow {
    fn same_entry(&self, other: &MergedRow) -> bool {
        self.source_id == other.source_id && self.original_entry == other.original_entry
    }
}

/// A row of one source waiting to be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub(crate) source_id: LogEntrySourceId,
    pub(crate) source_row: usize,
    pub(crate) original_entry: LogEntryIndex,
    pub(crate) timestamp: DateTime<Utc>,
}

/// The columns [`candidates`] needs from a source.
pub(crate) fn candidate_columns() -> Vec<ColumnDescriptor> {
    vec![
        columns::INDEX.descriptor(),
        columns::LOG_ENTRY_INDEX.descriptor(),
        columns::TIMESTAMP.descriptor(),
    ]
}

/// The mergeable rows of `rows`. Rows without a timestamp are left out, as
/// are rows the source no longer had by the time they were fetched.
pub(crate) fn candidates(source_id: LogEntrySourceId, rows: &dyn LogBuffer) -> Vec<Candidate> {
    (0..rows.len())
        .filter_map(|row| {
            let source_row = rows.get(&columns::INDEX, row).value()?;
            let original_entry = rows.get(&columns::LOG_ENTRY_INDEX, row);
            let timestamp = rows.get(&columns::TIMESTAMP, row)?;
            original_entry.is_valid().then_some(Candidate {
                source_id,
                source_row,
                original_entry,
                timestamp,
            })
        })
        .collect()
}

/// One source's change, with the rows it appended already fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceChange {
    Reset,
    /// Every row of the source at or after this row is gone.
    Removed(usize),
    Appended(Vec<Candidate>),
}

/// Drops work that later modifications of the same source make moot: all
/// modifications before a source's last reset, and appended rows a later
/// removal takes back.
pub(crate) fn optimize(pending: Vec<(LogEntrySourceId, LogSourceModification)>) -> Vec<(LogEntrySourceId, LogSourceModification)> {
    let mut optimized: Vec<(LogEntrySourceId, LogSourceModification)> = Vec::with_capacity(pending.len());
    for (source_id, modification) in pending {
        match modification {
            LogSourceModification::Reset => {
                optimized.retain(|(id, _)| *id != source_id);
            }
            LogSourceModification::Removed(section) => {
                let Some(index) = section.index.value() else {
                    continue;
                };
                optimized.retain_mut(|(id, earlier)| {
                    if *id != source_id {
                        return true;
                    }
                    match earlier {
                        LogSourceModification::Appended(appended) => match appended.index.value() {
                            Some(start) if start >= index => false,
                            Some(start) => {
                                appended.count = appended.count.min(index - start);
                                true
                            }
                            None => false,
                        },
                        _ => true,
                    }
                });
            }
            LogSourceModification::Appended(section) if section.count == 0 => continue,
            LogSourceModification::Appended(_) => {}
        }
        optimized.push((source_id, modification));
    }
    optimized
}

#[derive(Debug, Default)]
pub(crate) struct MergedIndex {
    rows: Vec<MergedRow>,
}

impl MergedIndex {
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn get(&self, row: LogLineIndex) -> Option<&MergedRow> {
        row.value().and_then(|row| self.rows.get(row))
    }

    pub(crate) fn rows(&self) -> &[MergedRow] {
        &self.rows
    }

    /// Applies one batch and returns the notifications describing it.
    pub(crate) fn process(&mut self, pending: Vec<(LogEntrySourceId, SourceChange)>) -> Vec<LogSourceModification> {
        let mut changes = MergedChanges::new(self.rows.len());
        let mut renumber_from: Option<usize> = None;
        let mut note_renumber = |from: usize| {
            renumber_from = Some(renumber_from.map_or(from, |current: usize| current.min(from)));
        };

        for (source_id, change) in &pending {
            if let SourceChange::Reset = change {
                if let Some(first) = self.remove_where(|row| row.source_id == *source_id) {
                    self.note_removal(&mut changes, first);
                    note_renumber(first);
                }
            }
        }

        for (source_id, change) in &pending {
            if let SourceChange::Removed(index) = change {
                let index = *index;
                if let Some(first) = self.remove_where(|row| row.source_id == *source_id && row.source_row >= index) {
                    self.note_removal(&mut changes, first);
                    note_renumber(first);
                }
            }
        }

        let mut appended: Vec<Candidate> = pending
            .into_iter()
            .filter_map(|(_, change)| match change {
                SourceChange::Appended(candidates) => Some(candidates),
                _ => None,
            })
            .flatten()
            .collect();
        appended.sort_by_key(|candidate| candidate.timestamp);

        for candidate in appended {
            let position = self.insertion_point(candidate.timestamp);
            if position < self.rows.len() {
                changes.remove_from(position);
                note_renumber(position);
            }
            let mut row = MergedRow {
                source_id: candidate.source_id,
                source_row: candidate.source_row,
                original_entry: candidate.original_entry,
                merged_entry: LogEntryIndex::INVALID,
                timestamp: candidate.timestamp,
            };
            row.merged_entry = self.entry_for(position, &row);
            self.rows.insert(position, row);
        }

        if let Some(from) = renumber_from {
            for position in from..self.rows.len() {
                self.rows[position].merged_entry = self.entry_for(position, &self.rows[position]);
            }
        }

        changes.into_modifications(self.rows.len())
    }

    /// Removes every matching row; returns the position of the first one.
    fn remove_where(&mut self, matches: impl Fn(&MergedRow) -> bool) -> Option<usize> {
        let first = self.rows.iter().position(&matches)?;
        self.rows.retain(|row| !matches(row));
        Some(first)
    }

    fn note_removal(&self, changes: &mut MergedChanges, first: usize) {
        if self.rows.is_empty() {
            changes.reset();
        } else {
            changes.remove_from(first);
        }
    }

    /// The first position after every row with a timestamp at or before
    /// `timestamp`.
    fn insertion_point(&self, timestamp: DateTime<Utc>) -> usize {
        match self.rows.last() {
            None => 0,
            Some(last) if timestamp >= last.timestamp => self.rows.len(),
            Some(_) => self.rows.partition_point(|row| row.timestamp <= timestamp),
        }
    }

    /// The merged entry of `row` placed at `position`: the entry of the row
    /// before it when both continue the same source entry, the next entry
    /// otherwise.
    fn entry_for(&self, position: usize, row: &MergedRow) -> LogEntryIndex {
        match position.checked_sub(1).and_then(|previous| self.rows.get(previous)) {
            Some(previous) if previous.same_entry(row) => previous.merged_entry,
            Some(previous) => previous.merged_entry.next(),
            None => LogEntryIndex::new(0),
        }
    }
}
