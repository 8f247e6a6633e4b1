//! Groups continuation lines into the entry they continue.
//!
//! Rows are passed through 1:1. A row with neither a timestamp nor a known
//! level continues the entry before it: it reports that entry's
//! `log_entry_index`, and the `timestamp` and `log_level` of the entry's
//! first row. Any other row starts a new entry.

use crate::processing::{overwrite_column, ProcessingLogSource, Processor};
use tailview_core::column::columns;
use tailview_core::{
    ColumnDescriptor, LogBuffer, LogBufferArray, LogBufferExt, LogEntryIndex, LogLevel, LogLineIndex, LogSource,
    LogSourceExt, LogSourceSection, Rows, SourceResult,
};

/// Multi-line grouping on top of one upstream source.
pub type MultiLineLogSource = ProcessingLogSource<MultiLineProcessor>;

/// Per row: the entry it belongs to and that entry's first row.
#[derive(Debug, Default)]
pub struct MultiLineProcessor {
    entries: Vec<LogEntryIndex>,
    first_rows: Vec<LogLineIndex>,
}

impl MultiLineProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, row: LogLineIndex) -> LogEntryIndex {
        row.value()
            .and_then(|row| self.entries.get(row))
            .copied()
            .unwrap_or(LogEntryIndex::INVALID)
    }

    fn first_row(&self, row: LogLineIndex) -> LogLineIndex {
        row.value()
            .and_then(|row| self.first_rows.get(row))
            .copied()
            .unwrap_or(LogLineIndex::INVALID)
    }
}

fn continues_previous(rows: &LogBufferArray, offset: usize) -> bool {
    let level = rows.get(&columns::LOG_LEVEL, offset);
    rows.get(&columns::TIMESTAMP, offset).is_none() && matches!(level, LogLevel::None | LogLevel::Other)
}

impl Processor for MultiLineProcessor {
    fn columns_to_fetch(&self) -> Vec<ColumnDescriptor> {
        vec![columns::TIMESTAMP.descriptor(), columns::LOG_LEVEL.descriptor()]
    }

    fn on_reset(&mut self) -> SourceResult<()> {
        self.entries.clear();
        self.first_rows.clear();
        Ok(())
    }

    fn on_removed(&mut self, index: usize) -> SourceResult<()> {
        self.entries.truncate(index);
        self.first_rows.truncate(index);
        Ok(())
    }

    fn on_appended(&mut self, section: LogSourceSection, rows: &LogBufferArray) -> SourceResult<()> {
        for (offset, row) in section.iter().enumerate() {
            if row.value() != Some(self.entries.len()) {
                tracing::warn!(%row, expected = self.entries.len(), "skipping out of order row");
                continue;
            }
            let (entry, first_row) = match (self.entries.last(), self.first_rows.last()) {
                (Some(&entry), Some(&first_row)) if continues_previous(rows, offset) => (entry, first_row),
                (Some(entry), _) => (entry.next(), row),
                _ => (LogEntryIndex::new(0), row),
            };
            self.entries.push(entry);
            self.first_rows.push(first_row);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get_entries(
        &self,
        upstream: &dyn LogSource,
        rows: Rows<'_>,
        destination: &mut dyn LogBuffer,
        destination_index: usize,
    ) -> SourceResult<()> {
        upstream.get_entries(rows, destination, destination_index)?;
        overwrite_column(
            destination,
            &columns::LOG_ENTRY_INDEX,
            destination_index,
            rows.iter().map(|row| self.entry(row)),
        )?;

        let wants_timestamp = destination.contains(&columns::TIMESTAMP.descriptor());
        let wants_level = destination.contains(&columns::LOG_LEVEL.descriptor());
        if wants_timestamp || wants_level {
            let first_rows: Vec<LogLineIndex> = rows.iter().map(|row| self.first_row(row)).collect();
            if wants_timestamp {
                let timestamps = upstream.get_column(&first_rows, &columns::TIMESTAMP)?;
                overwrite_column(destination, &columns::TIMESTAMP, destination_index, timestamps)?;
            }
            if wants_level {
                let levels = upstream.get_column(&first_rows, &columns::LOG_LEVEL)?;
                overwrite_column(destination, &columns::LOG_LEVEL, destination_index, levels)?;
            }
        }
        Ok(())
    }
}
