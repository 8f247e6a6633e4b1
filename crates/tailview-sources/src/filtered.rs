//! A source which only exposes the upstream rows a [`LogEntryFilter`]
//! accepts.
//!
//! Accepted rows are re-indexed densely from 0. `index` and `line_number`
//! report the filtered position, `original_index` and
//! `original_line_number` the upstream row. Rows of one upstream entry that
//! survive filtering keep sharing a log entry index; `delta_time` is measured
//! against the previous *accepted* row.

use crate::memory::difference;
use crate::processing::{overwrite_column, write_positions, ProcessingLogSource, Processor};
use regex::Regex;
use tailview_core::column::{columns, combine};
use tailview_core::property::properties;
use tailview_core::{
    ColumnDescriptor, LogBuffer, LogBufferArray, LogBufferExt, LogEntryIndex, LogLevel, LogLineIndex, LogSource,
    LogSourceExt, LogSourceSection, PropertiesBuffer, Rows, SourceResult,
};

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Decides whether a single row is kept.
pub trait LogEntryFilter: Send + Sync {
    /// Columns [`passes`](LogEntryFilter::passes) reads.
    fn columns(&self) -> Vec<ColumnDescriptor>;

    /// Whether row `row` of `rows` is kept. `rows` holds at least
    /// [`columns`](LogEntryFilter::columns).
    fn passes(&self, rows: &dyn LogBuffer, row: usize) -> bool;
}

/// Keeps rows whose level is one of a set.
#[derive(Debug, Clone)]
pub struct LevelFilter {
    levels: Vec<LogLevel>,
}

impl LevelFilter {
    pub fn new(levels: impl IntoIterator<Item = LogLevel>) -> Self {
        Self {
            levels: levels.into_iter().collect(),
        }
    }

    /// Keeps `level` and everything more severe. Rows without a level are
    /// dropped, so continuation lines only survive behind a
    /// [`MultiLineLogSource`](crate::MultiLineLogSource).
    pub fn at_least(level: LogLevel) -> Self {
        Self::new(
            LogLevel::ALL
                .into_iter()
                .filter(|candidate| *candidate >= level && *candidate != LogLevel::None && *candidate != LogLevel::Other),
        )
    }
}

impl LogEntryFilter for LevelFilter {
    fn columns(&self) -> Vec<ColumnDescriptor> {
        vec![columns::LOG_LEVEL.descriptor()]
    }

    fn passes(&self, rows: &dyn LogBuffer, row: usize) -> bool {
        self.levels.contains(&rows.get(&columns::LOG_LEVEL, row))
    }
}

/// Keeps rows whose raw content contains a string, ignoring case.
#[derive(Debug, Clone)]
pub struct SubstringFilter {
    needle: String,
}

impl SubstringFilter {
    pub fn new(needle: &str) -> Self {
        Self {
            needle: needle.to_lowercase(),
        }
    }
}

impl LogEntryFilter for SubstringFilter {
    fn columns(&self) -> Vec<ColumnDescriptor> {
        vec![columns::RAW_CONTENT.descriptor()]
    }

    fn passes(&self, rows: &dyn LogBuffer, row: usize) -> bool {
        rows.get(&columns::RAW_CONTENT, row)
            .is_some_and(|content| content.to_lowercase().contains(&self.needle))
    }
}

/// Keeps rows whose raw content matches a regular expression.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    regex: Regex,
}

impl RegexFilter {
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        let regex = Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid filter pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl LogEntryFilter for RegexFilter {
    fn columns(&self) -> Vec<ColumnDescriptor> {
        vec![columns::RAW_CONTENT.descriptor()]
    }

    fn passes(&self, rows: &dyn LogBuffer, row: usize) -> bool {
        rows.get(&columns::RAW_CONTENT, row)
            .is_some_and(|content| self.regex.is_match(&content))
    }
}

/// Keeps rows every inner filter keeps. Without inner filters every row
/// passes.
#[derive(Default)]
pub struct AllOf {
    filters: Vec<Box<dyn LogEntryFilter>>,
}

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, filter: impl LogEntryFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl LogEntryFilter for AllOf {
    fn columns(&self) -> Vec<ColumnDescriptor> {
        self.filters
            .iter()
            .fold(Vec::new(), |acc, filter| combine(acc, filter.columns()))
    }

    fn passes(&self, rows: &dyn LogBuffer, row: usize) -> bool {
        self.filters.iter().all(|filter| filter.passes(rows, row))
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// A filtered view of one upstream source.
pub type FilteredLogSource = ProcessingLogSource<FilterProcessor>;

/// Row bookkeeping behind [`FilteredLogSource`].
pub struct FilterProcessor {
    filter: Box<dyn LogEntryFilter>,
    /// Upstream row of every accepted row.
    upstream_rows: Vec<LogLineIndex>,
    /// Upstream log entry index of every accepted row.
    upstream_entries: Vec<LogEntryIndex>,
    /// Own, dense log entry index of every accepted row.
    entries: Vec<LogEntryIndex>,
    widths: Vec<usize>,
}

impl FilterProcessor {
    pub fn new(filter: impl LogEntryFilter + 'static) -> Self {
        Self {
            filter: Box::new(filter),
            upstream_rows: Vec::new(),
            upstream_entries: Vec::new(),
            entries: Vec::new(),
            widths: Vec::new(),
        }
    }

    /// The upstream row behind filtered row `row`, or `INVALID`.
    pub fn upstream_row(&self, row: LogLineIndex) -> LogLineIndex {
        row.value()
            .and_then(|row| self.upstream_rows.get(row))
            .copied()
            .unwrap_or(LogLineIndex::INVALID)
    }

    /// The filtered row showing upstream row `upstream`, if it was accepted.
    pub fn filtered_row(&self, upstream: LogLineIndex) -> LogLineIndex {
        match self.upstream_rows.binary_search(&upstream) {
            Ok(row) => LogLineIndex::new(row),
            Err(_) => LogLineIndex::INVALID,
        }
    }

    fn entry(&self, row: LogLineIndex) -> LogEntryIndex {
        row.value()
            .and_then(|row| self.entries.get(row))
            .copied()
            .unwrap_or(LogEntryIndex::INVALID)
    }

    fn truncate(&mut self, len: usize) {
        self.upstream_rows.truncate(len);
        self.upstream_entries.truncate(len);
        self.entries.truncate(len);
        self.widths.truncate(len);
    }
}

impl Processor for FilterProcessor {
    fn columns_to_fetch(&self) -> Vec<ColumnDescriptor> {
        combine(
            self.filter.columns(),
            [columns::LOG_ENTRY_INDEX.descriptor(), columns::RAW_CONTENT.descriptor()],
        )
    }

    fn on_reset(&mut self) -> SourceResult<()> {
        self.truncate(0);
        Ok(())
    }

    fn on_removed(&mut self, index: usize) -> SourceResult<()> {
        let keep = self
            .upstream_rows
            .partition_point(|row| row.value().is_some_and(|row| row < index));
        self.truncate(keep);
        Ok(())
    }

    fn on_appended(&mut self, section: LogSourceSection, rows: &LogBufferArray) -> SourceResult<()> {
        for (offset, upstream_row) in section.iter().enumerate() {
            if !self.filter.passes(rows, offset) {
                continue;
            }
            let upstream_entry = rows.get(&columns::LOG_ENTRY_INDEX, offset);
            let entry = match (self.upstream_entries.last(), self.entries.last()) {
                (Some(previous), Some(&entry)) if upstream_entry.is_valid() && *previous == upstream_entry => entry,
                (_, Some(entry)) => entry.next(),
                (_, None) => LogEntryIndex::new(0),
            };
            let width = rows
                .get(&columns::RAW_CONTENT, offset)
                .map_or(0, |content| content.chars().count());

            self.upstream_rows.push(upstream_row);
            self.upstream_entries.push(upstream_entry);
            self.entries.push(entry);
            self.widths.push(width);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.upstream_rows.len()
    }

    fn overwrite_properties(&self, buffer: &mut PropertiesBuffer) {
        let widest = self.widths.iter().copied().max().unwrap_or(0);
        buffer.set(&properties::MAX_CHARACTERS_IN_LINE, widest);
    }

    fn get_entries(
        &self,
        upstream: &dyn LogSource,
        rows: Rows<'_>,
        destination: &mut dyn LogBuffer,
        destination_index: usize,
    ) -> SourceResult<()> {
        let upstream_rows: Vec<LogLineIndex> = rows.iter().map(|row| self.upstream_row(row)).collect();
        upstream.get_entries(Rows::Indices(&upstream_rows), destination, destination_index)?;

        write_positions(destination, destination_index, rows, self.len())?;
        overwrite_column(destination, &columns::ORIGINAL_INDEX, destination_index, upstream_rows.iter().copied())?;
        overwrite_column(
            destination,
            &columns::ORIGINAL_LINE_NUMBER,
            destination_index,
            upstream_rows.iter().map(|row| row.value().map_or(0, |row| row + 1)),
        )?;
        overwrite_column(
            destination,
            &columns::LOG_ENTRY_INDEX,
            destination_index,
            rows.iter().map(|row| self.entry(row)),
        )?;

        if destination.contains(&columns::DELTA_TIME.descriptor()) {
            let previous_rows: Vec<LogLineIndex> = rows
                .iter()
                .map(|row| match row.value() {
                    Some(row) if row < self.len() => self.upstream_row(LogLineIndex::new(row).previous()),
                    _ => LogLineIndex::INVALID,
                })
                .collect();
            let current = upstream.get_column(&upstream_rows, &columns::TIMESTAMP)?;
            let previous = upstream.get_column(&previous_rows, &columns::TIMESTAMP)?;
            overwrite_column(
                destination,
                &columns::DELTA_TIME,
                destination_index,
                current.into_iter().zip(previous).map(|(current, previous)| difference(current, previous)),
            )?;
        }
        Ok(())
    }
}
