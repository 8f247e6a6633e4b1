//! A directly appendable, buffer-backed log source.
//!
//! [`InMemoryLogSource`] is both the reference implementation of
//! [`LogSource`] and the test double every other source is exercised
//! against. Rows are added synchronously; listeners are notified before the
//! adding call returns.
//!
//! The source owns the bookkeeping columns: index, original index, line
//! numbers, log entry index, elapsed time and delta time are always derived
//! here, never taken from the caller.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tailview_core::buffer::{LogBufferExt, LogBufferList, LogEntry};
use tailview_core::column::columns;
use tailview_core::property::properties;
use tailview_core::source::read_from_buffer;
use tailview_core::{
    ColumnDescriptor, ListenerCollection, LogBuffer, LogEntryIndex, LogLevel, LogLineIndex, LogSource,
    LogSourceListener, PropertiesBuffer, PropertyDescriptor, Rows, SourceResult, Value,
};

struct MemoryState {
    buffer: LogBufferList,
    properties: PropertiesBuffer,
}

/// Mutable log source backed by a [`LogBufferList`].
pub struct InMemoryLogSource {
    state: Mutex<MemoryState>,
    listeners: ListenerCollection,
}

impl Default for InMemoryLogSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLogSource {
    /// Source offering the minimum column set.
    pub fn new() -> Self {
        Self::with_columns(Vec::new())
    }

    /// Source offering the minimum column set plus `columns`.
    pub fn with_columns(extra: impl IntoIterator<Item = ColumnDescriptor>) -> Self {
        let mut values = PropertiesBuffer::minimum();
        values.set(&properties::SIZE, Some(0));
        values.set(&properties::PERCENTAGE_PROCESSED, 1.0);
        Self {
            state: Mutex::new(MemoryState {
                buffer: LogBufferList::new(columns::combine_with_minimum(extra)),
                properties: values,
            }),
            listeners: ListenerCollection::new(),
        }
    }

    /// Convenience constructor returning the source behind an [`Arc`], which
    /// is how sources are shared with derived views.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends one row holding `raw_content`.
    pub fn add_entry(
        &self,
        raw_content: &str,
        level: LogLevel,
        timestamp: Option<DateTime<Utc>>,
    ) -> SourceResult<LogLineIndex> {
        self.add(
            &LogEntry::new()
                .with(&columns::RAW_CONTENT, Some(raw_content.to_string()))
                .with(&columns::LOG_LEVEL, level)
                .with(&columns::TIMESTAMP, timestamp),
        )
    }

    /// Appends one row. Values for bookkeeping columns are ignored.
    pub fn add(&self, entry: &LogEntry) -> SourceResult<LogLineIndex> {
        let mut state = self.state.lock();
        let timestamp = entry.get(&columns::TIMESTAMP).flatten();
        let index = state.append_row(entry, timestamp, None)?;
        state.touch();
        self.listeners.on_read(state.buffer.len());
        Ok(index)
    }

    /// Appends several rows, notifying listeners once. On error the rows
    /// before the failing one stay and are announced.
    pub fn add_range<'a>(&self, entries: impl IntoIterator<Item = &'a LogEntry>) -> SourceResult<()> {
        let mut state = self.state.lock();
        let result: SourceResult<()> = entries.into_iter().try_for_each(|entry| {
            let timestamp = entry.get(&columns::TIMESTAMP).flatten();
            state.append_row(entry, timestamp, None).map(|_| ())
        });
        state.touch();
        self.listeners.on_read(state.buffer.len());
        result
    }

    /// Appends one log entry spanning several lines. Every line shares the
    /// entry's index, level and timestamp.
    pub fn add_multiline_entry(
        &self,
        level: LogLevel,
        timestamp: Option<DateTime<Utc>>,
        lines: &[&str],
    ) -> SourceResult<()> {
        let mut state = self.state.lock();
        let mut entry_index = None;
        let result: SourceResult<()> = lines.iter().try_for_each(|line| {
            let entry = LogEntry::new()
                .with(&columns::RAW_CONTENT, Some(line.to_string()))
                .with(&columns::LOG_LEVEL, level);
            let row = state.append_row(&entry, timestamp, entry_index)?;
            entry_index = Some(state.buffer.get(&columns::LOG_ENTRY_INDEX, row.value().unwrap_or_default()));
            Ok(())
        });
        state.touch();
        self.listeners.on_read(state.buffer.len());
        result
    }

    /// Appends `count` rows holding nothing but bookkeeping values.
    pub fn add_empty_entries(&self, count: usize) -> SourceResult<()> {
        let empty = LogEntry::new();
        self.add_range(std::iter::repeat(&empty).take(count))
    }

    /// Inserts one row before `index`. Listeners see every row from `index`
    /// onwards removed and re-appended.
    pub fn insert(&self, index: usize, entry: &LogEntry) -> SourceResult<()> {
        let mut state = self.state.lock();
        let len = state.buffer.len();
        if index >= len {
            drop(state);
            return self.add(entry).map(|_| ());
        }

        let timestamp = entry.get(&columns::TIMESTAMP).flatten();
        state.update_timestamp_properties(timestamp);
        state.buffer.insert(index, entry)?;
        state.renumber_after_insert(index)?;
        state.note_width(entry);
        state.touch();
        self.listeners.remove(index, len - index);
        self.listeners.on_read(state.buffer.len());
        Ok(())
    }

    /// Removes every row at or after `index`.
    pub fn remove_from(&self, index: usize) {
        let mut state = self.state.lock();
        let len = state.buffer.len();
        if index > len {
            tracing::warn!(index, len, "ignoring removal past the end");
            return;
        }
        state.buffer.remove_range(index, len - index);
        state.recompute_properties();
        state.touch();
        self.listeners.remove(index, len - index);
    }

    /// Removes every row and resets the derived properties.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if state.buffer.is_empty() {
            return;
        }
        state.buffer.clear();
        state.properties.set(&properties::LOG_ENTRY_COUNT, 0);
        state.properties.set(&properties::MAX_CHARACTERS_IN_LINE, 0);
        state.properties.set(&properties::START_TIMESTAMP, None);
        state.properties.set(&properties::END_TIMESTAMP, None);
        state.properties.set(&properties::DURATION, None);
        state.properties.set(&properties::SIZE, Some(0));
        state.touch();
        self.listeners.reset();
    }

    /// Delivers rows held back by listeners' rate limits.
    pub fn flush(&self) {
        let _state = self.state.lock();
        self.listeners.flush();
    }
}

impl MemoryState {
    /// Appends one row, deriving every bookkeeping column. A given
    /// `entry_index` places the row into that entry instead of a new one.
    fn append_row(
        &mut self,
        entry: &LogEntry,
        timestamp: Option<DateTime<Utc>>,
        entry_index: Option<LogEntryIndex>,
    ) -> SourceResult<LogLineIndex> {
        let row = self.buffer.len();
        let (previous_entry, previous_timestamp) = match row.checked_sub(1) {
            Some(last) => (
                self.buffer.get(&columns::LOG_ENTRY_INDEX, last),
                self.buffer.get(&columns::TIMESTAMP, last),
            ),
            None => (LogEntryIndex::INVALID, None),
        };
        let entry_index = entry_index.unwrap_or(if row == 0 {
            LogEntryIndex::new(0)
        } else {
            previous_entry.next()
        });
        let start = match (self.properties.get(&properties::START_TIMESTAMP), timestamp) {
            (Some(start), Some(timestamp)) => Some(start.min(timestamp)),
            (start, timestamp) => start.or(timestamp),
        };

        let mut row_entry = entry.clone();
        row_entry.set(&columns::INDEX, LogLineIndex::new(row));
        row_entry.set(&columns::ORIGINAL_INDEX, LogLineIndex::new(row));
        row_entry.set(&columns::LINE_NUMBER, row + 1);
        row_entry.set(&columns::ORIGINAL_LINE_NUMBER, row + 1);
        row_entry.set(&columns::LOG_ENTRY_INDEX, entry_index);
        row_entry.set(&columns::TIMESTAMP, timestamp);
        row_entry.set(&columns::ELAPSED_TIME, difference(timestamp, start));
        row_entry.set(&columns::DELTA_TIME, difference(timestamp, previous_timestamp));
        self.buffer.push(&row_entry)?;

        self.update_timestamp_properties(timestamp);
        self.note_width(entry);
        self.properties.set(&properties::LOG_ENTRY_COUNT, self.buffer.len());
        Ok(LogLineIndex::new(row))
    }

    fn note_width(&mut self, entry: &LogEntry) {
        let width = entry
            .get(&columns::RAW_CONTENT)
            .flatten()
            .map_or(0, |content| content.chars().count());
        let max_width = self.properties.get(&properties::MAX_CHARACTERS_IN_LINE).max(width);
        self.properties.set(&properties::MAX_CHARACTERS_IN_LINE, max_width);
    }

    /// Re-derives the bookkeeping columns after a row was inserted at
    /// `inserted`. The inserted row starts a new entry; every later row keeps
    /// its grouping and moves one entry back.
    fn renumber_after_insert(&mut self, inserted: usize) -> SourceResult<()> {
        for row in inserted..self.buffer.len() {
            let entry_index = if row == inserted {
                match row.checked_sub(1) {
                    Some(previous) => self.buffer.get(&columns::LOG_ENTRY_INDEX, previous).next(),
                    None => LogEntryIndex::new(0),
                }
            } else {
                self.buffer.get(&columns::LOG_ENTRY_INDEX, row).next()
            };
            self.buffer.set(&columns::INDEX, row, LogLineIndex::new(row))?;
            self.buffer.set(&columns::ORIGINAL_INDEX, row, LogLineIndex::new(row))?;
            self.buffer.set(&columns::LINE_NUMBER, row, row + 1)?;
            self.buffer.set(&columns::ORIGINAL_LINE_NUMBER, row, row + 1)?;
            self.buffer.set(&columns::LOG_ENTRY_INDEX, row, entry_index)?;
        }

        // The start timestamp may have moved, so every row's times change.
        let start = self.properties.get(&properties::START_TIMESTAMP);
        let mut previous_timestamp = None;
        for row in 0..self.buffer.len() {
            let timestamp = self.buffer.get(&columns::TIMESTAMP, row);
            self.buffer.set(&columns::ELAPSED_TIME, row, difference(timestamp, start))?;
            self.buffer
                .set(&columns::DELTA_TIME, row, difference(timestamp, previous_timestamp))?;
            previous_timestamp = timestamp;
        }
        let count = self.buffer.len();
        self.properties.set(&properties::LOG_ENTRY_COUNT, count);
        Ok(())
    }

    /// Re-derives count, time range and width from the rows that remain.
    fn recompute_properties(&mut self) {
        let count = self.buffer.len();
        let mut start: Option<DateTime<Utc>> = None;
        let mut end: Option<DateTime<Utc>> = None;
        let mut widest = 0;
        for row in 0..count {
            if let Some(timestamp) = self.buffer.get(&columns::TIMESTAMP, row) {
                start = Some(start.map_or(timestamp, |start| start.min(timestamp)));
                end = Some(end.map_or(timestamp, |end| end.max(timestamp)));
            }
            let width = self
                .buffer
                .get(&columns::RAW_CONTENT, row)
                .map_or(0, |content| content.chars().count());
            widest = widest.max(width);
        }
        self.properties.set(&properties::LOG_ENTRY_COUNT, count);
        self.properties.set(&properties::START_TIMESTAMP, start);
        self.properties.set(&properties::END_TIMESTAMP, end);
        self.properties.set(&properties::DURATION, start.zip(end).map(|(start, end)| end - start));
        self.properties.set(&properties::MAX_CHARACTERS_IN_LINE, widest);
    }

    fn update_timestamp_properties(&mut self, timestamp: Option<DateTime<Utc>>) {
        let Some(timestamp) = timestamp else {
            return;
        };
        let start = match self.properties.get(&properties::START_TIMESTAMP) {
            Some(start) if start <= timestamp => start,
            _ => timestamp,
        };
        let end = match self.properties.get(&properties::END_TIMESTAMP) {
            Some(end) if end >= timestamp => end,
            _ => timestamp,
        };
        self.properties.set(&properties::START_TIMESTAMP, Some(start));
        self.properties.set(&properties::END_TIMESTAMP, Some(end));
        self.properties.set(&properties::DURATION, Some(end - start));
    }

    fn touch(&mut self) {
        self.properties.set(&properties::LAST_MODIFIED, Some(Utc::now()));
    }
}

pub(crate) fn difference(
    timestamp: Option<DateTime<Utc>>,
    earlier: Option<DateTime<Utc>>,
) -> Option<chrono::TimeDelta> {
    Some(timestamp? - earlier?)
}

impl LogSource for InMemoryLogSource {
    fn columns(&self) -> Vec<ColumnDescriptor> {
        self.state.lock().buffer.columns().to_vec()
    }

    fn properties(&self) -> Vec<PropertyDescriptor> {
        self.state.lock().properties.descriptors()
    }

    fn get_property_value(&self, property: &PropertyDescriptor) -> Value {
        self.state.lock().properties.value(property)
    }

    fn get_all_properties(&self, destination: &mut PropertiesBuffer) {
        destination.copy_from(&self.state.lock().properties);
    }

    fn set_property_value(&self, property: &PropertyDescriptor, value: Value) {
        self.state.lock().properties.set_value(property, value);
    }

    fn get_entries(&self, rows: Rows<'_>, destination: &mut dyn LogBuffer, destination_index: usize) -> SourceResult<()> {
        let state = self.state.lock();
        read_from_buffer(&state.buffer, rows, destination, destination_index)
    }

    fn add_listener(&self, listener: Arc<dyn LogSourceListener>, max_wait: Duration, max_line_count: usize) {
        self.listeners.add_listener(listener, max_wait, max_line_count);
    }

    fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) {
        self.listeners.remove_listener(listener);
    }
}

impl std::fmt::Debug for InMemoryLogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLogSource")
            .field("len", &self.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}
