//! Log buffers: column-oriented containers of N rows × a set of columns.
//!
//! All columns of a buffer always have the same length. Reading a cell that
//! lies outside the buffer yields the column's default value; writing past
//! the end is a caller bug reported as [`BufferError::TooSmall`].
//!
//! - [`LogBufferArray`] has a fixed length and is used for one-shot queries.
//! - [`LogBufferList`] grows and shrinks and is used to accumulate state.

use crate::column::{combine, Column, ColumnDescriptor};
use crate::error::{BufferError, BufferResult};
use crate::types::Rows;
use crate::value::{check_range, ColumnData, Value, ValueType};

// ---------------------------------------------------------------------------
// LogBuffer trait
// ---------------------------------------------------------------------------

/// A column-oriented buffer of log rows.
///
/// Buffers are not synchronised; share them across threads only behind a
/// lock.
pub trait LogBuffer: Send {
    fn columns(&self) -> &[ColumnDescriptor];

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage of the column with the given id.
    fn column_data(&self, id: &str) -> Option<&ColumnData>;

    fn column_data_mut(&mut self, id: &str) -> Option<&mut ColumnData>;

    fn contains(&self, column: &ColumnDescriptor) -> bool {
        self.column_data(column.id()).is_some()
    }

    /// Fails with [`BufferError::TooSmall`] unless rows
    /// `[offset, offset + count)` exist in this buffer.
    fn ensure_rows(&self, offset: usize, count: usize) -> BufferResult<()> {
        check_range(offset, count, self.len())
    }

    /// Copies the cells of `source` addressed by `rows` into `column`,
    /// starting at `destination_index`. Works for both sequential sections
    /// and permuted index lists; rows outside `source` receive the default.
    fn copy_from(
        &mut self,
        column: &ColumnDescriptor,
        destination_index: usize,
        source: &ColumnData,
        rows: Rows<'_>,
    ) -> BufferResult<()> {
        let data = self
            .column_data_mut(column.id())
            .ok_or_else(|| BufferError::NoSuchColumn(column.id().to_string()))?;
        data.copy_rows(column.id(), destination_index, source, rows, column.default_value())
    }

    /// Copies `column` from another buffer. If `source` does not have that
    /// column the destination range is filled with the default instead.
    fn copy_from_buffer(
        &mut self,
        column: &ColumnDescriptor,
        destination_index: usize,
        source: &dyn LogBuffer,
        rows: Rows<'_>,
    ) -> BufferResult<()> {
        match source.column_data(column.id()) {
            Some(data) => self.copy_from(column, destination_index, data, rows),
            None => self.fill_default(column, destination_index, rows.len()),
        }
    }

    /// Overwrites `count` cells of `column` with its default value.
    fn fill_default(&mut self, column: &ColumnDescriptor, destination_index: usize, count: usize) -> BufferResult<()> {
        let data = self
            .column_data_mut(column.id())
            .ok_or_else(|| BufferError::NoSuchColumn(column.id().to_string()))?;
        data.fill(column.id(), destination_index, count, column.default_value())
    }

    /// [`fill_default`](LogBuffer::fill_default) for every column.
    fn fill_all_default(&mut self, destination_index: usize, count: usize) -> BufferResult<()> {
        check_range(destination_index, count, self.len())?;
        for column in self.columns().to_vec() {
            self.fill_default(&column, destination_index, count)?;
        }
        Ok(())
    }

    /// The value of a cell, or the column's default when out of range.
    fn value(&self, column: &ColumnDescriptor, row: usize) -> Value {
        self.column_data(column.id())
            .and_then(|data| data.get(row))
            .unwrap_or_else(|| column.default_value().clone())
    }

    fn set_value(&mut self, column: &ColumnDescriptor, row: usize, value: Value) -> BufferResult<()> {
        let data = self
            .column_data_mut(column.id())
            .ok_or_else(|| BufferError::NoSuchColumn(column.id().to_string()))?;
        data.set(column.id(), row, value)
    }
}

/// Typed cell access for every [`LogBuffer`], including trait objects.
pub trait LogBufferExt: LogBuffer {
    /// The cell at `row`, or the column's default when out of range.
    fn get<T: ValueType>(&self, column: &Column<T>, row: usize) -> T {
        self.column_data(column.id())
            .and_then(T::slice)
            .and_then(|values| values.get(row))
            .cloned()
            .unwrap_or_else(|| column.default_value().clone())
    }

    fn set<T: ValueType>(&mut self, column: &Column<T>, row: usize, value: T) -> BufferResult<()> {
        let len = self.len();
        let data = self
            .column_data_mut(column.id())
            .ok_or_else(|| BufferError::NoSuchColumn(column.id().to_string()))?;
        let actual = data.kind();
        let values = T::vec_mut(data).ok_or_else(|| BufferError::KindMismatch {
            column: column.id().to_string(),
            expected: actual,
            actual: T::KIND,
        })?;
        match values.get_mut(row) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(BufferError::TooSmall { offset: row, count: 1, len }),
        }
    }

    /// Every cell of `column`; defaults when the buffer lacks the column.
    fn values<T: ValueType>(&self, column: &Column<T>) -> Vec<T> {
        match self.column_data(column.id()).and_then(T::slice) {
            Some(values) => values.to_vec(),
            None => vec![column.default_value().clone(); self.len()],
        }
    }
}

impl<B: LogBuffer + ?Sized> LogBufferExt for B {}

// ---------------------------------------------------------------------------
// Shared column storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ColumnStore {
    columns: Vec<ColumnDescriptor>,
    data: Vec<ColumnData>,
}

impl ColumnStore {
    fn new(columns: impl IntoIterator<Item = ColumnDescriptor>, len: usize) -> Self {
        let columns = combine(columns, Vec::new());
        let data = columns
            .iter()
            .map(|column| ColumnData::filled(column.default_value(), len))
            .collect();
        Self { columns, data }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.id() == id)
    }

    fn get(&self, id: &str) -> Option<&ColumnData> {
        self.position(id).map(|position| &self.data[position])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut ColumnData> {
        self.position(id).map(move |position| &mut self.data[position])
    }
}

// ---------------------------------------------------------------------------
// LogBufferArray
// ---------------------------------------------------------------------------

/// Fixed-length buffer, typically sized to exactly one query.
#[derive(Debug, Clone)]
pub struct LogBufferArray {
    store: ColumnStore,
    len: usize,
}

impl LogBufferArray {
    /// Buffer of `len` rows, every cell at its column's default.
    pub fn new(len: usize, columns: impl IntoIterator<Item = ColumnDescriptor>) -> Self {
        Self {
            store: ColumnStore::new(columns, len),
            len,
        }
    }

    /// Moves the typed storage of `column` out of this buffer.
    pub fn into_values<T: ValueType>(mut self, column: &Column<T>) -> Vec<T> {
        let len = self.len;
        match self.store.get_mut(column.id()).and_then(T::vec_mut) {
            Some(values) => std::mem::take(values),
            None => vec![column.default_value().clone(); len],
        }
    }
}

impl LogBuffer for LogBufferArray {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.store.columns
    }

    fn len(&self) -> usize {
        self.len
    }

    fn column_data(&self, id: &str) -> Option<&ColumnData> {
        self.store.get(id)
    }

    fn column_data_mut(&mut self, id: &str) -> Option<&mut ColumnData> {
        self.store.get_mut(id)
    }
}

// ---------------------------------------------------------------------------
// LogBufferList
// ---------------------------------------------------------------------------

/// Growable buffer used to accumulate rows.
#[derive(Debug, Clone)]
pub struct LogBufferList {
    store: ColumnStore,
    len: usize,
}

impl LogBufferList {
    pub fn new(columns: impl IntoIterator<Item = ColumnDescriptor>) -> Self {
        Self {
            store: ColumnStore::new(columns, 0),
            len: 0,
        }
    }

    /// Appends one row. Columns the entry does not mention get their default.
    pub fn push(&mut self, entry: &LogEntry) -> BufferResult<()> {
        let index = self.len;
        self.insert(index, entry)
    }

    /// Inserts one row before `index` (clamped to the current length).
    pub fn insert(&mut self, index: usize, entry: &LogEntry) -> BufferResult<()> {
        let index = index.min(self.len);
        let values = self.row_values(entry)?;
        for ((column, data), value) in self.store.columns.iter().zip(&mut self.store.data).zip(values) {
            data.insert(column.id(), index, value)?;
        }
        self.len += 1;
        Ok(())
    }

    /// Removes up to `count` rows starting at `index`.
    pub fn remove_range(&mut self, index: usize, count: usize) {
        let start = index.min(self.len);
        let end = start.saturating_add(count).min(self.len);
        for data in &mut self.store.data {
            data.remove_range(start, end - start);
        }
        self.len -= end - start;
    }

    pub fn truncate(&mut self, len: usize) {
        for data in &mut self.store.data {
            data.truncate(len);
        }
        self.len = self.len.min(len);
    }

    /// Grows or shrinks to `len` rows; new rows hold default values.
    pub fn resize(&mut self, len: usize) {
        for (column, data) in self.store.columns.iter().zip(&mut self.store.data) {
            data.resize(len, column.default_value());
        }
        self.len = len;
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// The row's values in column order, validated before anything is written
    /// so a failing insert leaves every column at the same length.
    fn row_values(&self, entry: &LogEntry) -> BufferResult<Vec<Value>> {
        self.store
            .columns
            .iter()
            .map(|column| match entry.value(column) {
                Some(value) if value.kind() == column.kind() => Ok(value.clone()),
                Some(value) => Err(BufferError::KindMismatch {
                    column: column.id().to_string(),
                    expected: column.kind(),
                    actual: value.kind(),
                }),
                None => Ok(column.default_value().clone()),
            })
            .collect()
    }
}

impl LogBuffer for LogBufferList {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.store.columns
    }

    fn len(&self) -> usize {
        self.len
    }

    fn column_data(&self, id: &str) -> Option<&ColumnData> {
        self.store.get(id)
    }

    fn column_data_mut(&mut self, id: &str) -> Option<&mut ColumnData> {
        self.store.get_mut(id)
    }
}

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// A single row described as column → value pairs.
///
/// Used to feed rows into buffers and in-memory sources; reads go through
/// buffers, never through materialised entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEntry {
    values: Vec<(ColumnDescriptor, Value)>,
}

impl LogEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](LogEntry::set).
    pub fn with<T: ValueType>(mut self, column: &Column<T>, value: T) -> Self {
        self.set(column, value);
        self
    }

    pub fn set<T: ValueType>(&mut self, column: &Column<T>, value: T) {
        self.set_value(&column.descriptor(), value.into_value());
    }

    pub fn set_value(&mut self, column: &ColumnDescriptor, value: Value) {
        match self.values.iter_mut().find(|(existing, _)| existing == column) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((column.clone(), value)),
        }
    }

    pub fn get<T: ValueType>(&self, column: &Column<T>) -> Option<T> {
        self.values
            .iter()
            .find(|(existing, _)| existing.id() == column.id())
            .and_then(|(_, value)| T::from_value(value))
    }

    pub fn value(&self, column: &ColumnDescriptor) -> Option<&Value> {
        self.values
            .iter()
            .find(|(existing, _)| existing == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.values.iter().map(|(column, _)| column)
    }
}
