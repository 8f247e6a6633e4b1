//! Closed set of value kinds stored in columns and properties.
//!
//! Every column and property holds values of exactly one [`ValueKind`]. The
//! [`ValueType`] trait maps a Rust type onto its kind so typed accessors can
//! reach into [`ColumnData`] without any runtime type inspection. Values that
//! fit none of the known kinds travel as [`ValueKind::Custom`] JSON.

use crate::error::{BufferError, BufferResult};
use crate::types::{EmptyReason, LogEntryIndex, LogEntrySourceId, LogLevel, LogLineIndex, Rows};
use chrono::{DateTime, TimeDelta, Utc};

/// A Rust type which can be stored in a column or property.
pub trait ValueType: Clone + Send + Sync + 'static {
    /// The kind this type is stored as.
    const KIND: ValueKind;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;

    /// Typed view of a column's storage, `None` if the kinds differ.
    fn slice(data: &ColumnData) -> Option<&[Self]>;

    fn vec_mut(data: &mut ColumnData) -> Option<&mut Vec<Self>>;
}

macro_rules! value_kinds {
    ($( $(#[$doc:meta])* $variant:ident => $ty:ty ),* $(,)?) => {
        /// Discriminant of [`Value`] and [`ColumnData`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ValueKind {
            $( $(#[$doc])* $variant, )*
        }

        /// A single cell or property value.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Value {
            $( $(#[$doc])* $variant($ty), )*
        }

        /// Storage for one column of a buffer: one vector per value kind.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ColumnData {
            $( $variant(Vec<$ty>), )*
        }

        impl Value {
            pub fn kind(&self) -> ValueKind {
                match self {
                    $( Value::$variant(_) => ValueKind::$variant, )*
                }
            }
        }

        $(
            impl ValueType for $ty {
                const KIND: ValueKind = ValueKind::$variant;

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(value) => Some(value.clone()),
                        _ => None,
                    }
                }

                fn slice(data: &ColumnData) -> Option<&[Self]> {
                    match data {
                        ColumnData::$variant(values) => Some(values.as_slice()),
                        _ => None,
                    }
                }

                fn vec_mut(data: &mut ColumnData) -> Option<&mut Vec<Self>> {
                    match data {
                        ColumnData::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*

        impl ColumnData {
            /// Storage of `len` cells, each holding `default`.
            pub fn filled(default: &Value, len: usize) -> Self {
                match default {
                    $( Value::$variant(value) => ColumnData::$variant(vec![value.clone(); len]), )*
                }
            }

            pub fn kind(&self) -> ValueKind {
                match self {
                    $( ColumnData::$variant(_) => ValueKind::$variant, )*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $( ColumnData::$variant(values) => values.len(), )*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// The value at `index`, `None` when out of range.
            pub fn get(&self, index: usize) -> Option<Value> {
                match self {
                    $( ColumnData::$variant(values) => values.get(index).cloned().map(Value::$variant), )*
                }
            }

            pub(crate) fn set(&mut self, column: &str, index: usize, value: Value) -> BufferResult<()> {
                let len = self.len();
                match (self, value) {
                    $(
                        (ColumnData::$variant(values), Value::$variant(value)) => match values.get_mut(index) {
                            Some(cell) => {
                                *cell = value;
                                Ok(())
                            }
                            None => Err(BufferError::TooSmall { offset: index, count: 1, len }),
                        },
                    )*
                    (data, value) => Err(mismatch(column, data.kind(), value.kind())),
                }
            }

            pub(crate) fn insert(&mut self, column: &str, index: usize, value: Value) -> BufferResult<()> {
                match (self, value) {
                    $(
                        (ColumnData::$variant(values), Value::$variant(value)) => {
                            let index = index.min(values.len());
                            values.insert(index, value);
                            Ok(())
                        }
                    )*
                    (data, value) => Err(mismatch(column, data.kind(), value.kind())),
                }
            }

            pub(crate) fn resize(&mut self, len: usize, default: &Value) {
                match (self, default) {
                    $( (ColumnData::$variant(values), Value::$variant(default)) => values.resize(len, default.clone()), )*
                    (data, default) => {
                        // A column's default always has the column's kind; rebuild if not.
                        *data = ColumnData::filled(default, len);
                    }
                }
            }

            pub(crate) fn truncate(&mut self, len: usize) {
                match self {
                    $( ColumnData::$variant(values) => values.truncate(len), )*
                }
            }

            pub(crate) fn remove_range(&mut self, start: usize, count: usize) {
                match self {
                    $(
                        ColumnData::$variant(values) => {
                            let start = start.min(values.len());
                            let end = start.saturating_add(count).min(values.len());
                            values.drain(start..end);
                        }
                    )*
                }
            }

            /// Overwrites `count` cells starting at `offset` with `default`.
            pub(crate) fn fill(&mut self, column: &str, offset: usize, count: usize, default: &Value) -> BufferResult<()> {
                let len = self.len();
                check_range(offset, count, len)?;
                match (self, default) {
                    $(
                        (ColumnData::$variant(values), Value::$variant(default)) => {
                            values[offset..offset + count].fill(default.clone());
                            Ok(())
                        }
                    )*
                    (data, default) => Err(mismatch(column, data.kind(), default.kind())),
                }
            }

            /// Copies the cells of `source` addressed by `rows` into this
            /// column starting at `offset`. Rows outside `source` receive
            /// `default`.
            pub(crate) fn copy_rows(
                &mut self,
                column: &str,
                offset: usize,
                source: &ColumnData,
                rows: Rows<'_>,
                default: &Value,
            ) -> BufferResult<()> {
                let len = self.len();
                check_range(offset, rows.len(), len)?;
                match (self, source, default) {
                    $(
                        (ColumnData::$variant(dest), ColumnData::$variant(src), Value::$variant(default)) => {
                            for (n, row) in rows.iter().enumerate() {
                                dest[offset + n] = row
                                    .value()
                                    .and_then(|row| src.get(row))
                                    .unwrap_or(default)
                                    .clone();
                            }
                            Ok(())
                        }
                    )*
                    (dest, source, _) => Err(mismatch(column, dest.kind(), source.kind())),
                }
            }
        }
    };
}

value_kinds! {
    /// Free text; `None` when the row has no text.
    Text => Option<String>,
    /// Non-negative counter such as a line number or row count.
    Count => usize,
    /// Fraction in `[0, 1]`, e.g. processing progress.
    Ratio => f64,
    /// Size in bytes, if known.
    Size => Option<u64>,
    Timestamp => Option<DateTime<Utc>>,
    Duration => Option<TimeDelta>,
    LineIndex => LogLineIndex,
    EntryIndex => LogEntryIndex,
    SourceId => LogEntrySourceId,
    Level => LogLevel,
    EmptyReason => EmptyReason,
    Flag => bool,
    /// Opaque value of a column no consumer knows about.
    Custom => Option<serde_json::Value>,
}

fn mismatch(column: &str, expected: ValueKind, actual: ValueKind) -> BufferError {
    BufferError::KindMismatch {
        column: column.to_string(),
        expected,
        actual,
    }
}

pub(crate) fn check_range(offset: usize, count: usize, len: usize) -> BufferResult<()> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(BufferError::TooSmall { offset, count, len }),
    }
}
