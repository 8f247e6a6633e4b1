//! Column descriptors.
//!
//! A column identifies one typed attribute of a log entry. Two descriptors are
//! equal iff their ids are equal, regardless of display name or default. The
//! set of columns is open-ended: a source may introduce columns no consumer
//! knows about, which travel through buffers exactly like the well-known ones
//! in [`columns`].

use crate::value::{Value, ValueKind, ValueType};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Untyped description of a column: id, display name and default value.
#[derive(Clone)]
pub struct ColumnDescriptor {
    id: Cow<'static, str>,
    display_name: Cow<'static, str>,
    default: Value,
}

impl ColumnDescriptor {
    pub fn new(
        id: impl Into<Cow<'static, str>>,
        display_name: impl Into<Cow<'static, str>>,
        default: Value,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            default,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }

    /// Value of every cell outside a buffer's backing storage.
    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

impl PartialEq for ColumnDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ColumnDescriptor {}

impl Hash for ColumnDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column({}: {:?})", self.id, self.kind())
    }
}

/// Typed column handle, used for reading and writing cells without matching
/// on [`Value`].
pub struct Column<T: ValueType> {
    id: Cow<'static, str>,
    display_name: Cow<'static, str>,
    default: T,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ValueType> Column<T> {
    /// Declares a column; usable in `const` context for well-known columns.
    pub const fn new_static(id: &'static str, display_name: &'static str, default: T) -> Self {
        Self {
            id: Cow::Borrowed(id),
            display_name: Cow::Borrowed(display_name),
            default,
            _marker: PhantomData,
        }
    }

    /// Declares a column at runtime, e.g. one a plugin introduces.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, default: T) -> Self {
        Self {
            id: Cow::Owned(id.into()),
            display_name: Cow::Owned(display_name.into()),
            default,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    pub fn descriptor(&self) -> ColumnDescriptor {
        ColumnDescriptor {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            default: self.default.clone().into_value(),
        }
    }
}

impl<T: ValueType> From<&Column<T>> for ColumnDescriptor {
    fn from(column: &Column<T>) -> Self {
        column.descriptor()
    }
}

impl<T: ValueType> PartialEq<ColumnDescriptor> for Column<T> {
    fn eq(&self, other: &ColumnDescriptor) -> bool {
        self.id == other.id
    }
}

impl<T: ValueType> fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column({}: {:?})", self.id, T::KIND)
    }
}

/// Appends every column of `additional` not already part of `columns`.
pub fn combine(
    columns: impl IntoIterator<Item = ColumnDescriptor>,
    additional: impl IntoIterator<Item = ColumnDescriptor>,
) -> Vec<ColumnDescriptor> {
    let mut combined: Vec<ColumnDescriptor> = Vec::new();
    for column in columns.into_iter().chain(additional) {
        if !combined.contains(&column) {
            combined.push(column);
        }
    }
    combined
}

/// Well-known columns every consumer understands.
pub mod columns {
    use super::{Column, ColumnDescriptor};
    use crate::types::{LogEntryIndex, LogEntrySourceId, LogLevel, LogLineIndex};
    use chrono::{DateTime, TimeDelta, Utc};

    /// The unparsed text of the row.
    pub const RAW_CONTENT: Column<Option<String>> = Column::new_static("raw_content", "Raw Content", None);
    /// Index of the row in the source it is queried from.
    pub const INDEX: Column<LogLineIndex> = Column::new_static("index", "Index", LogLineIndex::INVALID);
    /// Index of the row in the source that originally produced it.
    pub const ORIGINAL_INDEX: Column<LogLineIndex> =
        Column::new_static("original_index", "Original Index", LogLineIndex::INVALID);
    /// Groups rows belonging to the same multi-line entry.
    pub const LOG_ENTRY_INDEX: Column<LogEntryIndex> =
        Column::new_static("log_entry_index", "Log Entry Index", LogEntryIndex::INVALID);
    /// One-based line number (0 for rows that do not exist).
    pub const LINE_NUMBER: Column<usize> = Column::new_static("line_number", "Line Number", 0);
    pub const ORIGINAL_LINE_NUMBER: Column<usize> =
        Column::new_static("original_line_number", "Original Line Number", 0);
    pub const ORIGINAL_DATA_SOURCE_NAME: Column<Option<String>> =
        Column::new_static("original_data_source_name", "Source", None);
    /// Which upstream of a merged view the row came from.
    pub const SOURCE_ID: Column<LogEntrySourceId> =
        Column::new_static("source_id", "Source Id", LogEntrySourceId(0));
    pub const LOG_LEVEL: Column<LogLevel> = Column::new_static("log_level", "Level", LogLevel::None);
    pub const TIMESTAMP: Column<Option<DateTime<Utc>>> = Column::new_static("timestamp", "Timestamp", None);
    /// Time since the first timestamp of the source.
    pub const ELAPSED_TIME: Column<Option<TimeDelta>> = Column::new_static("elapsed_time", "Elapsed", None);
    /// Time since the previous row's timestamp.
    pub const DELTA_TIME: Column<Option<TimeDelta>> = Column::new_static("delta_time", "Delta", None);
    pub const MESSAGE: Column<Option<String>> = Column::new_static("message", "Message", None);

    /// Columns every source offers.
    pub fn minimum() -> Vec<ColumnDescriptor> {
        vec![
            RAW_CONTENT.descriptor(),
            INDEX.descriptor(),
            ORIGINAL_INDEX.descriptor(),
            LOG_ENTRY_INDEX.descriptor(),
            LINE_NUMBER.descriptor(),
            ORIGINAL_LINE_NUMBER.descriptor(),
            ORIGINAL_DATA_SOURCE_NAME.descriptor(),
            LOG_LEVEL.descriptor(),
            TIMESTAMP.descriptor(),
            ELAPSED_TIME.descriptor(),
            DELTA_TIME.descriptor(),
        ]
    }

    /// [`minimum`] followed by every other column of `columns`.
    pub fn combine_with_minimum(columns: impl IntoIterator<Item = ColumnDescriptor>) -> Vec<ColumnDescriptor> {
        super::combine(minimum(), columns)
    }
}
