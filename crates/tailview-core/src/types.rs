//! Core types shared by every log source.
//!
//! This module defines the row addressing vocabulary ([`LogLineIndex`],
//! [`LogEntryIndex`], [`LogSourceSection`], [`Rows`]), the change events a
//! source emits ([`LogSourceModification`]) and the small enums stored in
//! well-known columns and properties ([`LogLevel`], [`LogEntrySourceId`],
//! [`EmptyReason`]).

use std::fmt;

// ---------------------------------------------------------------------------
// Indices
// ---------------------------------------------------------------------------

/// Zero-based address of a row inside a log source.
///
/// Stable for the append-only portion of a source and re-issued from 0 after
/// a reset. [`LogLineIndex::INVALID`] is the default value of every index
/// column and is what lookups return for rows that do not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogLineIndex(usize);

impl LogLineIndex {
    /// Sentinel for "no such row".
    pub const INVALID: LogLineIndex = LogLineIndex(usize::MAX);

    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn is_valid(self) -> bool {
        self.0 != usize::MAX
    }

    /// The index as a `usize`, or `None` for [`LogLineIndex::INVALID`].
    pub const fn value(self) -> Option<usize> {
        if self.is_valid() {
            Some(self.0)
        } else {
            None
        }
    }

    /// The row before this one, or `INVALID` when there is none.
    pub fn previous(self) -> Self {
        match self.value() {
            Some(index) if index > 0 => Self(index - 1),
            _ => Self::INVALID,
        }
    }
}

impl Default for LogLineIndex {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<usize> for LogLineIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for LogLineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(index) => write!(f, "#{index}"),
            None => write!(f, "#invalid"),
        }
    }
}

/// Groups all physical rows (lines) which form one logical log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogEntryIndex(usize);

impl LogEntryIndex {
    pub const INVALID: LogEntryIndex = LogEntryIndex(usize::MAX);

    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn is_valid(self) -> bool {
        self.0 != usize::MAX
    }

    pub const fn value(self) -> Option<usize> {
        if self.is_valid() {
            Some(self.0)
        } else {
            None
        }
    }

    /// The next entry index. `INVALID` stays `INVALID`.
    pub fn next(self) -> Self {
        match self.value() {
            Some(index) => Self(index + 1),
            None => Self::INVALID,
        }
    }
}

impl Default for LogEntryIndex {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<usize> for LogEntryIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Compact id of the source a merged row came from.
///
/// A merged view supports at most [`LogEntrySourceId::MAX_SOURCES`] sources
/// because every merged row stores this id in a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LogEntrySourceId(pub u8);

impl LogEntrySourceId {
    pub const MAX_SOURCES: usize = u8::MAX as usize;
}

impl fmt::Display for LogEntrySourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Levels and status flags
// ---------------------------------------------------------------------------

/// Log severity level of a row. `None` means the row carries no level
/// (typically a continuation line of a multi-line entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    #[default]
    None,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    /// A level was present but is none of the known ones.
    Other,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::None,
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
        LogLevel::Other,
    ];

    /// Case-insensitive parse of the usual spellings (`warn`, `WARNING`, ...).
    pub fn parse(text: &str) -> Option<LogLevel> {
        match text.to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" | "information" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" | "err" => Some(LogLevel::Error),
            "fatal" | "critical" => Some(LogLevel::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::None => write!(f, ""),
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Fatal => write!(f, "FATAL"),
            LogLevel::Other => write!(f, "OTHER"),
        }
    }
}

/// Why a source is (or may be) empty. Reported through a property rather
/// than as an error: queries against an unavailable source simply return
/// default values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EmptyReason {
    #[default]
    None,
    SourceDoesNotExist,
    SourceCannotBeAccessed,
}

impl EmptyReason {
    /// Whether the source is currently unavailable.
    pub fn is_unavailable(self) -> bool {
        self != EmptyReason::None
    }
}

// ---------------------------------------------------------------------------
// Sections and modifications
// ---------------------------------------------------------------------------

/// A contiguous range of rows `[index, index + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogSourceSection {
    pub index: LogLineIndex,
    pub count: usize,
}

impl LogSourceSection {
    pub fn new(index: impl Into<LogLineIndex>, count: usize) -> Self {
        Self {
            index: index.into(),
            count,
        }
    }

    /// Index one past the last row, or `None` for an invalid section.
    pub fn end(&self) -> Option<usize> {
        self.index.value().map(|index| index + self.count)
    }

    pub fn iter(&self) -> impl Iterator<Item = LogLineIndex> {
        let start = self.index.value();
        let count = if start.is_some() { self.count } else { 0 };
        (0..count).map(move |offset| LogLineIndex::new(start.unwrap_or_default() + offset))
    }
}

impl fmt::Display for LogSourceSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.index, self.count)
    }
}

/// A change event emitted by a log source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSourceModification {
    /// The source is to be considered empty; indices restart from 0.
    Reset,
    /// Rows `[index, index + count)` are newly available.
    Appended(LogSourceSection),
    /// Every row at or after `index` is no longer valid. `count` is how many
    /// rows the emitter knew about, but consumers must treat *all* rows from
    /// `index` onwards as removed.
    Removed(LogSourceSection),
}

impl LogSourceModification {
    pub fn appended(index: usize, count: usize) -> Self {
        Self::Appended(LogSourceSection::new(index, count))
    }

    pub fn removed(index: usize, count: usize) -> Self {
        Self::Removed(LogSourceSection::new(index, count))
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, Self::Reset)
    }

    /// Number of rows this modification appends, zero for everything else.
    pub fn appended_count(&self) -> usize {
        match self {
            Self::Appended(section) => section.count,
            _ => 0,
        }
    }
}

impl fmt::Display for LogSourceModification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => write!(f, "Reset"),
            Self::Appended(section) => write!(f, "Appended{section}"),
            Self::Removed(section) => write!(f, "Removed{section}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Row selection
// ---------------------------------------------------------------------------

/// The rows a query addresses: either a contiguous section or an explicit,
/// possibly unordered, list of indices.
#[derive(Debug, Clone, Copy)]
pub enum Rows<'a> {
    Section(LogSourceSection),
    Indices(&'a [LogLineIndex]),
}

impl<'a> Rows<'a> {
    pub fn len(&self) -> usize {
        match self {
            Rows::Section(section) => section.count,
            Rows::Indices(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The source row addressed by the `n`-th position of this selection.
    pub fn get(&self, n: usize) -> LogLineIndex {
        match self {
            Rows::Section(section) => match section.index.value() {
                Some(start) if n < section.count => LogLineIndex::new(start + n),
                _ => LogLineIndex::INVALID,
            },
            Rows::Indices(indices) => indices.get(n).copied().unwrap_or(LogLineIndex::INVALID),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = LogLineIndex> + '_ {
        (0..self.len()).map(move |n| self.get(n))
    }
}

impl From<LogSourceSection> for Rows<'_> {
    fn from(section: LogSourceSection) -> Self {
        Rows::Section(section)
    }
}

impl<'a> From<&'a [LogLineIndex]> for Rows<'a> {
    fn from(indices: &'a [LogLineIndex]) -> Self {
        Rows::Indices(indices)
    }
}

impl<'a> From<&'a Vec<LogLineIndex>> for Rows<'a> {
    fn from(indices: &'a Vec<LogLineIndex>) -> Self {
        Rows::Indices(indices.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_index_has_no_value() {
        assert_eq!(LogLineIndex::INVALID.value(), None);
        assert_eq!(LogLineIndex::default(), LogLineIndex::INVALID);
        assert_eq!(LogLineIndex::new(0).previous(), LogLineIndex::INVALID);
        assert_eq!(LogLineIndex::new(5).previous(), LogLineIndex::new(4));
    }

    #[test]
    fn section_rows_beyond_count_are_invalid() {
        let rows = Rows::from(LogSourceSection::new(10, 2));
        assert_eq!(rows.get(0), LogLineIndex::new(10));
        assert_eq!(rows.get(1), LogLineIndex::new(11));
        assert_eq!(rows.get(2), LogLineIndex::INVALID);
        assert_eq!(rows.iter().count(), 2);
    }

    #[test]
    fn level_parse_accepts_common_spellings() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("err"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("verbose"), None);
    }
}
