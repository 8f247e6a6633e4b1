//! Domain-specific assertions for tailview harnesses.
//!
//! These wrap `pretty_assertions` and add context to failure messages so it
//! is clear *which* view and column disagreed.

use tailview::{Column, LogSource, LogSourceExt, LogSourceSection, ValueType};

/// Every value of `column` over the rows `source` currently exposes.
pub fn all_rows<T: ValueType>(source: &dyn LogSource, column: &Column<T>) -> Vec<T> {
    source
        .get_column(LogSourceSection::new(0, source.count()), column)
        .unwrap_or_else(|error| panic!("reading {column:?} failed: {error}"))
}

/// The raw content of every row, with missing content as `""`.
pub fn contents(source: &dyn LogSource) -> Vec<String> {
    all_rows(source, &tailview::columns::RAW_CONTENT)
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect()
}

/// Assert that a column of a source holds exactly the expected values.
///
/// ```rust
/// assert_column!(merged, columns::SOURCE_ID, [LogEntrySourceId(0), LogEntrySourceId(1)]);
/// ```
#[macro_export]
macro_rules! assert_column {
    ($source:expr, $column:expr, [$($value:expr),* $(,)?]) => {{
        let actual = $crate::common::assertions::all_rows(&$source, &$column);
        let expected = vec![$($value),*];
        pretty_assertions::assert_eq!(actual, expected, "column {:?}", $column);
    }};
}

/// Assert the raw content of every row, in order.
///
/// ```rust
/// assert_contents!(merged, ["a", "b"]);
/// ```
#[macro_export]
macro_rules! assert_contents {
    ($source:expr, [$($value:expr),* $(,)?]) => {{
        let actual = $crate::common::assertions::contents(&$source);
        let expected: Vec<String> = vec![$($value.to_string()),*];
        pretty_assertions::assert_eq!(actual, expected, "raw content");
    }};
}

/// Assert that every column reads as its default for rows past the end.
pub fn assert_defaults_past_end(source: &dyn LogSource) {
    let count = source.count();
    let rows = source
        .get_buffer(LogSourceSection::new(count, 3))
        .unwrap_or_else(|error| panic!("reading past the end failed: {error}"));
    for column in source.columns() {
        for row in 0..3 {
            pretty_assertions::assert_eq!(
                tailview::LogBuffer::value(&rows, &column, row),
                column.default_value().clone(),
                "column {column:?} row {}",
                count + row
            );
        }
    }
}
