//! The [`LogSource`] trait, the unit every view is composed from.
//!
//! A log source exposes a set of columns and properties, answers random-access
//! row queries and notifies listeners about modifications. Queries never fail
//! because of the source's state: rows that do not exist (or no longer exist)
//! are filled with column defaults. Only caller bugs, such as a destination
//! buffer that is too small, are reported as errors.

use crate::buffer::{LogBuffer, LogBufferArray};
use crate::column::{Column, ColumnDescriptor};
use crate::error::SourceResult;
use crate::property::{properties, PropertiesBuffer, Property, PropertyDescriptor};
use crate::types::{LogSourceModification, Rows};
use crate::value::{Value, ValueType};
use std::sync::Arc;
use std::time::Duration;

/// Receives the modifications of a log source.
///
/// Called from whichever thread the source processes on. Implementations must
/// return quickly and must not call back into the source that notifies them;
/// typically they push the modification onto a queue and return.
pub trait LogSourceListener: Send + Sync {
    fn on_modified(&self, modification: LogSourceModification);
}

/// A growing, column-oriented, randomly addressable set of log rows.
pub trait LogSource: Send + Sync {
    /// Columns this source can serve.
    fn columns(&self) -> Vec<ColumnDescriptor>;

    /// Properties this source exposes.
    fn properties(&self) -> Vec<PropertyDescriptor>;

    /// Current value of a property; its default when unknown to the source.
    fn get_property_value(&self, property: &PropertyDescriptor) -> Value;

    /// Copies every property value into `destination` in one consistent step.
    fn get_all_properties(&self, destination: &mut PropertiesBuffer);

    /// Overrides a property. Most sources only accept writes to a few
    /// properties and ignore the rest.
    fn set_property_value(&self, _property: &PropertyDescriptor, _value: Value) {}

    /// Copies the cells of `rows` into `destination` starting at
    /// `destination_index`, for every column of `destination`.
    ///
    /// Rows outside this source and columns it does not serve receive their
    /// column's default value.
    fn get_entries(&self, rows: Rows<'_>, destination: &mut dyn LogBuffer, destination_index: usize) -> SourceResult<()>;

    /// Subscribes `listener`. The listener is told the current state right
    /// away and is then notified at least every `max_wait`, or whenever
    /// `max_line_count` rows are pending.
    fn add_listener(&self, listener: Arc<dyn LogSourceListener>, max_wait: Duration, max_line_count: usize);

    fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>);
}

/// Typed conveniences for every [`LogSource`], including trait objects.
pub trait LogSourceExt: LogSource {
    /// The values of one column for `rows`.
    fn get_column<'a, T: ValueType>(&self, rows: impl Into<Rows<'a>>, column: &Column<T>) -> SourceResult<Vec<T>> {
        let rows = rows.into();
        let mut buffer = LogBufferArray::new(rows.len(), [column.descriptor()]);
        self.get_entries(rows, &mut buffer, 0)?;
        Ok(buffer.into_values(column))
    }

    /// Every column of this source for `rows`.
    fn get_buffer<'a>(&self, rows: impl Into<Rows<'a>>) -> SourceResult<LogBufferArray> {
        let rows = rows.into();
        let mut buffer = LogBufferArray::new(rows.len(), self.columns());
        self.get_entries(rows, &mut buffer, 0)?;
        Ok(buffer)
    }

    fn get_property<T: ValueType>(&self, property: &Property<T>) -> T {
        T::from_value(&self.get_property_value(&property.descriptor())).unwrap_or_else(|| property.default_value())
    }

    fn set_property<T: ValueType>(&self, property: &Property<T>, value: T) {
        self.set_property_value(&property.descriptor(), value.into_value());
    }

    /// Number of rows currently exposed.
    fn count(&self) -> usize {
        self.get_property(&properties::LOG_ENTRY_COUNT)
    }

    fn percentage_processed(&self) -> f64 {
        self.get_property(&properties::PERCENTAGE_PROCESSED)
    }
}

impl<S: LogSource + ?Sized> LogSourceExt for S {}

/// Serves a query from an in-memory buffer: every column of `destination` is
/// copied from `buffer` when present there and defaulted otherwise.
pub fn read_from_buffer(
    buffer: &dyn LogBuffer,
    rows: Rows<'_>,
    destination: &mut dyn LogBuffer,
    destination_index: usize,
) -> SourceResult<()> {
    destination.ensure_rows(destination_index, rows.len())?;
    for column in destination.columns().to_vec() {
        destination.copy_from_buffer(&column, destination_index, buffer, rows)?;
    }
    Ok(())
}

/// Whether two listener handles refer to the same listener.
pub fn same_listener(a: &Arc<dyn LogSourceListener>, b: &Arc<dyn LogSourceListener>) -> bool {
    Arc::ptr_eq(a, b)
}
