//! Source properties.
//!
//! Properties describe a source as a whole (row count, progress, size, time
//! range). They share the value model of columns: [`Property<T>`] is a typed
//! handle and [`PropertiesBuffer`] an ordered id → [`Value`] map that sources
//! fill in one go so consumers never observe a half-updated set.

use crate::value::{Value, ValueType};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

/// Untyped description of a property.
#[derive(Clone)]
pub struct PropertyDescriptor {
    id: Cow<'static, str>,
    default: Value,
}

impl PropertyDescriptor {
    pub fn new(id: impl Into<Cow<'static, str>>, default: Value) -> Self {
        Self {
            id: id.into(),
            default,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

impl PartialEq for PropertyDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PropertyDescriptor {}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({})", self.id)
    }
}

/// Typed property handle.
pub struct Property<T: ValueType> {
    id: &'static str,
    default: T,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ValueType> Property<T> {
    pub const fn new(id: &'static str, default: T) -> Self {
        Self {
            id,
            default,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        self.id
    }

    pub fn default_value(&self) -> T {
        self.default.clone()
    }

    pub fn descriptor(&self) -> PropertyDescriptor {
        PropertyDescriptor {
            id: Cow::Borrowed(self.id),
            default: self.default.clone().into_value(),
        }
    }
}

impl<T: ValueType> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({})", self.id)
    }
}

/// Well-known properties.
pub mod properties {
    use super::{Property, PropertyDescriptor};
    use crate::types::EmptyReason;
    use chrono::{DateTime, TimeDelta, Utc};

    /// Number of rows currently exposed by the source.
    pub const LOG_ENTRY_COUNT: Property<usize> = Property::new("log_entry_count", 0);
    /// Fraction of the source processed so far; `1.0` once fully caught up.
    pub const PERCENTAGE_PROCESSED: Property<f64> = Property::new("percentage_processed", 0.0);
    pub const SIZE: Property<Option<u64>> = Property::new("size", None);
    pub const LAST_MODIFIED: Property<Option<DateTime<Utc>>> = Property::new("last_modified", None);
    pub const START_TIMESTAMP: Property<Option<DateTime<Utc>>> = Property::new("start_timestamp", None);
    pub const END_TIMESTAMP: Property<Option<DateTime<Utc>>> = Property::new("end_timestamp", None);
    pub const DURATION: Property<Option<TimeDelta>> = Property::new("duration", None);
    pub const EMPTY_REASON: Property<EmptyReason> = Property::new("empty_reason", EmptyReason::None);
    pub const MAX_CHARACTERS_IN_LINE: Property<usize> = Property::new("max_characters_in_line", 0);
    /// Human readable name, e.g. a file name or plugin id.
    pub const NAME: Property<Option<String>> = Property::new("name", None);

    /// Properties every source exposes.
    pub fn minimum() -> Vec<PropertyDescriptor> {
        vec![
            LOG_ENTRY_COUNT.descriptor(),
            PERCENTAGE_PROCESSED.descriptor(),
            SIZE.descriptor(),
            LAST_MODIFIED.descriptor(),
            START_TIMESTAMP.descriptor(),
            END_TIMESTAMP.descriptor(),
            DURATION.descriptor(),
            EMPTY_REASON.descriptor(),
            MAX_CHARACTERS_IN_LINE.descriptor(),
            NAME.descriptor(),
        ]
    }
}

// ---------------------------------------------------------------------------
// PropertiesBuffer
// ---------------------------------------------------------------------------

/// Ordered set of property values.
#[derive(Debug, Clone, Default)]
pub struct PropertiesBuffer {
    values: Vec<(PropertyDescriptor, Value)>,
}

impl PropertiesBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer holding every property of `descriptors` at its default value.
    pub fn with_properties(descriptors: impl IntoIterator<Item = PropertyDescriptor>) -> Self {
        let mut buffer = Self::new();
        for descriptor in descriptors {
            let default = descriptor.default_value().clone();
            buffer.set_value(&descriptor, default);
        }
        buffer
    }

    /// Buffer holding the [`properties::minimum`] set.
    pub fn minimum() -> Self {
        Self::with_properties(properties::minimum())
    }

    pub fn descriptors(&self) -> Vec<PropertyDescriptor> {
        self.values.iter().map(|(descriptor, _)| descriptor.clone()).collect()
    }

    pub fn contains(&self, property: &PropertyDescriptor) -> bool {
        self.position(property.id()).is_some()
    }

    /// The stored value, or the property's default when unset.
    pub fn value(&self, property: &PropertyDescriptor) -> Value {
        match self.position(property.id()) {
            Some(position) => self.values[position].1.clone(),
            None => property.default_value().clone(),
        }
    }

    pub fn set_value(&mut self, property: &PropertyDescriptor, value: Value) {
        match self.position(property.id()) {
            Some(position) => self.values[position].1 = value,
            None => self.values.push((property.clone(), value)),
        }
    }

    /// Typed read; the default is returned when unset or of another kind.
    pub fn get<T: ValueType>(&self, property: &Property<T>) -> T {
        self.position(property.id())
            .and_then(|position| T::from_value(&self.values[position].1))
            .unwrap_or_else(|| property.default_value())
    }

    pub fn set<T: ValueType>(&mut self, property: &Property<T>, value: T) {
        self.set_value(&property.descriptor(), value.into_value());
    }

    /// Copies every value of `other` into this buffer.
    pub fn copy_from(&mut self, other: &PropertiesBuffer) {
        for (descriptor, value) in &other.values {
            self.set_value(descriptor, value.clone());
        }
    }

    /// Resets every known property back to its default value.
    pub fn reset(&mut self) {
        for (descriptor, value) in &mut self.values {
            *value = descriptor.default_value().clone();
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.values.iter().position(|(descriptor, _)| descriptor.id() == id)
    }
}
