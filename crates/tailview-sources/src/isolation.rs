//! Keeps panics in plugin supplied sources from reaching the rest of the
//! system.
//!
//! Every call into the wrapped source runs under [`catch_unwind`]. A panic is
//! logged together with the plugin's name and the call returns a safe
//! default instead: no columns, default property values, a finished
//! progress and default cells. Errors the plugin *returns* pass through
//! unchanged.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tailview_core::property::properties;
use tailview_core::{
    ColumnDescriptor, LogBuffer, LogSource, LogSourceListener, PropertiesBuffer, PropertyDescriptor, Rows,
    SourceResult, Value, ValueType,
};

/// A [`LogSource`] wrapper that never lets a panic escape.
pub struct IsolatedLogSource {
    inner: Arc<dyn LogSource>,
    plugin: String,
}

impl IsolatedLogSource {
    pub fn new(inner: Arc<dyn LogSource>, plugin: impl Into<String>) -> Self {
        Self {
            inner,
            plugin: plugin.into(),
        }
    }

    /// Name of the plugin the wrapped source comes from.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn inner(&self) -> &Arc<dyn LogSource> {
        &self.inner
    }

    fn guard<R>(&self, method: &'static str, call: impl FnOnce() -> R, fallback: impl FnOnce() -> R) -> R {
        match catch_unwind(AssertUnwindSafe(call)) {
            Ok(value) => value,
            Err(payload) => {
                self.report(method, payload.as_ref());
                fallback()
            }
        }
    }

    fn report(&self, method: &'static str, payload: &(dyn Any + Send)) {
        tracing::error!(plugin = %self.plugin, method, panic = panic_message(payload), "plugin panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

fn fallback_value(property: &PropertyDescriptor) -> Value {
    if *property == properties::PERCENTAGE_PROCESSED.descriptor() {
        1.0f64.into_value()
    } else {
        property.default_value().clone()
    }
}

impl LogSource for IsolatedLogSource {
    fn columns(&self) -> Vec<ColumnDescriptor> {
        self.guard("columns", || self.inner.columns(), Vec::new)
    }

    fn properties(&self) -> Vec<PropertyDescriptor> {
        self.guard("properties", || self.inner.properties(), Vec::new)
    }

    fn get_property_value(&self, property: &PropertyDescriptor) -> Value {
        self.guard(
            "get_property_value",
            || self.inner.get_property_value(property),
            || fallback_value(property),
        )
    }

    fn get_all_properties(&self, destination: &mut PropertiesBuffer) {
        let result = catch_unwind(AssertUnwindSafe(|| self.inner.get_all_properties(&mut *destination)));
        if let Err(payload) = result {
            self.report("get_all_properties", payload.as_ref());
            destination.set(&properties::PERCENTAGE_PROCESSED, 1.0);
        }
    }

    fn set_property_value(&self, property: &PropertyDescriptor, value: Value) {
        self.guard("set_property_value", || self.inner.set_property_value(property, value), || ());
    }

    fn get_entries(&self, rows: Rows<'_>, destination: &mut dyn LogBuffer, destination_index: usize) -> SourceResult<()> {
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.inner.get_entries(rows, &mut *destination, destination_index)
        }));
        match result {
            Ok(result) => result,
            Err(payload) => {
                self.report("get_entries", payload.as_ref());
                destination.fill_all_default(destination_index, rows.len())?;
                Ok(())
            }
        }
    }

    fn add_listener(&self, listener: Arc<dyn LogSourceListener>, max_wait: Duration, max_line_count: usize) {
        self.guard(
            "add_listener",
            || self.inner.add_listener(listener, max_wait, max_line_count),
            || (),
        );
    }

    fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) {
        self.guard("remove_listener", || self.inner.remove_listener(listener), || ());
    }
}

impl std::fmt::Debug for IsolatedLogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedLogSource").field("plugin", &self.plugin).finish()
    }
}
