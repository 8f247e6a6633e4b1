//! A log source whose inner source can be swapped at runtime.
//!
//! Consumers subscribe to the proxy once and never notice that the source
//! behind it changed: a swap is announced as a `Reset` followed by the new
//! inner source's content, replayed like any other growth. Notifications a
//! previous inner source still had in flight are discarded.

use crate::queue::{pending_queue, QueueListener};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tailview_core::column::columns;
use tailview_core::property::properties;
use tailview_core::scheduler::{PeriodicTask, TaskScheduler};
use tailview_core::{
    ColumnDescriptor, EmptyReason, ListenerCollection, LogBuffer, LogSource, LogSourceListener,
    LogSourceModification, PropertiesBuffer, PropertyDescriptor, Rows, SourceOptions, SourceResult, Value,
};
use tokio_util::sync::CancellationToken;

type Pending = (u64, LogSourceModification);

struct Inner {
    source: Arc<dyn LogSource>,
    listener: Arc<dyn LogSourceListener>,
}

#[derive(Default)]
struct Slot {
    /// Bumped on every swap; tags the notifications of the current inner.
    generation: u64,
    inner: Option<Inner>,
}

struct Shared {
    slot: RwLock<Slot>,
    sender: Sender<Pending>,
    pending: Receiver<Pending>,
    listeners: ListenerCollection,
    properties: RwLock<PropertiesBuffer>,
    options: SourceOptions,
}

impl Shared {
    fn current(&self) -> Option<Arc<dyn LogSource>> {
        self.slot.read().inner.as_ref().map(|inner| inner.source.clone())
    }

    fn run_once(&self, token: &CancellationToken) -> Duration {
        while !token.is_cancelled() {
            let Ok((tag, modification)) = self.pending.try_recv() else {
                break;
            };
            // A swap may land while the queue drains; only older tags are stale.
            let generation = self.slot.read().generation;
            if tag < generation {
                tracing::debug!(tag, generation, %modification, "dropping notification of a replaced source");
                continue;
            }
            tracing::debug!(%modification, "proxy");
            match modification {
                LogSourceModification::Reset => self.listeners.reset(),
                LogSourceModification::Appended(section) => {
                    if let Some(end) = section.end() {
                        self.listeners.on_read(end);
                    }
                }
                LogSourceModification::Removed(section) => {
                    if let Some(index) = section.index.value() {
                        self.listeners.remove(index, section.count);
                    }
                }
            }
        }

        self.update_properties();
        self.listeners.flush();
        self.options.idle_delay
    }

    fn update_properties(&self) {
        let mut buffer = PropertiesBuffer::minimum();
        match self.current() {
            Some(inner) => inner.get_all_properties(&mut buffer),
            None => {
                buffer.set(&properties::PERCENTAGE_PROCESSED, 1.0);
                buffer.set(&properties::EMPTY_REASON, EmptyReason::SourceDoesNotExist);
            }
        }
        *self.properties.write() = buffer;
    }
}

/// Forwards to a replaceable inner source.
pub struct ProxyLogSource {
    shared: Arc<Shared>,
    scheduler: Arc<dyn TaskScheduler>,
    task: PeriodicTask,
}

impl ProxyLogSource {
    pub fn new(scheduler: Arc<dyn TaskScheduler>, inner: Option<Arc<dyn LogSource>>, options: SourceOptions) -> Self {
        let (sender, pending) = pending_queue();
        let shared = Arc::new(Shared {
            slot: RwLock::new(Slot::default()),
            sender,
            pending,
            listeners: ListenerCollection::new(),
            properties: RwLock::new(PropertiesBuffer::minimum()),
            options,
        });
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let idle_delay = options.idle_delay;
        let task = scheduler.start_periodic(
            "proxy",
            Box::new(move |token| match weak.upgrade() {
                Some(shared) => shared.run_once(token),
                None => idle_delay,
            }),
        );

        let proxy = Self {
            shared,
            scheduler,
            task,
        };
        match inner {
            Some(inner) => proxy.set_inner(Some(inner)),
            None => proxy.shared.update_properties(),
        }
        proxy
    }

    /// The current inner source.
    pub fn inner(&self) -> Option<Arc<dyn LogSource>> {
        self.shared.current()
    }

    /// Replaces the inner source. Takes effect for listeners on the next
    /// tick; queries see the new source right away.
    pub fn set_inner(&self, source: Option<Arc<dyn LogSource>>) {
        let shared = &self.shared;
        let mut slot = shared.slot.write();
        slot.generation += 1;
        let generation = slot.generation;

        if let Some(previous) = slot.inner.take() {
            previous.source.remove_listener(&previous.listener);
        }
        let _ = shared.sender.send((generation, LogSourceModification::Reset));

        slot.inner = source.map(|source| {
            let listener: Arc<dyn LogSourceListener> = QueueListener::new(generation, shared.sender.clone());
            source.add_listener(listener.clone(), shared.options.max_wait, shared.options.max_line_count);
            Inner { source, listener }
        });
        tracing::debug!(generation, has_inner = slot.inner.is_some(), "proxy inner replaced");
    }
}

impl LogSource for ProxyLogSource {
    fn columns(&self) -> Vec<ColumnDescriptor> {
        match self.shared.current() {
            Some(inner) => inner.columns(),
            None => columns::minimum(),
        }
    }

    fn properties(&self) -> Vec<PropertyDescriptor> {
        self.shared.properties.read().descriptors()
    }

    fn get_property_value(&self, property: &PropertyDescriptor) -> Value {
        self.shared.properties.read().value(property)
    }

    fn get_all_properties(&self, destination: &mut PropertiesBuffer) {
        destination.copy_from(&self.shared.properties.read());
    }

    fn set_property_value(&self, property: &PropertyDescriptor, value: Value) {
        if let Some(inner) = self.shared.current() {
            inner.set_property_value(property, value);
        }
    }

    fn get_entries(&self, rows: Rows<'_>, destination: &mut dyn LogBuffer, destination_index: usize) -> SourceResult<()> {
        match self.shared.current() {
            Some(inner) => inner.get_entries(rows, destination, destination_index),
            None => {
                destination.ensure_rows(destination_index, rows.len())?;
                destination.fill_all_default(destination_index, rows.len())?;
                Ok(())
            }
        }
    }

    fn add_listener(&self, listener: Arc<dyn LogSourceListener>, max_wait: Duration, max_line_count: usize) {
        self.shared.listeners.add_listener(listener, max_wait, max_line_count);
    }

    fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) {
        self.shared.listeners.remove_listener(listener);
    }
}

impl Drop for ProxyLogSource {
    fn drop(&mut self) {
        self.scheduler.stop_periodic(&self.task);
        if let Some(previous) = self.shared.slot.write().inner.take() {
            previous.source.remove_listener(&previous.listener);
        }
    }
}
