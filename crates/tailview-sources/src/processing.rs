//! The processing pump: the generic base of every single-upstream derived
//! source.
//!
//! A [`ProcessingLogSource`] subscribes to its upstream and owns one periodic
//! task. Upstream notifications are queued from whatever thread delivers them;
//! each tick drains the queue and replays every modification, in arrival
//! order, through exactly one hook of a [`Processor`]. Hooks never run
//! concurrently with each other.
//!
//! A hook that fails is logged and skipped. The pump's bookkeeping still
//! advances so later modifications line up with the upstream's indices.

use crate::queue::{pending_queue, QueueListener};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tailview_core::column::columns;
use tailview_core::property::properties;
use tailview_core::scheduler::{PeriodicTask, TaskScheduler};
use tailview_core::{
    Column, ColumnDescriptor, ListenerCollection, LogBuffer, LogBufferArray, LogBufferExt, LogLineIndex, LogSource,
    LogSourceListener, LogSourceModification, LogSourceSection, PropertiesBuffer, PropertyDescriptor, Rows,
    SourceOptions, SourceResult, Value, ValueType,
};
use tokio_util::sync::CancellationToken;

/// The part of a derived source that decides what its rows are.
///
/// The pump calls the hooks from its periodic task only. Queries arrive from
/// arbitrary threads and only ever see `&self`.
pub trait Processor: Send + Sync + 'static {
    /// Upstream columns fetched for every appended section.
    fn columns_to_fetch(&self) -> Vec<ColumnDescriptor>;

    /// Columns this source serves, given the upstream's.
    fn columns(&self, upstream: Vec<ColumnDescriptor>) -> Vec<ColumnDescriptor> {
        upstream
    }

    /// The upstream was reset.
    fn on_reset(&mut self) -> SourceResult<()>;

    /// Every upstream row at or after `index` was removed.
    fn on_removed(&mut self, index: usize) -> SourceResult<()>;

    /// Upstream rows `section` became available; `rows` holds
    /// [`columns_to_fetch`](Processor::columns_to_fetch) for them, row 0
    /// being `section.index`.
    fn on_appended(&mut self, section: LogSourceSection, rows: &LogBufferArray) -> SourceResult<()>;

    /// Called on ticks without any pending modification.
    fn nothing_to_process(&mut self) {}

    /// Number of rows this source currently exposes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lets the processor overwrite properties copied from the upstream.
    fn overwrite_properties(&self, _properties: &mut PropertiesBuffer) {}

    /// Serves a query against this source's own rows.
    fn get_entries(
        &self,
        upstream: &dyn LogSource,
        rows: Rows<'_>,
        destination: &mut dyn LogBuffer,
        destination_index: usize,
    ) -> SourceResult<()>;
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PumpState {
    /// Modifications taken from the queue but not yet fully replayed.
    backlog: VecDeque<LogSourceModification>,
    /// Upstream rows replayed so far.
    consumed: usize,
}

struct Pump<P> {
    name: String,
    upstream: Arc<dyn LogSource>,
    processor: RwLock<P>,
    pending: Receiver<((), LogSourceModification)>,
    state: Mutex<PumpState>,
    properties: RwLock<PropertiesBuffer>,
    listeners: ListenerCollection,
    options: SourceOptions,
}

impl<P: Processor> Pump<P> {
    fn next_modification(&self, state: &mut PumpState) -> Option<LogSourceModification> {
        state
            .backlog
            .pop_front()
            .or_else(|| self.pending.try_recv().ok().map(|(_, modification)| modification))
    }

    /// One pass over the queue, bounded by `max_entries_per_tick` upstream
    /// rows.
    fn run_once(&self, token: &CancellationToken) -> Duration {
        let mut state = self.state.lock();
        let mut budget = self.options.max_entries_per_tick.max(1);
        let mut processed = 0usize;

        while budget > 0 && !token.is_cancelled() {
            let Some(modification) = self.next_modification(&mut state) else {
                break;
            };
            processed += 1;
            tracing::debug!(source = %self.name, %modification, "processing");

            match modification {
                LogSourceModification::Reset => self.reset(&mut state),
                LogSourceModification::Removed(section) => self.remove(&mut state, section),
                LogSourceModification::Appended(section) => {
                    let take = section.count.min(budget);
                    if take < section.count {
                        if let Some(start) = section.index.value() {
                            state
                                .backlog
                                .push_front(LogSourceModification::appended(start + take, section.count - take));
                        }
                    }
                    self.append(&mut state, LogSourceSection::new(section.index, take));
                    budget -= take;
                }
            }
        }

        if processed == 0 {
            self.processor.write().nothing_to_process();
            self.listeners.on_read(self.processor.read().len());
            self.synchronize_properties(&state);
            self.listeners.flush();
        } else {
            tracing::debug!(source = %self.name, processed, consumed = state.consumed, "tick");
        }
        self.options.idle_delay
    }

    fn reset(&self, state: &mut PumpState) {
        state.consumed = 0;
        state.backlog.clear();
        if let Err(error) = self.processor.write().on_reset() {
            tracing::warn!(source = %self.name, %error, "reset hook failed");
        }
        self.synchronize_properties(state);
        self.listeners.reset();
    }

    fn remove(&self, state: &mut PumpState, section: LogSourceSection) {
        let Some(index) = section.index.value() else {
            tracing::warn!(source = %self.name, %section, "ignoring removal of an invalid section");
            return;
        };
        state.consumed = state.consumed.min(index);
        let before = self.processor.read().len();
        if let Err(error) = self.processor.write().on_removed(index) {
            tracing::warn!(source = %self.name, %error, "removal hook failed");
        }
        let after = self.processor.read().len();
        self.synchronize_properties(state);
        if after < before {
            self.listeners.remove(after, before - after);
        }
    }

    fn append(&self, state: &mut PumpState, section: LogSourceSection) {
        let Some(end) = section.end() else {
            tracing::warn!(source = %self.name, %section, "ignoring append of an invalid section");
            return;
        };
        state.consumed = end;

        let mut rows = LogBufferArray::new(section.count, self.processor.read().columns_to_fetch());
        let result = self
            .upstream
            .get_entries(Rows::Section(section), &mut rows, 0)
            .and_then(|()| self.processor.write().on_appended(section, &rows));
        if let Err(error) = result {
            tracing::warn!(source = %self.name, %section, %error, "append hook failed");
        }
        // Listeners hear about the rows before progress can claim completion.
        self.listeners.on_read(self.processor.read().len());
        self.synchronize_properties(state);
    }

    /// Copies the upstream's properties, then derives count and progress.
    fn synchronize_properties(&self, state: &PumpState) {
        let mut buffer = PropertiesBuffer::minimum();
        self.upstream.get_all_properties(&mut buffer);

        let upstream_progress = buffer.get(&properties::PERCENTAGE_PROCESSED);
        let upstream_count = buffer.get(&properties::LOG_ENTRY_COUNT);
        let own_progress = if upstream_count > 0 {
            (state.consumed as f64 / upstream_count as f64).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let processor = self.processor.read();
        buffer.set(
            &properties::PERCENTAGE_PROCESSED,
            (upstream_progress * own_progress).clamp(0.0, 1.0),
        );
        buffer.set(&properties::LOG_ENTRY_COUNT, processor.len());
        processor.overwrite_properties(&mut buffer);
        drop(processor);

        *self.properties.write() = buffer;
    }
}

// ---------------------------------------------------------------------------
// ProcessingLogSource
// ---------------------------------------------------------------------------

/// A log source derived from one upstream through a [`Processor`].
pub struct ProcessingLogSource<P: Processor> {
    pump: Arc<Pump<P>>,
    scheduler: Arc<dyn TaskScheduler>,
    task: PeriodicTask,
    upstream_listener: Arc<dyn LogSourceListener>,
}

impl<P: Processor> ProcessingLogSource<P> {
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        upstream: Arc<dyn LogSource>,
        processor: P,
        options: SourceOptions,
    ) -> Self {
        Self::with_name(scheduler, upstream, processor, options, "processing")
    }

    /// Like [`new`](Self::new); `name` identifies the source in logs and in
    /// the scheduler.
    pub fn with_name(
        scheduler: Arc<dyn TaskScheduler>,
        upstream: Arc<dyn LogSource>,
        processor: P,
        options: SourceOptions,
        name: &str,
    ) -> Self {
        let (sender, receiver) = pending_queue();
        let initial = PropertiesBuffer::minimum();

        let pump = Arc::new(Pump {
            name: name.to_string(),
            upstream: upstream.clone(),
            processor: RwLock::new(processor),
            pending: receiver,
            state: Mutex::new(PumpState::default()),
            properties: RwLock::new(initial),
            listeners: ListenerCollection::new(),
            options,
        });

        let upstream_listener: Arc<dyn LogSourceListener> = QueueListener::new((), sender);
        upstream.add_listener(upstream_listener.clone(), options.max_wait, options.max_line_count);

        let weak: Weak<Pump<P>> = Arc::downgrade(&pump);
        let idle_delay = options.idle_delay;
        let task = scheduler.start_periodic(
            name,
            Box::new(move |token| match weak.upgrade() {
                Some(pump) => pump.run_once(token),
                None => idle_delay,
            }),
        );

        Self {
            pump,
            scheduler,
            task,
            upstream_listener,
        }
    }

    pub fn upstream(&self) -> &Arc<dyn LogSource> {
        &self.pump.upstream
    }

    /// Read access to the processor, e.g. for inspecting derived state.
    pub fn with_processor<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(&self.pump.processor.read())
    }
}

impl<P: Processor> LogSource for ProcessingLogSource<P> {
    fn columns(&self) -> Vec<ColumnDescriptor> {
        let upstream = self.pump.upstream.columns();
        self.pump.processor.read().columns(upstream)
    }

    fn properties(&self) -> Vec<PropertyDescriptor> {
        self.pump.properties.read().descriptors()
    }

    fn get_property_value(&self, property: &PropertyDescriptor) -> Value {
        self.pump.properties.read().value(property)
    }

    fn get_all_properties(&self, destination: &mut PropertiesBuffer) {
        destination.copy_from(&self.pump.properties.read());
    }

    fn set_property_value(&self, property: &PropertyDescriptor, value: Value) {
        self.pump.upstream.set_property_value(property, value);
    }

    fn get_entries(&self, rows: Rows<'_>, destination: &mut dyn LogBuffer, destination_index: usize) -> SourceResult<()> {
        destination.ensure_rows(destination_index, rows.len())?;
        self.pump
            .processor
            .read()
            .get_entries(self.pump.upstream.as_ref(), rows, destination, destination_index)
    }

    fn add_listener(&self, listener: Arc<dyn LogSourceListener>, max_wait: Duration, max_line_count: usize) {
        self.pump.listeners.add_listener(listener, max_wait, max_line_count);
    }

    fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) {
        self.pump.listeners.remove_listener(listener);
    }
}

impl<P: Processor> Drop for ProcessingLogSource<P> {
    fn drop(&mut self) {
        self.scheduler.stop_periodic(&self.task);
        self.pump.upstream.remove_listener(&self.upstream_listener);
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by processors
// ---------------------------------------------------------------------------

/// Overwrites `column` of `destination` from `destination_index` on with
/// `values`. Destinations without that column are left alone.
pub(crate) fn overwrite_column<T: ValueType>(
    destination: &mut dyn LogBuffer,
    column: &Column<T>,
    destination_index: usize,
    values: impl IntoIterator<Item = T>,
) -> SourceResult<()> {
    if !destination.contains(&column.descriptor()) {
        return Ok(());
    }
    for (offset, value) in values.into_iter().enumerate() {
        destination.set(column, destination_index + offset, value)?;
    }
    Ok(())
}

/// Writes this source's own positions into the index and line number
/// columns. Rows at or past `len` receive the defaults.
pub(crate) fn write_positions(
    destination: &mut dyn LogBuffer,
    destination_index: usize,
    rows: Rows<'_>,
    len: usize,
) -> SourceResult<()> {
    let own = |row: LogLineIndex| row.value().filter(|&row| row < len);
    overwrite_column(
        destination,
        &columns::INDEX,
        destination_index,
        rows.iter().map(|row| own(row).map_or(LogLineIndex::INVALID, LogLineIndex::new)),
    )?;
    overwrite_column(
        destination,
        &columns::LINE_NUMBER,
        destination_index,
        rows.iter().map(|row| own(row).map_or(0, |row| row + 1)),
    )
}
