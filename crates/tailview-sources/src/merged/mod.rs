//! Time-ordered merge of several log sources into one view.
//!
//! [`MergedLogSource`] listens to every source directly: it cannot sit on
//! the single-upstream pump because it interleaves many producers. All
//! sources push onto one queue tagged with their [`LogEntrySourceId`]; each
//! tick drains that queue in bounded batches and feeds them through
//! [`MergedIndex`](index::MergedIndex).
//!
//! The merged view stores no log content. Index, line number, log entry
//! index, source id and the time columns are answered from the index; every
//! other column is fetched from the owning sources, one request per source.

mod changes;
mod index;

use self::index::{candidate_columns, candidates, optimize, MergedIndex, MergedRow, SourceChange};
use crate::processing::{overwrite_column, write_positions};
use chrono::{DateTime, TimeDelta, Utc};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tailview_core::column::{columns, combine};
use tailview_core::property::properties;
use tailview_core::scheduler::{PeriodicTask, TaskScheduler};
use tailview_core::{
    ColumnDescriptor, ListenerCollection, LogBuffer, LogBufferArray, LogEntrySourceId, LogLineIndex, LogSource,
    LogSourceListener, LogSourceModification, MergeOptions, PropertiesBuffer, PropertyDescriptor, Rows, SourceError,
    SourceResult, Value,
};
use tokio_util::sync::CancellationToken;

type Pending = (LogEntrySourceId, LogSourceModification);

/// Queues the modifications of one merged source.
struct SourceListener {
    source_id: LogEntrySourceId,
    sender: Sender<Pending>,
    pending_rows: Arc<AtomicUsize>,
}

impl LogSourceListener for SourceListener {
    fn on_modified(&self, modification: LogSourceModification) {
        tracing::trace!(source_id = %self.source_id, %modification, "queued");
        self.pending_rows
            .fetch_add(modification.appended_count(), Ordering::Relaxed);
        let _ = self.sender.send((self.source_id, modification));
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Merge {
    sources: Vec<Arc<dyn LogSource>>,
    pending: Receiver<Pending>,
    /// Appended rows queued but not yet merged.
    pending_rows: Arc<AtomicUsize>,
    index: RwLock<MergedIndex>,
    properties: RwLock<PropertiesBuffer>,
    listeners: ListenerCollection,
    options: MergeOptions,
}

impl Merge {
    fn run_once(&self, token: &CancellationToken) -> Duration {
        let update_interval = self.options.property_update_interval.max(1);
        let mut rows_since_update = 0usize;

        while !token.is_cancelled() {
            let batch = self.dequeue_batch();
            if batch.is_empty() {
                break;
            }
            let modification_count = batch.len();
            let changes = self.fetch(optimize(batch));
            let appended: usize = changes
                .iter()
                .map(|(_, change)| match change {
                    SourceChange::Appended(candidates) => candidates.len(),
                    _ => 0,
                })
                .sum();

            let (modifications, len) = {
                let mut index = self.index.write();
                let modifications = index.process(changes);
                (modifications, index.len())
            };
            tracing::debug!(modifications = modification_count, appended, merged = len, "merge pass");

            self.notify(&modifications);

            rows_since_update += appended;
            let shrunk = modifications
                .iter()
                .any(|modification| !matches!(modification, LogSourceModification::Appended(_)));
            if shrunk || rows_since_update >= update_interval {
                self.update_properties();
                rows_since_update = 0;
            }
        }

        self.update_properties();
        if self.pending.is_empty() && self.properties.read().get(&properties::PERCENTAGE_PROCESSED) >= 1.0 {
            self.listeners.flush();
        }
        self.options.idle_delay
    }

    /// Takes modifications off the queue until it is empty or a pass worth
    /// of appended rows has been collected.
    fn dequeue_batch(&self) -> Vec<Pending> {
        let limit = self.options.max_batch_per_source.max(1).saturating_mul(5);
        let mut batch = Vec::new();
        let mut rows = 0usize;
        while rows < limit {
            let Ok((source_id, modification)) = self.pending.try_recv() else {
                break;
            };
            let count = modification.appended_count();
            self.pending_rows.fetch_sub(count, Ordering::Relaxed);
            rows += count;
            tracing::debug!(source_id = %source_id, %modification, "merging");
            batch.push((source_id, modification));
        }
        batch
    }

    /// Reads the rows appended sections refer to. Runs without holding the
    /// index lock.
    fn fetch(&self, pending: Vec<Pending>) -> Vec<(LogEntrySourceId, SourceChange)> {
        pending
            .into_iter()
            .filter_map(|(source_id, modification)| {
                let change = match modification {
                    LogSourceModification::Reset => SourceChange::Reset,
                    LogSourceModification::Removed(section) => SourceChange::Removed(section.index.value()?),
                    LogSourceModification::Appended(section) => {
                        let source = self.sources.get(usize::from(source_id.0))?;
                        let mut rows = LogBufferArray::new(section.count, candidate_columns());
                        match source.get_entries(Rows::Section(section), &mut rows, 0) {
                            Ok(()) => SourceChange::Appended(candidates(source_id, &rows)),
                            Err(error) => {
                                tracing::warn!(source_id = %source_id, %section, %error, "failed to read appended rows");
                                SourceChange::Appended(Vec::new())
                            }
                        }
                    }
                };
                Some((source_id, change))
            })
            .collect()
    }

    fn notify(&self, modifications: &[LogSourceModification]) {
        for modification in modifications {
            match *modification {
                LogSourceModification::Reset => self.listeners.reset(),
                LogSourceModification::Removed(section) => {
                    if let Some(index) = section.index.value() {
                        self.listeners.remove(index, section.count);
                    }
                }
                LogSourceModification::Appended(section) => {
                    if let Some(end) = section.end() {
                        self.listeners.on_read(end);
                    }
                }
            }
        }
    }

    /// Aggregates the sources' properties into the merged view's.
    fn update_properties(&self) {
        let mut size: Option<u64> = None;
        let mut last_modified: Option<DateTime<Utc>> = None;
        let mut start: Option<DateTime<Utc>> = None;
        let mut end: Option<DateTime<Utc>> = None;
        let mut progress = 1.0f64;
        let mut max_characters = 0usize;

        for source in &self.sources {
            let mut values = PropertiesBuffer::minimum();
            source.get_all_properties(&mut values);

            if let Some(source_size) = values.get(&properties::SIZE) {
                size = Some(size.unwrap_or(0) + source_size);
            }
            last_modified = latest(last_modified, values.get(&properties::LAST_MODIFIED));
            start = earliest(start, values.get(&properties::START_TIMESTAMP));
            end = latest(end, values.get(&properties::END_TIMESTAMP));
            progress *= values.get(&properties::PERCENTAGE_PROCESSED).clamp(0.0, 1.0);
            max_characters = max_characters.max(values.get(&properties::MAX_CHARACTERS_IN_LINE));
        }

        let len = self.index.read().len();
        if !self.pending.is_empty() {
            let pending = self.pending_rows.load(Ordering::Relaxed).max(1);
            progress *= len as f64 / (len + pending) as f64;
        }

        let mut buffer = PropertiesBuffer::minimum();
        buffer.set(&properties::LOG_ENTRY_COUNT, len);
        buffer.set(&properties::PERCENTAGE_PROCESSED, progress);
        buffer.set(&properties::SIZE, size);
        buffer.set(&properties::LAST_MODIFIED, last_modified);
        buffer.set(&properties::START_TIMESTAMP, start);
        buffer.set(&properties::END_TIMESTAMP, end);
        buffer.set(&properties::DURATION, difference(end, start));
        buffer.set(&properties::MAX_CHARACTERS_IN_LINE, max_characters);
        *self.properties.write() = buffer;
    }
}

fn latest(current: Option<DateTime<Utc>>, candidate: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    current.max(candidate)
}

fn earliest(current: Option<DateTime<Utc>>, candidate: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (current, candidate) {
        (Some(current), Some(candidate)) => Some(current.min(candidate)),
        (current, candidate) => current.or(candidate),
    }
}

fn difference(later: Option<DateTime<Utc>>, earlier: Option<DateTime<Utc>>) -> Option<TimeDelta> {
    Some(later? - earlier?)
}

// ---------------------------------------------------------------------------
// MergedLogSource
// ---------------------------------------------------------------------------

/// A time-ordered view over up to [`LogEntrySourceId::MAX_SOURCES`] sources.
pub struct MergedLogSource {
    merge: Arc<Merge>,
    source_listeners: Vec<Arc<dyn LogSourceListener>>,
    scheduler: Arc<dyn TaskScheduler>,
    task: PeriodicTask,
}

impl MergedLogSource {
    /// Merges `sources`; the n-th source gets source id n. Fails with
    /// [`SourceError::TooManySources`] past
    /// [`LogEntrySourceId::MAX_SOURCES`] sources.
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        sources: Vec<Arc<dyn LogSource>>,
        options: MergeOptions,
    ) -> SourceResult<Self> {
        let too_many = || SourceError::TooManySources {
            max: LogEntrySourceId::MAX_SOURCES,
            actual: sources.len(),
        };
        if sources.len() > LogEntrySourceId::MAX_SOURCES {
            return Err(too_many());
        }

        let (sender, pending) = crossbeam_channel::unbounded();
        let pending_rows = Arc::new(AtomicUsize::new(0));
        let mut source_listeners: Vec<Arc<dyn LogSourceListener>> = Vec::with_capacity(sources.len());
        for position in 0..sources.len() {
            let source_id = u8::try_from(position).map_err(|_| too_many())?;
            source_listeners.push(Arc::new(SourceListener {
                source_id: LogEntrySourceId(source_id),
                sender: sender.clone(),
                pending_rows: pending_rows.clone(),
            }));
        }

        let merge = Arc::new(Merge {
            sources,
            pending,
            pending_rows,
            index: RwLock::new(MergedIndex::default()),
            properties: RwLock::new(PropertiesBuffer::minimum()),
            listeners: ListenerCollection::new(),
            options,
        });
        for (source, listener) in merge.sources.iter().zip(&source_listeners) {
            source.add_listener(listener.clone(), options.max_wait, options.max_line_count);
        }
        // Progress stays below 1 until the queued replay is merged.
        merge.update_properties();

        let weak: Weak<Merge> = Arc::downgrade(&merge);
        let idle_delay = options.idle_delay;
        let task = scheduler.start_periodic(
            "merged",
            Box::new(move |token| match weak.upgrade() {
                Some(merge) => merge.run_once(token),
                None => idle_delay,
            }),
        );
        tracing::debug!(sources = merge.sources.len(), "merged source created");

        Ok(Self {
            merge,
            source_listeners,
            scheduler,
            task,
        })
    }

    /// The merged sources, in source id order.
    pub fn sources(&self) -> &[Arc<dyn LogSource>] {
        &self.merge.sources
    }

    /// Columns answered from the merged index instead of the sources.
    fn is_index_column(column: &ColumnDescriptor) -> bool {
        [
            columns::INDEX.descriptor(),
            columns::ORIGINAL_INDEX.descriptor(),
            columns::LOG_ENTRY_INDEX.descriptor(),
            columns::LINE_NUMBER.descriptor(),
            columns::ORIGINAL_LINE_NUMBER.descriptor(),
            columns::SOURCE_ID.descriptor(),
            columns::TIMESTAMP.descriptor(),
            columns::ELAPSED_TIME.descriptor(),
            columns::DELTA_TIME.descriptor(),
        ]
        .contains(column)
    }

    fn write_index_columns(
        destination: &mut dyn LogBuffer,
        destination_index: usize,
        rows: Rows<'_>,
        len: usize,
        merged: &[Option<MergedRow>],
        previous: &[Option<DateTime<Utc>>],
        first: Option<DateTime<Utc>>,
    ) -> SourceResult<()> {
        let own = |offset: usize| merged[offset].map(|_| rows.get(offset));
        write_positions(destination, destination_index, rows, len)?;
        overwrite_column(
            destination,
            &columns::ORIGINAL_INDEX,
            destination_index,
            (0..rows.len()).map(|offset| own(offset).unwrap_or(LogLineIndex::INVALID)),
        )?;
        overwrite_column(
            destination,
            &columns::ORIGINAL_LINE_NUMBER,
            destination_index,
            (0..rows.len()).map(|offset| own(offset).and_then(LogLineIndex::value).map_or(0, |row| row + 1)),
        )?;
        overwrite_column(
            destination,
            &columns::LOG_ENTRY_INDEX,
            destination_index,
            merged.iter().map(|row| row.map(|row| row.merged_entry).unwrap_or_default()),
        )?;
        overwrite_column(
            destination,
            &columns::SOURCE_ID,
            destination_index,
            merged.iter().map(|row| row.map(|row| row.source_id).unwrap_or_default()),
        )?;
        overwrite_column(
            destination,
            &columns::TIMESTAMP,
            destination_index,
            merged.iter().map(|row| row.map(|row| row.timestamp)),
        )?;
        overwrite_column(
            destination,
            &columns::ELAPSED_TIME,
            destination_index,
            merged.iter().map(|row| difference(row.map(|row| row.timestamp), first)),
        )?;
        overwrite_column(
            destination,
            &columns::DELTA_TIME,
            destination_index,
            merged
                .iter()
                .zip(previous)
                .map(|(row, previous)| difference(row.map(|row| row.timestamp), *previous)),
        )
    }

    /// Fetches `delegated` columns from the sources, one request per source.
    fn write_source_columns(
        &self,
        destination: &mut dyn LogBuffer,
        destination_index: usize,
        merged: &[Option<MergedRow>],
        delegated: &[ColumnDescriptor],
    ) -> SourceResult<()> {
        // source id -> (destination offsets, source rows)
        let mut groups: BTreeMap<u8, (Vec<usize>, Vec<LogLineIndex>)> = BTreeMap::new();
        for (offset, row) in merged.iter().enumerate() {
            match row {
                Some(row) => {
                    let group = groups.entry(row.source_id.0).or_default();
                    group.0.push(offset);
                    group.1.push(LogLineIndex::new(row.source_row));
                }
                None => {
                    for column in delegated {
                        destination.fill_default(column, destination_index + offset, 1)?;
                    }
                }
            }
        }

        for (source_id, (offsets, source_rows)) in groups {
            let Some(source) = self.merge.sources.get(usize::from(source_id)) else {
                continue;
            };
            let mut fetched = LogBufferArray::new(source_rows.len(), delegated.iter().cloned());
            source.get_entries(Rows::Indices(&source_rows), &mut fetched, 0)?;
            for column in delegated {
                for (position, offset) in offsets.iter().enumerate() {
                    destination.set_value(column, destination_index + offset, fetched.value(column, position))?;
                }
            }
        }
        Ok(())
    }
}

impl LogSource for MergedLogSource {
    fn columns(&self) -> Vec<ColumnDescriptor> {
        let from_sources = self.merge.sources.iter().flat_map(|source| source.columns());
        combine(columns::combine_with_minimum(from_sources), [columns::SOURCE_ID.descriptor()])
    }

    fn properties(&self) -> Vec<PropertyDescriptor> {
        self.merge.properties.read().descriptors()
    }

    fn get_property_value(&self, property: &PropertyDescriptor) -> Value {
        self.merge.properties.read().value(property)
    }

    fn get_all_properties(&self, destination: &mut PropertiesBuffer) {
        destination.copy_from(&self.merge.properties.read());
    }

    fn set_property_value(&self, property: &PropertyDescriptor, value: Value) {
        for source in &self.merge.sources {
            source.set_property_value(property, value.clone());
        }
    }

    fn get_entries(&self, rows: Rows<'_>, destination: &mut dyn LogBuffer, destination_index: usize) -> SourceResult<()> {
        destination.ensure_rows(destination_index, rows.len())?;

        let (len, merged, previous, first) = {
            let index = self.merge.index.read();
            let merged: Vec<Option<MergedRow>> = rows.iter().map(|row| index.get(row).copied()).collect();
            let previous: Vec<Option<DateTime<Utc>>> = rows
                .iter()
                .map(|row| match index.get(row) {
                    Some(_) => index.get(row.previous()).map(|previous| previous.timestamp),
                    None => None,
                })
                .collect();
            let first = index.rows().first().map(|row| row.timestamp);
            (index.len(), merged, previous, first)
        };

        Self::write_index_columns(destination, destination_index, rows, len, &merged, &previous, first)?;

        let delegated: Vec<ColumnDescriptor> = destination
            .columns()
            .iter()
            .filter(|column| !Self::is_index_column(column))
            .cloned()
            .collect();
        if !delegated.is_empty() {
            self.write_source_columns(destination, destination_index, &merged, &delegated)?;
        }
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn LogSourceListener>, max_wait: Duration, max_line_count: usize) {
        self.merge.listeners.add_listener(listener, max_wait, max_line_count);
    }

    fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) {
        self.merge.listeners.remove_listener(listener);
    }
}

impl Drop for MergedLogSource {
    fn drop(&mut self) {
        self.scheduler.stop_periodic(&self.task);
        for (source, listener) in self.merge.sources.iter().zip(&self.source_listeners) {
            source.remove_listener(listener);
        }
    }
}
