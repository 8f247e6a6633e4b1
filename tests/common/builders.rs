//! Test builders: ergonomic constructors for sources, schedulers and views.
//!
//! These builders are designed for readability in test assertions, not for
//! production use. They panic on invalid input rather than returning `Result`.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tailview::{
    FilterProcessor, InMemoryLogSource, LogEntryFilter, LogLevel, LogSource, ManualTaskScheduler, MergeOptions,
    MergedLogSource, MultiLineProcessor, ProcessingLogSource, SourceOptions,
};

/// A whole-second timestamp relative to 2023-11-14T22:13:20Z.
pub fn at(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).single()
}

pub fn manual_scheduler() -> Arc<ManualTaskScheduler> {
    Arc::new(ManualTaskScheduler::new())
}

/// Options that deliver every notification immediately.
pub fn immediate() -> SourceOptions {
    SourceOptions::new().max_wait(Duration::ZERO)
}

pub fn immediate_merge() -> MergeOptions {
    MergeOptions::new().max_wait(Duration::ZERO)
}

// ---------------------------------------------------------------------------
// SourceBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`InMemoryLogSource`] fixtures.
///
/// # Example
///
/// ```rust
/// let source = SourceBuilder::new()
///     .row("starting", 0)
///     .continuation("  at main.rs:12")
///     .untimed("no clock here")
///     .build();
/// ```
#[derive(Default)]
pub struct SourceBuilder {
    rows: Vec<(String, LogLevel, Option<DateTime<Utc>>)>,
}

impl SourceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An INFO row stamped `seconds` after the origin.
    pub fn row(self, content: &str, seconds: i64) -> Self {
        self.leveled(content, LogLevel::Info, seconds)
    }

    pub fn leveled(mut self, content: &str, level: LogLevel, seconds: i64) -> Self {
        self.rows.push((content.to_string(), level, at(seconds)));
        self
    }

    /// A row with neither level nor timestamp.
    pub fn continuation(mut self, content: &str) -> Self {
        self.rows.push((content.to_string(), LogLevel::None, None));
        self
    }

    /// A leveled row without timestamp.
    pub fn untimed(mut self, content: &str) -> Self {
        self.rows.push((content.to_string(), LogLevel::Info, None));
        self
    }

    pub fn build(self) -> Arc<InMemoryLogSource> {
        let source = InMemoryLogSource::shared();
        for (content, level, timestamp) in &self.rows {
            source.add_entry(content, *level, *timestamp).unwrap();
        }
        source
    }
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

pub fn multiline_over(
    scheduler: &Arc<ManualTaskScheduler>,
    upstream: Arc<dyn LogSource>,
) -> ProcessingLogSource<MultiLineProcessor> {
    ProcessingLogSource::new(scheduler.clone(), upstream, MultiLineProcessor::new(), immediate())
}

pub fn filtered_over(
    scheduler: &Arc<ManualTaskScheduler>,
    upstream: Arc<dyn LogSource>,
    filter: impl LogEntryFilter + 'static,
) -> ProcessingLogSource<FilterProcessor> {
    ProcessingLogSource::new(scheduler.clone(), upstream, FilterProcessor::new(filter), immediate())
}

pub fn merged_over(scheduler: &Arc<ManualTaskScheduler>, sources: &[Arc<InMemoryLogSource>]) -> MergedLogSource {
    let sources = sources
        .iter()
        .map(|source| source.clone() as Arc<dyn LogSource>)
        .collect();
    MergedLogSource::new(scheduler.clone(), sources, immediate_merge()).unwrap()
}
