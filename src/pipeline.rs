//! The view the `tailview merge` command prints.
//!
//! Every input gets its own multi-line grouping so continuation lines carry
//! their entry's timestamp, then an optional filter, and finally one merged
//! view over all inputs.
//!
//! ```text
//! file ──► multi-line ──► [filter] ──┐
//! file ──► multi-line ──► [filter] ──┼──► merged
//! file ──► multi-line ──► [filter] ──┘
//! ```

use anyhow::Context;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tailview_core::column::columns;
use tailview_core::{
    Config, LogBufferExt, LogEntrySourceId, LogLevel, LogSource, LogSourceExt, LogSourceSection, TaskScheduler,
};
use tailview_sources::{
    AllOf, FilterProcessor, LevelFilter, MergedLogSource, MultiLineProcessor, ProcessingLogSource, RegexFilter,
};

/// Which rows survive into the merged view.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    /// Keep this level and everything more severe.
    pub min_level: Option<LogLevel>,
    /// Keep rows whose raw content matches this regular expression.
    pub pattern: Option<String>,
}

impl RowFilter {
    fn is_empty(&self) -> bool {
        self.min_level.is_none() && self.pattern.is_none()
    }

    fn build(&self) -> anyhow::Result<AllOf> {
        let mut filter = AllOf::new();
        if let Some(level) = self.min_level {
            filter = filter.with(LevelFilter::at_least(level));
        }
        if let Some(pattern) = &self.pattern {
            filter = filter.with(RegexFilter::new(pattern)?);
        }
        Ok(filter)
    }
}

/// One printed row of the merged view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedLine {
    pub source_id: LogEntrySourceId,
    pub source: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub level: LogLevel,
    pub content: String,
}

impl fmt::Display for MergedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "[{source}] {}", self.content),
            None => write!(f, "[{}] {}", self.source_id, self.content),
        }
    }
}

/// A merged view over several inputs, plus everything it is derived from.
pub struct MergePipeline {
    merged: MergedLogSource,
    settle_poll: Duration,
}

impl MergePipeline {
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        inputs: Vec<Arc<dyn LogSource>>,
        filter: &RowFilter,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let source_options = config.source_options();
        let mut upstreams: Vec<Arc<dyn LogSource>> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let grouped: Arc<dyn LogSource> = Arc::new(ProcessingLogSource::with_name(
                scheduler.clone(),
                input,
                MultiLineProcessor::new(),
                source_options,
                "multiline",
            ));
            let upstream: Arc<dyn LogSource> = if filter.is_empty() {
                grouped
            } else {
                Arc::new(ProcessingLogSource::with_name(
                    scheduler.clone(),
                    grouped,
                    FilterProcessor::new(filter.build()?),
                    source_options,
                    "filtered",
                ))
            };
            upstreams.push(upstream);
        }

        let merge_options = config.merge_options();
        let merged = MergedLogSource::new(scheduler, upstreams, merge_options).context("failed to merge inputs")?;
        Ok(Self {
            merged,
            settle_poll: merge_options.max_wait.max(source_options.max_wait) + merge_options.idle_delay,
        })
    }

    pub fn merged(&self) -> &MergedLogSource {
        &self.merged
    }

    /// Waits until every input is fully merged. Rate limited notifications
    /// can trail the progress property, so the row count must also hold
    /// still for one poll interval.
    pub async fn settle(&self, timeout: Duration) -> anyhow::Result<()> {
        let started = Instant::now();
        let mut previous = None;
        loop {
            let count = self.merged.count();
            let done = self.merged.percentage_processed() >= 1.0;
            if done && previous == Some(count) {
                tracing::debug!(rows = count, elapsed = ?started.elapsed(), "merge settled");
                return Ok(());
            }
            if started.elapsed() > timeout {
                anyhow::bail!("merge did not finish within {timeout:?}");
            }
            previous = done.then_some(count);
            tokio::time::sleep(self.settle_poll).await;
        }
    }

    /// The merged rows currently available.
    pub fn lines(&self) -> anyhow::Result<Vec<MergedLine>> {
        let count = self.merged.count();
        let rows = self.merged.get_buffer(LogSourceSection::new(0, count))?;
        Ok((0..count)
            .map(|row| MergedLine {
                source_id: rows.get(&columns::SOURCE_ID, row),
                source: rows.get(&columns::ORIGINAL_DATA_SOURCE_NAME, row),
                timestamp: rows.get(&columns::TIMESTAMP, row),
                level: rows.get(&columns::LOG_LEVEL, row),
                content: rows.get(&columns::RAW_CONTENT, row).unwrap_or_default(),
            })
            .collect())
    }
}
