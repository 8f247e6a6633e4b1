//! End-to-end harness: log files in, one merged view out.
//!
//! # What this covers
//!
//! - **Loader**: files on disk become named sources whose continuation lines
//!   carry no timestamp or level of their own.
//! - **Pipeline**: multi-line grouping, optional filtering and the merge,
//!   driven tick by tick through a manual scheduler.
//! - **Configuration**: a user `config.toml` feeds the options every stage
//!   is built with.
//! - **Tokio scheduler**: periodic tasks run, stop and shut down on a real
//!   runtime, and a pipeline settles on it without manual ticking.
//!
//! # Running
//!
//! ```sh
//! cargo test --test pipeline_harness
//! ```

mod common;
use common::*;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tailview::loader::{load_file, LineParser};
use tailview::pipeline::{MergePipeline, RowFilter};
use tailview::property::properties;
use tailview::{Config, LogEntrySourceId, LogLevel, LogSource, LogSourceExt, TaskScheduler, TokioTaskScheduler};

/// Writes both corpora into `dir` and loads them.
fn load_corpora(dir: &Path) -> Vec<Arc<dyn LogSource>> {
    let parser = LineParser::new().unwrap();
    [("api.log", CORPUS_API), ("db.log", CORPUS_DB)]
        .into_iter()
        .map(|(name, corpus)| {
            let path: PathBuf = dir.join(name);
            std::fs::write(&path, file_text(corpus)).unwrap();
            load_file(&path, &parser).unwrap() as Arc<dyn LogSource>
        })
        .collect()
}

/// Defaults, but every notification is delivered right away.
fn immediate_config() -> Config {
    let mut config = Config::defaults();
    config.notifications.max_wait_ms = 0;
    config
}

fn manual_pipeline(filter: RowFilter, config: &Config) -> (Arc<tailview::ManualTaskScheduler>, MergePipeline) {
    let dir = tempfile::tempdir().unwrap();
    let inputs = load_corpora(dir.path());
    let scheduler = manual_scheduler();
    let pipeline = MergePipeline::new(scheduler.clone(), inputs, &filter, config).unwrap();
    scheduler.run(3);
    (scheduler, pipeline)
}

fn printed(pipeline: &MergePipeline) -> Vec<String> {
    pipeline
        .lines()
        .unwrap()
        .into_iter()
        .map(|line| line.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

#[test]
fn loaded_files_are_named_and_sized() {
    let dir = tempfile::tempdir().unwrap();
    let sources = load_corpora(dir.path());

    assert_eq!(sources[0].count(), CORPUS_API.len());
    assert_eq!(sources[0].get_property(&properties::NAME), Some("api.log".to_string()));
    assert_eq!(
        sources[1].get_property(&properties::SIZE),
        Some(file_text(CORPUS_DB).len() as u64)
    );
    assert_column!(
        *sources[0],
        tailview::columns::LOG_LEVEL,
        [LogLevel::Info, LogLevel::Warn, LogLevel::Error, LogLevel::None, LogLevel::None, LogLevel::Info]
    );
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[test]
fn unfiltered_merge_interleaves_both_files() {
    let (_scheduler, pipeline) = manual_pipeline(RowFilter::default(), &immediate_config());

    assert_eq!(
        printed(&pipeline),
        vec![
            "[api.log] 2024-01-15T10:00:00Z INFO  api started on :8080",
            "[db.log] 2024-01-15T10:00:01Z INFO  db accepting connections",
            "[api.log] 2024-01-15T10:00:02Z WARN  slow request GET /users took 1200ms",
            "[db.log] 2024-01-15T10:00:03Z ERROR deadlock detected",
            "[api.log] 2024-01-15T10:00:04Z ERROR request failed",
            "[api.log]     at handler::users (src/handler.rs:42)",
            "[api.log]     at router::dispatch (src/router.rs:17)",
            "[db.log] 2024-01-15T10:00:05Z INFO  checkpoint complete",
            "[api.log] 2024-01-15T10:00:06Z INFO  request served",
        ]
    );
    assert_eq!(pipeline.merged().percentage_processed(), 1.0);
}

#[test]
fn stack_trace_lines_inherit_their_entry() {
    let (_scheduler, pipeline) = manual_pipeline(RowFilter::default(), &immediate_config());
    let lines = pipeline.lines().unwrap();

    let trace: Vec<_> = lines.iter().filter(|line| line.content.starts_with("    at")).collect();
    assert_eq!(trace.len(), 2);
    for line in trace {
        assert_eq!(line.level, LogLevel::Error);
        assert_eq!(line.source_id, LogEntrySourceId(0));
        assert_eq!(line.timestamp, lines[4].timestamp);
    }
}

#[test]
fn level_filter_keeps_whole_entries() {
    let filter = RowFilter {
        min_level: Some(LogLevel::Warn),
        pattern: None,
    };
    let (_scheduler, pipeline) = manual_pipeline(filter, &immediate_config());

    assert_eq!(
        printed(&pipeline),
        vec![
            "[api.log] 2024-01-15T10:00:02Z WARN  slow request GET /users took 1200ms",
            "[db.log] 2024-01-15T10:00:03Z ERROR deadlock detected",
            "[api.log] 2024-01-15T10:00:04Z ERROR request failed",
            "[api.log]     at handler::users (src/handler.rs:42)",
            "[api.log]     at router::dispatch (src/router.rs:17)",
        ]
    );
}

#[test]
fn pattern_filter_matches_single_lines() {
    let filter = RowFilter {
        min_level: None,
        pattern: Some("request".to_string()),
    };
    let (_scheduler, pipeline) = manual_pipeline(filter, &immediate_config());
    let contents: Vec<String> = pipeline.lines().unwrap().into_iter().map(|line| line.content).collect();

    assert_eq!(
        contents,
        vec![
            "2024-01-15T10:00:02Z WARN  slow request GET /users took 1200ms",
            "2024-01-15T10:00:04Z ERROR request failed",
            "2024-01-15T10:00:06Z INFO  request served",
        ]
    );
}

#[test]
fn invalid_pattern_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let filter = RowFilter {
        min_level: None,
        pattern: Some("(unclosed".to_string()),
    };
    let result = MergePipeline::new(manual_scheduler(), load_corpora(dir.path()), &filter, &Config::defaults());
    let error = result.err().expect("pattern should be rejected");
    assert!(format!("{error:#}").contains("(unclosed"), "{error:#}");
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn config_file_drives_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[notifications]\nmax_wait_ms = 0\n\n[processing]\nmax_entries_per_tick = 2\n").unwrap();
    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.source_options().max_entries_per_tick, 2);
    assert_eq!(config.merge_options().max_wait, Duration::ZERO);

    let inputs = load_corpora(dir.path());
    let scheduler = manual_scheduler();
    let pipeline = MergePipeline::new(scheduler.clone(), inputs, &RowFilter::default(), &config).unwrap();

    // Two upstream rows per tick: the API file needs three ticks.
    scheduler.run_once();
    assert!(pipeline.merged().count() < 9);
    assert!(pipeline.merged().percentage_processed() < 1.0);

    scheduler.run(3);
    assert_eq!(pipeline.merged().count(), 9);
    assert_eq!(pipeline.merged().percentage_processed(), 1.0);
}

// ---------------------------------------------------------------------------
// Tokio scheduler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn periodic_task_runs_until_stopped() {
    let scheduler = TokioTaskScheduler::current();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let task = scheduler.start_periodic(
        "counter",
        Box::new(move |_token| {
            counter.fetch_add(1, Ordering::Relaxed);
            Duration::from_millis(1)
        }),
    );
    assert_eq!(task.name(), "counter");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(calls.load(Ordering::Relaxed) > 0);

    assert!(scheduler.stop_periodic(&task));
    assert!(!scheduler.stop_periodic(&task));
    let stopped_at = calls.load(Ordering::Relaxed);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::Relaxed), stopped_at);
}

#[tokio::test]
async fn shutdown_stops_every_task() {
    let scheduler = TokioTaskScheduler::current();
    let calls = Arc::new(AtomicUsize::new(0));
    for name in ["a", "b"] {
        let counter = calls.clone();
        scheduler.start_periodic(
            name,
            Box::new(move |_token| {
                counter.fetch_add(1, Ordering::Relaxed);
                Duration::from_millis(1)
            }),
        );
    }
    assert_eq!(scheduler.task_count(), 2);

    tokio::time::sleep(Duration::from_millis(20)).await;
    scheduler.shutdown();
    assert_eq!(scheduler.task_count(), 0);
    let stopped_at = calls.load(Ordering::Relaxed);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::Relaxed), stopped_at);
}

#[tokio::test]
async fn pipeline_settles_on_tokio() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = load_corpora(dir.path());
    let scheduler = Arc::new(TokioTaskScheduler::current());
    let pipeline = MergePipeline::new(
        scheduler.clone() as Arc<dyn TaskScheduler>,
        inputs,
        &RowFilter::default(),
        &Config::defaults(),
    )
    .unwrap();

    pipeline.settle(Duration::from_secs(10)).await.unwrap();
    assert_eq!(pipeline.lines().unwrap().len(), 9);

    drop(pipeline);
    scheduler.shutdown();
}
