//! Merged view integration harness.
//!
//! # What this covers
//!
//! - **Ordering**: rows of every source appear sorted by timestamp, with the
//!   id of the source they came from, however they arrive.
//! - **Grouping**: continuation rows keep their entry together and a row
//!   arriving between two groups renumbers only the groups after it.
//! - **Visibility**: rows without a timestamp never reach the merged view.
//! - **Removal and reset**: a source shrinking or resetting takes exactly its
//!   rows out of the view.
//! - **Delegated columns**: content and levels are read from the sources.
//! - **Aggregate properties**: size, time range, line width and progress.
//! - **Property tests**: sortedness and contiguous entry numbering for
//!   random inputs delivered over several ticks.
//!
//! # Running
//!
//! ```sh
//! cargo test --test merge_harness
//! ```

mod common;
use chrono::TimeDelta;
use common::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tailview::property::properties;
use tailview::{
    columns, LogEntryIndex, LogEntrySourceId, LogLevel, LogSource, LogSourceExt, LogSourceModification,
    MergedLogSource,
};

const A: LogEntrySourceId = LogEntrySourceId(0);
const B: LogEntrySourceId = LogEntrySourceId(1);

fn entries(indices: &[usize]) -> Vec<LogEntryIndex> {
    indices.iter().copied().map(LogEntryIndex::new).collect()
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[test]
fn two_sources_interleave_by_timestamp() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().row("a", 0).build();
    let b = SourceBuilder::new().row("b", 5).build();
    let merged = merged_over(&scheduler, &[a, b]);
    scheduler.run_once();

    assert_eq!(merged.count(), 2);
    assert_contents!(merged, ["a", "b"]);
    assert_column!(merged, columns::TIMESTAMP, [at(0), at(5)]);
    assert_column!(merged, columns::SOURCE_ID, [A, B]);
}

#[test]
fn late_arrival_lands_before_newer_rows() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().build();
    let b = SourceBuilder::new().build();
    let merged = merged_over(&scheduler, &[a.clone(), b.clone()]);

    a.add_entry("second", LogLevel::Info, at(2)).unwrap();
    scheduler.run_once();
    b.add_entry("first", LogLevel::Info, at(1)).unwrap();
    scheduler.run_once();

    assert_contents!(merged, ["first", "second"]);
    assert_column!(merged, columns::SOURCE_ID, [B, A]);
    assert_column!(merged, columns::LOG_ENTRY_INDEX, [LogEntryIndex::new(0), LogEntryIndex::new(1)]);
}

#[test]
fn equal_timestamps_keep_arrival_order() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().row("a1", 3).row("a2", 3).build();
    let b = SourceBuilder::new().row("b1", 3).build();
    let merged = merged_over(&scheduler, &[a, b]);
    scheduler.run_once();

    assert_contents!(merged, ["a1", "a2", "b1"]);
}

#[test]
fn positions_and_time_columns_follow_the_merged_order() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().row("a", 0).row("c", 10).build();
    let b = SourceBuilder::new().row("b", 4).build();
    let merged = merged_over(&scheduler, &[a, b]);
    scheduler.run_once();

    assert_column!(merged, columns::LINE_NUMBER, [1usize, 2, 3]);
    assert_column!(
        merged,
        columns::ELAPSED_TIME,
        [Some(TimeDelta::zero()), Some(TimeDelta::seconds(4)), Some(TimeDelta::seconds(10))]
    );
    assert_column!(
        merged,
        columns::DELTA_TIME,
        [None, Some(TimeDelta::seconds(4)), Some(TimeDelta::seconds(6))]
    );
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

fn merged_multiline(
    scheduler: &Arc<tailview::ManualTaskScheduler>,
    sources: &[Arc<tailview::InMemoryLogSource>],
) -> MergedLogSource {
    let grouped = sources
        .iter()
        .map(|source| Arc::new(multiline_over(scheduler, source.clone())) as Arc<dyn LogSource>)
        .collect();
    MergedLogSource::new(scheduler.clone(), grouped, immediate_merge()).unwrap()
}

#[test]
fn continuation_rows_stay_with_their_entry() {
    let scheduler = manual_scheduler();
    let api = SourceBuilder::new()
        .leveled("request failed", LogLevel::Error, 0)
        .continuation("    at handler")
        .continuation("    at router")
        .row("request served", 10)
        .build();
    let db = SourceBuilder::new().row("checkpoint", 5).build();
    let merged = merged_multiline(&scheduler, &[api, db]);
    scheduler.run_once();

    assert_contents!(
        merged,
        ["request failed", "    at handler", "    at router", "checkpoint", "request served"]
    );
    assert_column!(merged, columns::SOURCE_ID, [A, A, A, B, A]);
    assert_eq!(
        assertions::all_rows(&merged, &columns::LOG_ENTRY_INDEX),
        entries(&[0, 0, 0, 1, 2])
    );
}

#[test]
fn row_between_groups_renumbers_only_later_groups() {
    let scheduler = manual_scheduler();
    let api = SourceBuilder::new()
        .leveled("request failed", LogLevel::Error, 0)
        .continuation("    at handler")
        .row("request served", 10)
        .build();
    let db = SourceBuilder::new().row("checkpoint", 5).build();
    let merged = merged_multiline(&scheduler, &[api, db.clone()]);
    scheduler.run_once();

    let recorder = Recorder::new();
    merged.add_listener(recorder.clone(), Duration::ZERO, 100);
    recorder.take();

    db.add_entry("vacuum", LogLevel::Info, at(7)).unwrap();
    scheduler.run_once();

    assert_contents!(
        merged,
        ["request failed", "    at handler", "checkpoint", "vacuum", "request served"]
    );
    assert_eq!(
        assertions::all_rows(&merged, &columns::LOG_ENTRY_INDEX),
        entries(&[0, 0, 1, 2, 3])
    );
    assert_eq!(
        recorder.take(),
        vec![LogSourceModification::removed(3, 1), LogSourceModification::appended(3, 2)]
    );
}

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

#[test]
fn rows_without_timestamp_are_left_out() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new()
        .row("stamped", 0)
        .untimed("no clock")
        .continuation("  dangling")
        .row("stamped again", 2)
        .build();
    let merged = merged_over(&scheduler, &[a]);
    scheduler.run_once();

    assert_contents!(merged, ["stamped", "stamped again"]);
}

#[test]
fn source_of_untimed_rows_leaves_the_view_empty() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().untimed("one").untimed("two").build();
    let merged = merged_over(&scheduler, &[a]);
    scheduler.run_once();

    assert_eq!(merged.count(), 0);
    assert_eq!(merged.percentage_processed(), 1.0);
}

// ---------------------------------------------------------------------------
// Removal and reset
// ---------------------------------------------------------------------------

#[test]
fn removal_takes_out_only_that_sources_rows() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().row("a0", 0).row("a1", 2).row("a2", 4).build();
    let b = SourceBuilder::new().row("b0", 1).row("b1", 3).build();
    let merged = merged_over(&scheduler, &[a.clone(), b]);
    scheduler.run_once();

    let recorder = Recorder::new();
    merged.add_listener(recorder.clone(), Duration::ZERO, 100);
    recorder.take();

    a.remove_from(1);
    scheduler.run_once();

    assert_contents!(merged, ["a0", "b0", "b1"]);
    assert_eq!(
        assertions::all_rows(&merged, &columns::LOG_ENTRY_INDEX),
        entries(&[0, 1, 2])
    );
    let modifications = recorder.take();
    assert_eq!(modifications[0], LogSourceModification::removed(2, 3));
    assert_eq!(Recorder::replayed_count(&modifications), 3);
}

#[test]
fn reset_of_one_source_keeps_the_others() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().row("a0", 0).row("a1", 2).build();
    let b = SourceBuilder::new().row("b0", 1).build();
    let merged = merged_over(&scheduler, &[a.clone(), b]);
    scheduler.run_once();

    a.clear();
    scheduler.run_once();
    assert_contents!(merged, ["b0"]);

    a.add_entry("a again", LogLevel::Info, at(0)).unwrap();
    scheduler.run_once();
    assert_contents!(merged, ["a again", "b0"]);
}

#[test]
fn emptying_the_view_is_reported_as_reset() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().row("a0", 0).row("a1", 1).build();
    let merged = merged_over(&scheduler, &[a.clone()]);
    scheduler.run_once();

    let recorder = Recorder::new();
    merged.add_listener(recorder.clone(), Duration::ZERO, 100);
    recorder.take();

    a.clear();
    scheduler.run_once();

    assert_eq!(recorder.take(), vec![LogSourceModification::Reset]);
    assert_eq!(merged.count(), 0);
}

// ---------------------------------------------------------------------------
// Delegated columns
// ---------------------------------------------------------------------------

#[test]
fn content_and_level_come_from_the_sources() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new()
        .leveled("disk full", LogLevel::Error, 0)
        .leveled("retrying", LogLevel::Debug, 6)
        .build();
    let b = SourceBuilder::new().leveled("slow query", LogLevel::Warn, 3).build();
    let merged = merged_over(&scheduler, &[a, b]);
    scheduler.run_once();

    assert_column!(merged, columns::LOG_LEVEL, [LogLevel::Error, LogLevel::Warn, LogLevel::Debug]);
    assert_contents!(merged, ["disk full", "slow query", "retrying"]);
    assertions::assert_defaults_past_end(&merged);
}

// ---------------------------------------------------------------------------
// Aggregate properties
// ---------------------------------------------------------------------------

#[test]
fn properties_aggregate_over_sources() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().row("short", 10).build();
    let b = SourceBuilder::new().row("the longest line", 0).row("end", 40).build();
    let merged = merged_over(&scheduler, &[a, b]);
    scheduler.run_once();

    assert_eq!(merged.get_property(&properties::LOG_ENTRY_COUNT), 3);
    assert_eq!(merged.get_property(&properties::START_TIMESTAMP), at(0));
    assert_eq!(merged.get_property(&properties::END_TIMESTAMP), at(40));
    assert_eq!(merged.get_property(&properties::DURATION), Some(TimeDelta::seconds(40)));
    assert_eq!(merged.get_property(&properties::MAX_CHARACTERS_IN_LINE), 16);
    assert_eq!(merged.percentage_processed(), 1.0);
}

#[test]
fn progress_is_zero_before_the_first_tick() {
    let scheduler = manual_scheduler();
    let a = SourceBuilder::new().row("a", 0).build();
    let merged = merged_over(&scheduler, &[a]);

    assert_eq!(merged.count(), 0);
    assert_eq!(merged.percentage_processed(), 0.0);
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------

/// Per source: batches of row timestamps, in seconds.
fn arbitrary_sources() -> impl Strategy<Value = Vec<Vec<Vec<i64>>>> {
    prop::collection::vec(
        prop::collection::vec(prop::collection::vec(0i64..60, 0..6), 1..4),
        1..4,
    )
}

proptest! {
    #[test]
    fn merged_rows_are_sorted_and_numbered(sources in arbitrary_sources()) {
        let scheduler = manual_scheduler();
        let memory: Vec<_> = sources.iter().map(|_| SourceBuilder::new().build()).collect();
        let merged = merged_over(&scheduler, &memory);
        let recorder = Recorder::new();
        merged.add_listener(recorder.clone(), Duration::ZERO, 1000);

        let ticks = sources.iter().map(Vec::len).max().unwrap_or(0);
        for tick in 0..ticks {
            for (source, batches) in memory.iter().zip(&sources) {
                for seconds in batches.get(tick).into_iter().flatten() {
                    source.add_entry("row", LogLevel::Info, at(*seconds)).unwrap();
                }
            }
            scheduler.run_once();
        }

        let total: usize = sources.iter().flatten().map(Vec::len).sum();
        prop_assert_eq!(merged.count(), total);

        let timestamps = assertions::all_rows(&merged, &columns::TIMESTAMP);
        prop_assert!(timestamps.windows(2).all(|pair| pair[0] <= pair[1]));

        let expected: Vec<LogEntryIndex> = (0..total).map(LogEntryIndex::new).collect();
        prop_assert_eq!(assertions::all_rows(&merged, &columns::LOG_ENTRY_INDEX), expected);

        for (id, batches) in sources.iter().enumerate() {
            let rows = batches.iter().map(Vec::len).sum::<usize>();
            let merged_rows = assertions::all_rows(&merged, &columns::SOURCE_ID)
                .into_iter()
                .filter(|source_id| usize::from(source_id.0) == id)
                .count();
            prop_assert_eq!(merged_rows, rows);
        }

        prop_assert_eq!(Recorder::replayed_count(&recorder.take()), total);
    }
}
