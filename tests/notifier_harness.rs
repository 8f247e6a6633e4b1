//! Listener notification integration harness.
//!
//! # What this covers
//!
//! - **Batching**: `max_line_count = 1, max_wait = 0` yields one append per
//!   row plus the initial reset; larger limits chunk growth.
//! - **Rate limits**: rows are held back until either limit is crossed and
//!   `flush` delivers them regardless.
//! - **Resets**: consecutive resets are forwarded once.
//! - **Removals**: clipped to what each listener was told.
//! - **Independent cursors**: two listeners of one source see the same
//!   growth at their own granularity.
//!
//! # Running
//!
//! ```sh
//! cargo test --test notifier_harness
//! ```

mod common;
use common::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::time::Duration;
use tailview::{ListenerCollection, LogSource, LogSourceModification};

const HOUR: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// Batching
// ---------------------------------------------------------------------------

#[rstest]
#[case(1)]
#[case(5)]
#[case(20)]
fn unit_limits_report_every_row(#[case] rows: usize) {
    let source = SourceBuilder::new().build();
    let recorder = Recorder::new();
    source.add_listener(recorder.clone(), Duration::ZERO, 1);

    for row in 0..rows {
        source.add_entry(&format!("row {row}"), tailview::LogLevel::Info, at(row as i64)).unwrap();
    }

    let mut expected = vec![LogSourceModification::Reset];
    expected.extend((0..rows).map(|row| LogSourceModification::appended(row, 1)));
    assert_eq!(recorder.take(), expected);
}

#[rstest]
#[case(2500, 1000, vec![(0, 1000), (1000, 1000), (2000, 500)])]
#[case(10, 3, vec![(0, 3), (3, 3), (6, 3), (9, 1)])]
#[case(4, 10, vec![(0, 4)])]
fn growth_is_chunked_by_line_count(
    #[case] rows: usize,
    #[case] max_line_count: usize,
    #[case] chunks: Vec<(usize, usize)>,
) {
    let source = SourceBuilder::new().build();
    let recorder = Recorder::new();
    source.add_listener(recorder.clone(), Duration::ZERO, max_line_count);
    recorder.take();

    source.add_empty_entries(rows).unwrap();

    let expected: Vec<_> = chunks
        .into_iter()
        .map(|(index, count)| LogSourceModification::appended(index, count))
        .collect();
    assert_eq!(recorder.take(), expected);
}

#[test]
fn late_listener_is_replayed_the_current_rows() {
    let source = SourceBuilder::new().row("a", 0).row("b", 1).row("c", 2).build();
    let recorder = Recorder::new();
    source.add_listener(recorder.clone(), Duration::ZERO, 2);
    assert_eq!(
        recorder.take(),
        vec![
            LogSourceModification::Reset,
            LogSourceModification::appended(0, 2),
            LogSourceModification::appended(2, 1),
        ]
    );
}

// ---------------------------------------------------------------------------
// Rate limits
// ---------------------------------------------------------------------------

#[test]
fn rows_wait_for_the_line_limit() {
    let collection = ListenerCollection::new();
    let recorder = Recorder::new();
    collection.add_listener(recorder.clone(), HOUR, 4);
    recorder.take();

    for count in 1..=3 {
        collection.on_read(count);
        assert!(recorder.take().is_empty(), "reported early at {count} rows");
    }
    collection.on_read(4);
    assert_eq!(recorder.take(), vec![LogSourceModification::appended(0, 4)]);
}

#[test]
fn flush_ignores_the_limits() {
    let collection = ListenerCollection::new();
    let recorder = Recorder::new();
    collection.add_listener(recorder.clone(), HOUR, 100);
    recorder.take();

    collection.on_read(3);
    assert!(recorder.take().is_empty());
    collection.flush();
    assert_eq!(recorder.take(), vec![LogSourceModification::appended(0, 3)]);

    collection.flush();
    assert!(recorder.take().is_empty(), "flush without growth must stay silent");
}

// ---------------------------------------------------------------------------
// Resets and removals
// ---------------------------------------------------------------------------

#[test]
fn consecutive_resets_are_forwarded_once() {
    let collection = ListenerCollection::new();
    let recorder = Recorder::new();
    collection.add_listener(recorder.clone(), Duration::ZERO, 100);
    collection.on_read(5);
    collection.reset();
    collection.reset();

    assert_eq!(
        recorder.take(),
        vec![
            LogSourceModification::Reset,
            LogSourceModification::appended(0, 5),
            LogSourceModification::Reset,
        ]
    );
}

#[test]
fn fresh_listener_after_resets_sees_one_reset() {
    let collection = ListenerCollection::new();
    collection.on_read(5);
    collection.reset();
    collection.reset();

    let recorder = Recorder::new();
    collection.add_listener(recorder.clone(), Duration::ZERO, 100);
    assert_eq!(recorder.take(), vec![LogSourceModification::Reset]);
}

#[test]
fn removal_is_clipped_to_reported_rows() {
    let collection = ListenerCollection::new();
    let recorder = Recorder::new();
    collection.add_listener(recorder.clone(), Duration::ZERO, 100);
    collection.on_read(10);
    recorder.take();

    collection.remove(4, 6);
    assert_eq!(recorder.take(), vec![LogSourceModification::removed(4, 6)]);
    assert_eq!(collection.count(), 4);

    collection.on_read(6);
    assert_eq!(recorder.take(), vec![LogSourceModification::appended(4, 2)]);
}

#[test]
fn removal_of_unreported_rows_is_silent() {
    let collection = ListenerCollection::new();
    let recorder = Recorder::new();
    collection.add_listener(recorder.clone(), HOUR, 5);
    collection.on_read(5);
    collection.on_read(8);
    recorder.take();

    collection.remove(6, 2);
    assert!(recorder.take().is_empty());
}

// ---------------------------------------------------------------------------
// Independent cursors
// ---------------------------------------------------------------------------

#[test]
fn listeners_have_independent_cursors() {
    let source = SourceBuilder::new().build();
    let fine = Recorder::new();
    let coarse = Recorder::new();
    source.add_listener(fine.clone(), Duration::ZERO, 1);
    source.add_listener(coarse.clone(), HOUR, 3);
    fine.take();
    coarse.take();

    source.add_empty_entries(3).unwrap();

    let fine = fine.take();
    let coarse = coarse.take();
    assert_eq!(fine.len(), 3);
    assert_eq!(coarse, vec![LogSourceModification::appended(0, 3)]);
    assert_eq!(Recorder::replayed_count(&fine), Recorder::replayed_count(&coarse));
}

#[test]
fn removed_listener_hears_nothing() {
    let source = SourceBuilder::new().build();
    let recorder = Recorder::new();
    let listener: std::sync::Arc<dyn tailview::LogSourceListener> = recorder.clone();
    source.add_listener(listener.clone(), Duration::ZERO, 1);
    source.remove_listener(&listener);
    recorder.take();

    source.add_empty_entries(2).unwrap();
    assert!(recorder.take().is_empty());
}
