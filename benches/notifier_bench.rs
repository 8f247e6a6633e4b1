//! Notification and processing pump benchmarks.
//!
//! # Groups
//!
//! | Group | What it measures |
//! |-------|-----------------|
//! | `notify` | `on_read` growth delivered to 1/10/100 listeners at different line limits |
//! | `pump` | Rows per second through a filtered and a multi-line view over a 100k row source |
//!
//! # Viewing results
//!
//! ```sh
//! cargo bench --bench notifier_bench
//! open target/criterion/report/index.html
//! ```

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tailview::{
    FilterProcessor, InMemoryLogSource, LevelFilter, ListenerCollection, LogLevel, LogSourceExt, LogSourceListener,
    LogSourceModification, ManualTaskScheduler, MultiLineProcessor, ProcessingLogSource, SourceOptions,
};

/// Counts notifications and nothing else.
#[derive(Default)]
struct Counter(AtomicUsize);

impl LogSourceListener for Counter {
    fn on_modified(&self, _modification: LogSourceModification) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

fn notify_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify");
    let growth = 10_000usize;
    group.throughput(Throughput::Elements(growth as u64));

    for listeners in [1usize, 10, 100] {
        for max_line_count in [1usize, 1_000] {
            let id = BenchmarkId::new(format!("lines_{max_line_count}"), listeners);
            group.bench_with_input(id, &(listeners, max_line_count), |b, &(listeners, max_line_count)| {
                b.iter_batched(
                    || {
                        let collection = ListenerCollection::new();
                        for _ in 0..listeners {
                            collection.add_listener(Arc::new(Counter::default()), Duration::ZERO, max_line_count);
                        }
                        collection
                    },
                    |collection| {
                        for count in 1..=growth {
                            collection.on_read(count);
                        }
                        black_box(collection.count())
                    },
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Pump
// ---------------------------------------------------------------------------

/// Every fifth row is a continuation line of the row above.
fn service_log(rows: usize) -> Arc<InMemoryLogSource> {
    let source = InMemoryLogSource::shared();
    for row in 0..rows {
        if row % 5 == 4 {
            source.add_entry("    at somewhere", LogLevel::None, None).unwrap();
        } else {
            let level = if row % 3 == 0 { LogLevel::Warn } else { LogLevel::Info };
            let timestamp = Utc.timestamp_opt(1_700_000_000 + row as i64, 0).single();
            source.add_entry(&format!("event {row}"), level, timestamp).unwrap();
        }
    }
    source
}

fn pump_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("pump");
    let rows = 100_000usize;
    let upstream = service_log(rows);
    let options = SourceOptions::new().max_wait(Duration::ZERO).max_entries_per_tick(rows);
    group.throughput(Throughput::Elements(rows as u64));

    group.bench_function("filtered", |b| {
        b.iter_batched(
            || {
                let scheduler = Arc::new(ManualTaskScheduler::new());
                let view = ProcessingLogSource::new(
                    scheduler.clone(),
                    upstream.clone(),
                    FilterProcessor::new(LevelFilter::at_least(LogLevel::Warn)),
                    options,
                );
                (scheduler, view)
            },
            |(scheduler, view)| {
                scheduler.run_once();
                black_box(view.count())
            },
            BatchSize::LargeInput,
        )
    });

    group.bench_function("multiline", |b| {
        b.iter_batched(
            || {
                let scheduler = Arc::new(ManualTaskScheduler::new());
                let view = ProcessingLogSource::new(scheduler.clone(), upstream.clone(), MultiLineProcessor::new(), options);
                (scheduler, view)
            },
            |(scheduler, view)| {
                scheduler.run_once();
                black_box(view.count())
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(benches, notify_bench, pump_bench);
criterion_main!(benches);
