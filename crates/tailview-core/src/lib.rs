//! tailview-core: the data model every tailview log source is built on.
//!
//! This crate defines what a log source *is*; the concrete sources live in
//! `tailview-sources`.
//!
//! # Layers
//!
//! ```text
//! value ──► column / property ──► buffer ──► source
//!                                              │
//!                        notifier ◄────────────┤
//!                        scheduler ◄───────────┘
//! ```
//!
//! - [`value`]: closed set of cell value kinds and their column storage.
//! - [`column`] / [`property`]: typed descriptors and the well-known sets.
//! - [`buffer`]: column-oriented row containers.
//! - [`source`]: the [`LogSource`] and [`LogSourceListener`] traits.
//! - [`notifier`]: rate-limited, per-listener change notification.
//! - [`scheduler`]: periodic tasks driving every derived source.

pub mod buffer;
pub mod column;
pub mod config;
pub mod error;
pub mod notifier;
pub mod property;
pub mod scheduler;
pub mod source;
pub mod types;
pub mod value;

pub use buffer::{LogBuffer, LogBufferArray, LogBufferExt, LogBufferList, LogEntry};
pub use column::{columns, Column, ColumnDescriptor};
pub use config::{Config, MergeOptions, SourceOptions};
pub use error::{BufferError, BufferResult, SourceError, SourceResult};
pub use notifier::{ListenerCollection, ListenerNotifier};
pub use property::{properties, PropertiesBuffer, Property, PropertyDescriptor};
pub use scheduler::{ManualTaskScheduler, PeriodicCallback, PeriodicTask, TaskScheduler, TokioTaskScheduler};
pub use source::{LogSource, LogSourceExt, LogSourceListener};
pub use types::{
    EmptyReason, LogEntryIndex, LogEntrySourceId, LogLevel, LogLineIndex, LogSourceModification, LogSourceSection,
    Rows,
};
pub use value::{ColumnData, Value, ValueKind, ValueType};
