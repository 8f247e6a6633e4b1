//! tailview: composable, incrementally merged views over growing logs.
//!
//! This crate re-exports the two library crates so that integration tests
//! and the `tailview` binary can import everything from one place, and adds
//! the pieces the binary needs on top of them.
//!
//! # Architecture
//!
//! ```text
//! tailview-core ──► tailview-sources ──► loader / pipeline ──► CLI
//! ```
//!
//! Every derived source runs on a periodic task of a shared
//! [`TaskScheduler`]: [`TokioTaskScheduler`] in production,
//! [`ManualTaskScheduler`] in tests.

pub mod loader;
pub mod pipeline;

pub use tailview_core::*;
pub use tailview_sources::*;
