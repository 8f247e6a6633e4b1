//! Shared test utilities for tailview integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file. Sources are driven by a `ManualTaskScheduler` so every
//! tick happens exactly when a test asks for it.

#![allow(dead_code)]

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod recorder;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;
pub use recorder::*;
