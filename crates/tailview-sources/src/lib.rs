//! Concrete log sources and the sources that compose them.
//!
//! [`InMemoryLogSource`] holds rows directly. Everything else derives its
//! view from one or more upstream sources and catches up on a periodic task:
//! filtered and multi-line views run on the shared
//! [`ProcessingLogSource`] pump, while [`ProxyLogSource`] and
//! [`MergedLogSource`] drain their own notification queues.
//! [`IsolatedLogSource`] wraps sources supplied by plugins.

mod queue;

pub mod filtered;
pub mod isolation;
pub mod memory;
pub mod merged;
pub mod multiline;
pub mod processing;
pub mod proxy;

#[cfg(test)]
mod test_support;

pub use filtered::{
    AllOf, FilterError, FilterProcessor, FilteredLogSource, LevelFilter, LogEntryFilter, RegexFilter, SubstringFilter,
};
pub use isolation::IsolatedLogSource;
pub use memory::InMemoryLogSource;
pub use merged::MergedLogSource;
pub use multiline::{MultiLineLogSource, MultiLineProcessor};
pub use processing::{ProcessingLogSource, Processor};
pub use proxy::ProxyLogSource;
