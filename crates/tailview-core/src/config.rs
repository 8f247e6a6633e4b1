//! Configuration types for tailview.
//!
//! [`Config::load`] reads `$XDG_CONFIG_HOME/tailview/config.toml` layered on
//! top of the built-in defaults. [`Config::defaults`] returns the same
//! defaults without touching the filesystem (useful in tests).
//!
//! Sources never read [`Config`] themselves: they take a [`SourceOptions`] or
//! [`MergeOptions`], which [`Config`] converts into.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[notifications]
max_wait_ms    = 100
max_line_count = 10000

[processing]
max_entries_per_tick = 10000

[merge]
max_batch_per_source     = 1000
property_update_interval = 100

[scheduler]
idle_delay_ms = 10
"#;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// `[notifications]` section: limits derived sources use when they listen
/// to their upstreams.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_max_line_count")]
    pub max_line_count: usize,
}

fn default_max_wait_ms() -> u64 { 100 }
fn default_max_line_count() -> usize { 10_000 }

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: default_max_wait_ms(),
            max_line_count: default_max_line_count(),
        }
    }
}

/// `[processing]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_max_entries_per_tick")]
    pub max_entries_per_tick: usize,
}

fn default_max_entries_per_tick() -> usize { 10_000 }

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_entries_per_tick: default_max_entries_per_tick(),
        }
    }
}

/// `[merge]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_max_batch_per_source")]
    pub max_batch_per_source: usize,
    #[serde(default = "default_property_update_interval")]
    pub property_update_interval: usize,
}

fn default_max_batch_per_source() -> usize { 1_000 }
fn default_property_update_interval() -> usize { 100 }

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_batch_per_source: default_max_batch_per_source(),
            property_update_interval: default_property_update_interval(),
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
}

fn default_idle_delay_ms() -> u64 { 10 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_delay_ms: default_idle_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load from `$XDG_CONFIG_HOME/tailview/config.toml` (or
    /// `~/.config/tailview/config.toml`), layered on top of the built-in
    /// defaults. A missing file is not an error.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from an explicit path, layered on top of the built-in defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from(path).required(false))
            .build()?
            .try_deserialize()
            .map_err(Into::into)
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        Self {
            notifications: NotificationsConfig::default(),
            processing: ProcessingConfig::default(),
            merge: MergeConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }

    /// The contents of a freshly written `config.toml`.
    pub fn default_document() -> &'static str {
        DEFAULT_CONFIG.trim_start()
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions::new()
            .max_wait(Duration::from_millis(self.notifications.max_wait_ms))
            .max_line_count(self.notifications.max_line_count)
            .max_entries_per_tick(self.processing.max_entries_per_tick)
            .idle_delay(Duration::from_millis(self.scheduler.idle_delay_ms))
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions::new()
            .max_wait(Duration::from_millis(self.notifications.max_wait_ms))
            .max_line_count(self.notifications.max_line_count)
            .max_batch_per_source(self.merge.max_batch_per_source)
            .property_update_interval(self.merge.property_update_interval)
            .idle_delay(Duration::from_millis(self.scheduler.idle_delay_ms))
    }
}

// ---------------------------------------------------------------------------
// Component options
// ---------------------------------------------------------------------------

/// Options of a pump-based source (processing, filtered, multi-line, proxy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOptions {
    /// Rate limit used when listening to the upstream.
    pub max_wait: Duration,
    /// Line limit used when listening to the upstream.
    pub max_line_count: usize,
    /// Most upstream rows consumed by one tick.
    pub max_entries_per_tick: usize,
    /// Delay between ticks.
    pub idle_delay: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(default_max_wait_ms()),
            max_line_count: default_max_line_count(),
            max_entries_per_tick: default_max_entries_per_tick(),
            idle_delay: Duration::from_millis(default_idle_delay_ms()),
        }
    }
}

impl SourceOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn max_wait(mut self, value: Duration) -> Self {
        self.max_wait = value;
        self
    }

    #[must_use]
    pub const fn max_line_count(mut self, value: usize) -> Self {
        self.max_line_count = value;
        self
    }

    #[must_use]
    pub const fn max_entries_per_tick(mut self, value: usize) -> Self {
        self.max_entries_per_tick = value;
        self
    }

    #[must_use]
    pub const fn idle_delay(mut self, value: Duration) -> Self {
        self.idle_delay = value;
        self
    }
}

/// Options of a merged source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub max_wait: Duration,
    pub max_line_count: usize,
    /// One processing pass appends at most five times this many rows.
    pub max_batch_per_source: usize,
    /// Aggregate properties are refreshed every this many merged rows.
    pub property_update_interval: usize,
    pub idle_delay: Duration,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(default_max_wait_ms()),
            max_line_count: default_max_line_count(),
            max_batch_per_source: default_max_batch_per_source(),
            property_update_interval: default_property_update_interval(),
            idle_delay: Duration::from_millis(default_idle_delay_ms()),
        }
    }
}

impl MergeOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn max_wait(mut self, value: Duration) -> Self {
        self.max_wait = value;
        self
    }

    #[must_use]
    pub const fn max_line_count(mut self, value: usize) -> Self {
        self.max_line_count = value;
        self
    }

    #[must_use]
    pub const fn max_batch_per_source(mut self, value: usize) -> Self {
        self.max_batch_per_source = value;
        self
    }

    #[must_use]
    pub const fn property_update_interval(mut self, value: usize) -> Self {
        self.property_update_interval = value;
        self
    }

    #[must_use]
    pub const fn idle_delay(mut self, value: Duration) -> Self {
        self.idle_delay = value;
        self
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Location of the user's `config.toml`.
pub fn config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
                .join(".config")
        })
        .join("tailview")
        .join("config.toml")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
