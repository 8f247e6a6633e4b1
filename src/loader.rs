//! Loads finished log files into in-memory sources.
//!
//! Every line becomes one row. A leading timestamp and a level token right
//! after it are recognised heuristically. Lines with neither are kept as
//! continuation lines; the multi-line grouping attaches them to the entry
//! above.

use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Timelike, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tailview_core::buffer::LogEntry;
use tailview_core::column::columns;
use tailview_core::property::properties;
use tailview_core::{LogLevel, LogSourceExt};
use tailview_sources::InMemoryLogSource;

/// Splits a raw line into timestamp and level.
#[derive(Debug, Clone)]
pub struct LineParser {
    timestamp: Regex,
    level: Regex,
}

/// What [`LineParser::parse`] found in one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine {
    pub timestamp: Option<DateTime<Utc>>,
    pub level: LogLevel,
}

impl LineParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            timestamp: Regex::new(
                r"^\[?(\d{4}-\d{2}-\d{2})[T ](\d{2}:\d{2}:\d{2})(?:[.,](\d{1,9}))?\s*(Z|[+-]\d{2}:?\d{2})?\]?",
            )?,
            level: Regex::new(
                r"(?i)^[\s\[\]:|-]*(?:level=)?(trace|debug|information|info|warning|warn|error|err|fatal|critical)\b",
            )?,
        })
    }

    pub fn parse(&self, line: &str) -> ParsedLine {
        let (timestamp, rest) = match self.timestamp.captures(line) {
            Some(captures) => {
                let timestamp = parse_timestamp(
                    &captures[1],
                    &captures[2],
                    captures.get(3).map(|m| m.as_str()),
                    captures.get(4).map(|m| m.as_str()),
                );
                let end = captures.get(0).map_or(0, |m| m.end());
                (timestamp, &line[end..])
            }
            None => (None, line),
        };

        let level = self
            .level
            .captures(rest)
            .and_then(|captures| LogLevel::parse(&captures[1]));
        let level = match (level, timestamp) {
            (Some(level), _) => level,
            // A stamped line without a known level still starts an entry.
            (None, Some(_)) => LogLevel::Other,
            (None, None) => LogLevel::None,
        };
        ParsedLine { timestamp, level }
    }
}

fn parse_timestamp(date: &str, time: &str, fraction: Option<&str>, offset: Option<&str>) -> Option<DateTime<Utc>> {
    let nanos = match fraction {
        Some(fraction) => format!("{fraction:0<9}").parse::<u32>().ok()?,
        None => 0,
    };
    let naive = NaiveDateTime::parse_from_str(&format!("{date}T{time}"), "%Y-%m-%dT%H:%M:%S")
        .ok()?
        .with_nanosecond(nanos)?;

    match offset {
        None | Some("Z") => Some(Utc.from_utc_datetime(&naive)),
        Some(offset) => {
            let digits = offset[1..].replace(':', "");
            let hours: i32 = digits.get(..2)?.parse().ok()?;
            let minutes: i32 = digits.get(2..)?.parse().ok()?;
            let seconds = (hours * 60 + minutes) * 60;
            let offset = if offset.starts_with('-') {
                FixedOffset::west_opt(seconds)?
            } else {
                FixedOffset::east_opt(seconds)?
            };
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|timestamp| timestamp.with_timezone(&Utc))
        }
    }
}

/// Reads `path` into a new in-memory source named after the file.
pub fn load_file(path: &Path, parser: &LineParser) -> anyhow::Result<Arc<InMemoryLogSource>> {
    let text = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    let source = load_text(&String::from_utf8_lossy(&text), &name, parser)?;
    source.set_property(&properties::SIZE, Some(text.len() as u64));
    Ok(source)
}

/// Builds a source from already loaded `text`.
pub fn load_text(text: &str, name: &str, parser: &LineParser) -> anyhow::Result<Arc<InMemoryLogSource>> {
    let entries: Vec<LogEntry> = text
        .lines()
        .map(|line| {
            let parsed = parser.parse(line);
            LogEntry::new()
                .with(&columns::RAW_CONTENT, Some(line.to_string()))
                .with(&columns::LOG_LEVEL, parsed.level)
                .with(&columns::TIMESTAMP, parsed.timestamp)
                .with(&columns::ORIGINAL_DATA_SOURCE_NAME, Some(name.to_string()))
        })
        .collect();

    let source = InMemoryLogSource::shared();
    source
        .add_range(&entries)
        .with_context(|| format!("failed to load {name}"))?;
    source.set_property(&properties::NAME, Some(name.to_string()));
    tracing::debug!(name, rows = entries.len(), "loaded");
    Ok(source)
}
