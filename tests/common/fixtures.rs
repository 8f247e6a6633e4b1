//! Static log corpora used across harnesses.
//!
//! The two service logs interleave in time and the API log carries a
//! multi-line stack trace, which is what the end-to-end harness merges.

/// Web tier log with a three-line entry in the middle.
pub const CORPUS_API: &[&str] = &[
    "2024-01-15T10:00:00Z INFO  api started on :8080",
    "2024-01-15T10:00:02Z WARN  slow request GET /users took 1200ms",
    "2024-01-15T10:00:04Z ERROR request failed",
    "    at handler::users (src/handler.rs:42)",
    "    at router::dispatch (src/router.rs:17)",
    "2024-01-15T10:00:06Z INFO  request served",
];

/// Database log, stamped between the API lines.
pub const CORPUS_DB: &[&str] = &[
    "2024-01-15T10:00:01Z INFO  db accepting connections",
    "2024-01-15T10:00:03Z ERROR deadlock detected",
    "2024-01-15T10:00:05Z INFO  checkpoint complete",
];

/// Lines of `corpus` joined the way they appear in a file.
pub fn file_text(corpus: &[&str]) -> String {
    let mut text = corpus.join("\n");
    text.push('\n');
    text
}
