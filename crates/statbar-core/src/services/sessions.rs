//! Session-log usage source
//!
//! Aggregates token counts from local agent session logs. Sessions live as
//! line-delimited JSON under `<logs_root>/<project>/<session>.jsonl`; each
//! line is one event record and assistant-message records carry per-call
//! token usage.
//!
//! The aggregation is deliberately tolerant: a malformed line is skipped
//! without failing the file, and a malformed or unreadable file is skipped
//! without failing the run. Only two conditions are errors: the logs root
//! does not exist, or it exists but holds no session files. There is no
//! retry - this is a deterministic local read, rebuilt fully on every poll
//! and never merged across polls.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use super::source::UsageSource;
use crate::error::SourceError;
use crate::models::{SnapshotSource, SourceKind, UsageSnapshot, NO_PERCENTAGE};

// ============================================================================
// JSONL Record Types
// ============================================================================

/// One line of a session log
#[derive(Debug, Deserialize)]
struct SessionRecord {
    timestamp: Option<String>,
    message: Option<MessageData>,
}

/// Message payload containing role, model and usage
#[derive(Debug, Deserialize)]
struct MessageData {
    role: Option<String>,
    model: Option<String>,
    usage: Option<UsageData>,
}

/// Token usage block from an assistant message
#[derive(Debug, Deserialize)]
struct UsageData {
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    cache_creation_input_tokens: Option<i64>,
    cache_read_input_tokens: Option<i64>,
}

// ============================================================================
// Aggregate
// ============================================================================

/// Token totals across all sessions for one read pass.
///
/// Stateless: rebuilt fully on every attempt, never merged across polls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
    /// Number of session files that contributed a reading
    pub session_count: usize,
    /// Model name from the most recent contributing record
    pub model: Option<String>,
}

impl AggregateUsage {
    pub fn total_tokens(&self) -> i64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}

/// The latest well-formed assistant reading from one session file
struct SessionReading {
    usage: UsageData,
    model: Option<String>,
    timestamp: Option<String>,
}

// ============================================================================
// Aggregator
// ============================================================================

/// Aggregates session logs under a configured root directory
pub struct SessionLogAggregator {
    logs_root: PathBuf,
}

impl SessionLogAggregator {
    /// Create an aggregator over the default logs root
    pub fn new() -> Self {
        Self {
            logs_root: Self::default_logs_root(),
        }
    }

    /// Create an aggregator over a custom root (tests, non-standard installs)
    pub fn with_root(logs_root: PathBuf) -> Self {
        Self { logs_root }
    }

    /// Default logs root under the home directory
    pub fn default_logs_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".statbar")
            .join("projects")
    }

    pub fn logs_root(&self) -> &Path {
        &self.logs_root
    }

    /// One full aggregation pass over `<logs_root>/*/*.jsonl`
    pub fn aggregate(&self) -> Result<AggregateUsage, SourceError> {
        if !self.logs_root.exists() {
            return Err(SourceError::NoProjectsDirectory(self.logs_root.clone()));
        }

        let files = self.find_session_files();
        if files.is_empty() {
            return Err(SourceError::NoSessionFiles(self.logs_root.clone()));
        }

        log::debug!(
            "[sessions] aggregating {} session files under {:?}",
            files.len(),
            self.logs_root
        );

        let mut aggregate = AggregateUsage::default();
        let mut latest_ts: Option<String> = None;

        for path in files {
            let Some(reading) = read_latest_assistant_record(&path) else {
                continue;
            };

            aggregate.input_tokens += reading.usage.input_tokens.unwrap_or(0);
            aggregate.output_tokens += reading.usage.output_tokens.unwrap_or(0);
            aggregate.cache_creation_tokens +=
                reading.usage.cache_creation_input_tokens.unwrap_or(0);
            aggregate.cache_read_tokens += reading.usage.cache_read_input_tokens.unwrap_or(0);
            aggregate.session_count += 1;

            // RFC3339 timestamps compare correctly as strings; None sorts lowest
            if reading.model.is_some() && reading.timestamp >= latest_ts {
                latest_ts = reading.timestamp;
                aggregate.model = reading.model;
            }
        }

        log::debug!(
            "[sessions] aggregated {} tokens across {} sessions",
            aggregate.total_tokens(),
            aggregate.session_count
        );
        Ok(aggregate)
    }

    /// Enumerate `<logs_root>/*/*.jsonl`
    fn find_session_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        if let Ok(entries) = std::fs::read_dir(&self.logs_root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                if let Ok(sub_entries) = std::fs::read_dir(&path) {
                    for sub_entry in sub_entries.flatten() {
                        let sub_path = sub_entry.path();
                        if sub_path.extension().map_or(false, |ext| ext == "jsonl") {
                            files.push(sub_path);
                        }
                    }
                }
            }
        }

        files
    }
}

impl Default for SessionLogAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan one session file for its latest well-formed assistant record.
///
/// Unreadable files and malformed lines yield `None`/skips rather than
/// errors.
fn read_latest_assistant_record(path: &Path) -> Option<SessionReading> {
    let file = std::fs::File::open(path).ok()?;
    let reader = BufReader::new(file);

    let mut latest: Option<SessionReading> = None;

    for line in reader.lines() {
        let Ok(line) = line else {
            // Undecodable bytes mid-file: keep whatever was read so far
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let Ok(record) = serde_json::from_str::<SessionRecord>(&line) else {
            continue;
        };

        if let Some(message) = record.message {
            if message.role.as_deref() == Some("assistant") {
                if let Some(usage) = message.usage {
                    latest = Some(SessionReading {
                        usage,
                        model: message.model,
                        timestamp: record.timestamp,
                    });
                }
            }
        }
    }

    latest
}

// ============================================================================
// UsageSource Implementation
// ============================================================================

/// Session-log aggregation as a monitor source.
///
/// Produces a token-count snapshot with the sentinel percentage: session
/// logs know what was consumed but not how much of the limit that is.
pub struct SessionLogSource {
    aggregator: SessionLogAggregator,
}

impl SessionLogSource {
    pub fn new() -> Self {
        Self {
            aggregator: SessionLogAggregator::new(),
        }
    }

    pub fn with_root(logs_root: PathBuf) -> Self {
        Self {
            aggregator: SessionLogAggregator::with_root(logs_root),
        }
    }
}

impl Default for SessionLogSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageSource for SessionLogSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SessionLogs
    }

    fn display_name(&self) -> &'static str {
        "Session logs"
    }

    fn is_configured(&self) -> bool {
        self.aggregator.logs_root().exists()
    }

    async fn fetch(&self) -> Result<UsageSnapshot, SourceError> {
        let aggregate = self.aggregator.aggregate()?;

        let mut snapshot = UsageSnapshot::new(SnapshotSource::SessionLogs, NO_PERCENTAGE)
            .with_tokens(
                Some(aggregate.input_tokens),
                Some(aggregate.output_tokens),
                Some(aggregate.cache_creation_tokens),
                Some(aggregate.cache_read_tokens),
            );
        if let Some(model) = aggregate.model {
            snapshot = snapshot.with_model(model);
        }
        Ok(snapshot)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_session(dir: &Path, project: &str, name: &str, lines: &[&str]) {
        let project_dir = dir.join(project);
        std::fs::create_dir_all(&project_dir).unwrap();
        let mut file = std::fs::File::create(project_dir.join(name)).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    fn assistant_line(ts: &str, model: &str, input: i64, output: i64) -> String {
        format!(
            r#"{{"timestamp":"{}","message":{{"role":"assistant","model":"{}","usage":{{"input_tokens":{},"output_tokens":{}}}}}}}"#,
            ts, model, input, output
        )
    }

    #[test]
    fn test_missing_root_is_typed_error() {
        let dir = TempDir::new().unwrap();
        let aggregator = SessionLogAggregator::with_root(dir.path().join("absent"));
        let err = aggregator.aggregate().unwrap_err();
        assert!(matches!(err, SourceError::NoProjectsDirectory(_)));
    }

    #[test]
    fn test_empty_root_is_typed_error() {
        let dir = TempDir::new().unwrap();
        let aggregator = SessionLogAggregator::with_root(dir.path().to_path_buf());
        let err = aggregator.aggregate().unwrap_err();
        assert!(matches!(err, SourceError::NoSessionFiles(_)));
    }

    #[test]
    fn test_aggregates_latest_assistant_record_per_session() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            "proj-a",
            "one.jsonl",
            &[
                r#"{"timestamp":"2026-08-01T10:00:00Z","message":{"role":"user","content":"hi"}}"#,
                &assistant_line("2026-08-01T10:01:00Z", "sable-4", 100, 50),
                // Later record supersedes the earlier one
                &assistant_line("2026-08-01T10:05:00Z", "sable-4", 1000, 500),
            ],
        );

        let aggregator = SessionLogAggregator::with_root(dir.path().to_path_buf());
        let aggregate = aggregator.aggregate().unwrap();

        assert_eq!(aggregate.session_count, 1);
        assert_eq!(aggregate.input_tokens, 1000);
        assert_eq!(aggregate.output_tokens, 500);
        assert_eq!(aggregate.total_tokens(), 1500);
        assert_eq!(aggregate.model.as_deref(), Some("sable-4"));
    }

    #[test]
    fn test_accumulates_across_sessions() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            "proj-a",
            "one.jsonl",
            &[&assistant_line("2026-08-01T10:00:00Z", "sable-4", 100, 50)],
        );
        write_session(
            dir.path(),
            "proj-b",
            "two.jsonl",
            &[&assistant_line("2026-08-02T09:00:00Z", "sable-4-mini", 200, 80)],
        );

        let aggregator = SessionLogAggregator::with_root(dir.path().to_path_buf());
        let aggregate = aggregator.aggregate().unwrap();

        assert_eq!(aggregate.session_count, 2);
        assert_eq!(aggregate.input_tokens, 300);
        assert_eq!(aggregate.output_tokens, 130);
        // Model comes from the most recent record across sessions
        assert_eq!(aggregate.model.as_deref(), Some("sable-4-mini"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            "proj-a",
            "one.jsonl",
            &[
                "not json at all",
                r#"{"truncated": "#,
                &assistant_line("2026-08-01T10:00:00Z", "sable-4", 42, 7),
                "",
            ],
        );

        let aggregator = SessionLogAggregator::with_root(dir.path().to_path_buf());
        let aggregate = aggregator.aggregate().unwrap();

        assert_eq!(aggregate.session_count, 1);
        assert_eq!(aggregate.input_tokens, 42);
    }

    #[test]
    fn test_file_without_assistant_records_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            "proj-a",
            "users-only.jsonl",
            &[r#"{"timestamp":"2026-08-01T10:00:00Z","message":{"role":"user","content":"hi"}}"#],
        );
        write_session(
            dir.path(),
            "proj-a",
            "real.jsonl",
            &[&assistant_line("2026-08-01T11:00:00Z", "sable-4", 10, 5)],
        );

        let aggregator = SessionLogAggregator::with_root(dir.path().to_path_buf());
        let aggregate = aggregator.aggregate().unwrap();

        assert_eq!(aggregate.session_count, 1);
        assert_eq!(aggregate.total_tokens(), 15);
    }

    #[test]
    fn test_missing_usage_fields_default_to_zero() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            "proj-a",
            "one.jsonl",
            &[
                r#"{"timestamp":"2026-08-01T10:00:00Z","message":{"role":"assistant","model":"sable-4","usage":{"input_tokens":500}}}"#,
            ],
        );

        let aggregator = SessionLogAggregator::with_root(dir.path().to_path_buf());
        let aggregate = aggregator.aggregate().unwrap();

        assert_eq!(aggregate.input_tokens, 500);
        assert_eq!(aggregate.output_tokens, 0);
        assert_eq!(aggregate.cache_creation_tokens, 0);
        assert_eq!(aggregate.cache_read_tokens, 0);
    }

    #[test]
    fn test_top_level_jsonl_files_are_ignored() {
        // Only <root>/<project>/*.jsonl matches; stray files at the root don't
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("stray.jsonl"),
            assistant_line("2026-08-01T10:00:00Z", "sable-4", 1, 1),
        )
        .unwrap();

        let aggregator = SessionLogAggregator::with_root(dir.path().to_path_buf());
        let err = aggregator.aggregate().unwrap_err();
        assert!(matches!(err, SourceError::NoSessionFiles(_)));
    }

    #[tokio::test]
    async fn test_source_snapshot_has_sentinel_percentage() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            "proj-a",
            "one.jsonl",
            &[&assistant_line("2026-08-01T10:00:00Z", "sable-4", 1000, 500)],
        );

        let source = SessionLogSource::with_root(dir.path().to_path_buf());
        let snapshot = source.fetch().await.unwrap();

        assert_eq!(snapshot.source, SnapshotSource::SessionLogs);
        assert!(!snapshot.has_percentage());
        assert_eq!(snapshot.primary_percent, NO_PERCENTAGE);
        assert_eq!(snapshot.total_tokens(), 1500);
        assert_eq!(snapshot.model.as_deref(), Some("sable-4"));
    }
}
