use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::alerting::models::LogLine;
use crate::alerting::rules::{LogLevel, RuleError};

#[derive(Error, Debug)]
pub enum LogRecordError {
    #[error("Malformed log record: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownLevel(#[from] RuleError),
}

#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(default = "default_source")]
    source: String,
    level: String,
    message: String,
    timestamp: Option<DateTime<Utc>>,
}

fn default_source() -> String {
    "stdin".to_string()
}

/// Parses one newline-delimited JSON record, e.g.
/// `{"source":"nginx","level":"error","message":"upstream timed out"}`.
/// A missing timestamp is stamped with the arrival time.
pub fn parse_log_record(line: &str) -> Result<LogLine, LogRecordError> {
    let record: LogRecord = serde_json::from_str(line)?;
    let level = record.level.parse::<LogLevel>()?;
    Ok(LogLine {
        source: record.source,
        level,
        message: record.message,
        timestamp: record.timestamp.unwrap_or_else(Utc::now),
    })
}

/// Streams log lines from an NDJSON reader. Blank lines are ignored and
/// malformed ones are logged and dropped; the stream ends at EOF.
pub fn ndjson_lines<R>(reader: R) -> impl Stream<Item = LogLine> + Unpin
where
    R: AsyncBufRead + Unpin,
{
    LinesStream::new(reader.lines()).filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => match parse_log_record(&line) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(error = %e, "Dropping malformed log record.");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "Failed to read log input.");
            None
        }
    })
}

pub fn stdin_lines() -> impl Stream<Item = LogLine> + Unpin {
    ndjson_lines(BufReader::new(tokio::io::stdin()))
}
