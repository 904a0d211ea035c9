//! Structured JSONL logging for the server.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required + optional fields.
//! - [`LogEmitter`]: writes records to a file, stderr, or any writer, dropping
//!   those below a minimum level.
//! - [`Logger`]: a cloneable, thread-safe handle around an emitter.
//! - [`validate_log_line`]: schema check for a single line.

use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sockdut_core::SyscallResult;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ConfigError::InvalidLogLevel(s.to_string())),
        }
    }
}

/// Canonical log record.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    /// RPC method name (`Bind`, `Accept`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sockfd: Option<i32>,
    /// Address family of the address the call carried or returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ret: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    /// Remote address of the RPC connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Entry with required fields only; the emitter fills `trace_id` if empty.
    #[must_use]
    pub fn new(level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: String::new(),
            level,
            event: event.into(),
            method: None,
            request_id: None,
            sockfd: None,
            family: None,
            ret: None,
            errno: None,
            peer: None,
            latency_ns: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, id: u64) -> Self {
        self.request_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_sockfd(mut self, sockfd: i32) -> Self {
        self.sockfd = Some(sockfd);
        self
    }

    #[must_use]
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    /// Record a call's return value and errno.
    #[must_use]
    pub fn with_result(mut self, result: &SyscallResult) -> Self {
        self.ret = Some(result.ret);
        self.errno = Some(result.errno);
        self
    }

    #[must_use]
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    #[must_use]
    pub fn with_latency_ns(mut self, ns: u64) -> Self {
        self.latency_ns = Some(ns);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Writes JSONL entries at or above `min_level`.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    seq: u64,
    run_id: String,
    min_level: LogLevel,
}

impl LogEmitter {
    /// Emitter writing to (and truncating) a file.
    pub fn to_file(path: &Path, run_id: &str, min_level: LogLevel) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(
            std::io::BufWriter::new(file),
            run_id,
            min_level,
        ))
    }

    #[must_use]
    pub fn to_stderr(run_id: &str, min_level: LogLevel) -> Self {
        Self::to_writer(std::io::stderr(), run_id, min_level)
    }

    #[must_use]
    pub fn to_writer(writer: impl Write + Send + 'static, run_id: &str, min_level: LogLevel) -> Self {
        Self {
            writer: Box::new(writer),
            seq: 0,
            run_id: run_id.to_string(),
            min_level,
        }
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{:06}", self.run_id, self.seq)
    }

    /// Emit a fully-populated entry. Entries below the minimum level are
    /// dropped without consuming a trace id.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.level < self.min_level {
            return Ok(());
        }
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }

    /// Emit an entry carrying only the required fields.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<()> {
        self.emit_entry(LogEntry::new(level, event))
    }
}

/// Cloneable handle shared by connection and call threads.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Mutex<LogEmitter>>,
}

impl Logger {
    #[must_use]
    pub fn new(emitter: LogEmitter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(emitter)),
        }
    }

    /// Write an entry. A failing log sink never fails the call being logged.
    pub fn log(&self, entry: LogEntry) {
        if let Err(err) = self.inner.lock().emit_entry(entry) {
            eprintln!("structured log write failed: {err}");
        }
    }

    pub fn event(&self, level: LogLevel, event: &str) {
        self.log(LogEntry::new(level, event));
    }
}

/// In-memory sink whose contents stay readable after being handed to an
/// emitter.
#[derive(Clone, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let err = |field: &str, message: String| LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    };

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Err(vec![err("<json>", format!("invalid JSON: {e}"))]),
    };
    let Some(obj) = value.as_object() else {
        return Err(vec![err("<root>", "expected JSON object".to_string())]);
    };

    let mut errors = Vec::new();
    for field in ["timestamp", "trace_id", "level", "event"] {
        match obj.get(field).and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => {}
            Some(_) => errors.push(err(field, "must be non-empty".to_string())),
            None => errors.push(err(field, "required string field missing".to_string())),
        }
    }

    if let Some(level) = obj.get("level").and_then(|v| v.as_str())
        && !["trace", "debug", "info", "warn", "error"].contains(&level)
    {
        errors.push(err("level", format!("invalid level: '{level}'")));
    }

    for field in ["ret", "errno", "sockfd", "request_id", "latency_ns"] {
        if let Some(v) = obj.get(field)
            && !(v.is_i64() || v.is_u64())
        {
            errors.push(err(field, "must be an integer".to_string()));
        }
    }

    // A logged result always carries both halves of the native outcome.
    if obj.contains_key("ret") != obj.contains_key("errno") {
        errors.push(err("errno", "ret and errno must appear together".to_string()));
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    serde_json::from_value(value).map_err(|e| vec![err("<schema>", e.to_string())])
}

/// Validate every non-empty line of a JSONL document.
pub fn validate_log_text(text: &str) -> Result<Vec<LogEntry>, Vec<LogValidationError>> {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match validate_log_line(line, idx + 1) {
            Ok(entry) => entries.push(entry),
            Err(mut errs) => errors.append(&mut errs),
        }
    }
    if errors.is_empty() {
        Ok(entries)
    } else {
        Err(errors)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

/// RFC 3339 UTC timestamp from Unix seconds (days-to-civil conversion).
fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_formatting_known_instants() {
        assert_eq!(format_utc(0, 0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_utc(951_782_400, 5), "2000-02-29T00:00:00.005Z");
        assert_eq!(format_utc(1_700_000_000, 123), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn level_parsing_and_order() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Trace < LogLevel::Info);
        assert!(LogLevel::Error > LogLevel::Warn);
    }

    #[test]
    fn entry_serializes_only_present_fields() {
        let entry = LogEntry::new(LogLevel::Info, "call")
            .with_method("Close")
            .with_result(&SyscallResult::new(-1, 9));
        let json: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(json["method"], "Close");
        assert_eq!(json["ret"], -1);
        assert_eq!(json["errno"], 9);
        assert!(json.get("peer").is_none());
    }

    #[test]
    fn emitter_filters_and_numbers_entries() {
        let sink = MemorySink::new();
        let mut emitter = LogEmitter::to_writer(sink.clone(), "run", LogLevel::Info);
        emitter.emit(LogLevel::Debug, "dropped").unwrap();
        emitter.emit(LogLevel::Info, "first").unwrap();
        emitter.emit(LogLevel::Error, "second").unwrap();

        let entries = validate_log_text(&sink.contents()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].trace_id, "run::000001");
        assert_eq!(entries[1].event, "second");
    }

    #[test]
    fn validation_reports_schema_violations() {
        let errs = validate_log_line(r#"{"timestamp":"t","level":"loud","event":"x"}"#, 3)
            .unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"trace_id"));
        assert!(fields.contains(&"level"));
        assert!(errs.iter().all(|e| e.line_number == 3));

        let errs = validate_log_line(
            r#"{"timestamp":"t","trace_id":"a","level":"info","event":"call","ret":0}"#,
            1,
        )
        .unwrap_err();
        assert_eq!(errs[0].field, "errno");

        assert!(validate_log_line("not json", 1).is_err());
        assert!(validate_log_line("[1,2]", 1).is_err());
    }
}
