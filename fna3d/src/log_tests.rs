//! Unit tests for log.rs
//!
//! Tests Logger trait, LogEntry, LogSeverity, DefaultLogger and the
//! error-producing macros.

use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
use crate::fna3d::{Engine, Error, Result};
use serial_test::serial;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

// ============================================================================
// TEST HELPERS
// ============================================================================

struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

fn capture() -> Arc<Mutex<Vec<LogEntry>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(CaptureLogger { entries: entries.clone() });
    entries
}

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "fna3d::test".to_string(),
        message: "hello".to_string(),
        file,
        line,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_debug() {
    assert_eq!(format!("{:?}", LogSeverity::Trace), "Trace");
    assert_eq!(format!("{:?}", LogSeverity::Error), "Error");
}

// ============================================================================
// DEFAULT LOGGER FORMAT TESTS
// ============================================================================

#[test]
fn test_format_plain_without_location() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Info, None, None));
    assert!(line.contains("[INFO ]"));
    assert!(line.contains("[fna3d::test]"));
    assert!(line.ends_with("hello"));
}

#[test]
fn test_format_plain_with_location() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Error, Some("memory.rs"), Some(42)));
    assert!(line.contains("[ERROR]"));
    assert!(line.ends_with("hello (memory.rs:42)"));
}

#[test]
fn test_default_logger_does_not_panic() {
    DefaultLogger.log(&entry(LogSeverity::Warn, None, None));
    DefaultLogger.log(&entry(LogSeverity::Error, Some("a.rs"), Some(1)));
}

// ============================================================================
// MACRO TESTS
// ============================================================================

#[test]
#[serial]
fn test_engine_err_logs_error_and_builds_backend_error() {
    let entries = capture();

    let err = crate::engine_err!("fna3d::test", "vkCreateBuffer failed: {}", -2);

    assert_eq!(err, Error::BackendError("vkCreateBuffer failed: -2".to_string()));
    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Error);
    assert!(entries[0].file.is_some());
    assert!(entries[0].line.is_some());
    drop(entries);
    Engine::reset_logger();
}

fn bails(flag: bool) -> Result<u32> {
    if flag {
        crate::engine_bail!("fna3d::test", "bailing out");
    }
    Ok(7)
}

#[test]
#[serial]
fn test_engine_bail_returns_early() {
    let entries = capture();

    assert_eq!(bails(false), Ok(7));
    assert_eq!(bails(true), Err(Error::BackendError("bailing out".to_string())));
    assert_eq!(entries.lock().unwrap().len(), 1);
    Engine::reset_logger();
}

fn bails_warn() -> Result<()> {
    crate::engine_bail_warn!("fna3d::test", "pipeline cache missing");
}

#[test]
#[serial]
fn test_engine_warn_err_logs_at_warn_without_location() {
    let entries = capture();

    let err = crate::engine_warn_err!("fna3d::test", "optional {}", "feature");
    assert_eq!(err, Error::BackendError("optional feature".to_string()));
    assert!(bails_warn().is_err());

    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.severity == LogSeverity::Warn));
    assert!(entries.iter().all(|e| e.file.is_none()));
    drop(entries);
    Engine::reset_logger();
}
