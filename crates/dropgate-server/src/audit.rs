// crates/dropgate-server/src/audit.rs
// ============================================================================
// Module: Server Audit Logging
// Description: JSON-lines audit sinks for delivery and HTTP request events.
// Purpose: Emit redacted audit logs to stderr or an append-only file.
// Dependencies: dropgate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Delivery events come from the engine through [`AuditSink`]; request events
//! are built here as [`HttpAuditEvent`]. Both are written as one JSON object
//! per line. Request events carry the caller and a token fingerprint, never
//! the token itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use dropgate_core::AuditSink;
use dropgate_core::DeliveryAuditEvent;
use dropgate_core::NoopAuditSink;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// HTTP request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct HttpAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// HTTP method.
    pub method: String,
    /// Matched route template.
    pub route: String,
    /// Response status code.
    pub status: u16,
    /// Error kind label for failed requests.
    pub error_kind: Option<&'static str>,
    /// Handler latency in milliseconds.
    pub latency_ms: u128,
    /// Authenticated caller when known.
    pub caller: Option<String>,
    /// Fingerprint of the presented bearer token.
    pub token_fingerprint: Option<String>,
}

/// Inputs required to construct an HTTP audit event.
pub struct HttpAuditEventParams {
    /// HTTP method.
    pub method: String,
    /// Matched route template.
    pub route: String,
    /// Response status code.
    pub status: u16,
    /// Error kind label for failed requests.
    pub error_kind: Option<&'static str>,
    /// Handler latency in milliseconds.
    pub latency_ms: u128,
    /// Authenticated caller when known.
    pub caller: Option<String>,
    /// Fingerprint of the presented bearer token.
    pub token_fingerprint: Option<String>,
}

impl HttpAuditEvent {
    /// Creates a new request event stamped with the wall clock.
    #[must_use]
    pub fn new(params: HttpAuditEventParams) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "http_request",
            timestamp_ms,
            method: params.method,
            route: params.route,
            status: params.status,
            error_kind: params.error_kind,
            latency_ms: params.latency_ms,
            caller: params.caller,
            token_fingerprint: params.token_fingerprint,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for HTTP request events.
pub trait HttpAuditSink: Send + Sync {
    /// Records a request event.
    fn record_request(&self, event: &HttpAuditEvent);
}

impl HttpAuditSink for NoopAuditSink {
    fn record_request(&self, _event: &HttpAuditEvent) {}
}

/// Sink receiving both delivery and request events.
pub trait ServerAuditSink: AuditSink + HttpAuditSink {}

impl<T: AuditSink + HttpAuditSink> ServerAuditSink for T {}

// ============================================================================
// SECTION: Stderr Sink
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event.
    fn write<T: Serialize>(event: &T) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &DeliveryAuditEvent) {
        Self::write(event);
    }
}

impl HttpAuditSink for StderrAuditSink {
    fn record_request(&self, event: &HttpAuditEvent) {
        Self::write(event);
    }
}

// ============================================================================
// SECTION: File Sink
// ============================================================================

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event and flushes.
    fn write<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &DeliveryAuditEvent) {
        self.write(event);
    }
}

impl HttpAuditSink for FileAuditSink {
    fn record_request(&self, event: &HttpAuditEvent) {
        self.write(event);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test assertions use expect for clarity."
    )]

    use dropgate_core::DeliveryAuditEventParams;
    use dropgate_core::DeliveryAuditKind;
    use dropgate_core::Timestamp;
    use dropgate_core::TransferId;
    use serde_json::Value;

    use super::*;

    #[test]
    fn file_sink_appends_one_json_object_per_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path).expect("open sink");
        sink.record(&DeliveryAuditEvent::new(DeliveryAuditEventParams {
            kind: DeliveryAuditKind::KeyMinted,
            at: Timestamp::from_unix_millis(1_000),
            actor: None,
            product_id: None,
            transfer_id: Some(TransferId::new("tr-1")),
            from_status: None,
            to_status: None,
            detail: None,
        }));
        sink.record_request(&HttpAuditEvent::new(HttpAuditEventParams {
            method: "POST".to_string(),
            route: "/v1/grant".to_string(),
            status: 200,
            error_kind: None,
            latency_ms: 3,
            caller: Some("buyer-1".to_string()),
            token_fingerprint: Some("abcd".to_string()),
        }));
        let text = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<Value> =
            text.lines().map(|line| serde_json::from_str(line).expect("json line")).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["transfer_id"], "tr-1");
        assert_eq!(lines[1]["event"], "http_request");
        assert_eq!(lines[1]["route"], "/v1/grant");
    }
}
