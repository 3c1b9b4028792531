use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// One executed (or skipped) plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub run_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    /// Natural key of the step.
    pub key: String,
    pub action: String,
    /// `applied`, `already_existed`, `failed`, `skipped` or `cancelled`.
    pub status: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

impl<T: AuditSink + ?Sized> AuditSink for Box<T> {
    fn record(&self, event: AuditEvent) {
        (**self).record(event)
    }
}

/// Emits each event as a structured log line.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            run_id = %event.run_id,
            key = %event.key,
            action = %event.action,
            status = %event.status,
            attempts = event.attempts,
            error = event.error.as_deref().unwrap_or(""),
            "Provisioning step"
        );
    }
}

/// Appends events to a JSON Lines file.
pub struct JsonLinesAuditSink {
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, event: AuditEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, key = %event.key, "Failed to serialize audit event");
                return;
            }
        };
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{}", line) {
            tracing::warn!(error = %e, key = %event.key, "Failed to write audit event");
        }
    }
}

/// Fans out to several sinks.
pub struct TeeAuditSink(pub Vec<Box<dyn AuditSink>>);

impl AuditSink for TeeAuditSink {
    fn record(&self, event: AuditEvent) {
        for sink in &self.0 {
            sink.record(event.clone());
        }
    }
}
