/// Audit logging for provider-facing operations
///
/// Records every track, untrack and push attempt as one JSON line, so an
/// operator can reconstruct what was sent to the provider and when.
use crate::core::firewall::FirewallId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Types of auditable events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TrackFirewall,
    UntrackFirewall,
    PushRules,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub event_type: EventType,

    pub firewall_id: FirewallId,

    /// Whether the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        firewall_id: FirewallId,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            firewall_id,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer
#[derive(Debug, Clone)]
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Appends an event to the audit log
    ///
    /// Events are written as JSON-lines format (one JSON object per line)
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        // One write per event keeps lines from concurrent workers whole
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;

        Ok(())
    }

    /// Reads the most recent events from the log, newest first
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .take(count)
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        Ok(events)
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

/// Reports the last event of an existing log at startup.
///
/// State is not persisted, so this is the only trace of what the previous
/// run last did. A missing or unreadable log yields `None`.
pub async fn report_last_event(audit: &AuditLog) -> Option<AuditEvent> {
    let last = audit.read_recent(1).await.ok()?.into_iter().next()?;
    info!(
        path = %audit.path().display(),
        at = %last.timestamp,
        event = ?last.event_type,
        firewall = last.firewall_id,
        success = last.success,
        "Previous audit entry"
    );
    Some(last)
}

/// Records an event if auditing is enabled. Failures are logged and
/// otherwise ignored.
pub async fn record(audit: Option<&AuditLog>, event: AuditEvent) {
    if let Some(audit) = audit
        && let Err(e) = audit.log(event).await
    {
        warn!(path = ?audit.path(), error = %e, "Failed to write audit event");
    }
}

/// Logs a push attempt
pub async fn log_push(
    audit: Option<&AuditLog>,
    firewall_id: FirewallId,
    entries: usize,
    error: Option<String>,
) {
    record(
        audit,
        AuditEvent::new(
            EventType::PushRules,
            firewall_id,
            error.is_none(),
            serde_json::json!({ "entries": entries }),
            error,
        ),
    )
    .await;
}

/// Logs a track request (startup inventory or on demand)
pub async fn log_track(
    audit: Option<&AuditLog>,
    firewall_id: FirewallId,
    newly_tracked: bool,
    error: Option<String>,
) {
    record(
        audit,
        AuditEvent::new(
            EventType::TrackFirewall,
            firewall_id,
            error.is_none(),
            serde_json::json!({ "newly_tracked": newly_tracked }),
            error,
        ),
    )
    .await;
}

/// Logs an untrack request
pub async fn log_untrack(audit: Option<&AuditLog>, firewall_id: FirewallId, was_tracked: bool) {
    record(
        audit,
        AuditEvent::new(
            EventType::UntrackFirewall,
            firewall_id,
            was_tracked,
            serde_json::json!({ "was_tracked": was_tracked }),
            None,
        ),
    )
    .await;
}
