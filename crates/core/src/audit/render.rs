use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::{AuditLog, LogKind, LogPayload};

/// Display form of one change-log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub kind: LogKind,
    pub heading: &'static str,
    pub lines: Vec<String>,
}

/// Newest entry first. Field edits render one `field: old → new` row per change.
pub fn render_log(log: &AuditLog) -> Vec<RenderedEntry> {
    log.newest_first()
        .map(|entry| {
            let lines = match &entry.payload {
                LogPayload::Changes(changes) => changes
                    .iter()
                    .map(|change| {
                        format!("{}: {} → {}", change.field, change.old_value, change.new_value)
                    })
                    .collect(),
                LogPayload::Text(text) | LogPayload::Raw(text) => vec![text.clone()],
            };
            RenderedEntry {
                timestamp: entry.timestamp,
                actor: entry.actor.clone(),
                kind: entry.kind,
                heading: entry.kind.label(),
                lines,
            }
        })
        .collect()
}
