//! Append-only change log carried by every service record.

pub mod diff;
pub mod legacy;
pub mod notes;
pub mod render;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub use diff::{diff_snapshots, EditableSnapshot, REDACTED_VALUE};
pub use legacy::ingest_entry;
pub use notes::LiveNote;
pub use render::{render_log, RenderedEntry};

/// Actor label used when nobody is known to be responsible for an entry.
pub const DEFAULT_SYSTEM_ACTOR: &str = "Sistema";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogKind {
    Note,
    StatusChange,
    Unlock,
    FieldEdit,
    Capture,
    AssignmentConfirmed,
    Archive,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "NOTE",
            Self::StatusChange => "STATUS_CHANGE",
            Self::Unlock => "UNLOCK",
            Self::FieldEdit => "FIELD_EDIT",
            Self::Capture => "CAPTURE",
            Self::AssignmentConfirmed => "ASSIGNMENT_CONFIRMED",
            Self::Archive => "ARCHIVE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NOTE" => Some(Self::Note),
            "STATUS_CHANGE" => Some(Self::StatusChange),
            "UNLOCK" => Some(Self::Unlock),
            "FIELD_EDIT" => Some(Self::FieldEdit),
            "CAPTURE" => Some(Self::Capture),
            "ASSIGNMENT_CONFIRMED" => Some(Self::AssignmentConfirmed),
            "ARCHIVE" => Some(Self::Archive),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Note => "Note",
            Self::StatusChange => "Status change",
            Self::Unlock => "Unlock",
            Self::FieldEdit => "Field edit",
            Self::Capture => "Capture",
            Self::AssignmentConfirmed => "Assignment confirmed",
            Self::Archive => "Archive",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    #[serde(alias = "campo")]
    pub field: String,
    #[serde(alias = "anterior")]
    pub old_value: String,
    #[serde(alias = "nuevo")]
    pub new_value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LogPayload {
    Text(String),
    Changes(Vec<FieldChange>),
    /// Stored data that could not be read as either shape; shown verbatim.
    Raw(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub kind: LogKind,
    pub payload: LogPayload,
}

/// Entry as produced by an action, before the recorder stamps it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogDraft {
    pub kind: LogKind,
    pub payload: LogPayload,
    pub actor: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogDraft {
    pub fn new(kind: LogKind, payload: LogPayload) -> Self {
        Self { kind, payload, actor: None, timestamp: None }
    }

    pub fn text(kind: LogKind, text: impl Into<String>) -> Self {
        Self::new(kind, LogPayload::Text(text.into()))
    }

    pub fn changes(changes: Vec<FieldChange>) -> Self {
        Self::new(LogKind::FieldEdit, LogPayload::Changes(changes))
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fills whatever the draft did not carry itself.
    pub fn stamp(self, actor: &str, now: DateTime<Utc>) -> LogEntry {
        let actor = self
            .actor
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| actor.to_string());
        LogEntry {
            timestamp: self.timestamp.unwrap_or(now),
            actor,
            kind: self.kind,
            payload: self.payload,
        }
    }
}

impl From<&str> for LogDraft {
    fn from(text: &str) -> Self {
        Self::text(LogKind::Note, text)
    }
}

impl From<String> for LogDraft {
    fn from(text: String) -> Self {
        Self::text(LogKind::Note, text)
    }
}

/// Ordered oldest first. Entries can only be appended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuditLog(Vec<LogEntry>);

impl AuditLog {
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        Self(entries)
    }

    /// Normalises stored entries of any vintage. Never fails.
    pub fn from_stored(values: &[serde_json::Value], fallback_time: DateTime<Utc>) -> Self {
        Self(
            values
                .iter()
                .map(|value| ingest_entry(value, fallback_time, DEFAULT_SYSTEM_ACTOR))
                .collect(),
        )
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.0
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &LogEntry> {
        self.0.iter().rev()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count_kind(&self, kind: LogKind) -> usize {
        self.0.iter().filter(|entry| entry.kind == kind).count()
    }
}

impl<'de> Deserialize<'de> for AuditLog {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
        Ok(Self::from_stored(&values, DateTime::<Utc>::default()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{AuditLog, FieldChange, LogDraft, LogEntry, LogKind, LogPayload};

    fn entry(text: &str, minute: u32) -> LogEntry {
        let at = Utc.with_ymd_and_hms(2026, 5, 2, 8, minute, 0).single().expect("time");
        LogDraft::from(text).stamp("Operador", at)
    }

    #[test]
    fn plain_text_becomes_note_by_current_actor() {
        let now = Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).single().expect("time");
        let stamped = LogDraft::from("Cliente llamó de nuevo").stamp("Ana", now);

        assert_eq!(stamped.kind, LogKind::Note);
        assert_eq!(stamped.actor, "Ana");
        assert_eq!(stamped.timestamp, now);
        assert_eq!(stamped.payload, LogPayload::Text("Cliente llamó de nuevo".to_string()));
    }

    #[test]
    fn structured_draft_keeps_its_own_actor_and_time() {
        let earlier = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).single().expect("time");
        let now = Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).single().expect("time");
        let stamped = LogDraft::text(LogKind::Unlock, "Other")
            .with_actor("Supervisor")
            .with_timestamp(earlier)
            .stamp("Ana", now);

        assert_eq!(stamped.actor, "Supervisor");
        assert_eq!(stamped.timestamp, earlier);
    }

    #[test]
    fn log_is_stored_oldest_first_and_read_newest_first() {
        let mut log = AuditLog::default();
        log.append(entry("e1", 1));
        log.append(entry("e2", 2));
        log.append(entry("e3", 3));

        let stored: Vec<_> = log.entries().iter().map(|entry| entry.payload.clone()).collect();
        let shown: Vec<_> = log.newest_first().map(|entry| entry.payload.clone()).collect();

        let text = |value: &str| LogPayload::Text(value.to_string());
        assert_eq!(stored, vec![text("e1"), text("e2"), text("e3")]);
        assert_eq!(shown, vec![text("e3"), text("e2"), text("e1")]);
    }

    #[test]
    fn serialized_log_reads_back_unchanged() {
        let mut log = AuditLog::default();
        log.append(entry("nota", 5));
        log.append(
            LogDraft::changes(vec![FieldChange {
                field: "placas".to_string(),
                old_value: "ABC123".to_string(),
                new_value: "XYZ999".to_string(),
            }])
            .stamp("Ana", Utc.with_ymd_and_hms(2026, 5, 2, 9, 0, 0).single().expect("time")),
        );

        let json = serde_json::to_string(&log).expect("serialize");
        let restored: AuditLog = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, log);
        assert_eq!(restored.count_kind(LogKind::FieldEdit), 1);
    }
}
