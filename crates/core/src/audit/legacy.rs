//! Reading change-log entries written by older versions of the dispatch tool.
//!
//! Stored entries come in several shapes: the current tagged form, plain strings, strings
//! holding serialized objects, and objects with Spanish keys. All of them are normalised here,
//! once, when a record is loaded. Anything unreadable is kept as [`LogPayload::Raw`].

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::audit::{FieldChange, LogEntry, LogKind, LogPayload};

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    #[serde(alias = "usuario")]
    user: Option<String>,
    #[serde(alias = "fecha")]
    timestamp: Option<Value>,
    #[serde(alias = "accion")]
    action: Option<String>,
    #[serde(alias = "detalles")]
    details: Option<Value>,
}

pub fn ingest_entry(value: &Value, fallback_time: DateTime<Utc>, system_actor: &str) -> LogEntry {
    if let Ok(entry) = serde_json::from_value::<LogEntry>(value.clone()) {
        return entry;
    }

    match value {
        Value::String(text) => ingest_text(text, fallback_time, system_actor),
        Value::Object(_) => match serde_json::from_value::<LegacyEntry>(value.clone()) {
            Ok(legacy) if legacy.action.is_some() || legacy.details.is_some() => {
                from_legacy(legacy, fallback_time, system_actor)
            }
            _ => raw(value.to_string(), fallback_time, system_actor),
        },
        other => raw(other.to_string(), fallback_time, system_actor),
    }
}

fn ingest_text(text: &str, fallback_time: DateTime<Utc>, system_actor: &str) -> LogEntry {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return LogEntry {
            timestamp: fallback_time,
            actor: system_actor.to_string(),
            kind: LogKind::Note,
            payload: LogPayload::Text(text.to_string()),
        };
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(parsed @ Value::Object(_)) => ingest_entry(&parsed, fallback_time, system_actor),
        Ok(Value::Array(rows)) => match parse_changes(&rows) {
            Some(changes) => LogEntry {
                timestamp: fallback_time,
                actor: system_actor.to_string(),
                kind: LogKind::FieldEdit,
                payload: LogPayload::Changes(changes),
            },
            None => raw(text.to_string(), fallback_time, system_actor),
        },
        _ => raw(text.to_string(), fallback_time, system_actor),
    }
}

fn from_legacy(legacy: LegacyEntry, fallback_time: DateTime<Utc>, system_actor: &str) -> LogEntry {
    let action = legacy.action.unwrap_or_default();
    let kind = classify_action(&action);
    let timestamp = legacy.timestamp.as_ref().and_then(parse_timestamp).unwrap_or(fallback_time);
    let actor = legacy
        .user
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| system_actor.to_string());

    let payload = match legacy.details {
        Some(Value::Array(rows)) if !rows.is_empty() => match parse_changes(&rows) {
            Some(changes) => LogPayload::Changes(changes),
            None => LogPayload::Raw(Value::Array(rows).to_string()),
        },
        Some(Value::String(details)) if !details.trim().is_empty() => LogPayload::Text(details),
        Some(Value::Null) | Some(Value::Array(_)) | Some(Value::String(_)) | None => {
            LogPayload::Text(action)
        }
        Some(other) => LogPayload::Raw(other.to_string()),
    };

    let kind = match (&payload, kind) {
        (LogPayload::Changes(_), LogKind::Note) => LogKind::FieldEdit,
        (_, kind) => kind,
    };

    LogEntry { timestamp, actor, kind, payload }
}

fn raw(text: String, fallback_time: DateTime<Utc>, system_actor: &str) -> LogEntry {
    LogEntry {
        timestamp: fallback_time,
        actor: system_actor.to_string(),
        kind: LogKind::Note,
        payload: LogPayload::Raw(text),
    }
}

fn parse_changes(rows: &[Value]) -> Option<Vec<FieldChange>> {
    rows.iter()
        .map(|row| {
            let field = row.get("field").or_else(|| row.get("campo"))?.as_str()?.to_string();
            let old_value = row.get("oldValue").or_else(|| row.get("anterior")).map(scalar_text);
            let new_value = row.get("newValue").or_else(|| row.get("nuevo")).map(scalar_text);
            Some(FieldChange {
                field,
                old_value: old_value.unwrap_or_default(),
                new_value: new_value.unwrap_or_default(),
            })
        })
        .collect()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => {
            number.as_i64().and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        }
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .map(|parsed| parsed.with_timezone(&Utc))
            .ok()
            .or_else(|| text.trim().parse::<i64>().ok().and_then(|millis| {
                Utc.timestamp_millis_opt(millis).single()
            })),
        _ => None,
    }
}

/// Maps action names used by older versions onto the current kinds.
fn classify_action(action: &str) -> LogKind {
    let normalized = action.trim().to_uppercase();
    if let Some(kind) = LogKind::parse(&normalized) {
        return kind;
    }
    match normalized.as_str() {
        "CAMBIO_ESTATUS" => LogKind::StatusChange,
        "NOTA_MANUAL" | "NOTA_BITACORA" => LogKind::Note,
        "CAPTURA_DATOS" => LogKind::Capture,
        "ASIGNACION_CONFIRMADA" | "ASIGNACIÓN_CONFIRMADA" => LogKind::AssignmentConfirmed,
        "ARCHIVO" | "CIERRE" | "SERVICIO_CERRADO" => LogKind::Archive,
        other if other.starts_with("DESBLOQUEO") => LogKind::Unlock,
        other if other.starts_with("MODIFICACI") => LogKind::FieldEdit,
        _ => LogKind::Note,
    }
}
