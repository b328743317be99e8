use chrono::{DateTime, Utc};

use crate::audit::{LogDraft, LogKind};

/// A note being written. The elapsed authoring time is recorded with the text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveNote {
    started_at: DateTime<Utc>,
}

impl LiveNote {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self { started_at: now }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// `None` when the text is blank; the note is discarded without logging.
    pub fn finish(self, text: &str, now: DateTime<Utc>) -> Option<LogDraft> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let elapsed = (now - self.started_at).num_seconds().max(0);
        Some(LogDraft::text(
            LogKind::Note,
            format!("Note added (writing time: {}): {text}", format_elapsed(elapsed)),
        ))
    }
}

fn format_elapsed(seconds: i64) -> String {
    format!("{}m {}s", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::LiveNote;
    use crate::audit::{LogKind, LogPayload};

    #[test]
    fn finished_note_is_prefixed_with_elapsed_time() {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 14, 0, 0).single().expect("time");
        let draft = LiveNote::start(start)
            .finish("  Cliente confirma ubicación ", start + Duration::seconds(95))
            .expect("draft");

        assert_eq!(draft.kind, LogKind::Note);
        assert_eq!(
            draft.payload,
            LogPayload::Text("Note added (writing time: 1m 35s): Cliente confirma ubicación".to_string())
        );
    }

    #[test]
    fn blank_note_is_discarded() {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 14, 0, 0).single().expect("time");
        assert!(LiveNote::start(start).finish("   ", start).is_none());
    }

    #[test]
    fn clock_skew_never_yields_negative_duration() {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 14, 0, 0).single().expect("time");
        let draft = LiveNote::start(start).finish("ok", start - Duration::seconds(30)).expect("draft");
        assert_eq!(draft.payload, LogPayload::Text("Note added (writing time: 0m 0s): ok".to_string()));
    }
}
