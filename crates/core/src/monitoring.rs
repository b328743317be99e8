//! Read-only views over service records for the monitoring board.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::service::{ServiceRecord, ServiceStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLight {
    OnTime,
    DueSoon,
    Late,
    ArrivedOnTime,
    ArrivedLate,
}

impl TrafficLight {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OnTime => "On time",
            Self::DueSoon => "Due soon",
            Self::Late => "Late",
            Self::ArrivedOnTime => "Arrived on time",
            Self::ArrivedLate => "Arrived late",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EtaCountdown {
    /// Whole minutes left until the ETA, rounded up. Negative once overdue. Frozen at the
    /// arrival time once the unit is on site.
    pub remaining_minutes: i64,
    pub light: TrafficLight,
    /// How long a display may wait before recomputing; `None` once the countdown is frozen.
    #[serde(skip)]
    pub refresh_after: Option<Duration>,
}

/// `None` for records without an ETA.
pub fn eta_countdown(
    record: &ServiceRecord,
    now: DateTime<Utc>,
    due_soon_minutes: i64,
    refresh_every: Duration,
) -> Option<EtaCountdown> {
    let eta = record.timestamps.eta?;
    let arrived = record.status.has_arrived();
    let reference = if arrived { record.timestamps.arrival.unwrap_or(now) } else { now };

    let remaining_minutes = ceil_minutes((eta - reference).num_milliseconds());
    let light = match (arrived, remaining_minutes) {
        (true, minutes) if minutes >= 0 => TrafficLight::ArrivedOnTime,
        (true, _) => TrafficLight::ArrivedLate,
        (false, minutes) if minutes > due_soon_minutes => TrafficLight::OnTime,
        (false, minutes) if minutes > 0 => TrafficLight::DueSoon,
        (false, _) => TrafficLight::Late,
    };

    Some(EtaCountdown {
        remaining_minutes,
        light,
        refresh_after: if arrived { None } else { Some(refresh_every) },
    })
}

fn ceil_minutes(millis: i64) -> i64 {
    -((-millis).div_euclid(60_000))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub total: usize,
    pub created_today: usize,
    pub pending: usize,
    pub active: usize,
    pub closed: usize,
}

impl DispatchSummary {
    /// Active counts services with a unit on the way or on the job.
    pub fn from_records(records: &[ServiceRecord], today: NaiveDate) -> Self {
        records.iter().fold(Self::default(), |mut summary, record| {
            summary.total += 1;
            if record.created_at.date_naive() == today {
                summary.created_today += 1;
            }
            match record.status {
                ServiceStatus::Pending => summary.pending += 1,
                ServiceStatus::Closed => summary.closed += 1,
                ServiceStatus::Completed => {}
                _ => summary.active += 1,
            }
            summary
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{Duration, TimeZone, Utc};

    use super::{eta_countdown, DispatchSummary, TrafficLight};
    use crate::domain::service::{Folio, ServiceRecord, ServiceStatus, ServiceType};

    const REFRESH: StdDuration = StdDuration::from_secs(30);

    fn assigned_record(eta_in_minutes: i64) -> ServiceRecord {
        let base = Utc.with_ymd_and_hms(2026, 10, 5, 20, 0, 0).single().expect("time");
        let mut record =
            ServiceRecord::new(Folio(1001), ServiceType::find("grua").expect("type"), base);
        record.status = ServiceStatus::Assigned;
        record.timestamps.eta = Some(base + Duration::minutes(eta_in_minutes));
        record
    }

    #[test]
    fn countdown_lights_follow_remaining_time() {
        let record = assigned_record(30);
        let start = record.created_at;

        let on_time = eta_countdown(&record, start, 15, REFRESH).expect("countdown");
        assert_eq!((on_time.remaining_minutes, on_time.light), (30, TrafficLight::OnTime));
        assert_eq!(on_time.refresh_after, Some(REFRESH));

        let due = eta_countdown(&record, start + Duration::seconds(20 * 60 + 30), 15, REFRESH)
            .expect("countdown");
        assert_eq!((due.remaining_minutes, due.light), (10, TrafficLight::DueSoon));

        let late = eta_countdown(&record, start + Duration::minutes(31), 15, REFRESH)
            .expect("countdown");
        assert_eq!((late.remaining_minutes, late.light), (-1, TrafficLight::Late));
    }

    #[test]
    fn countdown_freezes_at_arrival() {
        let mut record = assigned_record(30);
        record.status = ServiceStatus::OnSite;
        record.timestamps.arrival = Some(record.created_at + Duration::minutes(40));

        let countdown =
            eta_countdown(&record, record.created_at + Duration::hours(5), 15, REFRESH)
                .expect("countdown");
        assert_eq!(countdown.remaining_minutes, -10);
        assert_eq!(countdown.light, TrafficLight::ArrivedLate);
        assert_eq!(countdown.refresh_after, None);
    }

    #[test]
    fn no_countdown_without_eta() {
        let mut record = assigned_record(10);
        record.timestamps.eta = None;
        assert!(eta_countdown(&record, record.created_at, 15, REFRESH).is_none());
    }

    #[test]
    fn summary_counts_by_status_and_day() {
        let mut pending = assigned_record(10);
        pending.status = ServiceStatus::Pending;
        let active = assigned_record(10);
        let mut closed = assigned_record(10);
        closed.status = ServiceStatus::Closed;
        closed.created_at -= Duration::days(2);

        let today = pending.created_at.date_naive();
        let summary = DispatchSummary::from_records(&[pending, active, closed], today);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.created_today, 2);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.closed, 1);
    }
}
