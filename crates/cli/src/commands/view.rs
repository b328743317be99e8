use std::time::Duration;

use serde_json::{json, Value};
use towline_core::monitoring::{eta_countdown, EtaCountdown};
use towline_core::{ServiceDesk, ServiceRecord, ServiceSession};

/// One line of the dispatch board.
pub(crate) fn service_row(record: &ServiceRecord, countdown: Option<EtaCountdown>) -> Value {
    json!({
        "folio": record.folio.0,
        "status": record.status.as_str(),
        "status_label": record.status.label(),
        "step": record.step.as_str(),
        "service_type": record.service_type_label(),
        "client": record.report.client_name,
        "unit": record.assignment.unit,
        "operator": record.assignment.operator,
        "total": record.quotation.as_ref().map(|quotation| quotation.total),
        "created_at": record.created_at.to_rfc3339(),
        "eta": countdown,
    })
}

pub(crate) fn board_row(desk: &ServiceDesk, record: &ServiceRecord) -> Value {
    let settings = desk.settings();
    let countdown = eta_countdown(
        record,
        desk.now(),
        settings.due_soon_minutes,
        Duration::from_secs(settings.eta_refresh_secs),
    );
    service_row(record, countdown)
}

pub(crate) fn service_detail(session: &ServiceSession) -> Value {
    json!({
        "summary": service_row(session.record(), session.eta_countdown()),
        "record": session.record(),
        "log": session.rendered_log(),
    })
}
