//! Captures a whole service from a JSON file: report, then optionally the assignment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use towline_core::domain::client::{ClientId, ExtraCharge};
use towline_core::domain::service::{DistanceMode, ReportFields};
use towline_core::logistics::Coordinate;
use towline_core::{RouteEnd, ServiceSession};

use crate::commands::context::{
    application_failure, execute, input_failure, operator, CommandContext, Failure,
};
use crate::commands::view::service_detail;
use crate::commands::CommandResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureRequest {
    service_type: String,
    client: String,
    report: ReportFields,
    #[serde(default)]
    assignment: Option<AssignmentInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssignmentInput {
    #[serde(rename = "grua")]
    unit: String,
    #[serde(rename = "operador")]
    operator: String,
    #[serde(rename = "tipoServicio")]
    distance_mode: Option<String>,
    #[serde(rename = "distanciaCobro")]
    billable_distance: String,
    #[serde(rename = "coordsGrua")]
    crane_coords: String,
    #[serde(rename = "kmInicial")]
    odometer: Option<Decimal>,
    #[serde(rename = "tiempoArribo")]
    eta: String,
    extras: BTreeMap<String, u32>,
    #[serde(rename = "horarioNocturno")]
    night_shift: bool,
}

pub fn run(file: PathBuf, actor: &str) -> CommandResult {
    let actor = operator(actor);
    let result = execute("capture", |config| async move {
        let request = read_request(&file)?;
        let context = CommandContext::open(config).await?;
        let session = capture(&context, actor, request).await?;
        let folio = session.record().folio;
        let detail = service_detail(&session);
        context.close().await;
        Ok((folio, detail))
    });

    match result {
        Ok((folio, detail)) => {
            CommandResult::success_with_data("capture", format!("service {folio} captured"), detail)
        }
        Err(failure) => failure,
    }
}

fn read_request(path: &Path) -> Result<CaptureRequest, Failure> {
    let parsed = fs::read_to_string(path)
        .with_context(|| format!("failed to read capture file `{}`", path.display()))
        .and_then(|raw| {
            serde_json::from_str::<CaptureRequest>(&raw).context("capture file is not a valid request")
        });
    parsed.map_err(|error| input_failure(format!("{error:#}")))
}

async fn capture(
    context: &CommandContext,
    actor: towline_core::Actor,
    request: CaptureRequest,
) -> Result<ServiceSession, Failure> {
    let maps_enabled = context.config.maps.enabled;
    let mut session = ServiceSession::start(context.desk.clone(), actor, &request.service_type)
        .await
        .map_err(application_failure)?;

    session
        .select_client(&ClientId(request.client.trim().to_string()))
        .await
        .map_err(application_failure)?;
    let client_name = session.record().report.client_name.clone();
    let mut report = request.report;
    report.client_name = client_name;
    session.edit_report(move |fields| *fields = report).map_err(application_failure)?;

    if maps_enabled {
        for end in [RouteEnd::Origin, RouteEnd::Destination] {
            let location = match end {
                RouteEnd::Origin => &session.record().report.origin,
                RouteEnd::Destination => &session.record().report.destination,
            };
            if !location.street.trim().is_empty() {
                continue;
            }
            let Some(coordinate) = Coordinate::parse(&location.coords) else {
                continue;
            };
            session
                .pick_location(&*context.maps.geocoder, end, coordinate)
                .await
                .map_err(application_failure)?;
        }
    }
    session.confirm_report().await.map_err(application_failure)?;

    let Some(assignment) = request.assignment else {
        return Ok(session);
    };
    apply_assignment(&mut session, &assignment)?;
    if maps_enabled && !assignment.crane_coords.trim().is_empty() {
        session.refresh_logistics(&*context.maps.routes).await.map_err(application_failure)?;
    }
    session.confirm_assignment().await.map_err(application_failure)?;
    Ok(session)
}

fn apply_assignment(session: &mut ServiceSession, input: &AssignmentInput) -> Result<(), Failure> {
    session.set_unit(&input.unit).map_err(application_failure)?;
    session.set_operator(&input.operator).map_err(application_failure)?;
    if let Some(mode) = &input.distance_mode {
        let mode = DistanceMode::parse(mode)
            .ok_or_else(|| input_failure(format!("unknown distance mode `{mode}`")))?;
        session.set_distance_mode(mode).map_err(application_failure)?;
    }
    session.set_billable_distance(&input.billable_distance).map_err(application_failure)?;
    session.set_crane_coords(&input.crane_coords).map_err(application_failure)?;
    session.set_odometer(input.odometer).map_err(application_failure)?;
    session.set_eta_text(&input.eta).map_err(application_failure)?;
    for (key, quantity) in &input.extras {
        let charge = ExtraCharge::parse(key)
            .ok_or_else(|| input_failure(format!("unknown extra `{key}`")))?;
        if charge.is_percentage() {
            session.set_night_shift(*quantity > 0).map_err(application_failure)?;
        } else {
            session.set_extra_quantity(charge, *quantity).map_err(application_failure)?;
        }
    }
    if input.night_shift {
        session.set_night_shift(true).map_err(application_failure)?;
    }
    Ok(())
}
