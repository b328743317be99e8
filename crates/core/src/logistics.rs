//! Route legs, ETA and odometer projections for an assignment.

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::service::{AssignmentFields, RouteLeg, ServiceRecord};
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Parses `"lat, lng"`. Anything else, including out-of-range values, is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(',');
        let lat = parts.next()?.trim().parse::<f64>().ok()?;
        let lng = parts.next()?.trim().parse::<f64>().ok()?;
        if parts.next().is_some() || !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        Some(Self { lat, lng })
    }

    pub fn to_text(&self) -> String {
        format!("{:.6}, {:.6}", self.lat, self.lng)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressComponents {
    pub street: String,
    pub neighborhood: String,
    pub municipality: String,
    pub state: String,
    pub postal_code: String,
}

#[async_trait]
pub trait RouteEstimator: Send + Sync {
    /// Driving distance and time between two points. A provider that cannot route answers
    /// `ApplicationError::EstimationUnavailable`.
    async fn estimate_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteLeg, ApplicationError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> Result<AddressComponents, ApplicationError>;
}

/// Coordinate text an estimate was requested for. Compared against the record when the answer
/// arrives so late answers for old coordinates are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogisticsRequest {
    pub crane_coords: String,
    pub origin_coords: String,
    pub destination_coords: String,
}

impl LogisticsRequest {
    pub fn from_record(record: &ServiceRecord) -> Self {
        Self {
            crane_coords: record.assignment.crane_coords.trim().to_string(),
            origin_coords: record.report.origin.coords.trim().to_string(),
            destination_coords: record.report.destination.coords.trim().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogisticsEstimate {
    pub approach: RouteLeg,
    pub transfer: Option<RouteLeg>,
    /// Why the transfer leg is missing although a destination was given.
    pub transfer_unavailable: Option<String>,
}

/// Approach leg (crane to origin) and, when a destination is given, transfer leg (origin to
/// destination). The approach is required; a destination that cannot be parsed or routed only
/// leaves the transfer out.
pub async fn estimate_logistics(
    estimator: &dyn RouteEstimator,
    request: &LogisticsRequest,
) -> Result<LogisticsEstimate, ApplicationError> {
    let crane = parse_required(&request.crane_coords, "crane")?;
    let origin = parse_required(&request.origin_coords, "origin")?;
    let approach = estimator.estimate_route(crane, origin).await?;

    if request.destination_coords.is_empty() {
        return Ok(LogisticsEstimate { approach, transfer: None, transfer_unavailable: None });
    }
    let transfer = match parse_required(&request.destination_coords, "destination") {
        Ok(destination) => estimator.estimate_route(origin, destination).await,
        Err(error) => Err(error),
    };
    Ok(match transfer {
        Ok(leg) => LogisticsEstimate { approach, transfer: Some(leg), transfer_unavailable: None },
        Err(ApplicationError::EstimationUnavailable(reason)) => {
            LogisticsEstimate { approach, transfer: None, transfer_unavailable: Some(reason) }
        }
        Err(other) => return Err(other),
    })
}

fn parse_required(text: &str, name: &str) -> Result<Coordinate, ApplicationError> {
    Coordinate::parse(text).ok_or_else(|| {
        ApplicationError::EstimationUnavailable(format!("{name} coordinates `{text}` are not valid"))
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogisticsTotals {
    pub total_distance_km: Decimal,
    pub estimated_final_odometer: Decimal,
}

/// `None` when there is nothing to project from yet.
pub fn derive_totals(assignment: &AssignmentFields) -> Option<LogisticsTotals> {
    if assignment.approach.is_none() && assignment.transfer.is_none() && assignment.odometer.is_none()
    {
        return None;
    }
    let leg_km = |leg: Option<&RouteLeg>| leg.map(|leg| leg.distance_km).unwrap_or(Decimal::ZERO);
    let total = round_km(leg_km(assignment.approach.as_ref()) + leg_km(assignment.transfer.as_ref()));
    let odometer = assignment.odometer.unwrap_or(Decimal::ZERO);
    Some(LogisticsTotals {
        total_distance_km: total,
        estimated_final_odometer: round_km(odometer + total),
    })
}

/// Writes the projections into `assignment`. Returns false, without writing, when the values
/// would not change.
pub fn apply_totals(assignment: &mut AssignmentFields) -> bool {
    let Some(totals) = derive_totals(assignment) else {
        return false;
    };
    if assignment.total_distance_km == totals.total_distance_km
        && assignment.estimated_final_odometer == totals.estimated_final_odometer
    {
        return false;
    }
    assignment.total_distance_km = totals.total_distance_km;
    assignment.estimated_final_odometer = totals.estimated_final_odometer;
    true
}

pub fn round_km(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// Minutes in free-text durations such as `"1 h 20 min"`, `"45 mins"` or `"90"`.
pub fn parse_eta_text(text: &str) -> Option<u32> {
    let lowered = text.to_lowercase();
    let mut chars = lowered.chars().peekable();
    let mut total: Option<u32> = None;

    while let Some(&next) = chars.peek() {
        if !next.is_ascii_digit() {
            chars.next();
            continue;
        }
        let mut number = String::new();
        while let Some(&digit) = chars.peek().filter(|c| c.is_ascii_digit()) {
            number.push(digit);
            chars.next();
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let mut unit = String::new();
        while let Some(&letter) = chars.peek().filter(|c| c.is_alphabetic()) {
            unit.push(letter);
            chars.next();
        }

        let value = number.parse::<u32>().ok()?;
        let minutes = if unit.starts_with('h') { value.checked_mul(60)? } else { value };
        total = Some(total.unwrap_or(0).checked_add(minutes)?);
    }
    total
}
