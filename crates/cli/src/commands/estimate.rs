use serde_json::json;
use towline_core::domain::service::AssignmentFields;
use towline_core::logistics::{derive_totals, estimate_logistics, LogisticsRequest};
use towline_core::quotation::parse_distance;
use towline_maps::MapServices;

use crate::commands::context::{application_failure, execute, EXIT_CONFIG};
use crate::commands::CommandResult;

pub struct EstimateArgs {
    pub crane: String,
    pub origin: String,
    pub destination: Option<String>,
    pub odometer: Option<String>,
}

/// Approach and transfer legs plus the projected closing odometer. Needs no database.
pub fn run(args: EstimateArgs) -> CommandResult {
    let result = execute("estimate", |config| async move {
        let maps = MapServices::from_config(&config.maps)
            .map_err(|error| ("config_validation", error.to_string(), EXIT_CONFIG))?;
        let request = LogisticsRequest {
            crane_coords: args.crane.trim().to_string(),
            origin_coords: args.origin.trim().to_string(),
            destination_coords: args.destination.as_deref().unwrap_or_default().trim().to_string(),
        };

        let estimate =
            estimate_logistics(&*maps.routes, &request).await.map_err(application_failure)?;
        let assignment = AssignmentFields {
            approach: Some(estimate.approach),
            transfer: estimate.transfer,
            odometer: args.odometer.as_deref().map(parse_distance),
            ..AssignmentFields::default()
        };
        let totals = derive_totals(&assignment);
        Ok((assignment, totals, estimate.transfer_unavailable))
    });

    match result {
        Ok((assignment, totals, transfer_unavailable)) => {
            let total_km = totals.map(|totals| totals.total_distance_km).unwrap_or_default();
            let message = match &transfer_unavailable {
                Some(reason) => {
                    format!("estimated {total_km} km in total; transfer leg unavailable: {reason}")
                }
                None => format!("estimated {total_km} km in total"),
            };
            CommandResult::success_with_data(
                "estimate",
                message,
                json!({
                    "approach": assignment.approach,
                    "transfer": assignment.transfer,
                    "transfer_unavailable": transfer_unavailable,
                    "total_distance_km": total_km,
                    "estimated_final_odometer": totals.map(|totals| totals.estimated_final_odometer),
                }),
            )
        }
        Err(failure) => failure,
    }
}
