use serde_json::json;
use towline_core::domain::client::{ClientId, ExtraCharge, ExtraSelections};
use towline_core::domain::service::DistanceMode;
use towline_core::quotation::parse_distance;
use towline_core::{compute_quotation, QuotationInput};

use crate::commands::context::{application_failure, execute, input_failure, CommandContext, Failure};
use crate::commands::CommandResult;

pub struct QuoteArgs {
    pub client: String,
    pub mode: String,
    pub km: String,
    pub extras: Vec<String>,
    pub night_shift: bool,
}

/// Prices a trip against a stored client's rate card without creating a service.
pub fn run(args: QuoteArgs) -> CommandResult {
    let client_label = args.client.clone();
    let result = execute("quote", |config| async move {
        let distance_mode = DistanceMode::parse(&args.mode)
            .ok_or_else(|| input_failure(format!("unknown distance mode `{}`", args.mode)))?;
        let mut extras = parse_extras(&args.extras)?;
        extras.night_shift = args.night_shift;
        let billable_distance_km = parse_distance(&args.km);

        let context = CommandContext::open(config).await?;
        let client = context
            .clients
            .find(&ClientId(args.client.clone()))
            .await
            .map_err(|error| application_failure(error.into()))?;
        context.close().await;

        let rate_card = client.as_ref().and_then(|client| client.rate_card.as_ref());
        let quotation = compute_quotation(QuotationInput {
            rate_card,
            distance_mode,
            billable_distance_km,
            extras: &extras,
        });
        let priced = rate_card.is_some();
        Ok((quotation, priced, billable_distance_km))
    });

    match result {
        Ok((quotation, priced, km)) => {
            let message = if priced {
                format!("quoted {} for client `{client_label}`", quotation.total.round_dp(2))
            } else {
                format!("client `{client_label}` has no rate card; every amount is zero")
            };
            CommandResult::success_with_data(
                "quote",
                message,
                json!({ "billable_distance_km": km, "quotation": quotation }),
            )
        }
        Err(failure) => failure,
    }
}

/// `key=qty` pairs. Keys accept the stored rate key or the display label.
fn parse_extras(raw: &[String]) -> Result<ExtraSelections, Failure> {
    let mut extras = ExtraSelections::default();
    for pair in raw {
        let (key, quantity) = pair
            .split_once('=')
            .ok_or_else(|| input_failure(format!("extra `{pair}` must look like key=qty")))?;
        let charge = ExtraCharge::parse(key)
            .ok_or_else(|| input_failure(format!("unknown extra `{}`", key.trim())))?;
        let quantity = quantity
            .trim()
            .parse::<u32>()
            .map_err(|_| input_failure(format!("quantity for `{}` is not a whole number", key.trim())))?;
        if charge == ExtraCharge::NightShift {
            extras.night_shift = quantity > 0;
        } else {
            extras.set_quantity(charge, quantity);
        }
    }
    Ok(extras)
}

#[cfg(test)]
mod tests {
    use towline_core::domain::client::ExtraCharge;

    use super::parse_extras;

    #[test]
    fn extras_accept_keys_and_labels() {
        let extras = parse_extras(&["maniobraBase=2".to_string(), "Dolly=1".to_string()])
            .expect("extras");
        assert_eq!(extras.quantity(ExtraCharge::Maneuver), 2);
        assert_eq!(extras.quantity(ExtraCharge::Dolly), 1);
        assert!(!extras.night_shift);
    }

    #[test]
    fn malformed_extras_are_input_failures() {
        let (class, message, code) = parse_extras(&["rescate".to_string()]).expect_err("no qty");
        assert_eq!(class, "invalid_input");
        assert!(message.contains("key=qty"));
        assert_eq!(code, 10);

        let (_, message, _) = parse_extras(&["helicopter=1".to_string()]).expect_err("unknown");
        assert_eq!(message, "unknown extra `helicopter`");
    }
}
