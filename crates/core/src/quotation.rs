//! Rate-card pricing for a service assignment.
//!
//! `compute_quotation` is pure: identical inputs always produce an identical [`Quotation`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::client::{ExtraCharge, ExtraSelections, RateCard};
use crate::domain::service::DistanceMode;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationLine {
    pub concept: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotation {
    pub subtotal: Decimal,
    pub extras: Decimal,
    pub total: Decimal,
    pub breakdown: Vec<QuotationLine>,
}

#[derive(Clone, Copy, Debug)]
pub struct QuotationInput<'a> {
    pub rate_card: Option<&'a RateCard>,
    pub distance_mode: DistanceMode,
    pub billable_distance_km: Decimal,
    pub extras: &'a ExtraSelections,
}

/// Prices an assignment. A missing rate card is not an error: every amount is zero and the
/// breakdown is empty.
pub fn compute_quotation(input: QuotationInput<'_>) -> Quotation {
    let Some(rate_card) = input.rate_card else {
        return Quotation::default();
    };

    let mut breakdown = Vec::new();
    let distance = input.billable_distance_km.max(Decimal::ZERO);

    let subtotal = match input.distance_mode {
        DistanceMode::Local => {
            breakdown.push(QuotationLine {
                concept: "Local service".to_string(),
                amount: rate_card.local_flat_rate,
            });
            rate_card.local_flat_rate
        }
        DistanceMode::Foreign => {
            let distance_amount = distance * rate_card.per_km_rate;
            breakdown.push(QuotationLine {
                concept: "Flag drop".to_string(),
                amount: rate_card.flag_drop_fee,
            });
            breakdown.push(QuotationLine {
                concept: format!("Distance ({} km)", distance.normalize()),
                amount: distance_amount,
            });
            rate_card.flag_drop_fee + distance_amount
        }
    };

    // Lines follow rate-card order; zero amounts are left out.
    let mut extras = Decimal::ZERO;
    for charge in ExtraCharge::ALL {
        let rate = rate_card.rate(charge);
        if rate <= Decimal::ZERO {
            continue;
        }
        let line = if charge.is_percentage() {
            if !input.extras.night_shift {
                continue;
            }
            QuotationLine {
                concept: format!("{} (+{}%)", charge.label(), rate.normalize()),
                amount: subtotal * rate / Decimal::ONE_HUNDRED,
            }
        } else {
            let quantity = input.extras.quantity(charge);
            QuotationLine {
                concept: format!("{} ×{quantity}", charge.label()),
                amount: Decimal::from(quantity) * rate,
            }
        };
        if line.amount.is_zero() {
            continue;
        }
        extras += line.amount;
        breakdown.push(line);
    }

    Quotation { subtotal, extras, total: subtotal + extras, breakdown }
}

/// Distance typed by an operator. Non-numeric and negative input count as zero.
pub fn parse_distance(raw: &str) -> Decimal {
    raw.trim()
        .replace(',', ".")
        .parse::<Decimal>()
        .ok()
        .filter(|value| *value > Decimal::ZERO)
        .unwrap_or(Decimal::ZERO)
}
