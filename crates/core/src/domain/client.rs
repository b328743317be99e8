use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the walk-in client that needs no external folio.
pub const WALK_IN_CLIENT: &str = "Particular";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    /// Placeholder stored when a selected client cannot be resolved.
    pub fn sentinel() -> Self {
        Self(Uuid::nil().to_string())
    }

    pub fn is_sentinel(&self) -> bool {
        Uuid::parse_str(&self.0).map(|id| id.is_nil()).unwrap_or(false)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub company_id: Option<i64>,
    pub rate_card: Option<RateCard>,
}

impl Client {
    pub fn is_walk_in(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case(WALK_IN_CLIENT)
    }
}

/// Add-on charges a rate card can price. Night shift is a percentage of the base subtotal;
/// every other charge is a linear unit rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtraCharge {
    #[serde(rename = "maniobraBase")]
    Maneuver,
    #[serde(rename = "esperaHora")]
    WaitingHour,
    #[serde(rename = "horarioNocturno")]
    NightShift,
    #[serde(rename = "pasoCorriente")]
    PowerJump,
    #[serde(rename = "cambioLlanta")]
    TireChange,
    #[serde(rename = "suministroGasolina")]
    FuelSupply,
    #[serde(rename = "resguardoDia")]
    OvernightStorage,
    #[serde(rename = "adaptacion")]
    Adaptation,
    #[serde(rename = "cargaKg")]
    LoadPerKg,
    #[serde(rename = "acondicionamiento")]
    Conditioning,
    #[serde(rename = "rescate")]
    Rescue,
    #[serde(rename = "nivelSubterraneo")]
    UndergroundLevel,
    #[serde(rename = "dollys")]
    Dolly,
    #[serde(rename = "patines")]
    Skate,
    #[serde(rename = "goJacks")]
    GoJack,
}

impl ExtraCharge {
    pub const ALL: [ExtraCharge; 15] = [
        Self::Maneuver,
        Self::WaitingHour,
        Self::NightShift,
        Self::PowerJump,
        Self::TireChange,
        Self::FuelSupply,
        Self::OvernightStorage,
        Self::Adaptation,
        Self::LoadPerKg,
        Self::Conditioning,
        Self::Rescue,
        Self::UndergroundLevel,
        Self::Dolly,
        Self::Skate,
        Self::GoJack,
    ];

    pub fn storage_key(&self) -> &'static str {
        match self {
            Self::Maneuver => "maniobraBase",
            Self::WaitingHour => "esperaHora",
            Self::NightShift => "horarioNocturno",
            Self::PowerJump => "pasoCorriente",
            Self::TireChange => "cambioLlanta",
            Self::FuelSupply => "suministroGasolina",
            Self::OvernightStorage => "resguardoDia",
            Self::Adaptation => "adaptacion",
            Self::LoadPerKg => "cargaKg",
            Self::Conditioning => "acondicionamiento",
            Self::Rescue => "rescate",
            Self::UndergroundLevel => "nivelSubterraneo",
            Self::Dolly => "dollys",
            Self::Skate => "patines",
            Self::GoJack => "goJacks",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Maneuver => "Maneuver",
            Self::WaitingHour => "Waiting hour",
            Self::NightShift => "Night shift",
            Self::PowerJump => "Power jump",
            Self::TireChange => "Tire change",
            Self::FuelSupply => "Fuel supply",
            Self::OvernightStorage => "Overnight storage",
            Self::Adaptation => "Adaptation",
            Self::LoadPerKg => "Load per kg",
            Self::Conditioning => "Conditioning",
            Self::Rescue => "Rescue",
            Self::UndergroundLevel => "Underground level",
            Self::Dolly => "Dolly",
            Self::Skate => "Skate",
            Self::GoJack => "Go-jack",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|charge| {
            charge.storage_key().eq_ignore_ascii_case(value) || charge.label().eq_ignore_ascii_case(value)
        })
    }

    pub fn is_percentage(&self) -> bool {
        matches!(self, Self::NightShift)
    }
}

/// Negotiated price list owned by a client. Stored with the keys existing rate data uses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RateCard {
    #[serde(rename = "tarifaLocal", default)]
    pub local_flat_rate: Decimal,
    #[serde(rename = "tarifaKm", default)]
    pub per_km_rate: Decimal,
    #[serde(rename = "banderazo", default)]
    pub flag_drop_fee: Decimal,
    #[serde(flatten)]
    pub surcharges: BTreeMap<ExtraCharge, Decimal>,
}

impl RateCard {
    pub fn new(local_flat_rate: Decimal, per_km_rate: Decimal, flag_drop_fee: Decimal) -> Self {
        Self { local_flat_rate, per_km_rate, flag_drop_fee, surcharges: BTreeMap::new() }
    }

    pub fn with_surcharge(mut self, charge: ExtraCharge, rate: Decimal) -> Self {
        self.surcharges.insert(charge, rate);
        self
    }

    /// Rate for `charge`; missing and negative rates price at zero.
    pub fn rate(&self, charge: ExtraCharge) -> Decimal {
        self.surcharges.get(&charge).copied().unwrap_or(Decimal::ZERO).max(Decimal::ZERO)
    }
}

/// Operator-selected extras on an assignment. Quantities drive linear charges, the night-shift
/// surcharge is a toggle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtraSelections {
    pub quantities: BTreeMap<ExtraCharge, u32>,
    pub night_shift: bool,
}

impl ExtraSelections {
    pub fn quantity(&self, charge: ExtraCharge) -> u32 {
        self.quantities.get(&charge).copied().unwrap_or(0)
    }

    /// Zero quantities are removed so an untouched extra and a cleared one compare equal.
    pub fn set_quantity(&mut self, charge: ExtraCharge, quantity: u32) {
        if quantity == 0 {
            self.quantities.remove(&charge);
        } else {
            self.quantities.insert(charge, quantity);
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ClientId, ExtraCharge, ExtraSelections, RateCard};

    #[test]
    fn sentinel_client_id_is_nil_uuid() {
        let sentinel = ClientId::sentinel();
        assert_eq!(sentinel.0, "00000000-0000-0000-0000-000000000000");
        assert!(sentinel.is_sentinel());
        assert!(!ClientId("9c6f1a52-7c1e-4a5e-8d3b-0f1b2a3c4d5e".to_string()).is_sentinel());
        assert!(!ClientId("ike".to_string()).is_sentinel());
    }

    #[test]
    fn rate_card_reads_storage_keys() {
        let card: RateCard = serde_json::from_value(serde_json::json!({
            "tarifaLocal": 800,
            "tarifaKm": "25.5",
            "banderazo": 200,
            "horarioNocturno": 20,
            "maniobraBase": 150
        }))
        .expect("rate card");

        assert_eq!(card.local_flat_rate, Decimal::from(800));
        assert_eq!(card.per_km_rate, Decimal::new(255, 1));
        assert_eq!(card.rate(ExtraCharge::NightShift), Decimal::from(20));
        assert_eq!(card.rate(ExtraCharge::Maneuver), Decimal::from(150));
        assert_eq!(card.rate(ExtraCharge::Dolly), Decimal::ZERO);
    }

    #[test]
    fn negative_rates_price_at_zero() {
        let card = RateCard::default().with_surcharge(ExtraCharge::Rescue, Decimal::from(-5));
        assert_eq!(card.rate(ExtraCharge::Rescue), Decimal::ZERO);
    }

    #[test]
    fn charge_parse_accepts_key_or_label() {
        assert_eq!(ExtraCharge::parse("goJacks"), Some(ExtraCharge::GoJack));
        assert_eq!(ExtraCharge::parse("waiting hour"), Some(ExtraCharge::WaitingHour));
        assert_eq!(ExtraCharge::parse("unknown"), None);
        assert!(ExtraCharge::NightShift.is_percentage());
        assert!(!ExtraCharge::Dolly.is_percentage());
    }

    #[test]
    fn clearing_a_quantity_matches_untouched_selection() {
        let mut selections = ExtraSelections::default();
        selections.set_quantity(ExtraCharge::Dolly, 2);
        assert_eq!(selections.quantity(ExtraCharge::Dolly), 2);

        selections.set_quantity(ExtraCharge::Dolly, 0);
        assert_eq!(selections, ExtraSelections::default());
    }
}
