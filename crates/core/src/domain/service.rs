use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::audit::AuditLog;
use crate::domain::client::{ClientId, ExtraSelections};
use crate::quotation::Quotation;

/// Folio handed out when the store holds no records yet.
pub const DEFAULT_FOLIO_BASE: Folio = Folio(1001);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Folio(pub i64);

impl Folio {
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Folio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStep {
    Report,
    Assignment,
    Monitoring,
}

impl ServiceStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Assignment => "assignment",
            Self::Monitoring => "monitoring",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "report" | "0" | "1" => Some(Self::Report),
            "assignment" | "2" => Some(Self::Assignment),
            "monitoring" | "3" => Some(Self::Monitoring),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Report => Some(Self::Assignment),
            Self::Assignment => Some(Self::Monitoring),
            Self::Monitoring => None,
        }
    }
}

impl fmt::Display for ServiceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational status. Declaration order is the forward progression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    #[default]
    Pending,
    Assigned,
    OnSite,
    Contacted,
    InTransit,
    Completed,
    Closed,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::OnSite => "on_site",
            Self::Contacted => "contacted",
            Self::InTransit => "in_transit",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Assigned => "Assigned",
            Self::OnSite => "On site",
            Self::Contacted => "Contacted",
            Self::InTransit => "In transit",
            Self::Completed => "Completed",
            Self::Closed => "Closed",
        }
    }

    /// Canonical encodings plus the status names written by older versions. This is the only
    /// place legacy synonyms are recognised.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "" | "pending" | "pendiente" | "activo" => Some(Self::Pending),
            "assigned" | "asignado" | "asignada" | "en camino" => Some(Self::Assigned),
            "on_site" | "en sitio" => Some(Self::OnSite),
            "contacted" | "contacto" => Some(Self::Contacted),
            "in_transit" | "traslado" => Some(Self::InTransit),
            "completed" | "finalizado" => Some(Self::Completed),
            "closed" | "cerrado" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// True once the unit has reached the customer.
    pub fn has_arrived(&self) -> bool {
        *self >= Self::OnSite
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Vehicular,
    Home,
    General,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vehicular => "vehicular",
            Self::Home => "home",
            Self::General => "general",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vehicular" => Some(Self::Vehicular),
            "home" | "hogar" => Some(Self::Home),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceType {
    pub id: &'static str,
    pub label: &'static str,
    pub category: ServiceCategory,
}

pub static SERVICE_TYPES: [ServiceType; 10] = [
    ServiceType { id: "grua", label: "Towing", category: ServiceCategory::Vehicular },
    ServiceType { id: "corriente", label: "Jump start", category: ServiceCategory::Vehicular },
    ServiceType { id: "llanta", label: "Tire change", category: ServiceCategory::Vehicular },
    ServiceType { id: "gasolina", label: "Fuel supply", category: ServiceCategory::Vehicular },
    ServiceType {
        id: "cerrajeria_auto",
        label: "Car locksmith",
        category: ServiceCategory::Vehicular,
    },
    ServiceType { id: "cerrajeria_hogar", label: "Home locksmith", category: ServiceCategory::Home },
    ServiceType { id: "plomeria", label: "Plumbing", category: ServiceCategory::Home },
    ServiceType { id: "electricidad", label: "Electrical", category: ServiceCategory::Home },
    ServiceType { id: "vidrieria", label: "Glazing", category: ServiceCategory::Home },
    ServiceType { id: "farmacia", label: "Pharmacy", category: ServiceCategory::General },
];

impl ServiceType {
    pub fn find(id: &str) -> Option<&'static ServiceType> {
        let id = id.trim();
        SERVICE_TYPES.iter().find(|service_type| service_type.id == id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestReason {
    #[serde(rename = "Siniestro")]
    Accident,
    #[serde(rename = "Asistencia")]
    Assistance,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleDetails {
    #[serde(rename = "vehiculo")]
    pub vehicle: String,
    #[serde(rename = "marca")]
    pub make: String,
    #[serde(rename = "submarca")]
    pub model: String,
    #[serde(rename = "color")]
    pub color: String,
    #[serde(rename = "placas")]
    pub plates: String,
    #[serde(rename = "descripcionDanios")]
    pub damage_description: String,
    #[serde(rename = "tipoFalla")]
    pub fault_type: String,
    #[serde(rename = "especifiqueFalla")]
    pub fault_detail: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationFields {
    #[serde(rename = "calle")]
    pub street: String,
    #[serde(rename = "colonia")]
    pub neighborhood: String,
    #[serde(rename = "municipio")]
    pub municipality: String,
    #[serde(rename = "estado")]
    pub state: String,
    #[serde(rename = "cp")]
    pub postal_code: String,
    #[serde(rename = "referencias")]
    pub references: String,
    /// `"lat, lng"` as entered or picked on the map.
    #[serde(rename = "coords")]
    pub coords: String,
}

/// Data captured in the report step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportFields {
    #[serde(rename = "cliente")]
    pub client_name: String,
    #[serde(rename = "folioCliente")]
    pub client_folio: String,
    #[serde(rename = "nombreReporta")]
    pub reporter_name: String,
    #[serde(rename = "nombreAsegurado")]
    pub insured_name: String,
    #[serde(rename = "telefonoAsegurado")]
    pub insured_phone: String,
    #[serde(rename = "descripcionServicio")]
    pub service_description: String,
    #[serde(rename = "motivoSolicitud")]
    pub request_reason: Option<RequestReason>,
    #[serde(flatten)]
    pub vehicle: VehicleDetails,
    #[serde(rename = "origen")]
    pub origin: LocationFields,
    #[serde(rename = "destino")]
    pub destination: LocationFields,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMode {
    #[default]
    #[serde(rename = "Local")]
    Local,
    #[serde(rename = "Foráneo", alias = "Foraneo")]
    Foreign,
}

impl DistanceMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "local" => Some(Self::Local),
            "foreign" | "foráneo" | "foraneo" => Some(Self::Foreign),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    pub distance_km: Decimal,
    pub duration_min: u32,
}

/// Data captured in the assignment step, including the logistics projections derived from it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssignmentFields {
    #[serde(rename = "grua")]
    pub unit: String,
    #[serde(rename = "operador")]
    pub operator: String,
    #[serde(rename = "tipoServicio")]
    pub distance_mode: DistanceMode,
    pub billable_distance: Decimal,
    pub crane_coords: String,
    #[serde(rename = "kmInicial")]
    pub odometer: Option<Decimal>,
    #[serde(rename = "tiempoArribo")]
    pub eta_minutes: Option<u32>,
    pub approach: Option<RouteLeg>,
    pub transfer: Option<RouteLeg>,
    pub total_distance_km: Decimal,
    pub estimated_final_odometer: Decimal,
    pub extras: ExtraSelections,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimestampSlot {
    Assignment,
    Eta,
    Arrival,
    Contact,
    Transfer,
    Completion,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceTimestamps {
    #[serde(rename = "assignmentTimestamp")]
    pub assignment: Option<DateTime<Utc>>,
    #[serde(rename = "etaTimestamp")]
    pub eta: Option<DateTime<Utc>>,
    #[serde(rename = "arrivalTimestamp")]
    pub arrival: Option<DateTime<Utc>>,
    #[serde(rename = "contactTimestamp")]
    pub contact: Option<DateTime<Utc>>,
    #[serde(rename = "transferTimestamp")]
    pub transfer: Option<DateTime<Utc>>,
    #[serde(rename = "completionTimestamp")]
    pub completion: Option<DateTime<Utc>>,
}

impl ServiceTimestamps {
    pub fn get(&self, slot: TimestampSlot) -> Option<DateTime<Utc>> {
        match slot {
            TimestampSlot::Assignment => self.assignment,
            TimestampSlot::Eta => self.eta,
            TimestampSlot::Arrival => self.arrival,
            TimestampSlot::Contact => self.contact,
            TimestampSlot::Transfer => self.transfer,
            TimestampSlot::Completion => self.completion,
        }
    }

    /// Sets `slot` once. Returns false and leaves the stored instant alone if it is already set.
    pub fn stamp(&mut self, slot: TimestampSlot, at: DateTime<Utc>) -> bool {
        let target = match slot {
            TimestampSlot::Assignment => &mut self.assignment,
            TimestampSlot::Eta => &mut self.eta,
            TimestampSlot::Arrival => &mut self.arrival,
            TimestampSlot::Contact => &mut self.contact,
            TimestampSlot::Transfer => &mut self.transfer,
            TimestampSlot::Completion => &mut self.completion,
        };
        if target.is_some() {
            return false;
        }
        *target = Some(at);
        true
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockState {
    pub report_locked: bool,
    pub assignment_locked: bool,
}

impl LockState {
    /// `None` for steps that carry no lock.
    pub fn is_locked(&self, step: ServiceStep) -> Option<bool> {
        match step {
            ServiceStep::Report => Some(self.report_locked),
            ServiceStep::Assignment => Some(self.assignment_locked),
            ServiceStep::Monitoring => None,
        }
    }

    pub(crate) fn set(&mut self, step: ServiceStep, locked: bool) -> bool {
        match step {
            ServiceStep::Report => self.report_locked = locked,
            ServiceStep::Assignment => self.assignment_locked = locked,
            ServiceStep::Monitoring => return false,
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub folio: Folio,
    /// Furthest step confirmed so far. Viewing an earlier step never lowers it.
    pub step: ServiceStep,
    pub status: ServiceStatus,
    pub client_id: Option<ClientId>,
    pub service_type: String,
    pub category: ServiceCategory,
    pub report: ReportFields,
    pub assignment: AssignmentFields,
    pub quotation: Option<Quotation>,
    pub timestamps: ServiceTimestamps,
    pub lock_state: LockState,
    pub audit_log: AuditLog,
    pub created_at: DateTime<Utc>,
}

impl ServiceRecord {
    pub fn new(folio: Folio, service_type: &ServiceType, created_at: DateTime<Utc>) -> Self {
        Self {
            folio,
            step: ServiceStep::Report,
            status: ServiceStatus::Pending,
            client_id: None,
            service_type: service_type.id.to_string(),
            category: service_type.category,
            report: ReportFields::default(),
            assignment: AssignmentFields::default(),
            quotation: None,
            timestamps: ServiceTimestamps::default(),
            lock_state: LockState::default(),
            audit_log: AuditLog::default(),
            created_at,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn service_type_label(&self) -> &str {
        ServiceType::find(&self.service_type)
            .map(|service_type| service_type.label)
            .unwrap_or(self.service_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{
        DistanceMode, Folio, LockState, ReportFields, ServiceCategory, ServiceRecord, ServiceStatus,
        ServiceStep, ServiceTimestamps, ServiceType, TimestampSlot,
    };

    #[test]
    fn status_round_trips_through_canonical_encoding() {
        for status in [
            ServiceStatus::Pending,
            ServiceStatus::Assigned,
            ServiceStatus::OnSite,
            ServiceStatus::Contacted,
            ServiceStatus::InTransit,
            ServiceStatus::Completed,
            ServiceStatus::Closed,
        ] {
            assert_eq!(ServiceStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn legacy_status_synonyms_map_to_canonical_statuses() {
        assert_eq!(ServiceStatus::parse("Asignado"), Some(ServiceStatus::Assigned));
        assert_eq!(ServiceStatus::parse("Asignada"), Some(ServiceStatus::Assigned));
        assert_eq!(ServiceStatus::parse("En Camino"), Some(ServiceStatus::Assigned));
        assert_eq!(ServiceStatus::parse("En Sitio"), Some(ServiceStatus::OnSite));
        assert_eq!(ServiceStatus::parse("Traslado"), Some(ServiceStatus::InTransit));
        assert_eq!(ServiceStatus::parse("Finalizado"), Some(ServiceStatus::Completed));
        assert_eq!(ServiceStatus::parse("Cerrado"), Some(ServiceStatus::Closed));
        assert_eq!(ServiceStatus::parse(""), Some(ServiceStatus::Pending));
        assert_eq!(ServiceStatus::parse("Activo"), Some(ServiceStatus::Pending));
        assert_eq!(ServiceStatus::parse("Perdido"), None);
    }

    #[test]
    fn status_order_follows_progression() {
        assert!(ServiceStatus::Pending < ServiceStatus::Assigned);
        assert!(ServiceStatus::Completed < ServiceStatus::Closed);
        assert!(ServiceStatus::OnSite.has_arrived());
        assert!(!ServiceStatus::Assigned.has_arrived());
    }

    #[test]
    fn catalog_resolves_categories() {
        let towing = ServiceType::find("grua").expect("towing");
        assert_eq!(towing.category, ServiceCategory::Vehicular);
        let plumbing = ServiceType::find("plomeria").expect("plumbing");
        assert_eq!(plumbing.category, ServiceCategory::Home);
        assert!(ServiceType::find("helicoptero").is_none());
    }

    #[test]
    fn timestamps_are_written_once() {
        let first = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).single().expect("time");
        let second = Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).single().expect("time");
        let mut timestamps = ServiceTimestamps::default();

        assert!(timestamps.stamp(TimestampSlot::Arrival, first));
        assert!(!timestamps.stamp(TimestampSlot::Arrival, second));
        assert_eq!(timestamps.get(TimestampSlot::Arrival), Some(first));
    }

    #[test]
    fn monitoring_step_has_no_lock() {
        let mut locks = LockState::default();
        assert_eq!(locks.is_locked(ServiceStep::Monitoring), None);
        assert!(!locks.set(ServiceStep::Monitoring, true));
        assert!(locks.set(ServiceStep::Report, true));
        assert_eq!(locks.is_locked(ServiceStep::Report), Some(true));
    }

    #[test]
    fn report_fields_use_storage_keys() {
        let mut report = ReportFields::default();
        report.vehicle.plates = "ABC123".to_string();
        report.origin.street = "Av. Reforma".to_string();

        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["placas"], "ABC123");
        assert_eq!(value["origen"]["calle"], "Av. Reforma");
    }

    #[test]
    fn foreign_distance_mode_accepts_unaccented_spelling() {
        let mode: DistanceMode = serde_json::from_str("\"Foraneo\"").expect("mode");
        assert_eq!(mode, DistanceMode::Foreign);
        assert_eq!(DistanceMode::parse("foreign"), Some(DistanceMode::Foreign));
    }

    #[test]
    fn new_record_starts_unlocked_in_report() {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("time");
        let record =
            ServiceRecord::new(Folio(1001), ServiceType::find("grua").expect("type"), created);

        assert_eq!(record.step, ServiceStep::Report);
        assert_eq!(record.status, ServiceStatus::Pending);
        assert_eq!(record.lock_state, LockState::default());
        assert!(record.audit_log.is_empty());
        assert_eq!(record.service_type_label(), "Towing");
    }
}
