pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod logistics;
pub mod monitoring;
pub mod quotation;
pub mod session;
pub mod store;

pub use audit::{AuditLog, FieldChange, LogDraft, LogEntry, LogKind, LogPayload};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::actor::{Actor, Role};
pub use domain::client::{Client, ClientId, ExtraCharge, ExtraSelections, RateCard};
pub use domain::service::{
    AssignmentFields, DistanceMode, Folio, ReportFields, ServiceRecord, ServiceStatus, ServiceStep,
    ServiceType,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{LifecycleEngine, LifecycleError, LockError};
pub use logistics::{Coordinate, Geocoder, RouteEstimator};
pub use quotation::{compute_quotation, Quotation, QuotationInput};
pub use session::{LogisticsApplied, RouteEnd, ServiceDesk, ServiceSession};
pub use store::{ClientRegistry, ServiceStore};
