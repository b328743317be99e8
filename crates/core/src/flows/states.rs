use serde::{Deserialize, Serialize};

use crate::domain::service::{ServiceStatus, TimestampSlot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusEvent {
    AssignmentConfirmed,
    UnitArrived,
    ContactMade,
    TransferStarted,
    ServiceCompleted,
    Archived,
}

impl StatusEvent {
    /// Event that the single "advance" action fires from `status`, if any.
    pub fn advance_from(status: ServiceStatus) -> Option<Self> {
        match status {
            ServiceStatus::Assigned => Some(Self::UnitArrived),
            ServiceStatus::OnSite => Some(Self::ContactMade),
            ServiceStatus::Contacted => Some(Self::TransferStarted),
            ServiceStatus::InTransit => Some(Self::ServiceCompleted),
            ServiceStatus::Pending | ServiceStatus::Completed | ServiceStatus::Closed => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransitionContext {
    pub missing_required_fields: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusOutcome {
    pub from: ServiceStatus,
    pub to: ServiceStatus,
    pub event: StatusEvent,
    /// Timestamp the transition stamps, if it owns one.
    pub stamp: Option<TimestampSlot>,
}
