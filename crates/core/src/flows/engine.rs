use thiserror::Error;

use crate::domain::client::WALK_IN_CLIENT;
use crate::domain::service::{
    RequestReason, ServiceCategory, ServiceRecord, ServiceStatus, ServiceStep, TimestampSlot,
};
use crate::flows::states::{StatusEvent, StatusOutcome, TransitionContext};

pub trait StatusFlow {
    fn initial_status(&self) -> ServiceStatus;
    fn transition(
        &self,
        current: ServiceStatus,
        event: StatusEvent,
        context: &TransitionContext,
    ) -> Result<StatusOutcome, LifecycleError>;
}

#[derive(Clone, Debug, Default)]
pub struct DispatchFlow;

impl StatusFlow for DispatchFlow {
    fn initial_status(&self) -> ServiceStatus {
        ServiceStatus::Pending
    }

    fn transition(
        &self,
        current: ServiceStatus,
        event: StatusEvent,
        context: &TransitionContext,
    ) -> Result<StatusOutcome, LifecycleError> {
        transition_dispatch(current, event, context)
    }
}

pub struct LifecycleEngine<F> {
    flow: F,
}

impl<F> LifecycleEngine<F>
where
    F: StatusFlow,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_status(&self) -> ServiceStatus {
        self.flow.initial_status()
    }

    pub fn apply(
        &self,
        current: ServiceStatus,
        event: StatusEvent,
        context: &TransitionContext,
    ) -> Result<StatusOutcome, LifecycleError> {
        self.flow.transition(current, event, context)
    }

    /// The manual "advance" action: moves one status forward through the operational chain.
    pub fn advance(&self, current: ServiceStatus) -> Result<StatusOutcome, LifecycleError> {
        if current.is_terminal() {
            return Err(LifecycleError::RecordClosed);
        }
        let event =
            StatusEvent::advance_from(current).ok_or(LifecycleError::NoForwardStatus { status: current })?;
        self.apply(current, event, &TransitionContext::default())
    }

    pub fn archive(&self, current: ServiceStatus) -> Result<StatusOutcome, LifecycleError> {
        self.apply(current, StatusEvent::Archived, &TransitionContext::default())
    }

    pub fn confirm_assignment(
        &self,
        record: &ServiceRecord,
    ) -> Result<StatusOutcome, LifecycleError> {
        let context =
            TransitionContext { missing_required_fields: missing_assignment_fields(record) };
        self.apply(record.status, StatusEvent::AssignmentConfirmed, &context)
    }

    /// Checks whether the operator may view `target`. Earlier steps are always reachable;
    /// later ones only once every step before them has been confirmed.
    pub fn navigate(
        &self,
        record: &ServiceRecord,
        target: ServiceStep,
    ) -> Result<ServiceStep, LifecycleError> {
        if target <= record.step {
            return Ok(target);
        }
        let gate = match target {
            ServiceStep::Report => return Ok(target),
            ServiceStep::Assignment => ServiceStep::Report,
            ServiceStep::Monitoring => ServiceStep::Assignment,
        };
        let mut missing = match gate {
            ServiceStep::Report => missing_report_fields(record),
            _ => missing_assignment_fields(record),
        };
        if missing.is_empty() {
            missing.push(format!("{gate} confirmation"));
        }
        Err(LifecycleError::StepNotReachable { target, missing_fields: missing })
    }
}

impl Default for LifecycleEngine<DispatchFlow> {
    fn default() -> Self {
        Self::new(DispatchFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("missing required fields to confirm {step}: {missing_fields:?}")]
    MissingRequiredFields { step: ServiceStep, missing_fields: Vec<String> },
    #[error("invalid status transition from {status:?} using event {event:?}")]
    InvalidTransition { status: ServiceStatus, event: StatusEvent },
    #[error("no further status can be reached from {status:?} by advancing")]
    NoForwardStatus { status: ServiceStatus },
    #[error("step {target} is not reachable yet, missing: {missing_fields:?}")]
    StepNotReachable { target: ServiceStep, missing_fields: Vec<String> },
    #[error("step {step} must be confirmed before this action")]
    StepNotConfirmed { step: ServiceStep },
    #[error("service is closed and read-only")]
    RecordClosed,
    #[error("unknown service type `{0}`")]
    UnknownServiceType(String),
    #[error("actor is not permitted to handle service type `{0}`")]
    ServiceTypeNotPermitted(String),
}

fn transition_dispatch(
    current: ServiceStatus,
    event: StatusEvent,
    context: &TransitionContext,
) -> Result<StatusOutcome, LifecycleError> {
    use ServiceStatus::{Assigned, Closed, Completed, Contacted, InTransit, OnSite, Pending};
    use StatusEvent::{
        Archived, AssignmentConfirmed, ContactMade, ServiceCompleted, TransferStarted, UnitArrived,
    };

    let (to, stamp) = match (current, event) {
        (Closed, _) => return Err(LifecycleError::RecordClosed),
        (Pending, AssignmentConfirmed) => {
            if !context.missing_required_fields.is_empty() {
                return Err(LifecycleError::MissingRequiredFields {
                    step: ServiceStep::Assignment,
                    missing_fields: context.missing_required_fields.clone(),
                });
            }
            (Assigned, Some(TimestampSlot::Assignment))
        }
        (Assigned, UnitArrived) => (OnSite, Some(TimestampSlot::Arrival)),
        (OnSite, ContactMade) => (Contacted, Some(TimestampSlot::Contact)),
        (Contacted, TransferStarted) => (InTransit, Some(TimestampSlot::Transfer)),
        (InTransit, ServiceCompleted) => (Completed, Some(TimestampSlot::Completion)),
        (Completed, Archived) => (Closed, None),
        _ => return Err(LifecycleError::InvalidTransition { status: current, event }),
    };

    Ok(StatusOutcome { from: current, to, event, stamp })
}

/// Fields still blank that block confirming the report, named by storage key.
pub fn missing_report_fields(record: &ServiceRecord) -> Vec<String> {
    let report = &record.report;
    let mut missing = Vec::new();

    let client_selected = record.client_id.is_some() && !report.client_name.trim().is_empty();
    if !client_selected {
        missing.push("cliente".to_string());
    }
    let walk_in = report.client_name.trim().eq_ignore_ascii_case(WALK_IN_CLIENT);
    if client_selected && !walk_in {
        require(&mut missing, "folioCliente", &report.client_folio);
        require(&mut missing, "nombreReporta", &report.reporter_name);
    }

    match record.category {
        ServiceCategory::Vehicular => {
            require(&mut missing, "vehiculo", &report.vehicle.vehicle);
            require(&mut missing, "placas", &report.vehicle.plates);
            match report.request_reason {
                None => missing.push("motivoSolicitud".to_string()),
                Some(RequestReason::Accident) => {
                    require(&mut missing, "descripcionDanios", &report.vehicle.damage_description)
                }
                Some(RequestReason::Assistance) => {
                    require(&mut missing, "tipoFalla", &report.vehicle.fault_type)
                }
            }
        }
        ServiceCategory::Home | ServiceCategory::General => {
            require(&mut missing, "descripcionServicio", &report.service_description)
        }
    }
    missing
}

pub fn missing_assignment_fields(record: &ServiceRecord) -> Vec<String> {
    let mut missing = Vec::new();
    if record.assignment.unit.trim().is_empty() {
        missing.push("grua".to_string());
    }
    if record.assignment.operator.trim().is_empty() {
        missing.push("operador".to_string());
    }
    missing
}

fn require(missing: &mut Vec<String>, name: &str, value: &str) {
    if value.trim().is_empty() {
        missing.push(name.to_string());
    }
}
