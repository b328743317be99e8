//! Editing session over one service record.
//!
//! A session is held by a single operator. Every wizard action goes through it so the lock
//! protocol, the change log and the derived values stay consistent. Field setters only touch
//! the in-memory record; confirmations, status changes, unlocks and notes write to the store.
//! A failed write is reported to the caller and the in-memory record is kept as it is.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::audit::{
    render_log, EditableSnapshot, LiveNote, LogDraft, LogKind, LogPayload, RenderedEntry,
};
use crate::clock::Clock;
use crate::config::DispatchConfig;
use crate::domain::actor::Actor;
use crate::domain::client::{ClientId, ExtraCharge, RateCard};
use crate::domain::service::{
    AssignmentFields, DistanceMode, Folio, LocationFields, ReportFields, ServiceRecord,
    ServiceStatus, ServiceStep, ServiceType, TimestampSlot,
};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::lock::{close_unlock, ensure_editable, open_unlock, resume_unlock};
use crate::flows::{
    missing_assignment_fields, missing_report_fields, DispatchFlow, LifecycleEngine,
    LifecycleError, LockError, StatusOutcome, UnlockPrompt, UnlockWindow,
};
use crate::logistics::{
    apply_totals, estimate_logistics, parse_eta_text, round_km, Coordinate, Geocoder,
    LogisticsEstimate, LogisticsRequest, RouteEstimator,
};
use crate::monitoring::{eta_countdown, DispatchSummary, EtaCountdown};
use crate::quotation::{compute_quotation, parse_distance, QuotationInput};
use crate::store::{ClientRegistry, ServiceStore};

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct ServiceDesk {
    store: Arc<dyn ServiceStore>,
    clients: Arc<dyn ClientRegistry>,
    clock: Arc<dyn Clock>,
    settings: DispatchConfig,
}

impl ServiceDesk {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        clients: Arc<dyn ClientRegistry>,
        clock: Arc<dyn Clock>,
        settings: DispatchConfig,
    ) -> Self {
        Self { store, clients, clock, settings }
    }

    pub fn settings(&self) -> &DispatchConfig {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn list(&self) -> Result<Vec<ServiceRecord>, ApplicationError> {
        self.store.list_all().await
    }

    pub async fn summary(&self) -> Result<DispatchSummary, ApplicationError> {
        let records = self.store.list_all().await?;
        Ok(DispatchSummary::from_records(&records, self.clock.now().date_naive()))
    }

    async fn rate_card_for(
        &self,
        client_id: Option<&ClientId>,
    ) -> Result<Option<RateCard>, ApplicationError> {
        let Some(client_id) = client_id.filter(|id| !id.is_sentinel()) else {
            return Ok(None);
        };
        Ok(self.clients.find_client(client_id).await?.and_then(|client| client.rate_card))
    }
}

/// Which end of the trip a picked coordinate belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteEnd {
    Origin,
    Destination,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogisticsApplied {
    Applied,
    /// The coordinates changed after the estimate was requested.
    Stale,
    /// The assignment can no longer be edited.
    Locked,
    /// The map collaborator could not answer; nothing was written.
    Skipped,
}

pub struct ServiceSession {
    desk: ServiceDesk,
    actor: Actor,
    record: ServiceRecord,
    rate_card: Option<RateCard>,
    view: ServiceStep,
    persisted: bool,
    unlock: Option<UnlockWindow>,
    pending_unlock: Option<ServiceStep>,
    live_note: Option<LiveNote>,
    engine: LifecycleEngine<DispatchFlow>,
}

impl ServiceSession {
    /// Opens a draft for a new service. Nothing is stored until the report is confirmed.
    pub async fn start(
        desk: ServiceDesk,
        actor: Actor,
        service_type_id: &str,
    ) -> Result<Self, ApplicationError> {
        let service_type = ServiceType::find(service_type_id)
            .ok_or_else(|| LifecycleError::UnknownServiceType(service_type_id.to_string()))?;
        if !actor.has_permission(service_type.id) {
            return Err(LifecycleError::ServiceTypeNotPermitted(service_type.id.to_string()).into());
        }

        let folio = desk.store.next_folio().await?;
        let record = ServiceRecord::new(folio, service_type, desk.clock.now());
        info!(
            event_name = "service.draft_opened",
            folio = %folio,
            service_type = service_type.id,
            actor = %actor.id,
            "service draft opened"
        );

        Ok(Self::assemble(desk, actor, record, None, false))
    }

    pub async fn resume(
        desk: ServiceDesk,
        actor: Actor,
        folio: Folio,
    ) -> Result<Self, ApplicationError> {
        let record = desk
            .store
            .find_by_folio(folio)
            .await?
            .ok_or(DomainError::ServiceNotFound(folio))?;
        let rate_card = desk.rate_card_for(record.client_id.as_ref()).await?;
        debug!(event_name = "service.resumed", folio = %folio, actor = %actor.id, "service resumed");
        let mut session = Self::assemble(desk, actor, record, rate_card, true);
        session.unlock = session.stranded_unlock();
        if let Some(window) = &session.unlock {
            warn!(
                event_name = "service.unlock_resumed",
                folio = %folio,
                step = %window.step,
                "step was stored unlocked; its next confirmation relocks it"
            );
            session.view = window.step;
        }
        Ok(session)
    }

    /// A confirmed step the store holds unlocked, as left by a session that ended inside an
    /// unlock window. The reason comes from the latest unlock entry for that step.
    fn stranded_unlock(&self) -> Option<UnlockWindow> {
        let record = &self.record;
        if record.is_closed() {
            return None;
        }
        let step = if !record.lock_state.report_locked && record.step > ServiceStep::Report {
            ServiceStep::Report
        } else if !record.lock_state.assignment_locked && record.status != ServiceStatus::Pending
        {
            ServiceStep::Assignment
        } else {
            return None;
        };

        let prefix = format!("Unlocked {step}: ");
        let opened = record.audit_log.newest_first().find_map(|entry| match &entry.payload {
            LogPayload::Text(text) if entry.kind == LogKind::Unlock => {
                text.strip_prefix(&prefix).map(|reason| (reason.to_string(), entry.timestamp))
            }
            _ => None,
        });
        let (reason, opened_at) = opened.unwrap_or_else(|| (String::new(), self.desk.clock.now()));
        resume_unlock(
            &record.lock_state,
            step,
            &reason,
            EditableSnapshot::capture(record),
            opened_at,
        )
    }

    fn assemble(
        desk: ServiceDesk,
        actor: Actor,
        record: ServiceRecord,
        rate_card: Option<RateCard>,
        persisted: bool,
    ) -> Self {
        let view = record.step;
        Self {
            desk,
            actor,
            record,
            rate_card,
            view,
            persisted,
            unlock: None,
            pending_unlock: None,
            live_note: None,
            engine: LifecycleEngine::default(),
        }
    }

    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Step currently on screen. May be behind `record().step`.
    pub fn view(&self) -> ServiceStep {
        self.view
    }

    pub fn rate_card(&self) -> Option<&RateCard> {
        self.rate_card.as_ref()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn open_unlock(&self) -> Option<&UnlockWindow> {
        self.unlock.as_ref()
    }

    pub fn rendered_log(&self) -> Vec<RenderedEntry> {
        render_log(&self.record.audit_log)
    }

    pub fn eta_countdown(&self) -> Option<EtaCountdown> {
        let settings = &self.desk.settings;
        eta_countdown(
            &self.record,
            self.desk.clock.now(),
            settings.due_soon_minutes,
            StdDuration::from_secs(settings.eta_refresh_secs),
        )
    }

    // Report step.

    /// Picks the rate-card owner. An id the registry does not know is kept as the sentinel id
    /// with the typed text as the client name.
    pub async fn select_client(&mut self, selection: &ClientId) -> Result<(), ApplicationError> {
        self.ensure_report_editable()?;
        let client = self.desk.clients.find_client(selection).await?;

        match client {
            Some(client) => {
                self.record.client_id = Some(client.id.clone());
                self.record.report.client_name = client.name.clone();
                self.rate_card = client.rate_card;
            }
            None => {
                warn!(
                    event_name = "service.client_unresolved",
                    folio = %self.record.folio,
                    selection = %selection,
                    "client not found in registry, storing sentinel id"
                );
                self.record.client_id = Some(ClientId::sentinel());
                self.record.report.client_name = selection.0.trim().to_string();
                self.rate_card = None;
            }
        }
        self.refresh_quotation();
        Ok(())
    }

    pub fn edit_report(
        &mut self,
        edit: impl FnOnce(&mut ReportFields),
    ) -> Result<(), ApplicationError> {
        self.ensure_report_editable()?;
        edit(&mut self.record.report);
        Ok(())
    }

    /// Stores the coordinate and fills the address from the geocoder. Returns false when the
    /// geocoder could not answer; the coordinate is kept either way.
    pub async fn pick_location(
        &mut self,
        geocoder: &dyn Geocoder,
        end: RouteEnd,
        coordinate: Coordinate,
    ) -> Result<bool, ApplicationError> {
        self.ensure_report_editable()?;
        self.location_mut(end).coords = coordinate.to_text();

        match geocoder.reverse_geocode(coordinate).await {
            Ok(address) => {
                let location = self.location_mut(end);
                location.street = address.street;
                location.neighborhood = address.neighborhood;
                location.municipality = address.municipality;
                location.state = address.state;
                location.postal_code = address.postal_code;
                Ok(true)
            }
            Err(ApplicationError::EstimationUnavailable(reason)) => {
                warn!(
                    event_name = "maps.geocode_unavailable",
                    folio = %self.record.folio,
                    reason = %reason,
                    "reverse geocoding unavailable, address left as typed"
                );
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    fn location_mut(&mut self, end: RouteEnd) -> &mut LocationFields {
        match end {
            RouteEnd::Origin => &mut self.record.report.origin,
            RouteEnd::Destination => &mut self.record.report.destination,
        }
    }

    /// Validates and locks the report. The first confirmation stores the record; a confirmation
    /// that closes an unlock logs the fields that changed.
    pub async fn confirm_report(&mut self) -> Result<(), ApplicationError> {
        self.ensure_confirmable(ServiceStep::Report)?;
        let missing = missing_report_fields(&self.record);
        if !missing.is_empty() {
            return Err(LifecycleError::MissingRequiredFields {
                step: ServiceStep::Report,
                missing_fields: missing,
            }
            .into());
        }

        self.close_window_for(ServiceStep::Report);
        if !self.persisted {
            let text = format!(
                "Service captured: {} for {}",
                self.record.service_type_label(),
                self.record.report.client_name.trim()
            );
            self.append(LogDraft::text(LogKind::Capture, text));
        }
        self.record.lock_state.set(ServiceStep::Report, true);
        self.record.step = self.record.step.max(ServiceStep::Assignment);
        self.view = ServiceStep::Assignment;

        self.persist().await
    }

    // Assignment step.

    pub fn set_unit(&mut self, unit: &str) -> Result<(), ApplicationError> {
        self.assignment_mut()?.unit = unit.trim().to_string();
        Ok(())
    }

    pub fn set_operator(&mut self, operator: &str) -> Result<(), ApplicationError> {
        self.assignment_mut()?.operator = operator.trim().to_string();
        Ok(())
    }

    pub fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), ApplicationError> {
        self.assignment_mut()?.distance_mode = mode;
        self.refresh_quotation();
        Ok(())
    }

    /// Accepts operator text; unparseable or negative input counts as zero.
    pub fn set_billable_distance(&mut self, raw: &str) -> Result<(), ApplicationError> {
        self.assignment_mut()?.billable_distance = parse_distance(raw);
        self.refresh_quotation();
        Ok(())
    }

    pub fn set_extra_quantity(
        &mut self,
        charge: ExtraCharge,
        quantity: u32,
    ) -> Result<(), ApplicationError> {
        if charge.is_percentage() {
            return Err(DomainError::InvalidInput(format!(
                "{} is a toggle, not a quantity",
                charge.label()
            ))
            .into());
        }
        self.assignment_mut()?.extras.set_quantity(charge, quantity);
        self.refresh_quotation();
        Ok(())
    }

    pub fn set_night_shift(&mut self, selected: bool) -> Result<(), ApplicationError> {
        self.assignment_mut()?.extras.night_shift = selected;
        self.refresh_quotation();
        Ok(())
    }

    pub fn set_odometer(&mut self, reading: Option<Decimal>) -> Result<(), ApplicationError> {
        let assignment = self.assignment_mut()?;
        assignment.odometer = reading.map(round_km);
        apply_totals(assignment);
        Ok(())
    }

    /// Moves the crane. Estimates already requested for the old position become stale.
    pub fn set_crane_coords(&mut self, coords: &str) -> Result<(), ApplicationError> {
        self.assignment_mut()?.crane_coords = coords.trim().to_string();
        Ok(())
    }

    pub fn set_eta_minutes(&mut self, minutes: Option<u32>) -> Result<(), ApplicationError> {
        self.assignment_mut()?.eta_minutes = minutes;
        Ok(())
    }

    /// Free-text ETA such as `"1 h 20 min"`. Blank text clears the ETA.
    pub fn set_eta_text(&mut self, text: &str) -> Result<(), ApplicationError> {
        let minutes = if text.trim().is_empty() {
            None
        } else {
            Some(parse_eta_text(text).ok_or_else(|| {
                DomainError::InvalidInput(format!("`{}` is not a duration", text.trim()))
            })?)
        };
        self.set_eta_minutes(minutes)
    }

    /// Confirms unit and operator. From `Pending` this enters the status chain: the assignment
    /// and ETA instants are stamped and the quotation is frozen with the lock.
    pub async fn confirm_assignment(&mut self) -> Result<(), ApplicationError> {
        self.ensure_confirmable(ServiceStep::Assignment)?;
        if self.record.step < ServiceStep::Assignment {
            return Err(LifecycleError::StepNotConfirmed { step: ServiceStep::Report }.into());
        }
        let missing = missing_assignment_fields(&self.record);
        if !missing.is_empty() {
            return Err(LifecycleError::MissingRequiredFields {
                step: ServiceStep::Assignment,
                missing_fields: missing,
            }
            .into());
        }

        self.refresh_quotation();
        let now = self.desk.clock.now();
        if self.record.status == ServiceStatus::Pending {
            let outcome = self.engine.confirm_assignment(&self.record)?;
            self.record.status = outcome.to;
            if let Some(slot) = outcome.stamp {
                self.record.timestamps.stamp(slot, now);
            }
            let assignment = &self.record.assignment;
            let text = format!(
                "Assignment confirmed: unit {}, operator {}",
                assignment.unit, assignment.operator
            );
            self.append(LogDraft::text(LogKind::AssignmentConfirmed, text));
        }
        if let Some(minutes) = self.record.assignment.eta_minutes {
            let eta = now + Duration::minutes(i64::from(minutes));
            self.record.timestamps.stamp(TimestampSlot::Eta, eta);
        }

        self.close_window_for(ServiceStep::Assignment);
        self.record.lock_state.set(ServiceStep::Assignment, true);
        self.record.step = ServiceStep::Monitoring;
        self.view = ServiceStep::Monitoring;

        self.persist().await
    }

    // Logistics.

    pub fn logistics_request(&self) -> LogisticsRequest {
        LogisticsRequest::from_record(&self.record)
    }

    /// Applies an estimate computed for `request`. Nothing is written when the coordinates
    /// moved since the request or when the assignment is not editable. A transfer leg that
    /// could not be estimated leaves the previous transfer in place.
    pub fn apply_logistics(
        &mut self,
        request: &LogisticsRequest,
        estimate: LogisticsEstimate,
    ) -> Result<LogisticsApplied, ApplicationError> {
        if LogisticsRequest::from_record(&self.record) != *request {
            debug!(
                event_name = "maps.estimate_stale",
                folio = %self.record.folio,
                "discarding route estimate for outdated coordinates"
            );
            return Ok(LogisticsApplied::Stale);
        }
        if self.ensure_assignment_editable().is_err() {
            return Ok(LogisticsApplied::Locked);
        }

        if let Some(reason) = &estimate.transfer_unavailable {
            warn!(
                event_name = "maps.transfer_unavailable",
                folio = %self.record.folio,
                reason = %reason,
                "transfer leg unavailable, keeping previous transfer"
            );
        }
        let assignment = &mut self.record.assignment;
        assignment.approach = Some(estimate.approach);
        if estimate.transfer_unavailable.is_none() {
            assignment.transfer = estimate.transfer;
        }
        if assignment.eta_minutes.is_none() {
            assignment.eta_minutes = Some(estimate.approach.duration_min);
        }
        if let Some(transfer) = estimate.transfer {
            assignment.billable_distance = round_km(transfer.distance_km);
        }
        apply_totals(assignment);
        self.refresh_quotation();
        Ok(LogisticsApplied::Applied)
    }

    pub async fn refresh_logistics(
        &mut self,
        estimator: &dyn RouteEstimator,
    ) -> Result<LogisticsApplied, ApplicationError> {
        if self.ensure_assignment_editable().is_err() {
            return Ok(LogisticsApplied::Locked);
        }
        let request = self.logistics_request();
        match estimate_logistics(estimator, &request).await {
            Ok(estimate) => self.apply_logistics(&request, estimate),
            Err(ApplicationError::EstimationUnavailable(reason)) => {
                warn!(
                    event_name = "maps.estimate_unavailable",
                    folio = %self.record.folio,
                    reason = %reason,
                    "route estimate unavailable, keeping previous values"
                );
                Ok(LogisticsApplied::Skipped)
            }
            Err(other) => Err(other),
        }
    }

    // Status chain.

    /// The manual advance button: one status forward, stamping its instant.
    pub async fn advance_status(&mut self) -> Result<StatusOutcome, ApplicationError> {
        let outcome = self.engine.advance(self.record.status)?;
        self.apply_outcome(&outcome);
        self.append(LogDraft::text(
            LogKind::StatusChange,
            format!("Status changed: {} -> {}", outcome.from.label(), outcome.to.label()),
        ));
        self.persist().await?;
        Ok(outcome)
    }

    /// Closes a completed service. The record is read-only afterwards except for notes.
    pub async fn archive(&mut self) -> Result<StatusOutcome, ApplicationError> {
        if let Some(window) = &self.unlock {
            return Err(LockError::UnlockAlreadyPending { pending: window.step }.into());
        }
        let outcome = self.engine.archive(self.record.status)?;
        self.apply_outcome(&outcome);
        self.pending_unlock = None;
        self.append(LogDraft::text(
            LogKind::Archive,
            format!("Service archived with status {}", outcome.from.label()),
        ));
        info!(event_name = "service.archived", folio = %self.record.folio, "service archived");
        self.persist().await?;
        Ok(outcome)
    }

    fn apply_outcome(&mut self, outcome: &StatusOutcome) {
        self.record.status = outcome.to;
        if let Some(slot) = outcome.stamp {
            let now = self.desk.clock.now();
            self.record.timestamps.stamp(slot, now);
        }
    }

    /// Changes the step on screen. Viewing an earlier step never touches stored data.
    pub fn navigate(&mut self, target: ServiceStep) -> Result<ServiceStep, ApplicationError> {
        let step = self.engine.navigate(&self.record, target)?;
        self.view = step;
        Ok(step)
    }

    // Lock protocol.

    pub fn request_unlock(&mut self, step: ServiceStep) -> Result<UnlockPrompt, ApplicationError> {
        self.ensure_open()?;
        let prompt = crate::flows::lock::request_unlock(
            &self.record.lock_state,
            self.unlock.as_ref(),
            step,
        )?;
        self.pending_unlock = Some(step);
        Ok(prompt)
    }

    /// Unlocks the requested step with a justification and logs it.
    pub async fn confirm_unlock(&mut self, reason: &str) -> Result<(), ApplicationError> {
        self.ensure_open()?;
        let step = self.pending_unlock.ok_or(LockError::NoPendingUnlock)?;
        let snapshot = EditableSnapshot::capture(&self.record);
        let now = self.desk.clock.now();
        let window = open_unlock(
            &mut self.record.lock_state,
            self.unlock.as_ref(),
            step,
            reason,
            snapshot,
            now,
        )?;

        self.append(LogDraft::text(
            LogKind::Unlock,
            format!("Unlocked {step}: {}", window.reason),
        ));
        info!(
            event_name = "service.unlocked",
            folio = %self.record.folio,
            step = %step,
            actor = %self.actor.id,
            "step unlocked"
        );
        self.pending_unlock = None;
        self.unlock = Some(window);
        self.view = step;

        self.persist().await
    }

    pub fn cancel_unlock(&mut self) {
        self.pending_unlock = None;
    }

    // Notes. Allowed on closed services.

    /// Appends an entry. Plain text becomes a note by the session actor.
    pub async fn append_log(&mut self, draft: impl Into<LogDraft>) -> Result<(), ApplicationError> {
        self.append(draft.into());
        if self.persisted {
            self.persist().await?;
        }
        Ok(())
    }

    /// Returns false for blank text, which is not logged.
    pub async fn add_note(&mut self, text: &str) -> Result<bool, ApplicationError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        self.append_log(text).await?;
        Ok(true)
    }

    pub fn start_note(&mut self) {
        self.live_note = Some(LiveNote::start(self.desk.clock.now()));
    }

    /// Logs the note with its writing time. Returns false when nothing was logged.
    pub async fn finish_note(&mut self, text: &str) -> Result<bool, ApplicationError> {
        let Some(note) = self.live_note.take() else {
            return Ok(false);
        };
        match note.finish(text, self.desk.clock.now()) {
            Some(draft) => {
                self.append_log(draft).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn cancel_note(&mut self) {
        self.live_note = None;
    }

    // Internals.

    fn ensure_open(&self) -> Result<(), ApplicationError> {
        if self.record.is_closed() {
            return Err(LifecycleError::RecordClosed.into());
        }
        Ok(())
    }

    fn ensure_report_editable(&self) -> Result<(), ApplicationError> {
        self.ensure_open()?;
        ensure_editable(&self.record.lock_state, ServiceStep::Report)?;
        Ok(())
    }

    fn ensure_assignment_editable(&self) -> Result<(), ApplicationError> {
        self.ensure_open()?;
        if self.record.step < ServiceStep::Assignment {
            return Err(LifecycleError::StepNotConfirmed { step: ServiceStep::Report }.into());
        }
        ensure_editable(&self.record.lock_state, ServiceStep::Assignment)?;
        Ok(())
    }

    /// A step can be confirmed while its lock is open: before its first confirmation or
    /// inside an unlock window.
    fn ensure_confirmable(&self, step: ServiceStep) -> Result<(), ApplicationError> {
        self.ensure_open()?;
        ensure_editable(&self.record.lock_state, step)?;
        Ok(())
    }

    fn assignment_mut(&mut self) -> Result<&mut AssignmentFields, ApplicationError> {
        self.ensure_assignment_editable()?;
        Ok(&mut self.record.assignment)
    }

    /// Recomputes the quotation while the assignment is open. A locked assignment keeps the
    /// quotation it was confirmed with.
    fn refresh_quotation(&mut self) {
        if self.record.lock_state.assignment_locked {
            return;
        }
        let assignment = &self.record.assignment;
        let quotation = compute_quotation(QuotationInput {
            rate_card: self.rate_card.as_ref(),
            distance_mode: assignment.distance_mode,
            billable_distance_km: assignment.billable_distance,
            extras: &assignment.extras,
        });
        self.record.quotation = Some(quotation);
    }

    fn close_window_for(&mut self, step: ServiceStep) {
        if self.unlock.as_ref().map(|window| window.step) != Some(step) {
            return;
        }
        let Some(window) = self.unlock.take() else {
            return;
        };
        let current = EditableSnapshot::capture(&self.record);
        let changes = close_unlock(&mut self.record.lock_state, window, &current);
        if !changes.is_empty() {
            info!(
                event_name = "service.fields_edited",
                folio = %self.record.folio,
                step = %step,
                changed = changes.len(),
                "locked fields edited"
            );
            self.append(LogDraft::changes(changes));
        }
    }

    fn append(&mut self, draft: LogDraft) {
        let now = self.desk.clock.now();
        let entry = draft.stamp(self.actor.log_name(&self.desk.settings.system_actor), now);
        self.record.audit_log.append(entry);
    }

    /// Stores a new record. When another draft stored the reserved folio first, the record
    /// moves to the next free folio.
    async fn create_with_free_folio(&mut self) -> Result<(), ApplicationError> {
        let Err(error) = self.desk.store.create(&self.record).await else {
            return Ok(());
        };
        if self.desk.store.find_by_folio(self.record.folio).await?.is_none() {
            return Err(error);
        }
        let folio = self.desk.store.next_folio().await?;
        warn!(
            event_name = "service.folio_reassigned",
            reserved = %self.record.folio,
            folio = %folio,
            "reserved folio already stored, using the next free one"
        );
        self.record.folio = folio;
        self.desk.store.create(&self.record).await
    }

    async fn persist(&mut self) -> Result<(), ApplicationError> {
        let result = if self.persisted {
            self.desk.store.update(&self.record).await
        } else {
            self.create_with_free_folio().await
        };

        match result {
            Ok(()) => {
                self.persisted = true;
                Ok(())
            }
            Err(error) => {
                error!(
                    event_name = "service.persist_failed",
                    folio = %self.record.folio,
                    error = %error,
                    "store rejected service write"
                );
                Err(error)
            }
        }
    }
}
