//! Lock/unlock protocol for confirmed steps.
//!
//! A confirmed step stays locked until an operator unlocks it with a justification. The
//! unlock captures a snapshot of the editable fields; relocking diffs against it. Only one
//! step may be unlocked at a time.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::{diff_snapshots, EditableSnapshot, FieldChange};
use crate::domain::service::{LockState, ServiceStep};

/// Reasons offered when an operator asks to unlock a step.
pub const UNLOCK_REASONS: [&str; 4] = [
    "Customer changed location",
    "Dispatch/client supplied wrong information",
    "Requested by dispatch/client",
    "Other",
];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("step {step} has no lock")]
    StepNotLockable { step: ServiceStep },
    #[error("step {step} is not locked")]
    StepNotLocked { step: ServiceStep },
    #[error("step {step} is locked; unlock it with a reason before editing")]
    StepLocked { step: ServiceStep },
    #[error("step {pending} is already unlocked; confirm it before unlocking another step")]
    UnlockAlreadyPending { pending: ServiceStep },
    #[error("no unlock has been requested")]
    NoPendingUnlock,
    #[error("an unlock reason is required")]
    EmptyReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnlockPrompt {
    pub step: ServiceStep,
    pub reasons: Vec<&'static str>,
}

/// An open unlock. Lives only for the editing session.
#[derive(Clone, Debug, PartialEq)]
pub struct UnlockWindow {
    pub step: ServiceStep,
    pub reason: String,
    pub opened_at: DateTime<Utc>,
    snapshot: EditableSnapshot,
}

impl UnlockWindow {
    pub fn snapshot(&self) -> &EditableSnapshot {
        &self.snapshot
    }
}

/// Fails if `step` cannot be edited right now.
pub fn ensure_editable(locks: &LockState, step: ServiceStep) -> Result<(), LockError> {
    match locks.is_locked(step) {
        Some(true) => Err(LockError::StepLocked { step }),
        Some(false) => Ok(()),
        None => Err(LockError::StepNotLockable { step }),
    }
}

pub fn request_unlock(
    locks: &LockState,
    open: Option<&UnlockWindow>,
    step: ServiceStep,
) -> Result<UnlockPrompt, LockError> {
    if let Some(window) = open {
        return Err(LockError::UnlockAlreadyPending { pending: window.step });
    }
    match locks.is_locked(step) {
        None => Err(LockError::StepNotLockable { step }),
        Some(false) => Err(LockError::StepNotLocked { step }),
        Some(true) => Ok(UnlockPrompt { step, reasons: UNLOCK_REASONS.to_vec() }),
    }
}

/// Clears the lock of `step` and records what the editable fields looked like beforehand.
pub fn open_unlock(
    locks: &mut LockState,
    open: Option<&UnlockWindow>,
    step: ServiceStep,
    reason: &str,
    snapshot: EditableSnapshot,
    now: DateTime<Utc>,
) -> Result<UnlockWindow, LockError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(LockError::EmptyReason);
    }
    request_unlock(locks, open, step)?;
    locks.set(step, false);
    Ok(UnlockWindow { step, reason: reason.to_string(), opened_at: now, snapshot })
}

/// Window for a step the store holds unlocked after its first confirmation, left behind by a
/// session that ended before relocking. The stored record is the baseline for the next diff.
pub fn resume_unlock(
    locks: &LockState,
    step: ServiceStep,
    reason: &str,
    snapshot: EditableSnapshot,
    opened_at: DateTime<Utc>,
) -> Option<UnlockWindow> {
    match locks.is_locked(step) {
        Some(false) => {
            Some(UnlockWindow { step, reason: reason.trim().to_string(), opened_at, snapshot })
        }
        _ => None,
    }
}

/// Relocks the window's step and returns the fields that changed while it was open.
pub fn close_unlock(
    locks: &mut LockState,
    window: UnlockWindow,
    current: &EditableSnapshot,
) -> Vec<FieldChange> {
    locks.set(window.step, true);
    diff_snapshots(&window.snapshot, current)
}
