use thiserror::Error;

use crate::domain::service::Folio;
use crate::flows::{LifecycleError, LockError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("service {0} not found")]
    ServiceNotFound(Folio),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("estimation unavailable: {0}")]
    EstimationUnavailable(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Validation failures the actor can fix by changing input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Domain(_))
    }
}

impl From<LifecycleError> for ApplicationError {
    fn from(value: LifecycleError) -> Self {
        Self::Domain(DomainError::Lifecycle(value))
    }
}

impl From<LockError> for ApplicationError {
    fn from(value: LockError) -> Self {
        Self::Domain(DomainError::Lock(value))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceErrorKind {
    BadRequest,
    ServiceUnavailable,
    Internal,
}

/// An [`ApplicationError`] as reported across a process boundary. `detail` is for logs;
/// callers show [`InterfaceError::user_message`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind:?} ({correlation_id}): {detail}")]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub detail: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            InterfaceErrorKind::BadRequest => "Check the captured data and try again.",
            InterfaceErrorKind::ServiceUnavailable => {
                "Dispatch storage or map lookups are unavailable right now. Retry shortly."
            }
            InterfaceErrorKind::Internal => "Towline is misconfigured; contact an administrator.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let kind = match &self {
            Self::Domain(_) => InterfaceErrorKind::BadRequest,
            Self::Persistence(_) | Self::EstimationUnavailable(_) => {
                InterfaceErrorKind::ServiceUnavailable
            }
            Self::Configuration(_) => InterfaceErrorKind::Internal,
        };
        InterfaceError { kind, detail: self.to_string(), correlation_id: correlation_id.into() }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::service::ServiceStep;
    use crate::errors::{ApplicationError, DomainError, InterfaceErrorKind};
    use crate::flows::{LifecycleError, LockError};

    #[test]
    fn missing_fields_become_bad_requests_naming_the_fields() {
        let interface = ApplicationError::from(LifecycleError::MissingRequiredFields {
            step: ServiceStep::Assignment,
            missing_fields: vec!["grua".to_owned()],
        })
        .into_interface("req-1");

        assert_eq!(interface.kind, InterfaceErrorKind::BadRequest);
        assert_eq!(interface.correlation_id, "req-1");
        assert!(interface.detail.contains("grua"));
        assert_eq!(interface.user_message(), "Check the captured data and try again.");
    }

    #[test]
    fn store_and_map_failures_are_retryable() {
        for error in [
            ApplicationError::Persistence("database is locked".to_owned()),
            ApplicationError::EstimationUnavailable("route status NoRoute".to_owned()),
        ] {
            assert!(!error.is_validation());
            assert_eq!(error.into_interface("req-2").kind, InterfaceErrorKind::ServiceUnavailable);
        }
    }

    #[test]
    fn configuration_failures_are_internal() {
        let interface =
            ApplicationError::Configuration("invalid maps url".to_owned()).into_interface("req-3");
        assert_eq!(interface.kind, InterfaceErrorKind::Internal);
        assert_eq!(interface.to_string(), "Internal (req-3): configuration failure: invalid maps url");
    }

    #[test]
    fn lock_errors_nest_under_domain() {
        let error = ApplicationError::from(LockError::NoPendingUnlock);
        assert_eq!(error, ApplicationError::Domain(DomainError::Lock(LockError::NoPendingUnlock)));
        assert!(error.is_validation());
    }
}
