use serde_json::json;
use towline_core::domain::service::{Folio, ServiceStep};
use towline_core::logistics::parse_eta_text;
use towline_core::ServiceSession;

use crate::commands::context::{
    application_failure, execute, operator, CommandContext, Failure, EXIT_VALIDATION,
};
use crate::commands::CommandResult;

pub struct ReassignArgs {
    pub folio: i64,
    pub reason: String,
    pub unit: Option<String>,
    pub operator: Option<String>,
    pub eta: Option<String>,
}

/// Changes requested for the assignment, checked before anything is unlocked.
#[derive(Debug, PartialEq, Eq)]
struct Reassignment {
    unit: Option<String>,
    operator: Option<String>,
    eta_minutes: Option<Option<u32>>,
}

impl Reassignment {
    fn validate(args: &ReassignArgs) -> Result<Self, Failure> {
        let named = |value: &Option<String>, field: &str| match value {
            Some(text) if text.trim().is_empty() => {
                Err(("validation", format!("{field} cannot be blank"), EXIT_VALIDATION))
            }
            other => Ok(other.as_ref().map(|text| text.trim().to_string())),
        };
        let eta_minutes = match args.eta.as_deref().map(str::trim) {
            None => None,
            Some("") => Some(None),
            Some(text) => match parse_eta_text(text) {
                Some(minutes) => Some(Some(minutes)),
                None => {
                    return Err((
                        "validation",
                        format!("`{text}` is not a duration"),
                        EXIT_VALIDATION,
                    ))
                }
            },
        };
        Ok(Self {
            unit: named(&args.unit, "unit")?,
            operator: named(&args.operator, "operator")?,
            eta_minutes,
        })
    }
}

/// Unlocks a confirmed assignment with a justification, applies the changes and locks it again.
/// Input is checked first so a rejected request leaves the stored lock untouched.
pub fn run(args: ReassignArgs, actor: &str) -> CommandResult {
    let actor = operator(actor);
    let folio = args.folio;
    let result = execute("reassign", |config| async move {
        let changes = Reassignment::validate(&args)?;
        let context = CommandContext::open(config).await?;
        let mut session = ServiceSession::resume(context.desk.clone(), actor, Folio(args.folio))
            .await
            .map_err(application_failure)?;

        if session.open_unlock().map(|window| window.step) != Some(ServiceStep::Assignment) {
            session.request_unlock(ServiceStep::Assignment).map_err(application_failure)?;
            session.confirm_unlock(&args.reason).await.map_err(application_failure)?;
        }
        if let Some(unit) = &changes.unit {
            session.set_unit(unit).map_err(application_failure)?;
        }
        if let Some(name) = &changes.operator {
            session.set_operator(name).map_err(application_failure)?;
        }
        if let Some(minutes) = changes.eta_minutes {
            session.set_eta_minutes(minutes).map_err(application_failure)?;
        }
        session.confirm_assignment().await.map_err(application_failure)?;

        let assignment = &session.record().assignment;
        let data = json!({
            "folio": args.folio,
            "unit": assignment.unit,
            "operator": assignment.operator,
            "eta_minutes": assignment.eta_minutes,
            "log_entries": session.record().audit_log.len(),
        });
        context.close().await;
        Ok(data)
    });

    match result {
        Ok(data) => {
            CommandResult::success_with_data("reassign", format!("service {folio} reassigned"), data)
        }
        Err(failure) => failure,
    }
}

#[cfg(test)]
mod tests {
    use super::{ReassignArgs, Reassignment};

    fn args(unit: Option<&str>, eta: Option<&str>) -> ReassignArgs {
        ReassignArgs {
            folio: 1000,
            reason: "Other".to_string(),
            unit: unit.map(str::to_string),
            operator: None,
            eta: eta.map(str::to_string),
        }
    }

    #[test]
    fn eta_text_is_parsed_before_unlocking() {
        let changes = Reassignment::validate(&args(Some(" Grúa 07 "), Some("1 h 10 min")))
            .expect("valid");
        assert_eq!(changes.unit.as_deref(), Some("Grúa 07"));
        assert_eq!(changes.eta_minutes, Some(Some(70)));

        let cleared = Reassignment::validate(&args(None, Some("  "))).expect("valid");
        assert_eq!(cleared.eta_minutes, Some(None));
    }

    #[test]
    fn unreadable_eta_and_blank_unit_are_rejected() {
        let (class, message, code) =
            Reassignment::validate(&args(None, Some("pronto"))).expect_err("bad eta");
        assert_eq!(class, "validation");
        assert_eq!(message, "`pronto` is not a duration");
        assert_eq!(code, 7);

        let (_, message, _) = Reassignment::validate(&args(Some(" "), None)).expect_err("blank");
        assert_eq!(message, "unit cannot be blank");
    }
}
