use serde_json::json;
use towline_core::domain::service::Folio;
use towline_core::ServiceSession;

use crate::commands::context::{application_failure, execute, operator, CommandContext};
use crate::commands::CommandResult;

/// Moves a service one status forward, stamping the instant the new status owns.
pub fn run(folio: i64, actor: &str) -> CommandResult {
    let actor = operator(actor);
    let result = execute("advance", |config| async move {
        let context = CommandContext::open(config).await?;
        let mut session = ServiceSession::resume(context.desk.clone(), actor, Folio(folio))
            .await
            .map_err(application_failure)?;
        let outcome = session.advance_status().await.map_err(application_failure)?;
        context.close().await;
        Ok(outcome)
    });

    match result {
        Ok(outcome) => CommandResult::success_with_data(
            "advance",
            format!(
                "service {folio}: {} -> {}",
                outcome.from.label(),
                outcome.to.label()
            ),
            json!({ "folio": folio, "from": outcome.from.as_str(), "to": outcome.to.as_str() }),
        ),
        Err(failure) => failure,
    }
}
