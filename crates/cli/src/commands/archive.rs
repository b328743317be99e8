use serde_json::json;
use towline_core::domain::service::Folio;
use towline_core::ServiceSession;

use crate::commands::context::{application_failure, execute, operator, CommandContext};
use crate::commands::CommandResult;

pub fn run(folio: i64, actor: &str) -> CommandResult {
    let actor = operator(actor);
    let result = execute("archive", |config| async move {
        let context = CommandContext::open(config).await?;
        let mut session = ServiceSession::resume(context.desk.clone(), actor, Folio(folio))
            .await
            .map_err(application_failure)?;
        let outcome = session.archive().await.map_err(application_failure)?;
        context.close().await;
        Ok(outcome)
    });

    match result {
        Ok(outcome) => CommandResult::success_with_data(
            "archive",
            format!("service {folio} closed"),
            json!({ "folio": folio, "from": outcome.from.as_str(), "to": outcome.to.as_str() }),
        ),
        Err(failure) => failure,
    }
}
