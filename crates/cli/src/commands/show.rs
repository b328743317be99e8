use towline_core::domain::service::Folio;
use towline_core::ServiceSession;

use crate::commands::context::{application_failure, execute, operator, CommandContext};
use crate::commands::view::service_detail;
use crate::commands::CommandResult;

pub fn run(folio: i64, actor: &str) -> CommandResult {
    let actor = operator(actor);
    let result = execute("show", |config| async move {
        let context = CommandContext::open(config).await?;
        let session = ServiceSession::resume(context.desk.clone(), actor, Folio(folio))
            .await
            .map_err(application_failure)?;
        let detail = service_detail(&session);
        context.close().await;
        Ok(detail)
    });

    match result {
        Ok(detail) => CommandResult::success_with_data("show", format!("service {folio}"), detail),
        Err(failure) => failure,
    }
}
