use towline_core::domain::service::Folio;
use towline_core::ServiceSession;

use crate::commands::context::{
    application_failure, execute, operator, CommandContext, EXIT_VALIDATION,
};
use crate::commands::CommandResult;

/// Appends a free-text note. Notes are accepted on closed services too.
pub fn run(folio: i64, text: &str, actor: &str) -> CommandResult {
    let actor = operator(actor);
    let text = text.to_string();
    let result = execute("note", |config| async move {
        let context = CommandContext::open(config).await?;
        let mut session = ServiceSession::resume(context.desk.clone(), actor, Folio(folio))
            .await
            .map_err(application_failure)?;
        let added = session.add_note(&text).await.map_err(application_failure)?;
        let entries = session.record().audit_log.len();
        context.close().await;
        if added {
            Ok(entries)
        } else {
            Err(("validation", "note text is empty".to_string(), EXIT_VALIDATION))
        }
    });

    match result {
        Ok(entries) => CommandResult::success(
            "note",
            format!("note added to service {folio} ({entries} log entries)"),
        ),
        Err(failure) => failure,
    }
}
