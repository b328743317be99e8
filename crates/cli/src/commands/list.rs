use serde_json::{json, Value};

use crate::commands::context::{application_failure, execute, CommandContext};
use crate::commands::view::board_row;
use crate::commands::CommandResult;

/// Dispatch board: summary counters plus every service, newest folio first.
pub fn run(include_closed: bool) -> CommandResult {
    let result = execute("list", |config| async move {
        let context = CommandContext::open(config).await?;
        let summary = context.desk.summary().await.map_err(application_failure)?;
        let records = context.desk.list().await.map_err(application_failure)?;

        let rows: Vec<Value> = records
            .iter()
            .filter(|record| include_closed || !record.is_closed())
            .map(|record| board_row(&context.desk, record))
            .collect();
        context.close().await;
        Ok((summary, rows))
    });

    match result {
        Ok((summary, rows)) => CommandResult::success_with_data(
            "list",
            format!("{} service(s) listed", rows.len()),
            json!({ "summary": summary, "services": rows }),
        ),
        Err(failure) => failure,
    }
}
