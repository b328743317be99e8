use crate::commands::context::{execute, EXIT_DB_CONNECTIVITY, EXIT_MIGRATION};
use crate::commands::CommandResult;
use towline_db::{connect_with_config, migrations};

pub fn run() -> CommandResult {
    let result = execute("migrate", |config| async move {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;
        let before = migrations::applied_count(&pool).await;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        let after = migrations::applied_count(&pool).await;
        pool.close().await;
        Ok(after.saturating_sub(before))
    });

    match result {
        Ok(0) => CommandResult::success("migrate", "schema is up to date"),
        Ok(count) => {
            CommandResult::success("migrate", format!("applied {count} pending migration(s)"))
        }
        Err(failure) => failure,
    }
}
