//! Shared bootstrap for commands that touch the dispatch database.

use std::future::Future;
use std::sync::Arc;

use towline_core::config::{AppConfig, LoadOptions};
use towline_core::domain::actor::{Actor, Role, ALL_PERMISSION};
use towline_core::domain::service::Folio;
use towline_core::errors::ApplicationError;
use towline_core::{ServiceDesk, SystemClock};
use towline_db::{connect_with_config, migrations, DbPool, SqlClientRepository, SqlServiceRepository};
use towline_maps::MapServices;
use tracing::debug;
use uuid::Uuid;

use crate::commands::CommandResult;

/// Error class, message and exit code of a failed command.
pub type Failure = (&'static str, String, u8);

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_VALIDATION: u8 = 7;
pub const EXIT_PERSISTENCE: u8 = 8;
pub const EXIT_ESTIMATION: u8 = 9;
pub const EXIT_INPUT: u8 = 10;

pub struct CommandContext {
    pub config: AppConfig,
    pub pool: DbPool,
    pub desk: ServiceDesk,
    pub clients: Arc<SqlClientRepository>,
    pub maps: MapServices,
}

impl CommandContext {
    pub async fn open(config: AppConfig) -> Result<Self, Failure> {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let maps = MapServices::from_config(&config.maps)
            .map_err(|error| ("config_validation", error.to_string(), EXIT_CONFIG))?;
        let clients = Arc::new(SqlClientRepository::new(pool.clone()));
        let store =
            Arc::new(SqlServiceRepository::new(pool.clone(), Folio(config.dispatch.folio_base)));
        let desk =
            ServiceDesk::new(store, clients.clone(), Arc::new(SystemClock), config.dispatch.clone());

        debug!(
            event_name = "cli.context_opened",
            database_url = %config.database.url,
            maps_enabled = config.maps.enabled,
            "command context ready"
        );
        Ok(Self { config, pool, desk, clients, maps })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Loads configuration, builds a runtime and drives `body` to completion.
pub fn execute<T, F, Fut>(command: &'static str, body: F) -> Result<T, CommandResult>
where
    F: FnOnce(AppConfig) -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        })?;

    runtime.block_on(body(config)).map_err(|(error_class, message, exit_code)| {
        CommandResult::failure(command, error_class, message, exit_code)
    })
}

pub fn application_failure(error: ApplicationError) -> Failure {
    let (class, exit_code) = match &error {
        ApplicationError::Domain(_) => ("validation", EXIT_VALIDATION),
        ApplicationError::Persistence(_) => ("persistence", EXIT_PERSISTENCE),
        ApplicationError::EstimationUnavailable(_) => ("estimation_unavailable", EXIT_ESTIMATION),
        ApplicationError::Configuration(_) => ("config_validation", EXIT_CONFIG),
    };
    let message = error.to_string();
    let interface = error.into_interface(Uuid::new_v4().to_string());
    debug!(
        event_name = "cli.command_failed",
        correlation_id = %interface.correlation_id,
        kind = ?interface.kind,
        detail = %interface.detail,
        "command failed"
    );
    (class, message, exit_code)
}

pub fn input_failure(message: impl Into<String>) -> Failure {
    ("invalid_input", message.into(), EXIT_INPUT)
}

/// The operator running the CLI. Operators may dispatch every service type.
pub fn operator(name: &str) -> Actor {
    Actor::new(name, name, Role::CompanyAdmin, vec![ALL_PERMISSION.to_string()])
}
