use serde_json::json;

use crate::commands::context::{execute, EXIT_DB_CONNECTIVITY, EXIT_MIGRATION};
use crate::commands::CommandResult;
use towline_db::fixtures::{DEMO_OPERATORS, DEMO_UNITS};
use towline_db::{connect_with_config, migrations, DemoDataset, SeedResult};

const EXIT_SEED: u8 = 6;

pub fn run() -> CommandResult {
    let result = execute("seed", |config| async move {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seed_result = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_SEED))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED))?;

        pool.close().await;
        if verification.all_present {
            Ok(seed_result)
        } else {
            Err(("seed_verification", verification_message(&verification.missing()), EXIT_SEED))
        }
    });

    match result {
        Ok(seeded) => CommandResult::success_with_data(
            "seed",
            seed_message(&seeded),
            json!({
                "clients_seeded": seeded.clients_seeded,
                "clients_kept": seeded.clients_kept,
                "units": DEMO_UNITS,
                "operators": DEMO_OPERATORS,
            }),
        ),
        Err(failure) => failure,
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    format!(
        "client catalogue ready: {} added, {} already present",
        seeded.clients_seeded.len(),
        seeded.clients_kept.len()
    )
}

fn verification_message(missing: &[&str]) -> String {
    if missing.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for clients: {}", missing.join(", "))
    }
}
