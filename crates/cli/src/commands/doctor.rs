//! Readiness report: configuration, map client, database and schema version.

use serde::Serialize;
use towline_core::config::{AppConfig, LoadOptions};
use towline_db::{connect_with_config, migrations};
use towline_maps::build_client;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, because: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped: {because}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = finalize(collect_checks());
    if !json_output {
        return render_human(&report);
    }
    serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
        serde_json::json!({
            "overall_status": "fail",
            "summary": "doctor report could not be serialized",
            "error": error.to_string(),
        })
        .to_string()
    })
}

fn collect_checks() -> Vec<DoctorCheck> {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail("config_validation", error.to_string())];
            checks.extend(
                ["maps_readiness", "database_connectivity", "schema_version"]
                    .into_iter()
                    .map(|name| DoctorCheck::skipped(name, "configuration is invalid")),
            );
            return checks;
        }
    };

    let mut checks = vec![
        DoctorCheck::pass("config_validation", "configuration is valid"),
        maps_check(&config),
    ];
    checks.extend(database_checks(&config));
    checks
}

fn finalize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let failing = checks.iter().filter(|check| check.status != CheckStatus::Pass).count();
    let (overall_status, summary) = if failing == 0 {
        (CheckStatus::Pass, "doctor: ready to dispatch".to_string())
    } else {
        (CheckStatus::Fail, format!("doctor: {failing} check(s) need attention"))
    };
    DoctorReport { overall_status, summary, checks }
}

fn maps_check(config: &AppConfig) -> DoctorCheck {
    let maps = &config.maps;
    if !maps.enabled {
        return DoctorCheck::pass(
            "maps_readiness",
            "map lookups disabled; route estimates and geocoding are skipped",
        );
    }
    match build_client(maps) {
        Ok(_) => DoctorCheck::pass(
            "maps_readiness",
            format!(
                "routing via `{}`, geocoding via `{}`, api key {}",
                maps.route_base_url,
                maps.geocode_base_url,
                if maps.api_key_configured() { "configured" } else { "not set" }
            ),
        ),
        Err(error) => DoctorCheck::fail("maps_readiness", format!("HTTP client unavailable: {error}")),
    }
}

fn database_checks(config: &AppConfig) -> [DoctorCheck; 2] {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return [
                DoctorCheck::fail("database_connectivity", format!("async runtime: {error}")),
                DoctorCheck::skipped("schema_version", "no async runtime"),
            ];
        }
    };

    let applied = runtime.block_on(async {
        let pool = connect_with_config(&config.database).await.map_err(|error| error.to_string())?;
        let applied = migrations::applied_count(&pool).await;
        pool.close().await;
        Ok::<i64, String>(applied)
    });

    match applied {
        Ok(applied) => [
            DoctorCheck::pass("database_connectivity", format!("connected to `{}`", config.database.url)),
            schema_check(applied, migrations::embedded_count()),
        ],
        Err(error) => [
            DoctorCheck::fail("database_connectivity", format!("cannot connect: {error}")),
            DoctorCheck::skipped("schema_version", "database is unreachable"),
        ],
    }
}

fn schema_check(applied: i64, embedded: i64) -> DoctorCheck {
    let details = format!("{applied} of {embedded} migrations applied");
    if applied >= embedded {
        DoctorCheck::pass("schema_version", details)
    } else {
        DoctorCheck::fail("schema_version", format!("{details}; run `towline migrate`"))
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut output = report.summary.clone();
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok  ",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "--  ",
        };
        output.push_str(&format!("\n  {marker} {:<22} {}", check.name, check.details));
    }
    output
}
