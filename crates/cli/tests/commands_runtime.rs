use std::env;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::thread;

use serde_json::Value;
use towline_cli::commands::estimate::EstimateArgs;
use towline_cli::commands::quote::QuoteArgs;
use towline_cli::commands::reassign::ReassignArgs;
use towline_cli::commands::{
    advance, archive, capture, estimate, list, migrate, note, quote, reassign, seed, show,
};

const CAPTURE_REQUEST: &str = r#"{
    "serviceType": "grua",
    "client": "particular",
    "report": {
        "vehiculo": "Sedan",
        "marca": "Nissan",
        "placas": "ABC-123",
        "motivoSolicitud": "Asistencia",
        "tipoFalla": "No enciende",
        "origen": {"calle": "Av. Juarez 10", "coords": "19.4326, -99.1332"},
        "destino": {"calle": "Taller Norte", "coords": "19.5000, -99.1500"}
    },
    "assignment": {
        "grua": "Grúa 01 - Plataforma",
        "operador": "Juan Pérez",
        "tiempoArribo": "45 min",
        "extras": {"maniobraBase": 1}
    }
}"#;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_database(|database_url| {
        with_env(&[("TOWLINE_DATABASE_URL", database_url)], || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");

            let again = parse_payload(&migrate::run().output);
            assert_eq!(again["message"], "schema is up to date");
        });
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("TOWLINE_DATABASE_URL", "postgres://dispatch")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent() {
    with_database(|database_url| {
        with_env(&[("TOWLINE_DATABASE_URL", database_url)], || {
            let first = seed::run();
            assert_eq!(first.exit_code, 0, "expected seed success");
            let payload = parse_payload(&first.output);
            assert_eq!(payload["data"]["clients_seeded"].as_array().map(Vec::len), Some(9));

            let second = seed::run();
            assert_eq!(second.exit_code, 0, "expected reseed success");
            let payload = parse_payload(&second.output);
            assert_eq!(payload["data"]["clients_seeded"].as_array().map(Vec::len), Some(0));
            assert_eq!(payload["data"]["clients_kept"].as_array().map(Vec::len), Some(9));
        });
    });
}

#[test]
fn captured_service_runs_through_the_status_chain() {
    with_database(|database_url| {
        with_env(&[("TOWLINE_DATABASE_URL", database_url)], || {
            assert_eq!(seed::run().exit_code, 0);
            let request = write_request(database_url, CAPTURE_REQUEST);

            let captured = capture::run(request, "Ana");
            assert_eq!(captured.exit_code, 0, "capture failed: {}", captured.output);
            let payload = parse_payload(&captured.output);
            assert_eq!(payload["data"]["summary"]["folio"], 1001);
            assert_eq!(payload["data"]["summary"]["status"], "assigned");
            assert_eq!(payload["data"]["summary"]["client"], "Particular");

            for expected in ["on_site", "contacted", "in_transit", "completed"] {
                let advanced = advance::run(1001, "Ana");
                assert_eq!(advanced.exit_code, 0, "advance failed: {}", advanced.output);
                assert_eq!(parse_payload(&advanced.output)["data"]["to"], expected);
            }

            let noted = note::run(1001, "Cliente satisfecho", "Ana");
            assert_eq!(noted.exit_code, 0);

            let archived = archive::run(1001, "Ana");
            assert_eq!(archived.exit_code, 0, "archive failed: {}", archived.output);
            assert_eq!(parse_payload(&archived.output)["data"]["to"], "closed");

            let shown = parse_payload(&show::run(1001, "Ana").output);
            assert_eq!(shown["data"]["summary"]["status"], "closed");
            let log = shown["data"]["log"].as_array().expect("rendered log");
            assert!(log.len() >= 8, "expected capture, assignment, statuses, note and archive");

            let open_board = parse_payload(&list::run(false).output);
            assert_eq!(open_board["data"]["services"].as_array().map(Vec::len), Some(0));
            let full_board = parse_payload(&list::run(true).output);
            assert_eq!(full_board["data"]["services"].as_array().map(Vec::len), Some(1));
            assert_eq!(full_board["data"]["summary"]["closed"], 1);
        });
    });
}

#[test]
fn reassignment_unlocks_and_relocks_the_assignment() {
    with_database(|database_url| {
        with_env(&[("TOWLINE_DATABASE_URL", database_url)], || {
            assert_eq!(seed::run().exit_code, 0);
            let request = write_request(database_url, CAPTURE_REQUEST);
            assert_eq!(capture::run(request, "Ana").exit_code, 0);

            let result = reassign::run(
                ReassignArgs {
                    folio: 1001,
                    reason: "Unidad averiada".to_string(),
                    unit: Some("Grúa 02 - Arrastre".to_string()),
                    operator: None,
                    eta: Some("1 h 10 min".to_string()),
                },
                "Ana",
            );
            assert_eq!(result.exit_code, 0, "reassign failed: {}", result.output);
            let payload = parse_payload(&result.output);
            assert_eq!(payload["data"]["unit"], "Grúa 02 - Arrastre");
            assert_eq!(payload["data"]["operator"], "Juan Pérez");
            assert_eq!(payload["data"]["eta_minutes"], 70);

            let missing_reason = reassign::run(
                ReassignArgs {
                    folio: 1001,
                    reason: "   ".to_string(),
                    unit: None,
                    operator: None,
                    eta: None,
                },
                "Ana",
            );
            assert_eq!(missing_reason.exit_code, 7);
            assert_eq!(parse_payload(&missing_reason.output)["error_class"], "validation");
        });
    });
}

#[test]
fn rejected_reassignment_leaves_the_assignment_locked() {
    with_database(|database_url| {
        with_env(&[("TOWLINE_DATABASE_URL", database_url)], || {
            let request = write_request(database_url, CAPTURE_REQUEST);
            assert_eq!(capture::run(request, "Ana").exit_code, 0);
            let before = parse_payload(&show::run(1001, "Ana").output);
            let entries_before = before["data"]["log"].as_array().map(Vec::len);

            let rejected = reassign::run(
                ReassignArgs {
                    folio: 1001,
                    reason: "Unidad averiada".to_string(),
                    unit: Some("Grúa 02 - Arrastre".to_string()),
                    operator: None,
                    eta: Some("pronto".to_string()),
                },
                "Ana",
            );
            assert_eq!(rejected.exit_code, 7);
            assert_eq!(parse_payload(&rejected.output)["message"], "`pronto` is not a duration");

            let after = parse_payload(&show::run(1001, "Ana").output);
            assert_eq!(after["data"]["record"]["lockState"]["assignmentLocked"], true);
            assert_eq!(after["data"]["log"].as_array().map(Vec::len), entries_before);

            let retried = reassign::run(
                ReassignArgs {
                    folio: 1001,
                    reason: "Unidad averiada".to_string(),
                    unit: Some("Grúa 02 - Arrastre".to_string()),
                    operator: None,
                    eta: None,
                },
                "Ana",
            );
            assert_eq!(retried.exit_code, 0, "retry failed: {}", retried.output);
            assert_eq!(parse_payload(&retried.output)["data"]["unit"], "Grúa 02 - Arrastre");
        });
    });
}

#[test]
fn lifecycle_errors_are_validation_failures() {
    with_database(|database_url| {
        with_env(&[("TOWLINE_DATABASE_URL", database_url)], || {
            let missing = advance::run(4242, "Ana");
            assert_eq!(missing.exit_code, 7);
            assert_eq!(parse_payload(&missing.output)["message"], "service 4242 not found");

            let request = write_request(database_url, CAPTURE_REQUEST);
            assert_eq!(capture::run(request, "Ana").exit_code, 0);
            let early_archive = archive::run(1001, "Ana");
            assert_eq!(early_archive.exit_code, 7);

            let blank_note = note::run(1001, "  ", "Ana");
            assert_eq!(blank_note.exit_code, 7);
            assert_eq!(parse_payload(&blank_note.output)["message"], "note text is empty");
        });
    });
}

#[test]
fn quote_prices_stored_clients_and_zeroes_unknown_ones() {
    with_database(|database_url| {
        with_env(&[("TOWLINE_DATABASE_URL", database_url)], || {
            assert_eq!(seed::run().exit_code, 0);
            let priced = quote::run(QuoteArgs {
                client: "ike-asistencia".to_string(),
                mode: "foraneo".to_string(),
                km: "42".to_string(),
                extras: vec!["maniobraBase=1".to_string()],
                night_shift: true,
            });
            assert_eq!(priced.exit_code, 0, "quote failed: {}", priced.output);
            let payload = parse_payload(&priced.output);
            assert!(payload["message"].as_str().is_some_and(|m| m.starts_with("quoted")));

            let unknown = quote::run(QuoteArgs {
                client: "taller-sin-convenio".to_string(),
                mode: "local".to_string(),
                km: "0".to_string(),
                extras: Vec::new(),
                night_shift: false,
            });
            assert_eq!(unknown.exit_code, 0);
            let payload = parse_payload(&unknown.output);
            assert_eq!(payload["data"]["quotation"]["breakdown"].as_array().map(Vec::len), Some(0));
            assert!(payload["message"].as_str().is_some_and(|m| m.contains("no rate card")));

            let bad_mode = quote::run(QuoteArgs {
                client: "ike-asistencia".to_string(),
                mode: "orbital".to_string(),
                km: "1".to_string(),
                extras: Vec::new(),
                night_shift: false,
            });
            assert_eq!(bad_mode.exit_code, 10);
        });
    });
}

#[test]
fn estimate_reports_unavailable_when_maps_are_disabled() {
    with_env(&[("TOWLINE_MAPS_ENABLED", "false")], || {
        let result = estimate::run(EstimateArgs {
            crane: "19.40, -99.10".to_string(),
            origin: "19.4326, -99.1332".to_string(),
            destination: None,
            odometer: Some("1500".to_string()),
        });
        assert_eq!(result.exit_code, 9);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "estimate");
        assert_eq!(payload["error_class"], "estimation_unavailable");
    });
}

#[test]
fn estimate_keeps_the_approach_when_the_destination_is_unusable() {
    let router = serve_routes(vec![APPROACH_ROUTE]);
    let maps = [("TOWLINE_MAPS_ENABLED", "true"), ("TOWLINE_MAPS_ROUTE_BASE_URL", router.as_str())];
    with_env(&maps, || {
        let result = estimate::run(EstimateArgs {
            crane: "19.40, -99.10".to_string(),
            origin: "19.4326, -99.1332".to_string(),
            destination: Some("pendiente".to_string()),
            odometer: None,
        });
        assert_eq!(result.exit_code, 0, "estimate failed: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["approach"]["durationMin"], 17);
        assert!(payload["data"]["transfer"].is_null());
        let reason = payload["data"]["transfer_unavailable"].as_str().unwrap_or_default();
        assert!(reason.contains("destination"), "unexpected reason: {reason}");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("transfer leg unavailable")));
    });
}

#[test]
fn estimate_keeps_the_approach_when_the_transfer_has_no_route() {
    let router = serve_routes(vec![APPROACH_ROUTE, NO_ROUTE]);
    let maps = [("TOWLINE_MAPS_ENABLED", "true"), ("TOWLINE_MAPS_ROUTE_BASE_URL", router.as_str())];
    with_env(&maps, || {
        let result = estimate::run(EstimateArgs {
            crane: "19.40, -99.10".to_string(),
            origin: "19.4326, -99.1332".to_string(),
            destination: Some("19.5000, -99.1500".to_string()),
            odometer: Some("1000".to_string()),
        });
        assert_eq!(result.exit_code, 0, "estimate failed: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["approach"]["durationMin"], 17);
        assert!(payload["data"]["transfer"].is_null());
        let reason = payload["data"]["transfer_unavailable"].as_str().unwrap_or_default();
        assert!(reason.contains("NoRoute"), "unexpected reason: {reason}");
    });
}

const APPROACH_ROUTE: &str = r#"{"code":"Ok","routes":[{"distance":8400.0,"duration":1020.0}]}"#;
const NO_ROUTE: &str = r#"{"code":"NoRoute","message":"Impossible route","routes":[]}"#;

/// Answers one request per body, in order, then stops listening.
fn serve_routes(bodies: Vec<&'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind router");
    let address = listener.local_addr().expect("router address");
    thread::spawn(move || {
        for body in bodies {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = Vec::new();
            let mut chunk = [0_u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => request.extend_from_slice(&chunk[..read]),
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{address}")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn write_request(database_url: &str, body: &str) -> std::path::PathBuf {
    let directory = database_url.trim_start_matches("sqlite://");
    let path = Path::new(directory).with_file_name("capture.json");
    fs::write(&path, body).expect("write capture request");
    path
}

fn with_database(test_fn: impl FnOnce(&str)) {
    let directory = tempfile::tempdir().expect("temp dir");
    let database_url = format!("sqlite://{}", directory.path().join("towline.db").display());
    test_fn(&database_url);
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TOWLINE_DATABASE_URL",
        "TOWLINE_DATABASE_MAX_CONNECTIONS",
        "TOWLINE_DATABASE_TIMEOUT_SECS",
        "TOWLINE_MAPS_ENABLED",
        "TOWLINE_MAPS_ROUTE_BASE_URL",
        "TOWLINE_MAPS_GEOCODE_BASE_URL",
        "TOWLINE_MAPS_API_KEY",
        "TOWLINE_MAPS_TIMEOUT_SECS",
        "TOWLINE_DISPATCH_FOLIO_BASE",
        "TOWLINE_DISPATCH_SYSTEM_ACTOR",
        "TOWLINE_DISPATCH_ETA_REFRESH_SECS",
        "TOWLINE_DISPATCH_DUE_SOON_MINUTES",
        "TOWLINE_LOGGING_LEVEL",
        "TOWLINE_LOGGING_FORMAT",
        "TOWLINE_LOG_LEVEL",
        "TOWLINE_LOG_FORMAT",
        "HTTP_PROXY",
        "HTTPS_PROXY",
        "ALL_PROXY",
        "http_proxy",
        "https_proxy",
        "all_proxy",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
