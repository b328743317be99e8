use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use towline_core::config::{AppConfig, LoadOptions};

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .maps
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "database.url",
            env_keys: &["TOWLINE_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_keys: &["TOWLINE_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_keys: &["TOWLINE_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "maps.enabled",
            env_keys: &["TOWLINE_MAPS_ENABLED"],
            value: config.maps.enabled.to_string(),
        },
        Field {
            key: "maps.route_base_url",
            env_keys: &["TOWLINE_MAPS_ROUTE_BASE_URL"],
            value: config.maps.route_base_url.clone(),
        },
        Field {
            key: "maps.geocode_base_url",
            env_keys: &["TOWLINE_MAPS_GEOCODE_BASE_URL"],
            value: config.maps.geocode_base_url.clone(),
        },
        Field { key: "maps.api_key", env_keys: &["TOWLINE_MAPS_API_KEY"], value: api_key },
        Field {
            key: "maps.timeout_secs",
            env_keys: &["TOWLINE_MAPS_TIMEOUT_SECS"],
            value: config.maps.timeout_secs.to_string(),
        },
        Field {
            key: "dispatch.folio_base",
            env_keys: &["TOWLINE_DISPATCH_FOLIO_BASE"],
            value: config.dispatch.folio_base.to_string(),
        },
        Field {
            key: "dispatch.system_actor",
            env_keys: &["TOWLINE_DISPATCH_SYSTEM_ACTOR"],
            value: config.dispatch.system_actor.clone(),
        },
        Field {
            key: "dispatch.eta_refresh_secs",
            env_keys: &["TOWLINE_DISPATCH_ETA_REFRESH_SECS"],
            value: config.dispatch.eta_refresh_secs.to_string(),
        },
        Field {
            key: "dispatch.due_soon_minutes",
            env_keys: &["TOWLINE_DISPATCH_DUE_SOON_MINUTES"],
            value: config.dispatch.due_soon_minutes.to_string(),
        },
        Field {
            key: "logging.level",
            env_keys: &["TOWLINE_LOGGING_LEVEL", "TOWLINE_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["TOWLINE_LOGGING_FORMAT", "TOWLINE_LOG_FORMAT"],
            value: config.logging.format.as_str().to_string(),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("towline.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/towline.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the last four characters of long keys so operators can tell keys apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 8 {
        return "<redacted>".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

#[cfg(test)]
mod tests {
    use towline_core::config::AppConfig;

    use super::{contains_path, effective_fields, redact_secret};

    #[test]
    fn secrets_never_render_in_full() {
        assert_eq!(redact_secret(""), "<empty>");
        assert_eq!(redact_secret("short"), "<redacted>");
        assert_eq!(redact_secret("pk.1234567890abcd"), "***abcd");
    }

    #[test]
    fn every_field_is_listed_once() {
        let fields = effective_fields(&AppConfig::default());
        let mut keys: Vec<&str> = fields.iter().map(|field| field.key).collect();
        let total = keys.len();
        keys.dedup();

        assert_eq!(keys.len(), total);
        assert_eq!(total, 14);
        let api_key = fields.iter().find(|field| field.key == "maps.api_key").expect("api key");
        assert_eq!(api_key.value, "<unset>");
    }

    #[test]
    fn dotted_paths_resolve_in_toml() {
        let doc: toml::Value = "[dispatch]\nfolio_base = 5000\n".parse().expect("toml");
        assert!(contains_path(&doc, "dispatch.folio_base"));
        assert!(!contains_path(&doc, "dispatch.system_actor"));
        assert!(!contains_path(&doc, "maps.enabled"));
    }
}
