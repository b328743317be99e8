use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::DEFAULT_SYSTEM_ACTOR;
use crate::domain::service::DEFAULT_FOLIO_BASE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub maps: MapsConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MapsConfig {
    pub enabled: bool,
    pub route_base_url: String,
    pub geocode_base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub folio_base: i64,
    pub system_actor: String,
    pub eta_refresh_secs: u64,
    pub due_soon_minutes: i64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub maps_enabled: Option<bool>,
    pub maps_api_key: Option<String>,
    pub system_actor: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("`{path}` is not valid TOML: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("`${{{var}}}` is referenced in the config file but not set")]
    MissingEnvInterpolation { var: String },
    #[error("`${{` without a closing brace in the config file")]
    UnterminatedInterpolation,
    #[error("{key}=`{value}` cannot be parsed")]
    InvalidEnvOverride { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://towline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            maps: MapsConfig {
                enabled: false,
                route_base_url: "https://router.project-osrm.org".to_string(),
                geocode_base_url: "https://nominatim.openstreetmap.org".to_string(),
                api_key: None,
                timeout_secs: 10,
            },
            dispatch: DispatchConfig {
                folio_base: DEFAULT_FOLIO_BASE.0,
                system_actor: DEFAULT_SYSTEM_ACTOR.to_string(),
                eta_refresh_secs: 30,
                due_soon_minutes: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [Self::Compact, Self::Pretty, Self::Json]
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "logging.format `{}` is not one of compact|pretty|json",
                    value.trim()
                ))
            })
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl MapsConfig {
    pub fn api_key_configured(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

impl AppConfig {
    /// defaults < file < `TOWLINE_*` environment < programmatic overrides, then validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match locate_file(options.config_path.as_deref()) {
            Some(path) => config.merge_file(read_file(&path)?),
            None if options.require_file => {
                return Err(ConfigError::MissingConfigFile(
                    options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_FILE)),
                ));
            }
            None => {}
        }

        config.merge_env()?;
        config.merge_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, file: FileLayer) {
        if let Some(layer) = file.database {
            overwrite(&mut self.database.url, layer.url);
            overwrite(&mut self.database.max_connections, layer.max_connections);
            overwrite(&mut self.database.timeout_secs, layer.timeout_secs);
        }
        if let Some(layer) = file.maps {
            overwrite(&mut self.maps.enabled, layer.enabled);
            overwrite(&mut self.maps.route_base_url, layer.route_base_url);
            overwrite(&mut self.maps.geocode_base_url, layer.geocode_base_url);
            overwrite(&mut self.maps.timeout_secs, layer.timeout_secs);
            if layer.api_key.is_some() {
                self.maps.api_key = layer.api_key.map(SecretString::from);
            }
        }
        if let Some(layer) = file.dispatch {
            overwrite(&mut self.dispatch.folio_base, layer.folio_base);
            overwrite(&mut self.dispatch.system_actor, layer.system_actor);
            overwrite(&mut self.dispatch.eta_refresh_secs, layer.eta_refresh_secs);
            overwrite(&mut self.dispatch.due_soon_minutes, layer.due_soon_minutes);
        }
        if let Some(layer) = file.logging {
            overwrite(&mut self.logging.level, layer.level);
            overwrite(&mut self.logging.format, layer.format);
        }
    }

    fn merge_env(&mut self) -> Result<(), ConfigError> {
        overwrite(&mut self.database.url, env_text("TOWLINE_DATABASE_URL"));
        overwrite(
            &mut self.database.max_connections,
            env_parsed("TOWLINE_DATABASE_MAX_CONNECTIONS")?,
        );
        overwrite(&mut self.database.timeout_secs, env_parsed("TOWLINE_DATABASE_TIMEOUT_SECS")?);

        overwrite(&mut self.maps.enabled, env_parsed("TOWLINE_MAPS_ENABLED")?);
        overwrite(&mut self.maps.route_base_url, env_text("TOWLINE_MAPS_ROUTE_BASE_URL"));
        overwrite(&mut self.maps.geocode_base_url, env_text("TOWLINE_MAPS_GEOCODE_BASE_URL"));
        overwrite(&mut self.maps.timeout_secs, env_parsed("TOWLINE_MAPS_TIMEOUT_SECS")?);
        if let Some(key) = env_text("TOWLINE_MAPS_API_KEY") {
            self.maps.api_key = Some(SecretString::from(key));
        }

        overwrite(&mut self.dispatch.folio_base, env_parsed("TOWLINE_DISPATCH_FOLIO_BASE")?);
        overwrite(&mut self.dispatch.system_actor, env_text("TOWLINE_DISPATCH_SYSTEM_ACTOR"));
        overwrite(
            &mut self.dispatch.eta_refresh_secs,
            env_parsed("TOWLINE_DISPATCH_ETA_REFRESH_SECS")?,
        );
        overwrite(
            &mut self.dispatch.due_soon_minutes,
            env_parsed("TOWLINE_DISPATCH_DUE_SOON_MINUTES")?,
        );

        // The short spellings are accepted as aliases.
        let level = env_text("TOWLINE_LOGGING_LEVEL").or_else(|| env_text("TOWLINE_LOG_LEVEL"));
        overwrite(&mut self.logging.level, level);
        let format = env_text("TOWLINE_LOGGING_FORMAT").or_else(|| env_text("TOWLINE_LOG_FORMAT"));
        overwrite(&mut self.logging.format, format.map(|raw| raw.parse()).transpose()?);
        Ok(())
    }

    fn merge_overrides(&mut self, overrides: ConfigOverrides) {
        overwrite(&mut self.database.url, overrides.database_url);
        overwrite(&mut self.logging.level, overrides.log_level);
        overwrite(&mut self.logging.format, overrides.log_format);
        overwrite(&mut self.maps.enabled, overrides.maps_enabled);
        overwrite(&mut self.dispatch.system_actor, overrides.system_actor);
        if let Some(key) = overrides.maps_api_key {
            self.maps.api_key = Some(SecretString::from(key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let database = &self.database;
        let url = database.url.trim();
        require(
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
            "database.url must point at SQLite (`sqlite://path`, `sqlite::memory:` or `:memory:`)",
        )?;
        require(database.max_connections > 0, "database.max_connections must be at least 1")?;
        require(
            (1..=300).contains(&database.timeout_secs),
            "database.timeout_secs must be between 1 and 300",
        )?;

        let maps = &self.maps;
        require((1..=120).contains(&maps.timeout_secs), "maps.timeout_secs must be between 1 and 120")?;
        if maps.enabled {
            for (name, url) in [
                ("maps.route_base_url", &maps.route_base_url),
                ("maps.geocode_base_url", &maps.geocode_base_url),
            ] {
                require(
                    url.starts_with("http://") || url.starts_with("https://"),
                    format!("{name} must be an http(s) URL while maps are enabled"),
                )?;
            }
        }

        let dispatch = &self.dispatch;
        require(dispatch.folio_base > 0, "dispatch.folio_base must be positive")?;
        require(
            !dispatch.system_actor.trim().is_empty(),
            "dispatch.system_actor must not be blank",
        )?;
        require(dispatch.eta_refresh_secs > 0, "dispatch.eta_refresh_secs must be positive")?;
        require(dispatch.due_soon_minutes >= 0, "dispatch.due_soon_minutes must not be negative")?;

        require(
            LOG_LEVELS.contains(&self.logging.level.trim().to_ascii_lowercase().as_str()),
            "logging.level must be one of trace|debug|info|warn|error",
        )
    }
}

const DEFAULT_FILE: &str = "towline.toml";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn overwrite<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.into()))
    }
}

fn locate_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => [PathBuf::from(DEFAULT_FILE), Path::new("config").join(DEFAULT_FILE)]
            .into_iter()
            .find(|candidate| candidate.exists()),
    }
}

fn read_file(path: &Path) -> Result<FileLayer, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&expand_env_references(&raw)?)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` with the value of the environment variable `NAME`.
fn expand_env_references(input: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_string() })?;
        expanded.push_str(&value);
        rest = &after[end + 1..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}

fn env_text(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    env_text(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value: raw.clone(),
            })
        })
        .transpose()
}

/// Shape of `towline.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileLayer {
    database: Option<DatabaseLayer>,
    maps: Option<MapsLayer>,
    dispatch: Option<DispatchLayer>,
    logging: Option<LoggingLayer>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseLayer {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MapsLayer {
    enabled: Option<bool>,
    route_base_url: Option<String>,
    geocode_base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchLayer {
    folio_base: Option<i64>,
    system_actor: Option<String>,
    eta_refresh_secs: Option<u64>,
    due_soon_minutes: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingLayer {
    level: Option<String>,
    format: Option<LogFormat>,
}
