//! Application-level configuration loading: listening port, CORS origin and session timings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ROOMS_CONFIG_PATH";
/// Environment variable that overrides the allowed CORS origin.
const CORS_ORIGIN_ENV: &str = "CORS_ORIGIN";

const DEFAULT_PORT: u16 = 3001;
/// Time limit applied to questions that do not carry their own.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 20;
const DEFAULT_ENDED_ROOM_TTL_SECS: u64 = 600;
const DEFAULT_WAITING_ROOM_TTL_SECS: u64 = 3600;
const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// TCP port the HTTP/WebSocket server listens on.
    pub port: u16,
    /// Single allowed CORS origin; `None` means permissive CORS.
    pub cors_origin: Option<String>,
    /// Countdown used for questions without an explicit time limit.
    pub default_time_limit: Duration,
    /// How long an ended room stays in the registry before eviction.
    pub ended_room_ttl: Duration,
    /// How long a room may sit in the lobby without being started.
    pub waiting_room_ttl: Duration,
    /// Period of the eviction sweep.
    pub janitor_interval: Duration,
}

impl AppConfig {
    /// Load the configuration from disk, then apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let base = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration file");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        base.with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply `PORT`/`SERVER_PORT` and `CORS_ORIGIN` on top of the file values.
    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup("PORT")
            .or_else(|| lookup("SERVER_PORT"))
            .and_then(|value| value.parse::<u16>().ok())
        {
            self.port = port;
        }

        if let Some(origin) = lookup(CORS_ORIGIN_ENV).filter(|value| !value.trim().is_empty()) {
            self.cors_origin = Some(origin);
        }

        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cors_origin: None,
            default_time_limit: Duration::from_secs(DEFAULT_TIME_LIMIT_SECS),
            ended_room_ttl: Duration::from_secs(DEFAULT_ENDED_ROOM_TTL_SECS),
            waiting_room_ttl: Duration::from_secs(DEFAULT_WAITING_ROOM_TTL_SECS),
            janitor_interval: Duration::from_secs(DEFAULT_JANITOR_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: Option<u16>,
    cors_origin: Option<String>,
    default_time_limit_seconds: Option<u64>,
    ended_room_ttl_seconds: Option<u64>,
    waiting_room_ttl_seconds: Option<u64>,
    janitor_interval_seconds: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            port: value.port.unwrap_or(defaults.port),
            cors_origin: value.cors_origin.or(defaults.cors_origin),
            default_time_limit: value
                .default_time_limit_seconds
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_time_limit),
            ended_room_ttl: value
                .ended_room_ttl_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.ended_room_ttl),
            waiting_room_ttl: value
                .waiting_room_ttl_seconds
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.waiting_room_ttl),
            janitor_interval: value
                .janitor_interval_seconds
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.janitor_interval),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
