//! Runtime configuration loaded from environment variables.
//!
//! - `TEAMSYNC_DB_PATH` - SQLite database file (default: platform data dir)
//! - `TEAMSYNC_USER_ID` - signed-in user for the `chat` and `ask` commands
//! - `TEAMSYNC_REQUEST_TIMEOUT_MS` - data-store budget per command (default: 10000)
//! - `TEAMSYNC_MIN_INTERVAL_MS` - minimum gap between messages (default: 1000)
//! - `TEAMSYNC_SESSION_TTL_MS` - idle time before an HTTP assistant session may
//!   be dropped (default: 1800000)
//!
//! - `TEAMSYNC_API_KEY` - require this key on HTTP requests (default: none)
//! - `TEAMSYNC_CORS_ORIGINS` - comma-separated allowed origins (default: any)
//! - `TEAMSYNC_RATE_LIMIT` - HTTP requests per minute per client once an API
//!   key is set (default: 100)

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::db::Database;

/// Limits applied by the assistant to every session.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub max_input_chars: usize,
    pub min_interval: Duration,
    pub request_timeout: Duration,
    /// Maximum rows shown by listing commands.
    pub list_limit: usize,
    pub session_idle_ttl: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 500,
            min_interval: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(10),
            list_limit: 10,
            session_idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_interval: env_millis("TEAMSYNC_MIN_INTERVAL_MS").unwrap_or(defaults.min_interval),
            request_timeout: env_millis("TEAMSYNC_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout),
            session_idle_ttl: env_millis("TEAMSYNC_SESSION_TTL_MS")
                .unwrap_or(defaults.session_idle_ttl),
            ..defaults
        }
    }
}

/// Settings for the HTTP API.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    pub api_key: Option<String>,
    /// `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
    /// Requests per minute per client; `None` disables limiting.
    pub requests_per_minute: Option<u32>,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("TEAMSYNC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        let cors_origins = std::env::var("TEAMSYNC_CORS_ORIGINS").ok().map(|s| {
            s.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        });

        // A local server without a key is not limited
        let requests_per_minute = api_key.as_ref().map(|_| {
            std::env::var("TEAMSYNC_RATE_LIMIT")
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(100)
        });

        Self {
            api_key,
            cors_origins,
            requests_per_minute,
        }
    }

    /// Open API for local use and tests.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with_request_limit(per_minute: u32) -> Self {
        Self {
            requests_per_minute: Some(per_minute),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` when no location could be determined; the assistant then runs
    /// unconfigured.
    pub database_path: Option<PathBuf>,
    pub user_id: Option<Uuid>,
    pub assistant: AssistantConfig,
    pub security: SecurityConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_path = std::env::var("TEAMSYNC_DB_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .or_else(Database::default_path);

        let user_id = std::env::var("TEAMSYNC_USER_ID").ok().and_then(|s| {
            Uuid::parse_str(s.trim())
                .map_err(|e| tracing::warn!("Ignoring invalid TEAMSYNC_USER_ID: {}", e))
                .ok()
        });

        Self {
            database_path,
            user_id,
            assistant: AssistantConfig::from_env(),
            security: SecurityConfig::from_env(),
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(e) => {
            tracing::warn!("Ignoring invalid {}={:?}: {}", name, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_defaults() {
        let config = AssistantConfig::default();
        assert_eq!(config.max_input_chars, 500);
        assert_eq!(config.min_interval, Duration::from_millis(1000));
        assert_eq!(config.list_limit, 10);
        assert_eq!(config.session_idle_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn disabled_security_is_open() {
        let config = SecurityConfig::disabled();
        assert!(config.api_key.is_none());
        assert!(config.cors_origins.is_none());
        assert!(config.requests_per_minute.is_none());
    }
}
