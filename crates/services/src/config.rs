use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::notifications::NotificationConfig;

pub const DEFAULT_DB_URL: &str = "sqlite://course_state.sqlite3";

pub const ENV_DB_URL: &str = "COURSE_DB_URL";
pub const ENV_API_BASE_URL: &str = "COURSE_API_BASE_URL";
pub const ENV_NOTIFY_CAPACITY: &str = "COURSE_NOTIFY_CAPACITY";
pub const ENV_NOTIFY_DURATION_MS: &str = "COURSE_NOTIFY_DURATION_MS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "COURSE_FETCH_TIMEOUT_SECS";

/// Runtime settings for the services layer.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub db_url: String,
    /// Base of the content API; also enables server-side progress sync.
    pub api_base_url: Option<Url>,
    pub notifications: NotificationConfig,
    /// Unset means the content fetch may wait indefinitely.
    pub fetch_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_url: DEFAULT_DB_URL.to_string(),
            api_base_url: None,
            notifications: NotificationConfig::default(),
            fetch_timeout: None,
        }
    }
}

impl AppConfig {
    /// Read settings from `COURSE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a set variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let mut config = Self::default();

        if let Some(db_url) = get(ENV_DB_URL) {
            config.db_url = db_url;
        }
        if let Some(raw) = get(ENV_API_BASE_URL) {
            config.api_base_url = Some(parse_url(ENV_API_BASE_URL, raw)?);
        }
        if let Some(raw) = get(ENV_NOTIFY_CAPACITY) {
            config.notifications.capacity = usize::try_from(parse_positive(ENV_NOTIFY_CAPACITY, raw)?)
                .unwrap_or(usize::MAX);
        }
        if let Some(raw) = get(ENV_NOTIFY_DURATION_MS) {
            config.notifications.display_duration =
                Duration::from_millis(parse_positive(ENV_NOTIFY_DURATION_MS, raw)?);
        }
        if let Some(raw) = get(ENV_FETCH_TIMEOUT_SECS) {
            config.fetch_timeout = Some(Duration::from_secs(parse_positive(
                ENV_FETCH_TIMEOUT_SECS,
                raw,
            )?));
        }
        Ok(config)
    }
}

/// Parse a URL for a named setting.
///
/// # Errors
///
/// Returns `ConfigError::InvalidUrl` for anything `Url` rejects.
pub fn parse_url(var: &'static str, raw: String) -> Result<Url, ConfigError> {
    Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl { var, raw })
}

fn parse_positive(var: &'static str, raw: String) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidNumber { var, raw }),
    }
}
