//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Inclusive bounds accepted for the age answer during registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBounds {
    pub min: u8,
    pub max: u8,
}

impl AgeBounds {
    pub fn new(min: u8, max: u8) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidValue {
                key: "MATCHBOT_MIN_AGE".into(),
                message: format!("minimum age {min} is above maximum age {max}"),
            });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, age: i64) -> bool {
        age >= i64::from(self.min) && age <= i64::from(self.max)
    }
}

impl Default for AgeBounds {
    fn default() -> Self {
        Self { min: 18, max: 99 }
    }
}

/// Telegram transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    pub age_bounds: AgeBounds,
    /// Telegram is enabled only when a bot token is present.
    pub telegram: Option<TelegramConfig>,
    /// Whether to read events from stdin.
    pub cli_enabled: bool,
    /// Per-user worker tasks exit after this long without events.
    pub worker_idle_timeout: Duration,
    /// Directory for daily rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/matchbot.db"),
            age_bounds: AgeBounds::default(),
            telegram: None,
            cli_enabled: true,
            worker_idle_timeout: Duration::from_secs(600),
            log_dir: None,
        }
    }
}

impl BotConfig {
    /// Build the configuration from `MATCHBOT_*` and `TELEGRAM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let db_path = lookup("MATCHBOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let min_age = parse_var(&lookup, "MATCHBOT_MIN_AGE", defaults.age_bounds.min)?;
        let max_age = parse_var(&lookup, "MATCHBOT_MAX_AGE", defaults.age_bounds.max)?;
        let age_bounds = AgeBounds::new(min_age, max_age)?;

        let telegram = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(|token| TelegramConfig {
                bot_token: SecretString::from(token),
                allowed_users: lookup("TELEGRAM_ALLOWED_USERS")
                    .unwrap_or_else(|| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            });

        let cli_enabled = match lookup("MATCHBOT_CLI") {
            Some(v) => parse_bool("MATCHBOT_CLI", &v)?,
            None => telegram.is_none(),
        };

        let idle_secs: u64 = parse_var(
            &lookup,
            "MATCHBOT_IDLE_SECS",
            defaults.worker_idle_timeout.as_secs(),
        )?;
        if idle_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MATCHBOT_IDLE_SECS".into(),
                message: "idle timeout must be at least one second".into(),
            });
        }

        Ok(Self {
            db_path,
            age_bounds,
            telegram,
            cli_enabled,
            worker_idle_timeout: Duration::from_secs(idle_secs),
            log_dir: lookup("MATCHBOT_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
