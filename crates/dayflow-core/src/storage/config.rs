//! TOML-based application configuration.
//!
//! Stores:
//! - The working-day window (timezone, day start/end, block alert lead)
//! - Calendar provider endpoints and OAuth client credentials
//! - User directory endpoint
//!
//! Configuration is stored at `~/.config/dayflow/config.toml`.

use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::clock::DayWindow;
use crate::error::ConfigError;

/// Working-day configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayConfig {
    /// IANA timezone every day boundary is anchored to.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Local `HH:MM` the working day starts (morning planning fires here).
    #[serde(default = "default_day_start")]
    pub start: String,
    /// Local `HH:MM` the working day ends (nightly review fires here).
    #[serde(default = "default_day_end")]
    pub end: String,
    #[serde(default = "default_block_alert_lead")]
    pub block_alert_lead_minutes: u32,
}

/// Calendar provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Web editor the user is sent to when changing plans.
    #[serde(default = "default_editor_url")]
    pub editor_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_event_limit")]
    pub event_limit: u32,
}

/// User directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub base_url: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/dayflow/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub day: DayConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

// Default functions
fn default_timezone() -> String {
    "America/New_York".into()
}
fn default_day_start() -> String {
    "07:00".into()
}
fn default_day_end() -> String {
    "22:00".into()
}
fn default_block_alert_lead() -> u32 {
    10
}
fn default_api_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".into()
}
fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}
fn default_editor_url() -> String {
    "https://calendar.google.com/calendar/r".into()
}
fn default_event_limit() -> u32 {
    150
}
fn default_directory_url() -> String {
    "http://localhost:8000".into()
}

impl Default for DayConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            start: default_day_start(),
            end: default_day_end(),
            block_alert_lead_minutes: default_block_alert_lead(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_url: default_token_url(),
            editor_url: default_editor_url(),
            client_id: String::new(),
            client_secret: String::new(),
            event_limit: default_event_limit(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_directory_url(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot set a whole section".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(err) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting it.
    ///
    /// The resulting configuration must still resolve to a valid day window.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        updated.day_window()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and persist it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Resolve the timezone and day bounds.
    pub fn day_window(&self) -> Result<DayWindow, ConfigError> {
        let tz: Tz = self
            .day
            .timezone
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "day.timezone".into(),
                message: format!("{e}"),
            })?;
        let start = parse_clock_time("day.start", &self.day.start)?;
        let end = parse_clock_time("day.end", &self.day.end)?;
        if end <= start {
            return Err(ConfigError::InvalidValue {
                key: "day.end".into(),
                message: format!("must be after day.start ({})", self.day.start),
            });
        }
        Ok(DayWindow::new(tz, start, end))
    }

    /// Apply environment overrides for secrets and endpoints.
    ///
    /// `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET` and `DAYFLOW_API_BASE_URL`
    /// win over the file when set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        if let Some(id) = env("GOOGLE_CLIENT_ID") {
            self.calendar.client_id = id;
        }
        if let Some(secret) = env("GOOGLE_CLIENT_SECRET") {
            self.calendar.client_secret = secret;
        }
        if let Some(url) = env("DAYFLOW_API_BASE_URL") {
            self.directory.base_url = url;
        }
        self
    }
}

fn parse_clock_time(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| ConfigError::InvalidValue {
        key: key.into(),
        message: format!("expected HH:MM, got '{value}' ({e})"),
    })
}
