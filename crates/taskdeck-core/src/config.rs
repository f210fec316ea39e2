use chrono::{FixedOffset, Offset, Utc};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TICK_MILLIS: u64 = 1_000; // alert tracker poll cadence
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60; // widest offset in use today

/// Top-level config (taskdeck.toml + TASKDECK_* env overrides).
///
/// Nested env keys use a double underscore: `TASKDECK_DATABASE__PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskdeckConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Alert engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Milliseconds between tracker ticks (default: 1000).
    /// Override with env var: TASKDECK_ALERTS__TICK_MILLIS=500
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// The single local timezone, as minutes east of UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            tick_millis: DEFAULT_TICK_MILLIS,
            utc_offset_minutes: 0,
        }
    }
}

impl AlertsConfig {
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_millis.max(1))
    }

    /// The configured local offset. Out-of-range values fall back to UTC.
    pub fn offset(&self) -> FixedOffset {
        let minutes = self.utc_offset_minutes;
        if minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            tracing::warn!(minutes, "utc offset out of range, using UTC");
            return utc();
        }
        FixedOffset::east_opt(minutes * 60).unwrap_or_else(utc)
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn default_tick_millis() -> u64 {
    DEFAULT_TICK_MILLIS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.taskdeck/taskdeck.db", home)
}

impl TaskdeckConfig {
    /// Load config from a TOML file with TASKDECK_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.taskdeck/taskdeck.toml
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::TaskdeckError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TASKDECK_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.taskdeck/taskdeck.toml", home)
}
