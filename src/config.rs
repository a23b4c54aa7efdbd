//! Application-level configuration loading, including the engine tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::{buzzer::RaceLabels, room::RoomConfig};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POTLUCK_BACK_CONFIG_PATH";
/// Environment variable that overrides the data directory.
const DATA_DIR_ENV: &str = "DATA_DIR";
const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Directory holding the persisted snapshot.
    pub data_dir: PathBuf,
    /// Tokens granted to a new team.
    pub starting_tokens: u32,
    /// Jokers granted to a new team.
    pub starting_jokers: u32,
    /// Answer window opened by the first buzz.
    pub answer_window: Duration,
    /// Quiet period before a snapshot is written.
    pub persist_debounce: Duration,
    /// Period of the background scheduler tick.
    pub tick_interval: Duration,
    /// Post-expiry window in which submissions are still accepted.
    pub grace_window: Duration,
    /// Deduplication window for client action ids.
    pub idempotency_window: Duration,
    /// Label pair drawn in each round of the race category.
    pub race_labels: Vec<RaceLabels>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        race_labels = app_config.race_labels.len(),
                        "loaded configuration"
                    );
                    app_config
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

        if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        config
    }

    /// Engine tunables for a game room.
    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            starting_tokens: self.starting_tokens,
            starting_jokers: self.starting_jokers,
            answer_window_ms: self.answer_window.as_millis() as u64,
            grace_window_ms: self.grace_window.as_millis() as u64,
            idempotency_window_ms: self.idempotency_window.as_millis() as u64,
            race_labels: self.race_labels.clone(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
///
/// Every field is optional; missing ones take the built-in default.
struct RawConfig {
    data_dir: Option<PathBuf>,
    starting_tokens: Option<u32>,
    starting_jokers: Option<u32>,
    answer_window_secs: Option<u64>,
    persist_debounce_ms: Option<u64>,
    tick_interval_ms: Option<u64>,
    grace_window_ms: Option<u64>,
    idempotency_window_ms: Option<u64>,
    race_labels: Option<Vec<RaceLabels>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            data_dir: value
                .data_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            starting_tokens: value.starting_tokens.unwrap_or(20),
            starting_jokers: value.starting_jokers.unwrap_or(1),
            answer_window: Duration::from_secs(value.answer_window_secs.unwrap_or(45).max(1)),
            persist_debounce: Duration::from_millis(value.persist_debounce_ms.unwrap_or(600)),
            tick_interval: Duration::from_millis(value.tick_interval_ms.unwrap_or(250).max(10)),
            grace_window: Duration::from_millis(value.grace_window_ms.unwrap_or(500)),
            idempotency_window: Duration::from_millis(
                value.idempotency_window_ms.unwrap_or(10_000),
            ),
            race_labels: value
                .race_labels
                .filter(|labels| !labels.is_empty())
                .unwrap_or_else(RaceLabels::defaults),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.answer_window, Duration::from_secs(45));
        assert_eq!(config.race_labels.len(), 3);
        assert_eq!(config.room_config(), RoomConfig::default());
    }

    #[test]
    fn partial_file_overrides_selected_fields() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "starting_tokens": 30,
                "answer_window_secs": 20,
                "race_labels": [{ "primary": "rock", "alternate": "jazz" }]
            }"#,
        )
        .unwrap();
        let room = AppConfig::from(raw).room_config();
        assert_eq!(room.starting_tokens, 30);
        assert_eq!(room.starting_jokers, 1);
        assert_eq!(room.answer_window_ms, 20_000);
        assert_eq!(room.race_labels[0].primary, "rock");
    }
}
