//! Application configuration.
//!
//! Loads settings from config.json next to the executable at startup.
//! Detection thresholds and retry intervals are fixed constants in the
//! engine; the config only selects the working scenario and recording
//! defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the scenario that the run/record hotkeys operate on.
    /// When absent, recording creates a timestamped scenario and the run
    /// hotkeys report that nothing is selected.
    #[serde(default)]
    pub active_scenario: Option<String>,
    /// Wait applied to newly recorded actions (seconds).
    #[serde(default = "default_wait_seconds")]
    pub default_wait_seconds: f32,
}

fn default_wait_seconds() -> f32 {
    1.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_scenario: None,
            default_wait_seconds: default_wait_seconds(),
        }
    }
}

/// Loads configuration from config.json or returns defaults.
/// Looks for config.json in the same directory as the executable.
fn load_config() -> AppConfig {
    let config_path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("config.json")))
        .unwrap_or_else(|| Path::new("config.json").to_path_buf());

    if config_path.exists() {
        match fs::read_to_string(&config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    crate::log("Config loaded from config.json");
                    return config;
                }
                Err(e) => {
                    crate::log(&format!(
                        "Failed to parse config.json: {}. Using defaults.",
                        e
                    ));
                }
            },
            Err(e) => {
                crate::log(&format!(
                    "Failed to read config.json: {}. Using defaults.",
                    e
                ));
            }
        }
    } else {
        crate::log("config.json not found. Using default config.");
    }

    AppConfig::default()
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config());
}

/// Returns a reference to the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_fields_missing() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.active_scenario, None);
        assert_eq!(config.default_wait_seconds, 1.0);
    }

    #[test]
    fn parses_full_document() {
        let config: AppConfig = serde_json::from_str(
            r#"{"active_scenario": "daily-login", "default_wait_seconds": 2.5}"#,
        )
        .unwrap();
        assert_eq!(config.active_scenario.as_deref(), Some("daily-login"));
        assert_eq!(config.default_wait_seconds, 2.5);
    }
}
