use std::path::PathBuf;
use std::time::Duration;

use crate::settings::default_settings_path;
use crate::sync::debounce::{DEFAULT_QUIET_WINDOW, ExtensionFilter};
use crate::sync::pipeline::DEFAULT_UPLOAD_PACE;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub quiet_window: Duration,
    pub upload_pace: Duration,
    pub extensions: ExtensionFilter,
    /// Host separator sent with every plan and upload request.
    pub separator: String,
    pub server_override: Option<String>,
    pub api_key_override: Option<String>,
    pub settings_path: PathBuf,
}

impl SyncConfig {
    /// Reads `WAVELINE_*` variables. Missing or invalid values use defaults.
    pub fn from_env() -> Self {
        let quiet_window = Duration::from_millis(read_u64_env(
            "WAVELINE_QUIET_WINDOW_MS",
            DEFAULT_QUIET_WINDOW.as_millis() as u64,
        ));
        let upload_pace = Duration::from_millis(read_u64_env(
            "WAVELINE_UPLOAD_PACE_MS",
            DEFAULT_UPLOAD_PACE.as_millis() as u64,
        ));
        let extensions = std::env::var("WAVELINE_EXTENSIONS")
            .ok()
            .and_then(|value| ExtensionFilter::parse(&value))
            .unwrap_or_default();

        Self {
            quiet_window,
            upload_pace,
            extensions,
            separator: std::path::MAIN_SEPARATOR_STR.to_string(),
            server_override: read_string_env("WAVELINE_SERVER"),
            api_key_override: read_string_env("WAVELINE_API_KEY"),
            settings_path: default_settings_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            quiet_window: DEFAULT_QUIET_WINDOW,
            upload_pace: DEFAULT_UPLOAD_PACE,
            extensions: ExtensionFilter::default(),
            separator: std::path::MAIN_SEPARATOR_STR.to_string(),
            server_override: None,
            api_key_override: None,
            settings_path: default_settings_path(),
        }
    }
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parsers_fall_back_to_defaults() {
        assert_eq!(read_u64_env("WAVELINE_NO_SUCH_NUMBER_FOR_TEST", 3000), 3000);
        assert!(read_string_env("WAVELINE_NO_SUCH_STRING_FOR_TEST").is_none());
    }

    #[test]
    fn defaults_match_reference_timings() {
        let config = SyncConfig::default();
        assert_eq!(config.quiet_window, Duration::from_secs(3));
        assert_eq!(config.upload_pace, Duration::from_secs(1));
        assert_eq!(config.extensions, ExtensionFilter::default());
        assert_eq!(config.separator, std::path::MAIN_SEPARATOR_STR);
        assert!(config.server_override.is_none());
    }
}
