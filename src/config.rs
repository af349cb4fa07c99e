//! Settings from ~/.config/chapterwatch/config.toml.
//!
//! Every key is optional. A missing or blank file gives `Config::default()`,
//! and keys this version does not know are logged and skipped.
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Larger than [`Config::MAX_FILE_SIZE`].
    #[error("Config file of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the tracker server.
    pub server_url: String,

    /// Path of the live channel endpoint, appended to `server_url` with a ws(s) scheme.
    pub channel_path: String,

    /// Category shown when none is given on the command line.
    pub default_category: String,

    /// Relative-time preference default: off, today, week, month or always.
    pub relative_time: String,

    /// Theme name default.
    pub theme: String,

    /// Accent colour default.
    pub accent: String,

    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,

    /// Delay between live channel reconnect attempts.
    pub reconnect_delay_ms: u64,

    /// How often bound timestamps are re-rendered. 0 disables the tick.
    pub time_refresh_secs: u64,

    /// Category-list poll interval for navigation counts. 0 = off.
    pub nav_poll_secs: u64,

    /// Headless viewport size used for overlay placement.
    pub viewport_width: f64,
    pub viewport_height: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            channel_path: "/ws".to_string(),
            default_category: "main".to_string(),
            relative_time: "today".to_string(),
            theme: "dark".to_string(),
            accent: "blue".to_string(),
            request_timeout_secs: 30,
            reconnect_delay_ms: 2000,
            time_refresh_secs: 60,
            nav_poll_secs: 0,
            viewport_width: 1280.0,
            viewport_height: 800.0,
        }
    }
}

/// Keys accepted at the top level of the file.
const KNOWN_KEYS: &[&str] = &[
    "server_url",
    "channel_path",
    "default_category",
    "relative_time",
    "theme",
    "accent",
    "request_timeout_secs",
    "reconnect_delay_ms",
    "time_refresh_secs",
    "nav_poll_secs",
    "viewport_width",
    "viewport_height",
];

/// File contents, or `None` when there is nothing to parse.
fn read_source(path: &Path) -> Result<Option<String>, ConfigError> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if size > Config::MAX_FILE_SIZE {
        return Err(ConfigError::TooLarge {
            size,
            limit: Config::MAX_FILE_SIZE,
        });
    }
    match std::fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => Ok(Some(text)),
        // Removed after the metadata call.
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn warn_unknown_keys(text: &str) {
    let Ok(table) = text.parse::<toml::Table>() else {
        return;
    };
    for key in table.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
        tracing::warn!(key = %key, "Ignoring unknown config key");
    }
}

impl Config {
    pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

    /// Read `path`, falling back to defaults when it is absent or blank.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(text) = read_source(path)? else {
            tracing::debug!(path = %path.display(), "No config to read, using defaults");
            return Ok(Self::default());
        };
        warn_unknown_keys(&text);
        let config: Config = toml::from_str(&text)?;
        tracing::info!(path = %path.display(), server = %config.server_url, "Loaded configuration");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.max(100))
    }

    /// `None` when the timestamp tick is disabled.
    pub fn time_refresh_interval(&self) -> Option<Duration> {
        (self.time_refresh_secs > 0).then(|| Duration::from_secs(self.time_refresh_secs))
    }

    /// `None` when category polling is disabled.
    pub fn nav_poll_interval(&self) -> Option<Duration> {
        (self.nav_poll_secs > 0).then(|| Duration::from_secs(self.nav_poll_secs))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("chapterwatch_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://127.0.0.1:5000");
        assert_eq!(config.default_category, "main");
        assert_eq!(config.relative_time, "today");
        assert_eq!(config.nav_poll_interval(), None);
        assert_eq!(config.time_refresh_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_absent_file_gives_defaults() {
        let path = std::env::temp_dir().join("chapterwatch_no_such_config.toml");
        assert_eq!(Config::load(&path).unwrap().theme, "dark");
    }

    #[test]
    fn test_blank_file_gives_defaults() {
        let path = write_config("blank", "\n   \n");
        assert_eq!(Config::load(&path).unwrap().accent, "blue");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config(
            "partial",
            "server_url = \"https://tracker.lan\"\nrelative_time = \"week\"\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.server_url, "https://tracker.lan");
        assert_eq!(config.relative_time, "week");
        assert_eq!(config.reconnect_delay_ms, 2000);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unknown_keys_are_skipped() {
        let path = write_config("unknown", "accent = \"rose\"\nfeeds = 42\n");
        assert_eq!(Config::load(&path).unwrap().accent, "rose");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("wrongtype", "nav_poll_secs = \"often\"\n");
        assert!(Config::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TooLarge { size: 1_048_577, limit: 1_048_576 }
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_durations_have_floors() {
        let config = Config {
            request_timeout_secs: 0,
            reconnect_delay_ms: 0,
            time_refresh_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
        assert_eq!(config.reconnect_delay(), Duration::from_millis(100));
        assert_eq!(config.time_refresh_interval(), None);
    }
}
