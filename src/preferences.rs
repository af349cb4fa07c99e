//! Preference manager that merges config.toml defaults with stored overrides.
//!
//! Config values serve as defaults; values in the client state store override
//! them. Writes always go to the store, never to the config file.
use std::collections::{BTreeMap, HashMap};

use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::storage::{StateStore, StorageError};
use crate::ui::time_format::RelativeTimeMode;

/// Key prefix for per-category section collapse maps.
pub const SECTIONS_KEY_PREFIX: &str = "chapter-tracker-sections-";

pub const THEME_KEY: &str = "theme";
pub const ACCENT_KEY: &str = "accent";
pub const RELATIVE_TIME_KEY: &str = "relative_time";

/// Collapse state of the table sections of one category, keyed by section id.
pub type SectionStates = BTreeMap<String, bool>;

pub fn sections_key(category: &str) -> String {
    format!("{}{}", SECTIONS_KEY_PREFIX, category)
}

enum PersistOp {
    Set { key: String, value: String },
    Flush(oneshot::Sender<()>),
}

// ============================================================================
// PreferenceManager
// ============================================================================

/// Merged preference store: config.toml defaults + stored overrides.
///
/// Reads are in-memory. Writes update the map immediately and are queued to
/// a single writer task, so they reach the store in the order they were made.
pub struct PreferenceManager {
    prefs: HashMap<String, String>,
    writer: Option<mpsc::UnboundedSender<PersistOp>>,
}

impl PreferenceManager {
    /// Load preferences by merging config defaults with stored overrides.
    ///
    /// Spawns the writer task, so this must run inside a tokio runtime.
    pub async fn load(config: &Config, store: &StateStore) -> Result<Self, StorageError> {
        let mut prefs = Self::flatten_config(config);

        for (key, value) in store.get_by_prefix("").await? {
            prefs.insert(key, value);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(persist_worker(store.clone(), rx));

        Ok(Self {
            prefs,
            writer: Some(tx),
        })
    }

    /// Create from config only. Changes live in memory and are never persisted.
    pub fn from_config(config: &Config) -> Self {
        Self {
            prefs: Self::flatten_config(config),
            writer: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.prefs.get(key).map(String::as_str)
    }

    /// Set a preference and queue it for persistence.
    pub fn set(&mut self, key: &str, value: &str) {
        if self.get(key) == Some(value) {
            return;
        }
        self.prefs.insert(key.to_string(), value.to_string());
        if let Some(writer) = &self.writer {
            let op = PersistOp::Set {
                key: key.to_string(),
                value: value.to_string(),
            };
            if writer.send(op).is_err() {
                tracing::warn!(key, "Preference writer stopped, change kept in memory only");
            }
        }
    }

    /// Wait until every queued write has reached the store.
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if writer.send(PersistOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    // ========================================================================
    // Type-safe Accessors
    // ========================================================================

    pub fn theme(&self) -> &str {
        self.get(THEME_KEY).unwrap_or("dark")
    }

    pub fn accent(&self) -> &str {
        self.get(ACCENT_KEY).unwrap_or("blue")
    }

    /// Stored values outside the known set fall back to `today`.
    pub fn relative_time(&self) -> RelativeTimeMode {
        self.get(RELATIVE_TIME_KEY)
            .map(RelativeTimeMode::parse_or_default)
            .unwrap_or_default()
    }

    pub fn set_relative_time(&mut self, mode: RelativeTimeMode) {
        self.set(RELATIVE_TIME_KEY, mode.as_str());
    }

    /// Saved collapse state for a category's sections. A corrupt entry reads as empty.
    pub fn sections(&self, category: &str) -> SectionStates {
        let key = sections_key(category);
        let Some(raw) = self.get(&key) else {
            return SectionStates::new();
        };
        match serde_json::from_str(raw) {
            Ok(states) => states,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ignoring corrupt section state");
                SectionStates::new()
            }
        }
    }

    pub fn set_section_collapsed(&mut self, category: &str, section: &str, collapsed: bool) {
        let mut states = self.sections(category);
        states.insert(section.to_string(), collapsed);
        match serde_json::to_string(&states) {
            Ok(json) => self.set(&sections_key(category), &json),
            Err(e) => tracing::warn!(category, error = %e, "Failed to encode section state"),
        }
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn flatten_config(config: &Config) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(THEME_KEY.to_string(), config.theme.clone());
        map.insert(ACCENT_KEY.to_string(), config.accent.clone());
        map.insert(RELATIVE_TIME_KEY.to_string(), config.relative_time.clone());
        map
    }
}

async fn persist_worker(store: StateStore, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            PersistOp::Set { key, value } => {
                if let Err(e) = store.set(&key, &value).await {
                    tracing::warn!(key = %key, error = %e, "Failed to persist preference");
                }
            }
            PersistOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Preference writer stopped");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_store() -> StateStore {
        StateStore::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_load_defaults_from_config() {
        let store = test_store().await;
        let pm = PreferenceManager::load(&Config::default(), &store).await.unwrap();

        assert_eq!(pm.theme(), "dark");
        assert_eq!(pm.accent(), "blue");
        assert_eq!(pm.relative_time(), RelativeTimeMode::Today);
    }

    #[tokio::test]
    async fn test_store_overrides_config() {
        let store = test_store().await;
        store.set("theme", "light").await.unwrap();
        store.set("relative_time", "month").await.unwrap();

        let pm = PreferenceManager::load(&Config::default(), &store).await.unwrap();
        assert_eq!(pm.theme(), "light");
        assert_eq!(pm.relative_time(), RelativeTimeMode::Month);
    }

    #[tokio::test]
    async fn test_set_persists_in_order() {
        let store = test_store().await;
        let mut pm = PreferenceManager::load(&Config::default(), &store).await.unwrap();

        pm.set("accent", "green");
        pm.set("accent", "purple");
        assert_eq!(pm.accent(), "purple");

        pm.flush().await;
        assert_eq!(store.get("accent").await.unwrap(), Some("purple".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_stored_mode_defaults_to_today() {
        let store = test_store().await;
        store.set("relative_time", "fortnight").await.unwrap();
        let pm = PreferenceManager::load(&Config::default(), &store).await.unwrap();
        assert_eq!(pm.relative_time(), RelativeTimeMode::Today);
    }

    #[tokio::test]
    async fn test_section_state_round_trip() {
        let store = test_store().await;
        let mut pm = PreferenceManager::load(&Config::default(), &store).await.unwrap();

        pm.set_section_collapsed("manga", "same-section", true);
        pm.set_section_collapsed("manga", "diff-section", false);
        pm.flush().await;

        let raw = store
            .get("chapter-tracker-sections-manga")
            .await
            .unwrap()
            .unwrap();
        let decoded: SectionStates = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.get("same-section"), Some(&true));
        assert_eq!(decoded.get("diff-section"), Some(&false));

        assert!(pm.sections("main").is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_section_state_reads_empty() {
        let store = test_store().await;
        store.set("chapter-tracker-sections-main", "{not json").await.unwrap();
        let pm = PreferenceManager::load(&Config::default(), &store).await.unwrap();
        assert!(pm.sections("main").is_empty());
    }

    #[test]
    fn test_from_config_keeps_changes_in_memory() {
        let mut pm = PreferenceManager::from_config(&Config::default());
        pm.set_relative_time(RelativeTimeMode::Always);
        assert_eq!(pm.relative_time(), RelativeTimeMode::Always);
    }
}
