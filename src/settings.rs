//! Store settings
//!
//! Persisted separately from game state in LocalStorage, so a developer can
//! override them from the console without rebuilding.

use serde::{Deserialize, Serialize};

use crate::consts::{EFFECT_DURATION_MS, INVENTORY_KEY, SANITY_DEFAULT};
use crate::platform::KeyValueStore;
use crate::sanity::{MountTarget, SanityOptions};

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Sanity ===
    /// Value `init` starts the meter at
    pub sanity_start: f64,
    /// Selector of the element hosting the badge
    pub badge_mount: Option<String>,
    /// Default body effect duration (ms)
    pub effect_duration_ms: u32,

    // === Inventory ===
    /// Storage key of the item list
    pub inventory_key: String,

    // === Diagnostics ===
    /// Log level name (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sanity_start: f64::from(SANITY_DEFAULT),
            badge_mount: None,
            effect_duration_ms: EFFECT_DURATION_MS,
            inventory_key: INVENTORY_KEY.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Parse settings, falling back to defaults on malformed JSON
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("Ignoring malformed settings: {err}");
                Self::default()
            }
        }
    }

    /// Options for the first `SanityStore::init`
    pub fn sanity_options<E>(&self) -> SanityOptions<E> {
        SanityOptions {
            start: Some(self.sanity_start),
            mount: self.badge_mount.clone().map(MountTarget::Selector),
        }
    }

    /// Parsed log level (unknown names mean `Info`)
    pub fn log_level(&self) -> log::Level {
        self.log_level.parse().unwrap_or(log::Level::Info)
    }

    /// LocalStorage key
    pub const STORAGE_KEY: &'static str = "lucid_state_settings";

    /// Read settings stored under [`Settings::STORAGE_KEY`], if any
    pub fn read_from(storage: &dyn KeyValueStore) -> Option<Self> {
        match storage.read(Self::STORAGE_KEY) {
            Ok(json) => json.map(|json| Self::from_json(&json)),
            Err(err) => {
                log::debug!("Settings not read: {err}");
                None
            }
        }
    }

    /// Store settings under [`Settings::STORAGE_KEY`]; returns whether the write stuck
    pub fn write_to(&self, storage: &dyn KeyValueStore) -> bool {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(err) => {
                log::warn!("Settings not serialized: {err}");
                return false;
            }
        };
        match storage.write(Self::STORAGE_KEY, &json) {
            Ok(()) => {
                log::info!("Settings saved");
                true
            }
            Err(err) => {
                log::warn!("Settings not saved: {err}");
                false
            }
        }
    }

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let loaded = crate::platform::web::LocalStorage::open()
            .and_then(|storage| Self::read_from(&storage));
        match loaded {
            Some(settings) => {
                log::info!("Loaded settings from LocalStorage");
                settings
            }
            None => Self::default(),
        }
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) -> bool {
        match crate::platform::web::LocalStorage::open() {
            Some(storage) => self.write_to(&storage),
            None => {
                log::warn!("LocalStorage unavailable, settings not saved");
                false
            }
        }
    }

    /// Native: read a JSON file named by `LUCID_SETTINGS`, if set
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        let Ok(path) = std::env::var("LUCID_SETTINGS") else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(json) => Self::from_json(&json),
            Err(err) => {
                log::warn!("Could not read settings from {path}: {err}");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryStorage;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = Settings::from_json(r##"{"sanity_start": 35, "badge_mount": "#hud"}"##);
        assert_eq!(settings.sanity_start, 35.0);
        assert_eq!(settings.badge_mount.as_deref(), Some("#hud"));
        assert_eq!(settings.effect_duration_ms, EFFECT_DURATION_MS);
        assert_eq!(settings.inventory_key, INVENTORY_KEY);
    }

    #[test]
    fn test_malformed_json_is_default() {
        assert_eq!(Settings::from_json("{{"), Settings::default());
    }

    #[test]
    fn test_sanity_options() {
        let settings = Settings {
            badge_mount: Some("#hud".to_string()),
            ..Default::default()
        };
        let options: SanityOptions<()> = settings.sanity_options();
        assert_eq!(options.start, Some(100.0));
        assert_eq!(options.mount, Some(MountTarget::Selector("#hud".to_string())));
    }

    #[test]
    fn test_log_level() {
        let mut settings = Settings::default();
        assert_eq!(settings.log_level(), log::Level::Info);
        settings.log_level = "debug".to_string();
        assert_eq!(settings.log_level(), log::Level::Debug);
        settings.log_level = "loud".to_string();
        assert_eq!(settings.log_level(), log::Level::Info);
    }

    #[test]
    fn test_settings_round_trip_through_storage() {
        let storage = MemoryStorage::new();
        assert_eq!(Settings::read_from(&storage), None);

        let settings = Settings {
            sanity_start: 40.0,
            inventory_key: "save.slot2".to_string(),
            ..Default::default()
        };
        assert!(settings.write_to(&storage));
        assert!(storage.get_raw(Settings::STORAGE_KEY).is_some());
        assert_eq!(Settings::read_from(&storage), Some(settings));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        assert!(!Settings::default().write_to(&storage));
        assert_eq!(storage.get_raw(Settings::STORAGE_KEY), None);
    }

    #[test]
    fn test_hand_edited_storage_value() {
        let storage = MemoryStorage::new();
        storage.set_external(Settings::STORAGE_KEY, r##"{"badge_mount": "#hud"}"##);
        let settings = Settings::read_from(&storage).unwrap_or_default();
        assert_eq!(settings.badge_mount.as_deref(), Some("#hud"));
        assert_eq!(settings.sanity_start, 100.0);
    }
}
