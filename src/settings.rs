use anyhow::{Context, Result};
use log::{info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};
use tokio::sync::watch;

use crate::models::{
    clamp_long_press_threshold, AutoplayTrigger, GestureConfig, HapticLevel, WorkingMode,
    DEFAULT_DOUBLE_PRESS_THRESHOLD_MS, DEFAULT_LONG_PRESS_THRESHOLD_MS,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub long_press_threshold_ms: u64,
    pub double_press_threshold_ms: u64,
    pub haptic_level: HapticLevel,
    pub working_mode: WorkingMode,
    pub unsupported_players: BTreeSet<String>,
    pub preferred_player: Option<String>,
    pub autoplay_enabled: bool,
    pub autoplay_trigger: AutoplayTrigger,
    /// The user's enable/disable toggle, restored when the service starts.
    pub activated: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            long_press_threshold_ms: DEFAULT_LONG_PRESS_THRESHOLD_MS,
            double_press_threshold_ms: DEFAULT_DOUBLE_PRESS_THRESHOLD_MS,
            haptic_level: HapticLevel::default(),
            working_mode: WorkingMode::default(),
            unsupported_players: BTreeSet::new(),
            preferred_player: None,
            autoplay_enabled: false,
            autoplay_trigger: AutoplayTrigger::default(),
            activated: true,
        }
    }
}

impl UserSettings {
    pub fn gesture_config(&self) -> GestureConfig {
        GestureConfig {
            long_press_threshold_ms: self.long_press_threshold_ms,
            double_press_threshold_ms: self.double_press_threshold_ms,
            haptic_level: self.haptic_level,
            working_mode: self.working_mode,
        }
    }

    /// Parses settings field by field. A field that is missing or does not
    /// deserialize falls back to its default; the rest of the file is kept.
    fn from_json_lenient(raw: &str) -> Self {
        let defaults = Self::default();
        let map = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!("Settings file is not a JSON object; using defaults");
                return defaults;
            }
            Err(err) => {
                warn!("Settings file is not valid JSON ({err}); using defaults");
                return defaults;
            }
        };

        Self {
            long_press_threshold_ms: clamp_long_press_threshold(field(
                &map,
                "longPressThresholdMs",
                defaults.long_press_threshold_ms,
            )),
            double_press_threshold_ms: field(
                &map,
                "doublePressThresholdMs",
                defaults.double_press_threshold_ms,
            ),
            haptic_level: field(&map, "hapticLevel", defaults.haptic_level),
            working_mode: field(&map, "workingMode", defaults.working_mode),
            unsupported_players: field(&map, "unsupportedPlayers", defaults.unsupported_players),
            preferred_player: field(&map, "preferredPlayer", defaults.preferred_player),
            autoplay_enabled: field(&map, "autoplayEnabled", defaults.autoplay_enabled),
            autoplay_trigger: field(&map, "autoplayTrigger", defaults.autoplay_trigger),
            activated: field(&map, "activated", defaults.activated),
        }
    }
}

fn field<T: DeserializeOwned>(map: &Map<String, Value>, key: &str, fallback: T) -> T {
    match map.get(key) {
        None => fallback,
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|err| {
            warn!("Ignoring unreadable setting '{key}': {err}");
            fallback
        }),
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
    settings_tx: watch::Sender<UserSettings>,
    gesture_tx: watch::Sender<GestureConfig>,
    unsupported_tx: watch::Sender<BTreeSet<String>>,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing, unreadable or corrupt file never
    /// fails: the store starts from defaults instead.
    pub fn new(path: PathBuf) -> Self {
        let data = load_from_path(&path);
        let (settings_tx, _) = watch::channel(data.clone());
        let (gesture_tx, _) = watch::channel(data.gesture_config());
        let (unsupported_tx, _) = watch::channel(data.unsupported_players.clone());

        Self {
            path,
            data: RwLock::new(data),
            settings_tx,
            gesture_tx,
            unsupported_tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> UserSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn gesture_config(&self) -> GestureConfig {
        self.settings().gesture_config()
    }

    pub fn long_press_threshold_ms(&self) -> u64 {
        self.settings().long_press_threshold_ms
    }

    pub fn double_press_threshold_ms(&self) -> u64 {
        self.settings().double_press_threshold_ms
    }

    pub fn haptic_level(&self) -> HapticLevel {
        self.settings().haptic_level
    }

    pub fn working_mode(&self) -> WorkingMode {
        self.settings().working_mode
    }

    pub fn unsupported_players(&self) -> BTreeSet<String> {
        self.settings().unsupported_players
    }

    pub fn preferred_player(&self) -> Option<String> {
        self.settings().preferred_player
    }

    pub fn autoplay(&self) -> (bool, AutoplayTrigger) {
        let settings = self.settings();
        (settings.autoplay_enabled, settings.autoplay_trigger)
    }

    pub fn activated(&self) -> bool {
        self.settings().activated
    }

    pub fn subscribe(&self) -> watch::Receiver<UserSettings> {
        self.settings_tx.subscribe()
    }

    pub fn subscribe_gesture_config(&self) -> watch::Receiver<GestureConfig> {
        self.gesture_tx.subscribe()
    }

    pub fn subscribe_unsupported_players(&self) -> watch::Receiver<BTreeSet<String>> {
        self.unsupported_tx.subscribe()
    }

    /// Stores the threshold clamped to the supported range and returns the
    /// value actually stored.
    pub fn set_long_press_threshold(&self, value_ms: u64) -> Result<u64> {
        let clamped = clamp_long_press_threshold(value_ms);
        self.update(|settings| settings.long_press_threshold_ms = clamped)?;
        Ok(clamped)
    }

    pub fn set_double_press_threshold(&self, value_ms: u64) -> Result<()> {
        self.update(|settings| settings.double_press_threshold_ms = value_ms)
            .map(|_| ())
    }

    pub fn set_haptic_level(&self, level: HapticLevel) -> Result<()> {
        self.update(|settings| settings.haptic_level = level).map(|_| ())
    }

    pub fn set_working_mode(&self, mode: WorkingMode) -> Result<()> {
        self.update(|settings| settings.working_mode = mode).map(|_| ())
    }

    pub fn set_player_supported(&self, package: &str, supported: bool) -> Result<()> {
        self.update(|settings| {
            if supported {
                settings.unsupported_players.remove(package);
            } else {
                settings.unsupported_players.insert(package.to_string());
            }
        })
        .map(|_| ())
    }

    pub fn set_preferred_player(&self, package: Option<String>) -> Result<()> {
        self.update(|settings| settings.preferred_player = package)
            .map(|_| ())
    }

    pub fn set_autoplay(&self, enabled: bool, trigger: AutoplayTrigger) -> Result<()> {
        self.update(|settings| {
            settings.autoplay_enabled = enabled;
            settings.autoplay_trigger = trigger;
        })
        .map(|_| ())
    }

    pub fn set_activated(&self, activated: bool) -> Result<()> {
        self.update(|settings| settings.activated = activated)
            .map(|_| ())
    }

    /// Applies `change` to a copy of the current settings, persists it, then
    /// swaps it in and notifies subscribers. Nothing changes if the write fails.
    /// Returns whether anything changed.
    fn update<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut UserSettings),
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        change(&mut next);
        if next == *guard {
            return Ok(false);
        }

        self.persist(&next)?;
        *guard = next.clone();
        drop(guard);

        let gesture = next.gesture_config();
        self.gesture_tx.send_if_modified(|current| {
            let modified = *current != gesture;
            *current = gesture;
            modified
        });
        let unsupported = next.unsupported_players.clone();
        self.unsupported_tx.send_if_modified(|current| {
            let modified = *current != unsupported;
            *current = unsupported;
            modified
        });
        self.settings_tx.send_replace(next);
        Ok(true)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn load_from_path(path: &Path) -> UserSettings {
    if !path.exists() {
        info!("No settings at {}; using defaults", path.display());
        return UserSettings::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => UserSettings::from_json_lenient(&contents),
        Err(err) => {
            warn!(
                "Failed to read settings from {} ({err}); using defaults",
                path.display()
            );
            UserSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("settings.json"))
    }

    #[test]
    fn defaults_when_file_is_missing() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        assert_eq!(store.long_press_threshold_ms(), 400);
        assert_eq!(store.double_press_threshold_ms(), 400);
        assert_eq!(store.haptic_level(), HapticLevel::Medium);
        assert_eq!(store.working_mode(), WorkingMode::ScreenOnOff);
        assert!(store.activated());
    }

    #[test]
    fn long_press_threshold_is_clamped_on_set() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);

        assert_eq!(store.set_long_press_threshold(100).expect("set"), 300);
        assert_eq!(store.long_press_threshold_ms(), 300);

        assert_eq!(store.set_long_press_threshold(5000).expect("set"), 2000);
        assert_eq!(store.long_press_threshold_ms(), 2000);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        store.set_working_mode(WorkingMode::ScreenOff).expect("mode");
        store.set_haptic_level(HapticLevel::Strong).expect("haptic");
        store
            .set_player_supported("com.example.radio", false)
            .expect("unsupported");
        store
            .set_preferred_player(Some(String::from("com.example.music")))
            .expect("preferred");

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.settings(), store.settings());
        assert!(reloaded.unsupported_players().contains("com.example.radio"));
    }

    #[test]
    fn corrupt_file_recovers_to_defaults() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("settings.json"), "{ not json").expect("write");

        let store = store_in(&dir);
        assert_eq!(store.settings(), UserSettings::default());
    }

    #[test]
    fn unreadable_field_keeps_the_rest() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("settings.json"),
            r#"{"longPressThresholdMs": 900, "hapticLevel": "BUZZ", "workingMode": "SCREEN_ON"}"#,
        )
        .expect("write");

        let store = store_in(&dir);
        assert_eq!(store.long_press_threshold_ms(), 900);
        assert_eq!(store.haptic_level(), HapticLevel::Medium);
        assert_eq!(store.working_mode(), WorkingMode::ScreenOn);
    }

    #[test]
    fn out_of_range_threshold_on_disk_is_clamped() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("settings.json"),
            r#"{"longPressThresholdMs": 10}"#,
        )
        .expect("write");

        assert_eq!(store_in(&dir).long_press_threshold_ms(), 300);
    }

    #[test]
    fn gesture_stream_only_fires_for_gesture_fields() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        let mut gesture_rx = store.subscribe_gesture_config();
        let mut unsupported_rx = store.subscribe_unsupported_players();

        store
            .set_preferred_player(Some(String::from("com.example.music")))
            .expect("preferred");
        assert!(!gesture_rx.has_changed().expect("open"));
        assert!(!unsupported_rx.has_changed().expect("open"));

        store.set_double_press_threshold(650).expect("double");
        assert!(gesture_rx.has_changed().expect("open"));
        assert_eq!(gesture_rx.borrow_and_update().double_press_threshold_ms, 650);

        store
            .set_player_supported("com.example.radio", false)
            .expect("unsupported");
        assert!(unsupported_rx.has_changed().expect("open"));
    }

    #[test]
    fn unchanged_value_does_not_notify() {
        let dir = tempdir().expect("tempdir");
        let store = store_in(&dir);
        let mut rx = store.subscribe();

        store.set_working_mode(WorkingMode::ScreenOnOff).expect("mode");
        assert!(!rx.has_changed().expect("open"));
        assert!(!store.path().exists());
    }
}
