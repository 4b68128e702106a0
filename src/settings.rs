//! Persisted viewer settings.
//!
//! A flat JSON document in `localStorage` (or any [`SettingsStore`]), tagged with a
//! version. Stored keys are laid over the current defaults one by one, so a single
//! bad value only loses that key; older documents are written back after loading.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bed::{BedPreset, BedVolume, DEFAULT_PRINTER_ID, find_printer};
use crate::material::{self, DEFAULT_BACKGROUND, DEFAULT_MATERIAL_ID, DEFAULT_MODEL_COLOR};

pub const STORAGE_KEY: &str = "stl-viewer-settings";
pub const STORAGE_VERSION: u32 = 4;

/// Backing store for the raw settings document.
pub trait SettingsStore {
    fn load_raw(&self) -> anyhow::Result<Option<String>>;
    fn save_raw(&mut self, json: &str) -> anyhow::Result<()>;
    fn remove(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub version: u32,
    pub bed_active: bool,
    pub bed_preset: String,
    pub bed_x: f32,
    pub bed_y: f32,
    pub bed_z: f32,
    pub bed_custom_name: String,
    pub last_active_bed_preset: String,
    pub show_bed_label: bool,
    pub show_dimensions: bool,
    pub grid: bool,
    pub shadows: bool,
    /// Model color as `#rrggbb`.
    pub color: String,
    /// Material preset the color came from.
    pub preset: String,
    pub bg_color: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: STORAGE_VERSION,
            bed_active: false,
            bed_preset: "none".into(),
            bed_x: 220.0,
            bed_y: 220.0,
            bed_z: 250.0,
            bed_custom_name: "My Printer".into(),
            last_active_bed_preset: DEFAULT_PRINTER_ID.into(),
            show_bed_label: true,
            show_dimensions: false,
            grid: true,
            shadows: true,
            color: material::to_hex(DEFAULT_MODEL_COLOR),
            preset: DEFAULT_MATERIAL_ID.into(),
            bg_color: material::to_hex(DEFAULT_BACKGROUND),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedAxis {
    X,
    Y,
    Z,
}

impl Settings {
    /// Projects the bed-related keys onto a [`BedVolume`].
    pub fn bed_volume(&self) -> BedVolume {
        BedVolume {
            x: self.bed_x,
            y: self.bed_y,
            z: self.bed_z,
            active: self.bed_active,
            preset: BedPreset::from_id(&self.bed_preset),
            custom_name: self.bed_custom_name.clone(),
        }
    }

    pub fn select_preset(&mut self, id: &str) {
        self.bed_active = id != "none";
        self.bed_preset = id.to_string();
        if id != "none" {
            self.last_active_bed_preset = id.to_string();
        }
        if let Some(printer) = find_printer(id) {
            self.bed_x = printer.x;
            self.bed_y = printer.y;
            self.bed_z = printer.z;
        }
    }

    /// Editing a dimension by hand turns any named preset into a custom bed.
    pub fn set_bed_dimension(&mut self, axis: BedAxis, mm: f32) {
        match axis {
            BedAxis::X => self.bed_x = mm,
            BedAxis::Y => self.bed_y = mm,
            BedAxis::Z => self.bed_z = mm,
        }
        if self.bed_preset != "custom" {
            self.bed_preset = "custom".into();
            self.last_active_bed_preset = "custom".into();
        }
    }

    /// Stored model color, or the default when the stored text does not parse.
    pub fn model_color(&self) -> egui::Color32 {
        material::parse_hex(&self.color).unwrap_or(DEFAULT_MODEL_COLOR)
    }

    pub fn set_model_color(&mut self, color: egui::Color32) {
        self.color = material::to_hex(color);
    }

    /// Selects a material preset and takes over its color. Unknown ids are ignored.
    pub fn select_material(&mut self, id: &str) {
        if let Some(preset) = material::find_material(id) {
            self.preset = preset.id.to_string();
            self.color = material::to_hex(preset.color);
        }
    }

    pub fn background_color(&self) -> egui::Color32 {
        material::parse_hex(&self.bg_color).unwrap_or(DEFAULT_BACKGROUND)
    }

    pub fn set_background_color(&mut self, color: egui::Color32) {
        self.bg_color = material::to_hex(color);
    }

    pub fn toggle_bed(&mut self) {
        self.bed_active = !self.bed_active;
        if !self.bed_active {
            self.bed_preset = "none".into();
            return;
        }

        let remembered = self.last_active_bed_preset.as_str();
        let preset = if remembered == "custom" || find_printer(remembered).is_some() {
            remembered.to_string()
        } else {
            DEFAULT_PRINTER_ID.to_string()
        };
        if let Some(printer) = find_printer(&preset) {
            self.bed_x = printer.x;
            self.bed_y = printer.y;
            self.bed_z = printer.z;
        }
        self.bed_preset = preset;
    }
}

/// Settings plus the store they are written back to on every change.
pub struct SettingsManager<S: SettingsStore> {
    store: S,
    current: Settings,
}

impl<S: SettingsStore> SettingsManager<S> {
    pub fn load(store: S) -> Self {
        let mut manager = Self { store, current: Settings::default() };
        let raw = match manager.store.load_raw() {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Failed to read settings: {e:#}");
                None
            }
        };
        let Some(raw) = raw else {
            return manager;
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(_) | Err(_) => {
                log::warn!("Stored settings are not a JSON object, using defaults");
                return manager;
            }
        };

        let stored_version = parsed.get("version").and_then(Value::as_u64).unwrap_or(0);
        manager.current = overlay_known_keys(&parsed);
        if stored_version < u64::from(STORAGE_VERSION) {
            log::info!("Migrated settings from version {stored_version} to {STORAGE_VERSION}");
            manager.persist();
        }
        manager
    }

    pub fn get(&self) -> &Settings {
        &self.current
    }

    /// Applies `change` and writes the whole document back.
    pub fn update(&mut self, change: impl FnOnce(&mut Settings)) {
        change(&mut self.current);
        self.persist();
    }

    pub fn export(&self) -> String {
        serde_json::to_string_pretty(&self.current).unwrap_or_default()
    }

    /// Overlays `json` onto the defaults. Returns false when it does not parse.
    pub fn import(&mut self, json: &str) -> bool {
        let Ok(Value::Object(overrides)) = serde_json::from_str::<Value>(json) else {
            return false;
        };
        let mut merged = defaults_map();
        merged.extend(overrides);
        match serde_json::from_value::<Settings>(Value::Object(merged)) {
            Ok(settings) => {
                self.current = settings;
                self.persist();
                true
            }
            Err(e) => {
                log::warn!("Rejected settings import: {e}");
                false
            }
        }
    }

    pub fn reset(&mut self) {
        if let Err(e) = self.store.remove() {
            log::warn!("Failed to clear settings: {e:#}");
        }
        self.current = Settings::default();
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn persist(&mut self) {
        self.current.version = STORAGE_VERSION;
        let result = serde_json::to_string(&self.current)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.save_raw(&json));
        if let Err(e) = result {
            log::warn!("Failed to save settings: {e:#}");
        }
    }
}

fn defaults_map() -> Map<String, Value> {
    match serde_json::to_value(Settings::default()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Copies every known key whose value still fits its field onto the defaults.
fn overlay_known_keys(old: &Value) -> Settings {
    let mut merged = defaults_map();
    let keys: Vec<String> = merged.keys().cloned().collect();
    for key in keys {
        if key == "version" {
            continue;
        }
        let Some(value) = old.get(&key) else { continue };
        let mut candidate = merged.clone();
        candidate.insert(key.clone(), value.clone());
        if serde_json::from_value::<Settings>(Value::Object(candidate)).is_ok() {
            merged.insert(key, value.clone());
        } else {
            log::warn!("Dropping stored setting `{key}`: {value} does not fit");
        }
    }
    merged.insert("version".into(), Value::from(STORAGE_VERSION));
    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

/// In-memory store for native builds and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    pub raw: Option<String>,
    pub writes: usize,
}

impl MemoryStore {
    pub fn with(raw: &str) -> Self {
        Self { raw: Some(raw.to_string()), writes: 0 }
    }
}

impl SettingsStore for MemoryStore {
    fn load_raw(&self) -> anyhow::Result<Option<String>> {
        Ok(self.raw.clone())
    }

    fn save_raw(&mut self, json: &str) -> anyhow::Result<()> {
        self.raw = Some(json.to_string());
        self.writes += 1;
        Ok(())
    }

    fn remove(&mut self) -> anyhow::Result<()> {
        self.raw = None;
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::LocalStore;

#[cfg(target_arch = "wasm32")]
mod web {
    use super::{STORAGE_KEY, SettingsStore};

    /// `window.localStorage`, under [`STORAGE_KEY`].
    pub struct LocalStore;

    fn storage() -> anyhow::Result<web_sys::Storage> {
        web_sys::window()
            .ok_or_else(|| anyhow::anyhow!("no window"))?
            .local_storage()
            .map_err(|e| anyhow::anyhow!("localStorage unavailable: {e:?}"))?
            .ok_or_else(|| anyhow::anyhow!("no localStorage"))
    }

    impl SettingsStore for LocalStore {
        fn load_raw(&self) -> anyhow::Result<Option<String>> {
            storage()?.get_item(STORAGE_KEY).map_err(|e| anyhow::anyhow!("read failed: {e:?}"))
        }

        fn save_raw(&mut self, json: &str) -> anyhow::Result<()> {
            storage()?.set_item(STORAGE_KEY, json).map_err(|e| anyhow::anyhow!("write failed: {e:?}"))
        }

        fn remove(&mut self) -> anyhow::Result<()> {
            storage()?.remove_item(STORAGE_KEY).map_err(|e| anyhow::anyhow!("remove failed: {e:?}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_document_yields_defaults_without_writing() {
        let manager = SettingsManager::load(MemoryStore::default());
        assert_eq!(manager.get(), &Settings::default());
        assert_eq!(manager.store().writes, 0);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let manager = SettingsManager::load(MemoryStore::with("{not json"));
        assert_eq!(manager.get(), &Settings::default());
    }

    #[test]
    fn old_version_is_migrated_and_persisted() {
        let raw = r#"{"version":2,"bedActive":true,"bedPreset":"prusa_mk4","bedX":"wide","unknownKey":1}"#;
        let manager = SettingsManager::load(MemoryStore::with(raw));
        let s = manager.get();

        assert_eq!(s.version, STORAGE_VERSION);
        assert!(s.bed_active);
        assert_eq!(s.bed_preset, "prusa_mk4");
        assert_eq!(s.bed_x, 220.0, "incompatible value falls back to the default");
        assert_eq!(manager.store().writes, 1);

        let stored: Value = serde_json::from_str(manager.store().raw.as_deref().unwrap()).unwrap();
        assert_eq!(stored["version"], 4);
        assert!(stored.get("unknownKey").is_none());
    }

    #[test]
    fn current_version_overlays_missing_keys() {
        let manager = SettingsManager::load(MemoryStore::with(r#"{"version":4,"showBedLabel":false}"#));
        assert!(!manager.get().show_bed_label);
        assert_eq!(manager.get().bed_z, 250.0);
    }

    #[test]
    fn one_bad_key_keeps_the_rest_of_a_current_document() {
        let raw = r##"{"version":4,"bedActive":true,"bedPreset":"k1","bedX":"wide","bgColor":"#ffffff"}"##;
        let manager = SettingsManager::load(MemoryStore::with(raw));
        let s = manager.get();

        assert!(s.bed_active);
        assert_eq!(s.bed_preset, "k1");
        assert_eq!(s.bed_x, 220.0);
        assert_eq!(s.background_color(), egui::Color32::WHITE);
        assert_eq!(manager.store().writes, 0, "current documents are not rewritten on load");
    }

    #[test]
    fn colors_fall_back_when_unparsable() {
        let mut s = Settings::default();
        assert_eq!(s.model_color(), DEFAULT_MODEL_COLOR);
        s.color = "teal".into();
        s.bg_color = "#12".into();
        assert_eq!(s.model_color(), DEFAULT_MODEL_COLOR);
        assert_eq!(s.background_color(), DEFAULT_BACKGROUND);

        s.select_material("red_pla");
        assert_eq!((s.preset.as_str(), s.color.as_str()), ("red_pla", "#c0392b"));
        s.select_material("unobtainium");
        assert_eq!(s.preset, "red_pla");

        s.set_model_color(egui::Color32::from_rgb(1, 2, 3));
        assert_eq!(s.color, "#010203");
    }

    #[test]
    fn update_persists_every_change() {
        let mut manager = SettingsManager::load(MemoryStore::default());
        manager.update(|s| s.select_preset("ender3"));
        manager.update(|s| s.set_bed_dimension(BedAxis::Z, 300.0));
        assert_eq!(manager.store().writes, 2);

        let reloaded = SettingsManager::load(manager.store().clone());
        assert_eq!(reloaded.get().bed_preset, "custom");
        assert_eq!(reloaded.get().bed_z, 300.0);
        assert!(reloaded.get().bed_active);
    }

    #[test]
    fn import_and_export() {
        let mut manager = SettingsManager::load(MemoryStore::default());
        assert!(!manager.import("[1,2]"));
        assert!(manager.import(r#"{"bedCustomName":"Shop printer","version":1}"#));
        assert_eq!(manager.get().bed_custom_name, "Shop printer");
        assert_eq!(manager.get().version, STORAGE_VERSION);
        assert!(manager.export().contains("\"bedCustomName\": \"Shop printer\""));

        manager.reset();
        assert!(manager.store().raw.is_none());
        assert_eq!(manager.get(), &Settings::default());
    }

    #[test]
    fn toggle_bed_restores_last_preset() {
        let mut s = Settings::default();
        s.last_active_bed_preset = "bambu_a1_mini".into();
        s.toggle_bed();
        assert!(s.bed_active);
        assert_eq!(s.bed_preset, "bambu_a1_mini");
        assert_eq!((s.bed_x, s.bed_y, s.bed_z), (180.0, 180.0, 180.0));

        s.toggle_bed();
        assert!(!s.bed_active);
        assert_eq!(s.bed_preset, "none");

        s.last_active_bed_preset = "gone".into();
        s.toggle_bed();
        assert_eq!(s.bed_preset, DEFAULT_PRINTER_ID);
    }

    #[test]
    fn toggle_keeps_custom_dimensions() {
        let mut s = Settings::default();
        s.select_preset("custom");
        s.set_bed_dimension(BedAxis::X, 123.0);
        s.toggle_bed();
        s.toggle_bed();
        assert_eq!(s.bed_preset, "custom");
        assert_eq!(s.bed_x, 123.0);
    }
}
