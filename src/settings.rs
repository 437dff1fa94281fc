//! Application settings
//!
//! Stored as JSON in the platform config directory
//! (`<config_dir>/face-filters/settings.json`). A missing file is created
//! with defaults; an unreadable or invalid one is ignored with a warning.
//! Filter choices made in the UI are not written back.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::CameraConfig;
use crate::detector::DetectorConfig;
use crate::overlay::OverlayConfig;

const APP_DIR: &str = "face-filters";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not find config directory")]
    NoConfigDir,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default `env_logger` filter when `RUST_LOG` is unset
    pub log_level: String,
    pub target_fps: u32,
    pub show_fps: bool,
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub overlay: OverlayConfig,
    /// Catalog file to use instead of the built-in one
    pub catalog_path: Option<PathBuf>,
    /// Directory the built-in catalog's images are resolved against
    pub assets_dir: Option<PathBuf>,
    pub default_tree_asset: String,
    pub default_animal_asset: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            target_fps: 60,
            show_fps: true,
            camera: CameraConfig::default(),
            detector: DetectorConfig::default(),
            overlay: OverlayConfig::default(),
            catalog_path: None,
            assets_dir: None,
            default_tree_asset: "oak_tree".to_string(),
            default_animal_asset: "cat_formal_transparent".to_string(),
        }
    }
}

impl Settings {
    /// Settings file location, if the platform has a config directory
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_DIR);
            p.push(SETTINGS_FILE);
            p
        })
    }

    /// Load from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            log::warn!("No config directory; using default settings");
            return Self::default();
        };

        if !path.exists() {
            let settings = Self::default();
            if let Err(e) = settings.save_to_file(&path) {
                log::warn!("Failed to write default settings to {:?}: {}", path, e);
            }
            return settings;
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring settings file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Log level from the settings file, read before logging is set up
    pub fn stored_log_level() -> Option<String> {
        let path = Self::path()?;
        Self::load_from_file(&path).ok().map(|s| s.log_level)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&contents)?;
        settings.clamp();
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Keep values in workable ranges
    pub fn clamp(&mut self) {
        self.target_fps = self.target_fps.clamp(15, 240);
        self.camera.width = self.camera.width.max(1);
        self.camera.height = self.camera.height.max(1);
        let det = &mut self.detector;
        det.min_detection_confidence = det.min_detection_confidence.clamp(0.0, 1.0);
        det.min_tracking_confidence = det.min_tracking_confidence.clamp(0.0, 1.0);
        let overlay = &mut self.overlay;
        for scale in [
            &mut overlay.animal_scale,
            &mut overlay.tree_image_scale,
            &mut overlay.procedural_tree_scale,
            &mut overlay.hole_scale,
        ] {
            if !scale.is_finite() || *scale <= 0.0 {
                *scale = 1.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("face-filters-settings-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.camera.width, 640);
        assert_eq!(settings.camera.height, 480);
        assert_eq!(settings.overlay.animal_scale, 3.3);
        assert_eq!(settings.overlay.tree_image_scale, 3.0);
        assert_eq!(settings.overlay.procedural_tree_scale, 2.8);
        assert_eq!(settings.overlay.hole_scale, 1.1);
        assert!(settings.overlay.texture_seed.is_none());
        assert_eq!(settings.default_tree_asset, "oak_tree");
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip.json");
        let mut settings = Settings::default();
        settings.camera.index = 2;
        settings.overlay.texture_seed = Some(99);
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("partial.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"camera": {"index": 1}, "log_level": "debug"}"#).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.camera.index, 1);
        assert_eq!(loaded.camera.width, 640);
        assert_eq!(loaded.log_level, "debug");
        assert_eq!(loaded.detector.min_tracking_confidence, 0.5);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let path = temp_path("invalid.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load_from_file(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn test_clamp() {
        let mut settings = Settings::default();
        settings.target_fps = 1000;
        settings.detector.min_detection_confidence = 3.0;
        settings.overlay.hole_scale = -1.0;
        settings.clamp();
        assert_eq!(settings.target_fps, 240);
        assert_eq!(settings.detector.min_detection_confidence, 1.0);
        assert_eq!(settings.overlay.hole_scale, 1.0);
    }
}
