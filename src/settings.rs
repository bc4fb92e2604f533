//! Simulation settings
//!
//! Persisted as JSON next to the level files. Missing fields fall back to
//! their defaults, so a settings file only needs the values it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Geometric precision presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Precision {
    Low,
    #[default]
    Medium,
    High,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Low => "Low",
            Precision::Medium => "Medium",
            Precision::High => "High",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Precision::Low),
            "medium" | "med" => Some(Precision::Medium),
            "high" => Some(Precision::High),
            _ => None,
        }
    }

    /// Chords approximating each observer's view circle
    pub fn ring_segments(&self) -> usize {
        match self {
            Precision::Low => VIEW_RING_SEGMENTS / 2,
            Precision::Medium => VIEW_RING_SEGMENTS,
            Precision::High => VIEW_RING_SEGMENTS * 2,
        }
    }

    /// Bisection steps when settling a body against a wall
    pub fn contact_accuracy(&self) -> u32 {
        match self {
            Precision::Low => CONTACT_ACCURACY / 2,
            Precision::Medium => CONTACT_ACCURACY,
            Precision::High => CONTACT_ACCURACY + 4,
        }
    }
}

/// Tunable simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub precision: Precision,

    // === Timing ===
    /// Simulation ticks per second
    pub tick_rate: f64,

    // === World ===
    /// Side length of one level grid cell
    pub cell_size: f64,
    /// Seed for uncertain panels
    pub seed: u64,

    // === Visibility ===
    /// Default view range for movers without an explicit one
    pub view_range: f64,
    pub ring_segments: usize,

    // === Contact ===
    pub contact_accuracy: u32,

    // === Movers ===
    pub mover_mass: f64,
    pub mover_friction: f64,
    pub mover_force: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_preset(Precision::Medium)
    }
}

impl Settings {
    /// Settings with the preset's precision-dependent values applied
    pub fn from_preset(preset: Precision) -> Self {
        Self {
            precision: preset,
            tick_rate: TICK_RATE,
            cell_size: 40.0,
            seed: 0,
            view_range: MOVER_VIEW_RANGE,
            ring_segments: preset.ring_segments(),
            contact_accuracy: preset.contact_accuracy(),
            mover_mass: MOVER_MASS,
            mover_friction: MOVER_FRICTION,
            mover_force: MOVER_FORCE,
        }
    }

    /// Apply a precision preset (updates precision-dependent settings)
    pub fn apply_preset(&mut self, preset: Precision) {
        self.precision = preset;
        self.ring_segments = preset.ring_segments();
        self.contact_accuracy = preset.contact_accuracy();
    }

    /// Seconds per tick
    pub fn tick_period(&self) -> f64 {
        if self.tick_rate > 0.0 {
            1.0 / self.tick_rate
        } else {
            1.0 / TICK_RATE
        }
    }

    /// Load settings from a JSON file, falling back to defaults
    pub fn load(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Could not read settings {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str(&json) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Invalid settings {}: {}; using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"cell_size": 32.0}"#).unwrap();
        assert_eq!(settings.cell_size, 32.0);
        assert_eq!(settings.ring_segments, VIEW_RING_SEGMENTS);
        assert_eq!(settings.tick_rate, TICK_RATE);
    }

    #[test]
    fn test_presets() {
        let mut settings = Settings::default();
        settings.apply_preset(Precision::High);
        assert_eq!(settings.ring_segments, VIEW_RING_SEGMENTS * 2);
        assert!(settings.contact_accuracy > CONTACT_ACCURACY);
        assert_eq!(Precision::from_str("LOW"), Some(Precision::Low));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let settings = Settings::load(Path::new("/nonexistent/umbra-settings.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("umbra-settings-{}.json", std::process::id()));
        let mut settings = Settings::default();
        settings.seed = 42;
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
        let _ = std::fs::remove_file(&path);
    }
}
