use crate::domain::models::Axis;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "gamesir_controller".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Which built-in frame layout to decode notifications with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPreset {
    Compact,
    CompactSequenced,
    GamesirT1d,
}

/// Replaces parts of an axis' built-in calibration. Raw units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisOverride {
    pub axis: Axis,
    #[serde(default)]
    pub center: Option<f32>,
    #[serde(default)]
    pub deadzone: Option<f32>,
    #[serde(default)]
    pub scale: Option<f32>,
}

/// Session configuration record. Read once at session construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_layout")]
    pub layout: LayoutPreset,
    #[serde(default = "default_staleness_timeout_ms")]
    pub staleness_timeout_ms: u64,
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub calibration_overrides: Vec<AxisOverride>,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            layout: default_layout(),
            staleness_timeout_ms: default_staleness_timeout_ms(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            queue_capacity: default_queue_capacity(),
            calibration_overrides: Vec::new(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_device_name() -> String {
    "Gamesir-T1d".to_string()
}
fn default_layout() -> LayoutPreset {
    LayoutPreset::GamesirT1d
}
fn default_staleness_timeout_ms() -> u64 {
    500
}
fn default_watchdog_interval_ms() -> u64 {
    50
}
fn default_queue_capacity() -> usize {
    64
}

/// Loads [`Settings`] from disk. Settings are never written back.
pub struct SettingsService {
    settings: Settings,
    settings_path: Option<PathBuf>,
}

impl SettingsService {
    /// Load from the per-user config directory, falling back to defaults when
    /// no settings file exists there.
    pub fn new() -> anyhow::Result<Self> {
        let path = Self::get_settings_path()?;
        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self {
                settings: Settings::default(),
                settings_path: None,
            });
        }
        Self::from_path(path)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let settings = Self::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        Ok(Self {
            settings,
            settings_path: Some(path.to_path_buf()),
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("GameSirController");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Path the settings were read from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.settings_path.as_deref()
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }
}
