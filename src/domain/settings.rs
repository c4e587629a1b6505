use crate::domain::models::{ScanRequest, StartOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
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
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
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
    "glucometer_link".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// What happens to discovered, never-connected peripherals once a scan ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleDiscoveryPolicy {
    /// Keep every discovered peripheral for the lifetime of the session
    #[default]
    Retain,
    /// Remove disconnected peripherals that the finished scan did not see
    PruneOnScanStop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Scanning
    #[serde(default = "default_scan_duration_secs")]
    pub scan_duration_secs: u64,
    #[serde(default = "default_true")]
    pub allow_duplicates: bool,
    #[serde(default)]
    pub service_filters: Vec<String>,
    #[serde(default)]
    pub stale_discovery: StaleDiscoveryPolicy,

    // Adapter
    #[serde(default = "default_false")]
    pub show_alert: bool,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    // Target device
    #[serde(default = "default_target_name")]
    pub target_device_name: String,
    #[serde(default = "default_target_service")]
    pub target_service_uuid: String,

    // UI
    #[serde(default = "default_false")]
    pub dark_mode: bool,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_duration_secs: default_scan_duration_secs(),
            allow_duplicates: true,
            service_filters: Vec::new(),
            stale_discovery: StaleDiscoveryPolicy::default(),
            show_alert: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            target_device_name: default_target_name(),
            target_service_uuid: default_target_service(),
            dark_mode: false,
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn scan_request(&self) -> ScanRequest {
        ScanRequest {
            service_filters: self.service_filters.clone(),
            duration_secs: self.scan_duration_secs,
            allow_duplicates: self.allow_duplicates,
        }
    }

    pub fn start_options(&self) -> StartOptions {
        StartOptions {
            show_alert: self.show_alert,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_scan_duration_secs() -> u64 {
    15
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_target_name() -> String {
    "Samico GL".to_string()
}
fn default_target_service() -> String {
    "FFF0".to_string()
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings ({}): {}", settings_path.display(), e);
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("GlucometerLink");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn set_dark_mode(&mut self, dark_mode: bool) -> anyhow::Result<()> {
        if self.settings.dark_mode != dark_mode {
            self.get_mut().dark_mode = dark_mode;
            self.save()?;
        }
        Ok(())
    }
}
