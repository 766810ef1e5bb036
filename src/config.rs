//! User settings persisted as TOML under `~/.ip_tracker/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TrackerError};
use crate::i18n::Locale;
use crate::service::geo_service::DEFAULT_ENDPOINT;

pub const APP_DIR_NAME: &str = ".ip_tracker";
pub const SETTINGS_FILE: &str = "settings.toml";
pub const DATABASE_FILE: &str = "history.db";
pub const LOG_FILE: &str = "ip_tracker.log";
pub const EXPORT_FILE: &str = "ip_history.csv";

pub const MIN_REFRESH_MINUTES: u32 = 1;
pub const MAX_REFRESH_MINUTES: u32 = 60;

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// `~/.ip_tracker`
pub fn app_dir() -> PathBuf {
    home_dir().join(APP_DIR_NAME)
}

pub fn default_settings_path() -> PathBuf {
    app_dir().join(SETTINGS_FILE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub language: Locale,
    pub auto_refresh: bool,
    pub refresh_interval_minutes: u32,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub database: Option<PathBuf>,
    pub export_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub worker_threads: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: Locale::English,
            auto_refresh: false,
            refresh_interval_minutes: 5,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 5,
            poll_interval_ms: 100,
            database: None,
            export_path: None,
            log_file: None,
            worker_threads: None,
        }
    }
}

impl Settings {
    /// Load settings; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Clamp out-of-range values instead of rejecting the whole file.
    pub fn normalized(mut self) -> Self {
        self.refresh_interval_minutes = self
            .refresh_interval_minutes
            .clamp(MIN_REFRESH_MINUTES, MAX_REFRESH_MINUTES);
        self.timeout_secs = self.timeout_secs.max(1);
        self.poll_interval_ms = self.poll_interval_ms.max(10);
        self
    }

    /// Update one setting from a `key=value` pair.
    pub fn set(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| TrackerError::Config(format!("Expected KEY=VALUE, got: {}", assignment)))?;
        let (key, value) = (key.trim(), value.trim());

        match key {
            "language" => self.language = value.parse()?,
            "auto_refresh" => self.auto_refresh = parse_value(key, value)?,
            "refresh_interval_minutes" => {
                let minutes: u32 = parse_value(key, value)?;
                if !(MIN_REFRESH_MINUTES..=MAX_REFRESH_MINUTES).contains(&minutes) {
                    return Err(TrackerError::Config(format!(
                        "refresh_interval_minutes must be between {} and {}",
                        MIN_REFRESH_MINUTES, MAX_REFRESH_MINUTES
                    )));
                }
                self.refresh_interval_minutes = minutes;
            }
            "endpoint" => self.endpoint = value.to_string(),
            "timeout_secs" => self.timeout_secs = parse_value(key, value)?,
            "poll_interval_ms" => self.poll_interval_ms = parse_value(key, value)?,
            "database" => self.database = Some(PathBuf::from(value)),
            "export_path" => self.export_path = Some(PathBuf::from(value)),
            "log_file" => self.log_file = Some(PathBuf::from(value)),
            "worker_threads" => self.worker_threads = Some(parse_value(key, value)?),
            other => return Err(TrackerError::Config(format!("Unknown setting: {}", other))),
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| app_dir().join(DATABASE_FILE))
    }

    pub fn export_path(&self) -> PathBuf {
        self.export_path
            .clone()
            .unwrap_or_else(|| home_dir().join(EXPORT_FILE))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| app_dir().join(LOG_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Auto-refresh period, or `None` when disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.auto_refresh
            .then(|| Duration::from_secs(u64::from(self.refresh_interval_minutes) * 60))
    }
}

/// The settings file as the user wrote it. CLI flags and environment
/// overrides are layered on a copy and never written back.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
    settings: Settings,
}

impl SettingsFile {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            settings: Settings::load(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the stored values and write them out. The in-memory copy is
    /// updated even when the write fails.
    pub fn store(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings;
        self.settings.save(&self.path)
    }

    /// Apply `key=value` assignments and save. Nothing is written unless all
    /// of them parse.
    pub fn apply(&mut self, assignments: &[String]) -> Result<()> {
        let mut next = self.settings.clone();
        for assignment in assignments {
            next.set(assignment)?;
        }
        self.store(next)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| TrackerError::Config(format!("Invalid value for {}: {}", key, e)))
}
