//! Recorder settings
//!
//! Persistent settings live in `<config_dir>/multitrack-recorder/config.toml`.
//! Every field has a default, so a partial file only overrides what it names
//! and a missing file yields the defaults.

use crate::sink::{AudioSettings, VideoContainer};
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// What to do when an optional device (camera or microphone) is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDevicePolicy {
    /// Omit the track and keep recording
    #[default]
    Skip,
    /// Fail the session start
    Fail,
}

/// Camera capture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Device index or name (None = default camera)
    pub device_id: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_id: None,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Base directory session folders are created in
    pub output_dir: PathBuf,

    /// Screen frame rate
    pub fps: u32,

    /// Container for the screen and camera video tracks
    pub container: VideoContainer,

    /// FFmpeg binary used by the `mp4` container
    pub ffmpeg_path: PathBuf,

    pub system_audio: bool,
    pub camera: bool,
    pub microphone: bool,
    pub interactions: bool,

    /// Microphone device name (None = default input)
    pub microphone_device: Option<String>,

    /// Pointer position sampling interval in milliseconds
    pub pointer_interval_ms: u64,

    /// Applies to camera and microphone
    pub missing_device: MissingDevicePolicy,

    /// Format of the system audio and microphone tracks
    pub audio: AudioSettings,

    pub camera_settings: CameraSettings,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            fps: 30,
            container: VideoContainer::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            audio: AudioSettings::default(),
            system_audio: true,
            camera: true,
            microphone: true,
            interactions: true,
            microphone_device: None,
            camera_settings: CameraSettings::default(),
            pointer_interval_ms: 1000,
            missing_device: MissingDevicePolicy::default(),
        }
    }
}

impl RecorderSettings {
    /// Pointer sampling interval
    pub fn pointer_interval(&self) -> Duration {
        Duration::from_millis(self.pointer_interval_ms.max(1))
    }

    /// Reject settings no session could start with
    pub fn validate(&self) -> AppResult<()> {
        if self.fps == 0 {
            return Err(AppError::Config("fps must be positive".to_string()));
        }
        if self.camera_settings.fps == 0 {
            return Err(AppError::Config("camera fps must be positive".to_string()));
        }
        if self.audio.sample_rate == 0 || self.audio.channels == 0 {
            return Err(AppError::Config(format!(
                "invalid audio format {}Hz/{}ch",
                self.audio.sample_rate, self.audio.channels
            )));
        }
        Ok(())
    }

    /// Parse settings from TOML
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to TOML
    pub fn to_toml(&self) -> AppResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Default base directory for recordings
pub fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recordings")
}

/// Settings file store
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store at the default location
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("multitrack-recorder");

        Self {
            path: config_dir.join("config.toml"),
        }
    }

    /// Store at a custom path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load settings, falling back to defaults when the file is missing
    pub async fn load(&self) -> AppResult<RecorderSettings> {
        if !self.exists() {
            tracing::debug!("No settings at {}, using defaults", self.path.display());
            return Ok(RecorderSettings::default());
        }

        let content = fs::read_to_string(&self.path).await?;
        RecorderSettings::from_toml(&content)
    }

    pub async fn save(&self, settings: &RecorderSettings) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&self.path, settings.to_toml()?).await?;
        tracing::info!("Saved settings to {}", self.path.display());
        Ok(())
    }

    /// Write a default settings file. Fails if one already exists.
    pub async fn init(&self) -> AppResult<()> {
        if self.exists() {
            return Err(AppError::Config(format!(
                "settings already exist at {}",
                self.path.display()
            )));
        }
        self.save(&RecorderSettings::default()).await
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}
