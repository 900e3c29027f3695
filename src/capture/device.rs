//! Camera and microphone capture units
//!
//! Both devices come with their own recorder that encodes into its own file,
//! so the unit only decides where the file goes and what happens when the
//! device is missing.

use crate::capture::traits::{CameraConfig, CaptureBackend, FileRecorder, MicrophoneConfig};
use crate::config::MissingDevicePolicy;
use crate::recorder::channel::{
    CaptureUnit, RecordingError, RecordingResult, SessionContext, UnitKind,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Which device the unit records
#[derive(Debug, Clone)]
pub enum DeviceConfig {
    Camera(CameraConfig),
    Microphone(MicrophoneConfig),
}

impl DeviceConfig {
    fn kind(&self) -> UnitKind {
        match self {
            DeviceConfig::Camera(_) => UnitKind::Camera,
            DeviceConfig::Microphone(_) => UnitKind::Microphone,
        }
    }

    /// Output file stem inside the session directory
    fn file_stem(&self) -> &'static str {
        match self {
            DeviceConfig::Camera(_) => "camera",
            DeviceConfig::Microphone(_) => "mic",
        }
    }
}

/// Capture unit wrapping a device's own recorder
pub struct DeviceCaptureUnit {
    backend: Arc<dyn CaptureBackend>,
    config: DeviceConfig,
    policy: MissingDevicePolicy,
    recorder: Option<Box<dyn FileRecorder>>,
    destination: Option<PathBuf>,
    is_recording: bool,
    skip_reason: Option<String>,
    output_files: Vec<PathBuf>,
}

impl DeviceCaptureUnit {
    pub fn camera(
        backend: Arc<dyn CaptureBackend>,
        config: CameraConfig,
        policy: MissingDevicePolicy,
    ) -> Self {
        Self::new(backend, DeviceConfig::Camera(config), policy)
    }

    pub fn microphone(
        backend: Arc<dyn CaptureBackend>,
        config: MicrophoneConfig,
        policy: MissingDevicePolicy,
    ) -> Self {
        Self::new(backend, DeviceConfig::Microphone(config), policy)
    }

    fn new(
        backend: Arc<dyn CaptureBackend>,
        config: DeviceConfig,
        policy: MissingDevicePolicy,
    ) -> Self {
        Self {
            backend,
            config,
            policy,
            recorder: None,
            destination: None,
            is_recording: false,
            skip_reason: None,
            output_files: Vec::new(),
        }
    }

    /// Apply the missing-device policy to `error`
    fn absorb(&mut self, error: RecordingError) -> RecordingResult<()> {
        match (&error, self.policy) {
            (RecordingError::DeviceUnavailable(reason), MissingDevicePolicy::Skip) => {
                tracing::warn!("{} unavailable, recording without it: {}", self.kind(), reason);
                self.skip_reason = Some(error.to_string());
                self.recorder = None;
                Ok(())
            }
            _ => Err(error),
        }
    }
}

#[async_trait]
impl CaptureUnit for DeviceCaptureUnit {
    fn id(&self) -> &str {
        self.config.file_stem()
    }

    fn kind(&self) -> UnitKind {
        self.config.kind()
    }

    async fn initialize(&mut self, session: &SessionContext) -> RecordingResult<()> {
        let opened = match &self.config {
            DeviceConfig::Camera(config) => self.backend.camera(config),
            DeviceConfig::Microphone(config) => self.backend.microphone(config),
        };

        let recorder = match opened {
            Ok(recorder) => recorder,
            Err(e) => return self.absorb(e),
        };

        let destination =
            session.file(&format!("{}.{}", self.config.file_stem(), recorder.extension()));
        tracing::info!("{} unit initialized -> {}", self.kind(), destination.display());

        self.destination = Some(destination);
        self.recorder = Some(recorder);
        Ok(())
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.is_recording {
            return Err(RecordingError::AlreadyRecording);
        }
        let (Some(recorder), Some(destination)) = (self.recorder.as_mut(), &self.destination)
        else {
            // Skipped during initialize
            return Ok(());
        };

        if let Err(e) = recorder.start(destination).await {
            return self.absorb(e);
        }
        self.is_recording = true;

        tracing::info!("{} capture started", self.kind());
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        let was_recording = std::mem::replace(&mut self.is_recording, false);
        let Some(mut recorder) = self.recorder.take() else {
            return Ok(());
        };
        // An interrupted start may have left the device running, so the
        // recorder is stopped even when start never returned
        recorder.stop().await?;
        if !was_recording {
            return Ok(());
        }

        if let Some(destination) = self.destination.take() {
            self.output_files.push(destination);
        }
        tracing::info!("{} capture stopped", self.kind());
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.is_recording
    }

    fn output_files(&self) -> Vec<PathBuf> {
        self.output_files.clone()
    }

    fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }
}
