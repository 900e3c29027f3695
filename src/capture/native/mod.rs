//! Real camera and microphone devices
//!
//! Screen and input capture are platform specific and come from the wrapped
//! backend; camera and microphone are taken from the host devices when the
//! `native-camera` / `native-audio` features are enabled.

#[cfg(feature = "native-camera")]
pub mod camera;

#[cfg(feature = "native-audio")]
pub mod microphone;

use crate::capture::traits::{
    CameraConfig, CaptureBackend, CaptureSource, DisplayInfo, FileRecorder, InputSource,
    MicrophoneConfig, ScreenSourceConfig, WindowInfo,
};
use crate::recorder::channel::RecordingResult;
use std::path::PathBuf;
use std::sync::Arc;

/// Backend recording camera and microphone from host devices
pub struct NativeDeviceBackend {
    inner: Arc<dyn CaptureBackend>,
    #[cfg_attr(not(feature = "native-camera"), allow(dead_code))]
    ffmpeg_path: PathBuf,
}

impl NativeDeviceBackend {
    /// Wrap `inner`, which still provides displays, screen and input
    pub fn new(inner: Arc<dyn CaptureBackend>, ffmpeg_path: PathBuf) -> Self {
        Self { inner, ffmpeg_path }
    }
}

impl CaptureBackend for NativeDeviceBackend {
    fn displays(&self) -> Vec<DisplayInfo> {
        self.inner.displays()
    }

    fn windows(&self) -> Vec<WindowInfo> {
        self.inner.windows()
    }

    fn open_screen(&self, config: &ScreenSourceConfig) -> RecordingResult<Box<dyn CaptureSource>> {
        self.inner.open_screen(config)
    }

    fn camera(&self, config: &CameraConfig) -> RecordingResult<Box<dyn FileRecorder>> {
        #[cfg(feature = "native-camera")]
        {
            Ok(Box::new(camera::NativeCamera::open(config, &self.ffmpeg_path)?))
        }
        #[cfg(not(feature = "native-camera"))]
        {
            tracing::debug!("native-camera disabled, using the wrapped backend's camera");
            self.inner.camera(config)
        }
    }

    fn microphone(&self, config: &MicrophoneConfig) -> RecordingResult<Box<dyn FileRecorder>> {
        #[cfg(feature = "native-audio")]
        {
            Ok(Box::new(microphone::NativeMicrophone::open(config)?))
        }
        #[cfg(not(feature = "native-audio"))]
        {
            tracing::debug!("native-audio disabled, using the wrapped backend's microphone");
            self.inner.microphone(config)
        }
    }

    fn input(&self) -> RecordingResult<Box<dyn InputSource>> {
        self.inner.input()
    }
}
