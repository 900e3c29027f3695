//! Camera recorder using nokhwa
//!
//! Raw frames are passed to FFmpeg in the camera's native pixel format; the
//! conversion to yuv420p happens inside FFmpeg.

use crate::capture::traits::{CameraConfig, FileRecorder};
use crate::recorder::channel::{RecordingError, RecordingResult};
use crate::sink::video::ffmpeg_command;
use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as CameraResolution,
};
use nokhwa::Camera;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;

/// FFmpeg pixel format for a nokhwa frame format
fn ffmpeg_pixel_format(format: FrameFormat) -> &'static str {
    match format {
        FrameFormat::YUYV => "yuyv422",
        FrameFormat::NV12 => "nv12",
        FrameFormat::RAWRGB => "rgb24",
        FrameFormat::MJPEG => "mjpeg",
        other => {
            tracing::warn!("Unknown camera format {:?}, falling back to yuyv422", other);
            "yuyv422"
        }
    }
}

/// Camera recording into an MP4 file
pub struct NativeCamera {
    index: CameraIndex,
    config: CameraConfig,
    ffmpeg_path: PathBuf,
    running: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<RecordingResult<u64>>>,
}

impl NativeCamera {
    /// Resolve the requested camera. Fails with `DeviceUnavailable` when no
    /// camera is connected.
    pub fn open(config: &CameraConfig, ffmpeg_path: &Path) -> RecordingResult<Self> {
        let cameras = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| RecordingError::DeviceUnavailable(format!("camera query failed: {e}")))?;
        if cameras.is_empty() {
            return Err(RecordingError::DeviceUnavailable("no camera connected".to_string()));
        }

        let index = match &config.device_id {
            Some(id) => match id.parse::<u32>() {
                Ok(idx) => CameraIndex::Index(idx),
                Err(_) => CameraIndex::String(id.clone()),
            },
            None => cameras[0].index().clone(),
        };

        Ok(Self {
            index,
            config: config.clone(),
            ffmpeg_path: ffmpeg_path.to_path_buf(),
            running: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
        })
    }
}

#[async_trait]
impl FileRecorder for NativeCamera {
    fn extension(&self) -> &'static str {
        "mp4"
    }

    async fn start(&mut self, destination: &Path) -> RecordingResult<()> {
        if self.capture_thread.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let index = self.index.clone();
        let requested = CameraFormat::new(
            CameraResolution::new(self.config.resolution.width, self.config.resolution.height),
            FrameFormat::YUYV,
            self.config.fps,
        );
        let ffmpeg = self.ffmpeg_path.clone();
        let output = destination.to_path_buf();
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);
        let (ready_tx, ready_rx) = oneshot::channel::<RecordingResult<()>>();

        // nokhwa's Camera is not Send: open, capture and close on one thread
        let handle = std::thread::spawn(move || -> RecordingResult<u64> {
            let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(requested));
            let opened = Camera::new(index.clone(), format).and_then(|mut camera| {
                camera.open_stream()?;
                Ok(camera)
            });
            let mut camera = match opened {
                Ok(camera) => camera,
                Err(e) => {
                    let message = format!("camera {index}: {e}");
                    let _ = ready_tx.send(Err(RecordingError::DeviceUnavailable(message.clone())));
                    return Err(RecordingError::DeviceUnavailable(message));
                }
            };

            let camera_format = camera.camera_format();
            let (width, height) = (
                camera_format.resolution().width(),
                camera_format.resolution().height(),
            );
            let fps = camera_format.frame_rate();
            let pixel_format = ffmpeg_pixel_format(camera_format.format());

            let mut process = match ffmpeg_command(&ffmpeg, pixel_format, width, height, fps, &output)
                .spawn()
            {
                Ok(process) => process,
                Err(e) => {
                    let _ = camera.stop_stream();
                    let _ = ready_tx.send(Err(RecordingError::cannot_create(&output, e)));
                    return Ok(0);
                }
            };
            let _ = ready_tx.send(Ok(()));

            tracing::info!(
                "Camera opened: {}x{} @ {}fps, format {}",
                width,
                height,
                fps,
                pixel_format
            );

            let mut frames = 0u64;
            if let Some(stdin) = process.stdin.as_mut() {
                while running.load(Ordering::SeqCst) {
                    match camera.frame() {
                        Ok(frame) => {
                            if let Err(e) = stdin.write_all(frame.buffer()) {
                                tracing::warn!("FFmpeg camera stdin closed early: {}", e);
                                break;
                            }
                            frames += 1;
                        }
                        Err(e) => tracing::debug!("Failed to capture camera frame: {:?}", e),
                    }
                }
            }

            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Error stopping camera stream: {:?}", e);
            }

            drop(process.stdin.take());
            let result = process.wait_with_output()?;
            if !result.status.success() {
                return Err(RecordingError::EncodingError(format!(
                    "FFmpeg exited with status {}: {}",
                    result.status,
                    String::from_utf8_lossy(&result.stderr)
                )));
            }
            Ok(frames)
        });
        self.capture_thread = Some(handle);

        match ready_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stop().await?;
                Err(e)
            }
            Err(_) => {
                self.stop().await?;
                Err(RecordingError::CaptureError("camera thread exited".to_string()))
            }
        }
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.capture_thread.take() else {
            return Ok(());
        };

        let joined = tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| RecordingError::CaptureError(e.to_string()))?;
        match joined {
            Ok(Ok(frames)) => {
                tracing::info!("Camera stopped after {} frames", frames);
                Ok(())
            }
            Ok(Err(RecordingError::DeviceUnavailable(_))) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RecordingError::CaptureError("camera thread panicked".to_string())),
        }
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        if self.capture_thread.is_some() {
            tracing::warn!("Camera dropped while recording");
        }
        self.running.store(false, Ordering::SeqCst);
    }
}
