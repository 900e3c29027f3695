//! Microphone recorder using cpal
//!
//! The input stream lives on its own thread (`cpal::Stream` is not `Send`)
//! and feeds a WAV [`SampleSink`] at the device's native rate and layout.

use crate::capture::traits::{FileRecorder, MicrophoneConfig};
use crate::recorder::channel::{RecordingError, RecordingResult};
use crate::sink::{AudioBuffer, AudioSettings, EncodingParams, Sample, SampleSink};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

/// Find the named input device, or the default one
fn input_device(name: Option<&str>) -> RecordingResult<Device> {
    let host = cpal::default_host();
    let device = match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
        None => host.default_input_device(),
    };
    device.ok_or_else(|| {
        RecordingError::DeviceUnavailable(match name {
            Some(name) => format!("microphone '{name}' not found"),
            None => "no microphone connected".to_string(),
        })
    })
}

/// Microphone recording into a WAV file
pub struct NativeMicrophone {
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    stream_thread: Option<JoinHandle<()>>,
    sink: Option<Arc<SampleSink>>,
}

impl NativeMicrophone {
    /// Resolve the requested input device
    pub fn open(config: &MicrophoneConfig) -> RecordingResult<Self> {
        let device = input_device(config.device_id.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        tracing::info!(
            "Microphone resolved: {} (requested {}Hz/{}ch)",
            name,
            config.audio.sample_rate,
            config.audio.channels
        );

        Ok(Self {
            device_name: config.device_id.clone(),
            running: Arc::new(AtomicBool::new(false)),
            stream_thread: None,
            sink: None,
        })
    }
}

#[async_trait]
impl FileRecorder for NativeMicrophone {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn start(&mut self, destination: &Path) -> RecordingResult<()> {
        if self.stream_thread.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let device = input_device(self.device_name.as_deref())?;
        let supported = device
            .default_input_config()
            .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(RecordingError::UnsupportedConfiguration(format!(
                "microphone sample format {:?}",
                supported.sample_format()
            )));
        }
        let stream_config: StreamConfig = supported.config();
        let settings = AudioSettings {
            sample_rate: stream_config.sample_rate.0,
            channels: stream_config.channels,
        };

        let sink = Arc::new(SampleSink::open(destination, EncodingParams::Audio(settings))?);
        self.sink = Some(sink.clone());

        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);
        let device_name = self.device_name.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<RecordingResult<()>>();

        let handle = std::thread::spawn(move || {
            let device = match input_device(device_name.as_deref()) {
                Ok(device) => device,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let frames_seen = AtomicU64::new(0);
            let writer = sink.clone();
            let stream = device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let frames = (data.len() / usize::from(settings.channels)) as u64;
                    let first = frames_seen.fetch_add(frames, Ordering::Relaxed);
                    let pts = Duration::from_secs_f64(first as f64 / f64::from(settings.sample_rate));
                    writer.accept(Sample::audio(
                        pts,
                        AudioBuffer {
                            samples: data.into(),
                            sample_rate: settings.sample_rate,
                            channels: settings.channels,
                        },
                    ));
                },
                |err| tracing::error!("Microphone stream error: {}", err),
                None,
            );

            let stream = match stream.map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    RecordingError::DeviceUnavailable("microphone disconnected".to_string())
                }
                other => RecordingError::CaptureError(other.to_string()),
            }) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(RecordingError::CaptureError(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            tracing::info!("Microphone stream started");

            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
            tracing::info!("Microphone stream stopped");
        });
        self.stream_thread = Some(handle);

        let started = ready_rx
            .await
            .unwrap_or_else(|_| Err(RecordingError::CaptureError("microphone thread exited".into())));
        if let Err(e) = started {
            self.stop().await?;
            return Err(e);
        }
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.stream_thread.take() {
            let joined = tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| RecordingError::CaptureError(e.to_string()))?;
            if joined.is_err() {
                tracing::warn!("Microphone thread panicked");
            }
        }

        match self.sink.take() {
            Some(sink) => sink.finish().await,
            None => Ok(()),
        }
    }
}

impl Drop for NativeMicrophone {
    fn drop(&mut self) {
        // Dropped without stop(): release the stream thread
        if self.stream_thread.is_some() {
            tracing::warn!("Microphone dropped while recording");
        }
        self.running.store(false, Ordering::SeqCst);
    }
}
