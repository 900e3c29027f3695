//! Synthetic capture backend
//!
//! Hardware-free sources used by the test suite and by `record --synthetic`:
//! a moving test pattern with a sine-tone system mix, a camera and a
//! microphone that write Y4M/WAV through the regular sinks, and an input
//! source that replays a fixed click/keystroke sequence along a circular
//! pointer path. Faults can be injected per device.

use crate::capture::traits::{
    CameraConfig, CaptureBackend, CaptureSource, DisplayInfo, FileRecorder, InputCallback,
    InputEvent, InputKind, InputSource, MicrophoneConfig, PointerReader, Rect, SampleCallback,
    ScreenSourceConfig, WindowInfo,
};
use crate::recorder::channel::{RecordingError, RecordingResult};
use crate::sink::{
    AudioBuffer, AudioSettings, EncodingParams, Sample, SampleSink, VideoFrame, VideoSettings,
};
use async_trait::async_trait;
use std::f64::consts::TAU;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Generator loop granularity
const TICK: Duration = Duration::from_millis(10);

/// Interval between replayed input events
const INPUT_EVENT_INTERVAL: Duration = Duration::from_millis(250);

/// Injected failures
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub camera_missing: bool,
    pub camera_denied: bool,
    pub microphone_missing: bool,
    pub microphone_denied: bool,
    pub screen_open_fails: bool,
    /// Time the camera and microphone take to settle after starting
    pub device_warm_up: Duration,
}

/// Deterministic, hardware-free [`CaptureBackend`]
pub struct SyntheticBackend {
    displays: Vec<DisplayInfo>,
    windows: Vec<WindowInfo>,
    faults: Faults,
    live: Arc<AtomicUsize>,
    epoch: Instant,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::with_faults(Faults::default())
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            displays: vec![DisplayInfo {
                id: 1,
                name: "Synthetic Display".to_string(),
                bounds: Rect::new(0.0, 0.0, 640.0, 360.0),
                scale_factor: 1.0,
                is_primary: true,
                refresh_rate: Some(60),
            }],
            windows: vec![WindowInfo {
                id: 100,
                title: "Synthetic Window".to_string(),
                app_name: "multitrack-recorder".to_string(),
                bounds: Rect::new(40.0, 40.0, 320.0, 240.0),
                is_on_screen: true,
            }],
            faults,
            live: Arc::new(AtomicUsize::new(0)),
            epoch: Instant::now(),
        }
    }

    /// Replace the display list
    pub fn with_displays(mut self, displays: Vec<DisplayInfo>) -> Self {
        self.displays = displays;
        self
    }

    /// Number of sources currently delivering data
    pub fn live_sources(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Pointer position on a circle around the primary display center
    fn pointer_at(bounds: Rect, elapsed: Duration) -> (f64, f64) {
        let angle = elapsed.as_secs_f64() * TAU / 4.0;
        let radius = bounds.width.min(bounds.height) / 4.0;
        (
            bounds.x + bounds.width / 2.0 + radius * angle.cos(),
            bounds.y + bounds.height / 2.0 + radius * angle.sin(),
        )
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SyntheticBackend {
    fn displays(&self) -> Vec<DisplayInfo> {
        self.displays.clone()
    }

    fn windows(&self) -> Vec<WindowInfo> {
        self.windows.clone()
    }

    fn open_screen(&self, config: &ScreenSourceConfig) -> RecordingResult<Box<dyn CaptureSource>> {
        if self.faults.screen_open_fails {
            return Err(RecordingError::CaptureError(
                "display stream could not be opened".to_string(),
            ));
        }
        Ok(Box::new(SyntheticScreen {
            config: config.clone(),
            callback: None,
            live: self.live.clone(),
            generator: None,
        }))
    }

    fn camera(&self, config: &CameraConfig) -> RecordingResult<Box<dyn FileRecorder>> {
        if self.faults.camera_denied {
            return Err(RecordingError::PermissionDenied("camera access denied".to_string()));
        }
        if self.faults.camera_missing {
            return Err(RecordingError::DeviceUnavailable("no camera connected".to_string()));
        }
        Ok(Box::new(SyntheticRecorder {
            device: SyntheticDevice::Camera(config.clone()),
            live: self.live.clone(),
            warm_up: self.faults.device_warm_up,
            running: None,
        }))
    }

    fn microphone(&self, config: &MicrophoneConfig) -> RecordingResult<Box<dyn FileRecorder>> {
        if self.faults.microphone_denied {
            return Err(RecordingError::PermissionDenied(
                "microphone access denied".to_string(),
            ));
        }
        if self.faults.microphone_missing {
            return Err(RecordingError::DeviceUnavailable(
                "no microphone connected".to_string(),
            ));
        }
        Ok(Box::new(SyntheticRecorder {
            device: SyntheticDevice::Microphone(config.clone()),
            live: self.live.clone(),
            warm_up: self.faults.device_warm_up,
            running: None,
        }))
    }

    fn input(&self) -> RecordingResult<Box<dyn InputSource>> {
        let bounds = self
            .displays
            .iter()
            .find(|d| d.is_primary)
            .or(self.displays.first())
            .map(|d| d.bounds)
            .unwrap_or(Rect::new(0.0, 0.0, 640.0, 360.0));
        Ok(Box::new(SyntheticInput {
            bounds,
            epoch: self.epoch,
            callback: None,
            live: self.live.clone(),
            generator: None,
        }))
    }
}

/// Background thread calling `tick` until stopped
struct Generator {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Generator {
    /// `tick` receives the time since the generator started
    fn spawn<F>(live: Arc<AtomicUsize>, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut(Duration) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        live.fetch_add(1, Ordering::SeqCst);

        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            while flag.load(Ordering::SeqCst) {
                tick(start.elapsed());
                std::thread::sleep(interval);
            }
            live.fetch_sub(1, Ordering::SeqCst);
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// Stop the thread and wait for its last tick
    async fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };
        if tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_or(true, |joined| joined.is_err())
        {
            tracing::warn!("Synthetic generator thread panicked");
        }
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        // Dropped without stop(): let the thread wind down on its own
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Moving vertical bar on a gray background
fn test_pattern(width: u32, height: u32, index: u64) -> VideoFrame {
    let (w, h) = (width as usize, height as usize);
    let bar = (index as usize * 4) % w.max(1);
    let mut data = vec![0u8; w * h * 4];
    for (i, px) in data.chunks_exact_mut(4).enumerate() {
        let x = i % w;
        let value = if x.abs_diff(bar) < 8 { 235 } else { 64 };
        px.copy_from_slice(&[value, value, value, 255]);
    }
    VideoFrame::bgra(width, height, data)
}

/// Interleaved sine tone covering `frames` frames starting at `first_frame`
fn sine_tone(settings: AudioSettings, frequency: f64, first_frame: u64, frames: u64) -> AudioBuffer {
    let rate = f64::from(settings.sample_rate);
    let channels = usize::from(settings.channels);
    let mut samples = Vec::with_capacity(frames as usize * channels);
    for n in first_frame..first_frame + frames {
        let value = (0.2 * (TAU * frequency * n as f64 / rate).sin()) as f32;
        samples.extend(std::iter::repeat(value).take(channels));
    }
    AudioBuffer {
        samples: samples.into(),
        sample_rate: settings.sample_rate,
        channels: settings.channels,
    }
}

/// Emits frames at `fps` and audio in step with the wall clock
struct StreamClock {
    frame_interval: Duration,
    next_frame: Duration,
    frame_index: u64,
    audio: Option<AudioSettings>,
    audio_frames: u64,
}

impl StreamClock {
    fn new(fps: u32, audio: Option<AudioSettings>) -> Self {
        Self {
            frame_interval: Duration::from_secs(1) / fps.max(1),
            next_frame: Duration::ZERO,
            frame_index: 0,
            audio,
            audio_frames: 0,
        }
    }

    /// Frame index due at `now`, if any
    fn frame_due(&mut self, now: Duration) -> Option<(Duration, u64)> {
        if now < self.next_frame {
            return None;
        }
        let due = (self.next_frame, self.frame_index);
        self.frame_index += 1;
        self.next_frame += self.frame_interval;
        Some(due)
    }

    /// Audio owed up to `now`: (pts, buffer)
    fn audio_due(&mut self, now: Duration, frequency: f64) -> Option<(Duration, AudioBuffer)> {
        let settings = self.audio?;
        let target = (now.as_secs_f64() * f64::from(settings.sample_rate)) as u64;
        if target <= self.audio_frames {
            return None;
        }
        let pts = Duration::from_secs_f64(self.audio_frames as f64 / f64::from(settings.sample_rate));
        let buffer = sine_tone(settings, frequency, self.audio_frames, target - self.audio_frames);
        self.audio_frames = target;
        Some((pts, buffer))
    }
}

/// Test-pattern screen with an optional sine-tone system mix
struct SyntheticScreen {
    config: ScreenSourceConfig,
    callback: Option<SampleCallback>,
    live: Arc<AtomicUsize>,
    generator: Option<Generator>,
}

#[async_trait]
impl CaptureSource for SyntheticScreen {
    fn on_sample(&mut self, callback: SampleCallback) {
        self.callback = Some(callback);
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.generator.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        let callback = self.callback.clone().ok_or_else(|| {
            RecordingError::CaptureError("no sample handler registered".to_string())
        })?;

        let (width, height) = (self.config.width, self.config.height);
        let mut clock = StreamClock::new(self.config.fps, self.config.system_audio);
        self.generator = Some(Generator::spawn(self.live.clone(), TICK, move |now| {
            if let Some((pts, index)) = clock.frame_due(now) {
                callback(Sample::video(pts, test_pattern(width, height, index)));
            }
            if let Some((pts, buffer)) = clock.audio_due(now, 440.0) {
                callback(Sample::audio(pts, buffer));
            }
        }));

        tracing::debug!(
            "Synthetic screen started: {}x{} @ {}fps, system audio: {}",
            width,
            height,
            self.config.fps,
            self.config.system_audio.is_some()
        );
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(generator) = self.generator.take() {
            generator.stop().await;
            tracing::debug!("Synthetic screen stopped");
        }
    }
}

enum SyntheticDevice {
    Camera(CameraConfig),
    Microphone(MicrophoneConfig),
}

/// Camera or microphone writing its own file through a [`SampleSink`]
struct SyntheticRecorder {
    device: SyntheticDevice,
    live: Arc<AtomicUsize>,
    warm_up: Duration,
    running: Option<(Generator, Arc<SampleSink>)>,
}

#[async_trait]
impl FileRecorder for SyntheticRecorder {
    fn extension(&self) -> &'static str {
        match self.device {
            SyntheticDevice::Camera(_) => "y4m",
            SyntheticDevice::Microphone(_) => "wav",
        }
    }

    async fn start(&mut self, destination: &Path) -> RecordingResult<()> {
        if self.running.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let (params, mut clock, frame_size) = match &self.device {
            SyntheticDevice::Camera(config) => (
                EncodingParams::Video(VideoSettings::new(
                    config.resolution.width,
                    config.resolution.height,
                    config.fps,
                )),
                StreamClock::new(config.fps, None),
                Some((config.resolution.width, config.resolution.height)),
            ),
            SyntheticDevice::Microphone(config) => (
                EncodingParams::Audio(config.audio),
                // Video half of the clock unused
                StreamClock::new(1, Some(config.audio)),
                None,
            ),
        };

        let sink = Arc::new(SampleSink::open(destination, params)?);
        let writer = sink.clone();
        let generator = Generator::spawn(self.live.clone(), TICK, move |now| match frame_size {
            Some((width, height)) => {
                if let Some((pts, index)) = clock.frame_due(now) {
                    writer.accept(Sample::video(pts, test_pattern(width, height, index)));
                }
            }
            None => {
                if let Some((pts, buffer)) = clock.audio_due(now, 220.0) {
                    writer.accept(Sample::audio(pts, buffer));
                }
            }
        });

        self.running = Some((generator, sink));
        tracing::debug!("Synthetic {} recording to {}", self.extension(), destination.display());
        if !self.warm_up.is_zero() {
            tokio::time::sleep(self.warm_up).await;
        }
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        let Some((generator, sink)) = self.running.take() else {
            return Ok(());
        };
        generator.stop().await;
        sink.finish().await
    }
}

/// Replays a click/keystroke cycle along a circular pointer path
struct SyntheticInput {
    bounds: Rect,
    epoch: Instant,
    callback: Option<InputCallback>,
    live: Arc<AtomicUsize>,
    generator: Option<Generator>,
}

#[async_trait]
impl InputSource for SyntheticInput {
    fn on_event(&mut self, callback: InputCallback) {
        self.callback = Some(callback);
    }

    fn pointer_reader(&self) -> PointerReader {
        let (bounds, epoch) = (self.bounds, self.epoch);
        Arc::new(move || Some(SyntheticBackend::pointer_at(bounds, epoch.elapsed())))
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.generator.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        let callback = self.callback.clone().ok_or_else(|| {
            RecordingError::CaptureError("no input handler registered".to_string())
        })?;

        let (bounds, epoch) = (self.bounds, self.epoch);
        let mut next_event = INPUT_EVENT_INTERVAL;
        let mut index = 0u64;
        self.generator = Some(Generator::spawn(self.live.clone(), TICK, move |now| {
            if now < next_event {
                return;
            }
            next_event += INPUT_EVENT_INTERVAL;
            let position = Some(SyntheticBackend::pointer_at(bounds, epoch.elapsed()));
            let event = match index % 3 {
                0 => InputEvent {
                    kind: InputKind::ClickPrimary,
                    position,
                    key: None,
                },
                1 => InputEvent {
                    kind: InputKind::KeyDown,
                    position: None,
                    key: Some(((b'a' + (index % 26) as u8) as char).to_string()),
                },
                _ => InputEvent {
                    kind: InputKind::ClickSecondary,
                    position,
                    key: None,
                },
            };
            index += 1;
            callback(event);
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(generator) = self.generator.take() {
            generator.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_stream_clock_paces_frames_and_audio() {
        let mut clock = StreamClock::new(10, Some(AudioSettings::default()));

        assert_eq!(clock.frame_due(Duration::ZERO), Some((Duration::ZERO, 0)));
        assert_eq!(clock.frame_due(Duration::from_millis(50)), None);
        assert_eq!(
            clock.frame_due(Duration::from_millis(100)),
            Some((Duration::from_millis(100), 1))
        );

        let (pts, buffer) = clock.audio_due(Duration::from_millis(10), 440.0).unwrap();
        assert_eq!(pts, Duration::ZERO);
        assert_eq!(buffer.frames(), 480);
        let (pts, _) = clock.audio_due(Duration::from_millis(20), 440.0).unwrap();
        assert_eq!(pts, Duration::from_millis(10));
    }

    #[test]
    fn test_pattern_has_requested_size() {
        let frame = test_pattern(16, 8, 3);
        assert_eq!(frame.data.len(), 16 * 8 * 4);
        assert_eq!(frame.bytes_per_row, 64);
    }

    #[tokio::test]
    async fn test_screen_source_delivers_until_stopped() {
        let backend = SyntheticBackend::new();
        let config = ScreenSourceConfig {
            display_id: 1,
            window_id: None,
            source_rect: None,
            width: 16,
            height: 16,
            fps: 50,
            system_audio: Some(AudioSettings::default()),
            exclude_current_process_audio: true,
        };
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut source = backend.open_screen(&config).unwrap();
        {
            let received = received.clone();
            source.on_sample(Arc::new(move |sample| received.lock().push(sample.kind())));
        }

        source.start().await.unwrap();
        assert_eq!(backend.live_sources(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        source.stop().await;
        assert_eq!(backend.live_sources(), 0);

        let count = received.lock().len();
        assert!(count > 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(received.lock().len(), count);
    }

    #[test]
    fn test_faults_surface_as_typed_errors() {
        let backend = SyntheticBackend::with_faults(Faults {
            camera_denied: true,
            microphone_missing: true,
            ..Default::default()
        });
        let camera = CameraConfig {
            device_id: None,
            resolution: crate::capture::traits::Resolution {
                width: 32,
                height: 24,
            },
            fps: 10,
        };
        let mic = MicrophoneConfig {
            device_id: None,
            audio: AudioSettings::default(),
        };

        assert!(matches!(
            backend.camera(&camera),
            Err(RecordingError::PermissionDenied(_))
        ));
        assert!(matches!(
            backend.microphone(&mic),
            Err(RecordingError::DeviceUnavailable(_))
        ));
    }
}
