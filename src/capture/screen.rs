//! Screen capture unit
//!
//! Resolves the selection target against the available displays, opens the
//! video sink (and the system audio sink when enabled), and routes samples
//! from the backend's screen source into them. Screen frames and the system
//! audio mix share one capture source.

use crate::capture::traits::{
    CaptureBackend, CaptureSource, DisplayInfo, Rect, ScreenSourceConfig, SelectionTarget,
    WindowInfo,
};
use crate::recorder::channel::{
    CaptureUnit, RecordingError, RecordingResult, SessionContext, UnitKind,
};
use crate::sink::{
    AudioSettings, EncodingParams, MediaKind, SampleSink, VideoContainer, VideoSettings,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Round to whole pixels, then down to an even number (minimum 2)
pub fn even_dimension(value: f64) -> u32 {
    let pixels = value.max(0.0).round() as u32;
    (pixels & !1).max(2)
}

/// A selection target resolved to one display
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub display: DisplayInfo,
    pub window_id: Option<u32>,
    /// Capture rectangle in display-local points
    pub source_rect: Option<Rect>,
    /// Output frame size in pixels
    pub width: u32,
    pub height: u32,
}

/// Pick the display overlapping `rect` the most
fn display_for(rect: &Rect, displays: &[DisplayInfo]) -> Option<(DisplayInfo, Rect)> {
    displays
        .iter()
        .filter_map(|d| d.bounds.intersection(rect).map(|overlap| (d, overlap)))
        .max_by(|a, b| a.1.area().total_cmp(&b.1.area()))
        .map(|(d, overlap)| (d.clone(), overlap))
}

/// Resolve `target` to a display, a display-local rectangle and an even
/// output size
pub fn resolve_target(
    target: &SelectionTarget,
    displays: &[DisplayInfo],
    windows: &[WindowInfo],
) -> RecordingResult<ResolvedTarget> {
    match *target {
        SelectionTarget::Display { id } => {
            let display = displays
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .ok_or_else(|| RecordingError::InvalidTarget(format!("display {id} not found")))?;
            Ok(ResolvedTarget {
                width: even_dimension(display.bounds.width * display.scale_factor),
                height: even_dimension(display.bounds.height * display.scale_factor),
                display,
                window_id: None,
                source_rect: None,
            })
        }
        SelectionTarget::Window { id } => {
            let window = windows
                .iter()
                .find(|w| w.id == id)
                .ok_or_else(|| RecordingError::InvalidTarget(format!("window {id} not found")))?;
            let (display, _) = display_for(&window.bounds, displays).ok_or_else(|| {
                RecordingError::InvalidTarget(format!("window {id} is not on any display"))
            })?;
            Ok(ResolvedTarget {
                width: even_dimension(window.bounds.width * display.scale_factor),
                height: even_dimension(window.bounds.height * display.scale_factor),
                display,
                window_id: Some(id),
                source_rect: None,
            })
        }
        SelectionTarget::Area { rect } => {
            if rect.is_empty() {
                return Err(RecordingError::InvalidTarget(format!(
                    "empty capture area {}x{}",
                    rect.width, rect.height
                )));
            }
            let (display, overlap) = display_for(&rect, displays).ok_or_else(|| {
                RecordingError::InvalidTarget("capture area is outside every display".into())
            })?;
            let local = Rect::new(
                overlap.x - display.bounds.x,
                overlap.y - display.bounds.y,
                overlap.width,
                overlap.height,
            );
            Ok(ResolvedTarget {
                width: even_dimension(local.width * display.scale_factor),
                height: even_dimension(local.height * display.scale_factor),
                display,
                window_id: None,
                source_rect: Some(local),
            })
        }
    }
}

/// Encoding options for the screen unit
#[derive(Debug, Clone)]
pub struct ScreenOptions {
    pub fps: u32,
    pub container: VideoContainer,
    pub ffmpeg_path: PathBuf,
    /// Capture the system audio mix into `system.wav`
    pub system_audio: Option<AudioSettings>,
}

/// Screen (and system audio) capture unit
pub struct ScreenCaptureUnit {
    id: String,
    backend: Arc<dyn CaptureBackend>,
    target: SelectionTarget,
    options: ScreenOptions,
    video: Option<Arc<SampleSink>>,
    audio: Option<Arc<SampleSink>>,
    source: Option<Box<dyn CaptureSource>>,
    is_recording: bool,
    output_files: Vec<PathBuf>,
}

impl ScreenCaptureUnit {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        target: SelectionTarget,
        options: ScreenOptions,
    ) -> Self {
        Self {
            id: "screen".to_string(),
            backend,
            target,
            options,
            video: None,
            audio: None,
            source: None,
            is_recording: false,
            output_files: Vec::new(),
        }
    }

    /// The video sink, once initialized
    pub fn video_sink(&self) -> Option<&Arc<SampleSink>> {
        self.video.as_ref()
    }

    /// The system audio sink, once initialized
    pub fn audio_sink(&self) -> Option<&Arc<SampleSink>> {
        self.audio.as_ref()
    }
}

#[async_trait]
impl CaptureUnit for ScreenCaptureUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Screen
    }

    async fn initialize(&mut self, session: &SessionContext) -> RecordingResult<()> {
        let resolved = resolve_target(
            &self.target,
            &self.backend.displays(),
            &self.backend.windows(),
        )?;

        tracing::info!(
            "Screen target resolved to display {} ({}x{} px, rect {:?})",
            resolved.display.id,
            resolved.width,
            resolved.height,
            resolved.source_rect
        );

        let video_settings = VideoSettings {
            width: resolved.width,
            height: resolved.height,
            fps: self.options.fps,
            container: self.options.container,
            ffmpeg_path: self.options.ffmpeg_path.clone(),
        };
        let video_path = session.file(&format!("screen.{}", self.options.container.extension()));
        let video = Arc::new(SampleSink::open(&video_path, EncodingParams::Video(video_settings))?);
        self.video = Some(video.clone());

        if let Some(audio_settings) = self.options.system_audio {
            let audio_path = session.file("system.wav");
            let audio = SampleSink::open(&audio_path, EncodingParams::Audio(audio_settings))?;
            self.audio = Some(Arc::new(audio));
        }

        let config = ScreenSourceConfig {
            display_id: resolved.display.id,
            window_id: resolved.window_id,
            source_rect: resolved.source_rect,
            width: resolved.width,
            height: resolved.height,
            fps: self.options.fps,
            system_audio: self.options.system_audio,
            exclude_current_process_audio: true,
        };
        let mut source = self.backend.open_screen(&config)?;

        let audio = self.audio.clone();
        source.on_sample(Arc::new(move |sample| {
            match sample.kind() {
                MediaKind::Video => {
                    video.accept(sample);
                }
                MediaKind::Audio => {
                    if let Some(audio) = audio.as_ref() {
                        audio.accept(sample);
                    }
                }
            }
        }));
        self.source = Some(source);

        tracing::info!("Screen capture unit initialized");
        Ok(())
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.is_recording {
            return Err(RecordingError::AlreadyRecording);
        }
        let source = self.source.as_mut().ok_or_else(|| {
            RecordingError::UnsupportedConfiguration("screen unit not initialized".to_string())
        })?;

        source.start().await?;
        self.is_recording = true;

        tracing::info!("Screen capture started");
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        // No new samples once the source has stopped
        if let Some(mut source) = self.source.take() {
            source.stop().await;
        }
        self.is_recording = false;

        let mut first_error = None;
        for sink in [self.video.take(), self.audio.take()].into_iter().flatten() {
            match sink.finish().await {
                Ok(()) => self.output_files.push(sink.path().to_path_buf()),
                Err(e) => {
                    tracing::warn!("Failed to finish {}: {}", sink.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::info!("Screen capture stopped");
        first_error.map_or(Ok(()), Err)
    }

    fn is_recording(&self) -> bool {
        self.is_recording
    }

    fn output_files(&self) -> Vec<PathBuf> {
        self.output_files.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn displays() -> Vec<DisplayInfo> {
        vec![
            DisplayInfo {
                id: 1,
                name: "Main Display".to_string(),
                bounds: Rect::new(0.0, 0.0, 1440.0, 900.0),
                scale_factor: 2.0,
                is_primary: true,
                refresh_rate: Some(60),
            },
            DisplayInfo {
                id: 2,
                name: "Display 2".to_string(),
                bounds: Rect::new(1440.0, 0.0, 1921.0, 1081.0),
                scale_factor: 1.0,
                is_primary: false,
                refresh_rate: None,
            },
        ]
    }

    #[test]
    fn test_even_dimension() {
        assert_eq!(even_dimension(1921.0), 1920);
        assert_eq!(even_dimension(1080.0), 1080);
        assert_eq!(even_dimension(1.0), 2);
        assert_eq!(even_dimension(0.0), 2);
    }

    #[test]
    fn test_resolve_display_rounds_to_even() {
        let resolved =
            resolve_target(&SelectionTarget::Display { id: 2 }, &displays(), &[]).unwrap();
        assert_eq!((resolved.width, resolved.height), (1920, 1080));
        assert!(resolved.source_rect.is_none());
    }

    #[test]
    fn test_resolve_unknown_display_fails() {
        let err = resolve_target(&SelectionTarget::Display { id: 9 }, &displays(), &[]).unwrap_err();
        assert!(matches!(err, RecordingError::InvalidTarget(_)));
    }

    #[test]
    fn test_resolve_area_translates_to_display_local() {
        let target = SelectionTarget::Area {
            rect: Rect::new(1540.0, 100.0, 301.0, 201.0),
        };
        let resolved = resolve_target(&target, &displays(), &[]).unwrap();

        assert_eq!(resolved.display.id, 2);
        assert_eq!(
            resolved.source_rect,
            Some(Rect::new(100.0, 100.0, 301.0, 201.0))
        );
        assert_eq!((resolved.width, resolved.height), (300, 200));
    }

    #[test]
    fn test_resolve_area_uses_scale_factor() {
        let target = SelectionTarget::Area {
            rect: Rect::new(10.0, 10.0, 100.0, 50.0),
        };
        let resolved = resolve_target(&target, &displays(), &[]).unwrap();
        assert_eq!(resolved.display.id, 1);
        assert_eq!((resolved.width, resolved.height), (200, 100));
    }

    #[test]
    fn test_resolve_area_spanning_displays_picks_larger_overlap() {
        let target = SelectionTarget::Area {
            rect: Rect::new(1400.0, 0.0, 400.0, 300.0),
        };
        let resolved = resolve_target(&target, &displays(), &[]).unwrap();
        assert_eq!(resolved.display.id, 2);
        assert_eq!(
            resolved.source_rect,
            Some(Rect::new(0.0, 0.0, 360.0, 300.0))
        );
    }

    #[test]
    fn test_resolve_area_off_screen_fails() {
        let target = SelectionTarget::Area {
            rect: Rect::new(-500.0, -500.0, 100.0, 100.0),
        };
        assert!(resolve_target(&target, &displays(), &[]).is_err());
    }

    #[test]
    fn test_resolve_window() {
        let windows = vec![WindowInfo {
            id: 42,
            title: "Editor".to_string(),
            app_name: "Editor".to_string(),
            bounds: Rect::new(100.0, 100.0, 801.0, 601.0),
            is_on_screen: true,
        }];
        let resolved =
            resolve_target(&SelectionTarget::Window { id: 42 }, &displays(), &windows).unwrap();
        assert_eq!(resolved.display.id, 1);
        assert_eq!(resolved.window_id, Some(42));
        assert_eq!((resolved.width, resolved.height), (1602, 1202));
    }
}
