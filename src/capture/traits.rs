//! Capture trait definitions
//!
//! Platform-agnostic types and traits for the raw capture sources. The
//! orchestrator never talks to an OS API directly; everything goes through a
//! [`CaptureBackend`].

use crate::recorder::channel::RecordingResult;
use crate::sink::{AudioSettings, Sample};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Information about a display/screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    /// Unique display ID
    pub id: u32,

    /// Display name
    pub name: String,

    /// Bounds in the global coordinate space (points)
    pub bounds: Rect,

    /// Scale factor (e.g., 2.0 for Retina)
    pub scale_factor: f64,

    /// Whether this is the primary display
    pub is_primary: bool,

    /// Refresh rate in Hz (if available)
    pub refresh_rate: Option<u32>,
}

/// Information about a capture window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    /// Unique window ID
    pub id: u32,

    /// Window title
    pub title: String,

    /// Application name
    pub app_name: String,

    /// Window bounds in the global coordinate space
    pub bounds: Rect,

    /// Whether the window is on screen
    pub is_on_screen: bool,
}

/// Rectangle in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Overlapping area, or `None` if the rectangles are disjoint
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        let rect = Rect::new(x, y, max_x - x, max_y - y);
        (!rect.is_empty()).then_some(rect)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// What a session captures.
///
/// Supplied once by the selection UI before a session starts and never
/// changed while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SelectionTarget {
    /// A whole display
    Display { id: u32 },
    /// A single window
    Window { id: u32 },
    /// A rectangle in the global coordinate space
    Area { rect: Rect },
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Fully resolved configuration for a screen capture source
#[derive(Debug, Clone)]
pub struct ScreenSourceConfig {
    /// Display the frames come from
    pub display_id: u32,

    /// Restrict capture to this window
    pub window_id: Option<u32>,

    /// Restrict capture to this rectangle, in display-local points
    pub source_rect: Option<Rect>,

    /// Output frame size in pixels (always even)
    pub width: u32,
    pub height: u32,

    pub fps: u32,

    /// Mix in system audio on the same stream
    pub system_audio: Option<AudioSettings>,

    /// Leave this process's own audio out of the system mix
    pub exclude_current_process_audio: bool,
}

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Device ID/index to capture from (None = default camera)
    pub device_id: Option<String>,
    pub resolution: Resolution,
    pub fps: u32,
}

/// Microphone configuration
#[derive(Debug, Clone)]
pub struct MicrophoneConfig {
    /// Device name (None = default input)
    pub device_id: Option<String>,
    pub audio: AudioSettings,
}

/// Discrete input event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    ClickPrimary,
    ClickSecondary,
    KeyDown,
}

/// An input event as delivered by an [`InputSource`]
#[derive(Debug, Clone)]
pub struct InputEvent {
    pub kind: InputKind,

    /// Pointer location in the global coordinate space
    pub position: Option<(f64, f64)>,

    /// Key label for key events
    pub key: Option<String>,
}

/// Callback receiving samples on the source's own thread
pub type SampleCallback = Arc<dyn Fn(Sample) + Send + Sync>;

/// Callback receiving input events on the source's own thread
pub type InputCallback = Arc<dyn Fn(InputEvent) + Send + Sync>;

/// Reads the current pointer location
pub type PointerReader = Arc<dyn Fn() -> Option<(f64, f64)> + Send + Sync>;

/// A live stream of timestamped samples (screen frames plus system audio)
#[async_trait]
pub trait CaptureSource: Send {
    /// Register the sample handler. Must be called before `start`.
    fn on_sample(&mut self, callback: SampleCallback);

    /// Begin delivering samples
    async fn start(&mut self) -> RecordingResult<()>;

    /// Stop delivering samples. No callback runs after this returns.
    async fn stop(&mut self);
}

/// A device that records into its own self-contained file
#[async_trait]
pub trait FileRecorder: Send {
    /// File extension of the container this recorder produces
    fn extension(&self) -> &'static str;

    /// Start recording into `destination`
    async fn start(&mut self, destination: &Path) -> RecordingResult<()>;

    /// Stop recording and finalize the file
    async fn stop(&mut self) -> RecordingResult<()>;
}

/// Source of pointer and keyboard events
#[async_trait]
pub trait InputSource: Send {
    /// Register the event handler. Must be called before `start`.
    fn on_event(&mut self, callback: InputCallback);

    /// Current pointer position, read on each periodic sample
    fn pointer_reader(&self) -> PointerReader;

    async fn start(&mut self) -> RecordingResult<()>;

    async fn stop(&mut self);
}

/// Factory for every raw capture source a session needs
pub trait CaptureBackend: Send + Sync {
    /// Available displays
    fn displays(&self) -> Vec<DisplayInfo>;

    /// On-screen windows
    fn windows(&self) -> Vec<WindowInfo>;

    /// Open the screen (and system audio) source
    fn open_screen(&self, config: &ScreenSourceConfig) -> RecordingResult<Box<dyn CaptureSource>>;

    /// Open the camera. Fails with `DeviceUnavailable` or `PermissionDenied`.
    fn camera(&self, config: &CameraConfig) -> RecordingResult<Box<dyn FileRecorder>>;

    /// Open the microphone. Fails with `DeviceUnavailable` or `PermissionDenied`.
    fn microphone(&self, config: &MicrophoneConfig) -> RecordingResult<Box<dyn FileRecorder>>;

    /// Open the input event source
    fn input(&self) -> RecordingResult<Box<dyn InputSource>>;
}
