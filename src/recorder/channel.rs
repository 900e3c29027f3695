//! Capture unit trait
//!
//! Defines the interface every pipeline in a session implements (screen,
//! camera, microphone, interactions), plus the recording error taxonomy.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Errors that can occur during recording
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("No capture target selected")]
    NoTargetSelected,

    #[error("Invalid capture target: {0}")]
    InvalidTarget(String),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Cannot create file {}: {source}", path.display())]
    CannotCreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse error classes used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad target or dimensions
    Configuration,
    /// No camera/mic/display, or permission denied
    ResourceUnavailable,
    /// Cannot create a file or directory, or the encoder rejected open
    Io,
    /// Mid-stream append rejected by the encoder
    EncodingFailure,
    /// Sample dropped for arriving out of order
    NonMonotonicSample,
}

impl RecordingError {
    /// Build a `CannotCreateFile` error for `path`
    pub fn cannot_create(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::CannotCreateFile {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Map this error onto its reporting category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoTargetSelected
            | Self::InvalidTarget(_)
            | Self::UnsupportedConfiguration(_)
            | Self::AlreadyRecording => ErrorCategory::Configuration,
            Self::DeviceUnavailable(_) | Self::PermissionDenied(_) => {
                ErrorCategory::ResourceUnavailable
            }
            Self::CannotCreateFile { .. } | Self::IoError(_) | Self::CaptureError(_) => {
                ErrorCategory::Io
            }
            Self::EncodingError(_) => ErrorCategory::EncodingFailure,
        }
    }
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Session-wide values handed to every unit when it is initialized.
///
/// The directory is written once by the orchestrator; units only read it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Session identifier (derived from the start timestamp)
    pub id: String,

    /// Directory all output files are written into
    pub directory: PathBuf,

    /// Common timeline origin for every unit
    pub origin: Instant,
}

impl SessionContext {
    /// Path of a file inside the session directory
    pub fn file(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}

/// Trait for capture units
///
/// Each unit owns one pipeline of the session (display + system audio,
/// camera, microphone, interactions). Units are managed by the
/// `RecordingSession` orchestrator which calls `initialize`, then `start`,
/// and finally `stop`.
#[async_trait]
pub trait CaptureUnit: Send {
    /// Get the unit identifier (e.g., "screen", "camera", "microphone")
    fn id(&self) -> &str;

    /// Get the unit kind
    fn kind(&self) -> UnitKind;

    /// Resolve configuration and open output files.
    ///
    /// No samples flow yet. If this fails part way, the orchestrator still
    /// calls `stop` so whatever was opened gets finalized.
    async fn initialize(&mut self, session: &SessionContext) -> RecordingResult<()>;

    /// Start capturing
    async fn start(&mut self) -> RecordingResult<()>;

    /// Stop capturing and finalize every output file.
    ///
    /// Must be safe to call on a unit that was only initialized, that failed
    /// to start, or that is already stopped.
    async fn stop(&mut self) -> RecordingResult<()>;

    /// Check if the unit is currently capturing
    fn is_recording(&self) -> bool;

    /// Output files created by this unit
    fn output_files(&self) -> Vec<PathBuf>;

    /// Why the unit left its track out of the session, if it did
    fn skip_reason(&self) -> Option<&str> {
        None
    }
}

/// Types of capture units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Screen capture, optionally carrying the system audio mix
    Screen,
    /// Camera with its own encoder
    Camera,
    /// Microphone with its own encoder
    Microphone,
    /// Input event log
    Interactions,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Screen => write!(f, "screen"),
            UnitKind::Camera => write!(f, "camera"),
            UnitKind::Microphone => write!(f, "microphone"),
            UnitKind::Interactions => write!(f, "interactions"),
        }
    }
}
