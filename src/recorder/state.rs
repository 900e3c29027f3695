//! Recording state management
//!
//! Defines the session state machine, lifecycle events and the summary
//! returned when a session stops.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Directory created, units being opened and started
    Starting,
    /// Every unit is capturing
    Active,
    /// Units being stopped and files finalized
    Stopping,
}

impl RecordingState {
    /// Whether a session is underway in any phase
    pub fn is_busy(&self) -> bool {
        *self != RecordingState::Idle
    }
}

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// State changed
    StateChanged(RecordingState),
    /// Recording started into this directory
    Started(PathBuf),
    /// Recording stopped
    Stopped(RecordingOutput),
    /// A unit left its track out of the session
    UnitSkipped { unit: String, reason: String },
    /// Error occurred
    Error(String),
}

/// Result of a completed recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOutput {
    /// Session identifier
    pub session_id: String,

    /// Session directory
    pub directory: PathBuf,

    /// Wall-clock time between start and stop
    #[serde(with = "duration_ms")]
    pub duration: Duration,

    /// Output files, in unit stop order
    pub files: Vec<PathBuf>,

    /// Units that recorded nothing, with the reason
    pub skipped: Vec<String>,

    /// Errors absorbed while stopping
    pub errors: Vec<String>,
}

impl RecordingOutput {
    /// Whether every unit stopped cleanly
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RecordingState::Stopping).unwrap(),
            "\"stopping\""
        );
        assert!(!RecordingState::default().is_busy());
        assert!(RecordingState::Starting.is_busy());
    }

    #[test]
    fn test_output_json_uses_milliseconds() {
        let output = RecordingOutput {
            session_id: "20240309-140507".to_string(),
            directory: PathBuf::from("/tmp/Recording"),
            duration: Duration::from_millis(1500),
            files: vec![PathBuf::from("/tmp/Recording/screen.y4m")],
            skipped: Vec::new(),
            errors: Vec::new(),
        };

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["duration"], 1500.0);
        assert_eq!(json["sessionId"], "20240309-140507");
        assert!(output.is_clean());
    }
}
