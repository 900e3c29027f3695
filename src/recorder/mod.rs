//! Recording system module
//!
//! - `channel`: the CaptureUnit trait and the recording error taxonomy
//! - `coordinator`: the RecordingSession orchestrator
//! - `layout`: session directory naming
//! - `state`: state machine, events and the stop summary

pub mod channel;
pub mod coordinator;
pub mod layout;
pub mod state;

pub use channel::{CaptureUnit, ErrorCategory, RecordingError, RecordingResult, SessionContext};
pub use coordinator::RecordingSession;
pub use state::{RecordingEvent, RecordingOutput, RecordingState};
