//! Multitrack Recorder - synchronized screen, camera, microphone and input
//! capture into one session directory.
//!
//! A [`RecordingSession`] coordinates one capture unit per track. Every
//! encoded track is written through a [`sink::SampleSink`]; pointer and
//! keyboard activity goes to `interactions.json`.

pub mod capture;
pub mod config;
pub mod interaction;
pub mod recorder;
pub mod sink;
pub mod utils;

pub use config::{MissingDevicePolicy, RecorderSettings, SettingsStore};
pub use recorder::{RecordingError, RecordingEvent, RecordingOutput, RecordingSession, RecordingState};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multitrack_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
