//! Session directory layout
//!
//! Each session gets its own directory under the recordings base:
//! - screen.<ext>: screen video
//! - system.wav: system audio mix
//! - camera.<ext>: camera video
//! - mic.<ext>: microphone audio
//! - interactions.json: pointer and keyboard events

use super::channel::{RecordingError, RecordingResult};
use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Upper bound on " (n)" suffixes tried before giving up
const MAX_COLLISION_SUFFIX: u32 = 1000;

/// Directory name for a session started at `started`
pub fn session_dir_name(started: &DateTime<Local>) -> String {
    started.format("Recording %Y-%m-%d at %H.%M.%S").to_string()
}

/// Session identifier for a session started at `started`
pub fn session_id(started: &DateTime<Local>) -> String {
    started.format("%Y%m%d-%H%M%S").to_string()
}

/// A freshly created session directory
#[derive(Debug, Clone)]
pub struct SessionDir {
    pub id: String,
    pub path: PathBuf,
}

/// Create the directory for a session started at `started`.
///
/// If the name is taken a ` (n)` suffix is appended, so two sessions never
/// share a directory.
pub async fn create_session_dir(
    base: &Path,
    started: &DateTime<Local>,
) -> RecordingResult<SessionDir> {
    fs::create_dir_all(base)
        .await
        .map_err(|e| RecordingError::cannot_create(base, e))?;

    let name = session_dir_name(started);
    let id = session_id(started);

    for n in 1..=MAX_COLLISION_SUFFIX {
        let (path, id) = if n == 1 {
            (base.join(&name), id.clone())
        } else {
            (base.join(format!("{name} ({n})")), format!("{id}-{n}"))
        };

        match fs::create_dir(&path).await {
            Ok(()) => {
                tracing::debug!("Created session directory {}", path.display());
                return Ok(SessionDir { id, path });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(RecordingError::cannot_create(&path, e)),
        }
    }

    Err(RecordingError::cannot_create(
        base.join(&name),
        std::io::Error::new(ErrorKind::AlreadyExists, "too many sessions with this name"),
    ))
}
