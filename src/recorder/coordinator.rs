//! Recording session orchestrator
//!
//! Owns the session identity and directory, builds the capture units for the
//! selected target, and drives the ordered start and stop sequences.

use super::channel::{CaptureUnit, RecordingError, RecordingResult, SessionContext};
use super::layout::create_session_dir;
use super::state::{RecordingEvent, RecordingOutput, RecordingState};
use crate::capture::device::DeviceCaptureUnit;
use crate::capture::screen::{even_dimension, ScreenCaptureUnit, ScreenOptions};
use crate::capture::traits::{
    CameraConfig, CaptureBackend, MicrophoneConfig, Resolution, SelectionTarget,
};
use crate::config::RecorderSettings;
use crate::interaction::InteractionLogger;
use chrono::Local;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};

/// Coordinates every capture unit of one recording at a time
pub struct RecordingSession {
    backend: Arc<dyn CaptureBackend>,
    settings: RecorderSettings,

    /// What the next session captures
    target: Option<SelectionTarget>,

    state: Arc<RwLock<RecordingState>>,

    /// Units in start order: screen (+ system audio), camera, microphone,
    /// interactions
    units: Vec<Box<dyn CaptureUnit>>,

    context: Option<SessionContext>,
    started_at: Option<Instant>,

    event_tx: broadcast::Sender<RecordingEvent>,
    active_tx: watch::Sender<bool>,
}

impl RecordingSession {
    /// Create an idle session recording through `backend`
    pub fn new(backend: Arc<dyn CaptureBackend>, settings: RecorderSettings) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (active_tx, _) = watch::channel(false);
        Self {
            backend,
            settings,
            target: None,
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            units: Vec::new(),
            context: None,
            started_at: None,
            event_tx,
            active_tx,
        }
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    /// Choose what the next session captures. Only allowed while idle.
    pub fn select_target(&mut self, target: Option<SelectionTarget>) -> RecordingResult<()> {
        if self.state().is_busy() {
            return Err(RecordingError::AlreadyRecording);
        }
        self.target = target;
        Ok(())
    }

    pub fn target(&self) -> Option<SelectionTarget> {
        self.target
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == RecordingState::Active
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Follow the active flag (for status indicators)
    pub fn watch_active(&self) -> watch::Receiver<bool> {
        self.active_tx.subscribe()
    }

    /// Directory of the running session
    pub fn directory(&self) -> Option<&Path> {
        self.context.as_ref().map(|c| c.directory.as_path())
    }

    /// Time since the running session started
    pub fn duration(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn set_state(&self, state: RecordingState) {
        *self.state.write() = state;
        let _ = self.event_tx.send(RecordingEvent::StateChanged(state));
    }

    /// Units for `target`, in start order
    fn build_units(&self, target: SelectionTarget) -> Vec<Box<dyn CaptureUnit>> {
        let settings = &self.settings;
        let mut units: Vec<Box<dyn CaptureUnit>> = Vec::new();

        units.push(Box::new(ScreenCaptureUnit::new(
            self.backend.clone(),
            target,
            ScreenOptions {
                fps: settings.fps,
                container: settings.container,
                ffmpeg_path: settings.ffmpeg_path.clone(),
                system_audio: settings.system_audio.then_some(settings.audio),
            },
        )));

        if settings.camera {
            let camera = &settings.camera_settings;
            units.push(Box::new(DeviceCaptureUnit::camera(
                self.backend.clone(),
                CameraConfig {
                    device_id: camera.device_id.clone(),
                    resolution: Resolution {
                        width: even_dimension(f64::from(camera.width)),
                        height: even_dimension(f64::from(camera.height)),
                    },
                    fps: camera.fps,
                },
                settings.missing_device,
            )));
        }

        if settings.microphone {
            units.push(Box::new(DeviceCaptureUnit::microphone(
                self.backend.clone(),
                MicrophoneConfig {
                    device_id: settings.microphone_device.clone(),
                    audio: settings.audio,
                },
                settings.missing_device,
            )));
        }

        if settings.interactions {
            units.push(Box::new(InteractionLogger::new(
                self.backend.clone(),
                settings.pointer_interval(),
            )));
        }

        units
    }

    /// Start recording.
    ///
    /// Creates the session directory, opens every unit, then starts them in
    /// order. If any step after the directory exists fails, every unit is
    /// stopped (opened files are finalized) and the session returns to idle
    /// before the original error is reported.
    ///
    /// Units are owned by the session from the moment they are built, so a
    /// start future dropped part way leaves them reachable by [`stop`].
    ///
    /// [`stop`]: RecordingSession::stop
    pub async fn start(&mut self) -> RecordingResult<PathBuf> {
        match self.state() {
            RecordingState::Idle => {}
            RecordingState::Active => return Err(RecordingError::AlreadyRecording),
            stale @ (RecordingState::Starting | RecordingState::Stopping) => {
                // Only reachable when an earlier start or stop was dropped
                tracing::warn!("Recovering from an interrupted transition ({:?})", stale);
                self.stop().await;
            }
        }
        let target = self.target.ok_or(RecordingError::NoTargetSelected)?;
        self.settings
            .validate()
            .map_err(|e| RecordingError::UnsupportedConfiguration(e.to_string()))?;

        self.set_state(RecordingState::Starting);
        tracing::info!("Starting recording of {:?}", target);

        let session_dir =
            match create_session_dir(&self.settings.output_dir, &Local::now()).await {
                Ok(dir) => dir,
                Err(e) => {
                    tracing::error!("Failed to create session directory: {}", e);
                    let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
                    self.set_state(RecordingState::Idle);
                    return Err(e);
                }
            };

        let context = SessionContext {
            id: session_dir.id,
            directory: session_dir.path,
            origin: Instant::now(),
        };
        self.units = self.build_units(target);
        self.context = Some(context.clone());

        if let Err(e) = Self::open_and_start(&mut self.units, &context).await {
            tracing::error!("Recording failed to start: {}", e);
            let errors = self.release_units().await;
            if !errors.is_empty() {
                tracing::warn!("{} errors while rolling back: {:?}", errors.len(), errors);
            }
            self.context = None;
            let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
            self.set_state(RecordingState::Idle);
            return Err(e);
        }

        for unit in &self.units {
            if let Some(reason) = unit.skip_reason() {
                let _ = self.event_tx.send(RecordingEvent::UnitSkipped {
                    unit: unit.id().to_string(),
                    reason: reason.to_string(),
                });
            }
        }

        let directory = context.directory;
        self.started_at = Some(Instant::now());

        self.set_state(RecordingState::Active);
        let _ = self.active_tx.send(true);
        let _ = self.event_tx.send(RecordingEvent::Started(directory.clone()));

        tracing::info!("Recording started: {}", directory.display());
        Ok(directory)
    }

    /// Open every unit, then start them in order
    async fn open_and_start(
        units: &mut [Box<dyn CaptureUnit>],
        context: &SessionContext,
    ) -> RecordingResult<()> {
        for unit in units.iter_mut() {
            unit.initialize(context).await?;
        }
        for unit in units.iter_mut() {
            unit.start().await?;
        }
        Ok(())
    }

    /// Stop every held unit, then release them. Units stay owned by the
    /// session until all of them have stopped.
    async fn release_units(&mut self) -> Vec<String> {
        let errors = Self::stop_units(&mut self.units).await;
        self.units.clear();
        errors
    }

    /// Stop every unit in order, awaiting each one. Returns absorbed errors.
    async fn stop_units(units: &mut [Box<dyn CaptureUnit>]) -> Vec<String> {
        let mut errors = Vec::new();
        for unit in units.iter_mut() {
            if let Err(e) = unit.stop().await {
                tracing::warn!("Failed to stop {} unit: {}", unit.kind(), e);
                errors.push(format!("{}: {}", unit.id(), e));
            }
        }
        errors
    }

    /// Stop recording.
    ///
    /// Stops the screen source first, finishes its sinks, then the camera,
    /// microphone and finally the interaction log. Errors are collected into
    /// the output rather than returned. Returns `None` when no session is
    /// active, so repeated calls are harmless.
    ///
    /// A session left `Starting` by a dropped [`start`] is torn down back to
    /// idle and also returns `None`.
    ///
    /// [`start`]: RecordingSession::start
    pub async fn stop(&mut self) -> Option<RecordingOutput> {
        match self.state() {
            RecordingState::Idle => {
                tracing::debug!("Stop requested while idle, nothing to do");
                return None;
            }
            RecordingState::Starting => {
                self.abort_start().await;
                return None;
            }
            RecordingState::Active => self.set_state(RecordingState::Stopping),
            RecordingState::Stopping => {
                tracing::warn!("Resuming an interrupted stop");
            }
        }
        tracing::info!("Stopping recording");

        let errors = Self::stop_units(&mut self.units).await;
        let units = std::mem::take(&mut self.units);

        let files = units.iter().flat_map(|u| u.output_files()).collect();
        let skipped = units
            .iter()
            .filter_map(|u| u.skip_reason().map(|r| format!("{}: {}", u.id(), r)))
            .collect();
        let duration = self.duration();
        let context = self.context.take();
        self.started_at = None;

        let output = RecordingOutput {
            session_id: context.as_ref().map(|c| c.id.clone()).unwrap_or_default(),
            directory: context.map(|c| c.directory).unwrap_or_default(),
            duration,
            files,
            skipped,
            errors,
        };

        self.set_state(RecordingState::Idle);
        let _ = self.active_tx.send(false);
        let _ = self.event_tx.send(RecordingEvent::Stopped(output.clone()));

        tracing::info!(
            "Recording stopped after {:.1}s: {} files, {} errors",
            output.duration.as_secs_f64(),
            output.files.len(),
            output.errors.len()
        );
        Some(output)
    }

    /// Tear down whatever an interrupted `start` left behind
    async fn abort_start(&mut self) {
        tracing::warn!(
            "Start was interrupted, stopping {} opened units",
            self.units.len()
        );
        let errors = self.release_units().await;
        if !errors.is_empty() {
            tracing::warn!("{} errors while rolling back: {:?}", errors.len(), errors);
        }
        self.context = None;
        self.started_at = None;
        let _ = self
            .event_tx
            .send(RecordingEvent::Error("recording start was interrupted".to_string()));
        self.set_state(RecordingState::Idle);
        let _ = self.active_tx.send(false);
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.state().is_busy() {
            tracing::warn!(
                "Recording session dropped while {:?}; output files may be incomplete",
                self.state()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::synthetic::SyntheticBackend;
    use tempfile::tempdir;

    fn settings(dir: &Path) -> RecorderSettings {
        RecorderSettings {
            output_dir: dir.to_path_buf(),
            fps: 10,
            camera: false,
            microphone: false,
            interactions: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_without_target_fails_before_touching_disk() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("recordings");
        let mut session =
            RecordingSession::new(Arc::new(SyntheticBackend::new()), settings(&base));

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, RecordingError::NoTargetSelected));
        assert_eq!(session.state(), RecordingState::Idle);
        assert!(!base.exists());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut session =
            RecordingSession::new(Arc::new(SyntheticBackend::new()), settings(dir.path()));

        assert!(session.stop().await.is_none());

        session
            .select_target(Some(SelectionTarget::Display { id: 1 }))
            .unwrap();
        session.start().await.unwrap();
        assert!(session.is_active());

        assert!(session.stop().await.is_some());
        assert!(session.stop().await.is_none());
        assert_eq!(session.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let mut session =
            RecordingSession::new(Arc::new(SyntheticBackend::new()), settings(dir.path()));
        session
            .select_target(Some(SelectionTarget::Display { id: 1 }))
            .unwrap();

        session.start().await.unwrap();
        assert!(matches!(
            session.start().await,
            Err(RecordingError::AlreadyRecording)
        ));
        assert!(session
            .select_target(Some(SelectionTarget::Display { id: 2 }))
            .is_err());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_events_and_active_flag() {
        let dir = tempdir().unwrap();
        let mut session =
            RecordingSession::new(Arc::new(SyntheticBackend::new()), settings(dir.path()));
        session
            .select_target(Some(SelectionTarget::Display { id: 1 }))
            .unwrap();
        let mut events = session.subscribe();
        let active = session.watch_active();

        let directory = session.start().await.unwrap();
        assert!(*active.borrow());
        session.stop().await;
        assert!(!*active.borrow());

        let mut states = Vec::new();
        let mut started = None;
        while let Ok(event) = events.try_recv() {
            match event {
                RecordingEvent::StateChanged(state) => states.push(state),
                RecordingEvent::Started(path) => started = Some(path),
                _ => {}
            }
        }
        assert_eq!(
            states,
            vec![
                RecordingState::Starting,
                RecordingState::Active,
                RecordingState::Stopping,
                RecordingState::Idle
            ]
        );
        assert_eq!(started, Some(directory));
    }
}
