//! Interaction logging
//!
//! Records pointer clicks, key presses and a periodic pointer position for
//! the whole session, then writes them to `interactions.json` in one go when
//! the session stops.

use crate::capture::traits::{CaptureBackend, InputEvent, InputKind, InputSource};
use crate::recorder::channel::{
    CaptureUnit, RecordingError, RecordingResult, SessionContext, UnitKind,
};
use crate::utils::error::AppResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Kind of a logged interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionKind {
    #[serde(rename = "click_left")]
    ClickLeft,
    #[serde(rename = "click_right")]
    ClickRight,
    #[serde(rename = "keydown")]
    KeyDown,
    #[serde(rename = "mouse_position")]
    MousePosition,
}

impl From<InputKind> for InteractionKind {
    fn from(kind: InputKind) -> Self {
        match kind {
            InputKind::ClickPrimary => InteractionKind::ClickLeft,
            InputKind::ClickSecondary => InteractionKind::ClickRight,
            InputKind::KeyDown => InteractionKind::KeyDown,
        }
    }
}

/// One entry of `interactions.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Seconds since session start
    pub timestamp: f64,

    #[serde(rename = "type")]
    pub kind: InteractionKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl InteractionEvent {
    fn pointer(timestamp: f64, (x, y): (f64, f64)) -> Self {
        Self {
            timestamp,
            kind: InteractionKind::MousePosition,
            x: Some(x),
            y: Some(y),
            key: None,
        }
    }

    fn from_input(timestamp: f64, event: InputEvent) -> Self {
        Self {
            timestamp,
            kind: event.kind.into(),
            x: event.position.map(|(x, _)| x),
            y: event.position.map(|(_, y)| y),
            key: event.key,
        }
    }
}

/// Ordered, append-only interaction log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionLog {
    events: Vec<InteractionEvent>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InteractionEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[InteractionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_json(&self) -> AppResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Write the whole log in one write
    pub async fn save(&self, path: &Path) -> AppResult<()> {
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    /// Read back a saved log
    pub async fn load(path: &Path) -> AppResult<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Log shared between the input callback, the pointer sampler and the unit
struct SharedLog {
    origin: Instant,
    log: Mutex<InteractionLog>,
}

impl SharedLog {
    /// Stamp and append under one lock so append order is chronological
    fn record(&self, build: impl FnOnce(f64) -> InteractionEvent) {
        let mut log = self.log.lock();
        let timestamp = self.origin.elapsed().as_secs_f64();
        log.push(build(timestamp));
    }
}

/// Capture unit writing `interactions.json`
pub struct InteractionLogger {
    backend: Arc<dyn CaptureBackend>,
    pointer_interval: Duration,
    shared: Option<Arc<SharedLog>>,
    destination: Option<PathBuf>,
    source: Option<Box<dyn InputSource>>,
    sampler: Option<JoinHandle<()>>,
    is_recording: bool,
    output_files: Vec<PathBuf>,
}

impl InteractionLogger {
    pub fn new(backend: Arc<dyn CaptureBackend>, pointer_interval: Duration) -> Self {
        Self {
            backend,
            pointer_interval,
            shared: None,
            destination: None,
            source: None,
            sampler: None,
            is_recording: false,
            output_files: Vec::new(),
        }
    }

    /// Number of events recorded so far
    pub fn event_count(&self) -> usize {
        self.shared.as_ref().map_or(0, |shared| shared.log.lock().len())
    }
}

#[async_trait]
impl CaptureUnit for InteractionLogger {
    fn id(&self) -> &str {
        "interactions"
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Interactions
    }

    async fn initialize(&mut self, session: &SessionContext) -> RecordingResult<()> {
        let shared = Arc::new(SharedLog {
            origin: session.origin,
            log: Mutex::new(InteractionLog::new()),
        });

        let mut source = self.backend.input()?;
        {
            let shared = shared.clone();
            source.on_event(Arc::new(move |event| {
                shared.record(|timestamp| InteractionEvent::from_input(timestamp, event));
            }));
        }

        self.destination = Some(session.file("interactions.json"));
        self.source = Some(source);
        self.shared = Some(shared);
        tracing::info!("Interaction logger initialized");
        Ok(())
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.is_recording {
            return Err(RecordingError::AlreadyRecording);
        }
        let (Some(source), Some(shared)) = (self.source.as_mut(), self.shared.clone()) else {
            return Err(RecordingError::UnsupportedConfiguration(
                "interaction logger not initialized".to_string(),
            ));
        };

        let read_pointer = source.pointer_reader();
        source.start().await?;

        let period = self.pointer_interval;
        self.sampler = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Some(position) = read_pointer() {
                    shared.record(|timestamp| InteractionEvent::pointer(timestamp, position));
                }
            }
        }));
        self.is_recording = true;

        tracing::info!(
            "Interaction logging started (pointer every {:?})",
            self.pointer_interval
        );
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        if let Some(mut source) = self.source.take() {
            source.stop().await;
        }
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
            let _ = sampler.await;
        }

        if !self.is_recording {
            return Ok(());
        }
        self.is_recording = false;

        let (Some(shared), Some(destination)) = (self.shared.take(), self.destination.take())
        else {
            return Ok(());
        };
        let log = shared.log.lock().clone();
        log.save(&destination).await.map_err(|e| {
            RecordingError::EncodingError(format!("cannot write {}: {e}", destination.display()))
        })?;

        tracing::info!(
            "Interaction log saved: {} events -> {}",
            log.len(),
            destination.display()
        );
        self.output_files.push(destination);
        Ok(())
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
    use crate::capture::synthetic::SyntheticBackend;
    use tempfile::tempdir;

    #[test]
    fn test_event_json_schema() {
        let click = InteractionEvent {
            timestamp: 1.5,
            kind: InteractionKind::ClickLeft,
            x: Some(10.0),
            y: Some(20.0),
            key: None,
        };
        let json = serde_json::to_value(&click).unwrap();
        assert_eq!(json["type"], "click_left");
        assert_eq!(json["timestamp"], 1.5);
        assert!(json.get("key").is_none());

        let key = InteractionEvent {
            timestamp: 2.0,
            kind: InteractionKind::KeyDown,
            x: None,
            y: None,
            key: Some("a".to_string()),
        };
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"timestamp":2.0,"type":"keydown","key":"a"}"#);
    }

    #[tokio::test]
    async fn test_log_round_trip_preserves_order_and_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("interactions.json");

        let mut log = InteractionLog::new();
        let kinds = [
            InteractionKind::MousePosition,
            InteractionKind::ClickLeft,
            InteractionKind::KeyDown,
            InteractionKind::ClickRight,
        ];
        for i in 0..12 {
            let kind = kinds[i % kinds.len()];
            log.push(InteractionEvent {
                timestamp: i as f64 * 0.25,
                kind,
                x: (kind != InteractionKind::KeyDown).then_some(i as f64 * 8.0),
                y: (kind != InteractionKind::KeyDown).then_some(100.5),
                key: (kind == InteractionKind::KeyDown).then(|| format!("k{i}")),
            });
        }
        log.save(&path).await.unwrap();

        let loaded = InteractionLog::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 12);
        assert_eq!(loaded, log);
    }

    #[tokio::test]
    async fn test_logger_records_clicks_and_pointer_samples() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(SyntheticBackend::new());
        let session = SessionContext {
            id: "test".to_string(),
            directory: dir.path().to_path_buf(),
            origin: Instant::now(),
        };
        let mut logger = InteractionLogger::new(backend.clone(), Duration::from_millis(50));

        logger.initialize(&session).await.unwrap();
        logger.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        logger.stop().await.unwrap();
        assert_eq!(backend.live_sources(), 0);

        let path = dir.path().join("interactions.json");
        assert_eq!(logger.output_files(), vec![path.clone()]);
        let log = InteractionLog::load(&path).await.unwrap();
        let events = log.events();
        assert!(events
            .iter()
            .any(|e| e.kind == InteractionKind::MousePosition));
        assert!(events.iter().any(|e| e.kind == InteractionKind::ClickLeft));
        assert!(events
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_stop_without_start_writes_nothing() {
        let dir = tempdir().unwrap();
        let session = SessionContext {
            id: "test".to_string(),
            directory: dir.path().to_path_buf(),
            origin: Instant::now(),
        };
        let mut logger =
            InteractionLogger::new(Arc::new(SyntheticBackend::new()), Duration::from_secs(1));

        logger.initialize(&session).await.unwrap();
        logger.stop().await.unwrap();
        logger.stop().await.unwrap();

        assert!(!dir.path().join("interactions.json").exists());
        assert_eq!(logger.event_count(), 0);
    }
}
