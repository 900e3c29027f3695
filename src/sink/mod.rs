//! Sample sinks
//!
//! A [`SampleSink`] owns one encoded output file for the lifetime of a
//! session. Capture sources push samples into it from their own threads
//! through [`SampleSink::accept`]; the orchestrator closes it with
//! [`SampleSink::finish`].
//!
//! Delivery never blocks the producer. A sample is dropped when the sink is
//! not writing, when its timestamp does not advance past the last accepted
//! one, or when the encoder reports it cannot take more data right now.
//!
//! All pipeline state lives behind a single mutex per sink, so `finish` can
//! disable writes and snapshot the last written timestamp in one step while
//! a producer may still be calling `accept`.

pub mod audio;
pub mod sample;
pub mod video;

pub use audio::{AudioSettings, WavEncoder};
pub use sample::{AudioBuffer, MediaKind, Sample, SamplePayload, VideoFrame};
pub use video::{FfmpegEncoder, VideoContainer, VideoSettings, Y4mEncoder};

use crate::recorder::channel::{ErrorCategory, RecordingError, RecordingResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest gap an encoder pads with repeated frames or silence. Anything
/// beyond it is logged as a discontinuity and skipped.
pub(crate) const MAX_GAP_FILL: Duration = Duration::from_secs(2);

/// An encoder + container writer backing one sink.
///
/// Implementations are driven only by [`SampleSink`], always under the
/// sink's lock, so they need no internal synchronization of their own.
pub trait MediaEncoder: Send {
    /// Kind of media this encoder accepts
    fn kind(&self) -> MediaKind;

    /// Destination file
    fn path(&self) -> &Path;

    /// Whether the encoder can take a sample at `at` (relative to the
    /// session anchor) without blocking
    fn is_ready(&self, _at: Duration) -> bool {
        true
    }

    /// Zero the container clock at `anchor` (stream-local media time)
    fn start_session(&mut self, anchor: Duration);

    /// Append a payload at `at`, relative to the session anchor
    fn append(&mut self, at: Duration, payload: &SamplePayload) -> RecordingResult<()>;

    /// Close the encoding session at `at`, relative to the session anchor
    fn end_session(&mut self, at: Duration);

    /// Flush and finalize the container so the file is independently playable
    fn finalize(self: Box<Self>) -> RecordingResult<PathBuf>;
}

/// Encoder configuration passed to [`SampleSink::open`]
#[derive(Debug, Clone)]
pub enum EncodingParams {
    Video(VideoSettings),
    Audio(AudioSettings),
}

impl EncodingParams {
    pub fn kind(&self) -> MediaKind {
        match self {
            EncodingParams::Video(_) => MediaKind::Video,
            EncodingParams::Audio(_) => MediaKind::Audio,
        }
    }
}

/// Why a sample was not written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The sink is not in the writing state (not opened or already finishing)
    NotWriting,
    /// Timestamp did not advance past the last accepted sample
    NonMonotonic,
    /// The encoder reported transient backpressure
    NotReady,
    /// The encoder rejected the append
    EncodingFailure,
    /// A video sample was sent to an audio sink or vice versa
    KindMismatch,
}

impl DropReason {
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            DropReason::NonMonotonic => Some(ErrorCategory::NonMonotonicSample),
            DropReason::EncodingFailure => Some(ErrorCategory::EncodingFailure),
            _ => None,
        }
    }
}

/// Per-sink delivery statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub accepted: u64,
    pub dropped_not_writing: u64,
    pub dropped_non_monotonic: u64,
    pub dropped_not_ready: u64,
    pub dropped_encoding_failure: u64,
    pub dropped_kind_mismatch: u64,
}

impl SinkStats {
    /// Total number of dropped samples
    pub fn dropped(&self) -> u64 {
        self.dropped_not_writing
            + self.dropped_non_monotonic
            + self.dropped_not_ready
            + self.dropped_encoding_failure
            + self.dropped_kind_mismatch
    }

    /// Count a drop; returns true the first time this reason is seen
    fn record_drop(&mut self, reason: DropReason) -> bool {
        let counter = match reason {
            DropReason::NotWriting => &mut self.dropped_not_writing,
            DropReason::NonMonotonic => &mut self.dropped_non_monotonic,
            DropReason::NotReady => &mut self.dropped_not_ready,
            DropReason::EncodingFailure => &mut self.dropped_encoding_failure,
            DropReason::KindMismatch => &mut self.dropped_kind_mismatch,
        };
        *counter += 1;
        *counter == 1
    }
}

/// Live encode-and-write state of one sink
struct Pipeline {
    encoder: Option<Box<dyn MediaEncoder>>,
    writing: bool,
    anchor: Option<Duration>,
    last_accepted: Option<Duration>,
    stats: SinkStats,
}

/// One encoded output file fed by timestamped samples
pub struct SampleSink {
    name: String,
    kind: MediaKind,
    path: PathBuf,
    pipeline: Mutex<Pipeline>,
}

impl SampleSink {
    /// Create the destination file and prepare an encoder.
    ///
    /// On success the file exists on disk with a valid, header-only
    /// container.
    pub fn open(path: impl AsRef<Path>, params: EncodingParams) -> RecordingResult<Self> {
        let path = path.as_ref();
        let encoder: Box<dyn MediaEncoder> = match params {
            EncodingParams::Video(settings) => video::open_encoder(path, &settings)?,
            EncodingParams::Audio(settings) => Box::new(WavEncoder::create(path, &settings)?),
        };

        tracing::info!("Opened {} sink: {}", encoder.kind(), path.display());
        Ok(Self::with_encoder(encoder))
    }

    /// Wrap an already opened encoder
    pub fn with_encoder(encoder: Box<dyn MediaEncoder>) -> Self {
        let kind = encoder.kind();
        let path = encoder.path().to_path_buf();
        Self {
            name: format!("{}:{}", kind, path.display()),
            kind,
            path,
            pipeline: Mutex::new(Pipeline {
                encoder: Some(encoder),
                writing: true,
                anchor: None,
                last_accepted: None,
                stats: SinkStats::default(),
            }),
        }
    }

    /// Human-readable name for logging
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Destination file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether new samples are currently accepted
    pub fn is_writing(&self) -> bool {
        self.pipeline.lock().writing
    }

    /// Current statistics
    pub fn stats(&self) -> SinkStats {
        self.pipeline.lock().stats.clone()
    }

    /// Timestamp of the last written sample
    pub fn last_accepted(&self) -> Option<Duration> {
        self.pipeline.lock().last_accepted
    }

    /// Offer a sample. Returns `true` if it was written, `false` if dropped.
    pub fn accept(&self, sample: Sample) -> bool {
        self.try_accept(sample).is_ok()
    }

    /// Offer a sample, reporting why it was dropped
    pub fn try_accept(&self, sample: Sample) -> Result<(), DropReason> {
        let mut pipeline = self.pipeline.lock();
        let pts = sample.pts();

        let result = Self::write_locked(&mut pipeline, self.kind, &sample);
        if let Err(reason) = result {
            if pipeline.stats.record_drop(reason) {
                match reason.category() {
                    Some(category) => tracing::warn!(
                        "{}: dropping sample at {:?} ({:?}, {:?})",
                        self.name,
                        pts,
                        reason,
                        category
                    ),
                    None => {
                        tracing::warn!("{}: dropping sample at {:?} ({:?})", self.name, pts, reason)
                    }
                }
            } else {
                tracing::debug!("{}: dropped sample at {:?} ({:?})", self.name, pts, reason);
            }
        }
        result
    }

    fn write_locked(
        pipeline: &mut Pipeline,
        kind: MediaKind,
        sample: &Sample,
    ) -> Result<(), DropReason> {
        if !pipeline.writing {
            return Err(DropReason::NotWriting);
        }
        if sample.kind() != kind {
            return Err(DropReason::KindMismatch);
        }

        let pts = sample.pts();
        if pipeline.last_accepted.is_some_and(|last| pts <= last)
            || pipeline.anchor.is_some_and(|anchor| pts < anchor)
        {
            return Err(DropReason::NonMonotonic);
        }

        let Some(encoder) = pipeline.encoder.as_mut() else {
            return Err(DropReason::NotWriting);
        };
        if !encoder.is_ready(pts - pipeline.anchor.unwrap_or(pts)) {
            return Err(DropReason::NotReady);
        }

        let anchor = match pipeline.anchor {
            Some(anchor) => anchor,
            None => {
                encoder.start_session(pts);
                pipeline.anchor = Some(pts);
                pts
            }
        };

        if let Err(e) = encoder.append(pts - anchor, sample.payload()) {
            tracing::debug!("append rejected at {:?}: {}", pts, e);
            return Err(DropReason::EncodingFailure);
        }

        pipeline.last_accepted = Some(pts);
        pipeline.stats.accepted += 1;
        Ok(())
    }

    /// Disable further writes and finalize the container.
    ///
    /// The session is closed at the last accepted timestamp; if nothing was
    /// ever accepted the close-out is skipped and the file holds an empty
    /// track. Calling this again after the first call is a no-op.
    pub async fn finish(&self) -> RecordingResult<()> {
        let (encoder, close_at) = {
            let mut pipeline = self.pipeline.lock();
            pipeline.writing = false;
            let close_at = match (pipeline.anchor, pipeline.last_accepted) {
                (Some(anchor), Some(last)) => Some(last - anchor),
                _ => None,
            };
            (pipeline.encoder.take(), close_at)
        };

        let Some(mut encoder) = encoder else {
            return Ok(());
        };

        let stats = self.stats();
        tracing::info!(
            "Finishing {}: {} accepted, {} dropped",
            self.name,
            stats.accepted,
            stats.dropped()
        );

        tokio::task::spawn_blocking(move || {
            if let Some(at) = close_at {
                encoder.end_session(at);
            }
            encoder.finalize()
        })
        .await
        .map_err(|e| RecordingError::EncodingError(format!("finalize task panicked: {e}")))??;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    /// Encoder that records what it was asked to do
    #[derive(Default)]
    pub(crate) struct Journal {
        pub anchor: Option<Duration>,
        pub appended: Vec<Duration>,
        pub ended_at: Option<Duration>,
        pub finalized: bool,
    }

    pub(crate) struct JournalEncoder {
        pub kind: MediaKind,
        pub path: PathBuf,
        pub journal: Arc<Mutex<Journal>>,
        pub ready: Arc<std::sync::atomic::AtomicBool>,
        pub fail_appends: bool,
    }

    impl JournalEncoder {
        pub fn video() -> (Self, Arc<Mutex<Journal>>) {
            let journal = Arc::new(Mutex::new(Journal::default()));
            (
                Self {
                    kind: MediaKind::Video,
                    path: PathBuf::from("journal.y4m"),
                    journal: journal.clone(),
                    ready: Arc::new(std::sync::atomic::AtomicBool::new(true)),
                    fail_appends: false,
                },
                journal,
            )
        }
    }

    impl MediaEncoder for JournalEncoder {
        fn kind(&self) -> MediaKind {
            self.kind
        }

        fn path(&self) -> &Path {
            &self.path
        }

        fn is_ready(&self, _at: Duration) -> bool {
            self.ready.load(std::sync::atomic::Ordering::SeqCst)
        }

        fn start_session(&mut self, anchor: Duration) {
            self.journal.lock().anchor = Some(anchor);
        }

        fn append(&mut self, at: Duration, _payload: &SamplePayload) -> RecordingResult<()> {
            if self.fail_appends {
                return Err(RecordingError::EncodingError("rejected".into()));
            }
            self.journal.lock().appended.push(at);
            Ok(())
        }

        fn end_session(&mut self, at: Duration) {
            self.journal.lock().ended_at = Some(at);
        }

        fn finalize(self: Box<Self>) -> RecordingResult<PathBuf> {
            self.journal.lock().finalized = true;
            Ok(self.path.clone())
        }
    }

    fn frame_at(ms: u64) -> Sample {
        Sample::video(
            Duration::from_millis(ms),
            VideoFrame::bgra(2, 2, vec![0u8; 16]),
        )
    }

    fn tone_at(ms: u64) -> Sample {
        Sample::audio(
            Duration::from_millis(ms),
            AudioBuffer {
                samples: vec![0.0f32; 4].into(),
                sample_rate: 48000,
                channels: 2,
            },
        )
    }

    #[test]
    fn test_out_of_order_sample_is_dropped() {
        let (encoder, journal) = JournalEncoder::video();
        let sink = SampleSink::with_encoder(Box::new(encoder));

        let accepted: Vec<bool> = [0, 5, 3, 10]
            .into_iter()
            .map(|ms| sink.accept(frame_at(ms)))
            .collect();

        assert_eq!(accepted, vec![true, true, false, true]);
        let journal = journal.lock();
        assert_eq!(journal.anchor, Some(Duration::ZERO));
        assert_eq!(
            journal.appended,
            vec![
                Duration::ZERO,
                Duration::from_millis(5),
                Duration::from_millis(10)
            ]
        );
        assert_eq!(sink.stats().dropped_non_monotonic, 1);
    }

    #[test]
    fn test_duplicate_timestamp_is_dropped() {
        let (encoder, _journal) = JournalEncoder::video();
        let sink = SampleSink::with_encoder(Box::new(encoder));

        assert!(sink.accept(frame_at(7)));
        assert_eq!(sink.try_accept(frame_at(7)), Err(DropReason::NonMonotonic));
        assert_eq!(sink.last_accepted(), Some(Duration::from_millis(7)));
    }

    #[test]
    fn test_written_timestamps_strictly_increase_under_shuffled_delivery() {
        let (encoder, journal) = JournalEncoder::video();
        let sink = SampleSink::with_encoder(Box::new(encoder));

        // Deterministic shuffle with duplicates
        let mut seed: u32 = 7;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            sink.accept(frame_at(u64::from(seed >> 20) % 200));
        }

        let journal = journal.lock();
        assert!(!journal.appended.is_empty());
        assert!(journal.appended.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sink.stats().accepted as usize, journal.appended.len());
    }

    #[test]
    fn test_anchor_is_first_accepted_sample() {
        let (encoder, journal) = JournalEncoder::video();
        let sink = SampleSink::with_encoder(Box::new(encoder));

        assert!(sink.accept(frame_at(1500)));
        assert!(sink.accept(frame_at(1533)));
        assert!(!sink.accept(frame_at(1000)));

        let journal = journal.lock();
        assert_eq!(journal.anchor, Some(Duration::from_millis(1500)));
        assert_eq!(journal.appended[1], Duration::from_millis(33));
    }

    #[test]
    fn test_not_ready_drops_without_anchoring() {
        let (encoder, journal) = JournalEncoder::video();
        let ready = encoder.ready.clone();
        let sink = SampleSink::with_encoder(Box::new(encoder));

        ready.store(false, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(sink.try_accept(frame_at(0)), Err(DropReason::NotReady));
        assert!(journal.lock().anchor.is_none());

        ready.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(sink.accept(frame_at(40)));
        assert_eq!(journal.lock().anchor, Some(Duration::from_millis(40)));
        assert_eq!(sink.stats().dropped_not_ready, 1);
    }

    #[test]
    fn test_encoder_rejection_is_absorbed() {
        let (mut encoder, journal) = JournalEncoder::video();
        encoder.fail_appends = true;
        let sink = SampleSink::with_encoder(Box::new(encoder));

        assert_eq!(sink.try_accept(frame_at(0)), Err(DropReason::EncodingFailure));
        assert!(sink.is_writing());
        assert!(sink.last_accepted().is_none());
        assert!(journal.lock().appended.is_empty());
    }

    #[test]
    fn test_drop_reasons_carry_error_categories() {
        assert_eq!(
            DropReason::NonMonotonic.category(),
            Some(ErrorCategory::NonMonotonicSample)
        );
        assert_eq!(
            DropReason::EncodingFailure.category(),
            Some(ErrorCategory::EncodingFailure)
        );
        // Backpressure and lifecycle drops are not errors
        assert_eq!(DropReason::NotReady.category(), None);
        assert_eq!(DropReason::NotWriting.category(), None);
    }

    #[test]
    fn test_kind_mismatch_is_dropped() {
        let (encoder, _journal) = JournalEncoder::video();
        let sink = SampleSink::with_encoder(Box::new(encoder));

        assert_eq!(sink.try_accept(tone_at(0)), Err(DropReason::KindMismatch));
        assert_eq!(sink.stats().dropped_kind_mismatch, 1);
    }

    #[tokio::test]
    async fn test_finish_closes_at_last_accepted() {
        let (encoder, journal) = JournalEncoder::video();
        let sink = SampleSink::with_encoder(Box::new(encoder));

        sink.accept(frame_at(100));
        sink.accept(frame_at(150));
        sink.accept(frame_at(120));
        sink.finish().await.unwrap();

        let journal = journal.lock();
        assert_eq!(journal.ended_at, Some(Duration::from_millis(50)));
        assert!(journal.finalized);
    }

    #[tokio::test]
    async fn test_finish_without_samples_skips_close_out() {
        let (encoder, journal) = JournalEncoder::video();
        let sink = SampleSink::with_encoder(Box::new(encoder));

        sink.finish().await.unwrap();

        let journal = journal.lock();
        assert!(journal.anchor.is_none());
        assert!(journal.ended_at.is_none());
        assert!(journal.finalized);
    }

    #[tokio::test]
    async fn test_samples_after_finish_are_dropped() {
        let (encoder, journal) = JournalEncoder::video();
        let sink = SampleSink::with_encoder(Box::new(encoder));

        sink.accept(frame_at(0));
        sink.finish().await.unwrap();
        assert_eq!(sink.try_accept(frame_at(10)), Err(DropReason::NotWriting));

        // Second finish is a no-op
        sink.finish().await.unwrap();
        assert_eq!(journal.lock().appended.len(), 1);
    }

    #[tokio::test]
    async fn test_finish_races_concurrent_producer() {
        let (encoder, journal) = JournalEncoder::video();
        let sink = Arc::new(SampleSink::with_encoder(Box::new(encoder)));

        let producer = {
            let sink = sink.clone();
            std::thread::spawn(move || {
                let mut ms = 0;
                while ms < 100_000 {
                    sink.accept(frame_at(ms));
                    ms += 1;
                    if !sink.is_writing() {
                        break;
                    }
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        sink.finish().await.unwrap();
        producer.join().unwrap();

        let journal = journal.lock();
        let last_written = journal.appended.last().copied();
        assert_eq!(journal.ended_at, last_written);
        assert_eq!(sink.stats().accepted as usize, journal.appended.len());
    }
}
