//! Video encoders
//!
//! Two containers are supported:
//! - `y4m`: YUV4MPEG2 written in-process. The header is on disk as soon as
//!   the encoder opens, so even an empty recording is a valid file.
//! - `mp4`: H.264 through an FFmpeg child process fed raw BGRA frames on
//!   stdin. A bounded queue in front of the stdin writer thread provides
//!   backpressure.
//!
//! Both containers are constant frame rate. Frames are placed on the output
//! grid by their anchor-relative time: a frame that lands on an already
//! filled slot is skipped, and the incoming frame is repeated over any
//! empty slots before it, up to `MAX_GAP_FILL`. Longer gaps are cut.

use super::{MediaEncoder, MediaKind, SamplePayload, VideoFrame, MAX_GAP_FILL};
use crate::recorder::channel::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Frames the FFmpeg writer thread may have queued before we report "not ready"
const FFMPEG_QUEUE_DEPTH: usize = 8;

/// Output container for video tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoContainer {
    /// YUV4MPEG2, written in-process
    #[default]
    Y4m,
    /// H.264 in MP4, via an FFmpeg child process
    Mp4,
}

impl VideoContainer {
    /// File extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            VideoContainer::Y4m => "y4m",
            VideoContainer::Mp4 => "mp4",
        }
    }
}

/// Video encoding parameters
#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub container: VideoContainer,
    /// FFmpeg binary used by the `mp4` container
    pub ffmpeg_path: PathBuf,
}

impl VideoSettings {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            container: VideoContainer::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }

    /// Reject parameters no 4:2:0 encoder accepts
    pub fn validate(&self) -> RecordingResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecordingError::UnsupportedConfiguration(format!(
                "empty frame size {}x{}",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(RecordingError::UnsupportedConfiguration(format!(
                "frame size {}x{} must have even dimensions",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(RecordingError::UnsupportedConfiguration(
                "frame rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Open the encoder for `settings.container`
pub fn open_encoder(path: &Path, settings: &VideoSettings) -> RecordingResult<Box<dyn MediaEncoder>> {
    settings.validate()?;
    match settings.container {
        VideoContainer::Y4m => Ok(Box::new(Y4mEncoder::create(path, settings)?)),
        VideoContainer::Mp4 => Ok(Box::new(FfmpegEncoder::spawn(path, settings)?)),
    }
}

/// Where one frame lands on the output grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    slot: u64,
    /// Frames to emit (0 = skip)
    copies: u64,
    /// Empty slots cut instead of filled
    cut: u64,
}

/// Maps anchor-relative times onto a constant frame rate grid
#[derive(Debug)]
struct FrameClock {
    fps: u32,
    next_slot: u64,
    frames_written: u64,
}

impl FrameClock {
    fn new(fps: u32) -> Self {
        Self {
            fps,
            next_slot: 0,
            frames_written: 0,
        }
    }

    /// Place a frame at `at` without moving the clock
    fn place(&self, at: Duration) -> Placement {
        let slot = (at.as_secs_f64() * f64::from(self.fps)).round() as u64;
        if slot < self.next_slot {
            return Placement {
                slot,
                copies: 0,
                cut: 0,
            };
        }
        let span = slot - self.next_slot + 1;
        let copies = span.min(u64::from(self.fps) * MAX_GAP_FILL.as_secs() + 1);
        Placement {
            slot,
            copies,
            cut: span - copies,
        }
    }

    /// Record that `placement` was written
    fn commit(&mut self, placement: Placement) {
        if placement.copies == 0 {
            return;
        }
        self.next_slot = placement.slot + 1;
        self.frames_written += placement.copies;
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

fn log_cut(path: &Path, at: Duration, placement: Placement, fps: u32) {
    if placement.cut > 0 {
        tracing::warn!(
            "{}: {:.3}s discontinuity at {:?}, repeating {:?} of video",
            path.display(),
            placement.cut as f64 / f64::from(fps),
            at,
            MAX_GAP_FILL
        );
    }
}

fn check_frame(frame: &VideoFrame, width: u32, height: u32) -> RecordingResult<()> {
    if frame.width != width || frame.height != height {
        return Err(RecordingError::EncodingError(format!(
            "frame is {}x{}, encoder expects {}x{}",
            frame.width, frame.height, width, height
        )));
    }
    let needed = frame.bytes_per_row as usize * (height as usize - 1) + width as usize * 4;
    if frame.bytes_per_row < width * 4 || frame.data.len() < needed {
        return Err(RecordingError::EncodingError(format!(
            "frame buffer too small: {} bytes",
            frame.data.len()
        )));
    }
    Ok(())
}

/// Convert a BGRA frame to planar I420 (BT.601)
fn bgra_to_i420(frame: &VideoFrame, out: &mut Vec<u8>) {
    let w = frame.width as usize;
    let h = frame.height as usize;
    let stride = frame.bytes_per_row as usize;
    let (cw, ch) = (w / 2, h / 2);

    out.clear();
    out.resize(w * h + 2 * cw * ch, 0);
    let (y_plane, chroma) = out.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

    let px = |x: usize, y: usize| -> (i32, i32, i32) {
        let i = y * stride + x * 4;
        let d = &frame.data;
        (i32::from(d[i + 2]), i32::from(d[i + 1]), i32::from(d[i]))
    };

    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = px(x, y);
            y_plane[y * w + x] = ((77 * r + 150 * g + 29 * b + 128) >> 8).clamp(0, 255) as u8;
        }
    }

    for cy in 0..ch {
        for cx in 0..cw {
            let (mut r, mut g, mut b) = (0, 0, 0);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (pr, pg, pb) = px(cx * 2 + dx, cy * 2 + dy);
                r += pr;
                g += pg;
                b += pb;
            }
            let (r, g, b) = (r / 4, g / 4, b / 4);
            let u = ((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128;
            let v = ((128 * r - 107 * g - 21 * b + 128) >> 8) + 128;
            u_plane[cy * cw + cx] = u.clamp(0, 255) as u8;
            v_plane[cy * cw + cx] = v.clamp(0, 255) as u8;
        }
    }
}

/// Copy a possibly padded BGRA frame into a tightly packed buffer
fn packed_bgra(frame: &VideoFrame) -> Arc<[u8]> {
    let row = frame.width as usize * 4;
    if frame.bytes_per_row as usize == row {
        return frame.data.clone();
    }
    let stride = frame.bytes_per_row as usize;
    (0..frame.height as usize)
        .flat_map(|y| frame.data[y * stride..y * stride + row].iter().copied())
        .collect::<Vec<u8>>()
        .into()
}

/// FFmpeg invocation reading raw `pixel_format` frames from stdin and
/// writing H.264 MP4 to `output`
pub(crate) fn ffmpeg_command(
    ffmpeg: &Path,
    pixel_format: &str,
    width: u32,
    height: u32,
    fps: u32,
    output: &Path,
) -> Command {
    let mut command = Command::new(ffmpeg);
    command
        .args([
            "-y",
            "-nostats",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pixel_format",
            pixel_format,
            "-video_size",
            &format!("{width}x{height}"),
            "-framerate",
            &fps.to_string(),
            "-i",
            "-",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
            "-crf",
            "18",
            "-g",
            &(fps * 2).to_string(),
            "-movflags",
            "+faststart",
        ])
        .arg(output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    command
}

/// YUV4MPEG2 writer
pub struct Y4mEncoder {
    path: PathBuf,
    writer: BufWriter<File>,
    width: u32,
    height: u32,
    clock: FrameClock,
    plane_buf: Vec<u8>,
}

impl Y4mEncoder {
    /// Create the file and write the stream header
    pub fn create(path: &Path, settings: &VideoSettings) -> RecordingResult<Self> {
        settings.validate()?;

        let file = File::create(path).map_err(|e| RecordingError::cannot_create(path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 C420jpeg",
            settings.width, settings.height, settings.fps
        )
        .and_then(|_| writer.flush())
        .map_err(|e| RecordingError::cannot_create(path, e))?;

        tracing::debug!(
            "Y4M encoder ready: {}x{} @ {}fps -> {}",
            settings.width,
            settings.height,
            settings.fps,
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            width: settings.width,
            height: settings.height,
            clock: FrameClock::new(settings.fps),
            plane_buf: Vec::new(),
        })
    }
}

impl MediaEncoder for Y4mEncoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn start_session(&mut self, anchor: Duration) {
        tracing::debug!("{}: session anchored at {:?}", self.path.display(), anchor);
    }

    fn append(&mut self, at: Duration, payload: &SamplePayload) -> RecordingResult<()> {
        let SamplePayload::Video(frame) = payload else {
            return Err(RecordingError::EncodingError("expected a video frame".into()));
        };
        check_frame(frame, self.width, self.height)?;

        let placement = self.clock.place(at);
        if placement.copies == 0 {
            return Ok(());
        }
        log_cut(&self.path, at, placement, self.clock.fps);

        bgra_to_i420(frame, &mut self.plane_buf);
        for _ in 0..placement.copies {
            self.writer.write_all(b"FRAME\n")?;
            self.writer.write_all(&self.plane_buf)?;
        }
        self.clock.commit(placement);
        Ok(())
    }

    fn end_session(&mut self, at: Duration) {
        tracing::debug!(
            "{}: session closed at {:?} ({} frames)",
            self.path.display(),
            at,
            self.clock.frames_written()
        );
    }

    fn finalize(mut self: Box<Self>) -> RecordingResult<PathBuf> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.path)
    }
}

/// H.264/MP4 encoder backed by an FFmpeg child process
pub struct FfmpegEncoder {
    path: PathBuf,
    width: u32,
    height: u32,
    clock: FrameClock,
    process: Option<Child>,
    frames: Option<mpsc::Sender<Arc<[u8]>>>,
    writer_thread: Option<std::thread::JoinHandle<u64>>,
}

impl FfmpegEncoder {
    /// Start FFmpeg reading raw BGRA from stdin
    pub fn spawn(path: &Path, settings: &VideoSettings) -> RecordingResult<Self> {
        settings.validate()?;

        // Make sure the destination is writable before handing it to FFmpeg
        File::create(path).map_err(|e| RecordingError::cannot_create(path, e))?;

        let output_file = path.to_string_lossy().to_string();
        let spawned = ffmpeg_command(
            &settings.ffmpeg_path,
            "bgra",
            settings.width,
            settings.height,
            settings.fps,
            path,
        )
        .spawn();

        let mut process = match spawned {
            Ok(p) => p,
            Err(e) => {
                let _ = std::fs::remove_file(path);
                return Err(RecordingError::cannot_create(path, e));
            }
        };

        let Some(mut stdin) = process.stdin.take() else {
            let _ = process.kill();
            let _ = std::fs::remove_file(path);
            return Err(RecordingError::EncodingError("FFmpeg stdin unavailable".into()));
        };

        let (tx, mut rx) = mpsc::channel::<Arc<[u8]>>(FFMPEG_QUEUE_DEPTH);
        let writer_thread = std::thread::spawn(move || {
            let mut written = 0u64;
            while let Some(frame) = rx.blocking_recv() {
                if let Err(e) = stdin.write_all(&frame) {
                    tracing::warn!("FFmpeg stdin closed early: {}", e);
                    break;
                }
                written += 1;
            }
            written
        });

        tracing::info!(
            "Started FFmpeg encoder: {}x{} @ {}fps, output: {}",
            settings.width,
            settings.height,
            settings.fps,
            output_file
        );

        Ok(Self {
            path: path.to_path_buf(),
            width: settings.width,
            height: settings.height,
            clock: FrameClock::new(settings.fps),
            process: Some(process),
            frames: Some(tx),
            writer_thread: Some(writer_thread),
        })
    }
}

impl MediaEncoder for FfmpegEncoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Ready when the queue has room for every copy a frame at `at` needs
    fn is_ready(&self, at: Duration) -> bool {
        let copies = self.clock.place(at).copies;
        self.frames
            .as_ref()
            .is_some_and(|tx| tx.capacity() as u64 >= copies)
    }

    fn start_session(&mut self, anchor: Duration) {
        tracing::debug!("{}: session anchored at {:?}", self.path.display(), anchor);
    }

    fn append(&mut self, at: Duration, payload: &SamplePayload) -> RecordingResult<()> {
        let SamplePayload::Video(frame) = payload else {
            return Err(RecordingError::EncodingError("expected a video frame".into()));
        };
        check_frame(frame, self.width, self.height)?;
        let Some(tx) = self.frames.as_ref() else {
            return Err(RecordingError::EncodingError("encoder already finalized".into()));
        };

        let placement = self.clock.place(at);
        if placement.copies == 0 {
            return Ok(());
        }
        // All copies or none: the grid only advances once they are queued
        let free = tx.capacity() as u64;
        if placement.copies > free {
            return Err(RecordingError::EncodingError(format!(
                "FFmpeg queue has room for {free} frames, {} needed",
                placement.copies
            )));
        }
        log_cut(&self.path, at, placement, self.clock.fps);

        let data = packed_bgra(frame);
        for _ in 0..placement.copies {
            tx.try_send(data.clone())
                .map_err(|e| RecordingError::EncodingError(format!("FFmpeg queue: {e}")))?;
        }
        self.clock.commit(placement);
        Ok(())
    }

    fn end_session(&mut self, at: Duration) {
        tracing::debug!(
            "{}: session closed at {:?} ({} frames)",
            self.path.display(),
            at,
            self.clock.frames_written()
        );
    }

    fn finalize(mut self: Box<Self>) -> RecordingResult<PathBuf> {
        // Closing the queue ends the writer thread, which closes stdin (EOF)
        drop(self.frames.take());
        let written = self
            .writer_thread
            .take()
            .map(|handle| handle.join().unwrap_or(0))
            .unwrap_or(0);

        if let Some(process) = self.process.take() {
            let output = process.wait_with_output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                tracing::warn!("FFmpeg exited with status {}: {}", output.status, stderr);
            }
        }

        tracing::info!(
            "FFmpeg encoder finished: {} frames, output: {}",
            written,
            self.path.display()
        );
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn solid_frame(width: u32, height: u32, bgra: [u8; 4]) -> VideoFrame {
        let data: Vec<u8> = bgra
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        VideoFrame::bgra(width, height, data)
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let err = VideoSettings::new(1279, 720, 30).validate().unwrap_err();
        assert!(matches!(err, RecordingError::UnsupportedConfiguration(_)));
        assert!(VideoSettings::new(1280, 720, 30).validate().is_ok());
        assert!(VideoSettings::new(1280, 720, 0).validate().is_err());
    }

    #[test]
    fn test_y4m_header_written_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("screen.y4m");

        let _encoder = Y4mEncoder::create(&path, &VideoSettings::new(64, 48, 30)).unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data, b"YUV4MPEG2 W64 H48 F30:1 Ip A1:1 C420jpeg\n");
    }

    #[test]
    fn test_y4m_open_fails_in_missing_directory() {
        let path = PathBuf::from("/nonexistent/directory/screen.y4m");
        let result = Y4mEncoder::create(&path, &VideoSettings::new(64, 48, 30));
        assert!(matches!(result, Err(RecordingError::CannotCreateFile { .. })));
    }

    #[test]
    fn test_y4m_frames_fill_constant_rate_grid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("screen.y4m");
        let mut encoder =
            Box::new(Y4mEncoder::create(&path, &VideoSettings::new(4, 4, 10)).unwrap());

        let frame = SamplePayload::Video(solid_frame(4, 4, [0, 0, 0, 255]));
        encoder.start_session(Duration::ZERO);
        encoder.append(Duration::ZERO, &frame).unwrap();
        // 300ms at 10fps lands on slot 3: the frame also fills slots 1 and 2
        encoder.append(Duration::from_millis(300), &frame).unwrap();
        // Same slot as the previous frame: skipped
        encoder.append(Duration::from_millis(320), &frame).unwrap();
        encoder.end_session(Duration::from_millis(320));
        encoder.finalize().unwrap();

        let data = std::fs::read(&path).unwrap();
        let header_len = b"YUV4MPEG2 W4 H4 F10:1 Ip A1:1 C420jpeg\n".len();
        let frame_len = b"FRAME\n".len() + 16 + 4 + 4;
        assert_eq!(data.len(), header_len + 4 * frame_len);
    }

    #[test]
    fn test_y4m_long_gap_is_capped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("screen.y4m");
        let mut encoder =
            Box::new(Y4mEncoder::create(&path, &VideoSettings::new(4, 4, 10)).unwrap());

        let frame = SamplePayload::Video(solid_frame(4, 4, [0, 0, 0, 255]));
        encoder.append(Duration::ZERO, &frame).unwrap();
        // An hour-long jump repeats at most MAX_GAP_FILL worth of frames
        encoder.append(Duration::from_secs(3600), &frame).unwrap();
        encoder
            .append(Duration::from_secs(3600) + Duration::from_millis(100), &frame)
            .unwrap();
        assert_eq!(encoder.clock.frames_written(), 1 + 21 + 1);
        encoder.finalize().unwrap();

        let data = std::fs::read(&path).unwrap();
        let header_len = b"YUV4MPEG2 W4 H4 F10:1 Ip A1:1 C420jpeg\n".len();
        let frame_len = b"FRAME\n".len() + 16 + 4 + 4;
        assert_eq!(data.len(), header_len + 23 * frame_len);
    }

    /// FFmpeg encoder whose queue nobody drains
    fn detached_ffmpeg(fps: u32) -> (FfmpegEncoder, mpsc::Receiver<Arc<[u8]>>) {
        let (tx, rx) = mpsc::channel(FFMPEG_QUEUE_DEPTH);
        let encoder = FfmpegEncoder {
            path: PathBuf::from("screen.mp4"),
            width: 4,
            height: 4,
            clock: FrameClock::new(fps),
            process: None,
            frames: Some(tx),
            writer_thread: None,
        };
        (encoder, rx)
    }

    fn queue_room(encoder: &FfmpegEncoder) -> usize {
        encoder.frames.as_ref().map_or(0, |tx| tx.capacity())
    }

    #[test]
    fn test_ffmpeg_append_is_all_or_nothing() {
        let (mut encoder, mut rx) = detached_ffmpeg(10);
        let frame = SamplePayload::Video(solid_frame(4, 4, [0, 0, 0, 255]));

        encoder.append(Duration::ZERO, &frame).unwrap();
        assert_eq!(queue_room(&encoder), FFMPEG_QUEUE_DEPTH - 1);

        // One second later needs 10 copies, more than the queue can hold
        let late = Duration::from_secs(1);
        assert!(!encoder.is_ready(late));
        assert!(encoder.append(late, &frame).is_err());
        assert_eq!(encoder.clock.frames_written(), 1);
        assert_eq!(queue_room(&encoder), FFMPEG_QUEUE_DEPTH - 1);

        // The next slot still fits
        assert!(encoder.is_ready(Duration::from_millis(100)));
        encoder.append(Duration::from_millis(100), &frame).unwrap();
        assert_eq!(encoder.clock.frames_written(), 2);

        // Once drained, the queue takes the gap fill in one go
        while rx.try_recv().is_ok() {}
        encoder.append(Duration::from_millis(700), &frame).unwrap();
        assert_eq!(encoder.clock.frames_written(), 8);
        assert_eq!(queue_room(&encoder), FFMPEG_QUEUE_DEPTH - 6);

        Box::new(encoder).finalize().unwrap();
    }

    #[tokio::test]
    async fn test_full_ffmpeg_queue_is_backpressure_at_the_sink() {
        use crate::sink::{DropReason, Sample, SampleSink};

        let (encoder, _rx) = detached_ffmpeg(10);
        let sink = SampleSink::with_encoder(Box::new(encoder));
        let frame_at = |ms: u64| {
            Sample::video(Duration::from_millis(ms), solid_frame(4, 4, [0, 0, 0, 255]))
        };

        assert!(sink.accept(frame_at(0)));
        assert_eq!(sink.try_accept(frame_at(1000)), Err(DropReason::NotReady));
        assert_eq!(sink.last_accepted(), Some(Duration::ZERO));
        assert!(sink.accept(frame_at(100)));

        let stats = sink.stats();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.dropped_not_ready, 1);
        assert_eq!(stats.dropped_encoding_failure, 0);
        sink.finish().await.unwrap();
    }

    #[test]
    fn test_bgra_to_i420_white_and_black() {
        let mut out = Vec::new();
        bgra_to_i420(&solid_frame(2, 2, [255, 255, 255, 255]), &mut out);
        assert_eq!(out.len(), 6);
        assert!(out[..4].iter().all(|&y| y >= 254));
        assert!(out[4..].iter().all(|&c| (127..=129).contains(&c)));

        bgra_to_i420(&solid_frame(2, 2, [0, 0, 0, 255]), &mut out);
        assert!(out[..4].iter().all(|&y| y <= 1));
    }

    #[test]
    fn test_frame_size_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("screen.y4m");
        let mut encoder = Y4mEncoder::create(&path, &VideoSettings::new(4, 4, 10)).unwrap();

        let frame = SamplePayload::Video(solid_frame(2, 2, [0, 0, 0, 255]));
        assert!(encoder.append(Duration::ZERO, &frame).is_err());
    }

    #[test]
    fn test_packed_bgra_strips_row_padding() {
        let frame = VideoFrame {
            data: vec![1u8, 1, 1, 1, 9, 9, 2, 2, 2, 2, 9, 9].into(),
            width: 1,
            height: 2,
            bytes_per_row: 6,
        };
        assert_eq!(&*packed_bgra(&frame), &[1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_ffmpeg_missing_binary_leaves_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("screen.mp4");
        let mut settings = VideoSettings::new(64, 48, 30);
        settings.container = VideoContainer::Mp4;
        settings.ffmpeg_path = PathBuf::from("/nonexistent/ffmpeg");

        let result = open_encoder(&path, &settings);
        assert!(matches!(result, Err(RecordingError::CannotCreateFile { .. })));
        assert!(!path.exists());
    }
}
