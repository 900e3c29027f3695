//! Timestamped media samples delivered by capture sources

use std::sync::Arc;
use std::time::Duration;

/// Kind of media a sample or sink carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// One raw video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw pixel data (BGRA format)
    pub data: Arc<[u8]>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Bytes per row (may include padding)
    pub bytes_per_row: u32,
}

impl VideoFrame {
    /// Create a tightly packed BGRA frame
    pub fn bgra(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            bytes_per_row: width * 4,
        }
    }
}

/// One buffer of interleaved PCM audio
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Arc<[f32]>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,
}

impl AudioBuffer {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// Sample payload
#[derive(Debug, Clone)]
pub enum SamplePayload {
    Video(VideoFrame),
    Audio(AudioBuffer),
}

/// A timestamped unit of media.
///
/// Immutable once created; consumed exactly once by a sink. The presentation
/// timestamp is on the producing stream's own monotonic media clock.
#[derive(Debug, Clone)]
pub struct Sample {
    pts: Duration,
    payload: SamplePayload,
}

impl Sample {
    /// Create a video sample
    pub fn video(pts: Duration, frame: VideoFrame) -> Self {
        Self {
            pts,
            payload: SamplePayload::Video(frame),
        }
    }

    /// Create an audio sample
    pub fn audio(pts: Duration, buffer: AudioBuffer) -> Self {
        Self {
            pts,
            payload: SamplePayload::Audio(buffer),
        }
    }

    /// Presentation timestamp
    pub fn pts(&self) -> Duration {
        self.pts
    }

    /// Media kind of the payload
    pub fn kind(&self) -> MediaKind {
        match self.payload {
            SamplePayload::Video(_) => MediaKind::Video,
            SamplePayload::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn payload(&self) -> &SamplePayload {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_kind_follows_payload() {
        let frame = VideoFrame::bgra(2, 2, vec![0u8; 16]);
        assert_eq!(Sample::video(Duration::ZERO, frame).kind(), MediaKind::Video);

        let buffer = AudioBuffer {
            samples: vec![0.0f32; 8].into(),
            sample_rate: 48000,
            channels: 2,
        };
        assert_eq!(buffer.frames(), 4);
        assert_eq!(Sample::audio(Duration::ZERO, buffer).kind(), MediaKind::Audio);
    }
}
