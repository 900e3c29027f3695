//! Audio encoder
//!
//! Writes interleaved 32-bit float PCM to a WAV container through `hound`.
//! The header is flushed at open so the file is valid before the first
//! buffer arrives; sizes are fixed up again on finalize.

use super::{MediaEncoder, MediaKind, SamplePayload, MAX_GAP_FILL};
use crate::recorder::channel::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Audio encoding parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

impl AudioSettings {
    pub fn validate(&self) -> RecordingResult<()> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(RecordingError::UnsupportedConfiguration(format!(
                "audio format {}Hz/{}ch",
                self.sample_rate, self.channels
            )));
        }
        Ok(())
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }
}

fn wav_error(e: hound::Error) -> RecordingError {
    match e {
        hound::Error::IoError(io) => RecordingError::IoError(io),
        other => RecordingError::EncodingError(other.to_string()),
    }
}

/// WAV writer for one audio track
pub struct WavEncoder {
    path: PathBuf,
    writer: hound::WavWriter<BufWriter<File>>,
    settings: AudioSettings,
    frames_written: u64,
    /// Timeline frames dropped at discontinuities instead of padded
    frames_skipped: u64,
}

impl WavEncoder {
    /// Create the file and flush a header-only WAV
    pub fn create(path: &Path, settings: &AudioSettings) -> RecordingResult<Self> {
        settings.validate()?;

        let mut writer = hound::WavWriter::create(path, settings.wav_spec()).map_err(|e| match e {
            hound::Error::IoError(io) => RecordingError::cannot_create(path, io),
            other => RecordingError::UnsupportedConfiguration(other.to_string()),
        })?;
        writer.flush().map_err(wav_error)?;

        tracing::debug!(
            "WAV encoder ready: {}Hz {}ch -> {}",
            settings.sample_rate,
            settings.channels,
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            settings: *settings,
            frames_written: 0,
            frames_skipped: 0,
        })
    }

    /// Gap (in frames) tolerated before silence is inserted
    fn gap_tolerance(&self) -> u64 {
        u64::from(self.settings.sample_rate / 100)
    }

    /// Longest run of silence a single gap is padded with
    fn max_gap_frames(&self) -> u64 {
        u64::from(self.settings.sample_rate) * MAX_GAP_FILL.as_secs()
    }

    fn write_silence(&mut self, frames: u64) -> RecordingResult<()> {
        let samples = frames * u64::from(self.settings.channels);
        for _ in 0..samples {
            self.writer.write_sample(0.0f32).map_err(wav_error)?;
        }
        self.frames_written += frames;
        Ok(())
    }
}

impl MediaEncoder for WavEncoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn start_session(&mut self, anchor: Duration) {
        tracing::debug!("{}: session anchored at {:?}", self.path.display(), anchor);
    }

    fn append(&mut self, at: Duration, payload: &SamplePayload) -> RecordingResult<()> {
        let SamplePayload::Audio(buffer) = payload else {
            return Err(RecordingError::EncodingError("expected an audio buffer".into()));
        };
        if buffer.sample_rate != self.settings.sample_rate
            || buffer.channels != self.settings.channels
        {
            return Err(RecordingError::EncodingError(format!(
                "buffer is {}Hz/{}ch, encoder expects {}Hz/{}ch",
                buffer.sample_rate,
                buffer.channels,
                self.settings.sample_rate,
                self.settings.channels
            )));
        }

        // hound cannot finalize a data chunk holding a partial frame
        if buffer.samples.len() % usize::from(buffer.channels) != 0 {
            return Err(RecordingError::EncodingError(format!(
                "{} samples do not divide into {}-channel frames",
                buffer.samples.len(),
                buffer.channels
            )));
        }

        // Keep the track aligned with the session clock across dropped buffers
        let rate = f64::from(self.settings.sample_rate);
        let expected = ((at.as_secs_f64() * rate).round() as u64).saturating_sub(self.frames_skipped);
        if expected > self.frames_written + self.gap_tolerance() {
            let gap = expected - self.frames_written;
            let fill = gap.min(self.max_gap_frames());
            if fill < gap {
                tracing::warn!(
                    "{}: {:.3}s discontinuity at {:?}, padding {:?} of silence",
                    self.path.display(),
                    gap as f64 / rate,
                    at,
                    MAX_GAP_FILL
                );
                self.frames_skipped += gap - fill;
            }
            self.write_silence(fill)?;
        }

        for &sample in buffer.samples.iter() {
            self.writer.write_sample(sample).map_err(wav_error)?;
        }
        self.frames_written += buffer.frames() as u64;
        Ok(())
    }

    fn end_session(&mut self, at: Duration) {
        tracing::debug!(
            "{}: session closed at {:?} ({} frames)",
            self.path.display(),
            at,
            self.frames_written
        );
    }

    fn finalize(self: Box<Self>) -> RecordingResult<PathBuf> {
        let path = self.path;
        self.writer.finalize().map_err(wav_error)?;
        Ok(path)
    }
}
