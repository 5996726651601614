//! Sample track support: decoded WAV buffers, the sample voice, and a loader
//! that keeps only the newest decode.

use std::fmt;
use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::graph::{Destination, Param, Patch};

/// Sample voice onset gain.
pub const SAMPLE_GAIN: f64 = 0.5;

/// Sample voice decay length in seconds.
pub const SAMPLE_DECAY: f64 = 0.5;

/// Longest asset accepted by the decoder, in seconds of source audio.
pub const MAX_SAMPLE_SECONDS: f64 = 60.0;

/// Errors that can occur when decoding a sample asset.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("WAV file contains no samples")]
    Empty,
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// A mono audio buffer at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleData {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleData {
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode WAV data, mixing to mono and resampling to `target_sample_rate`.
    ///
    /// Integer formats of 8 to 32 bits and 32-bit float are accepted.
    pub fn from_wav<R: Read + Seek>(
        reader: R,
        target_sample_rate: u32,
    ) -> Result<Self, SampleError> {
        let wav = hound::WavReader::new(reader)?;
        let spec = wav.spec();
        if spec.sample_rate == 0 {
            return Err(SampleError::UnsupportedFormat("0 Hz sample rate".into()));
        }
        let channels = spec.channels.max(1) as usize;

        let raw: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let bits = spec.bits_per_sample;
                if !(8..=32).contains(&bits) {
                    return Err(SampleError::UnsupportedFormat(format!(
                        "{bits}-bit integer"
                    )));
                }
                let scale = (1u64 << (bits - 1)) as f32;
                wav.into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
            hound::SampleFormat::Float => {
                if spec.bits_per_sample != 32 {
                    return Err(SampleError::UnsupportedFormat(format!(
                        "{}-bit float",
                        spec.bits_per_sample
                    )));
                }
                wav.into_samples::<f32>().collect::<Result<_, _>>()?
            }
        };

        if raw.len() < channels {
            return Err(SampleError::Empty);
        }

        let mono: Vec<f32> = raw
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        let decoded = Self::from_mono(mono, spec.sample_rate);
        if decoded.duration() > MAX_SAMPLE_SECONDS {
            return Err(SampleError::UnsupportedFormat(format!(
                "{:.0} s of audio at {} Hz",
                decoded.duration(),
                spec.sample_rate
            )));
        }
        Ok(decoded.resampled(target_sample_rate))
    }

    /// Decode an in-memory encoded file.
    pub fn from_bytes(bytes: &[u8], target_sample_rate: u32) -> Result<Self, SampleError> {
        Self::from_wav(Cursor::new(bytes), target_sample_rate)
    }

    /// This buffer converted to `target_rate` by linear interpolation.
    ///
    /// A zero rate on either side leaves the buffer untouched.
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.sample_rate == 0 || target_rate == 0 {
            return self;
        }
        Self {
            samples: resample_linear(&self.samples, self.sample_rate, target_rate),
            sample_rate: target_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

fn resample_linear(input: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if input.len() < 2 || source_rate == 0 || target_rate == 0 {
        return input.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let output_len = (input.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            match (input.get(idx), input.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                _ => input[input.len() - 1],
            }
        })
        .collect()
}

/// The sample voice: whole buffer, gain 0.5 decaying to 0.001 over 0.5 s.
///
/// The buffer source has no explicit stop; it ends when the buffer runs out.
pub fn sample_patch(sample: Arc<SampleData>, when: f64) -> Patch {
    let mut patch = Patch::new();
    let src = patch.buffer(sample);
    let gain = patch.gain(SAMPLE_GAIN);
    patch.set_value_at(gain, Param::Gain, SAMPLE_GAIN, when);
    patch.exponential_ramp_to(gain, Param::Gain, 0.001, when + SAMPLE_DECAY);
    patch.connect(src, Destination::Node(gain));
    patch.connect(gain, Destination::Output);
    patch.start(src, when);
    patch
}

/// Handle for one decode request. Only the newest ticket may install its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeTicket {
    seq: u64,
    name: String,
}

impl DecodeTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// User-visible state of the sample track.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SampleStatus {
    #[default]
    Empty,
    Loading(String),
    Loaded(String),
    Failed(String),
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleStatus::Empty => f.write_str("No sample loaded"),
            SampleStatus::Loading(name) => write!(f, "Loading: {name}"),
            SampleStatus::Loaded(name) => write!(f, "Loaded: {name}"),
            SampleStatus::Failed(_) => f.write_str("Failed to decode sample"),
        }
    }
}

/// What happened to a finished decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Installed,
    Failed,
    /// A newer request was issued after this one; the result was dropped.
    Stale,
}

/// The sample track's asset slot plus decode sequencing.
#[derive(Debug, Default)]
pub struct SampleLoader {
    latest: u64,
    sample: Option<Arc<SampleData>>,
    status: SampleStatus,
}

impl SampleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a decode request. Supersedes every earlier ticket.
    pub fn begin(&mut self, name: &str) -> DecodeTicket {
        self.latest += 1;
        self.status = SampleStatus::Loading(name.to_string());
        DecodeTicket {
            seq: self.latest,
            name: name.to_string(),
        }
    }

    /// Apply a finished decode if `ticket` is still the latest request.
    pub fn finish(
        &mut self,
        ticket: &DecodeTicket,
        result: Result<SampleData, SampleError>,
    ) -> LoadOutcome {
        if ticket.seq != self.latest {
            debug!(
                seq = ticket.seq,
                latest = self.latest,
                name = %ticket.name,
                "dropping stale sample decode"
            );
            return LoadOutcome::Stale;
        }
        match result {
            Ok(data) => {
                debug!(name = %ticket.name, frames = data.len(), "sample loaded");
                self.sample = Some(Arc::new(data));
                self.status = SampleStatus::Loaded(ticket.name.clone());
                LoadOutcome::Installed
            }
            Err(e) => {
                warn!(name = %ticket.name, error = %e, "failed to decode sample");
                self.status = SampleStatus::Failed(ticket.name.clone());
                LoadOutcome::Failed
            }
        }
    }

    /// The loaded asset, if any. A failed decode keeps the previous asset.
    pub fn sample(&self) -> Option<Arc<SampleData>> {
        self.sample.clone()
    }

    pub fn status(&self) -> &SampleStatus {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn write_wav_16bit(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut buf, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        buf.into_inner()
    }

    fn write_wav_f32(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::new(&mut buf, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        buf.into_inner()
    }

    /// Mono 16-bit PCM with a hand-written header, so any rate can be declared.
    fn raw_pcm16(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_16bit_mono() {
        let bytes = write_wav_16bit(&[0, 16384, -16384], 44100, 1);
        let sd = SampleData::from_bytes(&bytes, 44100).unwrap();
        assert_eq!(sd.len(), 3);
        assert!((sd.samples()[1] - 0.5).abs() < 1e-3);
        assert!((sd.samples()[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn stereo_mixes_to_mono() {
        let bytes = write_wav_f32(&[0.8, 0.2, -0.4, -0.6], 44100, 2);
        let sd = SampleData::from_bytes(&bytes, 44100).unwrap();
        assert_eq!(sd.len(), 2);
        assert!((sd.samples()[0] - 0.5).abs() < 1e-6);
        assert!((sd.samples()[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn resamples_to_target_rate() {
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 / 100.0).sin()).collect();
        let bytes = write_wav_f32(&samples, 22050, 1);
        let sd = SampleData::from_bytes(&bytes, 44100).unwrap();
        assert_eq!(sd.sample_rate(), 44100);
        assert!(sd.len() >= 190 && sd.len() <= 210);
    }

    #[test]
    fn garbage_bytes_fail() {
        let err = SampleData::from_bytes(b"definitely not audio", 44100).unwrap_err();
        assert!(matches!(err, SampleError::Wav(_)));
    }

    #[test]
    fn empty_wav_fails() {
        let bytes = write_wav_16bit(&[], 44100, 1);
        let err = SampleData::from_bytes(&bytes, 44100).unwrap_err();
        assert!(matches!(err, SampleError::Empty));
    }

    #[test]
    fn resample_short_inputs() {
        assert!(resample_linear(&[], 44100, 22050).is_empty());
        assert_eq!(resample_linear(&[0.5], 44100, 22050), vec![0.5]);
    }

    #[test]
    fn zero_rate_header_is_rejected() {
        let bytes = raw_pcm16(&[0, 1000, -1000, 0], 0);
        assert!(SampleData::from_bytes(&bytes, 48000).is_err());
    }

    #[test]
    fn hand_written_header_decodes() {
        let bytes = raw_pcm16(&[0, 16384], 48000);
        let sd = SampleData::from_bytes(&bytes, 48000).unwrap();
        assert_eq!(sd.len(), 2);
        assert!((sd.samples()[1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn overlong_asset_is_rejected() {
        // 61 frames at 1 Hz is over a minute of audio.
        let bytes = write_wav_16bit(&[0; 61], 1, 1);
        let err = SampleData::from_bytes(&bytes, 48000).unwrap_err();
        assert!(matches!(err, SampleError::UnsupportedFormat(_)));

        let sd = SampleData::from_bytes(&write_wav_16bit(&[0; 4], 1, 1), 8).unwrap();
        assert_eq!(sd.len(), 32);
        assert!((sd.duration() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn zero_rates_leave_the_buffer_alone() {
        assert_eq!(resample_linear(&[0.1, 0.2], 0, 48000), vec![0.1, 0.2]);
        assert_eq!(resample_linear(&[0.1, 0.2], 48000, 0), vec![0.1, 0.2]);
        let sd = SampleData::from_mono(vec![0.1, 0.2], 0).resampled(48000);
        assert_eq!(sd.len(), 2);
    }

    #[test]
    fn sample_voice_shape() {
        let sd = Arc::new(SampleData::from_mono(vec![0.1; 64], 48000));
        let patch = sample_patch(sd, 2.0);
        let buffers = patch.find(|k| matches!(k, NodeKind::Buffer { .. }));
        assert_eq!(buffers.len(), 1);
        assert_eq!(patch.node(buffers[0]).start_time(), Some(2.0));
        assert_eq!(patch.node(buffers[0]).stop_time(), None);

        let gains = patch.find(|k| matches!(k, NodeKind::Gain));
        let g = patch.node(gains[0]).param(Param::Gain).unwrap();
        assert!((g.value_at(2.0) - 0.5).abs() < 1e-9);
        assert!((g.value_at(2.5) - 0.001).abs() < 1e-9);
    }

    #[test]
    fn loader_installs_latest() {
        let mut loader = SampleLoader::new();
        let t = loader.begin("kick.wav");
        assert_eq!(loader.status(), &SampleStatus::Loading("kick.wav".into()));
        let outcome = loader.finish(&t, Ok(SampleData::from_mono(vec![0.0; 4], 44100)));
        assert_eq!(outcome, LoadOutcome::Installed);
        assert!(loader.sample().is_some());
        assert_eq!(loader.status().to_string(), "Loaded: kick.wav");
    }

    #[test]
    fn loader_discards_stale_decode() {
        let mut loader = SampleLoader::new();
        let first = loader.begin("a.wav");
        let second = loader.begin("b.wav");

        let b = SampleData::from_mono(vec![0.2; 8], 44100);
        assert_eq!(loader.finish(&second, Ok(b.clone())), LoadOutcome::Installed);

        // The slower, older decode completes last and must not win.
        let a = SampleData::from_mono(vec![0.9; 8], 44100);
        assert_eq!(loader.finish(&first, Ok(a)), LoadOutcome::Stale);
        assert_eq!(loader.sample().as_deref(), Some(&b));
        assert_eq!(loader.status(), &SampleStatus::Loaded("b.wav".into()));
    }

    #[test]
    fn loader_reports_failure() {
        let mut loader = SampleLoader::new();
        let t = loader.begin("broken.wav");
        let outcome = loader.finish(&t, Err(SampleError::Empty));
        assert_eq!(outcome, LoadOutcome::Failed);
        assert!(loader.sample().is_none());
        assert_eq!(loader.status().to_string(), "Failed to decode sample");
    }
}
