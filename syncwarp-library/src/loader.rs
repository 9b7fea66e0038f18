//! Recording decoding into engine-ready mono streams

use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use syncwarp_analysis::{MemoryStream, REFERENCE_SAMPLE_RATE};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while loading a recording
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Resample error: {0}")]
    Resample(String),
}

/// Properties of the recording as stored on disk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingMetadata {
    pub title: String,
    pub duration_secs: f64,
    pub source_sample_rate: u32,
    pub source_channels: u16,
}

/// A decoded recording, mixed down to mono at the loader's rate
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub metadata: RecordingMetadata,
}

impl DecodedTrack {
    /// Wrap the samples as an in-memory stream for the aligner
    pub fn into_stream(self) -> MemoryStream {
        MemoryStream::new(self.samples, self.sample_rate)
    }
}

/// Decodes audio files with Symphonia and resamples them with rubato
pub struct TrackLoader {
    target_sample_rate: u32,
}

impl Default for TrackLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackLoader {
    /// Loader producing 44.1kHz mono, the rate the frame extractor expects
    pub fn new() -> Self {
        Self::with_sample_rate(REFERENCE_SAMPLE_RATE)
    }

    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Decode a file completely
    pub fn load(&self, path: &Path) -> Result<DecodedTrack, LoadError> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::Decode(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let source_sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| LoadError::Decode("sample rate not declared".into()))?;
        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut metadata = read_metadata(&mut format, path);
        metadata.source_sample_rate = source_sample_rate;
        metadata.source_channels = channels;

        let mut mono: Vec<f32> = Vec::new();
        let mut skipped = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(LoadError::Decode(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(symphonia::core::errors::Error::DecodeError(_)) => {
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(LoadError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            mono.extend(mix_to_mono(sample_buf.samples(), spec.channels.count()));
        }

        if skipped > 0 {
            warn!(path = %path.display(), skipped, "skipped undecodable packets");
        }

        metadata.duration_secs = mono.len() as f64 / source_sample_rate as f64;

        let samples = if source_sample_rate != self.target_sample_rate {
            resample(&mono, source_sample_rate, self.target_sample_rate)?
        } else {
            mono
        };

        debug!(
            path = %path.display(),
            source_rate = source_sample_rate,
            channels,
            samples = samples.len(),
            "recording decoded"
        );

        Ok(DecodedTrack {
            samples,
            sample_rate: self.target_sample_rate,
            metadata,
        })
    }
}

/// Average interleaved channels into one
pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Resample a mono signal, padding the final partial chunk with silence
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>, LoadError> {
    use rubato::{FftFixedInOut, Resampler};

    let mut resampler =
        FftFixedInOut::<f32>::new(source_rate as usize, target_rate as usize, 1024, 1)
            .map_err(|e| LoadError::Resample(e.to_string()))?;

    let chunk_size = resampler.input_frames_next();
    let expected = (samples.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    let mut output = Vec::with_capacity(expected + resampler.output_frames_next());

    for chunk in samples.chunks(chunk_size) {
        let resampled = if chunk.len() == chunk_size {
            resampler.process(&[chunk], None)
        } else {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            resampler.process(&[padded.as_slice()], None)
        };
        let resampled = resampled.map_err(|e| LoadError::Resample(e.to_string()))?;
        output.extend_from_slice(&resampled[0]);
    }

    // Padding adds a partial chunk of silence at the end
    output.truncate(expected);
    Ok(output)
}

fn read_metadata(format: &mut Box<dyn FormatReader>, path: &Path) -> RecordingMetadata {
    let mut metadata = RecordingMetadata {
        title: path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string(),
        ..Default::default()
    };

    if let Some(meta) = format.metadata().current() {
        for tag in meta.tags() {
            if let Some(StandardTagKey::TrackTitle) = tag.std_key {
                metadata.title = tag.value.to_string();
            }
        }
    }

    metadata
}
