//! Waveform file I/O
//!
//! Loads WAV files into mono [`Waveform`]s at a requested sample rate and
//! writes waveforms back out. Multi-channel input is averaged down to mono.
//! Sample rate conversion is band-limited (`rubato` FFT resampler), so
//! content above the target Nyquist frequency is filtered out rather than
//! aliased.

use std::path::Path;

use audioadapter_buffers::direct::InterleavedSlice;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;
use rubato::{Fft, FixedSync, Resampler};

use crate::engine::buffer::Waveform;
use crate::error::{EvalError, Result};

/// Load a WAV file as mono at `target_rate`
///
/// # Errors
/// * `AudioRead` - If the file cannot be opened or decoded
/// * `UnsupportedFormat` - For integer bit depths hound cannot map
/// * `EmptyAudio` - If the file holds no samples
/// * `Resample` - If the rate conversion cannot be set up
pub fn load_waveform(path: &Path, target_rate: u32) -> Result<Waveform> {
    let reader = WavReader::open(path).map_err(|e| EvalError::AudioRead {
        path: path.display().to_string(),
        source: e,
    })?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let source_rate = spec.sample_rate;

    let interleaved = read_samples_as_f32(reader, path, spec.bits_per_sample, spec.sample_format)?;
    if interleaved.len() < channels {
        return Err(EvalError::EmptyAudio);
    }

    let mono = downmix(&interleaved, channels);
    let samples = if source_rate != target_rate {
        resample(&mono, source_rate, target_rate)?
    } else {
        mono
    };

    debug!(
        "Loaded {} ({} ch @ {} Hz -> {} samples @ {} Hz)",
        path.display(),
        channels,
        source_rate,
        samples.len(),
        target_rate
    );

    Waveform::new(samples, target_rate)
}

/// Write a waveform as a mono WAV file
///
/// `bit_depth` selects 16/24-bit PCM or 32-bit float.
pub fn save_waveform(wave: &Waveform, path: &Path, bit_depth: u16) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate(),
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let write_err = |e: hound::Error| EvalError::AudioWrite {
        path: path.display().to_string(),
        source: e,
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_err)?;

    match bit_depth {
        16 => {
            for &sample in wave.samples() {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(write_err)?;
            }
        }
        24 => {
            for &sample in wave.samples() {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(write_err)?;
            }
        }
        32 => {
            for &sample in wave.samples() {
                writer.write_sample(sample).map_err(write_err)?;
            }
        }
        _ => {
            return Err(EvalError::UnsupportedFormat {
                format: format!("{}-bit audio (only 16, 24, 32 supported)", bit_depth),
            });
        }
    }

    writer.finalize().map_err(write_err)?;
    Ok(())
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    path: &Path,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let read_err = |e: hound::Error| EvalError::AudioRead {
        path: path.display().to_string(),
        source: e,
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err),
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err),
            _ => Err(EvalError::UnsupportedFormat {
                format: format!("{}-bit integer audio", bits_per_sample),
            }),
        },
    }
}

/// Average interleaved frames down to one channel
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Chunk size fed to the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Band-limited sample rate conversion of a mono signal
///
/// Output length is `ceil(len * target_rate / source_rate)`.
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    let resample_err = |reason: String| EvalError::Resample {
        from: source_rate,
        to: target_rate,
        reason,
    };

    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let mut resampler = Fft::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        RESAMPLE_CHUNK,
        1,
        1,
        FixedSync::Input,
    )
    .map_err(|e| resample_err(e.to_string()))?;

    let input_len = samples.len();
    let output_capacity = resampler.process_all_needed_output_len(input_len);
    let mut output = vec![0.0_f32; output_capacity];

    let input_adapter = InterleavedSlice::new(samples, 1, input_len)
        .map_err(|e| resample_err(e.to_string()))?;
    let mut output_adapter = InterleavedSlice::new_mut(&mut output, 1, output_capacity)
        .map_err(|e| resample_err(e.to_string()))?;

    let (_, written) = resampler
        .process_all_into_buffer(&input_adapter, &mut output_adapter, input_len, None)
        .map_err(|e| resample_err(e.to_string()))?;

    let expected_len =
        (input_len as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize;
    output.truncate(written);
    output.resize(expected_len, 0.0);
    Ok(output)
}
