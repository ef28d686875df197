//! Sample decoding for the two wire PCM encodings.

use crate::error::{Result, VoxbridgeError};
use crate::protocol::SampleFormat;

/// Convert signed 16-bit PCM samples to f32 normalized to [-1.0, 1.0].
///
/// The model expects float input; 16-bit samples range from -32768 to 32767.
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Decode raw chunk bytes into f32 samples according to the declared format.
///
/// PCM16 bytes are little-endian on the wire; F32 bytes are native-endian
/// as written by the producer on the same machine. A byte length that is
/// not a multiple of the sample width is rejected.
pub fn decode_samples(bytes: &[u8], format: SampleFormat) -> Result<Vec<f32>> {
    let width = format.bytes_per_sample();
    if bytes.len() % width != 0 {
        return Err(VoxbridgeError::InvalidAudio {
            reason: format!(
                "byte length {} is not a multiple of sample width {}",
                bytes.len(),
                width
            ),
        });
    }
    let samples = match format {
        SampleFormat::Pcm16 => bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect(),
        SampleFormat::F32 => bytes
            .chunks_exact(4)
            .map(|quad| f32::from_ne_bytes([quad[0], quad[1], quad[2], quad[3]]))
            .collect(),
    };
    Ok(samples)
}

/// A buffer of silence, used to warm the model at startup.
pub fn silence(seconds: usize, sample_rate: u32) -> Vec<f32> {
    vec![0.0; seconds * sample_rate as usize]
}
