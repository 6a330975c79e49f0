// Wire decoding
// Converts raw client payloads (little-endian f32 PCM) into samples

use thiserror::Error;

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("Empty audio payload")]
    Empty,

    #[error("Payload of {0} bytes is not a whole number of f32 samples")]
    Misaligned(usize),
}

/// Decode a payload of little-endian 32-bit float samples
pub fn decode_f32_le(bytes: &[u8]) -> Result<Vec<f32>, WireError> {
    if bytes.is_empty() {
        return Err(WireError::Empty);
    }
    if bytes.len() % SAMPLE_BYTES != 0 {
        return Err(WireError::Misaligned(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Encode samples the way clients send them
pub fn encode_f32_le(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
