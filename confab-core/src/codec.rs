//! PCM sample-format conversion and transport-safe payload encoding.
//!
//! The wire format is mono 16-bit signed little-endian PCM, wrapped in
//! base64 for transmission inside JSON messages. Everything here is a pure
//! function: no state, no side effects, deterministic for a given input.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{ConfabError, Result};

/// Convert f32 samples in [-1.0, 1.0] to little-endian 16-bit PCM bytes.
///
/// Out-of-range samples are clamped rather than wrapped, so a slightly hot
/// input signal distorts instead of producing full-scale clicks.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Reinterpret little-endian 16-bit PCM bytes as f32 samples in [-1.0, 1.0].
///
/// # Errors
/// Returns `ConfabError::Decode` when the byte length is odd (truncated or
/// misaligned payload). Callers drop the fragment and keep the session alive.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(ConfabError::Decode(format!(
            "pcm16 payload has odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Wrap binary audio in the transport-safe text encoding.
pub fn to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Unwrap a transport payload back to binary audio.
///
/// # Errors
/// Returns `ConfabError::Decode` for invalid base64 input.
pub fn from_base64(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| ConfabError::Decode(format!("base64: {e}")))
}
