//! Mono sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Used in both directions of a session:
//! - uplink: the device's native capture rate → the 16 kHz wire rate
//! - downlink: the service's 24 kHz synthesized audio → the output device rate
//!
//! When the rates already match the converter is a passthrough and no rubato
//! session is created.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::warn;

use crate::error::{ConfabError, Result};

/// Converts f32 mono audio from one fixed sample rate to another.
///
/// Input is accumulated internally until a full rubato block is available;
/// the remainder carries over to the next call, so feeding consecutive
/// buffers of one continuous signal produces a continuous output signal.
pub struct RateConverter {
    /// `None` in passthrough mode (rates equal).
    resampler: Option<FastFixedIn<f32>>,
    /// Pending input that did not yet fill a whole block.
    pending: Vec<f32>,
    block_size: usize,
    /// Pre-allocated rubato output: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// Returns `ConfabError::AudioDevice` if rubato rejects the ratio.
    pub fn new(from_rate: u32, to_rate: u32, block_size: usize) -> Result<Self> {
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                block_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = to_rate as f64 / from_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            block_size,
            1, // mono
        )
        .map_err(|e| ConfabError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::new(),
            block_size,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Feed samples, returning whatever full blocks are ready (may be empty).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        while self.pending.len() >= self.block_size {
            let block = &self.pending[..self.block_size];
            match resampler.process_into_buffer(&[block], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    out.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    warn!("resampler block failed, dropping it: {e}");
                }
            }
            self.pending.drain(..self.block_size);
        }
        out
    }

    /// Discard pending input. Called on playback interruption so stale tail
    /// samples from a cancelled utterance cannot leak into the next one.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// `true` when no rate conversion happens.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_returns_input_unchanged() {
        let mut rc = RateConverter::new(24_000, 24_000, 512).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..300).map(|i| i as f32 * 0.002).collect();
        assert_eq!(rc.process(&samples), samples);
    }

    #[test]
    fn downlink_24k_to_48k_doubles_length_approximately() {
        let mut rc = RateConverter::new(24_000, 48_000, 512).unwrap();
        let out = rc.process(&vec![0.0f32; 1024]);
        // Two full blocks in, roughly 2048 samples out
        assert!(
            (out.len() as isize - 2048).unsigned_abs() <= 16,
            "len={}",
            out.len()
        );
    }

    #[test]
    fn short_input_is_held_until_a_block_fills() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(rc.process(&vec![0.0f32; 400]).is_empty());
        assert!(rc.process(&vec![0.0f32; 400]).is_empty());
        // 1200 total ≥ 960: now a block is ready
        assert!(!rc.process(&vec![0.0f32; 400]).is_empty());
    }

    #[test]
    fn reset_drops_pending_input() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(rc.process(&vec![0.5f32; 900]).is_empty());
        rc.reset();
        // The 900 buffered samples are gone; 900 fresh ones still < one block
        assert!(rc.process(&vec![0.0f32; 900]).is_empty());
    }
}
