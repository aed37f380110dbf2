//! Microphone capture via the cpal backend.
//!
//! The input callback downmixes to mono f32 and pushes straight into the
//! SPSC ring — no allocation after the first callback, no locks, no I/O.
//! Everything else (resampling, framing, metering, encoding) happens on the
//! capture tick thread that owns this stream.

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

use crate::{
    buffering::{CaptureProducer, Producer},
    error::{ConfabError, Result},
};

/// Handle to an active microphone stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this on the capture tick thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped while capturing.
    #[cfg(feature = "audio-cpal")]
    _stream: cpal::Stream,
    /// Shared flag — `false` makes the callback a no-op.
    running: Arc<AtomicBool>,
    /// Native capture rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open the system default microphone and push mono f32 frames into
    /// `producer`.
    ///
    /// # Errors
    /// `ConfabError::Microphone` when no input device exists or the stream
    /// cannot be opened — on desktop platforms a denied OS microphone
    /// permission surfaces here too. Fatal to the connect attempt; never
    /// retried automatically.
    #[cfg(feature = "audio-cpal")]
    pub fn open(mut producer: CaptureProducer, running: Arc<AtomicBool>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| ConfabError::Microphone("no input device available".into()))?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening microphone"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| ConfabError::Microphone(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(sample_rate, channels, "capture config selected");

        let ch = channels as usize;
        let gate = Arc::clone(&running);
        let mut mono: Vec<f32> = Vec::new();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _info| {
                    if !gate.load(Ordering::Relaxed) {
                        return;
                    }
                    push_downmixed(&mut producer, &mut mono, data, ch, |s| s);
                },
                |err| error!("capture stream error: {err}"),
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _info| {
                    if !gate.load(Ordering::Relaxed) {
                        return;
                    }
                    push_downmixed(&mut producer, &mut mono, data, ch, |s| s as f32 / 32768.0);
                },
                |err| error!("capture stream error: {err}"),
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _info| {
                    if !gate.load(Ordering::Relaxed) {
                        return;
                    }
                    push_downmixed(&mut producer, &mut mono, data, ch, |s| {
                        (s as f32 - 32768.0) / 32768.0
                    });
                },
                |err| error!("capture stream error: {err}"),
                None,
            ),
            fmt => {
                return Err(ConfabError::Microphone(format!(
                    "unsupported capture sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| ConfabError::Microphone(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ConfabError::Microphone(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Signal the callback to no-op; the stream itself is released when this
    /// handle drops on its owning thread.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Downmix an interleaved callback buffer to mono and push it into the ring.
///
/// `mono` is a scratch buffer reused across callbacks; it allocates once on
/// the first callback and is resize-only afterwards.
#[cfg(feature = "audio-cpal")]
fn push_downmixed<T: Copy>(
    producer: &mut CaptureProducer,
    mono: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    convert: impl Fn(T) -> f32,
) {
    let frames = data.len() / channels.max(1);
    mono.resize(frames, 0.0);
    if channels <= 1 {
        for (dst, src) in mono.iter_mut().zip(data.iter()) {
            *dst = convert(*src);
        }
    } else {
        for (frame, dst) in mono.iter_mut().enumerate() {
            let base = frame * channels;
            let mut sum = 0f32;
            for c in 0..channels {
                sum += convert(data[base + c]);
            }
            *dst = sum / channels as f32;
        }
    }
    let written = producer.push_slice(mono);
    if written < mono.len() {
        warn!("capture ring full: dropped {} frames", mono.len() - written);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open(_producer: CaptureProducer, _running: Arc<AtomicBool>) -> Result<Self> {
        Err(ConfabError::Microphone(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
