//! Playback output via the cpal backend.
//!
//! The output stream is created on a dedicated keeper thread (cpal streams
//! are thread-affine) which then idles on a stop channel until the session
//! releases the device. The stream callback renders the shared playback
//! timeline; the critical section is one mutex lock per callback buffer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::error::{ConfabError, Result};
use crate::playback::Timeline;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, StreamConfig,
};

/// Handle to the active output device.
///
/// Unlike the capture side (whose stream lives on the capture tick thread),
/// playback has no natural blocking loop to own the stream, so this spawns
/// one: a keeper thread that opens the device, reports readiness, and parks
/// until `close()`.
pub struct AudioOutput {
    stop_tx: crossbeam_channel::Sender<()>,
    keeper: Option<std::thread::JoinHandle<()>>,
    timeline: Arc<Mutex<Timeline>>,
    sample_rate: u32,
}

impl AudioOutput {
    /// Open the default output device and start rendering the timeline.
    ///
    /// # Errors
    /// `ConfabError::NoDefaultOutputDevice` when the system has no output,
    /// `ConfabError::AudioStream` when the stream cannot be built or started.
    #[cfg(feature = "audio-cpal")]
    pub async fn open() -> Result<Self> {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(u32, Arc<Mutex<Timeline>>)>>();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let keeper = std::thread::Builder::new()
            .name("confab-output".into())
            .spawn(move || keeper_main(ready_tx, stop_rx))
            .map_err(|e| ConfabError::AudioStream(format!("spawn output thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok((sample_rate, timeline))) => Ok(Self {
                stop_tx,
                keeper: Some(keeper),
                timeline,
                sample_rate,
            }),
            Ok(Err(e)) => {
                let _ = keeper.join();
                Err(e)
            }
            Err(_) => {
                // Keeper died before reporting — device backend panicked.
                let _ = keeper.join();
                Err(ConfabError::AudioStream(
                    "output thread exited before device open".into(),
                ))
            }
        }
    }

    #[cfg(not(feature = "audio-cpal"))]
    pub async fn open() -> Result<Self> {
        Err(ConfabError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    /// Shared timeline rendered by the output callback.
    pub fn timeline(&self) -> Arc<Mutex<Timeline>> {
        Arc::clone(&self.timeline)
    }

    /// Native output rate reported by the device (Hz).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Release the device: the keeper drops the stream on its own thread.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(keeper) = self.keeper.take() {
            if keeper.join().is_err() {
                error!("output keeper thread panicked during shutdown");
            }
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(feature = "audio-cpal")]
fn keeper_main(
    ready_tx: oneshot::Sender<Result<(u32, Arc<Mutex<Timeline>>)>>,
    stop_rx: crossbeam_channel::Receiver<()>,
) {
    let opened = open_stream();
    let (stream, sample_rate, timeline) = match opened {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok((sample_rate, Arc::clone(&timeline))));

    // Park until close(); recv also returns when the sender is dropped.
    let _ = stop_rx.recv_timeout(Duration::from_secs(60 * 60 * 24));
    drop(stream);
    info!("output device released");
}

#[cfg(feature = "audio-cpal")]
fn open_stream() -> Result<(cpal::Stream, u32, Arc<Mutex<Timeline>>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(ConfabError::NoDefaultOutputDevice)?;

    info!(
        device = device.name().unwrap_or_default().as_str(),
        "opening output device"
    );

    let supported = device
        .default_output_config()
        .map_err(|e| ConfabError::AudioDevice(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    info!(sample_rate, channels, "output config selected");

    let timeline = Arc::new(Mutex::new(Timeline::new(sample_rate)));
    let ch = channels as usize;

    let stream = match supported.sample_format() {
        SampleFormat::F32 => {
            let shared = Arc::clone(&timeline);
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _info| {
                    shared.lock().render(data, ch);
                },
                |err| error!("output stream error: {err}"),
                None,
            )
        }
        SampleFormat::I16 => {
            let shared = Arc::clone(&timeline);
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _info| {
                    scratch.resize(data.len(), 0.0);
                    shared.lock().render(&mut scratch, ch);
                    for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                        *dst = (src.clamp(-1.0, 1.0) * 32767.0) as i16;
                    }
                },
                |err| error!("output stream error: {err}"),
                None,
            )
        }
        fmt => {
            return Err(ConfabError::AudioStream(format!(
                "unsupported output sample format: {fmt:?}"
            )))
        }
    }
    .map_err(|e| ConfabError::AudioStream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| ConfabError::AudioStream(e.to_string()))?;

    Ok((stream, sample_rate, timeline))
}
