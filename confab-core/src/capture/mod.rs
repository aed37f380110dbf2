//! Capture pipeline: microphone → steady stream of encoded outbound frames.
//!
//! ## Tick loop (blocking thread)
//!
//! ```text
//! 1. Drain the SPSC ring (device-rate mono f32)
//! 2. Resample to the 16 kHz wire rate
//! 3. Window into fixed 4096-sample frames
//! 4. Per frame: RMS → normalized level (published even while muted)
//! 5. If unmuted: PCM16-encode, base64-wrap, emit in production order
//! ```
//!
//! The input stream is opened on the tick thread itself (cpal streams are
//! thread-affine); open success or failure is reported back to the async
//! caller through a oneshot. A failure inside one tick is logged and skipped
//! — a single bad frame must not end the session.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    audio::{capture::AudioCapture, resample::RateConverter},
    buffering::{create_capture_ring, CaptureConsumer, Consumer},
    codec,
    error::{ConfabError, Result},
    ipc::events::AudioLevelEvent,
    INPUT_SAMPLE_RATE,
};

/// Outbound frame size in samples at the wire rate (~256 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = 4096;

/// Samples drained from the ring per iteration (20 ms at 48 kHz).
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty, to avoid burning a core.
const SLEEP_EMPTY: Duration = Duration::from_millis(5);

/// Maps typical speech RMS (~0.0–0.2) onto a useful [0, 1] meter range.
const LEVEL_GAIN: f32 = 5.0;

/// Everything the tick loop needs, bundled so the closure stays tidy.
struct TickContext {
    consumer: CaptureConsumer,
    running: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    level: Arc<Mutex<f32>>,
    activity_tx: broadcast::Sender<AudioLevelEvent>,
    frame_tx: mpsc::Sender<String>,
    capture_rate: u32,
}

/// Handle to a running capture pipeline.
pub struct CapturePipeline {
    running: Arc<AtomicBool>,
}

impl CapturePipeline {
    /// Open the microphone and start the tick loop.
    ///
    /// Returns the pipeline handle plus the receiver of encoded frames, in
    /// production order. The mute flag is read synchronously inside each
    /// tick, so a toggle takes effect on the next frame at the latest.
    ///
    /// # Errors
    /// `ConfabError::Microphone` when the device cannot be opened.
    pub async fn start(
        muted: Arc<AtomicBool>,
        level: Arc<Mutex<f32>>,
        activity_tx: broadcast::Sender<AudioLevelEvent>,
    ) -> Result<(Self, mpsc::Receiver<String>)> {
        let running = Arc::new(AtomicBool::new(true));
        let (frame_tx, frame_rx) = mpsc::channel::<String>(64);
        let (producer, consumer) = create_capture_ring();
        let (open_tx, open_rx) = oneshot::channel::<Result<u32>>();

        let thread_running = Arc::clone(&running);
        tokio::task::spawn_blocking(move || {
            // Device must be opened on the thread that will drop it.
            let capture = match AudioCapture::open(producer, Arc::clone(&thread_running)) {
                Ok(capture) => {
                    let _ = open_tx.send(Ok(capture.sample_rate));
                    capture
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    thread_running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            run_ticks(TickContext {
                consumer,
                running: thread_running,
                muted,
                level,
                activity_tx,
                frame_tx,
                capture_rate: capture.sample_rate,
            });

            // Stream drops here, releasing the microphone on this thread.
            drop(capture);
        });

        match open_rx.await {
            Ok(Ok(rate)) => {
                info!(capture_rate = rate, "capture pipeline started");
                Ok((Self { running }, frame_rx))
            }
            Ok(Err(e)) => {
                running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                Err(ConfabError::Microphone(
                    "capture thread exited before device open".into(),
                ))
            }
        }
    }

    /// Signal the tick loop to exit and release the microphone.
    /// Idempotent; safe to call when the loop already stopped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl CapturePipeline {
    /// A pipeline that was never started, for driver tests without devices.
    pub(crate) fn stub() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the tick loop until `ctx.running` goes false.
fn run_ticks(mut ctx: TickContext) {
    let mut converter = match RateConverter::new(ctx.capture_rate, INPUT_SAMPLE_RATE, DRAIN_CHUNK) {
        Ok(converter) => converter,
        Err(e) => {
            warn!(error = %e, "capture resampler unavailable, stopping pipeline");
            ctx.running.store(false, Ordering::SeqCst);
            return;
        }
    };
    if !converter.is_passthrough() {
        info!(
            from = ctx.capture_rate,
            to = INPUT_SAMPLE_RATE,
            "uplink resampling enabled"
        );
    }

    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut window: Vec<f32> = Vec::with_capacity(FRAME_SAMPLES * 2);
    let mut seq = 0u64;

    while ctx.running.load(Ordering::Relaxed) {
        let drained = ctx.consumer.pop_slice(&mut raw);
        if drained == 0 {
            std::thread::sleep(SLEEP_EMPTY);
            continue;
        }

        window.extend_from_slice(&converter.process(&raw[..drained]));
        while window.len() >= FRAME_SAMPLES {
            let frame: Vec<f32> = window.drain(..FRAME_SAMPLES).collect();
            emit_frame(&mut ctx, &frame, &mut seq);
        }
    }
    debug!("capture tick loop stopped");
}

/// Meter one frame, then transmit it unless muted.
fn emit_frame(ctx: &mut TickContext, frame: &[f32], seq: &mut u64) {
    let level = normalized_level(rms(frame));
    *ctx.level.lock() = level;
    // Level is published on every tick, muted or not, so meters keep moving.
    let _ = ctx.activity_tx.send(AudioLevelEvent { seq: *seq, level });
    *seq = seq.saturating_add(1);

    // Mute check happens in the same tick that decides to transmit.
    if ctx.muted.load(Ordering::Relaxed) {
        return;
    }

    let payload = codec::to_base64(&codec::encode_pcm16(frame));
    if ctx.frame_tx.blocking_send(payload).is_err() {
        // Receiver gone — the session driver is tearing down; frames from
        // here on are intentionally dropped.
        debug!("frame channel closed, suppressing transmission");
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

fn normalized_level(rms: f32) -> f32 {
    (rms * LEVEL_GAIN).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::Producer;
    use approx::assert_abs_diff_eq;
    use std::thread;

    fn spawn_loop(
        muted: bool,
    ) -> (
        Arc<AtomicBool>,
        Arc<AtomicBool>,
        Arc<Mutex<f32>>,
        broadcast::Receiver<AudioLevelEvent>,
        mpsc::Receiver<String>,
        crate::buffering::CaptureProducer,
        thread::JoinHandle<()>,
    ) {
        let (producer, consumer) = create_capture_ring();
        let running = Arc::new(AtomicBool::new(true));
        let muted_flag = Arc::new(AtomicBool::new(muted));
        let level = Arc::new(Mutex::new(0.0f32));
        let (activity_tx, activity_rx) = broadcast::channel(64);
        let (frame_tx, frame_rx) = mpsc::channel(64);

        let ctx = TickContext {
            consumer,
            running: Arc::clone(&running),
            muted: Arc::clone(&muted_flag),
            level: Arc::clone(&level),
            activity_tx,
            frame_tx,
            capture_rate: INPUT_SAMPLE_RATE, // passthrough: no resampling in tests
        };
        let handle = thread::spawn(move || run_ticks(ctx));
        (
            running, muted_flag, level, activity_rx, frame_rx, producer, handle,
        )
    }

    fn wait_for_level(level: &Arc<Mutex<f32>>) {
        for _ in 0..200 {
            if *level.lock() > 0.0 {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("tick loop never published a level");
    }

    #[test]
    fn unmuted_frames_reach_the_transport_in_order() {
        let (running, _muted, level, mut activity_rx, mut frame_rx, mut producer, handle) =
            spawn_loop(false);

        producer.push_slice(&vec![0.1f32; FRAME_SAMPLES]);
        producer.push_slice(&vec![0.2f32; FRAME_SAMPLES]);

        let first = frame_rx.blocking_recv().expect("first frame");
        let second = frame_rx.blocking_recv().expect("second frame");
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        let decode = |payload: &str| {
            codec::decode_pcm16(&codec::from_base64(payload).unwrap()).unwrap()
        };
        let first_samples = decode(&first);
        let second_samples = decode(&second);
        assert_eq!(first_samples.len(), FRAME_SAMPLES);
        assert_abs_diff_eq!(first_samples[0], 0.1, epsilon = 1e-3);
        assert_abs_diff_eq!(second_samples[0], 0.2, epsilon = 1e-3);

        assert!(*level.lock() > 0.0);
        let activity = activity_rx.try_recv().expect("activity event");
        assert_eq!(activity.seq, 0);
    }

    #[test]
    fn muted_frames_are_metered_but_not_transmitted() {
        let (running, _muted, level, mut activity_rx, mut frame_rx, mut producer, handle) =
            spawn_loop(true);

        producer.push_slice(&vec![0.5f32; FRAME_SAMPLES]);
        wait_for_level(&level);
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        // Meter moved…
        assert_abs_diff_eq!(*level.lock(), 1.0, epsilon = 1e-3); // 0.5 RMS × gain, capped
        assert!(activity_rx.try_recv().is_ok());
        // …but nothing was sent.
        assert!(frame_rx.try_recv().is_err());
    }

    #[test]
    fn partial_windows_are_held_until_full() {
        let (running, _muted, _level, _activity_rx, mut frame_rx, mut producer, handle) =
            spawn_loop(false);

        producer.push_slice(&vec![0.3f32; FRAME_SAMPLES / 2]);
        thread::sleep(Duration::from_millis(50));
        assert!(frame_rx.try_recv().is_err());

        producer.push_slice(&vec![0.3f32; FRAME_SAMPLES / 2]);
        let frame = frame_rx.blocking_recv().expect("completed frame");
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        let samples = codec::decode_pcm16(&codec::from_base64(&frame).unwrap()).unwrap();
        assert_eq!(samples.len(), FRAME_SAMPLES);
    }

    #[test]
    fn level_normalization_caps_at_one() {
        assert_abs_diff_eq!(normalized_level(0.0), 0.0);
        assert_abs_diff_eq!(normalized_level(0.1), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(normalized_level(0.9), 1.0);
    }

    #[test]
    fn rms_of_constant_signal_is_its_amplitude() {
        assert_abs_diff_eq!(rms(&[0.25; 64]), 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(rms(&[]), 0.0);
    }
}
