//! Gapless playback scheduling for streamed audio fragments.
//!
//! Fragments arrive from the network with variable latency but must play
//! back-to-back in arrival order. [`Timeline`] keeps a cursor — "end of
//! already-scheduled audio" on the output clock — and places each new
//! fragment at `max(cursor, now)`, so jitter never causes overlap and a
//! stalled downlink costs one audible gap instead of burst distortion.
//!
//! [`Timeline`] is device-independent (the output clock is the frame counter
//! advanced by whoever renders it), which keeps every scheduling property
//! testable without opening an audio device. [`PlaybackScheduler`] couples a
//! timeline to a cpal output stream and the downlink rate converter.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::audio::output::AudioOutput;
use crate::audio::resample::RateConverter;
use crate::error::Result;

/// Rubato block size for the downlink converter. At 24 kHz input this is
/// ~43 ms — small enough that the first fragment of a turn starts promptly.
const DOWNLINK_BLOCK: usize = 1024;

/// One scheduled, decoded audio unit on the output timeline.
struct ScheduledSource {
    /// First output-clock frame this source occupies.
    start_frame: u64,
    /// Mono samples at the output device rate.
    samples: Vec<f32>,
    /// Render position within `samples`.
    pos: usize,
}

/// Ordered virtual timeline for decoded output audio.
///
/// The clock is the number of frames rendered so far; `render` advances it.
/// Sources never overlap: each is scheduled at the cursor, and the cursor
/// advances by exactly the scheduled duration.
pub struct Timeline {
    sample_rate: u32,
    clock_frames: u64,
    /// Cursor: seconds on the output clock where the next fragment starts.
    next_start: f64,
    sources: VecDeque<ScheduledSource>,
}

impl Timeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            clock_frames: 0,
            next_start: 0.0,
            sources: VecDeque::new(),
        }
    }

    /// Current output-clock time in seconds.
    pub fn now_secs(&self) -> f64 {
        self.clock_frames as f64 / self.sample_rate as f64
    }

    /// Cursor position in seconds.
    pub fn cursor_secs(&self) -> f64 {
        self.next_start
    }

    pub fn active_count(&self) -> usize {
        self.sources.len()
    }

    /// `(start, duration)` in seconds for every source still scheduled.
    pub fn active_spans(&self) -> Vec<(f64, f64)> {
        self.sources
            .iter()
            .map(|s| {
                (
                    s.start_frame as f64 / self.sample_rate as f64,
                    s.samples.len() as f64 / self.sample_rate as f64,
                )
            })
            .collect()
    }

    /// Schedule `samples` (mono, at the timeline rate) at the cursor.
    ///
    /// If the cursor has fallen behind the clock (a stall), it snaps forward
    /// to `now` first. Returns the start time in seconds.
    pub fn schedule(&mut self, samples: Vec<f32>) -> f64 {
        let now = self.now_secs();
        if self.next_start < now {
            debug!(
                cursor = self.next_start,
                now, "cursor behind output clock, snapping forward"
            );
            self.next_start = now;
        }
        let start = self.next_start;
        if samples.is_empty() {
            return start;
        }

        let duration = samples.len() as f64 / self.sample_rate as f64;
        self.sources.push_back(ScheduledSource {
            start_frame: (start * self.sample_rate as f64).round() as u64,
            samples,
            pos: 0,
        });
        self.next_start = start + duration;
        debug!(start, duration, "fragment scheduled");
        start
    }

    /// Hard-cut: drop every scheduled source and reset the cursor to zero.
    ///
    /// Called on barge-in and on teardown. Calling with nothing scheduled is
    /// a no-op, not an error.
    pub fn interrupt(&mut self) {
        if !self.sources.is_empty() {
            debug!(flushed = self.sources.len(), "playback interrupted");
        }
        self.sources.clear();
        self.next_start = 0.0;
    }

    /// Fill an interleaved output buffer and advance the clock.
    ///
    /// Frames before a source's start render as silence; a source that plays
    /// to its end is removed (natural completion).
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }
        let frames = out.len() / channels;
        for frame in 0..frames {
            let global = self.clock_frames + frame as u64;
            let sample = loop {
                let Some(front) = self.sources.front_mut() else {
                    break 0.0;
                };
                if front.pos >= front.samples.len() {
                    self.sources.pop_front();
                    continue;
                }
                if front.start_frame > global {
                    break 0.0;
                }
                let value = front.samples[front.pos];
                front.pos += 1;
                if front.pos >= front.samples.len() {
                    self.sources.pop_front();
                }
                break value;
            };
            for ch in 0..channels {
                out[frame * channels + ch] = sample;
            }
        }
        self.clock_frames += frames as u64;
    }
}

/// Couples a [`Timeline`] to the output device and the downlink resampler.
///
/// `schedule` is called from the session driver with decoded 24 kHz mono
/// fragments; the cpal output callback renders the shared timeline.
pub struct PlaybackScheduler {
    timeline: Arc<Mutex<Timeline>>,
    converter: RateConverter,
    output: Option<AudioOutput>,
}

impl PlaybackScheduler {
    /// Open the default output device and an empty timeline.
    ///
    /// `source_rate` is the sample rate of the fragments that will be
    /// scheduled (the service's synthesized-audio rate).
    pub async fn open(source_rate: u32) -> Result<Self> {
        let output = AudioOutput::open().await?;
        let converter = RateConverter::new(source_rate, output.sample_rate(), DOWNLINK_BLOCK)?;
        Ok(Self {
            timeline: output.timeline(),
            converter,
            output: Some(output),
        })
    }

    /// Resample one decoded fragment to the device rate and schedule it.
    pub fn schedule(&mut self, samples: &[f32]) {
        let converted = self.converter.process(samples);
        if converted.is_empty() {
            // Fragment smaller than one resampler block — it is buffered and
            // will ride along with the next fragment.
            return;
        }
        self.timeline.lock().schedule(converted);
    }

    /// Stop everything scheduled and reset the cursor. Safe when idle.
    pub fn interrupt(&mut self) {
        self.converter.reset();
        self.timeline.lock().interrupt();
    }

    /// Interrupt plus release of the output device. Idempotent.
    pub fn shutdown(&mut self) {
        self.interrupt();
        if let Some(output) = self.output.take() {
            output.close();
        }
    }

    pub fn cursor_secs(&self) -> f64 {
        self.timeline.lock().cursor_secs()
    }

    pub fn active_sources(&self) -> usize {
        self.timeline.lock().active_count()
    }
}

#[cfg(test)]
impl PlaybackScheduler {
    /// Timeline-only scheduler for tests that must not touch audio devices.
    pub(crate) fn detached(source_rate: u32, device_rate: u32) -> Self {
        Self {
            timeline: Arc::new(Mutex::new(Timeline::new(device_rate))),
            converter: RateConverter::new(source_rate, device_rate, DOWNLINK_BLOCK)
                .expect("converter"),
            output: None,
        }
    }

    pub(crate) fn timeline_handle(&self) -> Arc<Mutex<Timeline>> {
        Arc::clone(&self.timeline)
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
