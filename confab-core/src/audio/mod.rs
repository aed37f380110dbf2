//! Device-facing audio plumbing: cpal capture and playback streams.
//!
//! # Real-time constraints
//!
//! cpal callbacks run on OS audio threads at elevated priority. The input
//! callback only pushes into a lock-free SPSC ring (allocation-free); the
//! output callback renders from the playback timeline under a short
//! `parking_lot` critical section and never allocates.
//!
//! # Thread affinity
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio). Both stream
//! kinds are therefore created *and dropped* on a dedicated thread: the
//! capture tick thread owns the input stream, [`output::AudioOutput`] runs a
//! small keeper thread for the output stream. Open success/failure is
//! reported back to the async caller over a one-shot channel.

pub mod capture;
pub mod output;
pub mod resample;
