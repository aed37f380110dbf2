//! # confab-core
//!
//! Real-time, full-duplex voice conversation engine.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC ring → capture tick thread
//!                                     (resample, meter, mute-gate, encode)
//!                                              │ mpsc (ordered frames)
//!                                              ▼
//!                                        session driver ──► transport writer ─► service
//!                                              ▲
//!                                              │ mpsc (ordered events)
//!        service ─► transport reader ──────────┘
//!                                              │
//!                          decode → playback Timeline → output callback → speaker
//! ```
//!
//! One driver task per session owns the capture pipeline, the playback
//! scheduler, and the transport handle, and tears all three down together.
//! The device callbacks are allocation-free; heap work happens on the
//! capture tick thread and the driver task.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod codec;
pub mod error;
pub mod ipc;
pub mod playback;
pub mod session;
pub mod transport;

/// Wire rate for outbound microphone audio (Hz).
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Rate of synthesized audio fragments from the service (Hz).
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

// Convenience re-exports for downstream crates
pub use error::ConfabError;
pub use ipc::events::{
    AudioLevelEvent, ConnectionStatus, SessionSnapshot, SessionStatusEvent, TranscriptEvent,
};
pub use session::{SessionConfig, SessionController};
