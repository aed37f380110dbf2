//! Lock-free SPSC ring buffer between the real-time input callback and the
//! capture tick thread.
//!
//! `ringbuf::HeapRb<f32>` provides a wait-free `push_slice` that is safe to
//! call from the OS audio thread (no allocation, no locking).

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half — held by the input stream callback.
pub type CaptureProducer = ringbuf::HeapProd<f32>;

/// Consumer half — held by the capture tick thread.
pub type CaptureConsumer = ringbuf::HeapCons<f32>;

/// Capacity: 2^18 = 262 144 f32 samples ≈ 5.5 s at 48 kHz.
/// The tick thread drains continuously; this only has to absorb short stalls
/// while a frame is being encoded and handed to the transport.
pub const RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair for one capture session.
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
