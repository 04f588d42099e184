//! Buffers between the DVR device and the consumers of its data.
//!
//! [`RingBuffer`] decouples device reads from the demux pass and always hands
//! out contiguous runs; [`FrameRingBuffer`] queues whole frames (PES packets)
//! for the remuxer.

mod frame;
mod linear;
mod stats;

pub use frame::{Frame, FrameKind, FrameRingBuffer};
pub use linear::RingBuffer;
pub use stats::{BufferStats, OVERFLOW_REPORT_INTERVAL, USAGE_THRESHOLD};
