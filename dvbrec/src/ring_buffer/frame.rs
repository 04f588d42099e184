//! Queue of whole frames bounded by their total size.

use std::collections::VecDeque;

use super::stats::BufferStats;

/// What a queued frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Video,
    Audio,
    Ancillary,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number assigned by the producer.
    pub index: u64,
    pub kind: FrameKind,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(index: u64, kind: FrameKind, data: Vec<u8>) -> Self {
        Self { index, kind, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// FIFO of frames whose combined payload never exceeds `capacity` bytes.
pub struct FrameRingBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
    used: usize,
    stats: BufferStats,
}

impl FrameRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity,
            used: 0,
            stats: BufferStats::new("FrameRingBuffer", capacity),
        }
    }

    /// Queue `frame`, or hand it back when it does not fit in the remaining space.
    pub fn put(&mut self, frame: Frame) -> Result<(), Frame> {
        if frame.len() > self.free() {
            self.stats.report_overflow(frame.len());
            return Err(frame);
        }
        self.used += frame.len();
        self.frames.push_back(frame);
        self.stats.update(self.used);
        Ok(())
    }

    /// The oldest frame, left in the queue.
    pub fn get(&self) -> Option<&Frame> {
        self.frames.front()
    }

    /// Remove and return the oldest frame.
    pub fn drop_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop_front()?;
        self.used -= frame.len();
        Some(frame)
    }

    /// Bytes held by queued frames.
    pub fn available(&self) -> usize {
        self.used
    }

    pub fn free(&self) -> usize {
        self.capacity - self.used
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.used = 0;
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }
}
