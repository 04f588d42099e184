//! Byte ring buffer that only ever hands out contiguous runs.

use log::error;

use super::stats::BufferStats;

/// Ring buffer with a reserved margin in front of the data area.
///
/// Data lives in `[margin, size)`. When the run left at the end of the
/// buffer is shorter than `margin`, `get` copies it into the margin right
/// in front of the wrapped data, so every successful `get` returns at least
/// `margin` contiguous bytes. A consumer that needs whole TS packets sets
/// the margin to a multiple of 188.
pub struct RingBuffer {
    buffer: Box<[u8]>,
    margin: usize,
    /// Write position, always in `[margin, size)`.
    head: usize,
    /// Read position. Below `margin` only after a relocation.
    tail: usize,
    /// Length of the span returned by the last `get`.
    gotten: usize,
    stats: BufferStats,
}

impl RingBuffer {
    /// Allocate a buffer of `size` bytes.
    ///
    /// One byte of the data area is always kept free, so the size is raised
    /// to `2 * margin + 1` to let the data area hold a full margin.
    pub fn new(size: usize, margin: usize) -> Self {
        let size = size.max(margin * 2 + 1).max(2);
        Self {
            buffer: vec![0u8; size].into_boxed_slice(),
            margin,
            head: margin,
            tail: margin,
            gotten: 0,
            stats: BufferStats::new("RingBuffer", size - margin),
        }
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    /// Bytes stored and not yet deleted.
    pub fn available(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.size() - self.tail + self.head - self.margin
        }
    }

    /// Bytes the next `put` can store.
    pub fn free(&self) -> usize {
        let size = self.size();
        let space = if self.tail < self.margin {
            // Relocated data occupies [tail, head); no wrapping until it is consumed.
            size - self.head
        } else if self.tail > self.head {
            self.tail - self.head
        } else {
            size - self.head + self.tail - self.margin
        };
        space.saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Store as much of `data` as fits and return the number of bytes stored.
    ///
    /// A write reaching the end of the buffer continues at `margin`. Bytes
    /// that do not fit are counted as an overflow.
    pub fn put(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        let count = data.len().min(self.free());
        if count < data.len() {
            self.stats.report_overflow(data.len() - count);
        }
        if count == 0 {
            return 0;
        }

        let rest = self.size() - self.head;
        if count >= rest {
            let margin = self.margin;
            self.buffer[self.head..].copy_from_slice(&data[..rest]);
            self.buffer[margin..margin + count - rest].copy_from_slice(&data[rest..count]);
            self.head = margin + count - rest;
        } else {
            self.buffer[self.head..self.head + count].copy_from_slice(&data[..count]);
            self.head += count;
        }

        let fill = self.available();
        self.stats.update(fill);
        count
    }

    /// The next contiguous span of readable bytes, without consuming it.
    ///
    /// Returns `None` while fewer than `margin` contiguous bytes (or no bytes
    /// at all) are available. The span stays valid until `del`.
    pub fn get(&mut self) -> Option<&[u8]> {
        let size = self.size();
        let head = self.head;
        let mut rest = size - self.tail;

        if rest < self.margin && head < self.tail {
            let t = self.margin - rest;
            self.buffer.copy_within(self.tail..size, t);
            self.tail = t;
            rest = head - t;
        }

        let cont = if head >= self.tail {
            head - self.tail
        } else {
            size - self.tail
        }
        .min(rest);

        if cont == 0 || cont < self.margin {
            self.gotten = 0;
            return None;
        }
        self.gotten = cont;
        Some(&self.buffer[self.tail..self.tail + cont])
    }

    /// Consume `count` bytes of the span returned by the last `get`.
    ///
    /// Deleting more than was handed out is an error and is clamped.
    pub fn del(&mut self, count: usize) {
        let count = if count > self.gotten {
            error!(
                "[RingBuffer] Invalid del count {} (limited to {})",
                count, self.gotten
            );
            self.gotten
        } else {
            count
        };
        if count == 0 {
            return;
        }
        self.gotten -= count;
        self.tail += count;
        if self.tail >= self.size() {
            self.tail = self.margin;
        }
    }

    /// Drop all stored data.
    pub fn clear(&mut self) {
        self.head = self.margin;
        self.tail = self.margin;
        self.gotten = 0;
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rb: &mut RingBuffer) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = rb.get() {
            let n = chunk.len();
            out.extend_from_slice(chunk);
            rb.del(n);
        }
        out
    }

    #[test]
    fn test_put_get_del() {
        let mut rb = RingBuffer::new(1000, 100);
        let data: Vec<u8> = (0..=255).collect();

        assert_eq!(rb.put(&data), 256);
        assert_eq!(rb.available(), 256);

        let chunk = rb.get().expect("enough data");
        assert_eq!(chunk, &data[..]);
        rb.del(56);
        assert_eq!(rb.available(), 200);

        let chunk = rb.get().expect("enough data");
        assert_eq!(chunk, &data[56..]);
    }

    #[test]
    fn test_get_below_margin_returns_none() {
        let mut rb = RingBuffer::new(1000, 100);
        rb.put(&[1u8; 99]);
        assert!(rb.get().is_none());
        rb.put(&[1u8; 1]);
        assert_eq!(rb.get().map(|c| c.len()), Some(100));
    }

    #[test]
    fn test_empty_buffer_without_margin() {
        let mut rb = RingBuffer::new(64, 0);
        assert!(rb.get().is_none());
        rb.put(&[7u8; 3]);
        assert_eq!(rb.get(), Some(&[7u8, 7, 7][..]));
    }

    #[test]
    fn test_full_buffer_stores_nothing() {
        let mut rb = RingBuffer::new(200, 50);
        let free = rb.free();
        assert_eq!(free, 149);
        assert_eq!(rb.put(&vec![0u8; 500]), free);
        assert_eq!(rb.free(), 0);
        assert_eq!(rb.put(&[1, 2, 3]), 0);
        assert_eq!(rb.stats().pending_overflows().1, 3);
    }

    #[test]
    fn test_partial_put() {
        let mut rb = RingBuffer::new(200, 50);
        rb.put(&vec![0u8; 140]);
        assert_eq!(rb.put(&[9u8; 20]), 9);
        assert_eq!(rb.available(), 149);
    }

    #[test]
    fn test_wrap_relocates_short_tail() {
        let mut rb = RingBuffer::new(300, 50);
        // head reaches 290
        rb.put(&[0u8; 240]);
        let n = rb.get().map(|c| c.len()).unwrap_or(0);
        assert_eq!(n, 240);
        rb.del(220); // tail at 270, 20 bytes left before the end

        let wrapped: Vec<u8> = (1..=100).collect();
        assert_eq!(rb.put(&wrapped), 100); // 10 at the end, 90 from margin
        assert_eq!(rb.available(), 120);

        let chunk = rb.get().expect("relocated run").to_vec();
        assert_eq!(chunk.len(), 120);
        assert_eq!(&chunk[..20], &[0u8; 20]);
        assert_eq!(&chunk[20..], &wrapped[..]);
        rb.del(120);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_del_clamped_to_last_get() {
        let mut rb = RingBuffer::new(500, 10);
        rb.put(&[5u8; 100]);
        assert_eq!(rb.get().map(|c| c.len()), Some(100));
        rb.del(1000);
        assert!(rb.is_empty());
        // Nothing was handed out, so nothing can be deleted.
        rb.put(&[5u8; 100]);
        rb.del(50);
        assert_eq!(rb.available(), 100);
    }

    #[test]
    fn test_clear() {
        let mut rb = RingBuffer::new(500, 10);
        rb.put(&[5u8; 100]);
        rb.clear();
        assert!(rb.is_empty());
        assert!(rb.get().is_none());
    }

    #[test]
    fn test_size_raised_to_hold_a_margin() {
        let rb = RingBuffer::new(100, 188);
        assert_eq!(rb.size(), 377);
        assert_eq!(rb.free(), 188);
    }

    #[test]
    fn test_smallest_buffer_keeps_draining() {
        let mut rb = RingBuffer::new(376, 188);
        let packet = [0x47u8; 188];
        for round in 0..5 {
            assert_eq!(rb.put(&packet), 188, "round {}", round);
            assert_eq!(rb.get().map(|c| c.len()), Some(188), "round {}", round);
            rb.del(188);
            assert!(rb.is_empty());
        }
    }

    /// Interleave puts and gets of varying sizes and check that data comes out
    /// in order and every get honours the margin.
    #[test]
    fn test_margin_holds_for_interleavings() {
        for &(size, margin) in &[(100usize, 10usize), (997, 188), (2000, 1000), (64, 0)] {
            let mut rb = RingBuffer::new(size, margin);
            let mut written = Vec::new();
            let mut read = Vec::new();
            let mut gets = 0;
            let mut seed = 0x2545_f491u32;
            let mut next = move || {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                seed
            };

            for _ in 0..2000 {
                let len = (next() as usize) % (size / 2 + 1);
                let data: Vec<u8> = (0..len).map(|_| next() as u8).collect();
                let stored = rb.put(&data);
                written.extend_from_slice(&data[..stored]);

                if next() % 3 != 0 {
                    if let Some(chunk) = rb.get() {
                        gets += 1;
                        assert!(chunk.len() >= margin.max(1), "size={size} margin={margin}");
                        let take = if next() % 2 == 0 {
                            chunk.len()
                        } else {
                            (next() as usize % chunk.len()) + 1
                        };
                        read.extend_from_slice(&chunk[..take]);
                        rb.del(take);
                    }
                }
                assert_eq!(read.len() + rb.available(), written.len());
            }
            read.extend(drain(&mut rb));
            assert!(gets > 0, "size={size} margin={margin}: nothing handed out");
            assert_eq!(&read[..], &written[..read.len()]);
            assert!(rb.available() < margin.max(1));
        }
    }
}
