//! FIFO byte queue used to accumulate socket reads.

use bytes::{Buf, BytesMut};

/// An unbounded FIFO queue of bytes.
///
/// Socket reads are appended at the tail and logical frames are taken from
/// the head, so one oversized read can be apportioned across several frames.
///
/// # Invariants
///
/// - Bytes are consumed left to right and never reordered
/// - The queue grows only through [`enqueue`](Self::enqueue)
/// - It shrinks only through [`dequeue`](Self::dequeue),
///   [`pop_front`](Self::pop_front), [`drain`](Self::drain) or
///   [`clear`](Self::clear)
#[derive(Debug, Default)]
pub struct ByteQueue {
    elements: BytesMut,
}

impl ByteQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Appends `items` to the tail of the queue.
    pub fn enqueue(&mut self, items: &[u8]) {
        self.elements.extend_from_slice(items);
    }

    /// Removes and returns exactly the first `num` bytes.
    ///
    /// Returns `None` and leaves the queue untouched if fewer than `num`
    /// bytes are buffered.
    pub fn dequeue(&mut self, num: usize) -> Option<Vec<u8>> {
        if num > self.elements.len() {
            return None;
        }
        Some(self.elements.split_to(num).to_vec())
    }

    /// Removes and returns the first byte, if any.
    pub fn pop_front(&mut self) -> Option<u8> {
        if self.elements.is_empty() {
            return None;
        }
        Some(self.elements.get_u8())
    }

    /// Removes and returns everything currently buffered.
    pub fn drain(&mut self) -> Vec<u8> {
        self.elements.split().to_vec()
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        self.elements.clear();
    }
}
