//! Bounded circular audio buffer with newest-wins eviction.

/// Holds the most recent `capacity` samples. Appending past capacity
/// overwrites the oldest sample; the buffer is reset between utterances
/// without reallocating.
pub struct RingBuffer {
    buf: Vec<f32>,
    capacity: usize,
    /// Index of the oldest sample once the buffer has wrapped.
    head: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append one sample, evicting the oldest when full. O(1) amortized.
    pub fn append(&mut self, sample: f32) {
        if self.buf.len() < self.capacity {
            self.buf.push(sample);
        } else {
            self.buf[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn append_all(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.append(sample);
        }
    }

    /// Fresh oldest-to-newest copy. The returned vector does not alias the
    /// buffer's storage.
    pub fn to_vec(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.buf.len());
        out.extend_from_slice(&self.buf[self.head..]);
        out.extend_from_slice(&self.buf[..self.head]);
        out
    }

    /// Clear without releasing the allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_up_to_capacity() {
        let mut buffer = RingBuffer::new(4);
        buffer.append_all(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buffer = RingBuffer::new(3);
        buffer.append_all(&[1.0, 2.0, 3.0]);
        buffer.append(4.0);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.to_vec(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_keeps_last_capacity_samples_in_order() {
        let mut buffer = RingBuffer::new(5);
        let samples: Vec<f32> = (0..23).map(|i| i as f32).collect();
        buffer.append_all(&samples);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.to_vec(), vec![18.0, 19.0, 20.0, 21.0, 22.0]);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut buffer = RingBuffer::new(3);
        buffer.append_all(&[1.0, 2.0, 3.0, 4.0]);
        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 3);
        buffer.append_all(&[5.0, 6.0]);
        assert_eq!(buffer.to_vec(), vec![5.0, 6.0]);
    }

    #[test]
    fn test_degenerate_capacity_clamps_to_one() {
        let mut buffer = RingBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.append(1.0);
        buffer.append(2.0);
        assert_eq!(buffer.to_vec(), vec![2.0]);
    }
}
