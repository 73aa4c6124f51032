//! Growable ring buffer for continuous streams
//!
//! Samples live interleaved in a `ringbuf::HeapRb<f32>` sized
//! `capacity * channels`. When a write would overflow, capacity doubles until
//! it holds at least the old capacity plus the whole write, and the unread
//! samples are moved into the new storage in order. Capacity never shrinks.

use super::{prepare_output, BufferKind, SampleBuffer, WriteReport};
use ringbuf::{traits::*, HeapRb};
use tracing::debug;

/// Growable circular frame storage
pub struct RingBuffer {
    storage: HeapRb<f32>,

    /// Capacity in frames
    capacity: usize,

    channels: usize,

    /// Interleaved staging area for reads, reused across pulls
    scratch: Vec<f32>,
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("channels", &self.channels)
            .field("readable", &self.readable_length())
            .finish()
    }
}

impl RingBuffer {
    /// Create an empty ring
    ///
    /// # Arguments
    /// * `capacity` - Initial capacity in frames (clamped to at least 1)
    /// * `channels` - Samples per frame (clamped to at least 1)
    ///
    /// # Returns
    /// A ring with `capacity * channels` samples of storage and nothing
    /// readable
    pub fn new(capacity: usize, channels: usize) -> Self {
        let capacity = capacity.max(1);
        let channels = channels.max(1);

        debug!(
            "Creating ring buffer: capacity={} frames, channels={}",
            capacity, channels
        );

        Self {
            storage: HeapRb::new(capacity * channels),
            capacity,
            channels,
            scratch: Vec::new(),
        }
    }

    /// Free space in frames
    pub fn vacant_length(&self) -> usize {
        self.storage.vacant_len() / self.channels
    }

    /// Reallocate to at least `required` frames, keeping unread samples in order
    ///
    /// Capacity doubles from its current value until it reaches `required`.
    /// The unread samples are popped out of the old storage and pushed into
    /// the new one, so the read position restarts at the beginning.
    fn grow(&mut self, required: usize) {
        let mut new_capacity = self.capacity;
        while new_capacity < required {
            new_capacity = new_capacity.saturating_mul(2);
        }

        let mut unread = vec![0.0f32; self.storage.occupied_len()];
        let moved = self.storage.pop_slice(&mut unread);

        let mut storage = HeapRb::new(new_capacity * self.channels);
        storage.push_slice(&unread[..moved]);

        debug!(
            "Ring buffer grew: {} -> {} frames ({} frames preserved)",
            self.capacity,
            new_capacity,
            moved / self.channels
        );

        self.storage = storage;
        self.capacity = new_capacity;
    }
}

impl SampleBuffer for RingBuffer {
    fn kind(&self) -> BufferKind {
        BufferKind::RingBuffer
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append whole frames, growing first if they do not fit
    ///
    /// # Arguments
    /// * `interleaved` - Samples in frame order; a trailing partial frame is
    ///   ignored
    ///
    /// # Returns
    /// `resized` is set at most once per call, with `new_length` holding at
    /// least the previous capacity plus the frames written
    fn write(&mut self, interleaved: &[f32]) -> WriteReport {
        let frames = interleaved.len() / self.channels;
        if frames == 0 {
            return WriteReport {
                frames_written: 0,
                resized: false,
                new_length: self.capacity,
            };
        }

        let resized = frames > self.vacant_length();
        if resized {
            // New length covers the old length plus the whole write
            self.grow(self.capacity + frames);
        }

        self.storage.push_slice(&interleaved[..frames * self.channels]);

        WriteReport {
            frames_written: frames,
            resized,
            new_length: self.capacity,
        }
    }

    /// De-interleave up to `n` frames into `out`, zero-filling the rest
    ///
    /// # Returns
    /// Number of real frames copied
    fn read_into(&mut self, n: usize, out: &mut [Vec<f32>]) -> usize {
        prepare_output(out, n);

        let available = n.min(self.readable_length());
        let samples = available * self.channels;
        if self.scratch.len() < samples {
            self.scratch.resize(samples, 0.0);
        }

        let popped = self.storage.pop_slice(&mut self.scratch[..samples]);
        debug_assert_eq!(popped, samples);

        for (frame, chunk) in self.scratch[..samples].chunks_exact(self.channels).enumerate() {
            for (channel, sample) in chunk.iter().enumerate() {
                if let Some(dest) = out.get_mut(channel) {
                    dest[frame] = *sample;
                }
            }
        }

        // Silence past the end of real data
        for channel in out.iter_mut() {
            channel[available..n].fill(0.0);
        }

        available
    }

    fn readable_length(&self) -> usize {
        self.storage.occupied_len() / self.channels
    }

    /// Drop unread frames; capacity is kept
    fn clear(&mut self) {
        Consumer::clear(&mut self.storage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo(frames: &[(f32, f32)]) -> Vec<f32> {
        frames.iter().flat_map(|&(l, r)| [l, r]).collect()
    }

    #[test]
    fn test_writes_read_back_in_order() {
        let mut ring = RingBuffer::new(8, 2);
        ring.write(&stereo(&[(0.1, -0.1), (0.2, -0.2)]));
        ring.write(&stereo(&[(0.3, -0.3)]));
        ring.write(&stereo(&[(0.4, -0.4), (0.5, -0.5)]));

        assert_eq!(ring.readable_length(), 5);

        let out = ring.read(5);
        assert_eq!(out[0], vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(out[1], vec![-0.1, -0.2, -0.3, -0.4, -0.5]);
        assert_eq!(ring.readable_length(), 0);
    }

    #[test]
    fn test_overflow_reports_single_resize_and_preserves_data() {
        let mut ring = RingBuffer::new(4, 1);

        let report = ring.write(&[1.0, 2.0, 3.0]);
        assert!(!report.resized);
        assert_eq!(report.new_length, 4);

        // Consume one so the unread data wraps around the storage
        assert_eq!(ring.read(1), vec![vec![1.0]]);

        let report = ring.write(&[4.0, 5.0, 6.0, 7.0, 8.0]);
        assert!(report.resized);
        assert!(report.new_length >= 4 + 5);
        assert_eq!(ring.capacity(), report.new_length);

        let out = ring.read(100);
        assert_eq!(out[0], vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_growth_covers_previous_length_plus_write() {
        let mut ring = RingBuffer::new(4, 2);
        ring.write(&[0.0; 6]);
        ring.read(2);

        // 1 frame unread, 3 vacant; a 4-frame write must reach 4 + 4
        let report = ring.write(&[1.0; 8]);
        assert!(report.resized);
        assert_eq!(report.new_length, 8);
        assert_eq!(ring.readable_length(), 5);

        let report = ring.write(&[2.0; 6]);
        assert!(!report.resized);
        assert_eq!(ring.vacant_length(), 0);

        // Full ring, 9-frame write: doubling from 8 stops at 32
        let report = ring.write(&[3.0; 18]);
        assert!(report.resized);
        assert_eq!(report.new_length, 32);
        assert_eq!(ring.readable_length(), 17);
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let mut ring = RingBuffer::new(2, 1);
        ring.write(&[0.0; 10]);
        let grown = ring.capacity();
        assert!(grown >= 10);

        ring.read(10);
        ring.clear();
        assert_eq!(ring.capacity(), grown);
    }

    #[test]
    fn test_read_into_zero_fills_past_available() {
        let mut ring = RingBuffer::new(16, 2);
        ring.write(&stereo(&[(0.5, 0.25)]));

        let mut out = vec![vec![9.0; 4], vec![9.0; 4]];
        let got = ring.read_into(4, &mut out);

        assert_eq!(got, 1);
        assert_eq!(out[0], vec![0.5, 0.0, 0.0, 0.0]);
        assert_eq!(out[1], vec![0.25, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_length_operations() {
        let mut ring = RingBuffer::new(16, 2);

        let report = ring.write(&[]);
        assert_eq!(report.frames_written, 0);
        assert!(!report.resized);
        assert_eq!(ring.readable_length(), 0);

        let out = ring.read(0);
        assert!(out.iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_partial_frame_is_ignored() {
        let mut ring = RingBuffer::new(16, 2);
        let report = ring.write(&[0.1, 0.2, 0.3]);

        assert_eq!(report.frames_written, 1);
        assert_eq!(ring.readable_length(), 1);
    }

    #[test]
    fn test_clear_discards_content() {
        let mut ring = RingBuffer::new(16, 1);
        ring.write(&[1.0, 2.0, 3.0]);
        ring.clear();

        assert_eq!(ring.readable_length(), 0);
        assert_eq!(ring.capacity(), 16);

        ring.write(&[4.0]);
        assert_eq!(ring.read(4), vec![vec![4.0]]);
    }
}
