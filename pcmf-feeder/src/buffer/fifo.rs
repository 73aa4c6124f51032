//! Consume-once chunk queue
//!
//! Every write is stored as its own chunk. Reads walk chunks in arrival order;
//! a partially consumed front chunk keeps its remainder behind an offset until
//! the next read finishes it.

use super::{prepare_output, BufferKind, SampleBuffer, WriteReport};
use std::collections::VecDeque;

/// Unbounded FIFO of interleaved chunks
#[derive(Debug)]
pub struct FifoQueue {
    chunks: VecDeque<Vec<f32>>,

    /// Samples already consumed from the front chunk
    front_offset: usize,

    /// Unread frames across all chunks
    readable: usize,

    /// Configured length, reported as capacity while the queue is smaller
    nominal_length: usize,

    channels: usize,
}

impl FifoQueue {
    /// Create an empty queue
    ///
    /// # Arguments
    /// * `nominal_length` - Configured buffer length in frames. The queue
    ///   itself is unbounded; this is what `capacity()` reports until the
    ///   backlog exceeds it.
    /// * `channels` - Samples per frame (clamped to at least 1)
    pub fn new(nominal_length: usize, channels: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            front_offset: 0,
            readable: 0,
            nominal_length,
            channels: channels.max(1),
        }
    }

    /// Chunks still holding unread data
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl SampleBuffer for FifoQueue {
    fn kind(&self) -> BufferKind {
        BufferKind::FifoQueue
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn capacity(&self) -> usize {
        self.nominal_length.max(self.readable)
    }

    fn write(&mut self, interleaved: &[f32]) -> WriteReport {
        let frames = interleaved.len() / self.channels;
        if frames > 0 {
            self.chunks
                .push_back(interleaved[..frames * self.channels].to_vec());
            self.readable += frames;
        }

        WriteReport {
            frames_written: frames,
            resized: false,
            new_length: self.capacity(),
        }
    }

    fn read_into(&mut self, n: usize, out: &mut [Vec<f32>]) -> usize {
        prepare_output(out, n);

        let available = n.min(self.readable);
        let mut written = 0;

        while written < available {
            let Some(front) = self.chunks.front() else {
                break;
            };

            let remaining = (front.len() - self.front_offset) / self.channels;
            let take = remaining.min(available - written);
            let end = self.front_offset + take * self.channels;

            for (i, chunk) in front[self.front_offset..end]
                .chunks_exact(self.channels)
                .enumerate()
            {
                for (channel, sample) in chunk.iter().enumerate() {
                    if let Some(dest) = out.get_mut(channel) {
                        dest[written + i] = *sample;
                    }
                }
            }

            written += take;
            if end >= front.len() {
                self.chunks.pop_front();
                self.front_offset = 0;
            } else {
                self.front_offset = end;
            }
        }

        for channel in out.iter_mut() {
            channel[written..n].fill(0.0);
        }

        self.readable -= written;
        written
    }

    fn readable_length(&self) -> usize {
        self.readable
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.front_offset = 0;
        self.readable = 0;
    }
}
