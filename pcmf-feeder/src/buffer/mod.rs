//! Sample buffers between the producer and the render pull
//!
//! Two interchangeable strategies store interleaved `f32` frames:
//! - [`RingBuffer`]: circular storage that grows (never shrinks) on overflow,
//!   suited to continuous/live streams
//! - [`FifoQueue`]: consume-once chunk queue, suited to finite clips
//!
//! Lengths and capacities are always counted in frames (samples per channel).

pub mod fifo;
pub mod ring;

pub use fifo::FifoQueue;
pub use ring::RingBuffer;

use serde::{Deserialize, Serialize};

/// Buffer strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    RingBuffer,
    FifoQueue,
}

impl std::fmt::Display for BufferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferKind::RingBuffer => write!(f, "ring_buffer"),
            BufferKind::FifoQueue => write!(f, "fifo_queue"),
        }
    }
}

/// Outcome of a buffer write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Whole frames appended
    pub frames_written: usize,

    /// True if storage was reallocated to fit the write
    pub resized: bool,

    /// Capacity in frames after the write
    pub new_length: usize,
}

/// Storage over interleaved multi-channel `f32` frames
///
/// Implementations never block and never return more frames than were
/// written. `channel_count` is fixed at construction.
pub trait SampleBuffer: Send {
    /// Strategy of this buffer
    fn kind(&self) -> BufferKind;

    /// Channels per frame
    fn channel_count(&self) -> usize;

    /// Addressable length in frames
    fn capacity(&self) -> usize;

    /// Append interleaved samples
    ///
    /// Trailing samples that do not complete a frame are ignored. The input is
    /// copied.
    fn write(&mut self, interleaved: &[f32]) -> WriteReport;

    /// Read up to `n` frames de-interleaved into `out` (one slice per channel)
    ///
    /// Positions past the available data are zero-filled, so `out` always
    /// carries `n` frames. Returns the number of real frames read.
    fn read_into(&mut self, n: usize, out: &mut [Vec<f32>]) -> usize;

    /// Frames currently readable
    fn readable_length(&self) -> usize;

    /// Discard all buffered frames (capacity unchanged)
    fn clear(&mut self);

    /// Read up to `n` frames into freshly allocated channels
    ///
    /// Unlike [`SampleBuffer::read_into`], only the frames actually available
    /// are returned.
    fn read(&mut self, n: usize) -> Vec<Vec<f32>> {
        let available = n.min(self.readable_length());
        let mut out = vec![vec![0.0; available]; self.channel_count()];
        self.read_into(available, &mut out);
        out
    }
}

/// Create a buffer of the requested kind
pub fn create_buffer(kind: BufferKind, length: usize, channels: usize) -> Box<dyn SampleBuffer> {
    match kind {
        BufferKind::RingBuffer => Box::new(RingBuffer::new(length, channels)),
        BufferKind::FifoQueue => Box::new(FifoQueue::new(length, channels)),
    }
}

/// Make sure every output channel can hold `n` frames
pub(crate) fn prepare_output(out: &mut [Vec<f32>], n: usize) {
    for channel in out.iter_mut() {
        if channel.len() < n {
            channel.resize(n, 0.0);
        }
    }
}
