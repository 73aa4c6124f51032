//! Render core shared by both adapter flavors
//!
//! Owns the sample buffer and the state machine. Each pull evaluates the state
//! machine once, then reads real frames (`Playing`) or writes silence (every
//! other state). A pull never waits for data.

use super::state::{PlaybackState, StateMachine};
use crate::buffer::{create_buffer, BufferKind, SampleBuffer, WriteReport};
use crate::error::{Error, Result};
use tracing::{debug, trace};

/// Called on every state transition
pub type StateListener = Box<dyn FnMut(PlaybackState) + Send>;

/// Called with the new capacity when the buffer grows
pub type ResizeListener = Box<dyn FnMut(usize) + Send>;

/// Pull counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Pulls that evaluated the state machine
    pub pulls: u64,

    /// Pulls answered entirely with silence because the state was not `Playing`
    pub silent_pulls: u64,

    /// Pulls in `Playing` that ran out of data part way
    pub short_reads: u64,
}

/// Buffer + state machine + notification
pub struct RenderCore {
    buffer: Box<dyn SampleBuffer>,
    machine: StateMachine,
    on_state: Option<StateListener>,
    on_resize: Option<ResizeListener>,

    /// Per-channel staging for de-interleaved reads
    scratch: Vec<Vec<f32>>,

    stats: RenderStats,
}

impl std::fmt::Debug for RenderCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCore")
            .field("kind", &self.buffer.kind())
            .field("capacity", &self.buffer.capacity())
            .field("readable", &self.buffer.readable_length())
            .field("state", &self.machine.state())
            .field("threshold", &self.machine.threshold())
            .finish()
    }
}

impl RenderCore {
    /// Create an uninitialized core
    ///
    /// The threshold is not validated here; callers validate configuration
    /// before building a core.
    ///
    /// # Arguments
    /// * `kind` - Buffer strategy
    /// * `buffer_length` - Initial buffer length in frames
    /// * `channels` - Samples per frame
    /// * `threshold` - Frames needed before playback starts or resumes
    ///
    /// # Returns
    /// A core in `Uninitialized` with no listeners attached
    pub fn new(kind: BufferKind, buffer_length: usize, channels: usize, threshold: usize) -> Self {
        let buffer = create_buffer(kind, buffer_length, channels);
        let scratch = vec![Vec::new(); buffer.channel_count()];

        Self {
            buffer,
            machine: StateMachine::new(threshold),
            on_state: None,
            on_resize: None,
            scratch,
            stats: RenderStats::default(),
        }
    }

    /// Attach the callback run on every state transition
    pub fn with_state_listener(mut self, listener: StateListener) -> Self {
        self.on_state = Some(listener);
        self
    }

    pub fn with_resize_listener(mut self, listener: ResizeListener) -> Self {
        self.on_resize = Some(listener);
        self
    }

    /// Move to `Ready` (notifies once)
    pub fn initialize(&mut self) {
        if let Some(state) = self.machine.initialize() {
            debug!(
                "Render core initialized: kind={}, capacity={}, channels={}, threshold={}",
                self.buffer.kind(),
                self.buffer.capacity(),
                self.buffer.channel_count(),
                self.machine.threshold()
            );
            self.notify(state);
        }
    }

    /// Append interleaved samples
    ///
    /// Runs the resize listener if the buffer grew. The state machine is not
    /// evaluated here; only pulls move it.
    pub fn feed(&mut self, data: &[f32]) -> WriteReport {
        let report = self.buffer.write(data);
        if report.resized {
            debug!("Sample buffer resized to {} frames", report.new_length);
            if let Some(listener) = self.on_resize.as_mut() {
                listener(report.new_length);
            }
        }
        report
    }

    /// Fill `output` (interleaved) with the next batch
    ///
    /// A zero-length output is not a pull: the state machine is not evaluated.
    pub fn pull(&mut self, output: &mut [f32]) {
        let channels = self.buffer.channel_count();
        let frames = output.len() / channels;
        if frames == 0 {
            return;
        }

        self.stats.pulls += 1;
        if let Some(state) = self.machine.evaluate(self.buffer.readable_length()) {
            self.notify(state);
        }

        if self.machine.state() != PlaybackState::Playing {
            output.fill(0.0);
            self.stats.silent_pulls += 1;
            if self.stats.silent_pulls % 1000 == 0 {
                trace!(
                    "Render core silent (state={}, total silent pulls: {})",
                    self.machine.state(),
                    self.stats.silent_pulls
                );
            }
            return;
        }

        let got = self.buffer.read_into(frames, &mut self.scratch);
        if got < frames {
            self.stats.short_reads += 1;
        }

        for (frame, chunk) in output.chunks_exact_mut(channels).enumerate() {
            for (channel, sample) in chunk.iter_mut().enumerate() {
                *sample = self.scratch[channel][frame];
            }
        }
        // Samples after the last whole frame
        let tail = frames * channels;
        output[tail..].fill(0.0);
    }

    /// Change the threshold; rejects values outside `[0, capacity]`
    ///
    /// # Arguments
    /// * `value` - New threshold in frames, checked against the current
    ///   capacity
    ///
    /// # Returns
    /// `InvalidThreshold` with the threshold and state unchanged, or `Ok`
    /// with the new value applied from the next pull
    pub fn set_threshold(&mut self, value: i64) -> Result<()> {
        let capacity = self.buffer.capacity();
        let threshold = validate_threshold(value, capacity)?;
        self.machine.set_threshold(threshold);
        debug!("Threshold set to {} frames", threshold);
        Ok(())
    }

    /// Discard buffered frames
    ///
    /// The state is not touched here. A core that was `Playing` starves on
    /// its next pull.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Readable frames
    pub fn current_fill(&self) -> usize {
        self.buffer.readable_length()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn buffer_kind(&self) -> BufferKind {
        self.buffer.kind()
    }

    pub fn channel_count(&self) -> usize {
        self.buffer.channel_count()
    }

    pub fn state(&self) -> PlaybackState {
        self.machine.state()
    }

    pub fn threshold(&self) -> usize {
        self.machine.threshold()
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    fn notify(&mut self, state: PlaybackState) {
        trace!("Playback state -> {}", state);
        if let Some(listener) = self.on_state.as_mut() {
            listener(state);
        }
    }
}

/// Check a threshold against a capacity
pub fn validate_threshold(value: i64, capacity: usize) -> Result<usize> {
    if value < 0 || value as u64 > capacity as u64 {
        return Err(Error::InvalidThreshold { value, capacity });
    }
    Ok(value as usize)
}
