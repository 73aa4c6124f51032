//! Sinks that pull rendered audio
//!
//! A sink owns the consumer context. It holds at most one [`RenderSource`]
//! and asks it for interleaved frames whenever output is needed.

use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Produces interleaved `f32` frames on demand
pub trait RenderSource: Send {
    fn channel_count(&self) -> usize;

    /// Fill `output` completely; never blocks
    fn render(&mut self, output: &mut [f32]);
}

/// Slot through which a sink reaches its source
pub type SourceSlot = Arc<Mutex<Option<Box<dyn RenderSource>>>>;

/// Consumer-side audio destination
pub trait AudioSink {
    /// Check that a source with `channels` channels can be attached now
    fn check_source(&self, channels: usize) -> Result<()>;

    /// Start pulling from `source`
    fn attach(&mut self, source: Box<dyn RenderSource>);

    /// Stop pulling and hand back the source
    fn detach(&mut self) -> Option<Box<dyn RenderSource>>;

    /// Channels produced by the sink
    fn channel_count(&self) -> usize;

    /// Output sample rate (Hz)
    fn sample_rate(&self) -> u32;
}

/// Sink driven by explicit `pull` calls
///
/// Clones share the same source slot, so a test can keep a handle after the
/// sink itself has been handed to a node.
#[derive(Clone)]
pub struct OfflineSink {
    slot: SourceSlot,
    channels: usize,
    sample_rate: u32,
}

impl std::fmt::Debug for OfflineSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineSink")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl OfflineSink {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Render `frames` frames; silence when nothing is attached
    ///
    /// `pull(0)` still lets the source process its pending messages.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * self.channels];
        self.render_into(&mut output);
        output
    }

    pub fn render_into(&self, output: &mut [f32]) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(source) => source.render(output),
            None => output.fill(0.0),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl AudioSink for OfflineSink {
    fn check_source(&self, channels: usize) -> Result<()> {
        if self.is_attached() {
            return Err(Error::AlreadyConnected);
        }
        if channels != self.channels {
            return Err(Error::InvalidConfig(format!(
                "offline sink renders {} channels, source has {}",
                self.channels, channels
            )));
        }
        Ok(())
    }

    fn attach(&mut self, source: Box<dyn RenderSource>) {
        debug!("Offline sink attached ({} channels)", source.channel_count());
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(source);
    }

    fn detach(&mut self) -> Option<Box<dyn RenderSource>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
