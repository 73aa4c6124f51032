//! Rendering adapter capability interface
//!
//! An adapter owns the render side of the pipeline: it parks its render
//! source until a sink is connected, forwards producer batches into the
//! render core, and reports playback state changes back to the node.

use super::callback::CallbackAdapter;
use super::realtime::RealtimeAdapter;
use super::state::PlaybackState;
use crate::audio::AudioSink;
use crate::buffer::BufferKind;
use crate::channel::{FillCallback, ProcessorPort};
use crate::config::{FeederConfig, RenderBackend};
use crate::error::Result;
use crate::resample::BatchHandler;

/// Notification drained by [`RenderingAdapter::poll_events`]
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// Playback state transition in the render core
    State(PlaybackState),

    /// A render channel was closed after a protocol violation
    ProtocolError(String),
}

/// Render-side half of a feeder node
pub trait RenderingAdapter {
    /// Forward a converted interleaved batch to the render core
    fn feed(&mut self, data: Vec<f32>) -> Result<()>;

    /// Thread-safe handle that forwards batches like [`RenderingAdapter::feed`]
    fn feed_handle(&self) -> BatchHandler;

    /// Hand the render source to `sink`
    fn connect(&mut self, sink: &mut dyn AudioSink) -> Result<()>;

    /// Take the render source back from `sink`
    fn disconnect(&mut self, sink: &mut dyn AudioSink) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Readable frames, as last known to this context
    fn current_fill(&self) -> usize;

    /// Buffer length in frames, as last known to this context
    fn capacity(&self) -> usize;

    /// Change the start threshold; `[0, capacity]`
    fn set_threshold(&mut self, value: i64) -> Result<()>;

    fn clear(&mut self) -> Result<()>;

    fn buffer_kind(&self) -> BufferKind;

    /// Ask for the current fill
    ///
    /// With a callback, returns the request id when the answer arrives
    /// asynchronously, `None` when the callback already ran.
    fn request_fill(&mut self, callback: Option<FillCallback>) -> Result<Option<u64>>;

    /// Apply pending render-side responses and return the notifications
    fn poll_events(&mut self) -> Vec<AdapterEvent>;

    /// True if the render core lives in another context reachable by a port
    fn supports_direct_channel(&self) -> bool;

    /// Accept batches straight from a producer through `port`
    fn attach_direct_port(&mut self, port: ProcessorPort) -> Result<()>;
}

/// Build the adapter for the configured backend
pub fn create_adapter(config: &FeederConfig) -> Result<Box<dyn RenderingAdapter>> {
    Ok(match config.backend() {
        RenderBackend::RealtimeThread => Box::new(RealtimeAdapter::new(config)?),
        RenderBackend::Callback => Box::new(CallbackAdapter::new(config)),
    })
}
