//! Feeder node
//!
//! Binds one resampler stage to one rendering adapter and exposes the control
//! surface used by producers: feed samples, connect a sink, query and tune
//! the buffer, and observe playback through [`FeederHooks`].
//!
//! Hooks run on the caller's context from [`FeederNode::process_events`],
//! never on the render thread.

use crate::audio::{AudioSink, SampleData};
use crate::buffer::BufferKind;
use crate::channel::{port_pair, ControllerPort, FillCallback, ProcessorPort, WireCommand};
use crate::config::{FeederConfig, FeederSettings};
use crate::error::{Error, Result};
use crate::playback::{create_adapter, AdapterEvent, PlaybackState, RenderingAdapter};
use crate::resample::{create_resampler, ResamplerStage};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Playback notifications; every method defaults to doing nothing
pub trait FeederHooks {
    /// Render core initialized
    fn on_ready(&mut self) {}

    /// Buffer reached the threshold and real frames are being rendered
    fn on_playing(&mut self) {}

    /// Buffer ran dry while playing
    fn on_starved(&mut self) {}
}

/// Hooks that ignore every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl FeederHooks for NoHooks {}

/// Lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Constructing,
    Bound,
    Playing,
    Starved,
}

/// Point-in-time summary of a node
#[derive(Debug, Clone, Serialize)]
pub struct FeederStatus {
    pub id: Uuid,
    pub node_state: NodeState,
    pub playback_state: PlaybackState,
    pub buffer_kind: BufferKind,
    pub fill: usize,
    pub capacity: usize,
    pub health: f32,
    pub connected: bool,
    pub direct_channel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_error: Option<String>,
}

/// Resampler + rendering adapter + sink
pub struct FeederNode {
    id: Uuid,
    config: FeederConfig,
    resampler: Box<dyn ResamplerStage>,
    adapter: Box<dyn RenderingAdapter>,
    sink: Option<Box<dyn AudioSink>>,
    hooks: Box<dyn FeederHooks>,
    state: NodeState,
    playback_state: PlaybackState,
    direct_channel: bool,
    protocol_error: Option<String>,
}

impl FeederNode {
    /// Build a node without lifecycle hooks
    pub fn new(config: FeederConfig) -> Result<Self> {
        Self::with_hooks(config, Box::new(NoHooks))
    }

    /// Validate raw settings, then build
    pub fn from_settings(settings: &FeederSettings, hooks: Box<dyn FeederHooks>) -> Result<Self> {
        Self::with_hooks(settings.validate()?, hooks)
    }

    /// Build a node from validated configuration
    ///
    /// # Arguments
    /// * `config` - Validated configuration; selects backend, buffer kind and
    ///   resampler placement
    /// * `hooks` - Receives `on_ready`, `on_playing` and `on_starved` from
    ///   `process_events`
    ///
    /// # Returns
    /// A `Bound` node with no sink connected, or the first adapter or
    /// resampler setup error
    pub fn with_hooks(config: FeederConfig, hooks: Box<dyn FeederHooks>) -> Result<Self> {
        // Adapter exists before the resampler is set up
        let adapter = create_adapter(&config)?;
        let resampler = create_resampler(&config);
        Self::from_parts(config, adapter, resampler, hooks)
    }

    /// Assemble a node from explicit collaborators
    ///
    /// Runs resampler setup, then wires resampler output to the adapter:
    /// over a direct producer channel when both sides support one, through
    /// the adapter's feed handle otherwise.
    pub fn from_parts(
        config: FeederConfig,
        mut adapter: Box<dyn RenderingAdapter>,
        mut resampler: Box<dyn ResamplerStage>,
        hooks: Box<dyn FeederHooks>,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let mut state = NodeState::Constructing;
        debug!("Feeder node {} state: {:?}", id, state);

        resampler.setup()?;

        let direct_channel =
            adapter.supports_direct_channel() && resampler.supports_direct_channel();
        if direct_channel {
            let (producer, processor): (ControllerPort, ProcessorPort) = port_pair();
            adapter.attach_direct_port(processor)?;
            resampler.attach_port(producer)?;
        } else {
            resampler.on_processed(adapter.feed_handle());
        }

        state = NodeState::Bound;
        info!(
            "Feeder node {} bound: backend={}, resampler={:?}, kind={}, direct_channel={}",
            id,
            config.backend(),
            config.resampler_mode(),
            config.buffer_kind(),
            direct_channel
        );

        Ok(Self {
            id,
            config,
            resampler,
            adapter,
            sink: None,
            hooks,
            state,
            playback_state: PlaybackState::Uninitialized,
            direct_channel,
            protocol_error: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &FeederConfig {
        &self.config
    }

    pub fn node_state(&self) -> NodeState {
        self.state
    }

    /// Playback state as of the last `process_events`
    pub fn playback_state(&self) -> PlaybackState {
        self.playback_state
    }

    /// True if converted batches bypass this context
    pub fn uses_direct_channel(&self) -> bool {
        self.direct_channel
    }

    /// Submit interleaved samples at the input rate
    pub fn feed(&mut self, data: impl Into<SampleData>) -> Result<()> {
        let samples = data.into().into_f32();
        let channels = self.config.channels();
        if samples.len() % channels != 0 {
            warn!(
                "Rejected batch of {} samples for {} channels",
                samples.len(),
                channels
            );
            return Err(Error::InvalidSampleData(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }
        if samples.is_empty() {
            return Ok(());
        }
        self.resampler.submit(samples)
    }

    /// Start rendering into `sink`
    pub fn connect(&mut self, mut sink: Box<dyn AudioSink>) -> Result<()> {
        if self.sink.is_some() {
            return Err(Error::AlreadyConnected);
        }
        if sink.sample_rate() != self.config.output_sample_rate() {
            warn!(
                "Sink runs at {}Hz but output is resampled to {}Hz",
                sink.sample_rate(),
                self.config.output_sample_rate()
            );
        }

        self.adapter.connect(sink.as_mut())?;
        info!(
            "Feeder node {} connected ({} channels @ {}Hz)",
            self.id,
            sink.channel_count(),
            sink.sample_rate()
        );
        self.sink = Some(sink);
        Ok(())
    }

    /// Stop rendering and hand the sink back
    pub fn disconnect(&mut self) -> Result<Box<dyn AudioSink>> {
        let mut sink = self.sink.take().ok_or(Error::NotConnected)?;
        if let Err(e) = self.adapter.disconnect(sink.as_mut()) {
            self.sink = Some(sink);
            return Err(e);
        }
        info!("Feeder node {} disconnected", self.id);
        Ok(sink)
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    /// Readable frames (last known value on the realtime backend)
    pub fn current_fill(&self) -> usize {
        self.adapter.current_fill()
    }

    pub fn capacity(&self) -> usize {
        self.adapter.capacity()
    }

    /// Fill relative to capacity, clamped to [0, 1]
    pub fn buffer_health(&self) -> f32 {
        let capacity = self.adapter.capacity();
        if capacity == 0 {
            return 0.0;
        }
        (self.adapter.current_fill() as f32 / capacity as f32).clamp(0.0, 1.0)
    }

    pub fn set_threshold(&mut self, value: i64) -> Result<()> {
        if let Err(e) = self.adapter.set_threshold(value) {
            warn!("Threshold {} rejected: {}", value, e);
            return Err(e);
        }
        debug!("Feeder node {} threshold -> {}", self.id, value);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        debug!("Feeder node {} buffer cleared", self.id);
        self.adapter.clear()
    }

    pub fn buffer_kind(&self) -> BufferKind {
        self.adapter.buffer_kind()
    }

    /// Ask the render side for its fill; `callback` runs once with the answer
    ///
    /// Only one query may be outstanding at a time.
    pub fn request_buffer_fill(&mut self, callback: FillCallback) -> Result<Option<u64>> {
        self.adapter.request_fill(Some(callback))
    }

    /// Refresh the cached fill without a callback
    pub fn refresh_fill(&mut self) -> Result<()> {
        self.adapter.request_fill(None).map(|_| ())
    }

    /// Apply render-side responses and run hooks; returns the number handled
    pub fn process_events(&mut self) -> usize {
        let events = self.adapter.poll_events();
        let handled = events.len();

        for event in events {
            match event {
                AdapterEvent::State(state) => self.on_playback_state(state),
                AdapterEvent::ProtocolError(reason) => {
                    warn!("Feeder node {} render channel error: {}", self.id, reason);
                    self.protocol_error = Some(reason);
                }
            }
        }
        handled
    }

    fn on_playback_state(&mut self, state: PlaybackState) {
        self.playback_state = state;
        match state {
            PlaybackState::Uninitialized => {}
            PlaybackState::Ready => {
                debug!("Feeder node {} ready", self.id);
                self.hooks.on_ready();
            }
            PlaybackState::Playing => {
                info!("Feeder node {} playing", self.id);
                self.state = NodeState::Playing;
                self.hooks.on_playing();
            }
            PlaybackState::Starved => {
                info!("Feeder node {} starved", self.id);
                self.state = NodeState::Starved;
                self.hooks.on_starved();
            }
        }
    }

    /// Apply a decoded wire command
    ///
    /// `init` is issued by the node itself and is refused here.
    pub fn apply_wire_command(&mut self, command: WireCommand) -> Result<()> {
        match command {
            WireCommand::Init { .. } => Err(Error::Protocol(
                "init is sent by the node at construction".to_string(),
            )),
            WireCommand::Feed { data } => self.feed(data),
            WireCommand::SetThreshold { value } => self.set_threshold(value),
            WireCommand::GetBufferFill { .. } => self.refresh_fill(),
            WireCommand::ClearBuffer => self.clear(),
        }
    }

    pub fn status(&self) -> FeederStatus {
        FeederStatus {
            id: self.id,
            node_state: self.state,
            playback_state: self.playback_state,
            buffer_kind: self.buffer_kind(),
            fill: self.current_fill(),
            capacity: self.capacity(),
            health: self.buffer_health(),
            connected: self.is_connected(),
            direct_channel: self.direct_channel,
            protocol_error: self.protocol_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RenderBackend, ResamplerMode};

    fn callback_settings() -> FeederSettings {
        FeederSettings {
            channels: 2,
            threshold: 0,
            backend: RenderBackend::Callback,
            resampler: ResamplerMode::Inline,
            ..Default::default()
        }
    }

    #[test]
    fn test_direct_channel_only_with_worker_and_realtime() {
        let node = FeederNode::from_settings(
            &FeederSettings {
                backend: RenderBackend::RealtimeThread,
                resampler: ResamplerMode::Worker,
                ..Default::default()
            },
            Box::new(NoHooks),
        )
        .unwrap();
        assert!(node.uses_direct_channel());
        assert_eq!(node.node_state(), NodeState::Bound);

        let node = FeederNode::from_settings(&callback_settings(), Box::new(NoHooks)).unwrap();
        assert!(!node.uses_direct_channel());
    }

    #[test]
    fn test_invalid_settings_build_nothing() {
        let settings = FeederSettings {
            channels: 3,
            ..callback_settings()
        };
        assert!(matches!(
            FeederNode::from_settings(&settings, Box::new(NoHooks)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_frame_rejected() {
        let mut node = FeederNode::from_settings(&callback_settings(), Box::new(NoHooks)).unwrap();
        assert!(matches!(
            node.feed(vec![0.1f32, 0.2, 0.3]),
            Err(Error::InvalidSampleData(_))
        ));
        assert_eq!(node.current_fill(), 0);

        node.feed(vec![0i16, 0, 0, 0]).unwrap();
        assert_eq!(node.current_fill(), 2);
    }

    #[test]
    fn test_init_wire_command_refused() {
        let mut node = FeederNode::from_settings(&callback_settings(), Box::new(NoHooks)).unwrap();
        let init = WireCommand::decode(
            r#"{"command":"init","buffer_length":16384,"channel_count":2,"threshold":0,"buffer_kind":"ring_buffer"}"#,
        )
        .unwrap();
        assert!(matches!(
            node.apply_wire_command(init),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_status_serializes() {
        let node = FeederNode::from_settings(&callback_settings(), Box::new(NoHooks)).unwrap();
        let json = serde_json::to_value(node.status()).unwrap();
        assert_eq!(json["node_state"], "bound");
        assert_eq!(json["buffer_kind"], "ring_buffer");
        assert!(json.get("protocol_error").is_none());
    }
}
