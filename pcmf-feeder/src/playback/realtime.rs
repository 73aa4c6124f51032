//! Realtime-thread rendering
//!
//! The render core lives inside a [`RealtimeProcessor`] owned by the sink's
//! callback thread. The [`RealtimeAdapter`] never touches it directly; all
//! interaction goes through the control port:
//!
//! ```text
//! adapter ──Init/Feed/SetThreshold/GetBufferFill/ClearBuffer/Connect──▶ processor
//! adapter ◀──StateChanged/BufferLengthChanged/BufferFillUpdate/ProtocolError── processor
//! producer ─────────────────────Feed (direct port)──────────────────────▶ processor
//! ```
//!
//! The processor drains both ports at the start of every render call, so
//! commands take effect on the next pull.

use super::adapter::{AdapterEvent, RenderingAdapter};
use super::core::{validate_threshold, RenderCore};
use crate::audio::{AudioSink, RenderSource};
use crate::buffer::BufferKind;
use crate::channel::{
    port_pair, ControlMessage, ControllerPort, FillCallback, FillQueryTracker, PortSender,
    ProcessorEvent, ProcessorPort, ProtocolChannel,
};
use crate::config::FeederConfig;
use crate::error::{Error, Result};
use crate::resample::BatchHandler;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Adapter for a render core running in the sink's realtime context
pub struct RealtimeAdapter {
    port: ControllerPort,
    parked: Option<Box<dyn RenderSource>>,
    buffer_kind: BufferKind,

    // Mirrors of processor state, updated from events
    capacity: usize,
    last_fill: usize,

    fills: FillQueryTracker,
}

impl RealtimeAdapter {
    /// Create the processor and queue its `Init`
    pub fn new(config: &FeederConfig) -> Result<Self> {
        let (port, processor_port) = port_pair();

        port.post(ControlMessage::Init {
            buffer_length: config.buffer_length(),
            channel_count: config.channels(),
            threshold: config.threshold(),
            buffer_kind: config.buffer_kind(),
        })?;

        let processor = RealtimeProcessor::new(processor_port, config.channels());
        debug!(
            "Realtime adapter created: kind={}, length={}, threshold={}",
            config.buffer_kind(),
            config.buffer_length(),
            config.threshold()
        );

        Ok(Self {
            port,
            parked: Some(Box::new(processor)),
            buffer_kind: config.buffer_kind(),
            capacity: config.buffer_length(),
            last_fill: 0,
            fills: FillQueryTracker::new(),
        })
    }
}

impl RenderingAdapter for RealtimeAdapter {
    fn feed(&mut self, data: Vec<f32>) -> Result<()> {
        self.port.post(ControlMessage::Feed { data })
    }

    fn feed_handle(&self) -> BatchHandler {
        let sender = self.port.sender();
        Arc::new(move |data| {
            if let Err(e) = sender.post(ControlMessage::Feed { data }) {
                warn!("Render processor unreachable, batch dropped: {}", e);
            }
        })
    }

    fn connect(&mut self, sink: &mut dyn AudioSink) -> Result<()> {
        let Some(processor) = self.parked.take() else {
            return Err(Error::AlreadyConnected);
        };
        if let Err(e) = sink.check_source(processor.channel_count()) {
            self.parked = Some(processor);
            return Err(e);
        }

        sink.attach(processor);
        info!("Render processor attached to sink");
        Ok(())
    }

    fn disconnect(&mut self, sink: &mut dyn AudioSink) -> Result<()> {
        if self.parked.is_some() {
            return Err(Error::NotConnected);
        }
        let processor = sink.detach().ok_or(Error::NotConnected)?;
        self.parked = Some(processor);
        info!("Render processor detached from sink");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.parked.is_none()
    }

    fn current_fill(&self) -> usize {
        self.last_fill
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_threshold(&mut self, value: i64) -> Result<()> {
        validate_threshold(value, self.capacity)?;
        self.port.post(ControlMessage::SetThreshold { value })
    }

    fn clear(&mut self) -> Result<()> {
        self.port.post(ControlMessage::ClearBuffer)?;
        self.last_fill = 0;
        Ok(())
    }

    fn buffer_kind(&self) -> BufferKind {
        self.buffer_kind
    }

    fn request_fill(&mut self, callback: Option<FillCallback>) -> Result<Option<u64>> {
        let Some(callback) = callback else {
            self.port
                .post(ControlMessage::GetBufferFill { request_id: None })?;
            return Ok(None);
        };

        let id = self.fills.begin(callback)?;
        if let Err(e) = self.port.post(ControlMessage::GetBufferFill {
            request_id: Some(id),
        }) {
            self.fills.abandon(id);
            return Err(e);
        }
        Ok(Some(id))
    }

    fn poll_events(&mut self) -> Vec<AdapterEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.port.try_recv() {
            match event {
                ProcessorEvent::BufferLengthChanged { new_length } => {
                    debug!("Render buffer grew to {} frames", new_length);
                    self.capacity = new_length;
                }
                ProcessorEvent::StateChanged { state } => events.push(AdapterEvent::State(state)),
                ProcessorEvent::BufferFillUpdate { fill, request_id } => {
                    self.last_fill = fill;
                    self.fills.resolve(request_id, fill);
                }
                ProcessorEvent::ProtocolError { channel, reason } => {
                    warn!(
                        "Render processor closed {:?} channel: {}",
                        channel, reason
                    );
                    // Queries on a closed control channel are never answered
                    if channel == ProtocolChannel::Control {
                        if let Some(id) = self.fills.pending_id() {
                            self.fills.abandon(id);
                        }
                    }
                    events.push(AdapterEvent::ProtocolError(reason));
                }
            }
        }
        events
    }

    fn supports_direct_channel(&self) -> bool {
        true
    }

    fn attach_direct_port(&mut self, port: ProcessorPort) -> Result<()> {
        self.port.post(ControlMessage::Connect { endpoint: port })
    }
}

/// Render source holding the core; runs on the sink's callback thread
pub struct RealtimeProcessor {
    control: ProcessorPort,
    control_open: bool,
    direct: Option<ProcessorPort>,
    direct_open: bool,
    core: Option<RenderCore>,
    channels: usize,
}

impl RealtimeProcessor {
    /// Create a processor waiting for `Init`
    ///
    /// # Arguments
    /// * `control` - Processor end of the control channel
    /// * `channels` - Channel count the processor renders; an `Init` for any
    ///   other count is a protocol error
    ///
    /// # Returns
    /// A processor that renders silence until `Init` arrives
    pub fn new(control: ProcessorPort, channels: usize) -> Self {
        Self {
            control,
            control_open: true,
            direct: None,
            direct_open: false,
            core: None,
            channels: channels.max(1),
        }
    }

    fn drain_control(&mut self) {
        while self.control_open {
            let Some(message) = self.control.try_recv() else {
                break;
            };
            if let Err(reason) = self.handle_control(message) {
                warn!("Closing render control channel: {}", reason);
                let _ = self.control.post(ProcessorEvent::ProtocolError {
                    channel: ProtocolChannel::Control,
                    reason,
                });
                self.control.close();
                self.control_open = false;
            }
        }
    }

    fn handle_control(&mut self, message: ControlMessage) -> std::result::Result<(), String> {
        let name = message.command_name();

        if let ControlMessage::Init {
            buffer_length,
            channel_count,
            threshold,
            buffer_kind,
        } = message
        {
            if self.core.is_some() {
                return Err("init received twice".to_string());
            }
            if channel_count != self.channels {
                return Err(format!(
                    "init for {} channels on a {}-channel processor",
                    channel_count, self.channels
                ));
            }
            if threshold > buffer_length {
                return Err(format!(
                    "init threshold {} exceeds buffer length {}",
                    threshold, buffer_length
                ));
            }
            self.core = Some(self.build_core(buffer_kind, buffer_length, threshold));
            return Ok(());
        }

        let Some(core) = self.core.as_mut() else {
            return Err(format!("{} received before init", name));
        };

        match message {
            ControlMessage::Init { .. } => {}
            ControlMessage::Feed { data } => {
                core.feed(&data);
            }
            ControlMessage::SetThreshold { value } => {
                if let Err(e) = core.set_threshold(value) {
                    warn!("Threshold change rejected: {}", e);
                }
            }
            ControlMessage::Connect { endpoint } => {
                if self.direct.is_some() {
                    return Err("direct channel already connected".to_string());
                }
                debug!("Direct producer channel connected");
                self.direct = Some(endpoint);
                self.direct_open = true;
            }
            ControlMessage::GetBufferFill { request_id } => {
                let fill = core.current_fill();
                let _ = self
                    .control
                    .post(ProcessorEvent::BufferFillUpdate { fill, request_id });
            }
            ControlMessage::ClearBuffer => core.clear(),
        }
        Ok(())
    }

    fn build_core(&self, kind: BufferKind, length: usize, threshold: usize) -> RenderCore {
        let state_events = self.control.sender();
        let resize_events: PortSender<ProcessorEvent> = self.control.sender();

        let mut core = RenderCore::new(kind, length, self.channels, threshold)
            .with_state_listener(Box::new(move |state| {
                let _ = state_events.post(ProcessorEvent::StateChanged { state });
            }))
            .with_resize_listener(Box::new(move |new_length| {
                let _ = resize_events.post(ProcessorEvent::BufferLengthChanged { new_length });
            }));
        core.initialize();
        core
    }

    fn drain_direct(&mut self) {
        if !self.direct_open {
            return;
        }
        let Some(port) = self.direct.as_mut() else {
            return;
        };

        while let Some(message) = port.try_recv() {
            match (message, self.core.as_mut()) {
                (ControlMessage::Feed { data }, Some(core)) => {
                    core.feed(&data);
                }
                (other, _) => {
                    let reason = format!(
                        "{} is not accepted on the direct channel",
                        other.command_name()
                    );
                    warn!("Closing direct channel: {}", reason);
                    port.close();
                    self.direct_open = false;
                    let _ = self.control.post(ProcessorEvent::ProtocolError {
                        channel: ProtocolChannel::Direct,
                        reason,
                    });
                    return;
                }
            }
        }
    }

}

impl RenderSource for RealtimeProcessor {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn render(&mut self, output: &mut [f32]) {
        self.drain_control();
        self.drain_direct();

        match self.core.as_mut() {
            Some(core) => core.pull(output),
            None => output.fill(0.0),
        }
    }
}
