//! Periodic-callback rendering
//!
//! The render core is shared between the node and the sink callback behind a
//! mutex. Fill queries are answered synchronously; state transitions are
//! queued and surface on the next `poll_events`.

use super::adapter::{AdapterEvent, RenderingAdapter};
use super::core::RenderCore;
use crate::audio::{AudioSink, RenderSource};
use crate::buffer::BufferKind;
use crate::channel::{FillCallback, ProcessorPort};
use crate::config::FeederConfig;
use crate::error::{Error, Result};
use crate::resample::BatchHandler;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, trace};

/// Adapter for a render core pulled from a periodic callback
pub struct CallbackAdapter {
    core: Arc<Mutex<RenderCore>>,
    parked: Option<Box<dyn RenderSource>>,
    events: UnboundedReceiver<AdapterEvent>,
}

impl CallbackAdapter {
    /// Build and initialize the shared core
    ///
    /// The core leaves `Uninitialized` here, so the `Ready` event is already
    /// queued for the first `poll_events`.
    ///
    /// # Arguments
    /// * `config` - Validated feeder configuration
    ///
    /// # Returns
    /// An adapter holding the render source parked until `connect`
    pub fn new(config: &FeederConfig) -> Self {
        let (tx, events) = mpsc::unbounded_channel();

        let mut core = RenderCore::new(
            config.buffer_kind(),
            config.buffer_length(),
            config.channels(),
            config.threshold(),
        )
        .with_state_listener(Box::new(move |state| {
            let _ = tx.send(AdapterEvent::State(state));
        }))
        .with_resize_listener(Box::new(|new_length| {
            debug!("Callback render buffer grew to {} frames", new_length);
        }));
        core.initialize();

        let core = Arc::new(Mutex::new(core));
        let source = SharedCore {
            core: Arc::clone(&core),
            channels: config.channels(),
        };

        Self {
            core,
            parked: Some(Box::new(source)),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RenderCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderingAdapter for CallbackAdapter {
    fn feed(&mut self, data: Vec<f32>) -> Result<()> {
        self.lock().feed(&data);
        Ok(())
    }

    fn feed_handle(&self) -> BatchHandler {
        let core = Arc::clone(&self.core);
        Arc::new(move |data: Vec<f32>| {
            core.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .feed(&data);
        })
    }

    fn connect(&mut self, sink: &mut dyn AudioSink) -> Result<()> {
        let Some(source) = self.parked.take() else {
            return Err(Error::AlreadyConnected);
        };
        if let Err(e) = sink.check_source(source.channel_count()) {
            self.parked = Some(source);
            return Err(e);
        }

        sink.attach(source);
        info!("Shared render core attached to sink");
        Ok(())
    }

    fn disconnect(&mut self, sink: &mut dyn AudioSink) -> Result<()> {
        if self.parked.is_some() {
            return Err(Error::NotConnected);
        }
        let source = sink.detach().ok_or(Error::NotConnected)?;
        self.parked = Some(source);
        info!("Shared render core detached from sink");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.parked.is_none()
    }

    fn current_fill(&self) -> usize {
        self.lock().current_fill()
    }

    fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    fn set_threshold(&mut self, value: i64) -> Result<()> {
        self.lock().set_threshold(value)
    }

    fn clear(&mut self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }

    fn buffer_kind(&self) -> BufferKind {
        self.lock().buffer_kind()
    }

    fn request_fill(&mut self, callback: Option<FillCallback>) -> Result<Option<u64>> {
        let fill = self.current_fill();
        if let Some(callback) = callback {
            callback(fill);
        }
        Ok(None)
    }

    fn poll_events(&mut self) -> Vec<AdapterEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn supports_direct_channel(&self) -> bool {
        false
    }

    fn attach_direct_port(&mut self, _port: ProcessorPort) -> Result<()> {
        Err(Error::InvalidState(
            "callback backend has no direct channel".to_string(),
        ))
    }
}

/// Render source pulling the shared core
struct SharedCore {
    core: Arc<Mutex<RenderCore>>,
    channels: usize,
}

impl RenderSource for SharedCore {
    fn channel_count(&self) -> usize {
        self.channels
    }

    /// Pull from the shared core without waiting on the producer
    ///
    /// A contended lock yields one batch of silence and leaves the state
    /// machine untouched.
    fn render(&mut self, output: &mut [f32]) {
        match self.core.try_lock() {
            Ok(mut core) => core.pull(output),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().pull(output),
            Err(TryLockError::WouldBlock) => {
                trace!("Render core busy, emitting silence");
                output.fill(0.0);
            }
        }
    }
}
