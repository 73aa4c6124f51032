//! Worker-thread resampler
//!
//! Conversion runs on a dedicated named thread fed through an unbounded
//! command queue. Converted batches go to the attached direct port when there
//! is one, otherwise to the processed-batch handler.

use super::{BatchHandler, ConverterSpec, ResamplerStage, StreamingConverter};
use crate::channel::{ControlMessage, ControllerPort};
use crate::config::FeederConfig;
use crate::error::{Error, Result};
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

enum WorkerCommand {
    Batch(Vec<f32>),
    SetHandler(BatchHandler),
    AttachPort(ControllerPort),
    Shutdown,
}

/// Resampler running on its own thread
pub struct WorkerResampler {
    spec: ConverterSpec,
    tx: Option<UnboundedSender<WorkerCommand>>,
    thread: Option<JoinHandle<()>>,

    // Routing registered before setup; handed to the worker at spawn
    handler: Option<BatchHandler>,
    port: Option<ControllerPort>,
}

impl WorkerResampler {
    /// Create an idle stage; the worker thread starts in `setup`
    pub fn new(config: &FeederConfig) -> Self {
        Self {
            spec: ConverterSpec::from_config(config),
            tx: None,
            thread: None,
            handler: None,
            port: None,
        }
    }

    fn send(&self, command: WorkerCommand) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::InvalidState("resampler worker not started".to_string()))?;
        tx.send(command)
            .map_err(|_| Error::ChannelClosed("resampler worker has exited".to_string()))
    }
}

impl ResamplerStage for WorkerResampler {
    fn setup(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Ok(());
        }

        // Built here so converter errors surface from setup
        let converter = self.spec.build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut worker = Worker {
            converter,
            rx,
            handler: self.handler.take(),
            port: self.port.take(),
        };

        let thread = std::thread::Builder::new()
            .name("pcmf-resampler".to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::Resample(format!("Failed to spawn resampler worker: {}", e)))?;

        debug!(
            "Resampler worker started: {}Hz -> {}Hz, {} channels",
            self.spec.input_rate, self.spec.output_rate, self.spec.channels
        );
        self.tx = Some(tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn submit(&mut self, batch: Vec<f32>) -> Result<()> {
        self.send(WorkerCommand::Batch(batch))
    }

    fn on_processed(&mut self, handler: BatchHandler) {
        if self.tx.is_none() {
            self.handler = Some(handler);
        } else if let Err(e) = self.send(WorkerCommand::SetHandler(handler)) {
            warn!("Could not route resampler output: {}", e);
        }
    }

    fn supports_direct_channel(&self) -> bool {
        true
    }

    fn attach_port(&mut self, port: ControllerPort) -> Result<()> {
        if self.tx.is_none() {
            self.port = Some(port);
            return Ok(());
        }
        self.send(WorkerCommand::AttachPort(port))
    }
}

impl Drop for WorkerResampler {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(WorkerCommand::Shutdown);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Resampler worker panicked");
            }
        }
    }
}

struct Worker {
    converter: StreamingConverter,
    rx: UnboundedReceiver<WorkerCommand>,
    handler: Option<BatchHandler>,
    port: Option<ControllerPort>,
}

impl Worker {
    fn run(&mut self) {
        while let Some(command) = self.rx.blocking_recv() {
            match command {
                WorkerCommand::Batch(batch) => match self.converter.process(&batch) {
                    Ok(converted) if !converted.is_empty() => self.route(converted),
                    Ok(_) => {}
                    Err(e) => warn!("Dropping batch of {} samples: {}", batch.len(), e),
                },
                WorkerCommand::SetHandler(handler) => self.handler = Some(handler),
                WorkerCommand::AttachPort(port) => self.port = Some(port),
                WorkerCommand::Shutdown => break,
            }
        }
        debug!("Resampler worker stopped");
    }

    fn route(&mut self, converted: Vec<f32>) {
        if let Some(port) = &self.port {
            match port.post(ControlMessage::Feed { data: converted }) {
                Ok(()) => return,
                Err(e) => {
                    warn!("Direct render channel lost, batch dropped: {}", e);
                    self.port = None;
                    return;
                }
            }
        }

        match &self.handler {
            Some(handler) => handler(converted),
            None => trace!("No processed-batch handler, dropping {} samples", converted.len()),
        }
    }
}
