//! Resampler stages
//!
//! A stage accepts raw `f32` batches at the input rate and emits converted
//! batches at the output rate. Two variants:
//! - [`InlineResampler`]: converts on the caller's thread and hands each
//!   batch to the processed-batch handler
//! - [`WorkerResampler`]: converts on a dedicated worker thread and, once a
//!   direct port is attached, posts batches straight to the render processor

pub mod converter;
pub mod worker;

pub use converter::{ConverterType, StreamingConverter, DEFAULT_CHUNK_FRAMES};
pub use worker::WorkerResampler;

use crate::channel::ControllerPort;
use crate::config::{FeederConfig, ResamplerMode};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, trace};

/// Receives converted interleaved batches
pub type BatchHandler = Arc<dyn Fn(Vec<f32>) + Send + Sync>;

/// Sample rate conversion stage
pub trait ResamplerStage: Send {
    /// Allocate the converter (and any worker); called once by the node
    fn setup(&mut self) -> Result<()>;

    /// Queue a raw interleaved batch for conversion
    fn submit(&mut self, batch: Vec<f32>) -> Result<()>;

    /// Route converted batches to `handler`
    fn on_processed(&mut self, handler: BatchHandler);

    /// True if this stage runs in its own context and can post to a port
    fn supports_direct_channel(&self) -> bool;

    /// Route converted batches to the render processor through `port`
    fn attach_port(&mut self, port: ControllerPort) -> Result<()>;
}

/// Build the stage variant selected by the configuration
pub fn create_resampler(config: &FeederConfig) -> Box<dyn ResamplerStage> {
    match config.resampler_mode() {
        ResamplerMode::Inline => Box::new(InlineResampler::new(config)),
        ResamplerMode::Worker => Box::new(WorkerResampler::new(config)),
    }
}

/// Conversion parameters shared by both stage variants
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConverterSpec {
    pub converter: ConverterType,
    pub input_rate: u32,
    pub output_rate: u32,
    pub channels: usize,
}

impl ConverterSpec {
    pub fn from_config(config: &FeederConfig) -> Self {
        Self {
            converter: config.converter(),
            input_rate: config.input_sample_rate(),
            output_rate: config.output_sample_rate(),
            channels: config.channels(),
        }
    }

    pub fn build(&self) -> Result<StreamingConverter> {
        StreamingConverter::new(
            self.converter,
            self.input_rate,
            self.output_rate,
            self.channels,
            DEFAULT_CHUNK_FRAMES,
        )
    }
}

/// Same-context resampler
pub struct InlineResampler {
    spec: ConverterSpec,
    converter: Option<StreamingConverter>,
    handler: Option<BatchHandler>,
}

impl InlineResampler {
    pub fn new(config: &FeederConfig) -> Self {
        Self {
            spec: ConverterSpec::from_config(config),
            converter: None,
            handler: None,
        }
    }
}

impl ResamplerStage for InlineResampler {
    fn setup(&mut self) -> Result<()> {
        if self.converter.is_none() {
            self.converter = Some(self.spec.build()?);
            debug!("Inline resampler ready");
        }
        Ok(())
    }

    fn submit(&mut self, batch: Vec<f32>) -> Result<()> {
        let converter = self
            .converter
            .as_mut()
            .ok_or_else(|| Error::InvalidState("resampler used before setup".to_string()))?;

        let converted = converter.process(&batch)?;
        if converted.is_empty() {
            return Ok(());
        }

        match &self.handler {
            Some(handler) => handler(converted),
            None => trace!("No processed-batch handler, dropping {} samples", converted.len()),
        }
        Ok(())
    }

    fn on_processed(&mut self, handler: BatchHandler) {
        self.handler = Some(handler);
    }

    fn supports_direct_channel(&self) -> bool {
        false
    }

    fn attach_port(&mut self, _port: ControllerPort) -> Result<()> {
        Err(Error::InvalidState(
            "inline resampler cannot post to a direct channel".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeederSettings;
    use std::sync::Mutex;

    fn inline_config(input_rate: u32) -> FeederConfig {
        FeederSettings {
            input_sample_rate: input_rate,
            output_sample_rate: 44100,
            resampler: ResamplerMode::Inline,
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_submit_before_setup_is_rejected() {
        let mut stage = InlineResampler::new(&inline_config(44100));
        assert!(matches!(
            stage.submit(vec![0.0; 4]),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_passthrough_reaches_handler() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        let mut stage = InlineResampler::new(&inline_config(44100));
        stage.setup().unwrap();
        stage.on_processed(Arc::new(move |batch| sink.lock().unwrap().extend(batch)));
        stage.submit(vec![0.1, 0.2, 0.3, 0.4]).unwrap();

        assert_eq!(*received.lock().unwrap(), vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_inline_has_no_direct_channel() {
        let mut stage = InlineResampler::new(&inline_config(48000));
        assert!(!stage.supports_direct_channel());

        let (controller, _processor) = crate::channel::port_pair();
        assert!(stage.attach_port(controller).is_err());
    }

    #[test]
    fn test_factory_selects_variant() {
        let stage = create_resampler(&inline_config(44100));
        assert!(!stage.supports_direct_channel());

        let worker_config = FeederSettings {
            resampler: ResamplerMode::Worker,
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(create_resampler(&worker_config).supports_direct_channel());
    }
}
