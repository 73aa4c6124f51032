//! Audio device sink using cpal
//!
//! The stream starts when the sink is opened and keeps running for the
//! lifetime of the sink, outputting silence while no source is attached. The
//! device callback reaches the source with `try_lock`; if the producer side
//! holds the slot at that instant the buffer is filled with silence instead of
//! waiting.

use super::sink::{AudioSink, RenderSource, SourceSlot};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// cpal output stream fed by a [`RenderSource`]
pub struct CpalSink {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    slot: SourceSlot,

    /// Set by the stream error callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl CpalSink {
    /// Names of the available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device
    ///
    /// A named device that cannot be found falls back to the default device.
    /// `buffer_size` requests a fixed device buffer in frames.
    pub fn new(
        device_name: Option<&str>,
        preferred_rate: u32,
        buffer_size: Option<u32>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;

                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!(
                            "Requested device '{}' not found, falling back to default device",
                            name
                        );
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let (mut config, sample_format) = Self::best_config(&device, preferred_rate)?;
        if let Some(size) = buffer_size {
            config.buffer_size = cpal::BufferSize::Fixed(size);
        }

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        let mut sink = Self {
            device,
            config,
            sample_format,
            stream: None,
            slot: Arc::new(Mutex::new(None)),
            error_flag: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
        };
        sink.start()?;
        Ok(sink)
    }

    /// Prefer stereo f32 at `preferred_rate`, else the device default
    fn best_config(device: &Device, preferred_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= preferred_rate
                && config.max_sample_rate().0 >= preferred_rate
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(preferred_rate))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    /// True once the stream has reported an error
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        info!("Starting audio stream");
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>()?,
            SampleFormat::I16 => self.build_stream::<i16>()?,
            SampleFormat::U16 => self.build_stream::<u16>()?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        info!("Audio stream started successfully");
        Ok(())
    }

    fn build_stream<T>(&self) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let device_channels = (self.config.channels as usize).max(1);
        let slot = Arc::clone(&self.slot);
        let error_flag = Arc::clone(&self.error_flag);
        let error_count = Arc::clone(&self.error_count);

        // Grows to the largest callback size, then reused
        let mut scratch: Vec<f32> = Vec::new();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut guard) = slot.try_lock() else {
                        data.fill(T::EQUILIBRIUM);
                        return;
                    };
                    let Some(source) = guard.as_mut() else {
                        data.fill(T::EQUILIBRIUM);
                        return;
                    };

                    let source_channels = source.channel_count().max(1);
                    let frames = data.len() / device_channels;
                    let needed = frames * source_channels;
                    if scratch.len() < needed {
                        scratch.resize(needed, 0.0);
                    }
                    let rendered = &mut scratch[..needed];
                    source.render(rendered);
                    drop(guard);

                    for (out, input) in data
                        .chunks_exact_mut(device_channels)
                        .zip(rendered.chunks_exact(source_channels))
                    {
                        for (channel, sample) in out.iter_mut().enumerate() {
                            let value = if source_channels == 2 && device_channels == 1 {
                                (input[0] + input[1]) * 0.5
                            } else {
                                input[channel.min(source_channels - 1)]
                            };
                            *sample = T::from_sample(value.clamp(-1.0, 1.0));
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }
}

impl AudioSink for CpalSink {
    fn check_source(&self, channels: usize) -> Result<()> {
        if self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some() {
            return Err(Error::AlreadyConnected);
        }
        if !(1..=2).contains(&channels) {
            return Err(Error::AudioOutput(format!(
                "cannot map {} source channels to the device",
                channels
            )));
        }
        Ok(())
    }

    fn attach(&mut self, source: Box<dyn RenderSource>) {
        debug!("Audio sink attached ({} channels)", source.channel_count());
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(source);
    }

    fn detach(&mut self) -> Option<Box<dyn RenderSource>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn channel_count(&self) -> usize {
        self.config.channels as usize
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause audio stream: {}", e);
            }
        }
    }
}
