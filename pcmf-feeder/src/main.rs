//! PCM Feeder demo - main entry point
//!
//! Synthesizes a sine tone at the input rate and feeds it in irregular bursts
//! through a [`FeederNode`], playing through the default audio device or
//! rendering offline. Prints one JSON status line per second.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pcmf_feeder::{
    AudioSink, BufferKind, CpalSink, FeederHooks, FeederNode, FeederSettings, OfflineSink,
    RenderBackend, ResamplerMode, SampleData, SampleFormat,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Feed rate relative to real time, cycled per tick
const BURST_PATTERN: [f32; 6] = [0.5, 1.5, 1.0, 0.25, 1.75, 1.0];

const TICK: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Realtime,
    Callback,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BufferKindArg {
    Ring,
    Fifo,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResamplerArg {
    Inline,
    Worker,
}

/// Command-line arguments for pcmf-feeder
#[derive(Parser, Debug)]
#[command(name = "pcmf-feeder")]
#[command(about = "Feed a synthesized PCM stream through a buffered feeder node")]
#[command(version)]
struct Args {
    /// Config file (defaults to $PCMF_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render backend
    #[arg(long, value_enum, env = "PCMF_BACKEND")]
    backend: Option<BackendArg>,

    /// Sample buffer strategy
    #[arg(long, value_enum, env = "PCMF_BUFFER_KIND")]
    buffer_kind: Option<BufferKindArg>,

    /// Where resampling runs
    #[arg(long, value_enum, env = "PCMF_RESAMPLER")]
    resampler: Option<ResamplerArg>,

    /// Frames buffered before playback starts
    #[arg(long, env = "PCMF_THRESHOLD")]
    threshold: Option<i64>,

    /// Sample rate of the synthesized input
    #[arg(long, env = "PCMF_INPUT_RATE")]
    input_rate: Option<u32>,

    /// Input sample format (float32, int16, ...)
    #[arg(long, default_value = "float32")]
    input_format: String,

    /// Tone frequency in Hz
    #[arg(long, default_value = "440")]
    tone_hz: f32,

    /// How long to feed, in seconds
    #[arg(long, default_value = "5")]
    seconds: u64,

    /// Output device name
    #[arg(long, env = "PCMF_DEVICE")]
    device: Option<String>,

    /// Render into memory instead of an audio device
    #[arg(long)]
    offline: bool,
}

impl Args {
    fn apply(&self, settings: &mut FeederSettings) {
        if let Some(backend) = self.backend {
            settings.backend = match backend {
                BackendArg::Realtime => RenderBackend::RealtimeThread,
                BackendArg::Callback => RenderBackend::Callback,
            };
        }
        if let Some(kind) = self.buffer_kind {
            settings.buffer_kind = match kind {
                BufferKindArg::Ring => BufferKind::RingBuffer,
                BufferKindArg::Fifo => BufferKind::FifoQueue,
            };
        }
        if let Some(resampler) = self.resampler {
            settings.resampler = match resampler {
                ResamplerArg::Inline => ResamplerMode::Inline,
                ResamplerArg::Worker => ResamplerMode::Worker,
            };
        }
        if let Some(threshold) = self.threshold {
            settings.threshold = threshold;
        }
        if let Some(rate) = self.input_rate {
            settings.input_sample_rate = rate;
        }
    }
}

/// Logs playback transitions
struct LogHooks;

impl FeederHooks for LogHooks {
    fn on_ready(&mut self) {
        info!("Feeder ready, buffering");
    }

    fn on_playing(&mut self) {
        info!("Threshold reached, playing");
    }

    fn on_starved(&mut self) {
        warn!("Buffer ran dry, waiting for more data");
    }
}

/// Interleaved sine generator
struct Tone {
    phase: f32,
    step: f32,
    channels: usize,
}

impl Tone {
    fn new(frequency: f32, sample_rate: u32, channels: usize) -> Self {
        Self {
            phase: 0.0,
            step: std::f32::consts::TAU * frequency / sample_rate as f32,
            channels,
        }
    }

    fn next_batch(&mut self, frames: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * self.channels);
        for _ in 0..frames {
            let sample = self.phase.sin() * 0.25;
            self.phase = (self.phase + self.step) % std::f32::consts::TAU;
            out.extend(std::iter::repeat(sample).take(self.channels));
        }
        out
    }
}

fn encode(samples: Vec<f32>, format: SampleFormat) -> Result<SampleData> {
    if format == SampleFormat::Float32 {
        return Ok(SampleData::F32(samples));
    }
    let bytes: Vec<u8> = match format {
        SampleFormat::Float64 => samples
            .iter()
            .flat_map(|&s| f64::from(s).to_le_bytes())
            .collect(),
        SampleFormat::Int32 => samples
            .iter()
            .flat_map(|&s| ((s * i32::MAX as f32) as i32).to_le_bytes())
            .collect(),
        SampleFormat::Int16 => samples
            .iter()
            .flat_map(|&s| ((s * i16::MAX as f32) as i16).to_le_bytes())
            .collect(),
        SampleFormat::Int8 => samples
            .iter()
            .map(|&s| (s * i8::MAX as f32) as i8 as u8)
            .collect(),
        SampleFormat::Uint8 => samples
            .iter()
            .map(|&s| (s * 127.0 + 128.0) as u8)
            .collect(),
        SampleFormat::Float32 => samples.iter().flat_map(|&s| s.to_le_bytes()).collect(),
    };
    SampleData::from_le_bytes(format, &bytes).context("Failed to encode tone")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file_config = pcmf_common::config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("pcmf_feeder={}", file_config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let input_format: SampleFormat = args
        .input_format
        .parse()
        .context("Invalid --input-format")?;

    let mut settings = FeederSettings::from_table(&file_config.feeder)
        .context("Invalid [feeder] configuration")?;
    args.apply(&mut settings);

    // Batch size only depends on settings, not on the device
    let preliminary = settings.validate().context("Invalid feeder settings")?;
    let channels = preliminary.channels();

    let (sink, offline): (Box<dyn AudioSink>, Option<OfflineSink>) = if args.offline {
        let sink = OfflineSink::new(channels, settings.output_sample_rate);
        (Box::new(sink.clone()), Some(sink))
    } else {
        let sink = CpalSink::new(
            args.device.as_deref(),
            settings.output_sample_rate,
            Some(preliminary.batch_size() as u32),
        )
        .context("Failed to open audio output")?;
        (Box::new(sink), None)
    };
    settings.output_sample_rate = sink.sample_rate();
    let config = settings.validate().context("Invalid feeder settings")?;

    info!(
        "Starting pcmf-feeder: {} channels, {}Hz -> {}Hz, {} input, backend={}, kind={}",
        config.channels(),
        config.input_sample_rate(),
        config.output_sample_rate(),
        input_format,
        config.backend(),
        config.buffer_kind()
    );

    let mut node = FeederNode::with_hooks(config.clone(), Box::new(LogHooks))
        .context("Failed to build feeder node")?;
    node.connect(sink).context("Failed to connect sink")?;

    let mut tone = Tone::new(args.tone_hz, config.input_sample_rate(), channels);
    let frames_per_tick = config.input_sample_rate() as f32 * TICK.as_secs_f32();
    let mut ticker = tokio::time::interval(TICK);
    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.seconds);
    let mut last_status = started;
    let mut rendered_frames: u64 = 0;

    for burst in BURST_PATTERN.iter().cycle() {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }

        let frames = (frames_per_tick * burst) as usize;
        let batch = encode(tone.next_batch(frames), input_format)?;
        if let Err(e) = node.feed(batch) {
            warn!("Feed failed: {}", e);
        }

        if let Some(sink) = &offline {
            let target = (now - started).as_secs_f64() * config.output_sample_rate() as f64;
            while (rendered_frames as f64) < target {
                sink.pull(config.batch_size());
                rendered_frames += config.batch_size() as u64;
            }
        }

        if let Err(e) = node.refresh_fill() {
            warn!("Fill query failed: {}", e);
        }
        node.process_events();

        if now.duration_since(last_status) >= Duration::from_secs(1) {
            last_status = now;
            println!("{}", serde_json::to_string(&node.status())?);
        }
    }

    node.disconnect().context("Failed to disconnect sink")?;
    info!("Feeder stopped after {:.1}s", started.elapsed().as_secs_f32());
    Ok(())
}
