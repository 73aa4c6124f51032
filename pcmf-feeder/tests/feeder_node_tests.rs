//! End-to-end tests for FeederNode across backends and resampler modes
//!
//! The offline sink stands in for the audio device. On the realtime backend
//! all state lives behind message ports, so tests pump them with zero-frame
//! pulls until the expected fill is visible.

use pcmf_feeder::channel::{ControllerPort, WireCommand};
use pcmf_feeder::playback::{create_adapter, RenderingAdapter};
use pcmf_feeder::resample::{BatchHandler, ResamplerStage};
use pcmf_feeder::{
    BufferKind, Error, FeederHooks, FeederNode, FeederSettings, NodeState, OfflineSink,
    PlaybackState, RenderBackend, ResamplerMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct HookCounts {
    ready: AtomicUsize,
    playing: AtomicUsize,
    starved: AtomicUsize,
}

struct CountingHooks(Arc<HookCounts>);

impl FeederHooks for CountingHooks {
    fn on_ready(&mut self) {
        self.0.ready.fetch_add(1, Ordering::SeqCst);
    }

    fn on_playing(&mut self) {
        self.0.playing.fetch_add(1, Ordering::SeqCst);
    }

    fn on_starved(&mut self) {
        self.0.starved.fetch_add(1, Ordering::SeqCst);
    }
}

fn settings(backend: RenderBackend, resampler: ResamplerMode, threshold: i64) -> FeederSettings {
    FeederSettings {
        channels: 2,
        buffer_length: 16384,
        threshold,
        input_sample_rate: 44100,
        output_sample_rate: 44100,
        backend,
        resampler,
        ..Default::default()
    }
}

fn build(settings: &FeederSettings) -> (FeederNode, OfflineSink, Arc<HookCounts>) {
    let counts = Arc::new(HookCounts::default());
    let mut node =
        FeederNode::from_settings(settings, Box::new(CountingHooks(Arc::clone(&counts)))).unwrap();
    let sink = OfflineSink::new(settings.channels as usize, settings.output_sample_rate);
    node.connect(Box::new(sink.clone())).unwrap();
    (node, sink, counts)
}

/// Pump both contexts until the node reports `expected` frames
fn wait_for_fill(node: &mut FeederNode, sink: &OfflineSink, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        sink.pull(0);
        node.refresh_fill().unwrap();
        sink.pull(0);
        node.process_events();

        if node.current_fill() == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "fill stuck at {} (expected {})",
            node.current_fill(),
            expected
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn play_then_starve(backend: RenderBackend, resampler: ResamplerMode) {
    let (mut node, sink, counts) = build(&settings(backend, resampler, 4096));

    node.feed(vec![0.5f32; 4096 * 2]).unwrap();
    wait_for_fill(&mut node, &sink, 4096);
    assert_eq!(counts.ready.load(Ordering::SeqCst), 1);
    assert_eq!(counts.playing.load(Ordering::SeqCst), 0);

    let out = sink.pull(4096);
    assert!(out.iter().all(|&s| s == 0.5), "{:?}/{:?}", backend, resampler);
    node.process_events();
    assert_eq!(counts.playing.load(Ordering::SeqCst), 1);
    assert_eq!(node.node_state(), NodeState::Playing);

    let out = sink.pull(128);
    assert!(out.iter().all(|&s| s == 0.0));
    wait_for_fill(&mut node, &sink, 0);
    assert_eq!(counts.starved.load(Ordering::SeqCst), 1);
    assert_eq!(node.node_state(), NodeState::Starved);
    assert_eq!(node.playback_state(), PlaybackState::Starved);
}

#[test]
fn test_realtime_worker_direct_channel() {
    let (node, _sink, _) = build(&settings(
        RenderBackend::RealtimeThread,
        ResamplerMode::Worker,
        0,
    ));
    assert!(node.uses_direct_channel());

    play_then_starve(RenderBackend::RealtimeThread, ResamplerMode::Worker);
}

#[test]
fn test_realtime_inline() {
    play_then_starve(RenderBackend::RealtimeThread, ResamplerMode::Inline);
}

#[test]
fn test_callback_worker() {
    play_then_starve(RenderBackend::Callback, ResamplerMode::Worker);
}

#[test]
fn test_callback_inline() {
    play_then_starve(RenderBackend::Callback, ResamplerMode::Inline);
}

#[test]
fn test_threshold_100_boundary() {
    let (mut node, sink, counts) = build(&FeederSettings {
        channels: 1,
        ..settings(RenderBackend::Callback, ResamplerMode::Inline, 100)
    });

    node.feed(vec![0.1f32; 99]).unwrap();
    sink.pull(64);
    node.process_events();
    assert_eq!(counts.playing.load(Ordering::SeqCst), 0);

    node.feed(vec![0.1f32]).unwrap();
    sink.pull(64);
    node.process_events();
    assert_eq!(counts.playing.load(Ordering::SeqCst), 1);

    sink.pull(64);
    sink.pull(64);
    node.process_events();
    assert_eq!(counts.playing.load(Ordering::SeqCst), 1);
    assert_eq!(counts.starved.load(Ordering::SeqCst), 1);
}

#[test]
fn test_zero_threshold_plays_silence_immediately() {
    let (mut node, sink, counts) = build(&settings(
        RenderBackend::RealtimeThread,
        ResamplerMode::Inline,
        0,
    ));

    let out = sink.pull(128);
    assert!(out.iter().all(|&s| s == 0.0));
    node.process_events();
    assert_eq!(counts.ready.load(Ordering::SeqCst), 1);
    assert_eq!(counts.playing.load(Ordering::SeqCst), 1);
}

#[test]
fn test_buffer_health_stays_in_unit_range() {
    for kind in [BufferKind::RingBuffer, BufferKind::FifoQueue] {
        let (mut node, sink, _) = build(&FeederSettings {
            buffer_kind: kind,
            ..settings(RenderBackend::Callback, ResamplerMode::Inline, 16384)
        });
        assert_eq!(node.buffer_health(), 0.0);

        node.feed(vec![0.2f32; 8192 * 2]).unwrap();
        assert!((node.buffer_health() - 0.5).abs() < 1e-6);

        node.feed(vec![0.2f32; 20000 * 2]).unwrap();
        let health = node.buffer_health();
        assert!((0.0..=1.0).contains(&health), "{:?}: {}", kind, health);
        assert_eq!(node.current_fill(), 28192);

        sink.pull(64);
        assert!((0.0..=1.0).contains(&node.buffer_health()));
    }
}

#[test]
fn test_threshold_validation_keeps_state() {
    let (mut node, _sink, _) = build(&settings(
        RenderBackend::Callback,
        ResamplerMode::Inline,
        4096,
    ));

    assert!(matches!(
        node.set_threshold(-1),
        Err(Error::InvalidThreshold { value: -1, .. })
    ));
    assert!(matches!(
        node.set_threshold(16385),
        Err(Error::InvalidThreshold { .. })
    ));
    node.set_threshold(16384).unwrap();
}

#[test]
fn test_partial_frames_rejected() {
    let (mut node, _sink, _) = build(&settings(
        RenderBackend::RealtimeThread,
        ResamplerMode::Worker,
        0,
    ));
    assert!(matches!(
        node.feed(vec![0i16; 3]),
        Err(Error::InvalidSampleData(_))
    ));
}

#[test]
fn test_clear_while_playing_starves() {
    let (mut node, sink, counts) = build(&FeederSettings {
        buffer_kind: BufferKind::FifoQueue,
        ..settings(RenderBackend::Callback, ResamplerMode::Inline, 10)
    });

    node.feed(vec![0.4f32; 1000 * 2]).unwrap();
    sink.pull(100);
    node.process_events();
    assert_eq!(counts.playing.load(Ordering::SeqCst), 1);

    node.clear().unwrap();
    assert_eq!(node.current_fill(), 0);
    let out = sink.pull(100);
    assert!(out.iter().all(|&s| s == 0.0));
    node.process_events();
    assert_eq!(counts.starved.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fill_query_callback_realtime() {
    let (mut node, sink, _) = build(&settings(
        RenderBackend::RealtimeThread,
        ResamplerMode::Inline,
        16384,
    ));
    node.feed(vec![0.0f32; 777 * 2]).unwrap();

    let answer = Arc::new(AtomicUsize::new(usize::MAX));
    let slot = Arc::clone(&answer);
    let id = node
        .request_buffer_fill(Box::new(move |fill| slot.store(fill, Ordering::SeqCst)))
        .unwrap();
    assert!(id.is_some());
    assert!(matches!(
        node.request_buffer_fill(Box::new(|_| {})),
        Err(Error::FillQueryPending(_))
    ));

    sink.pull(0);
    node.process_events();
    assert_eq!(answer.load(Ordering::SeqCst), 777);

    // Slot is free again
    assert!(node.request_buffer_fill(Box::new(|_| {})).is_ok());
}

#[test]
fn test_resampled_stream_reaches_sink() {
    let (mut node, sink, _) = build(&FeederSettings {
        input_sample_rate: 48000,
        converter: 4,
        ..settings(RenderBackend::Callback, ResamplerMode::Inline, 0)
    });

    for _ in 0..10 {
        node.feed(vec![0.25f32; 1024 * 2]).unwrap();
    }
    let fill = node.current_fill();
    let expected = 10240 * 44100 / 48000;
    assert!(fill + 1024 >= expected && fill <= expected + 1024, "fill {}", fill);

    let out = sink.pull(512);
    assert!(out.iter().any(|&s| s != 0.0));
}

#[test]
fn test_disconnect_and_reconnect() {
    let (mut node, sink, _) = build(&settings(
        RenderBackend::RealtimeThread,
        ResamplerMode::Worker,
        0,
    ));
    assert!(sink.is_attached());

    let returned = node.disconnect().unwrap();
    assert!(!sink.is_attached());
    assert!(matches!(node.disconnect(), Err(Error::NotConnected)));

    node.connect(returned).unwrap();
    assert!(sink.is_attached());
    assert!(matches!(
        node.connect(Box::new(OfflineSink::new(2, 44100))),
        Err(Error::AlreadyConnected)
    ));
}

#[test]
fn test_wire_commands_drive_node() {
    let (mut node, sink, _) = build(&settings(
        RenderBackend::RealtimeThread,
        ResamplerMode::Inline,
        0,
    ));

    for json in [
        r#"{"command":"feed","data":[0.1,0.1,0.2,0.2,0.3,0.3]}"#,
        r#"{"command":"set_threshold","value":3}"#,
    ] {
        node.apply_wire_command(WireCommand::decode(json).unwrap())
            .unwrap();
    }
    wait_for_fill(&mut node, &sink, 3);

    node.apply_wire_command(WireCommand::decode(r#"{"command":"clear_buffer"}"#).unwrap())
        .unwrap();
    wait_for_fill(&mut node, &sink, 0);

    assert!(WireCommand::decode(r#"{"command":"reboot"}"#).is_err());
}

struct FailingResampler;

impl ResamplerStage for FailingResampler {
    fn setup(&mut self) -> pcmf_feeder::Result<()> {
        Err(Error::Resample("no converter".to_string()))
    }

    fn submit(&mut self, _batch: Vec<f32>) -> pcmf_feeder::Result<()> {
        Ok(())
    }

    fn on_processed(&mut self, _handler: BatchHandler) {}

    fn supports_direct_channel(&self) -> bool {
        false
    }

    fn attach_port(&mut self, _port: ControllerPort) -> pcmf_feeder::Result<()> {
        Ok(())
    }
}

#[test]
fn test_failing_setup_fails_construction() {
    let config = settings(RenderBackend::Callback, ResamplerMode::Inline, 0)
        .validate()
        .unwrap();
    let adapter: Box<dyn RenderingAdapter> = create_adapter(&config).unwrap();

    let result = FeederNode::from_parts(
        config,
        adapter,
        Box::new(FailingResampler),
        Box::new(pcmf_feeder::NoHooks),
    );
    assert!(matches!(result, Err(Error::Resample(_))));
}
