// Engine-level behaviour against a hand-pumped backend: session lifecycle,
// mode sequencing, latest-wins event delivery, and the CV-modulated block
// pipeline end to end. No audio device is involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use neurorack::audio::{AudioEngine, Backend, Generator, OutputStream, SampleBuffer, StreamStats};
use neurorack::config::AudioConfig;
use neurorack::model::{ModelAdapter, ModelError};
use neurorack::shared::{AudioEvent, AudioMode, SharedState};
use neurorack::signal::Signal;

// ── fake backend ──────────────────────────────────────────────────

struct FakeEntry {
    generator: Box<dyn Generator>,
    stats: Arc<StreamStats>,
}

#[derive(Clone, Default)]
struct FakeBackend {
    inner: Arc<Mutex<Vec<FakeEntry>>>,
}

impl FakeBackend {
    fn opened(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    fn stats(&self, idx: usize) -> Arc<StreamStats> {
        self.inner.lock().unwrap()[idx].stats.clone()
    }

    // Drive the stream like the audio driver would: pull up to `blocks`
    // blocks, marking the stats done when the generator signals the end.
    // Returns the number of blocks actually produced.
    fn pump(&self, idx: usize, blocks: usize) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let entry = &mut inner[idx];
        let mut out = vec![0.0f32; entry.generator.block_size()];
        let mut produced = 0;
        for _ in 0..blocks {
            if entry.generator.next_block(&mut out) {
                produced += 1;
            } else {
                entry.stats.mark_done();
                break;
            }
        }
        produced
    }
}

struct FakeStream {
    stats: Arc<StreamStats>,
}

impl OutputStream for FakeStream {
    fn is_active(&self) -> bool {
        !self.stats.is_done()
    }
}

impl Backend for FakeBackend {
    fn open_stream(
        &self,
        _sample_rate: u32,
        generator: Box<dyn Generator>,
        stats: Arc<StreamStats>,
    ) -> anyhow::Result<Box<dyn OutputStream>> {
        self.inner.lock().unwrap().push(FakeEntry {
            generator,
            stats: stats.clone(),
        });
        Ok(Box::new(FakeStream { stats }))
    }
}

// ── mock model ───────────────────────────────────────────────────

// encode = first 8 samples of the frame; decode = constant block, recording
// every latent it is handed. Optionally fails preload or stops decoding
// after a block budget.
#[derive(Debug)]
struct MockModel {
    state: Arc<SharedState>,
    preloads: AtomicUsize,
    fail_preload: bool,
    max_blocks: Option<usize>,
    decoded: AtomicUsize,
    latents: Mutex<Vec<Vec<f32>>>,
    generate_modes: Mutex<Vec<AudioMode>>,
}

impl MockModel {
    fn new(state: Arc<SharedState>) -> Self {
        Self {
            state,
            preloads: AtomicUsize::new(0),
            fail_preload: false,
            max_blocks: None,
            decoded: AtomicUsize::new(0),
            latents: Mutex::new(Vec::new()),
            generate_modes: Mutex::new(Vec::new()),
        }
    }

    fn limited(state: Arc<SharedState>, max_blocks: usize) -> Self {
        let mut model = Self::new(state);
        model.max_blocks = Some(max_blocks);
        model
    }

    fn failing(state: Arc<SharedState>) -> Self {
        let mut model = Self::new(state);
        model.fail_preload = true;
        model
    }
}

impl ModelAdapter for MockModel {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn preload(&self) -> Result<(), ModelError> {
        self.preloads.fetch_add(1, Ordering::Relaxed);
        if self.fail_preload {
            return Err(ModelError::Load {
                name: "mock",
                reason: "weights missing".into(),
            });
        }
        Ok(())
    }

    fn latent_dims(&self) -> usize {
        8
    }

    fn encode(&self, frame: &[f32]) -> Vec<f32> {
        frame[..8].to_vec()
    }

    fn decode(&self, latent: &[f32], frames: usize) -> Option<Vec<f32>> {
        let n = self.decoded.fetch_add(1, Ordering::Relaxed);
        if let Some(max) = self.max_blocks {
            if n >= max {
                return None;
            }
        }
        self.latents.lock().unwrap().push(latent.to_vec());
        Some(vec![latent[0]; frames])
    }

    fn generate_random(&self, blocks: usize) -> Option<Vec<f32>> {
        Some(vec![0.0; blocks * 64])
    }

    fn generate_prior_random(&self, blocks: usize) -> Vec<f32> {
        self.generate_modes.lock().unwrap().push(self.state.mode());
        vec![0.0; blocks * 64]
    }
}

// ── harness ───────────────────────────────────────────────────────

fn test_config(block_size: usize) -> AudioConfig {
    let mut config = AudioConfig::default();
    config.block_size = block_size;
    config
}

fn ramp_material(blocks: usize, block_size: usize) -> SampleBuffer {
    let data = (0..blocks * block_size).map(|i| i as f32).collect();
    SampleBuffer::new(data, block_size).unwrap()
}

fn build_engine(
    block_size: usize,
    state: Arc<SharedState>,
    signal: Arc<Signal>,
    backend: FakeBackend,
    model: Arc<MockModel>,
    material: SampleBuffer,
) -> AudioEngine {
    AudioEngine::with_model(
        test_config(block_size),
        state,
        signal,
        Box::new(backend),
        model,
        material,
    )
}

// ── tests ─────────────────────────────────────────────────────────

#[test]
fn burnin_runs_once_then_idle_before_any_play_action() {
    let state = Arc::new(SharedState::new());
    let model = Arc::new(MockModel::new(state.clone()));
    let backend = FakeBackend::default();
    let mut engine = build_engine(
        64,
        state.clone(),
        Arc::new(Signal::new()),
        backend,
        model.clone(),
        ramp_material(4, 64),
    );

    assert_eq!(state.mode(), AudioMode::Burnin);
    engine.burn_in().unwrap();
    assert_eq!(state.mode(), AudioMode::Idle);
    assert_eq!(model.preloads.load(Ordering::Relaxed), 1);

    engine.play_model(false).unwrap();
    // the one-shot generation observed Play, and the engine returned to Idle
    assert_eq!(*model.generate_modes.lock().unwrap(), vec![AudioMode::Play]);
    assert_eq!(state.mode(), AudioMode::Idle);
    assert_eq!(model.preloads.load(Ordering::Relaxed), 1);
}

#[test]
fn preload_failure_is_fatal() {
    let state = Arc::new(SharedState::new());
    let model = Arc::new(MockModel::failing(state.clone()));
    let mut engine = build_engine(
        64,
        state.clone(),
        Arc::new(Signal::new()),
        FakeBackend::default(),
        model,
        ramp_material(4, 64),
    );
    assert!(engine.burn_in().is_err());
}

#[test]
fn active_session_is_left_alone_by_repeat_triggers() {
    let state = Arc::new(SharedState::new());
    let model = Arc::new(MockModel::new(state.clone()));
    let backend = FakeBackend::default();
    let mut engine = build_engine(
        64,
        state.clone(),
        Arc::new(Signal::new()),
        backend.clone(),
        model,
        ramp_material(4, 64),
    );

    engine.burn_in().unwrap();
    engine.dispatch(AudioEvent::Gate0);
    engine.dispatch(AudioEvent::Gate0);
    engine.dispatch(AudioEvent::Gate0);
    assert_eq!(backend.opened(), 1);
}

#[test]
fn decode_sentinel_closes_session_and_next_trigger_opens_a_distinct_one() {
    let state = Arc::new(SharedState::new());
    let model = Arc::new(MockModel::limited(state.clone(), 2));
    let backend = FakeBackend::default();
    let mut engine = build_engine(
        64,
        state.clone(),
        Arc::new(Signal::new()),
        backend.clone(),
        model,
        ramp_material(4, 64),
    );

    engine.burn_in().unwrap();
    engine.dispatch(AudioEvent::Gate0);
    assert_eq!(backend.opened(), 1);

    // two blocks come out, then the sentinel kills the stream
    assert_eq!(backend.pump(0, 10), 2);
    assert!(backend.stats(0).is_done());

    engine.dispatch(AudioEvent::Gate0);
    assert_eq!(backend.opened(), 2);
    // a brand new session object, never the closed one
    assert!(!Arc::ptr_eq(&backend.stats(0), &backend.stats(1)));
    assert_eq!(
        Arc::as_ptr(engine.session().unwrap().stats()),
        Arc::as_ptr(&backend.stats(1))
    );
}

#[test]
fn gate_trigger_displaces_a_parked_one_shot() {
    let state = Arc::new(SharedState::new());
    let model = Arc::new(MockModel::new(state.clone()));
    let backend = FakeBackend::default();
    let mut engine = build_engine(
        64,
        state.clone(),
        Arc::new(Signal::new()),
        backend.clone(),
        model,
        ramp_material(4, 64),
    );

    engine.burn_in().unwrap();
    // non-blocking one-shot parks its session in the slot
    engine.play_noise(0.05, false).unwrap();
    assert_eq!(backend.opened(), 1);

    // a gate arriving mid-playback starts the block stream immediately
    engine.dispatch(AudioEvent::Gate0);
    assert_eq!(backend.opened(), 2);
    assert_eq!(
        Arc::as_ptr(engine.session().unwrap().stats()),
        Arc::as_ptr(&backend.stats(1))
    );

    // and the block stream it opened is kept by further gates
    engine.dispatch(AudioEvent::Gate0);
    assert_eq!(backend.opened(), 2);
}

#[test]
fn unwired_events_are_silently_ignored() {
    let state = Arc::new(SharedState::new());
    let model = Arc::new(MockModel::new(state.clone()));
    let backend = FakeBackend::default();
    let mut engine = build_engine(
        64,
        state.clone(),
        Arc::new(Signal::new()),
        backend.clone(),
        model,
        ramp_material(4, 64),
    );

    engine.burn_in().unwrap();
    for event in [
        AudioEvent::None,
        AudioEvent::Gate1,
        AudioEvent::Cv2,
        AudioEvent::Cv3,
        AudioEvent::Cv4,
        AudioEvent::Cv5,
    ] {
        engine.dispatch(event);
    }
    assert_eq!(backend.opened(), 0);
}

#[test]
fn dispatcher_sees_only_the_latest_of_two_racing_events() {
    let state = Arc::new(SharedState::new());
    let signal = Arc::new(Signal::new());
    let backend = FakeBackend::default();

    // both events land, and the signal fires twice, before the engine's
    // single wait wakes up
    state.set_event(AudioEvent::Gate0);
    signal.set();
    state.set_event(AudioEvent::Gate1);
    signal.set();

    let runner = {
        let state = state.clone();
        let signal = signal.clone();
        let backend = backend.clone();
        thread::spawn(move || {
            let model = Arc::new(MockModel::new(state.clone()));
            let mut engine = build_engine(
                64,
                state,
                signal,
                backend,
                model,
                ramp_material(4, 64),
            );
            engine.run().unwrap();
        })
    };

    // wait for the event tag to be consumed
    let deadline = Instant::now() + Duration::from_secs(5);
    while state.event() != AudioEvent::None && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(state.event(), AudioEvent::None);

    state.request_shutdown();
    signal.set();
    runner.join().unwrap();

    // Gate0 was overwritten: Gate1 alone was dispatched, and Gate1 opens
    // no stream
    assert_eq!(backend.opened(), 0);
}

#[test]
fn end_to_end_block_stream_with_cv_scaling_and_wrap() {
    const BLOCK: usize = 2048;

    let state = Arc::new(SharedState::new());
    state.set_cv(1, 0.5);
    state.set_cv_active(1, true);

    let model = Arc::new(MockModel::new(state.clone()));
    let backend = FakeBackend::default();
    let mut engine = build_engine(
        BLOCK,
        state.clone(),
        Arc::new(Signal::new()),
        backend.clone(),
        model.clone(),
        ramp_material(4, BLOCK),
    );

    engine.burn_in().unwrap();
    engine.dispatch(AudioEvent::Gate0);
    assert_eq!(backend.pump(0, 5), 5);

    // four blocks of material, five callbacks: exactly one wrap
    assert_eq!(backend.stats(0).wraps(), 1);

    let latents = model.latents.lock().unwrap();
    assert_eq!(latents.len(), 5);
    for (call, latent) in latents.iter().enumerate() {
        let base = ((call % 4) * BLOCK) as f32;
        for (dim, &value) in latent.iter().enumerate() {
            let raw = base + dim as f32;
            let expected = if dim == 1 { raw * 0.5 } else { raw };
            assert_eq!(value, expected, "callback {call}, latent dim {dim}");
        }
    }
    // the fifth callback replayed the first block's material
    assert_eq!(latents[4][0], latents[0][0]);
}
