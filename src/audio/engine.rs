// The audio engine: burn-in, then an event dispatch loop that lives until
// rack teardown. Hardware workers raise the audio signal after writing an
// event tag into SharedState; the engine wakes, consumes the tag, and
// drives the stream session. The session slot is only ever touched here,
// on the control thread — the driver callback just renders blocks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, info, trace, warn};

use crate::audio::generator::{BlockGenerator, BufferPlayer};
use crate::audio::sample_buffer::SampleBuffer;
use crate::audio::session::{Backend, StreamSession, StreamStats};
use crate::config::AudioConfig;
use crate::model::{self, ModelAdapter};
use crate::shared::{AudioEvent, AudioMode, SharedState};
use crate::signal::Signal;

// One-shot generation length in blocks (~5 s at 48 kHz / 2048).
const ONE_SHOT_BLOCKS: usize = 120;

// Seconds of generated noise material when no WAV is configured.
const MATERIAL_SECS: usize = 4;

// What the session slot currently holds. A parked one-shot never blocks
// the gate-triggered stream: Gate0 displaces it.
enum SessionKind {
    Block,
    OneShot,
}

pub struct AudioEngine {
    config: AudioConfig,
    state: Arc<SharedState>,
    signal: Arc<Signal>,
    backend: Box<dyn Backend>,
    model: Arc<dyn ModelAdapter>,
    material: SampleBuffer,
    session: Option<(SessionKind, StreamSession)>,
}

impl AudioEngine {
    /// Build an engine from config: resolve the model backend by name and
    /// load (or synthesize) the input material.
    pub fn new(
        config: AudioConfig,
        state: Arc<SharedState>,
        signal: Arc<Signal>,
        backend: Box<dyn Backend>,
    ) -> anyhow::Result<Self> {
        let model: Arc<dyn ModelAdapter> =
            Arc::from(model::create(&config.model, config.sample_rate, config.block_size)?);
        let material = match &config.material {
            Some(path) => SampleBuffer::load_wav(path, config.sample_rate, config.block_size)
                .with_context(|| format!("loading material {}", path.display()))?,
            None => SampleBuffer::noise(
                config.sample_rate as usize * MATERIAL_SECS,
                config.block_size,
            ),
        };
        Ok(Self::with_model(config, state, signal, backend, model, material))
    }

    /// Assemble an engine from pre-built parts. Used by `new` and by tests
    /// that substitute a mock model or backend.
    pub fn with_model(
        config: AudioConfig,
        state: Arc<SharedState>,
        signal: Arc<Signal>,
        backend: Box<dyn Backend>,
        model: Arc<dyn ModelAdapter>,
        material: SampleBuffer,
    ) -> Self {
        Self {
            config,
            state,
            signal,
            backend,
            model,
            material,
            session: None,
        }
    }

    /// Burn-in, then dispatch events until shutdown is requested.
    pub fn run(&mut self) -> anyhow::Result<()> {
        self.burn_in()?;
        loop {
            self.signal.wait();
            if self.state.shutdown() {
                break;
            }
            if !self.signal.is_set() {
                continue; // spurious wake
            }
            self.signal.clear();
            let event = self.state.take_event();
            self.dispatch(event);
        }
        if let Some((_, session)) = self.session.take() {
            session.close();
        }
        info!("audio engine stopped");
        Ok(())
    }

    /// Warm up the model. Runs exactly once, before any event is served;
    /// a load failure here is fatal to the audio engine.
    pub fn burn_in(&mut self) -> anyhow::Result<()> {
        info!("performing model burn-in ({})", self.model.name());
        self.state.set_mode(AudioMode::Burnin);
        self.model.preload().context("model failed to load")?;
        self.state.set_mode(AudioMode::Idle);
        info!("audio ready");
        Ok(())
    }

    /// Route one consumed event to its stream action. Gate 0 is the only
    /// wired trigger; the remaining tags are defined but unhandled.
    pub fn dispatch(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::Gate0 => {
                if let Err(e) = self.play_model_block() {
                    warn!("failed to start block stream: {e:#}");
                }
            }
            AudioEvent::None => {}
            other => trace!("ignoring unhandled audio event {other:?}"),
        }
    }

    /// Ensure a live block stream exists: keep an active block session,
    /// replace a dead one, displace a parked one-shot. Replacement closes
    /// the old session first — a dead session is never reused.
    pub fn play_model_block(&mut self) -> anyhow::Result<()> {
        if let Some((SessionKind::Block, session)) = &self.session {
            if session.is_active() {
                return Ok(());
            }
        }
        if let Some((kind, old)) = self.session.take() {
            match kind {
                SessionKind::Block => info!(
                    "stream session dead, replacing (wraps: {}, underruns: {})",
                    old.stats().wraps(),
                    old.stats().underruns()
                ),
                SessionKind::OneShot => info!("displacing one-shot playback for block stream"),
            }
            old.close();
        }

        let stats = Arc::new(StreamStats::new());
        let generator = BlockGenerator::new(
            self.model.clone(),
            self.state.clone(),
            self.material.clone(),
            stats.clone(),
        );
        let session = StreamSession::open(
            self.backend.as_ref(),
            self.config.sample_rate,
            Box::new(generator),
            stats,
        )?;
        info!("stream launched (block {})", self.config.block_size);
        self.session = Some((SessionKind::Block, session));
        Ok(())
    }

    /// One-shot generation: sample the model prior once and play the whole
    /// buffer, optionally blocking until playback completes. Flips the mode
    /// to Play for the duration.
    pub fn play_model(&mut self, wait: bool) -> anyhow::Result<()> {
        debug!("one-shot generation start");
        self.state.set_mode(AudioMode::Play);
        let samples = self.model.generate_prior_random(ONE_SHOT_BLOCKS);
        let result = self.play_buffer(samples, wait);
        self.state.set_mode(AudioMode::Idle);
        debug!("one-shot generation end");
        result
    }

    /// Checkup path: play plain noise through the output, no model involved.
    pub fn play_noise(&mut self, seconds: f32, wait: bool) -> anyhow::Result<()> {
        let len = (seconds * self.config.sample_rate as f32) as usize;
        let samples = SampleBuffer::noise(len, self.config.block_size).into_samples();
        self.play_buffer(samples, wait)
    }

    fn play_buffer(&mut self, mut samples: Vec<f32>, wait: bool) -> anyhow::Result<()> {
        // at most one session per engine: a one-shot displaces whatever
        // stream is currently in the slot
        if let Some((_, old)) = self.session.take() {
            info!("replacing existing stream session for one-shot playback");
            old.close();
        }

        let gain = self.state.volume();
        if gain != 1.0 {
            for s in &mut samples {
                *s *= gain;
            }
        }

        let secs = samples.len() as f64 / self.config.sample_rate as f64;
        let stats = Arc::new(StreamStats::new());
        let player = BufferPlayer::new(samples, self.config.block_size);
        let session = StreamSession::open(
            self.backend.as_ref(),
            self.config.sample_rate,
            Box::new(player),
            stats,
        )?;

        if wait {
            let timeout = Duration::from_secs_f64(secs + 1.0);
            if !session.stats().wait_finished(timeout) {
                warn!("playback did not finish within {:.1}s", secs + 1.0);
            }
            session.close();
        } else {
            self.session = Some((SessionKind::OneShot, session));
        }
        Ok(())
    }

    /// The current stream session, if any. Control-path observability only.
    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref().map(|(_, session)| session)
    }
}
