// The orchestrator. Owns the shared state and the per-subsystem signal
// table, spawns one worker thread per subsystem, and joins them on
// teardown. Hardware internals (GPIO polling, the LCD menu) live outside
// this crate; their workers here are the wiring those collaborators hang
// off: block on the signal, consume, repeat.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use log::{debug, error, trace};

use crate::audio::{AudioEngine, CpalBackend};
use crate::config::AudioConfig;
use crate::shared::{AudioEvent, SharedState};
use crate::signal::Signal;

/// One signal per subsystem. Created once at startup, alive for the
/// process lifetime.
pub struct Signals {
    pub audio: Arc<Signal>,
    pub rotary: Arc<Signal>,
    pub cv: Arc<Signal>,
    pub screen: Arc<Signal>,
    pub button: Arc<Signal>,
}

impl Signals {
    fn new() -> Self {
        Self {
            audio: Arc::new(Signal::new()),
            rotary: Arc::new(Signal::new()),
            cv: Arc::new(Signal::new()),
            screen: Arc::new(Signal::new()),
            button: Arc::new(Signal::new()),
        }
    }

    /// Wake every subsystem, set or not. Used for teardown.
    pub fn set_all(&self) {
        self.audio.set();
        self.rotary.set();
        self.cv.set();
        self.screen.set();
        self.button.set();
    }
}

pub struct Rack {
    config: AudioConfig,
    state: Arc<SharedState>,
    signals: Arc<Signals>,
    handles: Vec<JoinHandle<()>>,
}

impl Rack {
    pub fn new(config: AudioConfig) -> Self {
        let state = Arc::new(SharedState::new());
        state.set_volume(config.volume);
        Self {
            config,
            state,
            signals: Arc::new(Signals::new()),
            handles: Vec::new(),
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn signals(&self) -> &Arc<Signals> {
        &self.signals
    }

    /// Deliver a front-panel event to the audio engine: write the tag,
    /// then raise the signal. Tags overwrite each other — latest wins.
    pub fn send_audio_event(&self, event: AudioEvent) {
        self.state.set_event(event);
        self.signals.audio.set();
    }

    /// Spawn all subsystem workers. The audio engine is built inside its
    /// own thread; a fatal engine error (model load failure) tears the
    /// whole rack down.
    pub fn start(&mut self) -> anyhow::Result<()> {
        {
            let config = self.config.clone();
            let state = self.state.clone();
            let signals = self.signals.clone();
            let signal = self.signals.audio.clone();
            let handle = thread::Builder::new()
                .name("audio".into())
                .spawn(move || {
                    let backend = Box::new(CpalBackend::new(state.clone()));
                    let outcome = AudioEngine::new(config, state.clone(), signal, backend)
                        .and_then(|mut engine| engine.run());
                    if let Err(e) = outcome {
                        error!("audio engine fatal: {e:#}");
                        state.request_shutdown();
                        signals.set_all();
                    }
                })
                .context("spawning audio thread")?;
            self.handles.push(handle);
        }

        let workers: [(&'static str, Arc<Signal>); 4] = [
            ("rotary", self.signals.rotary.clone()),
            ("cv", self.signals.cv.clone()),
            ("screen", self.signals.screen.clone()),
            ("button", self.signals.button.clone()),
        ];
        for (name, signal) in workers {
            let state = self.state.clone();
            let handle = thread::Builder::new()
                .name(name.into())
                .spawn(move || subsystem_loop(name, signal, state))
                .with_context(|| format!("spawning {name} thread"))?;
            self.handles.push(handle);
        }
        Ok(())
    }

    /// Request teardown and wake every worker so it can observe the flag.
    pub fn shutdown(&self) {
        self.state.request_shutdown();
        self.signals.set_all();
    }

    /// Join all workers. Returns once every subsystem has stopped.
    pub fn join(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn subsystem_loop(name: &'static str, signal: Arc<Signal>, state: Arc<SharedState>) {
    debug!("{name} worker started");
    loop {
        signal.wait();
        if state.shutdown() {
            break;
        }
        if signal.is_set() {
            signal.clear();
            trace!("{name} signal received");
        }
    }
    debug!("{name} worker stopped");
}
