// Process-wide state, shared by every worker thread. One logical owner per
// field writes, everyone may read. All accessors are single-field atomics;
// nothing here gives you a consistent snapshot across fields — the audio
// callback in particular reads CV values as best-effort, possibly torn
// across the array.
//
// Relaxed ordering is enough: the Signal's mutex provides the
// happens-before edge between an event writer and the engine's wake.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

/// Number of CV channels on the front panel (2 gates + 4 continuous).
pub const N_CVS: usize = 6;

/// Allowed range for the output volume parameter.
pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AudioMode {
    Burnin = 0,
    Idle = 1,
    Play = 2,
}

impl AudioMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => AudioMode::Idle,
            2 => AudioMode::Play,
            _ => AudioMode::Burnin,
        }
    }
}

/// Front-panel event tag. Written by the hardware workers, consumed once by
/// the audio engine. Writing a new event before the previous one is consumed
/// overwrites it — latest wins, there is no queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AudioEvent {
    None = 0,
    Gate0 = 1,
    Gate1 = 2,
    Cv2 = 3,
    Cv3 = 4,
    Cv4 = 5,
    Cv5 = 6,
}

impl AudioEvent {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => AudioEvent::Gate0,
            2 => AudioEvent::Gate1,
            3 => AudioEvent::Cv2,
            4 => AudioEvent::Cv3,
            5 => AudioEvent::Cv4,
            6 => AudioEvent::Cv5,
            _ => AudioEvent::None,
        }
    }
}

#[derive(Debug)]
pub struct SharedState {
    mode: AtomicU8,
    event: AtomicU8,
    cv: [AtomicU32; N_CVS],
    cv_active: [AtomicBool; N_CVS],
    volume: AtomicU32,
    underruns: AtomicU64,
    shutdown: AtomicBool,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(AudioMode::Burnin as u8),
            event: AtomicU8::new(AudioEvent::None as u8),
            cv: std::array::from_fn(|_| AtomicU32::new(0.0f32.to_bits())),
            cv_active: std::array::from_fn(|_| AtomicBool::new(false)),
            volume: AtomicU32::new(1.0f32.to_bits()),
            underruns: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    // ── audio mode (written by the engine only) ───────────────────

    pub fn mode(&self) -> AudioMode {
        AudioMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: AudioMode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    // ── event tag (written by hardware workers, consumed once) ────

    pub fn event(&self) -> AudioEvent {
        AudioEvent::from_u8(self.event.load(Ordering::Relaxed))
    }

    pub fn set_event(&self, event: AudioEvent) {
        self.event.store(event as u8, Ordering::Relaxed);
    }

    /// Consume the current event, leaving `None` behind.
    pub fn take_event(&self) -> AudioEvent {
        AudioEvent::from_u8(self.event.swap(AudioEvent::None as u8, Ordering::Relaxed))
    }

    // ── CV channels (written by the cv worker) ────────────────────

    pub fn cv(&self, channel: usize) -> f32 {
        f32::from_bits(self.cv[channel].load(Ordering::Relaxed))
    }

    pub fn set_cv(&self, channel: usize, value: f32) {
        self.cv[channel].store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn cv_active(&self, channel: usize) -> bool {
        self.cv_active[channel].load(Ordering::Relaxed)
    }

    pub fn set_cv_active(&self, channel: usize, active: bool) {
        self.cv_active[channel].store(active, Ordering::Relaxed);
    }

    // ── volume ────────────────────────────────────────────────────

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(VOLUME_RANGE.0, VOLUME_RANGE.1);
        self.volume.store(clamped.to_bits(), Ordering::Relaxed);
    }

    // ── stream observability ──────────────────────────────────────

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn count_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    // ── teardown ──────────────────────────────────────────────────

    pub fn shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
