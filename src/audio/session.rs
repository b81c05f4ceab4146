// A StreamSession owns exactly one live output stream. Sessions are never
// restarted: once the stats say done (model sentinel, device error), the
// control path closes the session and opens a fresh one. Only the control
// path ever touches the slot — the callback thread just renders.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::debug;

use crate::audio::generator::Generator;

/// Counters shared between the driver callback and the control path, plus
/// the completion channel the one-shot path blocks on.
pub struct StreamStats {
    done: AtomicBool,
    underruns: AtomicU64,
    wraps: AtomicU64,
    finished_tx: Sender<()>,
    finished_rx: Receiver<()>,
}

impl StreamStats {
    pub fn new() -> Self {
        let (finished_tx, finished_rx) = crossbeam_channel::bounded(1);
        Self {
            done: AtomicBool::new(false),
            underruns: AtomicU64::new(0),
            wraps: AtomicU64::new(0),
            finished_tx,
            finished_rx,
        }
    }

    /// Mark the stream finished and notify anyone blocked on playback.
    /// Safe to call more than once (sentinel and error callback can race).
    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Relaxed);
        let _ = self.finished_tx.try_send(());
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }

    pub fn count_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn count_wrap(&self) {
        self.wraps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn wraps(&self) -> u64 {
        self.wraps.load(Ordering::Relaxed)
    }

    /// Block until the stream reports done, or `timeout` elapses.
    /// Returns whether it finished in time.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        if self.is_done() {
            return true;
        }
        self.finished_rx.recv_timeout(timeout).is_ok()
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running output stream. Dropping it stops the stream.
pub trait OutputStream {
    /// Whether the driver still considers the stream live.
    fn is_active(&self) -> bool;
}

/// Opens output streams on some audio device. The cpal implementation lives
/// in `audio::CpalBackend`; tests substitute a hand-pumped fake. The
/// backend contract: pull blocks from `generator` on the driver's schedule,
/// and call `stats.mark_done()` when the generator signals the end.
pub trait Backend: Send {
    fn open_stream(
        &self,
        sample_rate: u32,
        generator: Box<dyn Generator>,
        stats: Arc<StreamStats>,
    ) -> anyhow::Result<Box<dyn OutputStream>>;
}

pub struct StreamSession {
    stream: Box<dyn OutputStream>,
    stats: Arc<StreamStats>,
}

impl StreamSession {
    pub fn open(
        backend: &dyn Backend,
        sample_rate: u32,
        generator: Box<dyn Generator>,
        stats: Arc<StreamStats>,
    ) -> anyhow::Result<Self> {
        let stream = backend.open_stream(sample_rate, generator, stats.clone())?;
        Ok(Self { stream, stats })
    }

    pub fn is_active(&self) -> bool {
        !self.stats.is_done() && self.stream.is_active()
    }

    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }

    /// Close the session for good. There is deliberately no way to restart
    /// a closed session — callers open a new one instead.
    pub fn close(self) {
        debug!(
            "closing stream session (wraps: {}, underruns: {})",
            self.stats.wraps(),
            self.stats.underruns()
        );
    }
}
