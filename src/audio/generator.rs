// Block sources for the output stream. BlockGenerator is the real-time
// model pipeline; BufferPlayer streams an already-rendered buffer for the
// one-shot paths. Both run on the driver callback thread, so nothing here
// may block or allocate unboundedly.

use std::sync::Arc;

use log::{debug, info};

use crate::audio::sample_buffer::SampleBuffer;
use crate::audio::session::StreamStats;
use crate::model::ModelAdapter;
use crate::shared::{N_CVS, SharedState};

/// Something the backend can pull fixed-size blocks from. Returning `false`
/// means end of generation: the backend marks the stream done and outputs
/// silence from then on.
pub trait Generator: Send {
    fn block_size(&self) -> usize;
    fn next_block(&mut self, out: &mut [f32]) -> bool;
}

/// The per-block model pipeline: cut material, encode, scale the latent by
/// the active CV channels, decode, apply volume.
pub struct BlockGenerator {
    model: Arc<dyn ModelAdapter>,
    state: Arc<SharedState>,
    material: SampleBuffer,
    stats: Arc<StreamStats>,
    pos: usize,
}

impl BlockGenerator {
    pub fn new(
        model: Arc<dyn ModelAdapter>,
        state: Arc<SharedState>,
        material: SampleBuffer,
        stats: Arc<StreamStats>,
    ) -> Self {
        Self {
            model,
            state,
            material,
            stats,
            pos: 0,
        }
    }

    /// Current material cursor, always in `0..max_idx`.
    pub fn pos(&self) -> usize {
        self.pos
    }
}

impl Generator for BlockGenerator {
    fn block_size(&self) -> usize {
        self.material.block_size()
    }

    fn next_block(&mut self, out: &mut [f32]) -> bool {
        let block = self.material.block_size();
        debug_assert_eq!(out.len(), block);

        let mut latent = self.model.encode(self.material.slice(self.pos));
        self.pos += block;
        if self.pos >= self.material.max_idx() {
            self.pos = 0;
            self.stats.count_wrap();
            debug!("material cursor wrapped (loop {})", self.stats.wraps());
        }

        apply_cv(&mut latent, &self.state);

        let Some(samples) = self.model.decode(&latent, block) else {
            info!("model signalled end of generation, stopping stream");
            return false;
        };

        let gain = self.state.volume();
        out.fill(0.0);
        for (o, s) in out.iter_mut().zip(samples) {
            *o = s * gain;
        }
        true
    }
}

// Latent dimension i is scaled by cv[i] when that channel is flagged
// active; inactive dimensions pass through untouched. CV reads are
// best-effort snapshots, torn reads across channels are acceptable.
fn apply_cv(latent: &mut [f32], state: &SharedState) {
    for (i, dim) in latent.iter_mut().take(N_CVS).enumerate() {
        if state.cv_active(i) {
            *dim *= state.cv(i);
        }
    }
}

/// Streams a fully rendered buffer, zero-padding the final partial block,
/// then signals end of generation.
pub struct BufferPlayer {
    samples: Vec<f32>,
    block_size: usize,
    pos: usize,
}

impl BufferPlayer {
    pub fn new(samples: Vec<f32>, block_size: usize) -> Self {
        Self {
            samples,
            block_size,
            pos: 0,
        }
    }
}

impl Generator for BufferPlayer {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn next_block(&mut self, out: &mut [f32]) -> bool {
        if self.pos >= self.samples.len() {
            return false;
        }
        let take = (self.samples.len() - self.pos).min(out.len());
        out[..take].copy_from_slice(&self.samples[self.pos..self.pos + take]);
        out[take..].fill(0.0);
        self.pos += take;
        true
    }
}
