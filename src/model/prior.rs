// Built-in deterministic backend. Stands in for the heavyweight pretrained
// model on dev machines: encode measures band energies, decode renders them
// as block-aligned harmonics. Cheap enough that the burn-in passes finish
// in microseconds, but it exercises the whole contract.

use std::f32::consts::TAU;
use std::time::Instant;

use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{ModelAdapter, ModelError};

/// Latent dimensionality, matching what the pretrained models expose.
pub const LATENT_DIMS: usize = 8;

// Warm-up inference passes run by preload.
const F_PASS: usize = 3;

// Fundamental of the harmonic stack used by decode, in Hz.
const BASE_FREQ: f32 = 55.0;

#[derive(Debug)]
pub struct PriorModel {
    sample_rate: f32,
    block_size: usize,
}

impl PriorModel {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            block_size,
        }
    }

    // Seeded so the same walk is rendered on every call.
    fn render_latent_walk(&self, blocks: usize, seed: u64) -> Vec<f32> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(blocks * self.block_size);
        for _ in 0..blocks {
            let latent: Vec<f32> = (0..LATENT_DIMS)
                .map(|_| rng.gen_range(0.0f32..1.0))
                .collect();
            if let Some(block) = self.decode(&latent, self.block_size) {
                out.extend(block);
            }
        }
        out
    }
}

impl ModelAdapter for PriorModel {
    fn name(&self) -> &'static str {
        "prior"
    }

    fn preload(&self) -> Result<(), ModelError> {
        let silence = vec![0.0f32; self.block_size];
        for pass in 0..F_PASS {
            let start = Instant::now();
            let latent = self.encode(&silence);
            let _ = self.decode(&latent, self.block_size);
            debug!(
                "burn-in pass {}/{} took {:?}",
                pass + 1,
                F_PASS,
                start.elapsed()
            );
        }
        Ok(())
    }

    fn latent_dims(&self) -> usize {
        LATENT_DIMS
    }

    fn encode(&self, frame: &[f32]) -> Vec<f32> {
        // RMS over LATENT_DIMS contiguous segments of the frame
        let seg = (frame.len() / LATENT_DIMS).max(1);
        (0..LATENT_DIMS)
            .map(|i| {
                let lo = (i * seg).min(frame.len());
                let hi = ((i + 1) * seg).min(frame.len());
                let band = &frame[lo..hi];
                if band.is_empty() {
                    0.0
                } else {
                    (band.iter().map(|x| x * x).sum::<f32>() / band.len() as f32).sqrt()
                }
            })
            .collect()
    }

    fn decode(&self, latent: &[f32], frames: usize) -> Option<Vec<f32>> {
        let mut out = vec![0.0f32; frames];
        for (i, &amp) in latent.iter().enumerate() {
            if amp == 0.0 {
                continue;
            }
            // snap each harmonic to a whole number of cycles per block so
            // consecutive blocks butt together without a discontinuity
            let freq = BASE_FREQ * (i + 1) as f32;
            let cycles = (freq * frames as f32 / self.sample_rate).round().max(1.0);
            let w = TAU * cycles / frames as f32;
            for (n, sample) in out.iter_mut().enumerate() {
                *sample += amp * (w * n as f32).sin();
            }
        }
        normalize(&mut out);
        Some(out)
    }

    fn generate_random(&self, blocks: usize) -> Option<Vec<f32>> {
        Some(self.render_latent_walk(blocks, 0x9e37_79b9))
    }

    fn generate_prior_random(&self, blocks: usize) -> Vec<f32> {
        self.render_latent_walk(blocks, 0x2545_f491)
    }
}

// Rescale to ±1.0 full scale, removing any DC offset first so an
// asymmetric block does not clip on one side.
fn normalize(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let mut lo = f32::MAX;
    let mut hi = f32::MIN;
    for &s in samples.iter() {
        lo = lo.min(s);
        hi = hi.max(s);
    }
    let mid = (hi + lo) * 0.5;
    let mut amp = hi - lo;
    if amp == 0.0 {
        amp = 0.01;
    }
    let scale = 2.0 / amp;
    for s in samples.iter_mut() {
        *s = (*s - mid) * scale;
    }
}
