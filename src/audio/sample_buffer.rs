use std::path::Path;

use anyhow::bail;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

// Fixed seed so the fallback material is identical run to run.
const NOISE_SEED: u64 = 0x1357_9bdf;

/// Fixed-length mono waveform used as model input material. The streaming
/// pipeline cuts `block_size` slices out of it and loops over the
/// block-aligned prefix; the trailing partial block is never played.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    data: Vec<f32>,
    block_size: usize,
}

impl SampleBuffer {
    pub fn new(data: Vec<f32>, block_size: usize) -> anyhow::Result<Self> {
        if block_size == 0 {
            bail!("block size must be nonzero");
        }
        if data.len() < block_size {
            bail!(
                "material shorter than one block ({} < {})",
                data.len(),
                block_size
            );
        }
        Ok(Self { data, block_size })
    }

    /// Load a WAV file from disk, mixing down to mono and resampling to the
    /// engine rate.
    pub fn load_wav(path: &Path, target_rate: u32, block_size: usize) -> anyhow::Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?
            }
            hound::SampleFormat::Int => {
                let max = (1i32 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        // mixdown: average across channels
        let mut mono: Vec<f32> = if channels <= 1 {
            samples
        } else {
            samples
                .chunks_exact(channels)
                .map(|c| c.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        if spec.sample_rate != target_rate {
            mono = resample_linear(&mono, spec.sample_rate, target_rate);
        }

        Self::new(mono, block_size)
    }

    /// Fallback material when no WAV is configured: uniform noise.
    pub fn noise(len: usize, block_size: usize) -> Self {
        let len = len.max(block_size);
        let mut rng = SmallRng::seed_from_u64(NOISE_SEED);
        let data = (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        Self { data, block_size }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Loop bound: length of the block-aligned prefix.
    pub fn max_idx(&self) -> usize {
        (self.data.len() / self.block_size) * self.block_size
    }

    /// One block starting at `pos`. Callers keep `pos < max_idx()` and
    /// block-aligned, so the slice never runs off the end.
    pub fn slice(&self, pos: usize) -> &[f32] {
        &self.data[pos..pos + self.block_size]
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.data
    }
}

fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        if idx >= samples.len().saturating_sub(1) {
            out.push(samples.last().copied().unwrap_or(0.0));
        } else {
            out.push(samples[idx] * (1.0 - frac) + samples[idx + 1] * frac);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn max_idx_is_block_aligned() {
        let buf = SampleBuffer::new(vec![0.0; 10 * 64 + 17], 64).unwrap();
        assert_eq!(buf.max_idx(), 10 * 64);
        assert_eq!(buf.len(), 10 * 64 + 17);
    }

    #[test]
    fn slice_cuts_exactly_one_block() {
        let data: Vec<f32> = (0..256).map(|i| i as f32).collect();
        let buf = SampleBuffer::new(data, 64).unwrap();
        let block = buf.slice(64);
        assert_eq!(block.len(), 64);
        assert_eq!(block[0], 64.0);
        assert_eq!(block[63], 127.0);
    }

    #[test]
    fn rejects_material_shorter_than_one_block() {
        assert!(SampleBuffer::new(vec![0.0; 63], 64).is_err());
        assert!(SampleBuffer::new(vec![0.0; 64], 0).is_err());
    }

    #[test]
    fn noise_material_is_nonsilent_and_bounded() {
        let buf = SampleBuffer::noise(1024, 256);
        assert_eq!(buf.len(), 1024);
        assert!(buf.slice(0).iter().any(|&s| s != 0.0));
        assert!(buf.slice(0).iter().all(|&s| (-1.0..1.0).contains(&s)));
    }

    #[test]
    fn noise_material_is_reproducible() {
        let a = SampleBuffer::noise(512, 128);
        let b = SampleBuffer::noise(512, 128);
        assert_eq!(a.into_samples(), b.into_samples());
    }

    #[test]
    fn load_wav_mixes_down_and_aligns() {
        let path: PathBuf = std::env::temp_dir().join(format!(
            "neurorack-material-{}.wav",
            std::process::id()
        ));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..512 {
            writer.write_sample(8192i16).unwrap();
            writer.write_sample(-8192i16).unwrap();
        }
        writer.finalize().unwrap();

        let buf = SampleBuffer::load_wav(&path, 48_000, 128).unwrap();
        assert_eq!(buf.len(), 512);
        assert_eq!(buf.max_idx(), 512);
        // left and right cancel in the mixdown
        assert!(buf.slice(0).iter().all(|s| s.abs() < 1e-3));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn resample_changes_length_proportionally() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = resample_linear(&samples, 24_000, 48_000);
        assert_eq!(out.len(), 200);
        // interpolated midpoints sit between neighbours
        assert!((out[1] - 0.5).abs() < 1e-6);
    }
}
