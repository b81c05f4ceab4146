use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};

mod engine;
mod generator;
mod sample_buffer;
mod session;

pub use engine::AudioEngine;
pub use generator::{BlockGenerator, BufferPlayer, Generator};
pub use sample_buffer::SampleBuffer;
pub use session::{Backend, OutputStream, StreamSession, StreamStats};

use crate::shared::SharedState;

/// The real audio backend: default cpal host and output device, f32 only.
/// Each `open_stream` builds a fresh stream; the block pipeline runs inside
/// the driver callback under the per-block deadline.
pub struct CpalBackend {
    state: Arc<SharedState>,
}

impl CpalBackend {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }
}

impl Backend for CpalBackend {
    fn open_stream(
        &self,
        sample_rate: u32,
        mut generator: Box<dyn Generator>,
        stats: Arc<StreamStats>,
    ) -> anyhow::Result<Box<dyn OutputStream>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no default output device")?;
        let supported = device
            .default_output_config()
            .context("no default output config")?;

        if supported.sample_format() != cpal::SampleFormat::F32 {
            anyhow::bail!(
                "unsupported sample format {:?} (only f32 supported for now)",
                supported.sample_format()
            );
        }

        let mut config: cpal::StreamConfig = supported.into();
        config.sample_rate = sample_rate;
        let channels = config.channels as usize;

        let block = generator.block_size();
        // the driver's period rarely equals our model block, so decoded
        // blocks are carried over between callbacks
        let mut carry: Vec<f32> = Vec::with_capacity(block);
        let mut carry_pos = 0usize;
        let mut scratch = vec![0.0f32; block];

        let cb_stats = stats.clone();
        let cb_state = self.state.clone();

        let err_stats = stats.clone();
        let err_fn = move |err| {
            warn!("audio output stream error: {err}");
            err_stats.mark_done();
        };

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _info| {
                let started = Instant::now();
                let n_frames = data.len() / channels;

                if cb_stats.is_done() {
                    data.fill(0.0);
                    return;
                }

                let mut frame = 0usize;
                while frame < n_frames {
                    if carry_pos >= carry.len() {
                        if !generator.next_block(&mut scratch) {
                            cb_stats.mark_done();
                            data[frame * channels..].fill(0.0);
                            break;
                        }
                        carry.clear();
                        carry.extend_from_slice(&scratch);
                        carry_pos = 0;
                    }
                    let take = (carry.len() - carry_pos).min(n_frames - frame);
                    for k in 0..take {
                        let s = carry[carry_pos + k];
                        // mono content duplicated across device channels
                        for c in 0..channels {
                            data[(frame + k) * channels + c] = s;
                        }
                    }
                    carry_pos += take;
                    frame += take;
                }

                note_render_time(started.elapsed(), n_frames, sample_rate, &cb_stats, &cb_state);
            },
            err_fn,
            None,
        )?;
        stream.play().context("failed to play output stream")?;
        info!("output stream launched ({sample_rate} Hz, block {block})");

        Ok(Box::new(CpalStream {
            _stream: stream,
            stats,
        }))
    }
}

// Soft degradation: a render that overran the callback deadline
// (`frames / sample_rate`) is an audible dropout, counted on both the
// session stats and the shared state but never fatal.
fn note_render_time(
    elapsed: Duration,
    frames: usize,
    sample_rate: u32,
    stats: &StreamStats,
    state: &SharedState,
) {
    let deadline = Duration::from_secs_f64(frames as f64 / sample_rate as f64);
    if elapsed > deadline {
        stats.count_underrun();
        state.count_underrun();
    }
}

struct CpalStream {
    _stream: cpal::Stream,
    stats: Arc<StreamStats>,
}

impl OutputStream for CpalStream {
    fn is_active(&self) -> bool {
        // cpal has no liveness probe; the error callback and the generator
        // sentinel both land in the done flag
        !self.stats.is_done()
    }
}
