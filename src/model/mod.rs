// The generative model behind the engine. Everything past this trait is a
// black box: the engine only ever calls preload / encode / decode /
// generate_random / generate_prior_random. The backend is picked once at
// construction from its config name and never swapped at runtime.

mod prior;

pub use prior::PriorModel;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown model backend `{0}`")]
    Unknown(String),
    #[error("model `{name}` failed to load: {reason}")]
    Load { name: &'static str, reason: String },
}

/// Black-box contract for a generative audio model.
///
/// `decode` and `generate_random` return `None` as an end-of-generation
/// sentinel; the streaming pipeline turns that into a stream stop, never
/// into a panic on the driver thread.
pub trait ModelAdapter: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Load weights and run warm-up passes. May take seconds. A failure
    /// here is fatal to the audio engine — there is no retry.
    fn preload(&self) -> Result<(), ModelError>;

    /// Dimensionality of the latent vector produced by `encode`.
    fn latent_dims(&self) -> usize;

    /// Compress one block of samples into a latent vector of
    /// `latent_dims()` entries.
    fn encode(&self, frame: &[f32]) -> Vec<f32>;

    /// Turn a latent vector back into `frames` audio samples.
    fn decode(&self, latent: &[f32], frames: usize) -> Option<Vec<f32>>;

    /// Generate `blocks` blocks of audio from random latents.
    fn generate_random(&self, blocks: usize) -> Option<Vec<f32>>;

    /// Generate `blocks` blocks of audio by sampling the model prior.
    /// Used by the one-shot playback path.
    fn generate_prior_random(&self, blocks: usize) -> Vec<f32>;
}

/// Resolve a backend by its config name.
pub fn create(
    name: &str,
    sample_rate: u32,
    block_size: usize,
) -> Result<Box<dyn ModelAdapter>, ModelError> {
    match name {
        "prior" => Ok(Box::new(PriorModel::new(sample_rate, block_size))),
        other => Err(ModelError::Unknown(other.to_string())),
    }
}
