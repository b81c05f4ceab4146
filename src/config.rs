// Construction-time configuration. Device parameters are fixed once the
// engine starts; nothing here is re-negotiated mid-stream.

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

const NEURORACK_DIR: &str = ".neurorack";
const CONFIG_FILE: &str = "config.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames per real-time callback block.
    pub block_size: usize,
    /// Model backend name, resolved once at construction.
    pub model: String,
    /// Optional WAV file used as model input material. When absent the
    /// engine falls back to a generated noise buffer.
    pub material: Option<PathBuf>,
    /// Initial output volume, clamped to `shared::VOLUME_RANGE`.
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 2048,
            model: "prior".to_string(),
            material: None,
            volume: 1.0,
        }
    }
}

// <dir>/.neurorack/config.json
fn config_file_path(dir: &Path) -> PathBuf {
    dir.join(NEURORACK_DIR).join(CONFIG_FILE)
}

/// Load the config for a rack directory, falling back to defaults when the
/// file is missing. A malformed file is reported and ignored rather than
/// aborting startup; the same goes for device parameters no stream could
/// run with (a zero block size would divide by zero in the callback).
pub fn load(dir: &Path) -> AudioConfig {
    let path = config_file_path(dir);
    let Ok(data) = std::fs::read_to_string(&path) else {
        return AudioConfig::default();
    };
    let config: AudioConfig = match serde_json::from_str(&data) {
        Ok(config) => config,
        Err(e) => {
            warn!("ignoring malformed config {}: {e}", path.display());
            return AudioConfig::default();
        }
    };
    if config.block_size == 0 || config.sample_rate == 0 {
        warn!(
            "ignoring config {} with unusable device parameters ({} Hz, block {})",
            path.display(),
            config.sample_rate,
            config.block_size
        );
        return AudioConfig::default();
    }
    config
}

/// Save the config, creating the rack directory if needed.
pub fn save(dir: &Path, config: &AudioConfig) -> anyhow::Result<()> {
    let path = config_file_path(dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}
