use std::path::PathBuf;

use log::info;

use neurorack::config;
use neurorack::rack::Rack;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let dir: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let config = config::load(&dir);
    info!(
        "starting neurorack (model `{}`, {} Hz, block {})",
        config.model, config.sample_rate, config.block_size
    );

    let mut rack = Rack::new(config);
    rack.start()?;
    rack.join();
    Ok(())
}
