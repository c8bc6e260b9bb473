//! Luba replay: entry point.
//!
//! ```text
//! luba-replay --capture <path>            Replay raw concatenated frames
//! luba-replay --capture <path> --hex      Replay one hex notification per line
//! luba-replay --warm-start <json>         Seed the map cache
//! luba-replay --save <json>               Write the map cache afterwards
//! luba-replay --config <path>             Load a custom config TOML
//! luba-replay --gen-config                Write default config to --config
//! ```

use std::path::PathBuf;

use clap::Parser;
use luba_core::HashList;
use tracing::info;
use tracing_subscriber::EnvFilter;

use luba_replay::config::ReplayConfig;
use luba_replay::replay::{CaptureFormat, replay};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "luba-replay", about = "Replay Luba BLE captures through the protocol core")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "luba-replay.toml")]
    config: PathBuf,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    gen_config: bool,

    /// Capture file to replay.
    #[arg(long, required_unless_present = "gen_config")]
    capture: Option<PathBuf>,

    /// Treat the capture as hex lines instead of raw frames.
    #[arg(long)]
    hex: bool,

    /// Map cache JSON to start from (overrides the config).
    #[arg(long)]
    warm_start: Option<PathBuf>,

    /// Where to save the map cache JSON (overrides the config).
    #[arg(long)]
    save: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: write defaults and exit.
    if cli.gen_config {
        ReplayConfig::write_default(&cli.config)?;
        println!("wrote default config to {}", cli.config.display());
        return Ok(());
    }

    let config = ReplayConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("luba-replay v{}", env!("CARGO_PKG_VERSION"));

    let Some(capture_path) = cli.capture else {
        return Err("--capture is required".into());
    };
    let format = if cli.hex {
        CaptureFormat::Hex
    } else {
        CaptureFormat::Raw
    };

    let warm = match cli.warm_start.or_else(|| config.warm_start_path()) {
        Some(path) => {
            info!("warm start from {}", path.display());
            Some(HashList::load(&path)?)
        }
        None => None,
    };

    info!("replaying {} as {:?}", capture_path.display(), format);
    let capture = tokio::fs::File::open(&capture_path).await?;
    let summary = replay(capture, format, &config, warm).await?;

    print!("{summary}");

    if let Some(path) = cli.save.or_else(|| config.save_path()) {
        summary.map.save(&path)?;
        info!("map cache saved to {}", path.display());
    }

    Ok(())
}
