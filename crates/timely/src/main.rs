//! Timely: plays an audio file so that its first sample sounds at a chosen
//! wall-clock instant.
//!
//! ## Pipeline
//! 1. **Decode**: Symphonia decodes the input into native-endian byte blocks tagged with stream time.
//! 2. **Feed**: each block is written into a cyclic buffer at the byte offset derived
//!    from `start_us + stream time`; blocks that are already late are dropped.
//! 3. **Playback**: the CPAL callback reads the buffer at the offset derived from the
//!    device clock and clears what it played.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use timely::{cli, config::TimelyPlayConfig, runtime};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,timely=info,timely_player=info")
        }))
        .init();

    if args.list_devices {
        runtime::list_devices()?;
    }

    let Some(config) = TimelyPlayConfig::from_args(&args) else {
        return Ok(());
    };
    runtime::run_play(config, true)
}
