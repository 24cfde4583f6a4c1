//! Timely runtime helpers.
//!
//! Provides device enumeration and timed playback of a local file.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use cpal::traits::DeviceTrait;

use crate::config::TimelyPlayConfig;
use timely_player::decode::TimedDecoder;
use timely_player::pipeline::{TimedPlaybackOptions, play_timed};
use timely_player::{SyncError, device};

/// List output devices of every host and print them to stdout.
pub fn list_devices() -> Result<()> {
    device::list_devices()
}

/// Play `config.path` so that it starts at `config.start_us`.
///
/// With `install_ctrlc`, the first Ctrl-C cancels the session (the stream is
/// stopped and this returns `Ok`); a second one exits the process.
pub fn run_play(config: TimelyPlayConfig, install_ctrlc: bool) -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    if install_ctrlc {
        let cancel_for_signal = cancel.clone();
        let _ = ctrlc::set_handler(move || {
            if cancel_for_signal.swap(true, Ordering::AcqRel) {
                std::process::exit(130);
            }
        });
    }

    let host = device::pick_host(config.host_api.as_deref())?;
    let device = device::pick_device(&host, config.device.as_deref())?;
    tracing::info!(host = host.id().name(), device = %device.description()?, "output device");

    let decoder = TimedDecoder::open(&config.path)
        .with_context(|| format!("open {}", config.path.display()))?;
    let params = decoder.params();
    tracing::info!(
        path = %config.path.display(),
        codec = decoder.info().codec.as_deref().unwrap_or("unknown"),
        duration_ms = ?decoder.info().duration_ms,
        channels = params.channels,
        rate_hz = params.sample_rate,
        encoding = ?params.encoding,
        "source (local file)"
    );

    let result = play_timed(
        &device,
        decoder,
        &config.sync,
        TimedPlaybackOptions {
            start_us: config.start_us,
            cancel: Some(cancel),
        },
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_cancelled(&e) => {
            tracing::info!("interrupted; playback stopped");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::Cancelled | SyncError::Stopped)
    )
}
