//! Timed playback wiring: decode → feeder → cyclic buffer → output callback.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;

use crate::clock::{ClockOrigin, StreamParameters};
use crate::config::SyncConfig;
use crate::decode::TimedDecoder;
use crate::error::SyncError;
use crate::feeder::FeedStats;
use crate::session::PlaybackSession;
use crate::{device, playback};

/// Log the first late drop, then every Nth.
const LATE_LOG_EVERY: u64 = 100;

/// Optional knobs for a single timed run.
pub struct TimedPlaybackOptions {
    /// Wall-clock µs at which the first sample of the file sounds; `None` means
    /// "when output starts".
    pub start_us: Option<i64>,
    /// Optional cancel flag (e.g. Ctrl-C) that aborts the feeder's waits.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Play the already opened `decoder` on `device` so that each block sounds at
/// `start + stream time`, then wait for the device to drain and stop.
pub fn play_timed(
    device: &cpal::Device,
    mut decoder: TimedDecoder,
    config: &SyncConfig,
    opts: TimedPlaybackOptions,
) -> Result<FeedStats> {
    let params = decoder.params();
    let cancel = opts.cancel.unwrap_or_default();
    let session = Arc::new(PlaybackSession::with_cancel(params, config.clone(), cancel)?);
    if let Some(max) = decoder.max_block_bytes() {
        session
            .check_block_len(max)
            .context("single decoded frame does not fit in the cyclic buffer")?;
    }

    let supported = device::pick_output_config(device, &params)?;
    let mut stream_config: cpal::StreamConfig = supported.clone().into();
    if let Some(buf) = device::pick_buffer_size(&supported, config.suggested_latency) {
        stream_config.buffer_size = buf;
    }
    tracing::info!(
        rate_hz = params.sample_rate,
        channels = params.channels,
        encoding = ?params.encoding,
        buffer_size = ?stream_config.buffer_size,
        capacity_bytes = session.capacity(),
        "output stream config"
    );

    let stream = playback::build_output_stream(device, &stream_config, &session)
        .context("open output stream")?;
    stream.play().context("start output stream")?;

    let origin = session.wait_synchronized(config.sync_timeout)?;
    let start_us = resolve_start_us(&origin, &params, opts.start_us)?;
    tracing::info!(
        zero_unix_us = origin.wall_clock_at_zero_us,
        start_us,
        "clock origin captured"
    );

    decoder.seek_to_us(seek_target_us(&origin, start_us, config.seek_safety_us))?;

    let mut feeder = session.feeder();
    let mut end_offset = 0i64;
    while let Some(block) = decoder.next_block()? {
        let play_us = start_us
            .checked_add(block.stream_us)
            .ok_or(SyncError::OffsetOutOfRange { wall_us: start_us })?;
        let accepted = feeder.submit(block.bytes, play_us)?;
        if !accepted {
            let late = feeder.stats().late_blocks;
            if late == 1 || late % LATE_LOG_EVERY == 0 {
                tracing::warn!(play_us, late_blocks = late, "block arrived too late, dropped");
            }
        } else {
            tracing::debug!(play_us, bytes = block.bytes.len(), "block queued");
        }
        end_offset = feeder.offset_for(play_us)? + block.bytes.len() as i64;
    }
    let stats = feeder.stats();

    tracing::info!(end_offset, "input finished; draining");
    session.wait_until_played(end_offset)?;

    stream.pause().context("stop output stream")?;
    session.stop();
    drop(stream);

    tracing::info!(
        accepted_blocks = stats.accepted_blocks,
        accepted_bytes = stats.accepted_bytes,
        late_blocks = stats.late_blocks,
        late_bytes = stats.late_bytes,
        "playback finished"
    );
    Ok(stats)
}

/// Wall-clock µs the file starts at: `requested`, or the origin's wall time.
///
/// Rejects start times whose offset cannot be represented, before any audio is fed.
pub fn resolve_start_us(
    origin: &ClockOrigin,
    params: &StreamParameters,
    requested: Option<i64>,
) -> Result<i64, SyncError> {
    let start_us = requested.unwrap_or(origin.wall_clock_at_zero_us);
    origin
        .offset_from_wall_clock(params, start_us)
        .map(|_| start_us)
        .ok_or(SyncError::OffsetOutOfRange { wall_us: start_us })
}

/// Stream position (µs) to start decoding from.
///
/// Starts `safety_us` early so the first block that is still on time is not
/// skipped by the seek. Never negative.
pub fn seek_target_us(origin: &ClockOrigin, start_us: i64, safety_us: i64) -> i64 {
    let target = origin.wall_clock_at_zero_us as i128 - start_us as i128 - safety_us as i128;
    target.clamp(0, i64::MAX as i128) as i64
}
