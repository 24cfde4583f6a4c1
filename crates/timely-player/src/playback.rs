//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - captures the clock origin on its first invocation
//! - maps the device timestamp of the requested region onto the byte timeline
//! - copies that region out of the cyclic buffer, clearing it behind itself
//! - publishes the new `stream_offset`
//!
//! ## Real-time constraints
//! Nothing here allocates, locks, sleeps or logs once the stream is running.
//! Unfilled regions come out as silence because read slots are reset.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cpal::traits::DeviceTrait;

use crate::clock::{ClockOrigin, unix_us_now};
use crate::error::SyncError;
use crate::session::PlaybackSession;
use crate::smoother::DriftSmoother;

/// Consumer side of a session. Owned by the audio callback.
pub struct PlaybackCallback {
    session: Arc<PlaybackSession>,
    predictor: DriftSmoother,
}

impl PlaybackCallback {
    pub fn new(session: Arc<PlaybackSession>) -> Self {
        let predictor = DriftSmoother::new(session.config().max_next_byte_delta);
        Self { session, predictor }
    }

    /// Fill `output` with the audio due at `device_time`.
    ///
    /// `output.len()` is the number of requested samples times bytes per sample.
    /// Before the origin is captured the output is silence and nothing advances.
    pub fn render(&mut self, device_time: Duration, output: &mut [u8]) {
        let Some(origin) = self.session.origin() else {
            output.fill(self.session.params().silence_byte());
            return;
        };

        let calculated = origin.offset_from_device_clock(self.session.params(), device_time);
        let offset = self.predictor.smooth(calculated, output.len());

        self.session.buffer().read_and_clear(offset, output);
        self.session
            .publish_stream_offset(offset + output.len() as i64);
    }
}

/// Build a CPAL output stream that plays the session's cyclic buffer.
///
/// The stream carries raw bytes in the session's own sample encoding, so the
/// device config must already match it (see `device::pick_output_config`).
/// The first callback captures the [`ClockOrigin`]: device zero is that callback's
/// instant, wall zero is the Unix time read at the same moment. Losing the device
/// faults the session so the feeder's waits end with [`SyncError::DeviceLost`].
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    session: &Arc<PlaybackSession>,
) -> Result<cpal::Stream> {
    let sample_format = session.params().encoding.cpal_format();
    let mut callback = PlaybackCallback::new(session.clone());
    let session_cb = session.clone();
    let session_err = session.clone();
    let mut anchor: Option<cpal::StreamInstant> = None;

    let err_fn = move |err| handle_stream_error(&session_err, err);

    let stream = device.build_output_stream_raw(
        config,
        sample_format,
        move |data: &mut cpal::Data, info: &cpal::OutputCallbackInfo| {
            let ts = info.timestamp();
            let zero = match anchor {
                Some(zero) => zero,
                None => {
                    anchor = Some(ts.callback);
                    match unix_us_now() {
                        Ok(now) => {
                            let captured =
                                session_cb.synchronize(ClockOrigin::new(Duration::ZERO, now));
                            debug_assert!(captured.is_ok(), "clock origin captured twice");
                        }
                        Err(err) => session_cb.fail(err),
                    }
                    ts.callback
                }
            };
            let device_time = ts.playback.duration_since(&zero).unwrap_or(Duration::ZERO);
            callback.render(device_time, data.bytes_mut());
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

fn handle_stream_error(session: &PlaybackSession, err: cpal::StreamError) {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            tracing::error!("output device disappeared; stopping playback");
            session.fail(SyncError::DeviceLost);
        }
        other => tracing::warn!("stream error: {other}"),
    }
}
