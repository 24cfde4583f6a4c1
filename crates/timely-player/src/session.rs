//! Shared state of one timed output stream.
//!
//! A [`PlaybackSession`] is built once per stream and shared by reference between
//! the feeder (non-real-time) and the playback callback (real-time). It owns:
//! - the negotiated [`StreamParameters`]
//! - the [`ClockOrigin`], captured exactly once
//! - the [`CyclicBuffer`]
//! - `stream_offset`, the "played up to here" boundary published by the callback
//! - the one-directional [`StreamState`]
//! - the first fault reported by the output side, if any
//!
//! Nothing on the real-time path takes a lock or allocates. The origin lives in a
//! `OnceLock` whose readers never block, and all other shared fields are atomics.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::clock::{ClockOrigin, StreamParameters};
use crate::config::SyncConfig;
use crate::cyclic::CyclicBuffer;
use crate::error::SyncError;
use crate::feeder::Feeder;

const SYNC_POLL: Duration = Duration::from_millis(1);

/// Lifecycle of a session. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum StreamState {
    Uninitialized = 0,
    Synchronized = 1,
    Running = 2,
    Draining = 3,
    Stopped = 4,
}

impl StreamState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => StreamState::Uninitialized,
            1 => StreamState::Synchronized,
            2 => StreamState::Running,
            3 => StreamState::Draining,
            _ => StreamState::Stopped,
        }
    }
}

pub struct PlaybackSession {
    params: StreamParameters,
    config: SyncConfig,
    buffer: CyclicBuffer,
    origin: OnceLock<ClockOrigin>,
    stream_offset: AtomicI64,
    state: AtomicU8,
    cancel: Arc<AtomicBool>,
    fault: OnceLock<SyncError>,
}

impl PlaybackSession {
    /// Validate parameters and allocate a silence-filled buffer.
    pub fn new(params: StreamParameters, config: SyncConfig) -> Result<Self, SyncError> {
        Self::with_cancel(params, config, Arc::new(AtomicBool::new(false)))
    }

    /// Like [`PlaybackSession::new`], with an external cancel flag (e.g. set by Ctrl-C)
    /// that aborts the feeder's waits.
    pub fn with_cancel(
        params: StreamParameters,
        config: SyncConfig,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self, SyncError> {
        let bytes_per_sample = params.bytes_per_sample();
        let capacity = config.buffer_bytes;
        if capacity == 0 || capacity % bytes_per_sample != 0 {
            return Err(SyncError::BufferTooSmall {
                capacity,
                bytes_per_sample,
            });
        }
        if config.max_next_byte_delta < 0 {
            return Err(SyncError::InvalidParameters(
                "smoothing threshold must not be negative",
            ));
        }

        Ok(Self {
            buffer: CyclicBuffer::new(capacity, params.silence_byte()),
            params,
            config,
            origin: OnceLock::new(),
            stream_offset: AtomicI64::new(0),
            state: AtomicU8::new(StreamState::Uninitialized as u8),
            cancel,
            fault: OnceLock::new(),
        })
    }

    pub fn params(&self) -> &StreamParameters {
        &self.params
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub(crate) fn buffer(&self) -> &CyclicBuffer {
        &self.buffer
    }

    /// Fail fast when a block of `len` bytes could never fit in the buffer.
    pub fn check_block_len(&self, len: usize) -> Result<(), SyncError> {
        if len > self.capacity() {
            return Err(SyncError::BlockTooLarge {
                len,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Capture the clock origin. Only the first call succeeds.
    pub fn synchronize(&self, origin: ClockOrigin) -> Result<(), SyncError> {
        self.origin
            .set(origin)
            .map_err(|_| SyncError::AlreadySynchronized)?;
        self.advance(StreamState::Synchronized);
        Ok(())
    }

    pub fn origin(&self) -> Option<&ClockOrigin> {
        self.origin.get()
    }

    /// Block until the origin is captured, the timeout expires, or the session is
    /// cancelled or faulted.
    pub fn wait_synchronized(&self, timeout: Duration) -> Result<ClockOrigin, SyncError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(origin) = self.origin.get() {
                return Ok(*origin);
            }
            self.check_cancelled()?;
            if Instant::now() >= deadline {
                return Err(SyncError::SyncTimeout);
            }
            thread::sleep(SYNC_POLL);
        }
    }

    /// Offset up to which the device has consumed the buffer.
    pub fn stream_offset(&self) -> i64 {
        self.stream_offset.load(Ordering::Acquire)
    }

    /// Publish a new played-up-to boundary. Never moves backwards.
    pub(crate) fn publish_stream_offset(&self, offset: i64) {
        self.stream_offset.fetch_max(offset, Ordering::AcqRel);
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `to` unless the session is already past it. Returns the previous state.
    pub(crate) fn advance(&self, to: StreamState) -> StreamState {
        StreamState::from_u8(self.state.fetch_max(to as u8, Ordering::AcqRel))
    }

    /// Producer handle with its own drift predictor.
    pub fn feeder(&self) -> Feeder<'_> {
        Feeder::new(self)
    }

    /// Mark the session stopped. Pending and future waits return early.
    pub fn stop(&self) {
        self.advance(StreamState::Stopped);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Record a fault that makes the stream unusable and stop the session.
    ///
    /// Safe to call from the audio thread. Only the first fault is kept; waits
    /// return it instead of [`SyncError::Stopped`].
    pub fn fail(&self, err: SyncError) {
        let _ = self.fault.set(err);
        self.stop();
    }

    pub fn fault(&self) -> Option<&SyncError> {
        self.fault.get()
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), SyncError> {
        if let Some(err) = self.fault.get() {
            return Err(err.clone());
        }
        if self.is_cancelled() {
            self.stop();
            return Err(SyncError::Cancelled);
        }
        if self.state() == StreamState::Stopped {
            return Err(SyncError::Stopped);
        }
        Ok(())
    }

    /// Block until the device has played past `end_offset`.
    ///
    /// Moves the session into [`StreamState::Draining`] for the duration of the wait.
    pub fn wait_until_played(&self, end_offset: i64) -> Result<(), SyncError> {
        self.advance(StreamState::Draining);
        while self.stream_offset() < end_offset {
            self.check_cancelled()?;
            thread::sleep(self.config.poll_interval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SampleEncoding;

    fn params() -> StreamParameters {
        StreamParameters::new(44_100, 2, SampleEncoding::I16).unwrap()
    }

    fn config(buffer_bytes: usize) -> SyncConfig {
        SyncConfig {
            buffer_bytes,
            poll_interval: Duration::from_millis(1),
            ..SyncConfig::default()
        }
    }

    #[test]
    fn rejects_buffer_not_multiple_of_frame() {
        let err = PlaybackSession::new(params(), config(1023)).err();
        assert_eq!(
            err,
            Some(SyncError::BufferTooSmall {
                capacity: 1023,
                bytes_per_sample: 4
            })
        );
        assert!(PlaybackSession::new(params(), config(0)).is_err());
    }

    #[test]
    fn rejects_negative_threshold() {
        let mut cfg = config(1024);
        cfg.max_next_byte_delta = -1;
        assert!(PlaybackSession::new(params(), cfg).is_err());
    }

    #[test]
    fn check_block_len_fails_fast_for_oversized_blocks() {
        let session = PlaybackSession::new(params(), config(1024)).unwrap();
        assert!(session.check_block_len(1024).is_ok());
        assert_eq!(
            session.check_block_len(1025),
            Err(SyncError::BlockTooLarge {
                len: 1025,
                capacity: 1024
            })
        );
    }

    #[test]
    fn synchronize_only_once() {
        let session = PlaybackSession::new(params(), config(1024)).unwrap();
        assert_eq!(session.state(), StreamState::Uninitialized);
        assert!(session.origin().is_none());

        let origin = ClockOrigin::new(Duration::ZERO, 42);
        session.synchronize(origin).unwrap();
        assert_eq!(session.state(), StreamState::Synchronized);
        assert_eq!(session.origin(), Some(&origin));

        let again = session.synchronize(ClockOrigin::new(Duration::ZERO, 7));
        assert_eq!(again, Err(SyncError::AlreadySynchronized));
        assert_eq!(session.origin(), Some(&origin));
    }

    #[test]
    fn states_only_move_forward() {
        let session = PlaybackSession::new(params(), config(1024)).unwrap();
        session.advance(StreamState::Draining);
        assert_eq!(session.advance(StreamState::Running), StreamState::Draining);
        assert_eq!(session.state(), StreamState::Draining);
        session.stop();
        session.advance(StreamState::Synchronized);
        assert_eq!(session.state(), StreamState::Stopped);
    }

    #[test]
    fn stream_offset_never_decreases() {
        let session = PlaybackSession::new(params(), config(1024)).unwrap();
        session.publish_stream_offset(400);
        session.publish_stream_offset(100);
        assert_eq!(session.stream_offset(), 400);
        session.publish_stream_offset(800);
        assert_eq!(session.stream_offset(), 800);
    }

    #[test]
    fn wait_synchronized_times_out() {
        let session = PlaybackSession::new(params(), config(1024)).unwrap();
        let err = session.wait_synchronized(Duration::from_millis(5));
        assert_eq!(err, Err(SyncError::SyncTimeout));
    }

    #[test]
    fn wait_synchronized_sees_origin_from_other_thread() {
        let session = Arc::new(PlaybackSession::new(params(), config(1024)).unwrap());
        let cb = session.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            cb.synchronize(ClockOrigin::new(Duration::ZERO, 99)).unwrap();
        });
        let origin = session.wait_synchronized(Duration::from_secs(5)).unwrap();
        assert_eq!(origin.wall_clock_at_zero_us, 99);
        handle.join().unwrap();
    }

    #[test]
    fn wait_until_played_returns_once_offset_reached() {
        let session = Arc::new(PlaybackSession::new(params(), config(1024)).unwrap());
        let cb = session.clone();
        let handle = thread::spawn(move || {
            for step in 1..=10 {
                thread::sleep(Duration::from_millis(1));
                cb.publish_stream_offset(step * 100);
            }
        });
        session.wait_until_played(1000).unwrap();
        assert!(session.stream_offset() >= 1000);
        assert_eq!(session.state(), StreamState::Draining);
        handle.join().unwrap();
    }

    #[test]
    fn cancel_aborts_drain() {
        let cancel = Arc::new(AtomicBool::new(true));
        let session = PlaybackSession::with_cancel(params(), config(1024), cancel).unwrap();
        assert_eq!(session.wait_until_played(1), Err(SyncError::Cancelled));
        assert_eq!(session.state(), StreamState::Stopped);
    }

    #[test]
    fn fault_aborts_drain_with_its_error() {
        let session = Arc::new(PlaybackSession::new(params(), config(1024)).unwrap());
        let cb = session.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            cb.fail(SyncError::DeviceLost);
        });
        assert_eq!(session.wait_until_played(1000), Err(SyncError::DeviceLost));
        assert_eq!(session.state(), StreamState::Stopped);
        handle.join().unwrap();
    }

    #[test]
    fn first_fault_wins_and_ends_sync_wait() {
        let session = PlaybackSession::new(params(), config(1024)).unwrap();
        session.fail(SyncError::ClockBeforeEpoch);
        session.fail(SyncError::DeviceLost);
        assert_eq!(session.fault(), Some(&SyncError::ClockBeforeEpoch));
        assert_eq!(
            session.wait_synchronized(Duration::from_secs(5)),
            Err(SyncError::ClockBeforeEpoch)
        );
    }
}
