//! Error kinds surfaced by the synchronization core.

use thiserror::Error;

/// Errors returned by session setup and the feeder.
///
/// Setup variants are fatal for the caller; the feeder only returns an error when
/// the session can no longer accept audio at all. Late blocks are not errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("invalid stream parameters: {0}")]
    InvalidParameters(&'static str),

    #[error("cyclic buffer of {capacity} bytes is not a positive multiple of {bytes_per_sample} bytes per sample")]
    BufferTooSmall {
        capacity: usize,
        bytes_per_sample: usize,
    },

    #[error("decoded block of {len} bytes does not fit in cyclic buffer of {capacity} bytes")]
    BlockTooLarge { len: usize, capacity: usize },

    #[error("clock origin has not been captured yet")]
    NotSynchronized,

    #[error("clock origin was already captured")]
    AlreadySynchronized,

    #[error("output stream did not start within the sync timeout")]
    SyncTimeout,

    #[error("wall-clock time {wall_us} µs is too far from the clock origin")]
    OffsetOutOfRange { wall_us: i64 },

    #[error("system clock reads before the Unix epoch")]
    ClockBeforeEpoch,

    #[error("output device is no longer available")]
    DeviceLost,

    #[error("playback was cancelled")]
    Cancelled,

    #[error("playback session is stopped")]
    Stopped,
}
