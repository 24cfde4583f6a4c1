//! Clock domains and the shared byte timeline.
//!
//! Two clocks drive playback:
//! - the device clock, reported per output callback
//! - wall-clock (Unix) time, used to say *when* a decoded block must sound
//!
//! Both are mapped onto one infinite byte timeline ("offsets"), anchored at a
//! [`ClockOrigin`] sampled once when output starts.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::SyncError;

const MICROS_PER_SEC: i128 = 1_000_000;

/// Largest offset magnitude handed out. Leaves headroom for `offset + len` and
/// `stream_offset + capacity` in `i64`.
pub const MAX_OFFSET: i64 = 1 << 62;

/// Interleaved PCM sample encodings accepted by the output path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleEncoding {
    U8,
    I16,
    I32,
    F32,
}

impl SampleEncoding {
    /// Width of a single channel sample in bytes.
    pub fn bytes(self) -> usize {
        match self {
            SampleEncoding::U8 => 1,
            SampleEncoding::I16 => 2,
            SampleEncoding::I32 | SampleEncoding::F32 => 4,
        }
    }

    /// Byte pattern of digital silence.
    pub fn silence_byte(self) -> u8 {
        match self {
            SampleEncoding::U8 => 0x80,
            _ => 0x00,
        }
    }

    /// Matching CPAL sample format for the output stream.
    pub fn cpal_format(self) -> cpal::SampleFormat {
        match self {
            SampleEncoding::U8 => cpal::SampleFormat::U8,
            SampleEncoding::I16 => cpal::SampleFormat::I16,
            SampleEncoding::I32 => cpal::SampleFormat::I32,
            SampleEncoding::F32 => cpal::SampleFormat::F32,
        }
    }
}

/// Negotiated stream layout. Every offset computation depends on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamParameters {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl StreamParameters {
    pub fn new(sample_rate: u32, channels: u16, encoding: SampleEncoding) -> Result<Self, SyncError> {
        if sample_rate == 0 {
            return Err(SyncError::InvalidParameters("sample rate must be positive"));
        }
        if channels == 0 {
            return Err(SyncError::InvalidParameters("channel count must be positive"));
        }
        Ok(Self {
            sample_rate,
            channels,
            encoding,
        })
    }

    /// Bytes per sample across all channels (one frame).
    pub fn bytes_per_sample(&self) -> usize {
        self.encoding.bytes() * self.channels as usize
    }

    pub fn silence_byte(&self) -> u8 {
        self.encoding.silence_byte()
    }
}

/// Simultaneous readings of the device clock and wall clock at offset zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockOrigin {
    pub device_clock_at_zero: Duration,
    pub wall_clock_at_zero_us: i64,
}

impl ClockOrigin {
    pub fn new(device_clock_at_zero: Duration, wall_clock_at_zero_us: i64) -> Self {
        Self {
            device_clock_at_zero,
            wall_clock_at_zero_us,
        }
    }

    /// Offset of the sample the device clock `device_time` refers to.
    ///
    /// Truncates to whole samples before scaling to bytes.
    pub fn offset_from_device_clock(&self, params: &StreamParameters, device_time: Duration) -> i64 {
        let secs = device_time.as_secs_f64() - self.device_clock_at_zero.as_secs_f64();
        let samples = (secs * params.sample_rate as f64) as i64;
        samples
            .saturating_mul(params.bytes_per_sample() as i64)
            .clamp(-MAX_OFFSET, MAX_OFFSET)
    }

    /// Offset of the sample that must sound at Unix time `wall_us`.
    ///
    /// Multiplies by the rate before dividing so sub-sample precision survives
    /// until the final truncation. Returns `None` when the result lies beyond
    /// [`MAX_OFFSET`] in either direction.
    pub fn offset_from_wall_clock(&self, params: &StreamParameters, wall_us: i64) -> Option<i64> {
        let elapsed = wall_us as i128 - self.wall_clock_at_zero_us as i128;
        let samples = elapsed * params.sample_rate as i128 / MICROS_PER_SEC;
        let offset = samples * params.bytes_per_sample() as i128;
        if offset.abs() > MAX_OFFSET as i128 {
            return None;
        }
        Some(offset as i64)
    }
}

/// Current Unix time in microseconds.
pub fn unix_us_now() -> Result<i64, SyncError> {
    unix_us_at(SystemTime::now())
}

fn unix_us_at(t: SystemTime) -> Result<i64, SyncError> {
    let since_epoch = t
        .duration_since(UNIX_EPOCH)
        .map_err(|_| SyncError::ClockBeforeEpoch)?;
    i64::try_from(since_epoch.as_micros()).map_err(|_| SyncError::ClockBeforeEpoch)
}
