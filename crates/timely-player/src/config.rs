use std::time::Duration;

/// Tuning knobs for a timed playback session.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Cyclic buffer capacity in bytes.
    ///
    /// Bounds how far ahead of the device the feeder may write.
    pub buffer_bytes: usize,
    /// Largest offset discrepancy (bytes) the drift smoother collapses onto the
    /// predicted continuation.
    pub max_next_byte_delta: i64,
    /// Sleep between checks while waiting for buffer space or for the drain.
    pub poll_interval: Duration,
    /// Output latency requested from the device.
    pub suggested_latency: Duration,
    /// How far before the computed start position the decoder seeks, in µs.
    pub seek_safety_us: i64,
    /// How long startup waits for the first device callback.
    pub sync_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            buffer_bytes: 4 * 1024 * 1024,
            max_next_byte_delta: 32,
            poll_interval: Duration::from_millis(100),
            suggested_latency: Duration::from_millis(50),
            seek_safety_us: 1_000_000,
            sync_timeout: Duration::from_secs(5),
        }
    }
}
