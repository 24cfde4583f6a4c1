//! Producer side: places decoded blocks on the timeline.
//!
//! The feeder runs on the decode thread and is the only writer of the cyclic
//! buffer. For each block it:
//! 1. converts the target wall-clock time to an offset and smooths it
//! 2. drops the block if that offset has already been played
//! 3. sleeps while writing would overrun audio the device has not consumed yet
//! 4. copies the block into the buffer

use std::thread;

use crate::error::SyncError;
use crate::session::{PlaybackSession, StreamState};
use crate::smoother::DriftSmoother;

/// Counters kept by the feeder for the end-of-playback summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub accepted_blocks: u64,
    pub accepted_bytes: u64,
    pub late_blocks: u64,
    pub late_bytes: u64,
}

pub struct Feeder<'a> {
    session: &'a PlaybackSession,
    predictor: DriftSmoother,
    stats: FeedStats,
}

impl<'a> Feeder<'a> {
    pub(crate) fn new(session: &'a PlaybackSession) -> Self {
        Self {
            predictor: DriftSmoother::new(session.config().max_next_byte_delta),
            session,
            stats: FeedStats::default(),
        }
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    /// Offset a block due at `wall_us` maps to, without smoothing.
    pub fn offset_for(&self, wall_us: i64) -> Result<i64, SyncError> {
        let origin = self.session.origin().ok_or(SyncError::NotSynchronized)?;
        origin
            .offset_from_wall_clock(self.session.params(), wall_us)
            .ok_or(SyncError::OffsetOutOfRange { wall_us })
    }

    /// Schedule `samples` to start sounding at Unix time `target_wall_us`.
    ///
    /// Returns `Ok(false)` when the block is already late; nothing is written in that
    /// case. May block until the device has consumed enough of the buffer.
    pub fn submit(&mut self, samples: &[u8], target_wall_us: i64) -> Result<bool, SyncError> {
        self.session.check_block_len(samples.len())?;
        let calculated = self.offset_for(target_wall_us)?;
        self.session.check_cancelled()?;
        self.session.advance(StreamState::Running);

        let offset = self.predictor.smooth(calculated, samples.len());

        if offset < self.session.stream_offset() {
            self.stats.late_blocks += 1;
            self.stats.late_bytes += samples.len() as u64;
            return Ok(false);
        }

        let capacity = self.session.capacity() as i64;
        let end = offset + samples.len() as i64;
        while self.session.stream_offset() + capacity < end {
            self.session.check_cancelled()?;
            thread::sleep(self.session.config().poll_interval);
        }

        self.session.buffer().write(offset, samples);
        self.stats.accepted_blocks += 1;
        self.stats.accepted_bytes += samples.len() as u64;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ClockOrigin, SampleEncoding, StreamParameters};
    use crate::config::SyncConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const ZERO_US: i64 = 1_000_000;

    fn session(buffer_bytes: usize) -> PlaybackSession {
        let params = StreamParameters::new(44_100, 2, SampleEncoding::I16).unwrap();
        let config = SyncConfig {
            buffer_bytes,
            poll_interval: Duration::from_millis(1),
            ..SyncConfig::default()
        };
        let session = PlaybackSession::new(params, config).unwrap();
        session
            .synchronize(ClockOrigin::new(Duration::ZERO, ZERO_US))
            .unwrap();
        session
    }

    fn read(session: &PlaybackSession, offset: i64, len: usize) -> Vec<u8> {
        let mut out = vec![0xAA; len];
        session.buffer().read_and_clear(offset, &mut out);
        out
    }

    #[test]
    fn extreme_target_time_is_an_error_not_a_wrap() {
        let params = StreamParameters::new(192_000, 2, SampleEncoding::F32).unwrap();
        let session = PlaybackSession::new(params, SyncConfig::default()).unwrap();
        session
            .synchronize(ClockOrigin::new(Duration::ZERO, ZERO_US))
            .unwrap();
        let mut feeder = session.feeder();
        assert_eq!(
            feeder.submit(&[1; 8], i64::MAX),
            Err(SyncError::OffsetOutOfRange { wall_us: i64::MAX })
        );
        assert_eq!(
            feeder.submit(&[1; 8], i64::MIN),
            Err(SyncError::OffsetOutOfRange { wall_us: i64::MIN })
        );
        assert_eq!(feeder.stats(), FeedStats::default());
    }

    #[test]
    fn submit_before_origin_is_an_error() {
        let params = StreamParameters::new(44_100, 2, SampleEncoding::I16).unwrap();
        let session = PlaybackSession::new(params, SyncConfig::default()).unwrap();
        let mut feeder = session.feeder();
        assert_eq!(feeder.submit(&[0; 4], 0), Err(SyncError::NotSynchronized));
    }

    #[test]
    fn oversized_block_is_an_error() {
        let session = session(64);
        let mut feeder = session.feeder();
        assert_eq!(
            feeder.submit(&[1; 68], ZERO_US),
            Err(SyncError::BlockTooLarge {
                len: 68,
                capacity: 64
            })
        );
    }

    #[test]
    fn accepted_block_lands_at_wall_clock_offset() {
        let session = session(8192);
        let mut feeder = session.feeder();
        let block: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();

        assert!(feeder.submit(&block, 1_011_338).unwrap());
        assert_eq!(session.state(), StreamState::Running);
        assert_eq!(read(&session, 2000, 1000), block);
        assert_eq!(feeder.stats().accepted_blocks, 1);
        assert_eq!(feeder.stats().accepted_bytes, 1000);
    }

    #[test]
    fn consecutive_blocks_are_smoothed_together() {
        let session = session(8192);
        let mut feeder = session.feeder();
        // 1000 bytes = 250 samples = 5669.16 µs; round the next target up by 4 µs.
        assert!(feeder.submit(&[1; 1000], 1_011_338).unwrap());
        assert!(feeder.submit(&[2; 1000], 1_011_338 + 5_673).unwrap());
        assert_eq!(read(&session, 2000, 1000), vec![1; 1000]);
        assert_eq!(read(&session, 3000, 1000), vec![2; 1000]);
    }

    #[test]
    fn late_block_is_rejected_without_writing() {
        let session = session(8192);
        session.publish_stream_offset(4000);
        let mut feeder = session.feeder();

        assert!(!feeder.submit(&[7; 400], 1_011_338).unwrap());
        assert_eq!(read(&session, 2000, 400), vec![0; 400]);
        let stats = feeder.stats();
        assert_eq!(stats.late_blocks, 1);
        assert_eq!(stats.late_bytes, 400);
        assert_eq!(stats.accepted_blocks, 0);
    }

    #[test]
    fn block_exactly_at_stream_offset_is_accepted() {
        let session = session(8192);
        session.publish_stream_offset(2000);
        let mut feeder = session.feeder();
        assert!(feeder.submit(&[3; 100], 1_011_338).unwrap());
    }

    #[test]
    fn backpressure_blocks_until_consumer_advances() {
        let session = Arc::new(session(4096));
        let submitted = Arc::new(AtomicBool::new(false));

        let producer_session = session.clone();
        let producer_done = submitted.clone();
        // 8192 bytes = 2048 samples ahead = 46_440 µs; block ends at 8592.
        let handle = std::thread::spawn(move || {
            let mut feeder = producer_session.feeder();
            let accepted = feeder.submit(&[9; 400], ZERO_US + 46_440).unwrap();
            producer_done.store(true, Ordering::SeqCst);
            accepted
        });

        std::thread::sleep(Duration::from_millis(30));
        assert!(!submitted.load(Ordering::SeqCst));
        assert_eq!(read(&session, 8192, 400), vec![0; 400]);

        session.publish_stream_offset(4496);
        assert!(handle.join().unwrap());
        assert!(submitted.load(Ordering::SeqCst));
        assert!(session.stream_offset() + 4096 >= 8192 + 400);
    }

    #[test]
    fn cancel_releases_backpressure_wait() {
        let params = StreamParameters::new(44_100, 2, SampleEncoding::I16).unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let config = SyncConfig {
            buffer_bytes: 1024,
            poll_interval: Duration::from_millis(1),
            ..SyncConfig::default()
        };
        let session = Arc::new(PlaybackSession::with_cancel(params, config, cancel.clone()).unwrap());
        session
            .synchronize(ClockOrigin::new(Duration::ZERO, ZERO_US))
            .unwrap();

        let producer_session = session.clone();
        let handle = std::thread::spawn(move || {
            let mut feeder = producer_session.feeder();
            feeder.submit(&[1; 512], ZERO_US + 1_000_000)
        });

        std::thread::sleep(Duration::from_millis(10));
        cancel.store(true, Ordering::Relaxed);
        assert_eq!(handle.join().unwrap(), Err(SyncError::Cancelled));
        assert_eq!(session.state(), StreamState::Stopped);
    }

    #[test]
    fn submit_after_stop_is_an_error() {
        let session = session(1024);
        session.stop();
        let mut feeder = session.feeder();
        assert_eq!(feeder.submit(&[0; 4], ZERO_US), Err(SyncError::Stopped));
    }
}
