//! Fixed-capacity byte storage addressed by timeline offset.
//!
//! [`CyclicBuffer`] holds the only copy of in-flight audio. A timeline offset
//! maps to slot `offset mod capacity`. Slots are atomics so the feeder thread
//! and the real-time callback can touch the buffer without a lock; ordering
//! between the two sides comes from the session's `stream_offset`
//! (release on publish, acquire on observe), so slot accesses are relaxed.
//!
//! Reading a slot resets it to silence, which keeps a wrapped-around read from
//! replaying audio that was already played.

use std::sync::atomic::{AtomicU8, Ordering};

pub struct CyclicBuffer {
    slots: Box<[AtomicU8]>,
    silence: u8,
}

impl CyclicBuffer {
    /// Allocate `capacity` slots, all set to `silence`.
    pub fn new(capacity: usize, silence: u8) -> Self {
        let slots = (0..capacity).map(|_| AtomicU8::new(silence)).collect();
        Self { slots, silence }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn silence(&self) -> u8 {
        self.silence
    }

    fn slot(&self, offset: i64) -> &AtomicU8 {
        let idx = offset.rem_euclid(self.slots.len() as i64) as usize;
        &self.slots[idx]
    }

    /// Copy `bytes` into the slots starting at `offset`.
    ///
    /// The caller must ensure the range does not cover audio the consumer has not
    /// read yet (see the feeder's backpressure wait).
    pub fn write(&self, offset: i64, bytes: &[u8]) {
        debug_assert!(bytes.len() <= self.slots.len());
        for (i, b) in bytes.iter().enumerate() {
            self.slot(offset + i as i64).store(*b, Ordering::Relaxed);
        }
    }

    /// Copy the slots starting at `offset` into `out`, resetting each to silence.
    ///
    /// Allocation-free and lock-free; safe to call from the audio callback.
    pub fn read_and_clear(&self, offset: i64, out: &mut [u8]) {
        for (i, dst) in out.iter_mut().enumerate() {
            let slot = self.slot(offset + i as i64);
            *dst = slot.load(Ordering::Relaxed);
            slot.store(self.silence, Ordering::Relaxed);
        }
    }
}
