//! Jitter smoothing for clock-derived offsets.
//!
//! Clock readings never line up exactly with the byte count the previous call
//! consumed or produced. When a freshly computed offset lands within a small
//! distance of the natural continuation, the continuation wins. Larger gaps
//! (seeks, stream gaps, underruns) pass through untouched.

/// Per-side predictor. Producer and consumer each own one.
#[derive(Clone, Debug)]
pub struct DriftSmoother {
    threshold: i64,
    next_expected: i64,
}

impl DriftSmoother {
    pub fn new(threshold: i64) -> Self {
        Self {
            threshold: threshold.max(0),
            next_expected: 0,
        }
    }

    /// Offset the next call is expected to start at.
    pub fn next_expected(&self) -> i64 {
        self.next_expected
    }

    /// Pick the offset to use for a block of `len` bytes and advance the prediction.
    pub fn smooth(&mut self, calculated: i64, len: usize) -> i64 {
        let used = if (calculated - self.next_expected).abs() <= self.threshold {
            self.next_expected
        } else {
            calculated
        };
        self.next_expected = used + len as i64;
        used
    }
}
