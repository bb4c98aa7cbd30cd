//! Latency recorder.
//!
//! Thin facade over the histogram sink: record one non-negative duration
//! per completed step, answer percentile queries at the end.

use std::time::Duration;

use hdrhistogram::Histogram;

/// Records per-step round-trip durations and answers percentile queries.
pub struct LatencyRecorder {
    hist: Histogram<u64>,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyRecorder {
    /// Create an auto-resizing recorder with 3 significant figures.
    pub fn new() -> Self {
        let mut hist = Histogram::new(3).expect("3 significant figures is valid");
        hist.auto(true);
        Self { hist }
    }

    /// Record one sample.
    pub fn record(&mut self, sample: Duration) {
        self.hist.saturating_record(sample.as_nanos() as u64);
    }

    /// Duration at the given percentile, `p` in `[0, 100]`.
    pub fn percentile(&self, p: f64) -> Duration {
        Duration::from_nanos(self.hist.value_at_percentile(p))
    }

    /// Number of recorded samples.
    pub fn len(&self) -> u64 {
        self.hist.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.hist.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_sample_per_record() {
        let mut rec = LatencyRecorder::new();
        assert!(rec.is_empty());
        rec.record(Duration::from_micros(10));
        rec.record(Duration::from_micros(20));
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn percentiles_are_non_decreasing() {
        let mut rec = LatencyRecorder::new();
        for us in [5u64, 10, 20, 40, 80, 160, 320, 640] {
            rec.record(Duration::from_micros(us));
        }
        let p50 = rec.percentile(50.0);
        let p95 = rec.percentile(95.0);
        let p99 = rec.percentile(99.0);
        let p999 = rec.percentile(99.9);
        assert!(p50 <= p95);
        assert!(p95 <= p99);
        assert!(p99 <= p999);
    }
}
