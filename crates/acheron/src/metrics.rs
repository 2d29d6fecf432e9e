use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

const DEFAULT_WINDOW: usize = 120;

/// Rolling timing of one step on the frame path.
///
/// A capture session times every sink publish with one of these, so `fps` is the rate frames
/// actually reach the consumer. Clones share the same window.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use acheron::prelude::StageMetrics;
///
/// let metrics = StageMetrics::default();
/// metrics.record(Duration::from_millis(4));
/// metrics.record(Duration::from_millis(6));
/// assert_eq!(metrics.avg_millis(), Some(5.0));
/// assert_eq!(metrics.total_samples(), 2);
/// ```
#[derive(Clone, Default)]
pub struct StageMetrics {
    window: Arc<Mutex<Window>>,
}

struct Sample {
    at: Instant,
    took: Duration,
}

struct Window {
    samples: VecDeque<Sample>,
    capacity: usize,
    total: u64,
    sum: Duration,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            samples: VecDeque::with_capacity(DEFAULT_WINDOW),
            capacity: DEFAULT_WINDOW,
            total: 0,
            sum: Duration::ZERO,
        }
    }
}

impl Window {
    fn trim(&mut self) {
        while self.samples.len() > self.capacity {
            if let Some(old) = self.samples.pop_front() {
                self.sum = self.sum.saturating_sub(old.took);
            }
        }
    }
}

impl StageMetrics {
    pub fn record(&self, took: Duration) {
        let mut window = self.window.lock();
        window.total += 1;
        window.sum += took;
        window.samples.push_back(Sample {
            at: Instant::now(),
            took,
        });
        window.trim();
    }

    /// Keep only the last `capacity` samples (at least one).
    pub fn set_window_size(&self, capacity: usize) {
        let mut window = self.window.lock();
        window.capacity = capacity.max(1);
        window.trim();
    }

    /// Samples currently in the window.
    pub fn samples(&self) -> usize {
        self.window.lock().samples.len()
    }

    /// Samples recorded since creation.
    pub fn total_samples(&self) -> u64 {
        self.window.lock().total
    }

    pub fn avg_millis(&self) -> Option<f64> {
        let window = self.window.lock();
        let count = window.samples.len();
        (count > 0).then(|| window.sum.as_secs_f64() * 1_000.0 / count as f64)
    }

    pub fn last_millis(&self) -> Option<f64> {
        let window = self.window.lock();
        window.samples.back().map(|s| s.took.as_secs_f64() * 1_000.0)
    }

    /// Samples per second across the window; needs two samples spread over time.
    pub fn fps(&self) -> Option<f64> {
        let window = self.window.lock();
        let (first, last) = (window.samples.front()?, window.samples.back()?);
        let span = last.at.saturating_duration_since(first.at).as_secs_f64();
        (window.samples.len() >= 2 && span > 0.0).then(|| window.samples.len() as f64 / span)
    }
}

impl std::fmt::Debug for StageMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageMetrics")
            .field("samples", &self.samples())
            .field("avg_millis", &self.avg_millis())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_bounded() {
        let metrics = StageMetrics::default();
        metrics.set_window_size(2);
        for ms in [1, 2, 3] {
            metrics.record(Duration::from_millis(ms));
        }
        assert_eq!(metrics.samples(), 2);
        assert_eq!(metrics.total_samples(), 3);
        let avg = metrics.avg_millis().unwrap();
        assert!((avg - 2.5).abs() < 1e-9);
        assert_eq!(metrics.last_millis(), Some(3.0));
    }

    #[test]
    fn shrinking_the_window_drops_oldest() {
        let metrics = StageMetrics::default();
        for ms in [10, 20, 30, 40] {
            metrics.record(Duration::from_millis(ms));
        }
        metrics.set_window_size(1);
        assert_eq!(metrics.avg_millis(), Some(40.0));
    }

    #[test]
    fn clones_share_samples() {
        let metrics = StageMetrics::default();
        metrics.clone().record(Duration::from_micros(500));
        assert_eq!(metrics.samples(), 1);
    }

    #[test]
    fn empty_metrics_report_nothing() {
        let metrics = StageMetrics::default();
        assert_eq!(metrics.avg_millis(), None);
        assert_eq!(metrics.fps(), None);
        assert_eq!(metrics.last_millis(), None);
    }
}
