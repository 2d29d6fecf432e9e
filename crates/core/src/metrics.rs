use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for the frame callback path.
///
/// # Example
/// ```rust
/// use acheron_core::metrics::CaptureCounters;
///
/// let counters = CaptureCounters::default();
/// counters.published();
/// assert_eq!(counters.snapshot().published, 1);
/// ```
#[derive(Debug, Default)]
pub struct CaptureCounters {
    published: AtomicU64,
    stale: AtomicU64,
    not_capturing: AtomicU64,
    resubmit_failures: AtomicU64,
    mode_changes: AtomicU64,
}

/// Point-in-time copy of [`CaptureCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CounterSnapshot {
    pub published: u64,
    pub stale: u64,
    pub not_capturing: u64,
    pub resubmit_failures: u64,
    pub mode_changes: u64,
}

impl CaptureCounters {
    /// A frame reached the consumer.
    pub fn published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// A completion named a buffer the pool does not own.
    pub fn stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    /// A completion arrived while the session was not capturing.
    pub fn not_capturing(&self) {
        self.not_capturing.fetch_add(1, Ordering::Relaxed);
    }

    /// Re-chaining a buffer after publish failed.
    pub fn resubmit_failure(&self) {
        self.resubmit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// The driver reported a mode change.
    pub fn mode_change(&self) {
        self.mode_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            published: self.published.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            not_capturing: self.not_capturing.load(Ordering::Relaxed),
            resubmit_failures: self.resubmit_failures.load(Ordering::Relaxed),
            mode_changes: self.mode_changes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_each_counter() {
        let counters = CaptureCounters::default();
        counters.published();
        counters.published();
        counters.stale();
        counters.not_capturing();
        counters.resubmit_failure();
        counters.mode_change();
        assert_eq!(
            counters.snapshot(),
            CounterSnapshot {
                published: 2,
                stale: 1,
                not_capturing: 1,
                resubmit_failures: 1,
                mode_changes: 1,
            }
        );
    }
}
