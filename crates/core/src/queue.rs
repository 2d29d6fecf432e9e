//! Bounded hand-off between the capture callback and a slower consumer.
//!
//! The producer side never blocks and never fails because the consumer is behind: when the
//! queue is full the oldest entry is evicted so the newest frame always lands.
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam_queue::ArrayQueue;

/// What happened to a pushed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest entry.
    Evicted,
    /// The queue was closed; the value was dropped.
    Closed,
}

/// What a receive attempt produced.
#[derive(Debug)]
pub enum RecvOutcome<T> {
    Data(T),
    /// Closed and fully drained.
    Closed,
    Empty,
}

struct Shared<T> {
    slots: ArrayQueue<T>,
    closed: AtomicBool,
    evicted: AtomicU64,
}

impl<T> Shared<T> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Producer end of a [`frame_queue`].
#[derive(Clone)]
pub struct FrameTx<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FrameTx<T> {
    /// Queue `value`, evicting the oldest entry when full.
    pub fn push(&self, value: T) -> PushOutcome {
        if self.shared.is_closed() {
            return PushOutcome::Closed;
        }
        if self.shared.slots.force_push(value).is_some() {
            self.shared.evicted.fetch_add(1, Ordering::Relaxed);
            return PushOutcome::Evicted;
        }
        PushOutcome::Queued
    }

    /// Entries evicted so far.
    pub fn evicted(&self) -> u64 {
        self.shared.evicted.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.shared.close();
    }
}

/// Consumer end of a [`frame_queue`].
#[derive(Clone)]
pub struct FrameRx<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FrameRx<T> {
    /// Take the oldest entry without blocking.
    ///
    /// Entries queued before the queue was closed are still handed out.
    pub fn recv(&self) -> RecvOutcome<T> {
        if let Some(value) = self.shared.slots.pop() {
            return RecvOutcome::Data(value);
        }
        if self.shared.is_closed() {
            RecvOutcome::Closed
        } else {
            RecvOutcome::Empty
        }
    }

    /// Poll every `poll` until an entry arrives, the queue closes or `timeout` passes.
    pub fn recv_timeout(&self, timeout: Duration, poll: Duration) -> RecvOutcome<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let outcome = self.recv();
            if !matches!(outcome, RecvOutcome::Empty) || Instant::now() >= deadline {
                return outcome;
            }
            if poll.is_zero() {
                std::thread::yield_now();
            } else {
                std::thread::sleep(poll);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.slots.is_empty()
    }

    /// Refuse further pushes; already queued entries stay receivable.
    pub fn close(&self) {
        self.shared.close();
    }
}

/// Create a queue holding at most `capacity` entries (at least one).
///
/// # Example
/// ```rust
/// use acheron_core::prelude::{PushOutcome, RecvOutcome, frame_queue};
///
/// let (tx, rx) = frame_queue::<u32>(1);
/// assert_eq!(tx.push(1), PushOutcome::Queued);
/// assert_eq!(tx.push(2), PushOutcome::Evicted);
/// tx.close();
/// assert!(matches!(rx.recv(), RecvOutcome::Data(2)));
/// assert!(matches!(rx.recv(), RecvOutcome::Closed));
/// ```
pub fn frame_queue<T>(capacity: usize) -> (FrameTx<T>, FrameRx<T>) {
    let shared = Arc::new(Shared {
        slots: ArrayQueue::new(capacity.max(1)),
        closed: AtomicBool::new(false),
        evicted: AtomicU64::new(0),
    });
    let tx = FrameTx {
        shared: Arc::clone(&shared),
    };
    (tx, FrameRx { shared })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_evicts_oldest() {
        let (tx, rx) = frame_queue::<u32>(2);
        assert_eq!(tx.push(1), PushOutcome::Queued);
        assert_eq!(tx.push(2), PushOutcome::Queued);
        assert_eq!(tx.push(3), PushOutcome::Evicted);
        assert_eq!(tx.evicted(), 1);
        assert_eq!(rx.len(), 2);
        assert!(matches!(rx.recv(), RecvOutcome::Data(2)));
        assert!(matches!(rx.recv(), RecvOutcome::Data(3)));
        assert!(matches!(rx.recv(), RecvOutcome::Empty));
    }

    #[test]
    fn closing_from_the_consumer_stops_producers() {
        let (tx, rx) = frame_queue::<u32>(1);
        rx.close();
        assert_eq!(tx.push(1), PushOutcome::Closed);
        assert!(rx.is_empty());
        assert!(matches!(rx.recv(), RecvOutcome::Closed));
    }

    #[test]
    fn recv_timeout_gives_up_when_empty() {
        let (_tx, rx) = frame_queue::<u32>(1);
        let out = rx.recv_timeout(Duration::from_millis(5), Duration::from_millis(1));
        assert!(matches!(out, RecvOutcome::Empty));
    }

    #[test]
    fn recv_timeout_sees_a_late_push() {
        let (tx, rx) = frame_queue::<u32>(1);
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(2));
            tx.push(5)
        });
        let out = rx.recv_timeout(Duration::from_secs(5), Duration::ZERO);
        assert!(matches!(out, RecvOutcome::Data(5)));
        assert_eq!(producer.join().unwrap(), PushOutcome::Queued);
    }
}
