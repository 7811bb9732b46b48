//! Ordered collector (§4.F): accepts out-of-order results keyed by position
//! and emits them in strictly increasing position order.
//!
//! A bounded min-heap holds results that have arrived ahead of the cursor;
//! each `submit` pops and emits every entry that's now contiguous with
//! `next_position`. Emission is pull-driven through a bounded channel so a
//! slow consumer backpressures producers, rather than through a `stream()`
//! method returning an iterator over `self` — `new` returns the receiver
//! half directly, the idiomatic Rust shape for this (mirrors
//! `tokio::sync::mpsc::channel`'s own split construction).
//!
//! The pop-then-send has to be one atomic step with respect to other
//! submitters, not just the pop: two concurrent `submit`s for adjacent
//! positions each popping their own single-element batch and then racing on
//! `tx.send` could deliver them out of order. `inner` is therefore a
//! `tokio::sync::Mutex` held across the `send().await` calls, not released
//! after the pop.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Mutex as StdMutex;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

struct PendingEntry<T> {
    position: u32,
    value: T,
}

impl<T> PartialEq for PendingEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}
impl<T> Eq for PendingEntry<T> {}
impl<T> PartialOrd for PendingEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for PendingEntry<T> {
    // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on position.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.position.cmp(&self.position)
    }
}

struct Inner<T> {
    heap: BinaryHeap<PendingEntry<T>>,
    next_position: u32,
}

/// Collects results keyed by position and releases them to its paired
/// receiver in strictly increasing order, starting from 1.
pub struct OrderedCollector<T> {
    inner: Mutex<Inner<T>>,
    tx: mpsc::Sender<(u32, T)>,
    expected: StdMutex<Option<u32>>,
}

impl<T: Send + 'static> OrderedCollector<T> {
    /// `capacity` bounds the channel the caller reads completed results
    /// from; a full channel makes `submit` wait, which is how a slow sink
    /// backpressures the orchestrator's workers.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(u32, T)>) {
        Self::resuming_from(capacity, 1)
    }

    /// Like [`Self::new`], but the cursor starts at `next_position` instead
    /// of 1 — for resuming a batch whose lower positions already completed
    /// (and were already emitted) in a prior run.
    pub fn resuming_from(capacity: usize, next_position: u32) -> (Self, mpsc::Receiver<(u32, T)>) {
        let (tx, rx) = mpsc::channel(capacity);
        let collector = Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_position,
            }),
            tx,
            expected: StdMutex::new(None),
        };
        (collector, rx)
    }

    pub fn set_expected(&self, n: u32) {
        *self.expected.lock().unwrap() = Some(n);
    }

    /// Submits `value` for `position`. A failed result is submitted the same
    /// as a succeeded one — ordering doesn't distinguish outcome.
    ///
    /// Holds `inner` across the channel sends below, not just the pop: two
    /// concurrent submitters popping disjoint ready batches and then racing
    /// on `tx.send` could otherwise deliver an earlier position after a
    /// later one.
    pub async fn submit(&self, position: u32, value: T) {
        let mut inner = self.inner.lock().await;
        inner.heap.push(PendingEntry { position, value });

        while let Some(top) = inner.heap.peek() {
            if top.position == inner.next_position {
                let entry = inner.heap.pop().unwrap();
                inner.next_position += 1;
                if self.tx.send((entry.position, entry.value)).await.is_err() {
                    // Receiver dropped; nothing left to backpressure against.
                    break;
                }
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_in_order_despite_reverse_submission() {
        let (collector, mut rx) = OrderedCollector::new(8);
        collector.submit(3, "c").await;
        collector.submit(1, "a").await;
        collector.submit(2, "b").await;

        assert_eq!(rx.recv().await, Some((1, "a")));
        assert_eq!(rx.recv().await, Some((2, "b")));
        assert_eq!(rx.recv().await, Some((3, "c")));
    }

    #[tokio::test]
    async fn holds_back_until_gap_fills() {
        let (collector, mut rx) = OrderedCollector::new(8);
        collector.submit(2, "b").await;
        assert!(rx.try_recv().is_err());

        collector.submit(1, "a").await;
        assert_eq!(rx.recv().await, Some((1, "a")));
        assert_eq!(rx.recv().await, Some((2, "b")));
    }

    #[tokio::test]
    async fn concurrent_submits_still_emit_in_order() {
        use std::sync::Arc;
        let (collector, mut rx) = OrderedCollector::new(16);
        let collector = Arc::new(collector);

        let mut handles = Vec::new();
        for position in (1..=10u32).rev() {
            let collector = collector.clone();
            handles.push(tokio::spawn(async move {
                collector.submit(position, position * 10).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(rx.recv().await.unwrap().0);
        }
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());
    }
}
