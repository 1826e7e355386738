// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Byte-budgeted, thread-safe FIFO of rendered events.
//!
//! # Admission
//!
//! An incoming event is rejected when:
//! 1. **Per-event limit**: it alone is larger than `log_event_limit_bytes`
//! 2. **Queue limit**: admitting it would push the queued total past `queue_limit_bytes`
//!
//! Rejection drops the *newest* event. Events already queued are never evicted
//! to make room, so under sustained overload the oldest data survives.
//!
//! # Extraction
//!
//! [`BoundedQueue::try_dequeue_batch`] removes the longest prefix of the queue
//! that fits both the count bound and the byte bound. It is first-fit
//! sequential: it stops at the first event that does not fit even when a later,
//! smaller event would.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::event::RenderedEvent;

/// Result of [`BoundedQueue::enqueue`]. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The event exceeded the per-event byte limit.
    OversizeDrop,
    /// The queue byte budget had no room for the event.
    OverflowDrop,
}

/// Point-in-time view of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub events: usize,
    pub bytes: usize,
    pub dropped_oversize: u64,
    pub dropped_overflow: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<RenderedEvent>,
    total_bytes: usize,
}

/// Insertion-ordered buffer of [`RenderedEvent`] guarded by a single mutex.
///
/// Every operation holds the lock only for in-memory bookkeeping, never across
/// I/O, so producers on any thread can enqueue while a flush is in progress.
#[derive(Debug)]
pub struct BoundedQueue {
    state: Mutex<QueueState>,
    queue_limit_bytes: Option<usize>,
    log_event_limit_bytes: Option<usize>,
    dropped_oversize: AtomicU64,
    dropped_overflow: AtomicU64,
}

impl BoundedQueue {
    /// Creates an empty queue. `None` disables the corresponding limit.
    #[must_use]
    pub fn new(queue_limit_bytes: Option<usize>, log_event_limit_bytes: Option<usize>) -> Self {
        BoundedQueue {
            state: Mutex::new(QueueState::default()),
            queue_limit_bytes,
            log_event_limit_bytes,
            dropped_oversize: AtomicU64::new(0),
            dropped_overflow: AtomicU64::new(0),
        }
    }

    // The state is consistent between any two statements that touch it, so a
    // panic in another holder leaves nothing half-written.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `event` unless one of the byte limits rejects it.
    pub fn enqueue(&self, event: RenderedEvent) -> EnqueueOutcome {
        let size = event.byte_len();

        if self.log_event_limit_bytes.is_some_and(|limit| size > limit) {
            self.dropped_oversize.fetch_add(1, Ordering::Relaxed);
            trace!("Dropping log event of {size} bytes: exceeds per-event limit");
            return EnqueueOutcome::OversizeDrop;
        }

        let mut state = self.lock();
        if let Some(limit) = self.queue_limit_bytes {
            if state.total_bytes + size > limit {
                drop(state);
                self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
                trace!("Dropping log event of {size} bytes: queue limit of {limit} bytes reached");
                return EnqueueOutcome::OverflowDrop;
            }
        }

        state.total_bytes += size;
        state.events.push_back(event);
        EnqueueOutcome::Enqueued
    }

    /// Removes and returns the oldest events that fit within both bounds.
    ///
    /// # Batching Rules
    ///
    /// Events are taken from the front until one of these holds:
    /// 1. **Count limit**: `max_count` events were taken
    /// 2. **Size limit**: the next event would push the batch past `max_bytes`
    /// 3. **Queue empty**
    ///
    /// Only event bytes count towards `max_bytes`; whatever framing the batch
    /// formatter adds later is not included.
    ///
    /// A first event that alone exceeds `max_bytes` is returned on its own, so
    /// it cannot block the queue forever.
    pub fn try_dequeue_batch(
        &self,
        max_count: Option<usize>,
        max_bytes: Option<usize>,
    ) -> Vec<RenderedEvent> {
        if max_count == Some(0) {
            return Vec::new();
        }

        let mut state = self.lock();

        let mut taken = 0;
        let mut batch_bytes = 0;
        for event in &state.events {
            if max_count.is_some_and(|max| taken >= max) {
                break;
            }
            let next = batch_bytes + event.byte_len();
            if taken > 0 && max_bytes.is_some_and(|max| next > max) {
                break;
            }
            batch_bytes = next;
            taken += 1;
        }

        state.total_bytes -= batch_bytes;
        let batch: Vec<RenderedEvent> = state.events.drain(..taken).collect();
        batch
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let (events, bytes) = {
            let state = self.lock();
            (state.events.len(), state.total_bytes)
        };
        QueueStats {
            events,
            bytes,
            dropped_oversize: self.dropped_oversize.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn texts(events: &[RenderedEvent]) -> Vec<&str> {
        events.iter().map(RenderedEvent::as_str).collect()
    }

    fn queued_sum(queue: &BoundedQueue) -> usize {
        queue.lock().events.iter().map(RenderedEvent::byte_len).sum()
    }

    fn filled(items: &[&str]) -> BoundedQueue {
        let queue = BoundedQueue::new(None, None);
        for item in items {
            assert_eq!(queue.enqueue((*item).into()), EnqueueOutcome::Enqueued);
        }
        queue
    }

    #[test]
    fn test_new_queue_is_empty() {
        let queue = BoundedQueue::new(Some(100), Some(10));

        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.total_bytes(), 0);
        assert_eq!(queue.stats(), QueueStats::default());
    }

    #[test]
    fn test_enqueue_tracks_bytes() {
        let queue = filled(&["abc", "de", "f"]);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.total_bytes(), 6);
    }

    #[test]
    fn test_oversize_event_is_dropped() {
        let queue = BoundedQueue::new(None, Some(4));
        queue.enqueue("ok".into());

        let outcome = queue.enqueue("too large".into());

        assert_eq!(outcome, EnqueueOutcome::OversizeDrop);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.total_bytes(), 2);
        assert_eq!(queue.stats().dropped_oversize, 1);
    }

    #[test]
    fn test_event_exactly_at_event_limit_is_admitted() {
        let queue = BoundedQueue::new(None, Some(4));

        assert_eq!(queue.enqueue("four".into()), EnqueueOutcome::Enqueued);
    }

    #[test]
    fn test_overflow_drops_newest_and_keeps_existing() {
        let queue = BoundedQueue::new(Some(10), None);
        queue.enqueue("12345".into());
        queue.enqueue("6789".into());
        assert_eq!(queue.total_bytes(), 9);

        let outcome = queue.enqueue("xy".into());

        assert_eq!(outcome, EnqueueOutcome::OverflowDrop);
        assert_eq!(queue.total_bytes(), 9);
        assert_eq!(queue.stats().dropped_overflow, 1);
        let batch = queue.try_dequeue_batch(None, None);
        assert_eq!(texts(&batch), vec!["12345", "6789"]);
    }

    #[test]
    fn test_overflow_leaves_room_for_smaller_event() {
        let queue = BoundedQueue::new(Some(10), None);
        queue.enqueue("123456789".into());

        assert_eq!(queue.enqueue("ab".into()), EnqueueOutcome::OverflowDrop);
        assert_eq!(queue.enqueue("a".into()), EnqueueOutcome::Enqueued);
        assert_eq!(queue.total_bytes(), 10);
    }

    #[test]
    fn test_dequeue_empty() {
        let queue = BoundedQueue::new(None, None);

        assert!(queue.try_dequeue_batch(Some(10), Some(100)).is_empty());
    }

    #[test]
    fn test_dequeue_respects_max_count() {
        let queue = filled(&["1", "2", "3", "4", "5"]);

        let batch = queue.try_dequeue_batch(Some(3), None);

        assert_eq!(texts(&batch), vec!["1", "2", "3"]);
        let rest = queue.try_dequeue_batch(None, None);
        assert_eq!(texts(&rest), vec!["4", "5"]);
    }

    #[test]
    fn test_dequeue_is_first_fit_not_best_fit() {
        let queue = BoundedQueue::new(None, None);
        queue.enqueue(RenderedEvent::new("a".repeat(60)));
        queue.enqueue(RenderedEvent::new("b".repeat(50)));
        queue.enqueue(RenderedEvent::new("c".repeat(10)));

        let batch = queue.try_dequeue_batch(None, Some(100));

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].byte_len(), 60);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.total_bytes(), 60);
    }

    #[test]
    fn test_dequeue_exact_byte_boundary() {
        let queue = filled(&["aaaa", "bbbb", "cc"]);

        let batch = queue.try_dequeue_batch(None, Some(8));

        assert_eq!(texts(&batch), vec!["aaaa", "bbbb"]);
        assert_eq!(queue.total_bytes(), 2);
    }

    #[test]
    fn test_dequeue_returns_single_oversized_event_alone() {
        let queue = filled(&["this one is long", "x"]);

        let batch = queue.try_dequeue_batch(None, Some(4));

        assert_eq!(texts(&batch), vec!["this one is long"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.total_bytes(), 1);
    }

    #[test]
    fn test_dequeue_zero_count_takes_nothing() {
        let queue = filled(&["a"]);

        assert!(queue.try_dequeue_batch(Some(0), None).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_interleaved_enqueue_and_dequeue_preserve_order() {
        let queue = filled(&["1", "2"]);
        let first = queue.try_dequeue_batch(Some(1), None);
        queue.enqueue("3".into());

        let rest = queue.try_dequeue_batch(None, None);

        assert_eq!(texts(&first), vec!["1"]);
        assert_eq!(texts(&rest), vec!["2", "3"]);
        assert_eq!(queue.total_bytes(), 0);
    }

    #[test]
    fn test_concurrent_producers_with_drain_loop() {
        const PRODUCERS: usize = 8;
        const EVENTS_PER_PRODUCER: usize = 500;

        let queue = Arc::new(BoundedQueue::new(None, None));
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..EVENTS_PER_PRODUCER {
                        queue.enqueue(RenderedEvent::new(format!("{p}:{i}")));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while producers.iter().any(|p| !p.is_finished()) {
            seen.extend(queue.try_dequeue_batch(Some(64), Some(512)));
        }
        for producer in producers {
            producer.join().unwrap();
        }
        seen.extend(queue.try_dequeue_batch(None, None));

        assert_eq!(seen.len(), PRODUCERS * EVENTS_PER_PRODUCER);
        assert_eq!(queue.total_bytes(), 0);

        // Per producer, events come out in the order they went in.
        for p in 0..PRODUCERS {
            let prefix = format!("{p}:");
            let order: Vec<usize> = seen
                .iter()
                .filter_map(|e| e.as_str().strip_prefix(&prefix))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(order, (0..EVENTS_PER_PRODUCER).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_concurrent_producers_with_queue_limit_account_for_drops() {
        const PRODUCERS: usize = 4;
        const EVENTS_PER_PRODUCER: usize = 1_000;

        let queue = Arc::new(BoundedQueue::new(Some(256), None));
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    (0..EVENTS_PER_PRODUCER)
                        .filter(|_| queue.enqueue("event".into()) == EnqueueOutcome::Enqueued)
                        .count()
                })
            })
            .collect();

        let mut dequeued = 0;
        while producers.iter().any(|p| !p.is_finished()) {
            dequeued += queue.try_dequeue_batch(Some(10), None).len();
        }
        let admitted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();
        dequeued += queue.try_dequeue_batch(None, None).len();

        let stats = queue.stats();
        assert_eq!(dequeued, admitted);
        assert_eq!(
            admitted as u64 + stats.dropped_overflow,
            (PRODUCERS * EVENTS_PER_PRODUCER) as u64
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(usize),
        Dequeue(Option<usize>, Option<usize>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0usize..64).prop_map(Op::Enqueue),
            1 => (proptest::option::of(0usize..8), proptest::option::of(0usize..128))
                .prop_map(|(count, bytes)| Op::Dequeue(count, bytes)),
        ]
    }

    proptest! {
        #[test]
        fn prop_total_bytes_matches_queued_events(
            queue_limit in proptest::option::of(0usize..256),
            event_limit in proptest::option::of(0usize..64),
            ops in proptest::collection::vec(op_strategy(), 0..64),
        ) {
            let queue = BoundedQueue::new(queue_limit, event_limit);
            for op in ops {
                match op {
                    Op::Enqueue(size) => {
                        let before = queue.len();
                        let outcome = queue.enqueue(RenderedEvent::new("x".repeat(size)));
                        if outcome != EnqueueOutcome::Enqueued {
                            prop_assert_eq!(queue.len(), before);
                        }
                    }
                    Op::Dequeue(count, bytes) => {
                        let batch = queue.try_dequeue_batch(count, bytes);
                        if let Some(count) = count {
                            prop_assert!(batch.len() <= count);
                        }
                        if let Some(bytes) = bytes {
                            let sum: usize = batch.iter().map(RenderedEvent::byte_len).sum();
                            prop_assert!(batch.len() <= 1 || sum <= bytes);
                        }
                    }
                }
                prop_assert_eq!(queue.total_bytes(), queued_sum(&queue));
                if let Some(limit) = queue_limit {
                    prop_assert!(queue.total_bytes() <= limit);
                }
            }
        }
    }
}
