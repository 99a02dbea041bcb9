//! Transmit Priority Queue
//!
//! Pending transmit bursts ordered by timestamp, earliest first. The
//! ingress decoder inserts, the burst scheduler drains; both sides hold
//! the lock only long enough for one map operation, so neither ever
//! blocks on the other's work.

use crate::SchedulerError;
use common::{Timestamp, TxBurst};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Time-ordered queue of pending transmit bursts
#[derive(Default)]
pub struct TxPriorityQueue {
    inner: Mutex<BTreeMap<Timestamp, TxBurst>>,
}

impl TxPriorityQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a burst keyed by its timestamp.
    ///
    /// A second burst for an already-queued timestamp is a protocol
    /// error; the new burst is dropped and the original kept.
    pub async fn insert(&self, burst: TxBurst) -> Result<(), SchedulerError> {
        let mut map = self.inner.lock().await;
        let ts = burst.timestamp;
        if map.contains_key(&ts) {
            return Err(SchedulerError::DuplicateBurst(ts));
        }
        map.insert(ts, burst);
        Ok(())
    }

    /// Timestamp of the earliest queued burst, if any
    pub async fn peek_earliest(&self) -> Option<Timestamp> {
        self.inner.lock().await.keys().next().copied()
    }

    /// Remove and return one burst strictly earlier than `target`.
    ///
    /// Callers loop until this returns `None` to flush everything that
    /// arrived too late to be transmitted at its intended slot.
    pub async fn pop_stale(&self, target: Timestamp) -> Option<TxBurst> {
        let mut map = self.inner.lock().await;
        let ts = *map.keys().next()?;
        if ts < target {
            map.remove(&ts)
        } else {
            None
        }
    }

    /// Remove and return the burst whose timestamp equals `target`.
    ///
    /// At most one call per `target` succeeds; later calls return `None`.
    pub async fn pop_at(&self, target: Timestamp) -> Option<TxBurst> {
        self.inner.lock().await.remove(&target)
    }

    /// Discard all queued bursts
    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Number of queued bursts
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burst(frame: u32, slot: u8) -> TxBurst {
        TxBurst::filler(Timestamp::new(frame, slot).unwrap())
    }

    fn ts(frame: u32, slot: u8) -> Timestamp {
        Timestamp::new(frame, slot).unwrap()
    }

    #[tokio::test]
    async fn test_pop_at_consumes_exactly_once() {
        let queue = TxPriorityQueue::new();
        queue.insert(burst(5, 3)).await.unwrap();

        let popped = queue.pop_at(ts(5, 3)).await.unwrap();
        assert_eq!(popped.timestamp, ts(5, 3));
        assert!(queue.pop_at(ts(5, 3)).await.is_none());
    }

    #[tokio::test]
    async fn test_pop_at_misses_other_timestamps() {
        let queue = TxPriorityQueue::new();
        queue.insert(burst(5, 3)).await.unwrap();
        assert!(queue.pop_at(ts(5, 4)).await.is_none());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_ordering_is_by_timestamp_not_arrival() {
        let queue = TxPriorityQueue::new();
        queue.insert(burst(5, 0)).await.unwrap();
        queue.insert(burst(3, 0)).await.unwrap();
        queue.insert(burst(4, 7)).await.unwrap();
        assert_eq!(queue.peek_earliest().await, Some(ts(3, 0)));
    }

    #[tokio::test]
    async fn test_pop_stale_drains_everything_before_target() {
        let queue = TxPriorityQueue::new();
        queue.insert(burst(1, 0)).await.unwrap();
        queue.insert(burst(1, 5)).await.unwrap();
        queue.insert(burst(2, 0)).await.unwrap();
        queue.insert(burst(3, 0)).await.unwrap();

        let mut evicted = Vec::new();
        while let Some(b) = queue.pop_stale(ts(2, 1)).await {
            evicted.push(b.timestamp);
        }
        assert_eq!(evicted, vec![ts(1, 0), ts(1, 5), ts(2, 0)]);
        assert_eq!(queue.peek_earliest().await, Some(ts(3, 0)));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let queue = TxPriorityQueue::new();
        queue.insert(burst(7, 2)).await.unwrap();
        assert!(matches!(
            queue.insert(burst(7, 2)).await,
            Err(SchedulerError::DuplicateBurst(_))
        ));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let queue = TxPriorityQueue::new();
        queue.insert(burst(1, 0)).await.unwrap();
        queue.insert(burst(2, 0)).await.unwrap();
        queue.clear().await;
        assert!(queue.is_empty().await);
    }
}
