//! Swap-based handoff between the critical path and the observer
//!
//! Producers append under a short `parking_lot` lock; the single consumer
//! exchanges the whole pending buffer for its own empty scratch buffer and
//! processes the previous contents outside the lock.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Entries kept by the observation-side history
pub const HISTORY_CAPACITY: usize = 100;

/// Default bound on events waiting for a drain
pub const DEFAULT_PENDING_CAPACITY: usize = 4096;

/// Bounded multi-producer, single-drain queue
///
/// `enqueue` never waits on consumer work: it holds the lock for one push.
/// When the consumer falls behind by more than `capacity` events the oldest
/// pending event is dropped and counted.
pub struct DispatchQueue<T> {
    pending: Mutex<VecDeque<T>>,
    capacity: usize,
    dirty: AtomicBool,
    dropped: AtomicU64,
    batches: AtomicU64,
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PENDING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dirty: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        }
    }

    /// Append an event for later observation
    pub fn enqueue(&self, event: T) {
        let mut pending = self.pending.lock();
        if pending.len() >= self.capacity {
            pending.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        pending.push_back(event);
        self.dirty.store(true, Ordering::Release);
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a whole burst under a single lock acquisition
    pub fn enqueue_all<I>(&self, events: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut pending = self.pending.lock();
        let mut pushed = false;
        for event in events {
            if pending.len() >= self.capacity {
                pending.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            pending.push_back(event);
            pushed = true;
        }
        if pushed {
            self.dirty.store(true, Ordering::Release);
            self.batches.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take every pending event, in enqueue order
    pub fn drain(&self) -> Vec<T> {
        let mut scratch = VecDeque::new();
        self.drain_into(&mut scratch);
        scratch.into()
    }

    /// Swap the pending buffer with `scratch`
    ///
    /// `scratch` is cleared and pre-sized outside the lock so producers never
    /// allocate while holding it. Returns the number of events taken.
    pub fn drain_into(&self, scratch: &mut VecDeque<T>) -> usize {
        scratch.clear();
        if !self.dirty.load(Ordering::Acquire) {
            return 0;
        }
        scratch.reserve(self.capacity);

        let mut pending = self.pending.lock();
        std::mem::swap(&mut *pending, scratch);
        self.dirty.store(false, Ordering::Release);
        drop(pending);

        scratch.len()
    }

    /// True when events are waiting
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Events discarded because the consumer fell behind
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Producer appends so far, one per `enqueue` or non-empty `enqueue_all`
    pub fn batch_count(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer-side history, oldest evicted first
#[derive(Debug, Clone)]
pub struct EventHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> EventHistory<T> {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for EventHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}
