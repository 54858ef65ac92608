//! Timer heap for deferred callbacks.
//!
//! Callbacks live in a slab; the binary heap only stores `(deadline,
//! generation, key)` triples. Cancelling removes the slab slot and leaves the
//! heap entry behind, which is skipped when it surfaces because its
//! generation no longer matches.

use slab::Slab;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

#[derive(Debug, Clone, Eq, PartialEq)]
struct TimerEntry {
    deadline: Instant,
    generation: u64,
    key: usize,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first, then
        // submission order).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct Slot<J> {
    generation: u64,
    job: J,
}

/// Identifies a scheduled timer: slab key plus the generation that was
/// current when it was inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerKey {
    pub(crate) key: usize,
    pub(crate) generation: u64,
}

/// A min-heap of deferred jobs ordered by deadline, FIFO on ties.
#[derive(Debug)]
pub(crate) struct TimerHeap<J> {
    heap: BinaryHeap<TimerEntry>,
    slots: Slab<Slot<J>>,
    next_generation: u64,
}

impl<J> Default for TimerHeap<J> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            slots: Slab::new(),
            next_generation: 0,
        }
    }
}

impl<J> TimerHeap<J> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of live (not cancelled, not fired) timers.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Adds `job` to fire at `deadline`.
    pub(crate) fn insert(&mut self, deadline: Instant, job: J) -> TimerKey {
        let generation = self.next_generation;
        self.next_generation += 1;
        let key = self.slots.insert(Slot { generation, job });
        self.heap.push(TimerEntry {
            deadline,
            generation,
            key,
        });
        TimerKey { key, generation }
    }

    /// Removes a timer that has not fired yet. Returns false when the timer
    /// already fired or was cancelled.
    pub(crate) fn cancel(&mut self, timer: TimerKey) -> bool {
        match self.slots.get(timer.key) {
            Some(slot) if slot.generation == timer.generation => {
                self.slots.remove(timer.key);
                true
            }
            _ => false,
        }
    }

    /// Earliest live deadline, if any.
    pub(crate) fn peek_deadline(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pops the earliest job whose deadline is `<= now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<J> {
        self.discard_stale();
        if self.heap.peek()?.deadline > now {
            return None;
        }
        let entry = self.heap.pop()?;
        Some(self.slots.remove(entry.key).job)
    }

    /// Drops every timer.
    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.slots.clear();
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            let live = self
                .slots
                .get(top.key)
                .is_some_and(|slot| slot.generation == top.generation);
            if live {
                return;
            }
            self.heap.pop();
        }
    }
}
