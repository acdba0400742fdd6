//! Deadline queue for sleeping bridge steps.
//!
//! A min-heap of `(deadline, action)` entries. A generation counter
//! breaks deadline ties so that entries with equal deadlines pop in
//! insertion order.

use crate::types::Time;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub(crate) type TimerAction = Box<dyn FnOnce() + Send>;

struct TimerEntry {
    deadline: Time,
    generation: u64,
    action: TimerAction,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap: earliest deadline first, then
        // insertion order.
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

/// Deadline-ordered pending timer actions.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerQueue {
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn insert(&mut self, deadline: Time, action: TimerAction) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.heap.push(TimerEntry {
            deadline,
            generation,
            action,
        });
    }

    /// Removes and returns every action whose deadline is at or before
    /// `now`, earliest first.
    pub(crate) fn pop_due(&mut self, now: Time) -> Vec<TimerAction> {
        let mut due = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                due.push(entry.action);
            }
        }
        due
    }
}
