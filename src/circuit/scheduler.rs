use std::{cmp::Reverse, collections::BinaryHeap, time::Duration};

use super::node::NodeId;

/// Deferred work owned by the animator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerTask {
    /// Pulse a random node, then reschedule.
    AmbientPulse,
    /// Offer the pulse of `node` to each of its connections. `hop` counts
    /// how many edges the pulse travelled before reaching `node`.
    Propagate { node: NodeId, hop: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    due: Duration,
    seq: u64,
    task: TimerTask,
}

/// Min-queue of timer tasks keyed by due time. Tasks due at the same
/// instant fire in scheduling order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Duration, task: TimerTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { due, seq, task }));
    }

    /// Removes and returns the earliest task if it is due at `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, TimerTask)> {
        match self.heap.peek() {
            Some(Reverse(entry)) if entry.due <= now => {
                let Reverse(entry) = self.heap.pop()?;
                Some((entry.due, entry.task))
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Cancels everything that is pending.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Duration, TimerTask)> + '_ {
        self.heap.iter().map(|Reverse(entry)| (entry.due, entry.task))
    }
}
