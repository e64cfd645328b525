//! Resequencing of engine output.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use media_types::Timestamped;

struct Entry<T> {
    timestamp_us: i64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed: `BinaryHeap` is a max-heap and the earliest item must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .timestamp_us
            .cmp(&self.timestamp_us)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Holds up to `depth` items back and releases them in timestamp order.
///
/// Items with equal timestamps leave in arrival order. With a depth of zero
/// every item passes straight through.
pub struct ReorderBuffer<T> {
    depth: usize,
    next_seq: u64,
    heap: BinaryHeap<Entry<T>>,
}

impl<T: Timestamped> ReorderBuffer<T> {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            next_seq: 0,
            heap: BinaryHeap::with_capacity(depth + 1),
        }
    }

    /// Add `item`; returns the earliest held item once more than `depth` are held.
    pub fn push(&mut self, item: T) -> Option<T> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            timestamp_us: item.timestamp_us(),
            seq,
            item,
        });

        if self.heap.len() > self.depth {
            self.heap.pop().map(|entry| entry.item)
        } else {
            None
        }
    }

    /// Release everything still held, earliest first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            items.push(entry.item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
