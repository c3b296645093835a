//! Bounded top-k selection.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A scored item. Ordering looks at `(score, seq)` only, never the payload:
/// higher score is better, and on equal scores the earlier arrival wins.
#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub score: f32,
    pub seq: u64,
    pub item: T,
}

impl<T> PartialEq for Candidate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Candidate<T> {}

impl<T> PartialOrd for Candidate<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Candidate<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Keeps the best `k` candidates seen so far in a size-`k` min-heap.
#[derive(Debug)]
pub struct TopK<T> {
    k: usize,
    next_seq: u64,
    heap: BinaryHeap<Reverse<Candidate<T>>>,
}

impl<T> TopK<T> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            next_seq: 0,
            heap: BinaryHeap::with_capacity(k.min(4096)),
        }
    }

    /// Offer an item. Returns whether it is currently kept.
    pub fn push(&mut self, score: f32, item: T) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.k == 0 {
            return false;
        }

        let candidate = Candidate { score, seq, item };
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            return true;
        }
        match self.heap.peek() {
            Some(Reverse(worst)) if candidate > *worst => {
                self.heap.pop();
                self.heap.push(Reverse(candidate));
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Lowest kept score, once the heap is full.
    pub fn threshold(&self) -> Option<f32> {
        if self.heap.len() < self.k {
            return None;
        }
        self.heap.peek().map(|Reverse(c)| c.score)
    }

    /// Best first.
    pub fn into_sorted_vec(self) -> Vec<Candidate<T>> {
        // Ascending order of Reverse is descending order of Candidate.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(c)| c)
            .collect()
    }
}
