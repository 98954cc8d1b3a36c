//! FIFO buffer with left compaction.
//!
//! Erasing from the front advances `begin`; the dead prefix is dropped
//! once it is at least as long as the live window, which keeps `erase`
//! amortized O(1). When the backing store fills up and `begin != 0`, the
//! live elements are first slid down to index 0, so the window is always
//! one contiguous slice of the current allocation.

use std::ops::{Index, IndexMut};

use crate::buffer::Buffer;

/// Minimum number of slots reserved on the first growth.
const MIN_GROWTH: usize = 8;

/// A FIFO-shaped [`Buffer`] that consumes from the front.
///
/// Invariant: `begin <= data.len() <= data.capacity()`; the live window
/// is `data[begin..]`. Elements in front of `begin` have been erased;
/// there are never more of them than live elements, and they are dropped
/// on the next compaction or when the buffer drains.
#[derive(Debug)]
pub struct CircularBuffer<T> {
    data: Vec<T>,
    begin: usize,
}

impl<T> CircularBuffer<T> {
    /// Create an empty buffer without allocating.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            begin: 0,
        }
    }

    /// Create an empty buffer with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            begin: 0,
        }
    }

    /// Offset of the first live element in the backing store.
    pub fn begin_pos(&self) -> usize {
        self.begin
    }

    /// One past the last live element in the backing store.
    pub fn end_pos(&self) -> usize {
        self.data.len()
    }

    /// Exchange contents (and capacities) with another buffer.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Slide the live window down to index 0, dropping the erased prefix.
    fn compact(&mut self) {
        if self.begin != 0 {
            self.data.drain(..self.begin);
            self.begin = 0;
        }
    }
}

impl<T> Default for CircularBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Buffer<T> for CircularBuffer<T> {
    fn len(&self) -> usize {
        self.data.len() - self.begin
    }

    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn set_capacity(&mut self, capacity: usize) {
        if capacity <= self.data.capacity() {
            return;
        }
        // Compacting first avoids carrying the dead prefix into the new
        // allocation.
        self.compact();
        self.data.reserve_exact(capacity - self.data.len());
    }

    fn push_back(&mut self, value: T) {
        if self.data.len() == self.data.capacity() {
            self.compact();
            if self.data.len() == self.data.capacity() {
                let grow = self.data.len().max(MIN_GROWTH);
                self.data.reserve(grow);
            }
        }
        self.data.push(value);
    }

    fn erase(&mut self, n: usize) {
        let len = self.len();
        assert!(n <= len, "cannot erase {n} elements from a buffer of {len}");
        self.begin += n;
        if self.begin == self.data.len() {
            self.clear();
        } else if self.begin >= self.len() {
            self.compact();
        }
    }

    fn chunk(&self, n: usize) -> &[T] {
        let end = self.begin + n.min(self.len());
        &self.data[self.begin..end]
    }

    fn chunk_mut(&mut self, n: usize) -> &mut [T] {
        let end = self.begin + n.min(self.len());
        &mut self.data[self.begin..end]
    }

    fn as_slice(&self) -> &[T] {
        &self.data[self.begin..]
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data[self.begin..]
    }

    fn clear(&mut self) {
        self.data.clear();
        self.begin = 0;
    }
}

impl<T> Index<usize> for CircularBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T> IndexMut<usize> for CircularBuffer<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[test]
    fn push_and_erase_advance_window() {
        let mut buf = CircularBuffer::new();
        for i in 0..5 {
            buf.push_back(i);
        }
        assert_eq!(buf.len(), 5);
        buf.erase(2);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.begin_pos(), 2);
        assert_eq!(buf.as_slice(), &[2, 3, 4]);
        assert_eq!(buf[0], 2);
    }

    #[test]
    fn draining_resets_positions() {
        let mut buf = CircularBuffer::new();
        buf.push_back('a');
        buf.push_back('b');
        buf.erase(2);
        assert!(buf.is_empty());
        assert_eq!(buf.begin_pos(), 0);
        assert_eq!(buf.end_pos(), 0);
    }

    #[test]
    fn erase_chunk_past_end_empties() {
        let mut buf = CircularBuffer::new();
        for i in 0..3 {
            buf.push_back(i);
        }
        buf.erase_chunk(10);
        assert!(buf.is_empty());
    }

    #[test]
    #[should_panic(expected = "cannot erase 4 elements")]
    fn erase_past_end_panics() {
        let mut buf = CircularBuffer::new();
        for i in 0..3 {
            buf.push_back(i);
        }
        buf.erase(4);
    }

    #[test]
    fn chunk_is_front_of_window() {
        let mut buf = CircularBuffer::new();
        for i in 0..10 {
            buf.push_back(i);
        }
        buf.erase(3);
        assert_eq!(buf.chunk(4), &[3, 4, 5, 6]);
        assert_eq!(buf.chunk(100).len(), 7);
        for v in buf.chunk_mut(2) {
            *v *= 10;
        }
        assert_eq!(buf.as_slice()[..3], [30, 40, 5]);
    }

    #[test]
    fn full_store_compacts_before_growing() {
        let mut buf = CircularBuffer::with_capacity(8);
        // Fill the store to capacity.
        let mut i = 0;
        while buf.end_pos() < buf.capacity() {
            buf.push_back(i);
            i += 1;
        }
        let cap = buf.capacity();
        // Fewer dead than live elements: no compaction yet.
        buf.erase(cap / 2 - 1);
        assert_eq!(buf.begin_pos(), cap / 2 - 1);
        let live_before: Vec<i32> = buf.as_slice().to_vec();
        buf.push_back(100);
        assert_eq!(buf.begin_pos(), 0);
        assert_eq!(buf.capacity(), cap);
        let mut expected = live_before;
        expected.push(100);
        assert_eq!(buf.as_slice(), expected.as_slice());
    }

    #[test]
    fn erased_elements_drop_once_dead_prefix_outgrows_window() {
        let item = Rc::new(());
        let mut buf = CircularBuffer::new();
        for _ in 0..10 {
            buf.push_back(Rc::clone(&item));
        }
        buf.erase(3);
        assert_eq!(Rc::strong_count(&item), 11, "dropped late");
        buf.erase(2);
        assert_eq!(Rc::strong_count(&item), 6);
        assert_eq!(buf.begin_pos(), 0);
        assert_eq!(buf.len(), 5);
        buf.erase(5);
        assert_eq!(Rc::strong_count(&item), 1);
    }

    #[test]
    fn set_capacity_never_shrinks() {
        let mut buf: CircularBuffer<u8> = CircularBuffer::with_capacity(64);
        buf.set_capacity(8);
        assert!(buf.capacity() >= 64);
        buf.set_capacity(128);
        assert!(buf.capacity() >= 128);
    }

    #[test]
    fn append_moves_all_values() {
        let mut buf = CircularBuffer::new();
        buf.push_back(1);
        let mut more = vec![2, 3, 4];
        buf.append(&mut more);
        assert!(more.is_empty());
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Push(u32),
        Erase(usize),
        EraseChunk(usize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => any::<u32>().prop_map(Op::Push),
            1 => (0usize..6).prop_map(Op::Erase),
            1 => (0usize..12).prop_map(Op::EraseChunk),
        ]
    }

    proptest! {
        #[test]
        fn matches_fifo_model(ops in proptest::collection::vec(arb_op(), 0..200)) {
            let mut buf = CircularBuffer::new();
            let mut model = VecDeque::new();
            let mut pushed = 0usize;
            let mut erased = 0usize;
            for op in ops {
                match op {
                    Op::Push(v) => {
                        buf.push_back(v);
                        model.push_back(v);
                        pushed += 1;
                    }
                    Op::Erase(n) => {
                        let n = n.min(model.len());
                        buf.erase(n);
                        model.drain(..n);
                        erased += n;
                    }
                    Op::EraseChunk(n) => {
                        let n_eff = n.min(model.len());
                        buf.erase_chunk(n);
                        model.drain(..n_eff);
                        erased += n_eff;
                    }
                }
                prop_assert_eq!(buf.len(), pushed - erased);
                prop_assert!(buf.begin_pos() <= buf.end_pos());
                prop_assert!(buf.begin_pos() <= buf.len());
                prop_assert!(buf.end_pos() <= buf.capacity());
                let expected: Vec<u32> = model.iter().copied().collect();
                prop_assert_eq!(buf.as_slice(), expected.as_slice());
            }
        }
    }
}
