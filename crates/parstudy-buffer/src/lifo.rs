//! LIFO buffer: pushes, erases and chunks all happen at the tail.

use std::ops::{Index, IndexMut};

use crate::buffer::Buffer;

/// A stack-shaped [`Buffer`].
///
/// [`chunk`](Buffer::chunk)`(n)` is the last `min(n, len)` elements, in
/// storage order, and [`erase`](Buffer::erase)`(n)` truncates them. The
/// most recently pushed work is therefore executed first.
#[derive(Debug)]
pub struct LifoBuffer<T> {
    data: Vec<T>,
}

impl<T> LifoBuffer<T> {
    /// Create an empty buffer without allocating.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Create an empty buffer with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Exchange contents (and capacities) with another buffer.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Remove and return the whole contents, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.data)
    }

    fn chunk_start(&self, n: usize) -> usize {
        self.data.len() - n.min(self.data.len())
    }
}

impl<T> Default for LifoBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Buffer<T> for LifoBuffer<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn set_capacity(&mut self, capacity: usize) {
        if capacity > self.data.capacity() {
            self.data.reserve_exact(capacity - self.data.len());
        }
    }

    fn push_back(&mut self, value: T) {
        self.data.push(value);
    }

    fn append(&mut self, values: &mut Vec<T>) {
        self.data.append(values);
    }

    fn erase(&mut self, n: usize) {
        let len = self.data.len();
        assert!(n <= len, "cannot erase {n} elements from a buffer of {len}");
        self.data.truncate(len - n);
    }

    fn chunk(&self, n: usize) -> &[T] {
        let start = self.chunk_start(n);
        &self.data[start..]
    }

    fn chunk_mut(&mut self, n: usize) -> &mut [T] {
        let start = self.chunk_start(n);
        &mut self.data[start..]
    }

    fn as_slice(&self) -> &[T] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    fn clear(&mut self) {
        self.data.clear();
    }
}

impl<T> Index<usize> for LifoBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for LifoBuffer<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}
