//! The [`Buffer`] trait shared by both buffer disciplines.

/// An ordered, mutable window over a contiguous backing store.
///
/// The live elements always form one slice (`as_slice()`), indexed from
/// the front of the window. Implementations differ in which end
/// [`erase`](Buffer::erase) and [`chunk`](Buffer::chunk) work from:
/// [`CircularBuffer`](crate::CircularBuffer) consumes from the front,
/// [`LifoBuffer`](crate::LifoBuffer) from the back.
///
/// Capacity only grows, except through an explicit [`clear`](Buffer::clear)
/// or a swap with another buffer.
pub trait Buffer<T> {
    /// Number of live elements.
    fn len(&self) -> usize;

    /// Whether the window is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements the backing store can hold without reallocating.
    fn capacity(&self) -> usize;

    /// Grow the backing store to hold at least `capacity` elements.
    ///
    /// Never shrinks; a request below the current capacity is a no-op.
    fn set_capacity(&mut self, capacity: usize);

    /// Append one element. Amortized O(1).
    fn push_back(&mut self, value: T);

    /// Move every element out of `values` and append them in order.
    fn append(&mut self, values: &mut Vec<T>) {
        self.set_capacity(self.len() + values.len());
        for value in values.drain(..) {
            self.push_back(value);
        }
    }

    /// Remove `n` elements from the consuming end.
    ///
    /// Implementations may drop the removed elements later than this
    /// call, but never later than the buffer draining or being cleared.
    /// [`CircularBuffer`](crate::CircularBuffer) keeps at most `len()`
    /// erased elements alive.
    ///
    /// # Panics
    ///
    /// Panics if `n > len()`.
    fn erase(&mut self, n: usize);

    /// Remove up to `n` elements from the consuming end. Never panics.
    fn erase_chunk(&mut self, n: usize) {
        let n = n.min(self.len());
        self.erase(n);
    }

    /// The contiguous run of up to `n` elements that the next
    /// [`erase_chunk`](Buffer::erase_chunk)`(n)` would remove.
    fn chunk(&self, n: usize) -> &[T];

    /// Mutable variant of [`chunk`](Buffer::chunk).
    fn chunk_mut(&mut self, n: usize) -> &mut [T];

    /// All live elements, front to back.
    fn as_slice(&self) -> &[T];

    /// All live elements, front to back, mutably.
    fn as_mut_slice(&mut self) -> &mut [T];

    /// Element at `index` relative to the front of the window.
    fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Drop every element and reset the window to empty.
    fn clear(&mut self);
}
