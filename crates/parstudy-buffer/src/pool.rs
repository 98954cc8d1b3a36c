//! Reuse pool for heap objects handed out behind shared handles.
//!
//! A [`SharedPool`] owns a free list. [`SharedPool::acquire`] pops a
//! recycled value (resetting it) or constructs a fresh one, and wraps it
//! in a [`Pooled`] guard. When the guard drops, the value goes back on
//! the free list if the pool is still alive; otherwise it is simply
//! dropped. Guards only hold a weak reference to the free list, so a
//! pool may be torn down while handles are still outstanding.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Reference-counted handle to a pooled object.
///
/// Mutation requires unique ownership, via [`Arc::get_mut`].
pub type Shared<T> = Arc<Pooled<T>>;

/// Types that a [`SharedPool`] knows how to build and recycle.
pub trait Recyclable<Args = ()>: Sized {
    /// Build a fresh value.
    fn construct(args: Args) -> Self;

    /// Prepare a recycled value for reuse. Defaults to leaving it as-is.
    fn reset(&mut self, _args: Args) {}
}

impl<T> Recyclable for Vec<T> {
    fn construct(_args: ()) -> Self {
        Vec::new()
    }

    fn reset(&mut self, _args: ()) {
        self.clear();
    }
}

type FreeList<T> = Mutex<Vec<T>>;

/// A thread-safe pool of reusable `T` values.
///
/// Cloning yields another handle onto the same free list and counter.
#[derive(Debug)]
pub struct SharedPool<T> {
    free: Arc<FreeList<T>>,
    num_created: Arc<AtomicU64>,
}

impl<T> SharedPool<T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            free: Arc::new(Mutex::new(Vec::new())),
            num_created: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand out a value: a recycled one after [`Recyclable::reset`], or a
    /// freshly constructed one if the free list is empty.
    pub fn acquire<A>(&self, args: A) -> Shared<T>
    where
        T: Recyclable<A>,
    {
        Arc::new(self.checkout(args))
    }

    /// Like [`acquire`](SharedPool::acquire), but hands out the uniquely
    /// owned guard so it can be filled before being shared.
    pub fn checkout<A>(&self, args: A) -> Pooled<T>
    where
        T: Recyclable<A>,
    {
        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let value = match recycled {
            Some(mut value) => {
                value.reset(args);
                value
            }
            None => {
                self.num_created.fetch_add(1, Ordering::Relaxed);
                T::construct(args)
            }
        };
        self.wrap(value)
    }

    /// Wrap an externally built value so that it returns here on drop.
    pub fn adopt(&self, value: T) -> Shared<T> {
        self.num_created.fetch_add(1, Ordering::Relaxed);
        Arc::new(self.wrap(value))
    }

    /// Total values ever constructed (or adopted) by this pool.
    pub fn num_created(&self) -> u64 {
        self.num_created.load(Ordering::Relaxed)
    }

    /// Number of values currently sitting idle on the free list.
    pub fn size(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn wrap(&self, value: T) -> Pooled<T> {
        Pooled {
            value: Some(value),
            home: Arc::downgrade(&self.free),
        }
    }
}

impl<T> Default for SharedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SharedPool<T> {
    fn clone(&self) -> Self {
        Self {
            free: Arc::clone(&self.free),
            num_created: Arc::clone(&self.num_created),
        }
    }
}

/// A value checked out of a [`SharedPool`].
///
/// Dereferences to `T`. Returns the value to its pool on drop.
#[derive(Debug)]
pub struct Pooled<T> {
    value: Option<T>,
    home: Weak<FreeList<T>>,
}

impl<T> Pooled<T> {
    /// Detach the value from its pool and take ownership of it.
    pub fn into_inner(mut self) -> T {
        self.home = Weak::new();
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("pooled value is only taken on drop"),
        }
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value is only taken on drop"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value is only taken on drop"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let (Some(value), Some(free)) = (self.value.take(), self.home.upgrade()) {
            free.lock().unwrap_or_else(PoisonError::into_inner).push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Default)]
    struct Counter {
        resets: u32,
        label: u32,
    }

    impl Recyclable<u32> for Counter {
        fn construct(label: u32) -> Self {
            Self { resets: 0, label }
        }

        fn reset(&mut self, label: u32) {
            self.resets += 1;
            self.label = label;
        }
    }

    #[test]
    fn dropped_handles_return_to_pool() {
        let pool: SharedPool<Counter> = SharedPool::new();
        let a = pool.acquire(1);
        let b = pool.acquire(2);
        assert_eq!(pool.num_created(), 2);
        assert_eq!(pool.size(), 0);
        drop(a);
        assert_eq!(pool.size(), 1);
        let clone = Arc::clone(&b);
        drop(b);
        assert_eq!(pool.size(), 1, "still referenced by the clone");
        drop(clone);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn reuse_calls_reset() {
        let pool: SharedPool<Counter> = SharedPool::new();
        drop(pool.acquire(1));
        let again = pool.acquire(9);
        assert_eq!(again.resets, 1);
        assert_eq!(again.label, 9);
        assert_eq!(pool.num_created(), 1);
    }

    #[test]
    fn vec_pool_clears_on_reuse() {
        let pool: SharedPool<Vec<u8>> = SharedPool::new();
        let mut buf = pool.acquire(());
        if let Some(v) = Arc::get_mut(&mut buf) {
            v.extend_from_slice(b"hello");
        }
        assert_eq!(buf.len(), 5);
        drop(buf);
        let buf = pool.acquire(());
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 5);
    }

    #[test]
    fn checkout_is_filled_before_sharing() {
        let pool: SharedPool<Vec<u8>> = SharedPool::new();
        let mut guard = pool.checkout(());
        guard.push(3);
        let shared: Shared<Vec<u8>> = Arc::new(guard);
        assert_eq!(shared.as_slice(), &[3]);
        drop(shared);
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn handles_outlive_pool() {
        let pool: SharedPool<Vec<u8>> = SharedPool::new();
        let held = pool.acquire(());
        drop(pool);
        drop(held);
    }

    #[test]
    fn into_inner_detaches() {
        let pool: SharedPool<Counter> = SharedPool::new();
        let handle = pool.acquire(4);
        let pooled = Arc::try_unwrap(handle).unwrap();
        let value = pooled.into_inner();
        assert_eq!(value.label, 4);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn clones_share_state() {
        let pool: SharedPool<Vec<u8>> = SharedPool::new();
        let other = pool.clone();
        drop(other.acquire(()));
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.num_created(), 1);
    }

    proptest! {
        #[test]
        fn created_never_exceeds_peak_outstanding(
            batches in proptest::collection::vec(0usize..16, 1..20)
        ) {
            let pool: SharedPool<Vec<u32>> = SharedPool::new();
            let mut peak = 0usize;
            for n in batches {
                let held: Vec<_> = (0..n).map(|_| pool.acquire(())).collect();
                peak = peak.max(n);
                prop_assert_eq!(pool.num_created() as usize, peak);
                drop(held);
                prop_assert_eq!(pool.size(), peak);
            }
        }
    }
}
