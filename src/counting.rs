//! An allocator that keeps score.

use core::cell::Cell;
use core::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator, Global, Layout};

/// Wraps another allocator, counting every call and every byte.
///
/// The counters make it possible to assert that a data structure released
/// everything it obtained:
///
/// ```
/// use allocated_rbtree::{CountingAllocator, RbTreeMap};
///
/// let alloc = CountingAllocator::default();
/// {
///     let mut map = RbTreeMap::new_in(&alloc)?;
///     map.insert(1, "one");
///     map.insert(2, "two");
/// }
///
/// assert!(alloc.n_allocations() > 0);
/// assert_eq!(alloc.net_allocations(), 0);
/// assert_eq!(alloc.net_bytes_allocated(), 0);
/// # Ok::<(), allocated_rbtree::AllocErrorWithLayout>(())
/// ```
///
/// The counters are plain [`Cell`]s, so the allocator cannot be shared
/// between threads. Resizes go through the default `grow`/`shrink`, so each
/// one counts as an allocation plus a deallocation.
#[derive(Debug)]
pub struct CountingAllocator<A: Allocator = Global> {
    inner: A,
    n_allocations: Cell<usize>,
    n_deallocations: Cell<usize>,
    n_bytes_allocated: Cell<usize>,
    n_bytes_deallocated: Cell<usize>,
}

impl Default for CountingAllocator<Global> {
    fn default() -> Self {
        Self::new(Global)
    }
}

impl<A: Allocator> CountingAllocator<A> {
    /// Wraps `inner`, starting all counters at zero.
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            n_allocations: Cell::new(0),
            n_deallocations: Cell::new(0),
            n_bytes_allocated: Cell::new(0),
            n_bytes_deallocated: Cell::new(0),
        }
    }

    /// Number of successful `allocate` calls.
    pub fn n_allocations(&self) -> usize {
        self.n_allocations.get()
    }

    /// Number of `deallocate` calls.
    pub fn n_deallocations(&self) -> usize {
        self.n_deallocations.get()
    }

    pub fn n_bytes_allocated(&self) -> usize {
        self.n_bytes_allocated.get()
    }

    pub fn n_bytes_deallocated(&self) -> usize {
        self.n_bytes_deallocated.get()
    }

    /// Blocks currently outstanding. Negative values indicate a double free.
    #[allow(clippy::cast_possible_wrap)]
    pub fn net_allocations(&self) -> isize {
        self.n_allocations() as isize - self.n_deallocations() as isize
    }

    /// Bytes currently outstanding.
    #[allow(clippy::cast_possible_wrap)]
    pub fn net_bytes_allocated(&self) -> isize {
        self.n_bytes_allocated() as isize - self.n_bytes_deallocated() as isize
    }

    /// Consumes the wrapper, returning the inner allocator.
    pub fn into_inner(self) -> A {
        self.inner
    }
}

// SAFETY: every request is forwarded unchanged to `inner`, which upholds the
// `Allocator` contract; the wrapper only observes.
unsafe impl<A: Allocator> Allocator for CountingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let ptr = self.inner.allocate(layout)?;
        self.n_allocations.set(self.n_allocations.get() + 1);
        self.n_bytes_allocated
            .set(self.n_bytes_allocated.get() + layout.size());
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.n_deallocations.set(self.n_deallocations.get() + 1);
        self.n_bytes_deallocated
            .set(self.n_bytes_deallocated.get() + layout.size());
        // SAFETY: the caller guarantees `ptr` was allocated by `self` with
        // `layout`, and `self` obtained it from `inner`.
        unsafe { self.inner.deallocate(ptr, layout) }
    }
}
