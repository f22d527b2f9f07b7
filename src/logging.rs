//! An allocator that reports every call through the [`log`] facade.

use core::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator, Global, Layout};
use log::{debug, warn};

/// Wraps another allocator, logging every call.
///
/// Each successful `allocate` and every `deallocate` emits a `debug` record;
/// a refused allocation emits a `warn` record. Nothing else changes, so it
/// stacks with [`CountingAllocator`](crate::CountingAllocator):
///
/// ```
/// use allocated_rbtree::{CountingAllocator, LoggingAllocator, RbTreeMap};
///
/// let alloc = LoggingAllocator::new(CountingAllocator::default());
/// let mut map = RbTreeMap::new_in(&alloc)?;
/// map.insert(1, "one");
/// drop(map);
///
/// assert_eq!(alloc.inner().net_allocations(), 0);
/// # Ok::<(), allocated_rbtree::AllocErrorWithLayout>(())
/// ```
#[derive(Debug)]
pub struct LoggingAllocator<A: Allocator = Global> {
    inner: A,
}

impl Default for LoggingAllocator<Global> {
    fn default() -> Self {
        Self::new(Global)
    }
}

impl<A: Allocator> LoggingAllocator<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    /// The wrapped allocator.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

// SAFETY: every request is forwarded unchanged to `inner`, which upholds the
// `Allocator` contract; the wrapper only observes.
unsafe impl<A: Allocator> Allocator for LoggingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        match self.inner.allocate(layout) {
            Ok(ptr) => {
                debug!(
                    "allocate(size = {}, align = {}) -> {:p}",
                    layout.size(),
                    layout.align(),
                    ptr.cast::<u8>()
                );
                Ok(ptr)
            }
            Err(e) => {
                warn!(
                    "allocate(size = {}, align = {}) failed",
                    layout.size(),
                    layout.align()
                );
                Err(e)
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        debug!(
            "deallocate({:p}, size = {}, align = {})",
            ptr,
            layout.size(),
            layout.align()
        );
        // SAFETY: the caller guarantees `ptr` was allocated by `self` with
        // `layout`, and `self` obtained it from `inner`.
        unsafe { self.inner.deallocate(ptr, layout) }
    }
}
