use core::alloc::Layout;
use core::fmt;

use allocator_api2::collections::{TryReserveError, TryReserveErrorKind};

/// The allocator refused a request made by a fallible operation.
///
/// Carries the layout that could not be satisfied so it can be forwarded to
/// [`handle_alloc_error`](alloc::alloc::handle_alloc_error).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocErrorWithLayout {
    layout: Layout,
}

impl AllocErrorWithLayout {
    pub(crate) fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Converts a failed `try_reserve` on storage of `T`.
    ///
    /// A refused allocation keeps the layout that was actually requested. A
    /// capacity overflow never reached the allocator, so it reports the
    /// layout of a single `T`.
    pub(crate) fn from_reserve<T>(e: TryReserveError) -> Self {
        match e.kind() {
            TryReserveErrorKind::AllocError { layout, .. } => Self::new(layout),
            TryReserveErrorKind::CapacityOverflow => Self::new(Layout::new::<T>()),
        }
    }

    /// The layout of the request that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl fmt::Display for AllocErrorWithLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory allocation of {} bytes (align {}) failed",
            self.layout.size(),
            self.layout.align()
        )
    }
}

impl core::error::Error for AllocErrorWithLayout {}

/// Errors reported by [`RbTreeMap`](crate::RbTreeMap).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// A value was requested for a key that is not in the map.
    KeyNotFound,
    /// Storage for a new node could not be obtained.
    Alloc(AllocErrorWithLayout),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyNotFound => f.write_str("key not found"),
            Error::Alloc(e) => e.fmt(f),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::KeyNotFound => None,
            Error::Alloc(e) => Some(e),
        }
    }
}

impl From<AllocErrorWithLayout> for Error {
    fn from(e: AllocErrorWithLayout) -> Self {
        Error::Alloc(e)
    }
}

pub type AllocResult<T> = Result<T, AllocErrorWithLayout>;

/// Escalates an allocation failure to the global out-of-memory handler.
pub trait AllocResultExt<T> {
    /// Returns the success value, or aborts through
    /// [`handle_alloc_error`](alloc::alloc::handle_alloc_error).
    fn handle_alloc_error(self) -> T;
}

impl<T> AllocResultExt<T> for AllocResult<T> {
    #[inline]
    fn handle_alloc_error(self) -> T {
        match self {
            Ok(t) => t,
            Err(e) => alloc::alloc::handle_alloc_error(e.layout),
        }
    }
}
