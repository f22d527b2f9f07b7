//! A red-black tree map with explicit allocator control.
//!
//! [`RbTreeMap`] is an ordered map with three core operations: insert a key
//! if it is absent, look a key up, and walk every entry in key order. Its
//! nodes come from any [`Allocator`](allocator_api2::alloc::Allocator), and
//! its ordering comes from any [`Compare`] predicate.
//!
//! # Quick Start
//!
//! ```
//! use allocated_rbtree::RbTreeMap;
//!
//! let mut map = RbTreeMap::new();
//! map.insert(1, "one");
//! map.insert(2, "two");
//! map.insert(3, "three");
//!
//! assert_eq!(map.get(&2), Some(&"two"));
//! assert_eq!(map.len(), 3);
//! ```
//!
//! # Semantics worth knowing
//!
//! - Inserting a key that is already present is a silent no-op: the first
//!   value stays. [`insert`](RbTreeMap::insert) returns `false` in that case.
//! - [`at`](RbTreeMap::at) fails with [`Error::KeyNotFound`] for a missing
//!   key, while [`get_or_insert_default`](RbTreeMap::get_or_insert_default)
//!   inserts a default value instead. The latter mutates the map even when
//!   used only to read.
//! - There is no removal of individual keys. [`clear`](RbTreeMap::clear) and
//!   dropping the map release everything at once.
//!
//! # Counting Allocations
//!
//! [`CountingAllocator`] wraps another allocator and counts every call.
//! [`LoggingAllocator`] does the same job for the [`log`] facade, and the
//! two stack.
//!
//! ```
//! use allocated_rbtree::{CountingAllocator, RbTreeMap};
//!
//! let alloc = CountingAllocator::default();
//! let mut map = RbTreeMap::new_in(&alloc)?;
//!
//! // The empty map holds only its sentinel.
//! assert_eq!(alloc.n_allocations(), 1);
//!
//! map.extend((0..100).map(|i| (i, i * i)));
//! drop(map);
//!
//! assert_eq!(alloc.n_allocations(), alloc.n_deallocations());
//! # Ok::<(), allocated_rbtree::AllocErrorWithLayout>(())
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

extern crate alloc;

pub mod compare;
mod counting;
mod error;
mod logging;
mod rbtree;

pub use compare::{Compare, Natural, Reversed};
pub use counting::CountingAllocator;
pub use error::{AllocErrorWithLayout, AllocResult, AllocResultExt, Error};
pub use logging::LoggingAllocator;
pub use rbtree::{Iter, IterMut, Keys, RbTreeMap, Values, ValuesMut};
