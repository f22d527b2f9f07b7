//! Ordering predicates for [`RbTreeMap`](crate::RbTreeMap).
//!
//! The tree only ever asks "is `a` strictly less than `b`?". Two keys are
//! considered equal when neither is less than the other, so a predicate must
//! describe a strict weak ordering for the map to behave.

/// A strict "less than" relation over `K`.
pub trait Compare<K: ?Sized> {
    /// Returns `true` if `a` orders strictly before `b`.
    fn less(&self, a: &K, b: &K) -> bool;
}

/// Orders keys by their [`PartialOrd`] implementation, smallest first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Natural;

impl<K: PartialOrd + ?Sized> Compare<K> for Natural {
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        a < b
    }
}

/// Orders keys by their [`PartialOrd`] implementation, largest first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reversed;

impl<K: PartialOrd + ?Sized> Compare<K> for Reversed {
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        b < a
    }
}

impl<K: ?Sized, F: Fn(&K, &K) -> bool> Compare<K> for F {
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        self(a, b)
    }
}
