use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::ptr;

use super::node::{Node, NodeId, NodeLinks, RawNodes};

/// A read-only cursor over the entries of an [`RbTreeMap`](super::RbTreeMap),
/// moving in ascending key order.
///
/// Created by [`iter`](super::RbTreeMap::iter), [`begin`](super::RbTreeMap::begin),
/// [`end`](super::RbTreeMap::end) and [`find`](super::RbTreeMap::find). As an
/// [`Iterator`] it yields the entry under the cursor and then advances, so an
/// iterator returned by `find` walks from the found key to the end of the
/// map.
///
/// Two cursors compare equal when they point at the same node of the same
/// map. Every end cursor of a map is equal to every other.
pub struct Iter<'a, K, V> {
    nodes: &'a [Node<K, V>],
    at: NodeId,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(super) fn new(nodes: &'a [Node<K, V>], at: NodeId) -> Self {
        Self { nodes, at }
    }

    /// Returns `true` if the cursor is past the last entry.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.at.is_nil()
    }

    /// The entry under the cursor, without advancing. `None` at the end.
    pub fn current(&self) -> Option<(&'a K, &'a V)> {
        if self.at.is_nil() {
            return None;
        }
        let nodes: &'a [Node<K, V>] = self.nodes;
        // SAFETY: `at` is a live node of the borrowed arena.
        Some(unsafe { nodes[self.at.index()].key_value() })
    }
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            at: self.at,
        }
    }
}

impl<K, V> PartialEq for Iter<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.nodes, other.nodes) && self.at == other.at
    }
}

impl<K, V> Eq for Iter<'_, K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current()?;
        self.at = self.nodes.successor(self.at);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.at.is_nil() {
            (0, Some(0))
        } else {
            // Every arena slot but the sentinel holds an entry.
            (1, Some(self.nodes.len() - 1))
        }
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A cursor over the entries of an [`RbTreeMap`](super::RbTreeMap) that
/// hands out mutable references to values, moving in ascending key order.
///
/// Created by [`iter_mut`](super::RbTreeMap::iter_mut) and
/// [`find_mut`](super::RbTreeMap::find_mut). Keys stay immutable, so the
/// ordering of the map cannot be broken through this cursor.
pub struct IterMut<'a, K, V> {
    nodes: RawNodes<K, V>,
    at: NodeId,
    marker: PhantomData<&'a mut Node<K, V>>,
}

impl<'a, K, V> IterMut<'a, K, V> {
    pub(super) fn new(nodes: &'a mut [Node<K, V>], at: NodeId) -> Self {
        Self {
            nodes: RawNodes::new(nodes),
            at,
            marker: PhantomData,
        }
    }

    /// Returns `true` if the cursor is past the last entry.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.at.is_nil()
    }

    /// The entry under the cursor, without advancing. `None` at the end.
    pub fn current(&mut self) -> Option<(&K, &mut V)> {
        if self.at.is_nil() {
            return None;
        }
        // SAFETY: `at` is live, and the returned borrows are tied to
        // `&mut self`, so they end before the cursor can yield this node.
        Some(unsafe { self.nodes.key_value_mut(self.at) })
    }
}

impl<K, V> PartialEq for IterMut<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.at == other.at
    }
}

impl<K, V> Eq for IterMut<'_, K, V> {}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.at.is_nil() {
            return None;
        }
        let current = self.at;
        self.at = self.nodes.successor(current);
        // SAFETY: `current` is live and the cursor never returns to a node
        // it has passed, so this is the only reference to its value.
        Some(unsafe { self.nodes.key_value_mut(current) })
    }
}

impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of an [`RbTreeMap`](super::RbTreeMap), in
/// ascending order.
pub struct Keys<'a, K, V> {
    pub(super) inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of an [`RbTreeMap`](super::RbTreeMap), in
/// order by key.
pub struct Values<'a, K, V> {
    pub(super) inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> FusedIterator for Values<'_, K, V> {}

/// A mutable iterator over the values of an [`RbTreeMap`](super::RbTreeMap),
/// in order by key.
pub struct ValuesMut<'a, K, V> {
    pub(super) inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}
