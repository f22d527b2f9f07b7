use core::fmt;
use core::fmt::Write as _;

use alloc::string::String;

use allocator_api2::alloc::{Allocator, Global};
use allocator_api2::vec::Vec;
use log::trace;

use crate::compare::{Compare, Natural};
use crate::error::{AllocErrorWithLayout, AllocResult, AllocResultExt, Error};

mod iters;
mod node;

#[cfg(test)]
mod tests;

pub use iters::{Iter, IterMut, Keys, Values, ValuesMut};
use node::{Color, Node, NodeId, NodeLinks, NIL};

/// An ordered map backed by a red-black tree whose nodes are obtained from
/// an explicit allocator.
///
/// Keys are kept unique under the ordering predicate `C`: two keys are the
/// same key when neither is [`less`](Compare::less) than the other.
/// Inserting a key that is already present leaves the map untouched.
///
/// Nodes live in a single arena allocated from `A`, next to a sentinel node
/// that stands for every absent child and for the root's absent parent.
/// Building an empty map allocates exactly that sentinel. Nodes are never
/// removed individually; dropping the map (or calling
/// [`clear`](RbTreeMap::clear)) destroys every entry, children before
/// parents, and returns all storage to `A`.
///
/// The map is deliberately not [`Clone`].
///
/// # Examples
///
/// ```
/// use allocated_rbtree::RbTreeMap;
///
/// let mut map = RbTreeMap::new();
/// for k in [5, 3, 8, 1, 4, 7, 9] {
///     map.insert(k, k * 10);
/// }
///
/// assert_eq!(map.at(&4), Ok(&40));
/// assert!(map.keys().copied().eq([1, 3, 4, 5, 7, 8, 9]));
/// ```
pub struct RbTreeMap<K, V, C = Natural, A: Allocator = Global> {
    nodes: Vec<Node<K, V>, A>,
    root: NodeId,
    less: C,
}

impl<K: PartialOrd, V> RbTreeMap<K, V> {
    /// Creates an empty map ordered by `K`'s [`PartialOrd`], using the global
    /// allocator.
    ///
    /// # Panics
    ///
    /// Aborts through [`handle_alloc_error`](alloc::alloc::handle_alloc_error)
    /// if the sentinel cannot be allocated.
    pub fn new() -> Self {
        Self::with_comparator_in(Natural, Global).handle_alloc_error()
    }
}

impl<K: PartialOrd, V> Default for RbTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PartialOrd, V, A: Allocator> RbTreeMap<K, V, Natural, A> {
    /// Creates an empty map ordered by `K`'s [`PartialOrd`], allocating from
    /// `alloc`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the sentinel cannot be allocated.
    pub fn new_in(alloc: A) -> AllocResult<Self> {
        Self::with_comparator_in(Natural, alloc)
    }
}

impl<K, V, C: Compare<K>> RbTreeMap<K, V, C> {
    /// Creates an empty map ordered by `less`, using the global allocator.
    ///
    /// ```
    /// use allocated_rbtree::RbTreeMap;
    ///
    /// let mut map = RbTreeMap::with_comparator(|a: &i32, b: &i32| a > b);
    /// map.insert(1, ());
    /// map.insert(3, ());
    /// map.insert(2, ());
    /// assert!(map.keys().copied().eq([3, 2, 1]));
    /// ```
    pub fn with_comparator(less: C) -> Self {
        Self::with_comparator_in(less, Global).handle_alloc_error()
    }
}

impl<K, V, C, A: Allocator> RbTreeMap<K, V, C, A> {
    /// Creates an empty map ordered by `less`, allocating from `alloc`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the sentinel cannot be allocated.
    pub fn with_comparator_in(less: C, alloc: A) -> AllocResult<Self> {
        let mut nodes = Vec::new_in(alloc);
        nodes
            .try_reserve_exact(1)
            .map_err(AllocErrorWithLayout::from_reserve::<Node<K, V>>)?;
        nodes.push(Node::sentinel());

        Ok(Self {
            nodes,
            root: NIL,
            less,
        })
    }

    /// Returns the number of entries in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_nil()
    }

    /// Returns a reference to the map's allocator.
    pub fn allocator(&self) -> &A {
        self.nodes.allocator()
    }

    /// Returns a reference to the map's ordering predicate.
    pub fn comparator(&self) -> &C {
        &self.less
    }

    /// A cursor at the smallest key, or at the end if the map is empty.
    pub fn begin(&self) -> Iter<'_, K, V> {
        Iter::new(&self.nodes, self.nodes.leftmost(self.root))
    }

    /// The cursor one past the largest key. It yields nothing.
    pub fn end(&self) -> Iter<'_, K, V> {
        Iter::new(&self.nodes, NIL)
    }

    /// Gets an iterator over the entries of the map, sorted by key.
    ///
    /// Same as [`begin`](RbTreeMap::begin).
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.begin()
    }

    /// Gets an iterator over the entries of the map, sorted by key, with
    /// mutable references to the values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let first = self.nodes.leftmost(self.root);
        IterMut::new(&mut self.nodes, first)
    }

    /// Gets an iterator over the keys of the map, in sorted order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Gets an iterator over the values of the map, in order by key.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Gets a mutable iterator over the values of the map, in order by key.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Returns the entry with the smallest key.
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.begin().current()
    }

    /// Returns the entry with the largest key.
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        Iter::new(&self.nodes, self.nodes.rightmost(self.root)).current()
    }

    /// Destroys every entry, keeping only the sentinel.
    ///
    /// Storage for the entries is returned to the allocator.
    ///
    /// If a key or value panics while being dropped, the remaining entries
    /// are leaked but the map is still left empty.
    pub fn clear(&mut self) {
        struct Truncate<'a, K, V, A: Allocator>(&'a mut Vec<Node<K, V>, A>);

        impl<K, V, A: Allocator> Drop for Truncate<'_, K, V, A> {
            fn drop(&mut self) {
                // Dead slots own nothing, so dropping them is a no-op.
                self.0.truncate(1);
            }
        }

        let root = core::mem::replace(&mut self.root, NIL);
        let mut guard = Truncate(&mut self.nodes);
        destroy_entries(&mut *guard.0, root);
        drop(guard);
        self.nodes.shrink_to_fit();
    }

    #[inline]
    fn color(&self, id: NodeId) -> Color {
        self.nodes[id.index()].color
    }

    #[inline]
    fn set_color(&mut self, id: NodeId, color: Color) {
        debug_assert!(!id.is_nil() || color == Color::Black);
        self.nodes[id.index()].color = color;
    }

    #[inline]
    fn set_left(&mut self, id: NodeId, left: NodeId) {
        self.nodes[id.index()].links.left = left;
    }

    #[inline]
    fn set_right(&mut self, id: NodeId, right: NodeId) {
        self.nodes[id.index()].links.right = right;
    }

    #[inline]
    fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        if !id.is_nil() {
            self.nodes[id.index()].links.parent = parent;
        }
    }

    /// Puts `new` where `old` hangs from `old`'s parent (or at the root).
    fn replace_child(&mut self, old: NodeId, new: NodeId) {
        let parent = self.nodes.parent(old);
        if parent.is_nil() {
            self.root = new;
        } else if self.nodes.left(parent) == old {
            self.set_left(parent, new);
        } else {
            self.set_right(parent, new);
        }
        self.set_parent(new, parent);
    }

    /// ```text
    ///     x                y
    ///    / \              / \
    ///   a   y     =>     x   c
    ///      / \          / \
    ///     b   c        a   b
    /// ```
    fn rotate_left(&mut self, x: NodeId) {
        let y = self.nodes.right(x);
        debug_assert!(!y.is_nil());

        let b = self.nodes.left(y);
        self.set_right(x, b);
        self.set_parent(b, x);

        self.replace_child(x, y);

        self.set_left(y, x);
        self.set_parent(x, y);
    }

    /// ```text
    ///       y            x
    ///      / \          / \
    ///     x   c   =>   a   y
    ///    / \              / \
    ///   a   b            b   c
    /// ```
    fn rotate_right(&mut self, y: NodeId) {
        let x = self.nodes.left(y);
        debug_assert!(!x.is_nil());

        let b = self.nodes.right(x);
        self.set_left(y, b);
        self.set_parent(b, y);

        self.replace_child(y, x);

        self.set_right(x, y);
        self.set_parent(y, x);
    }

    /// Restores the red-black invariants after `z` was linked in red.
    fn insert_fixup(&mut self, mut z: NodeId) {
        while self.color(self.nodes.parent(z)) == Color::Red {
            // A red parent is never the root, so the grandparent exists.
            let parent = self.nodes.parent(z);
            let grandparent = self.nodes.parent(parent);

            if parent == self.nodes.left(grandparent) {
                let uncle = self.nodes.right(grandparent);
                if self.color(uncle) == Color::Red {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    z = grandparent;
                    continue;
                }

                if z == self.nodes.right(parent) {
                    z = parent;
                    self.rotate_left(z);
                }
                let parent = self.nodes.parent(z);
                let grandparent = self.nodes.parent(parent);
                self.set_color(parent, Color::Black);
                self.set_color(grandparent, Color::Red);
                self.rotate_right(grandparent);
            } else {
                let uncle = self.nodes.left(grandparent);
                if self.color(uncle) == Color::Red {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    z = grandparent;
                    continue;
                }

                if z == self.nodes.left(parent) {
                    z = parent;
                    self.rotate_right(z);
                }
                let parent = self.nodes.parent(z);
                let grandparent = self.nodes.parent(parent);
                self.set_color(parent, Color::Black);
                self.set_color(grandparent, Color::Red);
                self.rotate_left(grandparent);
            }
        }

        let root = self.root;
        self.set_color(root, Color::Black);
    }
}

impl<K, V, C: Compare<K>, A: Allocator> RbTreeMap<K, V, C, A> {
    /// The node holding `key`, or [`NIL`].
    fn search(&self, key: &K) -> NodeId {
        let mut at = self.root;
        while !at.is_nil() {
            let node = &self.nodes[at.index()];
            // SAFETY: `at` is reachable from the root, so it is live.
            let here = unsafe { node.key() };
            if self.less.less(key, here) {
                at = node.links.left;
            } else if self.less.less(here, key) {
                at = node.links.right;
            } else {
                return at;
            }
        }
        NIL
    }

    /// Links `key` into the tree unless it is already present.
    ///
    /// Returns the node now holding `key` and whether it was created. The
    /// arena slot is reserved before any link changes, so a failed
    /// allocation leaves the tree exactly as it was.
    fn insert_node(&mut self, key: K, value: V) -> AllocResult<(NodeId, bool)> {
        let mut parent = NIL;
        let mut at = self.root;
        let mut go_left = false;
        while !at.is_nil() {
            parent = at;
            let node = &self.nodes[at.index()];
            // SAFETY: `at` is reachable from the root, so it is live.
            let here = unsafe { node.key() };
            if self.less.less(&key, here) {
                go_left = true;
                at = node.links.left;
            } else if self.less.less(here, &key) {
                go_left = false;
                at = node.links.right;
            } else {
                return Ok((at, false));
            }
        }

        self.nodes
            .try_reserve(1)
            .map_err(AllocErrorWithLayout::from_reserve::<Node<K, V>>)?;

        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(key, value, parent));

        if parent.is_nil() {
            self.root = id;
        } else if go_left {
            self.set_left(parent, id);
        } else {
            self.set_right(parent, id);
        }

        self.insert_fixup(id);
        Ok((id, true))
    }

    /// Inserts `key` with `value` unless the key is already present.
    ///
    /// Returns `true` if the entry was inserted. When the key is present the
    /// map is left untouched: the stored value is kept and the given key and
    /// value are dropped.
    ///
    /// # Panics
    ///
    /// Aborts through [`handle_alloc_error`](alloc::alloc::handle_alloc_error)
    /// if a new node cannot be allocated.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.try_insert(key, value).handle_alloc_error()
    }

    /// Like [`insert`](RbTreeMap::insert), but reports allocation failure
    /// instead of aborting. On failure the map is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a new node cannot be allocated.
    pub fn try_insert(&mut self, key: K, value: V) -> AllocResult<bool> {
        let (_, inserted) = self.insert_node(key, value)?;
        if !inserted {
            trace!("insert: key already present, map left unchanged");
        }
        Ok(inserted)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        !self.search(key).is_nil()
    }

    /// Returns a reference to the value stored for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the stored key and value for `key`.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        Iter::new(&self.nodes, self.search(key)).current()
    }

    /// Returns a mutable reference to the value stored for `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let at = self.search(key);
        if at.is_nil() {
            return None;
        }
        // SAFETY: `at` was found by search, so it is live.
        let (_, v) = unsafe { self.nodes[at.index()].key_value_mut() };
        Some(v)
    }

    /// Returns the value stored for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key is absent. The map is never
    /// modified.
    pub fn at(&self, key: &K) -> Result<&V, Error> {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    /// Returns a mutable reference to the value stored for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key is absent.
    pub fn at_mut(&mut self, key: &K) -> Result<&mut V, Error> {
        self.get_mut(key).ok_or(Error::KeyNotFound)
    }

    /// A cursor at `key`, or [`end`](RbTreeMap::end) if the key is absent.
    ///
    /// ```
    /// use allocated_rbtree::RbTreeMap;
    ///
    /// let mut map = RbTreeMap::new();
    /// map.insert(1, 'a');
    /// map.insert(2, 'b');
    ///
    /// assert_eq!(map.find(&2).current(), Some((&2, &'b')));
    /// assert_eq!(map.find(&3), map.end());
    /// ```
    pub fn find(&self, key: &K) -> Iter<'_, K, V> {
        Iter::new(&self.nodes, self.search(key))
    }

    /// A mutable cursor at `key`, or at the end if the key is absent.
    pub fn find_mut(&mut self, key: &K) -> IterMut<'_, K, V> {
        let at = self.search(key);
        IterMut::new(&mut self.nodes, at)
    }

    /// Returns the value for `key`, first inserting `V::default()` if the
    /// key is absent.
    ///
    /// This is index-style access: unlike [`at`](RbTreeMap::at) it always
    /// succeeds, and a lookup of a missing key grows the map.
    ///
    /// ```
    /// use allocated_rbtree::RbTreeMap;
    ///
    /// let mut map: RbTreeMap<u32, u32> = RbTreeMap::new();
    /// assert_eq!(*map.get_or_insert_default(42), 0);
    /// assert_eq!(map.len(), 1);
    /// assert!(!map.find(&42).is_end());
    /// ```
    ///
    /// # Panics
    ///
    /// Aborts through [`handle_alloc_error`](alloc::alloc::handle_alloc_error)
    /// if a new node cannot be allocated.
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Returns the value for `key`, first inserting `f()` if the key is
    /// absent. `f` is not called when the key is present.
    ///
    /// # Panics
    ///
    /// Aborts through [`handle_alloc_error`](alloc::alloc::handle_alloc_error)
    /// if a new node cannot be allocated.
    pub fn get_or_insert_with<F: FnOnce() -> V>(&mut self, key: K, f: F) -> &mut V {
        self.try_get_or_insert_with(key, f).handle_alloc_error()
    }

    /// Like [`get_or_insert_with`](RbTreeMap::get_or_insert_with), but
    /// reports allocation failure instead of aborting.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a new node cannot be allocated. The map is unchanged.
    pub fn try_get_or_insert_with<F: FnOnce() -> V>(
        &mut self,
        key: K,
        f: F,
    ) -> AllocResult<&mut V> {
        let mut at = self.search(&key);
        if at.is_nil() {
            trace!("get_or_insert: key absent, inserting a new value");
            (at, _) = self.insert_node(key, f())?;
        }
        // SAFETY: `at` was either found by search or just inserted.
        let (_, v) = unsafe { self.nodes[at.index()].key_value_mut() };
        Ok(v)
    }
}

/// Drops every key and value below `root` in post-order: left subtree,
/// right subtree, then the node itself.
///
/// The walk needs neither recursion nor a stack. It descends to a leaf,
/// destroys it, unhooks it from its parent and climbs back up, so the parent
/// becomes a leaf once both of its subtrees are gone. Afterwards every slot
/// that was reachable is dead and the sentinel is untouched.
///
/// The caller must already have detached `root` from the map.
fn destroy_entries<K, V>(nodes: &mut [Node<K, V>], root: NodeId) {
    let mut at = root;

    while !at.is_nil() {
        let links = nodes.links(at);
        if !links.left.is_nil() {
            at = links.left;
            continue;
        }
        if !links.right.is_nil() {
            at = links.right;
            continue;
        }

        // SAFETY: `at` is reachable from `root`, so it is a live
        // non-sentinel node, and it is unhooked below so it is never
        // reached again.
        unsafe { nodes[at.index()].destroy() };

        let parent = links.parent;
        if !parent.is_nil() {
            let parent_links = &mut nodes[parent.index()].links;
            if parent_links.left == at {
                parent_links.left = NIL;
            } else {
                parent_links.right = NIL;
            }
        }
        at = parent;
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C, A: Allocator> RbTreeMap<K, V, C, A> {
    /// Renders the node graph in Graphviz `dot` syntax.
    ///
    /// Every node is drawn in its color and labelled with its entry; the
    /// sentinel is not drawn.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        // Writing into a `String` cannot fail.
        let _ = self.write_dot(&mut out);
        out
    }

    fn write_dot(&self, out: &mut String) -> fmt::Result {
        out.write_str("digraph G {\n")?;
        out.write_str("node [style=filled; fontcolor=white];\n")?;

        let mut at = self.nodes.leftmost(self.root);
        while !at.is_nil() {
            let node = &self.nodes[at.index()];
            // SAFETY: `at` is reachable from the root, so it is live.
            let (k, v) = unsafe { node.key_value() };
            let fill = match node.color {
                Color::Red => "red",
                Color::Black => "black",
            };
            writeln!(
                out,
                "\"n{}\" [fillcolor={}; label=\"{:?}: {:?}\"];",
                at.index(),
                fill,
                k,
                v
            )?;
            for child in [node.links.left, node.links.right] {
                if !child.is_nil() {
                    writeln!(out, "\"n{}\" -> \"n{}\";", at.index(), child.index())?;
                }
            }
            at = self.nodes.successor(at);
        }

        out.write_str("}\n")
    }
}

impl<K, V, C, A: Allocator> Drop for RbTreeMap<K, V, C, A> {
    fn drop(&mut self) {
        let root = core::mem::replace(&mut self.root, NIL);
        destroy_entries(&mut self.nodes, root);
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C, A: Allocator> fmt::Debug for RbTreeMap<K, V, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: PartialOrd, V> FromIterator<(K, V)> for RbTreeMap<K, V> {
    /// Builds a map from `(key, value)` pairs. For repeated keys the first
    /// pair wins.
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V, C: Compare<K>, A: Allocator> Extend<(K, V)> for RbTreeMap<K, V, C, A> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'s, K, V, C, A: Allocator> IntoIterator for &'s RbTreeMap<K, V, C, A> {
    type IntoIter = Iter<'s, K, V>;
    type Item = (&'s K, &'s V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'s, K, V, C, A: Allocator> IntoIterator for &'s mut RbTreeMap<K, V, C, A> {
    type IntoIter = IterMut<'s, K, V>;
    type Item = (&'s K, &'s mut V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
