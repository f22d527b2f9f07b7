use core::fmt;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

/// Stable handle of a node within a tree's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

/// The sentinel. It is black, owns no key or value, and its links are never
/// written.
pub(crate) const NIL: NodeId = NodeId(0);

impl NodeId {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        NodeId(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) fn is_nil(self) -> bool {
        self == NIL
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            f.write_str("NIL")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Color {
    Red,
    Black,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) parent: NodeId,
    pub(crate) left: NodeId,
    pub(crate) right: NodeId,
}

impl Links {
    const DETACHED: Links = Links {
        parent: NIL,
        left: NIL,
        right: NIL,
    };
}

pub(crate) struct Node<K, V> {
    pub(crate) links: Links,
    pub(crate) color: Color,
    entry: MaybeUninit<(K, V)>,
}

impl<K, V> Node<K, V> {
    pub(crate) fn sentinel() -> Self {
        Node {
            links: Links::DETACHED,
            color: Color::Black,
            entry: MaybeUninit::uninit(),
        }
    }

    /// Constructs a red leaf holding `key` and `value` under `parent`.
    pub(crate) fn new(key: K, value: V, parent: NodeId) -> Self {
        Node {
            links: Links {
                parent,
                left: NIL,
                right: NIL,
            },
            color: Color::Red,
            entry: MaybeUninit::new((key, value)),
        }
    }

    /// # Safety
    ///
    /// `self` must not be the sentinel and must not have been destroyed.
    #[inline]
    pub(crate) unsafe fn key(&self) -> &K {
        // SAFETY: requirements match function requirements
        unsafe { &self.entry.assume_init_ref().0 }
    }

    /// # Safety
    ///
    /// `self` must not be the sentinel and must not have been destroyed.
    #[inline]
    pub(crate) unsafe fn key_value(&self) -> (&K, &V) {
        // SAFETY: requirements match function requirements
        let (k, v) = unsafe { self.entry.assume_init_ref() };
        (k, v)
    }

    /// # Safety
    ///
    /// `self` must not be the sentinel and must not have been destroyed.
    #[inline]
    pub(crate) unsafe fn key_value_mut(&mut self) -> (&K, &mut V) {
        // SAFETY: requirements match function requirements
        let (k, v) = unsafe { self.entry.assume_init_mut() };
        (k, v)
    }

    /// Drops the key and value in place. The node's storage stays in the
    /// arena until the arena itself is released.
    ///
    /// # Safety
    ///
    /// `self` must not be the sentinel and must not have been destroyed.
    #[inline]
    pub(crate) unsafe fn destroy(&mut self) {
        // SAFETY: requirements match function requirements
        unsafe { self.entry.assume_init_drop() }
    }
}

/// Read access to the links of an arena of nodes.
///
/// Traversal is written once against this trait and shared between the
/// engine, the read-only iterator and the mutable iterator.
pub(crate) trait NodeLinks {
    fn links(&self, id: NodeId) -> Links;

    #[inline]
    fn parent(&self, id: NodeId) -> NodeId {
        self.links(id).parent
    }

    #[inline]
    fn left(&self, id: NodeId) -> NodeId {
        self.links(id).left
    }

    #[inline]
    fn right(&self, id: NodeId) -> NodeId {
        self.links(id).right
    }

    /// The node with the smallest key in the subtree rooted at `id`.
    fn leftmost(&self, mut id: NodeId) -> NodeId {
        if id.is_nil() {
            return NIL;
        }
        loop {
            let left = self.left(id);
            if left.is_nil() {
                return id;
            }
            id = left;
        }
    }

    /// The node with the largest key in the subtree rooted at `id`.
    fn rightmost(&self, mut id: NodeId) -> NodeId {
        if id.is_nil() {
            return NIL;
        }
        loop {
            let right = self.right(id);
            if right.is_nil() {
                return id;
            }
            id = right;
        }
    }

    /// The in-order successor of `id`, or [`NIL`] if `id` holds the largest
    /// key.
    fn successor(&self, id: NodeId) -> NodeId {
        let right = self.right(id);
        if !right.is_nil() {
            return self.leftmost(right);
        }

        let mut child = id;
        let mut parent = self.parent(id);
        while !parent.is_nil() && child == self.right(parent) {
            child = parent;
            parent = self.parent(parent);
        }
        parent
    }
}

impl<K, V> NodeLinks for [Node<K, V>] {
    #[inline]
    fn links(&self, id: NodeId) -> Links {
        self[id.index()].links
    }
}

/// An arena viewed through a raw pointer, so that links can be followed while
/// mutable borrows of node values are outstanding.
pub(crate) struct RawNodes<K, V> {
    base: NonNull<Node<K, V>>,
    len: usize,
}

impl<K, V> RawNodes<K, V> {
    pub(crate) fn new(nodes: &mut [Node<K, V>]) -> Self {
        Self {
            len: nodes.len(),
            base: NonNull::from(nodes).cast(),
        }
    }

    /// # Safety
    ///
    /// `id` must name a live, non-sentinel node of the arena this was built
    /// from, the arena must still be borrowed for `'a`, and no other
    /// reference to that node's value may exist.
    pub(crate) unsafe fn key_value_mut<'a>(&self, id: NodeId) -> (&'a K, &'a mut V) {
        debug_assert!(!id.is_nil() && id.index() < self.len);
        // SAFETY: id is in bounds of the arena.
        let node = unsafe { self.base.as_ptr().add(id.index()) };
        // SAFETY: only the entry field is borrowed; links stay reachable
        // through `base`. The entry is initialized because `id` is live.
        let entry = unsafe { &mut *ptr::addr_of_mut!((*node).entry) };
        // SAFETY: as above
        let (k, v) = unsafe { entry.assume_init_mut() };
        (k, v)
    }
}

impl<K, V> PartialEq for RawNodes<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base && self.len == other.len
    }
}

impl<K, V> NodeLinks for RawNodes<K, V> {
    #[inline]
    fn links(&self, id: NodeId) -> Links {
        assert!(id.index() < self.len);
        // SAFETY: id is in bounds, and `links` is never covered by a
        // reference handed out by `key_value_mut`.
        unsafe { ptr::addr_of!((*self.base.as_ptr().add(id.index())).links).read() }
    }
}
