#![allow(clippy::undocumented_unsafe_blocks)]

extern crate alloc;
use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use core::cell::{Cell, RefCell};
use core::mem::{align_of, size_of};
use core::ptr::NonNull;
use std::error::Error as StdError;
use std::panic::{catch_unwind, AssertUnwindSafe};

use allocator_api2::alloc::{AllocError, Layout};

use proptest::prelude::*;

use itertools::assert_equal;
use itertools::Itertools;

use simplelog::{Config, LevelFilter, TestLogger};

use crate::{CountingAllocator, LoggingAllocator, Reversed};

use super::node::Links;
use super::*;

/// Checks every red-black and search-tree invariant, returning the black
/// height of the tree (counting the sentinel).
fn check_invariants<K: Ord + fmt::Debug, V, C, A: Allocator>(map: &RbTreeMap<K, V, C, A>) -> usize {
    let sentinel = &map.nodes[NIL.index()];
    assert_eq!(sentinel.color, Color::Black, "sentinel must be black");
    assert_eq!(sentinel.links.parent, NIL);
    assert_eq!(sentinel.links.left, NIL);
    assert_eq!(sentinel.links.right, NIL);

    assert_eq!(map.color(map.root), Color::Black, "root must be black");
    if !map.root.is_nil() {
        assert_eq!(map.nodes.parent(map.root), NIL);
    }

    fn walk<K: Ord + fmt::Debug, V, C, A: Allocator>(
        map: &RbTreeMap<K, V, C, A>,
        at: NodeId,
        count: &mut usize,
    ) -> usize {
        if at.is_nil() {
            return 1;
        }
        *count += 1;

        let node = &map.nodes[at.index()];
        let key = unsafe { node.key() };
        let Links { left, right, .. } = node.links;

        for child in [left, right] {
            if !child.is_nil() {
                assert_eq!(map.nodes.parent(child), at, "broken parent link");
            }
        }
        if !left.is_nil() {
            assert!(unsafe { map.nodes[left.index()].key() } < key);
        }
        if !right.is_nil() {
            assert!(unsafe { map.nodes[right.index()].key() } > key);
        }
        if node.color == Color::Red {
            assert_eq!(map.color(left), Color::Black, "red node {key:?} has a red child");
            assert_eq!(map.color(right), Color::Black, "red node {key:?} has a red child");
        }

        let lh = walk(map, left, count);
        let rh = walk(map, right, count);
        assert_eq!(lh, rh, "black height differs below {key:?}");

        lh + usize::from(node.color == Color::Black)
    }

    let mut count = 0;
    let height = walk(map, map.root, &mut count);
    assert_eq!(count, map.len(), "unreachable nodes in the arena");
    height
}

fn _assert_balanced(alloc: &CountingAllocator) {
    assert_eq!(alloc.net_allocations(), 0);
    assert_eq!(alloc.net_bytes_allocated(), 0);
    assert_eq!(alloc.n_allocations(), alloc.n_deallocations());
}

/// Refuses every request once `budget` allocations have been made.
struct FailAfter<A: Allocator> {
    inner: A,
    budget: Cell<usize>,
}

impl<A: Allocator> FailAfter<A> {
    fn new(inner: A, budget: usize) -> Self {
        Self {
            inner,
            budget: Cell::new(budget),
        }
    }
}

unsafe impl<A: Allocator> Allocator for FailAfter<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let left = self.budget.get();
        if left == 0 {
            return Err(AllocError);
        }
        self.budget.set(left - 1);
        self.inner.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { self.inner.deallocate(ptr, layout) }
    }
}

#[test]
fn test_constructor() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let map = RbTreeMap::<u32, u32, _, _>::new_in(&alloc)?;

    assert_eq!(map.len(), 0);
    assert!(map.is_empty());
    assert!(map.root.is_nil());
    assert_eq!(map.begin(), map.end());
    assert!(map.begin().is_end());
    assert_eq!(map.iter().count(), 0);
    assert!(!map.contains_key(&1));
    assert_eq!(map.get(&1), None);
    assert_eq!(map.first_key_value(), None);
    assert_eq!(map.last_key_value(), None);

    // Only the sentinel has been allocated.
    assert_eq!(alloc.n_allocations(), 1);
    assert_eq!(alloc.n_bytes_allocated(), size_of::<Node<u32, u32>>());

    check_invariants(&map);
    drop(map);

    assert_eq!(alloc.n_deallocations(), 1);
    _assert_balanced(&alloc);

    Ok(())
}

#[test]
fn test_one() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let mut map = RbTreeMap::<u32, u32, _, _>::new_in(&alloc)?;

    assert!(map.try_insert(1, 1)?);

    assert_eq!(map.len(), 1);
    assert!(!map.is_empty());
    assert!(map.contains_key(&1));
    assert_eq!(map.get(&1), Some(&1));
    assert_eq!(map.first_key_value(), Some((&1, &1)));
    assert_eq!(map.last_key_value(), Some((&1, &1)));
    assert_equal(map.iter().map(|(k, v)| (*k, *v)), [(1, 1)]);
    assert_eq!(check_invariants(&map), 2);

    drop(map);
    _assert_balanced(&alloc);

    Ok(())
}

#[test]
fn test_in_order_traversal() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let mut map = RbTreeMap::new_in(&alloc)?;

    for k in [5, 3, 8, 1, 4, 7, 9] {
        assert!(map.insert(k, k));
    }

    assert_eq!(map.len(), 7);
    assert_equal(map.keys().copied(), [1, 3, 4, 5, 7, 8, 9]);
    assert_equal(map.values().copied(), [1, 3, 4, 5, 7, 8, 9]);
    check_invariants(&map);

    drop(map);
    _assert_balanced(&alloc);

    Ok(())
}

#[test]
fn test_duplicate_keeps_first_value() {
    let mut map = RbTreeMap::new();

    assert!(map.insert(5, 50));
    assert!(!map.insert(5, 100));

    assert_eq!(map.len(), 1);
    assert_eq!(map.at(&5), Ok(&50));
    check_invariants(&map);
}

#[test]
fn test_duplicate_drops_rejected_pair() {
    let dropped = Rc::new(RefCell::new(Vec::new()));

    struct Tracked(&'static str, Rc<RefCell<Vec<&'static str>>>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.1.borrow_mut().push(self.0);
        }
    }

    let mut map = RbTreeMap::new();
    map.insert(1, Tracked("first", dropped.clone()));
    map.insert(1, Tracked("second", dropped.clone()));

    assert_eq!(*dropped.borrow(), ["second"]);
    assert_eq!(map.get(&1).map(|t| t.0), Some("first"));

    drop(map);
    assert_eq!(*dropped.borrow(), ["second", "first"]);
}

#[test]
fn test_at_on_empty_map() {
    let map: RbTreeMap<u32, u32> = RbTreeMap::new();
    assert_eq!(map.at(&42), Err(Error::KeyNotFound));
    assert_eq!(map.len(), 0);
}

#[test]
fn test_at_mut() {
    let mut map = RbTreeMap::new();
    map.insert("a", 1);

    *map.at_mut(&"a").unwrap() += 10;
    assert_eq!(map.at(&"a"), Ok(&11));
    assert_eq!(map.at_mut(&"b"), Err(Error::KeyNotFound));
}

#[test]
fn test_get_or_insert_default() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let mut map = RbTreeMap::<u32, u32, _, _>::new_in(&alloc)?;

    assert_eq!(*map.get_or_insert_default(42), 0);
    assert_eq!(map.len(), 1);
    assert!(!map.find(&42).is_end());
    assert_eq!(map.at(&42), Ok(&0));

    *map.get_or_insert_default(42) += 7;
    assert_eq!(map.len(), 1);
    assert_eq!(map.at(&42), Ok(&7));

    check_invariants(&map);
    drop(map);
    _assert_balanced(&alloc);

    Ok(())
}

#[test]
fn test_get_or_insert_with_is_lazy() {
    let mut map = RbTreeMap::new();
    map.insert(1, String::from("one"));

    let v = map.get_or_insert_with(1, || unreachable!("value exists"));
    assert_eq!(v.as_str(), "one");

    let v = map.get_or_insert_with(2, || String::from("two"));
    v.push('!');
    assert_eq!(map.get(&2).map(String::as_str), Some("two!"));
}

#[test]
fn test_sequential_black_height() {
    let mut map = RbTreeMap::new();
    for k in 1..=10 {
        map.insert(k, ());
        check_invariants(&map);
    }
    assert_equal(map.keys().copied(), 1..=10);
}

#[test]
fn test_sequential_shape() {
    // Inserting 1..=10 in order produces a well known shape.
    let mut map = RbTreeMap::new();
    for k in 1..=10u32 {
        map.insert(k, ());
    }

    let root = map.root;
    assert_eq!(unsafe { *map.nodes[root.index()].key() }, 4);
    assert_eq!(check_invariants(&map), 4);
}

#[test]
fn test_descending_and_zigzag() {
    let mut map = RbTreeMap::new();
    for k in (1..=64).rev() {
        map.insert(k, k);
    }
    check_invariants(&map);

    let mut zigzag = RbTreeMap::new();
    for k in [10, 5, 7, 6, 20, 15, 17, 16, 1, 3, 2] {
        zigzag.insert(k, ());
        check_invariants(&zigzag);
    }
    assert_equal(zigzag.keys().copied(), [1, 2, 3, 5, 6, 7, 10, 15, 16, 17, 20]);
}

#[test]
fn test_find() {
    let map: RbTreeMap<_, _> = (0..20).map(|i| (i * 2, i)).collect();

    for i in 0..20 {
        let it = map.find(&(i * 2));
        assert_eq!(it.current(), Some((&(i * 2), &i)));
        assert_ne!(it, map.end());
        assert!(map.find(&(i * 2 + 1)).is_end());
        assert_eq!(map.find(&(i * 2 + 1)), map.end());
    }

    // A found cursor keeps walking to the end.
    assert_equal(map.find(&30).map(|(k, _)| *k), [30, 32, 34, 36, 38]);
    assert_eq!(map.find(&0), map.begin());
}

#[test]
fn test_iterator_equality_is_identity() {
    let a: RbTreeMap<_, _> = [(1, ())].into_iter().collect();
    let b: RbTreeMap<_, _> = [(1, ())].into_iter().collect();

    assert_eq!(a.find(&1), a.begin());
    assert_ne!(a.find(&1), b.find(&1));

    let mut it = a.begin();
    let start = it.clone();
    it.next();
    assert_ne!(it, start);
    assert_eq!(it, a.end());
    assert_eq!(it.current(), None);
    assert_eq!(it.next(), None);
}

#[test]
fn test_iter_mut_and_values_mut() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let mut map = RbTreeMap::new_in(&alloc)?;
    for k in [3u32, 1, 2] {
        map.insert(k, k * 10);
    }

    for (k, v) in map.iter_mut() {
        *v += *k;
    }
    assert_equal(map.iter().map(|(k, v)| (*k, *v)), [(1, 11), (2, 22), (3, 33)]);

    for v in map.values_mut() {
        *v = 0;
    }
    assert!(map.values().all(|v| *v == 0));

    for (_, v) in &mut map {
        *v = 1;
    }
    assert_eq!((&map).into_iter().map(|(_, v)| *v).sum::<u32>(), 3);

    let mut cursor = map.find_mut(&2);
    *cursor.current().unwrap().1 = 99;
    assert_equal(cursor.map(|(k, _)| *k), [2, 3]);
    assert_eq!(map.get(&2), Some(&99));
    assert!(map.find_mut(&7).is_end());

    drop(map);
    _assert_balanced(&alloc);

    Ok(())
}

#[test]
fn test_get_mut() {
    let mut map = RbTreeMap::new();
    map.insert('x', 1);
    if let Some(v) = map.get_mut(&'x') {
        *v = 2;
    }
    assert_eq!(map.get(&'x'), Some(&2));
    assert_eq!(map.get_mut(&'y'), None);
    assert_eq!(map.get_key_value(&'x'), Some((&'x', &2)));
}

#[test]
fn test_reversed_comparator() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let mut map = RbTreeMap::with_comparator_in(Reversed, &alloc)?;
    for k in [5, 3, 8, 1, 4, 7, 9] {
        map.insert(k, ());
    }

    assert_equal(map.keys().copied(), [9, 8, 7, 5, 4, 3, 1]);
    assert_eq!(map.first_key_value(), Some((&9, &())));
    assert_eq!(map.last_key_value(), Some((&1, &())));

    drop(map);
    _assert_balanced(&alloc);

    Ok(())
}

#[test]
fn test_closure_comparator_equivalence() {
    // Keys equal modulo 10 are the same key.
    let mut map = RbTreeMap::with_comparator(|a: &u32, b: &u32| a % 10 < b % 10);
    assert!(map.insert(13, "thirteen"));
    assert!(map.insert(21, "twenty-one"));
    assert!(!map.insert(3, "three"));

    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&33), Some(&"thirteen"));
    assert_equal(map.keys().copied(), [21, 13]);
}

#[test]
fn test_small_strings() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let mut map = RbTreeMap::new_in(&alloc)?;

    for word in ["pear", "apple", "fig", "banana", "cherry", "apple"] {
        map.insert(word.to_string(), word.len());
    }

    assert_equal(
        map.keys().map(String::as_str),
        ["apple", "banana", "cherry", "fig", "pear"],
    );
    assert_eq!(map.at(&"fig".to_string()), Ok(&3));
    check_invariants(&map);

    drop(map);
    _assert_balanced(&alloc);

    Ok(())
}

#[test]
fn test_clear() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let mut map = RbTreeMap::new_in(&alloc)?;
    map.extend((0..50).map(|i| (i, i.to_string())));
    assert_eq!(map.len(), 50);

    map.clear();
    assert!(map.is_empty());
    assert_eq!(map.len(), 0);
    assert_eq!(map.begin(), map.end());
    assert_eq!(alloc.net_allocations(), 1);
    assert_eq!(alloc.net_bytes_allocated(), size_of::<Node<i32, String>>() as isize);
    check_invariants(&map);

    map.insert(7, "seven".to_string());
    assert_eq!(map.at(&7).map(String::as_str), Ok("seven"));
    check_invariants(&map);

    drop(map);
    _assert_balanced(&alloc);

    Ok(())
}

#[test]
fn test_try_insert_failure_leaves_map_unchanged() {
    let counts = CountingAllocator::default();
    {
        let alloc = FailAfter::new(LoggingAllocator::new(&counts), 3);
        let mut map = RbTreeMap::<u32, u32, _, _>::new_in(&alloc).unwrap();

        let mut refused = None;
        for k in 0..64u32 {
            match map.try_insert(k, k * 10) {
                Ok(inserted) => assert!(inserted),
                Err(e) => {
                    refused = Some((k, e));
                    break;
                }
            }
        }
        let (k, e) = refused.expect("allocation budget never ran out");

        // The error describes the arena growth that was refused.
        assert!(e.layout().size() >= 2 * size_of::<Node<u32, u32>>());
        assert_eq!(e.layout().align(), align_of::<Node<u32, u32>>());
        assert!(Error::from(e).to_string().starts_with("memory allocation of"));

        assert_eq!(map.len(), k as usize);
        assert_equal(map.keys().copied(), 0..k);
        assert!(!map.contains_key(&k));
        check_invariants(&map);

        // Present keys need no new storage.
        assert!(!map.try_insert(0, 1).unwrap());
        assert_eq!(*map.try_get_or_insert_with(1, || unreachable!()).unwrap(), 10);

        let called = Cell::new(false);
        let result = map.try_get_or_insert_with(k, || {
            called.set(true);
            7
        });
        assert!(result.is_err());
        assert!(called.get());
        assert_eq!(map.len(), k as usize);
        assert!(map.find(&k).is_end());
        check_invariants(&map);

        drop(map);
    }
    _assert_balanced(&counts);
}

#[test]
fn test_constructor_failure() {
    let counts = CountingAllocator::default();
    let alloc = FailAfter::new(&counts, 0);

    let err = RbTreeMap::<u32, u32, _, _>::new_in(&alloc).unwrap_err();
    assert_eq!(err.layout().size(), size_of::<Node<u32, u32>>());
    assert_eq!(counts.n_allocations(), 0);
}

#[test]
fn test_clear_survives_panicking_drop() {
    struct Bomb(bool);
    impl Drop for Bomb {
        fn drop(&mut self) {
            assert!(!self.0, "value refused to drop");
        }
    }

    let counts = CountingAllocator::default();
    let mut map = RbTreeMap::new_in(&counts).unwrap();
    for k in 0..16u32 {
        map.insert(k, Bomb(k == 5));
    }

    let result = catch_unwind(AssertUnwindSafe(|| map.clear()));
    assert!(result.is_err());

    assert_eq!(map.len(), 0);
    assert!(map.is_empty());
    assert_eq!(map.iter().count(), 0);
    check_invariants(&map);

    map.insert(3, Bomb(false));
    assert_eq!(map.len(), 1);
    check_invariants(&map);

    drop(map);
    _assert_balanced(&counts);
}

#[test]
fn test_teardown_is_post_order() {
    let dropped = Rc::new(RefCell::new(Vec::new()));

    struct Tracked(u32, Rc<RefCell<Vec<u32>>>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.1.borrow_mut().push(self.0);
        }
    }

    let mut map = RbTreeMap::new();
    for k in [4u32, 2, 6, 1, 3, 5, 7] {
        map.insert(k, Tracked(k, dropped.clone()));
    }
    // No rotations were needed: 4 is the root, 2 and 6 its children.
    assert_eq!(unsafe { *map.nodes[map.root.index()].key() }, 4);

    drop(map);
    assert_eq!(*dropped.borrow(), [1, 3, 2, 5, 7, 6, 4]);
}

#[test]
fn test_deep_teardown() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let mut map = RbTreeMap::new_in(&alloc)?;
    for k in 0..100_000u32 {
        map.insert(k, k);
    }
    assert_eq!(map.len(), 100_000);
    assert!(check_invariants(&map) <= 18);

    drop(map);
    _assert_balanced(&alloc);

    Ok(())
}

#[test]
fn test_logging_allocator_logs() -> Result<(), Box<dyn StdError>> {
    let _ = TestLogger::init(LevelFilter::Trace, Config::default());

    let alloc = LoggingAllocator::new(CountingAllocator::default());
    let mut map = RbTreeMap::new_in(&alloc)?;
    map.insert(1, 1);
    map.insert(1, 2);
    drop(map);

    assert!(alloc.inner().n_allocations() >= 2);
    _assert_balanced(alloc.inner());

    Ok(())
}

#[test]
fn test_debug_and_dot() {
    let mut map = RbTreeMap::new();
    map.insert(2, 'b');
    map.insert(1, 'a');
    map.insert(3, 'c');

    assert_eq!(format!("{map:?}"), "{1: 'a', 2: 'b', 3: 'c'}");
    assert_eq!(format!("{:?}", map.find(&2)), "[(2, 'b'), (3, 'c')]");

    let dot = map.to_dot();
    assert!(dot.starts_with("digraph G {\n"));
    assert!(dot.ends_with("}\n"));
    assert_eq!(dot.matches("fillcolor=black").count(), 1);
    assert_eq!(dot.matches("fillcolor=red").count(), 2);
    assert_eq!(dot.matches(" -> ").count(), 2);
    assert!(dot.contains("label=\"2: 'b'\""));
}

#[test]
fn test_size_hint() {
    let map: RbTreeMap<_, _> = (0..5).map(|i| (i, ())).collect();
    let (lower, upper) = map.iter().size_hint();
    assert!(lower <= 5);
    assert_eq!(upper, Some(5));
    assert_eq!(map.end().size_hint(), (0, Some(0)));
}

proptest! {
    #[test]
    fn test_uints(pairs in prop::collection::vec((0..1000u32, 0..1000u32), 1..200)) {
        let alloc = CountingAllocator::default();
        let mut map = RbTreeMap::new_in(&alloc)?;
        for (k, v) in pairs.iter().copied() {
            map.insert(k, v);
        }
        check_invariants(&map);

        // The first value inserted for each key is the one kept.
        let expected: Vec<_> = pairs
            .iter()
            .copied()
            .unique_by(|p| p.0)
            .sorted_by_key(|p| p.0)
            .collect();

        assert_eq!(map.len(), expected.len());
        assert_equal(map.iter().map(|(k, v)| (*k, *v)), expected.iter().copied());

        for (k, v) in &expected {
            assert_eq!(map.at(k), Ok(v));
        }
        for k in 1000..1010u32 {
            assert!(map.find(&k).is_end());
            assert_eq!(map.at(&k), Err(Error::KeyNotFound));
        }

        drop(map);
        _assert_balanced(&alloc);
    }
}

proptest! {
    #[test]
    fn test_strings(mut words in prop::collection::vec(".*", 1..100)) {
        let alloc = CountingAllocator::default();
        let mut map = RbTreeMap::new_in(&alloc)?;
        for w in &words {
            map.insert(w.clone(), ());
        }
        check_invariants(&map);

        words.sort();
        words.dedup();
        assert_equal(map.keys(), words.iter());

        drop(map);
        _assert_balanced(&alloc);
    }
}

proptest! {
    #[test]
    fn test_invariants_after_every_insert(keys in prop::collection::vec(any::<i16>(), 1..150)) {
        let mut map = RbTreeMap::new();
        for k in keys {
            map.insert(k, ());
            check_invariants(&map);
        }
    }
}

proptest! {
    #[test]
    fn test_index_access_matches_entry_or_default(ops in prop::collection::vec((0..50u8, 0..5u32), 1..200)) {
        let mut map = RbTreeMap::new();
        let mut model = std::collections::BTreeMap::new();
        for (k, add) in ops {
            *map.get_or_insert_default(k) += add;
            *model.entry(k).or_insert(0u32) += add;
        }
        check_invariants(&map);
        assert_equal(map.iter(), model.iter());
    }
}
