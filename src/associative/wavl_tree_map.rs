/*! A sorted map over the WAVL tree

# About
This sorted map uses the library's [WAVL tree](crate::hierarchies::wavl_tree)
as its backing structure, providing _O(log(n))_ search, insert, and delete
operations with the tree's worst-case height guarantee of _2 * log2(n)_.

The backing tree orders opaque records through callback comparators and
refuses duplicate keys outright, so the map supplies `Entry<K, V>` records,
key-derived comparators, and replace-on-collision `put` semantics on top.

# Example
```rust
    use wavl_tree::associative::wavl_tree_map::TreeMap;

    let mut map: TreeMap<&str, u32> = TreeMap::new();

    map.put("alpha", 1);
    map.put("bravo", 2);

    // Colliding keys replace the resident entry and hand the old one back
    let old = map.put("alpha", 3).unwrap();
    assert_eq!(*old.value(), 1);

    assert_eq!(map.size(), 2);
    assert_eq!(map.get(&"alpha"), Some(&3));

    // Iteration runs in key order
    let keys: Vec<&str> = map.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, ["alpha", "bravo"]);
```
*/

use crate::hierarchies::wavl_tree::{InOrderIter, WavlTree};

use std::cmp::Ordering;

/// The record stored in the backing tree: a key/value pair ordered by key.
///
/// See the [module-level documentation](crate::associative::wavl_tree_map)
/// for more details.
#[derive(Debug)]
pub struct Entry<K, V> {
    key: K,
    value: V,
}
impl<K, V> Entry<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }
}

// The tree never sees K or V directly; these two adapters hand it a key
// ordering over Entry records. An Ord-backed comparison has no failure case,
// so the status side of the comparator contract stays unused here.
fn entry_node_cmp<K: Ord, V>(lhs: &Entry<K, V>, rhs: &Entry<K, V>) -> Result<Ordering, u32> {
    Ok(lhs.key.cmp(&rhs.key))
}
fn entry_key_cmp<K: Ord, V>(key: &K, entry: &Entry<K, V>) -> Result<Ordering, u32> {
    Ok(key.cmp(&entry.key))
}

/// # About
///
/// See the [module-level documentation](crate::associative::wavl_tree_map)
/// for more details.
#[derive(Debug)]
pub struct TreeMap<K, V> {
    tree: WavlTree<K, Entry<K, V>>,
}
// Im just here to make Clippy happy
impl<K, V> Default for TreeMap<K, V>
where
    K: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
impl<K, V> TreeMap<K, V>
where
    K: Ord + Clone,
{
    /// Constructor
    pub fn new() -> Self {
        Self {
            tree: WavlTree::new(entry_node_cmp::<K, V>, entry_key_cmp::<K, V>),
        }
    }

    /// Returns the number of entries in the map.
    pub fn size(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns `true` if the map contains an entry associated with the given
    /// key.
    pub fn contains(&self, key: &K) -> bool {
        self.tree.contains(key)
    }

    /// Returns a reference to the value associated with the key, if `Some`.
    pub fn get(&self, key: &K) -> Option<&V> {
        let position = self.tree.find(key).ok()?;
        self.tree.get(&position).map(|entry| &entry.value)
    }

    /// Inserts the entry into the map. If the key already exists, the
    /// resident entry is removed and returned and the new one takes its
    /// place.
    pub fn put(&mut self, key: K, value: V) -> Option<Entry<K, V>> {
        let old = self.remove(&key);

        // The tree wants the search key alongside the record that carries it
        let lookup = key.clone();
        self.tree
            .insert(&lookup, Entry { key, value })
            .expect("Error: The key was just vacated and Ord cannot fail");

        old
    }

    /// Removes and returns the entry associated with the key, if it exists
    /// in the map.
    pub fn remove(&mut self, key: &K) -> Option<Entry<K, V>> {
        let position = self.tree.find(key).ok()?;
        self.tree.remove(&position).ok()
    }

    /// Returns an iterator over borrowed key/value pairs. The pairs appear
    /// in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            iter: self.tree.iter(),
        }
    }
}

pub struct Iter<'a, K, V> {
    iter: InOrderIter<'a, Entry<K, V>>,
}
impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|entry| (&entry.key, &entry.value))
    }
}

#[test]
// Generic type test
fn wavl_tree_map_test() {
    let mut map = TreeMap::<&str, u8>::new();

    assert_eq!(map.size(), 0);
    assert!(map.is_empty());

    // Illustrates that put() and get() work
    map.put("Peter", 40);
    assert_eq!(map.size(), 1);
    assert_eq!(map.get(&"Peter"), Some(&40));

    map.put("Brain", 39);
    map.put("Remus", 22);
    map.put("Bobson", 36);
    map.put("Dingus", 18);
    map.put("Dangus", 27);
    assert_eq!(map.size(), 6);

    // Illustrates that contains() works as intended
    assert!(map.contains(&"Dingus"));
    assert!(!map.contains(&"Dorkus"));

    // Illustrates that put() returns old values and
    // overwrites existing values upon collision
    let old = map.put("Peter", 41).unwrap();
    assert_eq!(*old.value(), 40_u8);
    assert_eq!(old.key(), &"Peter");
    let new_val = map.get(&"Peter").unwrap();
    assert_eq!(*new_val, 41);
    assert_eq!(map.size(), 6);

    // Illustrates that remove() takes entries out by key and returns them
    assert!(map.contains(&"Dangus"));
    let removed = map.remove(&"Dangus").unwrap();
    assert_eq!(removed.key(), &"Dangus");
    assert_eq!(*removed.value(), 27);
    assert_eq!(map.size(), 5);
    assert!(!map.contains(&"Dangus"));
    assert!(map.remove(&"Dangus").is_none());
}

#[test]
// Tests that the structure is iterable and sorted
fn iter_test() {
    let text = "and the final paragraph clearly came from the heart,
    or whatever cool yet sensitive organ Sadie kept in place of one.";

    // Character occurrence counts, WAVL-backed
    let mut map = TreeMap::<char, usize>::new();
    for e in text.chars() {
        if let Some(old) = map.remove(&e) {
            map.put(e, old.value + 1);
        } else {
            map.put(e, 1);
        }
    }

    // Establishes parity with the std BTreeMap
    let mut reference = std::collections::BTreeMap::<char, usize>::new();
    for e in text.chars() {
        *reference.entry(e).or_insert(0) += 1;
    }

    let ours: Vec<(char, usize)> = map.iter().map(|(k, v)| (*k, *v)).collect();
    let theirs: Vec<(char, usize)> = reference.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(ours, theirs);

    assert_eq!(map.get(&'a'), Some(&12));
    assert_eq!(map.get(&'e'), Some(&14));
    assert_eq!(map.get(&'u'), None);
}
