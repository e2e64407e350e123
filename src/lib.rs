/*! # About
This crate is an exploration of rank-balanced search trees in safe Rust,
centered on the weak AVL (WAVL) tree of Haeupler, Sen, and Tarjan. WAVL trees
sit between the two classical balanced BSTs: insert-only workloads produce
exactly the AVL shape, the worst-case height matches red-black trees at
_2 * log2(n)_, and a deletion never needs more than two rotations. The whole
balance discipline runs on a single stored bit per node (the parity of the
node's conceptual rank), which is the part that makes the structure fun to
build.

# Trees
- [WAVL tree](crate::hierarchies::wavl_tree): The core structure. A flat,
arena-allocated tree with iterative (read: non-recursive) search, insert, and
remove, ordered by caller-supplied comparator callbacks so records never need
to be `Ord` themselves. Callers hold opaque `Position` handles to resident
records. Includes the rank-parity rebalancing machinery: the post-insert
promotion walk and the post-delete demotion walk with its rotation finishes.

# Maps
- [Sorted tree map](crate::associative::wavl_tree_map): A proper sorted map
built over the WAVL tree, pairing keys with values through an `Entry<K, V>`
record and replace-on-collision `put` semantics. Iteration yields entries in
ascending key order.
*/

// Declaring only what we want to surface
pub mod hierarchies {
    pub mod wavl_tree; // ✔️
}
pub mod associative {
    pub mod wavl_tree_map; // ✔️
}
