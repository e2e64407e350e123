/*! A safe, arena-backed weak AVL (WAVL) tree

# About
Weak AVL (WAVL) trees are rank-balanced binary search trees due to Haeupler,
Sen, and Tarjan. Every node carries a conceptual rank, every edge must span a
rank difference of exactly 1 or 2, and every leaf sits at rank 0. Those three
rules bound the height at _2 * log2(n + 1)_, matching red-black trees in the
worst case while behaving exactly like an AVL tree under insert-only
workloads. The payoff over classic AVL is on the delete side: a removal
rebalances with at most two rotations, and restructuring work is _O(1)_
amortized across any operation sequence.

The neat trick is that no rank is ever stored. Every rebalancing decision the
algorithm makes can be phrased as an equality test between rank *parities*, so
each node carries a single bit: the low bit of its rank. An absent child reads
as parity `true` (rank -1 is odd). An edge whose endpoints disagree in parity
spans a difference of 1; endpoints that agree span a difference of 2.

# Design
The design follows the same flat, `Vec`-backed arena approach used elsewhere
in this library: all "pointers" are indexes into the arena, navigation is
iterative (read: non-recursive), and removals leave a `None` hole that a free
list recycles on the next insertion. Callers hold [`Position`] handles into
the arena; removing a node invalidates every handle that names it.

The tree does not require `T: Ord`. Ordering is delegated to two caller
callbacks fixed at construction time: one compares a bare search key against a
resident record, the other compares two resident records. Both return
`Result<Ordering, u32>`, where the `u32` is an opaque caller status that the
tree passes through untouched as [`WavlError::Comparator`]. Comparators must
be deterministic and must not touch the tree (the borrow checker enforces the
latter).

Duplicate keys are rejected outright with [`WavlError::Duplicate`], leaving
the tree unchanged.

# Example
```rust
    use std::cmp::Ordering;
    use wavl_tree::hierarchies::wavl_tree::{WavlError, WavlTree};

    struct Session {
        id: u64,
        open_msgs: u32,
    }

    fn by_id(lhs: &Session, rhs: &Session) -> Result<Ordering, u32> {
        Ok(lhs.id.cmp(&rhs.id))
    }
    fn key_to_session(key: &u64, session: &Session) -> Result<Ordering, u32> {
        Ok(key.cmp(&session.id))
    }

    let mut tree: WavlTree<u64, Session> = WavlTree::new(by_id, key_to_session);

    let first = tree.insert(&17, Session { id: 17, open_msgs: 3 }).unwrap();
    tree.insert(&5, Session { id: 5, open_msgs: 0 }).unwrap();
    tree.insert(&23, Session { id: 23, open_msgs: 9 }).unwrap();

    // Point lookups hand back a handle to the resident record
    let found = tree.find(&23).unwrap();
    assert_eq!(tree.get(&found).unwrap().open_msgs, 9);

    // Equal keys are rejected outright
    assert_eq!(
        tree.insert(&17, Session { id: 17, open_msgs: 0 }).unwrap_err(),
        WavlError::Duplicate,
    );

    // Removal hands the record back by value
    let session = tree.remove(&first).unwrap();
    assert_eq!(session.id, 17);
    assert_eq!(tree.find(&17).unwrap_err(), WavlError::NotFound);

    // Everything else is still in order
    let ids: Vec<u64> = tree.iter().map(|s| s.id).collect();
    assert_eq!(ids, [5, 23]);
```
*/

use std::cmp::Ordering;

use thiserror::Error;

/// Ordering callback comparing a bare search key against a resident record.
///
/// A negative result (`Less`) orders the key before the record, a positive
/// result (`Greater`) after it, and `Equal` means the record matches the key.
/// The `Err` payload is an opaque caller status, surfaced untouched as
/// [`WavlError::Comparator`].
pub type KeyToNodeCmp<K, T> = fn(&K, &T) -> Result<Ordering, u32>;

/// Ordering callback comparing two resident records, with the same direction
/// and error conventions as [`KeyToNodeCmp`].
pub type NodeToNodeCmp<T> = fn(&T, &T) -> Result<Ordering, u32>;

/// Status taxonomy for tree operations. Every failure is one of these four
/// kinds; the tree never recovers from an error internally, and any operation
/// that fails during descent leaves the tree unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WavlError {
    /// A required argument did not name a live node.
    #[error("argument does not name a live node")]
    BadArg,
    /// `insert` found a resident record with an equal key.
    #[error("an equal key is already in the tree")]
    Duplicate,
    /// `find` exhausted the search without a match.
    #[error("no record with a matching key")]
    NotFound,
    /// Opaque status returned by a caller comparator.
    #[error("comparator failed with status {0}")]
    Comparator(u32),
}

/// An opaque handle naming a node in the tree that produced it. A `Position`
/// stays valid until the node it names is removed; after that, reusing it is
/// either rejected with [`WavlError::BadArg`] or, if the slot has since been
/// recycled, silently names the newer occupant. That aliasing hazard is the
/// caller's to manage, exactly as it would be with a raw node pointer.
#[derive(Debug, PartialEq, Eq)]
pub struct Position {
    ptr: usize,
}
impl Position {
    fn new(position: usize) -> Position {
        Position { ptr: position }
    }
    fn get(&self) -> usize {
        self.ptr
    }
}
impl Clone for Position {
    fn clone(&self) -> Self {
        Position { ptr: self.ptr }
    }
}

#[derive(Debug)]
struct WavlNode<T> {
    value: T,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
    // Low bit of the conceptual rank; fresh nodes enter as rank-0 leaves
    rank_parity: bool,
}
impl<T> WavlNode<T> {
    fn new(value: T, parent: Option<usize>) -> Self {
        WavlNode {
            value,
            parent,
            left: None,
            right: None,
            rank_parity: false,
        }
    }
}

/// # About
///
/// See the [module-level documentation](crate::hierarchies::wavl_tree) for
/// more information.
#[derive(Debug)]
pub struct WavlTree<K, T> {
    // Option wrapper so removals can vacate a slot without shifting the rest
    // of the arena; vacated slots queue up on the free list
    arena: Vec<Option<WavlNode<T>>>,
    free: Vec<usize>,
    root: Option<usize>,
    size: usize,
    node_cmp: NodeToNodeCmp<T>,
    key_cmp: KeyToNodeCmp<K, T>,
}

impl<K, T> WavlTree<K, T> {
    /// Creates a new, empty tree ordered by the given callbacks. Construction
    /// cannot fail: both callbacks are taken by value and a `fn` pointer has
    /// no absent state to check for.
    pub fn new(node_cmp: NodeToNodeCmp<T>, key_cmp: KeyToNodeCmp<K, T>) -> Self {
        WavlTree {
            arena: Vec::new(),
            free: Vec::new(),
            root: None,
            size: 0,
            node_cmp,
            key_cmp,
        }
    }

    /// Creates a new, empty tree with a given (growable) initial capacity.
    pub fn new_with_capacity(
        node_cmp: NodeToNodeCmp<T>,
        key_cmp: KeyToNodeCmp<K, T>,
        capacity: usize,
    ) -> Self {
        WavlTree {
            arena: Vec::with_capacity(capacity),
            free: Vec::new(),
            root: None,
            size: 0,
            node_cmp,
            key_cmp,
        }
    }

    /// Returns the number of records currently in the tree.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true if the tree holds no records.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns a reference to the record at the given position, if it is
    /// still live.
    pub fn get(&self, position: &Position) -> Option<&T> {
        self.arena
            .get(position.get())?
            .as_ref()
            .map(|node| &node.value)
    }

    /// Immutable node accessor
    fn node(&self, index: usize) -> &WavlNode<T> {
        self.arena[index]
            .as_ref()
            .expect("Error: Invalid immutable node access")
    }

    /// Mutable node accessor
    fn node_mut(&mut self, index: usize) -> &mut WavlNode<T> {
        self.arena[index]
            .as_mut()
            .expect("Error: Invalid mutable node access")
    }

    /// Places a node in the arena, recycling a vacated slot when one is
    /// available, and returns its index.
    fn allocate(&mut self, node: WavlNode<T>) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.arena[index] = Some(node);
                index
            }
            None => {
                self.arena.push(Some(node));
                self.arena.len() - 1
            }
        }
    }

    /// Rank parity of a possibly-absent node. An absent child sits at rank
    /// -1, which is odd.
    fn parity(&self, node: Option<usize>) -> bool {
        match node {
            Some(index) => self.node(index).rank_parity,
            None => true,
        }
    }

    /// A child whose parity matches its parent's sits two ranks below it.
    fn is_two_child(&self, child: Option<usize>, parent: usize) -> bool {
        self.parity(child) == self.node(parent).rank_parity
    }

    fn is_leaf(&self, index: usize) -> bool {
        let node = self.node(index);
        node.left.is_none() && node.right.is_none()
    }

    /// Returns the other child of the node's parent, or `None` at the root.
    fn sibling(&self, index: usize) -> Option<usize> {
        let parent = self.node(index).parent?;
        let node = self.node(parent);
        if node.left == Some(index) {
            node.right
        } else {
            node.left
        }
    }

    /// Raises the node's rank by one. Only the parity is stored, so this is a
    /// bit flip; a promotion by two would leave the bit untouched and has no
    /// function here.
    fn promote(&mut self, index: usize) {
        let node = self.node_mut(index);
        node.rank_parity = !node.rank_parity;
    }

    /// Lowers the node's rank by one; the same bit flip as [`Self::promote`],
    /// named for the direction of the move.
    fn demote(&mut self, index: usize) {
        let node = self.node_mut(index);
        node.rank_parity = !node.rank_parity;
    }

    // ROTATIONS
    ////////////

    // All four rotation primitives are pure link surgery: they move a constant
    // number of edges, fix the parent back-links and the root, and leave every
    // parity bit alone. The rebalancing walks compose them with the promotions
    // and demotions each case calls for.

    /// Rotates `x`, the right child of its parent, up into the parent's place;
    /// the former parent becomes `x`'s left child and `x`'s old left subtree
    /// reattaches under it.
    fn rotate_left(&mut self, x: usize) {
        let z = self.node(x).parent.expect("Error: Rotation requires a parent");
        let y = self.node(x).left;
        let p_z = self.node(z).parent;

        self.node_mut(x).parent = p_z;
        match p_z {
            Some(p) => {
                if self.node(p).left == Some(z) {
                    self.node_mut(p).left = Some(x);
                } else {
                    self.node_mut(p).right = Some(x);
                }
            }
            None => self.root = Some(x),
        }

        self.node_mut(x).left = Some(z);
        self.node_mut(z).parent = Some(x);

        self.node_mut(z).right = y;
        if let Some(y) = y {
            self.node_mut(y).parent = Some(z);
        }
    }

    /// Mirror image of [`Self::rotate_left`]: `x` is the left child of its
    /// parent and rises rightward over it.
    fn rotate_right(&mut self, x: usize) {
        let z = self.node(x).parent.expect("Error: Rotation requires a parent");
        let y = self.node(x).right;
        let p_z = self.node(z).parent;

        self.node_mut(x).parent = p_z;
        match p_z {
            Some(p) => {
                if self.node(p).left == Some(z) {
                    self.node_mut(p).left = Some(x);
                } else {
                    self.node_mut(p).right = Some(x);
                }
            }
            None => self.root = Some(x),
        }

        self.node_mut(x).right = Some(z);
        self.node_mut(z).parent = Some(x);

        self.node_mut(z).left = y;
        if let Some(y) = y {
            self.node_mut(y).parent = Some(z);
        }
    }

    /// Double rotation, rightward. `y` is an inner grandchild: the right
    /// child of a node `x` that is itself the left child of `z`. `y` rises
    /// two levels into `z`'s place, `x` and `z` become its children, and
    /// `y`'s former subtrees reattach between them.
    fn double_rotate_right(&mut self, y: usize) {
        let x = self.node(y).parent.expect("Error: Double rotation requires a grandparent");
        let z = self.node(x).parent.expect("Error: Double rotation requires a grandparent");
        let p_z = self.node(z).parent;

        // y takes z's place under z's old parent
        self.node_mut(y).parent = p_z;
        match p_z {
            Some(p) => {
                if self.node(p).left == Some(z) {
                    self.node_mut(p).left = Some(y);
                } else {
                    self.node_mut(p).right = Some(y);
                }
            }
            None => self.root = Some(y),
        }

        // y's left subtree holds values below y, so it lands on x's right
        let y_left = self.node(y).left;
        self.node_mut(x).right = y_left;
        if let Some(left) = y_left {
            self.node_mut(left).parent = Some(x);
        }
        self.node_mut(y).left = Some(x);
        self.node_mut(x).parent = Some(y);

        // y's right subtree holds values above y, so it lands on z's left
        let y_right = self.node(y).right;
        self.node_mut(z).left = y_right;
        if let Some(right) = y_right {
            self.node_mut(right).parent = Some(z);
        }
        self.node_mut(y).right = Some(z);
        self.node_mut(z).parent = Some(y);
    }

    /// Mirror image of [`Self::double_rotate_right`]: `y` is the left child
    /// of a node `x` that is the right child of `z`.
    fn double_rotate_left(&mut self, y: usize) {
        let x = self.node(y).parent.expect("Error: Double rotation requires a grandparent");
        let z = self.node(x).parent.expect("Error: Double rotation requires a grandparent");
        let p_z = self.node(z).parent;

        self.node_mut(y).parent = p_z;
        match p_z {
            Some(p) => {
                if self.node(p).left == Some(z) {
                    self.node_mut(p).left = Some(y);
                } else {
                    self.node_mut(p).right = Some(y);
                }
            }
            None => self.root = Some(y),
        }

        let y_left = self.node(y).left;
        self.node_mut(z).right = y_left;
        if let Some(left) = y_left {
            self.node_mut(left).parent = Some(z);
        }
        self.node_mut(y).left = Some(z);
        self.node_mut(z).parent = Some(y);

        let y_right = self.node(y).right;
        self.node_mut(x).left = y_right;
        if let Some(right) = y_right {
            self.node_mut(right).parent = Some(x);
        }
        self.node_mut(y).right = Some(x);
        self.node_mut(x).parent = Some(y);
    }

    // SEARCH AND INSERTION
    ///////////////////////

    /// Searches for a record matching the key and returns its position.
    /// Descent branches on the sign of the comparator result; comparator
    /// failures surface immediately.
    pub fn find(&self, key: &K) -> Result<Position, WavlError> {
        let mut next = self.root;

        while let Some(current) = next {
            let node = self.node(current);
            match (self.key_cmp)(key, &node.value).map_err(WavlError::Comparator)? {
                Ordering::Less => next = node.left,
                Ordering::Greater => next = node.right,
                Ordering::Equal => return Ok(Position::new(current)),
            }
        }

        Err(WavlError::NotFound)
    }

    /// Returns true if a record matching the key is in the tree.
    pub fn contains(&self, key: &K) -> bool {
        self.find(key).is_ok()
    }

    /// Inserts the record at the position the key orders it into and returns
    /// its handle. The key is only used to steer the descent; storing it is
    /// the record's own business. On any error the tree is unchanged and the
    /// record is dropped.
    pub fn insert(&mut self, key: &K, value: T) -> Result<Position, WavlError> {
        let Some(mut parent) = self.root else {
            let index = self.allocate(WavlNode::new(value, None));
            self.root = Some(index);
            self.size += 1;
            return Ok(Position::new(index));
        };

        // Hunt for the attachment point the key orders into
        let (attach, go_left, was_leaf) = loop {
            let dir = (self.key_cmp)(key, &self.node(parent).value)
                .map_err(WavlError::Comparator)?;
            match dir {
                Ordering::Less => match self.node(parent).left {
                    Some(left) => parent = left,
                    None => break (parent, true, self.node(parent).right.is_none()),
                },
                Ordering::Greater => match self.node(parent).right {
                    Some(right) => parent = right,
                    None => break (parent, false, self.node(parent).left.is_none()),
                },
                Ordering::Equal => return Err(WavlError::Duplicate),
            }
        };

        let index = self.allocate(WavlNode::new(value, Some(attach)));
        if go_left {
            self.node_mut(attach).left = Some(index);
        } else {
            self.node_mut(attach).right = Some(index);
        }
        self.size += 1;

        // Filling a unary node's empty side adds a clean 1-edge. Turning a
        // leaf into a unary node leaves the new child at rank difference 0,
        // and that takes a rebalancing walk to repair.
        if was_leaf {
            self.rebalance_insert(index);
        }

        Ok(Position::new(index))
    }

    /// Post-insertion fix-up, starting from a freshly attached node whose
    /// parent was a leaf. Promotes 0,1-parents up the tree until the pattern
    /// breaks, then settles a terminal 0,2-parent with a single rotation.
    fn rebalance_insert(&mut self, at: usize) {
        let mut x = at;
        let mut parent = self.node(x).parent;

        loop {
            let p = parent.expect("Error: Insert rebalance lost its parent");
            self.promote(p);
            x = p;
            parent = self.node(x).parent;

            let Some(p) = parent else {
                // Promoted all the way to the root
                return;
            };

            let par_x = self.node(x).rank_parity;
            let par_p = self.node(p).rank_parity;
            let par_s = self.parity(self.sibling(x));

            if par_x == par_p && par_s != par_x {
                // The parent is 0,1 or 1,0: promote again and keep climbing
                continue;
            }
            if par_x == par_p && par_s == par_p {
                // The parent is 0,2 or 2,0: a rotation finishes the repair
                break;
            }
            // Anything else means the rank rule already holds again
            return;
        }

        let z = parent.expect("Error: Rotation site lost its parent");
        let par_x = self.node(x).rank_parity;

        if self.node(z).left == Some(x) {
            match self.node(x).right {
                // The inner child is a 1-child: it rises over both x and z
                Some(y) if self.node(y).rank_parity != par_x => {
                    self.double_rotate_right(y);
                    self.promote(y);
                    self.demote(x);
                    self.demote(z);
                }
                // The inner child is absent or a 2-child: x rises over z
                _ => {
                    self.rotate_right(x);
                    self.demote(z);
                }
            }
        } else {
            match self.node(x).left {
                Some(y) if self.node(y).rank_parity != par_x => {
                    self.double_rotate_left(y);
                    self.promote(y);
                    self.demote(x);
                    self.demote(z);
                }
                _ => {
                    self.rotate_left(x);
                    self.demote(z);
                }
            }
        }
    }

    // REMOVAL
    //////////

    /// Minimum of the subtree rooted at the given node.
    fn minimum_at(&self, index: usize) -> usize {
        let mut current = index;
        while let Some(left) = self.node(current).left {
            current = left;
        }
        current
    }

    /// Splices `new` into `old`'s place: parent link, both children, and
    /// crucially `old`'s rank parity, so every surrounding edge keeps its
    /// rank difference.
    fn swap_in(&mut self, old: usize, new: usize) {
        let old_left = self.node(old).left;
        let old_right = self.node(old).right;
        let old_parent = self.node(old).parent;

        self.node_mut(new).parent = old_parent;
        match old_parent {
            Some(p) => {
                if self.node(p).left == Some(old) {
                    self.node_mut(p).left = Some(new);
                } else {
                    self.node_mut(p).right = Some(new);
                }
            }
            None => self.root = Some(new),
        }

        self.node_mut(new).right = old_right;
        if let Some(right) = old_right {
            self.node_mut(right).parent = Some(new);
        }

        self.node_mut(new).left = old_left;
        if let Some(left) = old_left {
            self.node_mut(left).parent = Some(new);
        }

        let rank_parity = self.node(old).rank_parity;
        self.node_mut(new).rank_parity = rank_parity;
    }

    /// Unlinks the record at the given position and returns it by value. The
    /// slot is vacated for reuse, which invalidates the handle.
    ///
    /// Three shapes to consider: a leaf just detaches, a unary node is
    /// replaced by its lone child, and a binary node is replaced by its
    /// in-order successor (the minimum of its right subtree, which never has
    /// a left child). In the successor case the successor inherits the
    /// removed node's rank, so the only edge whose rank difference can change
    /// is the one above the successor's old spot. Rebalancing starts there
    /// when the unlinked node was a 2-child (the edge stretched to 3) or when
    /// its unary parent became a leaf stuck at rank 1.
    pub fn remove(&mut self, position: &Position) -> Result<T, WavlError> {
        let node = position.get();
        if node >= self.arena.len() || self.arena[node].is_none() {
            return Err(WavlError::BadArg);
        }

        // y is the node that physically leaves its place
        let y = if self.node(node).left.is_none() || self.node(node).right.is_none() {
            node
        } else {
            let right = self
                .node(node)
                .right
                .expect("Error: Binary node lost its right child");
            self.minimum_at(right)
        };

        // x is y's one possible child, moving up into y's place
        let x = self.node(y).left.or(self.node(y).right);
        let y_parent = self.node(y).parent;

        if let Some(x) = x {
            self.node_mut(x).parent = y_parent;
        }

        let mut p_y = y_parent;
        let mut was_two_child = false;
        match p_y {
            None => self.root = x,
            Some(p) => {
                // Recorded before the splice: this decides which rebalancing
                // entry point fires
                was_two_child = self.is_two_child(Some(y), p);
                if self.node(p).left == Some(y) {
                    self.node_mut(p).left = x;
                } else {
                    self.node_mut(p).right = x;
                }
            }
        }

        if y != node {
            self.swap_in(node, y);
            if p_y == Some(node) {
                // The target was the successor's own parent, so the splice
                // point moved along with the swap
                p_y = Some(y);
            }
        }

        if let Some(p) = p_y {
            if was_two_child {
                // The edge above x stretched from 2 to 3
                self.rebalance_remove_three_child(p, x);
            } else if x.is_none() && self.is_leaf(p) {
                // Removing a 1-child leaf left its unary parent as a leaf
                // stuck at rank 1
                self.rebalance_remove_leaf(p);
            }
            debug_assert!(
                !(self.is_leaf(p) && self.node(p).rank_parity),
                "removal left a rank-1 leaf behind"
            );
        }

        let removed = self.arena[node]
            .take()
            .expect("Error: Removed slot vanished during rebalance");
        self.free.push(node);
        self.size -= 1;

        Ok(removed.value)
    }

    /// A removal left `leaf` childless at rank 1. Demote it back to rank 0;
    /// if it was a 2-child of its parent the demotion stretches that edge to
    /// a 3-edge, which the climbing fix-up then repairs. A childless root
    /// just takes the demotion and the tree is consistent again.
    fn rebalance_remove_leaf(&mut self, leaf: usize) {
        let parent = self.node(leaf).parent;
        let was_two_child = match parent {
            Some(p) => self.is_two_child(Some(leaf), p),
            None => false,
        };

        self.demote(leaf);

        if was_two_child {
            let p = parent.expect("Error: A 2-child must have a parent");
            self.rebalance_remove_three_child(p, Some(leaf));
        }
    }

    /// Post-removal fix-up for a 3-edge between `p_n` and its (possibly
    /// absent) child `n`. Demotions walk the violation up the tree as long as
    /// the sibling configuration allows; when it does not, one single or one
    /// double rotation settles the whole thing. At most two rotations happen
    /// per removal.
    fn rebalance_remove_three_child(&mut self, p_n: usize, n: Option<usize>) {
        let mut x = n;
        let mut p_x = p_n;

        let (x, z, y) = loop {
            let p_p_x = self.node(p_x).parent;
            let y = if self.node(p_x).left == x {
                self.node(p_x).right
            } else {
                self.node(p_x).left
            };
            // A 3-edge on one side forces a subtree of rank >= 1 on the other
            let y = y.expect("Error: A 3-edge always faces a present sibling");

            // Decided before any parity changes: does demoting p_x turn it
            // into a 3-child itself?
            let climbs = match p_p_x {
                Some(pp) => self.is_two_child(Some(p_x), pp),
                None => false,
            };

            if self.is_two_child(Some(y), p_x) {
                // 3,2: demoting the shared parent restores both edges
                self.demote(p_x);
            } else {
                let y_parity = self.node(y).rank_parity;
                if y_parity == self.parity(self.node(y).left)
                    && y_parity == self.parity(self.node(y).right)
                {
                    // 3,1 with a 2,2 sibling: demote both and the subtree
                    // stays legal
                    self.demote(p_x);
                    self.demote(y);
                } else {
                    // 3,1 with a usable sibling: rotations take it from here
                    break (x, p_x, y);
                }
            }

            x = Some(p_x);
            match p_p_x {
                Some(pp) if climbs => p_x = pp,
                _ => return,
            }
        };

        // y is a 1-child of z and has at least one 1-child of its own. If the
        // outer grandchild is a 1-child, y rotates over z; otherwise the
        // inner grandchild must be, and it rises with a double rotation.
        if self.node(z).left == x {
            let w = self.node(y).right;
            if self.parity(w) != self.node(y).rank_parity {
                self.rotate_left(y);
                self.promote(y);
                self.demote(z);
                if self.is_leaf(z) {
                    self.demote(z);
                }
            } else {
                let v = self
                    .node(y)
                    .left
                    .expect("Error: A 1,2 sibling keeps its inner child");
                debug_assert!(self.node(y).rank_parity != self.parity(Some(v)));
                self.double_rotate_left(v);
                // v rises by two ranks and z drops by two: both moves leave
                // the parity bits untouched, so only y's demotion is written
                self.demote(y);
            }
        } else {
            let w = self.node(y).left;
            if self.parity(w) != self.node(y).rank_parity {
                self.rotate_right(y);
                self.promote(y);
                self.demote(z);
                if self.is_leaf(z) {
                    self.demote(z);
                }
            } else {
                let v = self
                    .node(y)
                    .right
                    .expect("Error: A 1,2 sibling keeps its inner child");
                debug_assert!(self.node(y).rank_parity != self.parity(Some(v)));
                self.double_rotate_right(v);
                self.demote(y);
            }
        }
    }

    /// Produces a "snapshot" iterator over immutable references to the
    /// records in key order.
    pub fn iter(&self) -> InOrderIter<'_, T> {
        InOrderIter {
            arena: &self.arena,
            stack: Vec::new(),
            current: self.root,
        }
    }
}

/// In-order traversal over the tree's records; see [`WavlTree::iter`].
pub struct InOrderIter<'a, T> {
    arena: &'a [Option<WavlNode<T>>],
    stack: Vec<usize>, // store indices, not references
    current: Option<usize>,
}
impl<'a, T> Iterator for InOrderIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        // Walk the left spine down from the current node, then surface the
        // deepest pending node and move into its right subtree
        while let Some(index) = self.current {
            let node = self.arena[index]
                .as_ref()
                .expect("Error: Linked node lost its slot");
            self.stack.push(index);
            self.current = node.left;
        }

        let index = self.stack.pop()?;
        let node = self.arena[index]
            .as_ref()
            .expect("Error: Linked node lost its slot");
        self.current = node.right;
        Some(&node.value)
    }
}

// TESTS
////////

/// Record type for exercising the tree; `id` is the key, `tag` remembers the
/// original insertion order so identity checks can tell equal-keyed records
/// apart.
#[cfg(test)]
#[derive(Debug, PartialEq)]
struct TestRecord {
    id: i64,
    tag: usize,
}

#[cfg(test)]
fn record_node_cmp(lhs: &TestRecord, rhs: &TestRecord) -> Result<Ordering, u32> {
    Ok(lhs.id.cmp(&rhs.id))
}

#[cfg(test)]
fn record_key_cmp(key: &i64, record: &TestRecord) -> Result<Ordering, u32> {
    Ok(key.cmp(&record.id))
}

#[cfg(test)]
fn new_test_tree() -> WavlTree<i64, TestRecord> {
    WavlTree::new(record_node_cmp, record_key_cmp)
}

/// Walks a subtree reconstructing integer ranks from the stored parities.
/// Returns (node count, height in edges, rank). Both child edges must agree
/// on the node's rank, the stored bit must match the reconstruction, and
/// every leaf must land on rank 0; any other shape cannot satisfy the rank
/// rule.
#[cfg(test)]
fn check_subtree<K, T>(tree: &WavlTree<K, T>, index: usize) -> (usize, usize, i64) {
    let node = tree.node(index);

    // A parity mismatch across an edge means a rank difference of one
    let rank_above = |child_rank: i64, child_parity: bool| -> i64 {
        if node.rank_parity != child_parity {
            child_rank + 1
        } else {
            child_rank + 2
        }
    };

    let (left_count, left_height, left_rank, left_parity) = match node.left {
        Some(left) => {
            assert_eq!(tree.node(left).parent, Some(index), "left back-link");
            let (count, height, rank) = check_subtree(tree, left);
            (count, height + 1, rank, tree.node(left).rank_parity)
        }
        None => (0, 0, -1, true),
    };
    let (right_count, right_height, right_rank, right_parity) = match node.right {
        Some(right) => {
            assert_eq!(tree.node(right).parent, Some(index), "right back-link");
            let (count, height, rank) = check_subtree(tree, right);
            (count, height + 1, rank, tree.node(right).rank_parity)
        }
        None => (0, 0, -1, true),
    };

    let via_left = rank_above(left_rank, left_parity);
    let via_right = rank_above(right_rank, right_parity);
    assert_eq!(via_left, via_right, "child edges disagree on the node's rank");

    let rank = via_left;
    assert_eq!(rank % 2 == 1, node.rank_parity, "stored parity off the rank");
    if node.left.is_none() && node.right.is_none() {
        assert_eq!(rank, 0, "leaf away from rank 0");
    }

    (left_count + right_count + 1, left_height.max(right_height), rank)
}

/// Full structural audit: rank rule, back-links, height bound, in-order
/// ascent through the node comparator, and arena bookkeeping.
#[cfg(test)]
fn check_structure<K, T>(tree: &WavlTree<K, T>) {
    let (count, height) = match tree.root {
        Some(root) => {
            assert!(tree.node(root).parent.is_none(), "root with a parent");
            let (count, height, _) = check_subtree(tree, root);
            (count, height)
        }
        None => (0, 0),
    };
    assert_eq!(count, tree.size, "reachable node count vs recorded size");

    let bound = 2 * ((tree.size as u64 + 1).ilog2() as usize);
    assert!(
        height <= bound,
        "height {height} over the bound {bound} for {count} nodes"
    );

    let mut previous: Option<&T> = None;
    for value in tree.iter() {
        if let Some(prev) = previous {
            assert_eq!(
                (tree.node_cmp)(prev, value),
                Ok(Ordering::Less),
                "in-order sequence must strictly ascend"
            );
        }
        previous = Some(value);
    }

    for &slot in &tree.free {
        assert!(tree.arena[slot].is_none(), "free list names a live slot");
    }
}

/// Key sequence 0, -1, 1, -2, 2, ... as used by the alternating-sign
/// scenarios.
#[cfg(test)]
fn alternating_keys(count: usize) -> Vec<i64> {
    (0..count)
        .map(|i| {
            if i % 2 == 1 {
                -((i as i64 + 1) / 2)
            } else {
                i as i64 / 2
            }
        })
        .collect()
}

#[test]
fn wavl_insert_into_empty_tree() {
    let mut tree = new_test_tree();
    assert!(tree.is_empty());

    let position = tree.insert(&42, TestRecord { id: 42, tag: 0 }).unwrap();

    assert_eq!(tree.len(), 1);
    let root = tree.root.expect("root must be set");
    assert_eq!(root, position.get());
    let node = tree.node(root);
    assert!(!node.rank_parity);
    assert!(node.left.is_none() && node.right.is_none() && node.parent.is_none());
    check_structure(&tree);
}

#[test]
fn wavl_ascending_insertion() {
    let mut tree = new_test_tree();

    for id in 0..8 {
        tree.insert(&id, TestRecord { id, tag: id as usize }).unwrap();
        check_structure(&tree);
    }

    let ids: Vec<i64> = tree.iter().map(|r| r.id).collect();
    assert_eq!(ids, (0..8).collect::<Vec<i64>>());

    // Same workload at a size that forces promotion chains all the way up
    for id in 8..256 {
        tree.insert(&id, TestRecord { id, tag: id as usize }).unwrap();
        check_structure(&tree);
    }
    assert_eq!(tree.len(), 256);
}

#[test]
fn wavl_sign_alternating_insertion() {
    let mut tree = new_test_tree();
    let mut tag = 0;

    tree.insert(&0, TestRecord { id: 0, tag }).unwrap();
    check_structure(&tree);
    for magnitude in 1..=127 {
        for id in [-magnitude, magnitude] {
            tag += 1;
            tree.insert(&id, TestRecord { id, tag }).unwrap();
            check_structure(&tree);
        }
    }

    let ids: Vec<i64> = tree.iter().map(|r| r.id).collect();
    assert_eq!(ids, (-127..=127).collect::<Vec<i64>>());
}

#[test]
fn wavl_remove_every_third() {
    let mut tree = new_test_tree();
    let keys = alternating_keys(32);

    let mut positions = Vec::new();
    for (tag, &id) in keys.iter().enumerate() {
        positions.push(tree.insert(&id, TestRecord { id, tag }).unwrap());
        check_structure(&tree);
    }

    for index in (2..keys.len()).step_by(3) {
        let record = tree.remove(&positions[index]).unwrap();
        assert_eq!(record.id, keys[index]);
        check_structure(&tree);
    }

    let mut survivors: Vec<i64> = keys
        .iter()
        .enumerate()
        .filter(|(index, _)| !(*index >= 2 && (*index - 2) % 3 == 0))
        .map(|(_, &id)| id)
        .collect();
    survivors.sort_unstable();
    let ids: Vec<i64> = tree.iter().map(|r| r.id).collect();
    assert_eq!(ids, survivors);
}

#[test]
fn wavl_remove_then_reinsert() {
    let mut tree = new_test_tree();
    let keys = alternating_keys(32);

    let mut positions = Vec::new();
    for (tag, &id) in keys.iter().enumerate() {
        positions.push(tree.insert(&id, TestRecord { id, tag }).unwrap());
    }
    check_structure(&tree);

    for index in (2..keys.len()).step_by(3) {
        tree.remove(&positions[index]).unwrap();
        check_structure(&tree);
    }

    // Nothing that was removed may register as a duplicate on the way back in
    for index in (2..keys.len()).step_by(3) {
        let id = keys[index];
        tree.insert(&id, TestRecord { id, tag: index }).unwrap();
        check_structure(&tree);
    }

    assert_eq!(tree.len(), keys.len());
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    let ids: Vec<i64> = tree.iter().map(|r| r.id).collect();
    assert_eq!(ids, sorted);
}

#[test]
fn wavl_remove_targeted_cases() {
    let mut tree = new_test_tree();
    let keys = alternating_keys(16);

    let mut positions = Vec::new();
    for (tag, &id) in keys.iter().enumerate() {
        positions.push(tree.insert(&id, TestRecord { id, tag }).unwrap());
    }
    check_structure(&tree);

    // Knock out leaves, leaf/unary siblings, and inner nodes in a fixed
    // order that drives both removal entry points
    for &index in &[9, 14, 10, 8, 0] {
        let record = tree.remove(&positions[index]).unwrap();
        assert_eq!(record.id, keys[index]);
        check_structure(&tree);
    }
    assert_eq!(tree.len(), keys.len() - 5);
}

#[test]
fn wavl_remove_root_cases() {
    // Lone root
    let mut tree = new_test_tree();
    let position = tree.insert(&1, TestRecord { id: 1, tag: 0 }).unwrap();
    assert_eq!(tree.remove(&position).unwrap().id, 1);
    assert!(tree.root.is_none());
    check_structure(&tree);

    // Unary root: removing its only child strands the root as a childless
    // rank-1 node, and the demotion has no parent edge to consult
    let mut tree = new_test_tree();
    tree.insert(&1, TestRecord { id: 1, tag: 0 }).unwrap();
    let child = tree.insert(&2, TestRecord { id: 2, tag: 1 }).unwrap();
    assert_eq!(tree.remove(&child).unwrap().id, 2);
    assert_eq!(tree.len(), 1);
    check_structure(&tree);

    // Binary root: the in-order successor is spliced into the root's place
    let mut tree = new_test_tree();
    let root = tree.insert(&2, TestRecord { id: 2, tag: 0 }).unwrap();
    tree.insert(&1, TestRecord { id: 1, tag: 1 }).unwrap();
    tree.insert(&3, TestRecord { id: 3, tag: 2 }).unwrap();
    assert_eq!(tree.remove(&root).unwrap().id, 2);
    check_structure(&tree);
    let ids: Vec<i64> = tree.iter().map(|r| r.id).collect();
    assert_eq!(ids, [1, 3]);
}

#[test]
fn wavl_lfsr_soak() {
    // Two maximal 6-bit LFSR polynomials; each enumerates all 63 non-zero
    // states, so the removal order is a full permutation of the insert order
    const POLY_A: u32 = 0x36;
    const POLY_B: u32 = 0x30;

    fn lfsr_next(lfsr: u32, poly: u32) -> u32 {
        let feedback = lfsr & 1 != 0;
        let shifted = lfsr >> 1;
        if feedback {
            shifted ^ poly
        } else {
            shifted
        }
    }

    let mut tree = new_test_tree();

    let mut lfsr = POLY_A;
    for tag in 0..63 {
        let id = lfsr as i64;
        tree.insert(&id, TestRecord { id, tag }).unwrap();
        check_structure(&tree);
        lfsr = lfsr_next(lfsr, POLY_A);
    }
    assert_eq!(tree.len(), 63);

    // One full period has returned the register to its seed; drain the tree
    // in the other polynomial's order
    for _ in 0..63 {
        let id = lfsr as i64;
        let position = tree.find(&id).unwrap();
        assert_eq!(tree.get(&position).unwrap().id, id);
        let record = tree.remove(&position).unwrap();
        assert_eq!(record.id, id);
        check_structure(&tree);
        lfsr = lfsr_next(lfsr, POLY_B);
    }

    assert!(tree.root.is_none());
    assert!(tree.is_empty());
}

#[test]
fn wavl_find_miss() {
    let mut tree = new_test_tree();
    for (tag, id) in (-4..4).enumerate() {
        tree.insert(&id, TestRecord { id, tag }).unwrap();
    }

    assert_eq!(tree.find(&4).unwrap_err(), WavlError::NotFound);

    let position = tree.find(&-4).unwrap();
    assert_eq!(tree.get(&position).unwrap().id, -4);
    assert_eq!(tree.get(&position).unwrap().tag, 0);
}

#[test]
fn wavl_duplicate_insert_rejected() {
    let mut tree = new_test_tree();
    for (tag, &id) in [5_i64, 1, 9, 3, 7].iter().enumerate() {
        tree.insert(&id, TestRecord { id, tag }).unwrap();
    }

    let snapshot: Vec<Option<(i64, bool)>> = tree
        .arena
        .iter()
        .map(|slot| slot.as_ref().map(|n| (n.value.id, n.rank_parity)))
        .collect();

    assert_eq!(
        tree.insert(&9, TestRecord { id: 9, tag: 99 }).unwrap_err(),
        WavlError::Duplicate
    );

    // Not a single node or parity bit may have moved
    let after: Vec<Option<(i64, bool)>> = tree
        .arena
        .iter()
        .map(|slot| slot.as_ref().map(|n| (n.value.id, n.rank_parity)))
        .collect();
    assert_eq!(snapshot, after);
    assert_eq!(tree.len(), 5);
    check_structure(&tree);
}

#[test]
fn wavl_comparator_errors_propagate() {
    fn poisoned_key_cmp(key: &i64, record: &TestRecord) -> Result<Ordering, u32> {
        if *key == 13 {
            return Err(99);
        }
        Ok(key.cmp(&record.id))
    }

    let mut tree = WavlTree::new(record_node_cmp, poisoned_key_cmp);
    for (tag, &id) in [8_i64, 4, 12, 2, 6].iter().enumerate() {
        tree.insert(&id, TestRecord { id, tag }).unwrap();
    }

    assert_eq!(tree.find(&13).unwrap_err(), WavlError::Comparator(99));
    assert_eq!(
        tree.insert(&13, TestRecord { id: 13, tag: 0 }).unwrap_err(),
        WavlError::Comparator(99)
    );

    // The failed descent must not have touched the tree
    assert_eq!(tree.len(), 5);
    check_structure(&tree);
}

#[test]
fn wavl_stale_position_is_rejected() {
    let mut tree = new_test_tree();
    let position = tree.insert(&1, TestRecord { id: 1, tag: 0 }).unwrap();
    tree.insert(&2, TestRecord { id: 2, tag: 1 }).unwrap();

    assert_eq!(tree.remove(&position).unwrap().id, 1);
    assert_eq!(tree.remove(&position).unwrap_err(), WavlError::BadArg);
    assert!(tree.get(&position).is_none());

    let out_of_range = Position::new(500);
    assert_eq!(tree.remove(&out_of_range).unwrap_err(), WavlError::BadArg);
}

#[test]
fn wavl_random_soak() {
    use rand::Rng;

    let mut rng = rand::rng();
    let mut tree = new_test_tree();

    for step in 0..2000 {
        let id = rng.random_range(-500_i64..500);
        match tree.find(&id) {
            Ok(position) => {
                if step % 3 == 0 {
                    assert_eq!(
                        tree.insert(&id, TestRecord { id, tag: step }).unwrap_err(),
                        WavlError::Duplicate
                    );
                } else {
                    assert_eq!(tree.remove(&position).unwrap().id, id);
                    check_structure(&tree);
                }
            }
            Err(WavlError::NotFound) => {
                tree.insert(&id, TestRecord { id, tag: step }).unwrap();
                check_structure(&tree);
            }
            Err(other) => panic!("unexpected comparator failure: {other}"),
        }
    }

    // Drain whatever survived, still auditing after every step
    let ids: Vec<i64> = tree.iter().map(|r| r.id).collect();
    for id in ids {
        let position = tree.find(&id).unwrap();
        tree.remove(&position).unwrap();
        check_structure(&tree);
    }
    assert!(tree.root.is_none());
    assert!(tree.is_empty());
}
