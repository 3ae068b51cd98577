//! van Emde Boas laid-out search tree stored inside a PMA.
//!
//! Nodes live in a PMA of fixed-size records; every pointer is a PMA item
//! address. Children sit at strictly lower addresses than their parents,
//! so the root drifts toward the high end of the array while leaves pack
//! toward the low end. Each PMA insert may rebalance segments, after which
//! every affected node's parent and child pointers are rewritten from the
//! update log.

mod adjust;
mod cursor;
mod node;

pub use cursor::LeafCursor;
pub use node::{Node, NodeEntry};

use crate::pma::{Pma, SegmentChange, UpdateContext};
use adjust::AddressAdjuster;
use cobtree_cache::BlockCache;
use cobtree_common::{CobtreeError, DensityOptions, Result, NIL};
use std::fmt::Write as _;
use std::sync::Arc;

/// Height of the recursive vEB block that a node of tree height `height`
/// roots: the largest power of two dividing the height.
pub fn subtree_height(height: u64) -> u64 {
    if height == 0 {
        0
    } else {
        1u64 << height.trailing_zeros()
    }
}

/// Dense copy of a recursive subtree, root first.
///
/// Pointers between copied nodes are stored as occupied-slot offsets from
/// the subtree root so the buffer can be laid down at any destination;
/// pointers crossing the copy boundary (the root's parent, the bottom
/// row's children) stay absolute.
struct SubtreeCopy {
    root_height: u64,
    leaf_height: u64,
    nodes: Vec<Node>,
}

/// Search tree in recursive-halved layout.
pub struct VebTree {
    fanout: u64,
    root_address: u64,
    root_height: u64,
    /// Mirror of the PMA's per-segment item counts, lagging one insert
    /// behind during pointer rewrite; supplies the "old counts" column of
    /// the address adjuster.
    element_count: Vec<u64>,
    pma: Pma,
}

impl VebTree {
    /// Creates a tree sized to index `est_leaves` leaves.
    ///
    /// The tree is seeded with a single leaf (key 0, value 0) under a
    /// height-2 root at the high end of the array, so a descent always
    /// has somewhere to land.
    pub fn new(
        id: &str,
        fanout: u64,
        est_leaves: u64,
        redundancy: f64,
        options: DensityOptions,
        cache: Arc<BlockCache>,
    ) -> Result<Self> {
        if fanout < 2 {
            return Err(CobtreeError::InvalidParameter {
                name: "fanout".to_string(),
                value: fanout.to_string(),
            });
        }
        let node_size = Node::record_size(fanout);
        let est_nodes = (est_leaves * 2).max(16);
        let pma = Pma::new(id, node_size, est_nodes, redundancy, options, cache)?;

        let s = pma.segment_size();
        let p = pma.segment_count();
        let root_address = p * s - 1;
        let leaf_address = p * s - 2;

        let mut tree = Self {
            fanout,
            root_address,
            root_height: 2,
            element_count: vec![0; p as usize],
            pma,
        };

        let leaf = Node::leaf(root_address, 0, fanout);
        let mut root = Node::new(2, NIL, fanout);
        root.entries[0] = NodeEntry {
            key: 0,
            addr: leaf_address,
        };
        tree.pma.add(&leaf.encode(), p - 1, s - 1)?;
        tree.pma.add(&root.encode(), p - 1, s - 1)?;
        tree.element_count[(p - 1) as usize] = 2;
        Ok(tree)
    }

    /// Maximum children per node.
    pub fn fanout(&self) -> u64 {
        self.fanout
    }

    /// Current PMA address of the root.
    pub fn root_address(&self) -> u64 {
        self.root_address
    }

    /// Height of the root; leaves have height 1.
    pub fn root_height(&self) -> u64 {
        self.root_height
    }

    /// Reads the node stored at a PMA address.
    pub fn node_at(&self, address: u64) -> Result<Node> {
        Ok(Node::decode(self.pma.read_item(address)?, self.fanout))
    }

    fn write_node(&mut self, address: u64, node: &Node) -> Result<()> {
        self.pma.write_item(address, &node.encode())
    }

    /// Child index to descend into for `key`: the rightmost child whose
    /// separator is at most `key`, or the first child when every
    /// separator is larger. Reports whether an exact separator match was
    /// seen.
    fn route(node: &Node, key: u64, matched: &mut bool) -> u64 {
        let mut chosen = node.entries[0].addr;
        for entry in node.children() {
            if entry.key > key {
                break;
            }
            chosen = entry.addr;
            if entry.key == key {
                *matched = true;
            }
        }
        chosen
    }

    /// Descends to the leaf covering `key`.
    ///
    /// Returns the leaf's value (the down-pointer into the lower PMA),
    /// the leaf's PMA address, and whether some separator along the
    /// search matched `key` exactly.
    pub fn get(&self, key: u64) -> Result<(u64, u64, bool)> {
        let mut matched = false;
        let mut address = self.root_address;
        let mut node = self.node_at(address)?;
        while !node.is_leaf() {
            address = Self::route(&node, key, &mut matched);
            node = self.node_at(address)?;
        }
        Ok((node.value(), address, matched))
    }

    /// Inserts `key` with `value`, overwriting in place when a leaf with
    /// this key already exists.
    pub fn insert(&mut self, key: u64, value: u64) -> Result<()> {
        let mut matched = false;
        let mut address = self.root_address;
        let mut node = self.node_at(address)?;
        while !node.is_leaf() {
            address = Self::route(&node, key, &mut matched);
            node = self.node_at(address)?;
        }

        if matched {
            node.entries[0].key = value;
            return self.write_node(address, &node);
        }

        // Leaves pack toward the low end; the new leaf goes one slot
        // below the located one.
        let leaf = Node::leaf(node.parent, value, self.fanout);
        let (landed, _ctx) = self.add_node_to_pma(&leaf, address - 1)?;
        let parent = self.node_at(landed)?.parent;
        self.add_child_to_node(parent, landed, key)
    }

    /// Rewrites the separator for `leaf_address` at each ancestor,
    /// stopping once the patched entry is not the leftmost child (higher
    /// separators remain valid from there up).
    pub fn update_leaf_key(
        &mut self,
        leaf_address: u64,
        parent_address: u64,
        new_key: u64,
    ) -> Result<()> {
        let mut child_address = leaf_address;
        let mut current = parent_address;
        loop {
            let mut node = self.node_at(current)?;
            let idx = node
                .find_child_by_addr(child_address)
                .expect("child entry missing on separator walk");
            node.entries[idx].key = new_key;
            self.write_node(current, &node)?;
            if idx != 0 || node.parent == NIL {
                return Ok(());
            }
            child_address = current;
            current = node.parent;
        }
    }

    /// Inserts a node record at the intended PMA address, then rewrites
    /// every pointer invalidated by the shift and possible rebalance.
    ///
    /// Returns where the node landed plus the PMA update context.
    fn add_node_to_pma(&mut self, node: &Node, address: u64) -> Result<(u64, UpdateContext)> {
        let s = self.pma.segment_size();
        let segment_id = address / s;
        let position = address % s;

        let mut ctx = self.pma.add(&node.encode(), segment_id, position)?;
        // Mirror counts now describe the post-insert, pre-rebalance
        // layout the adjuster flattens against.
        self.element_count[segment_id as usize] += 1;

        // The PMA omits the insert segment from the log when no rebalance
        // ran, but its nodes shifted and need the rewrite pass too.
        if ctx.is_empty() {
            ctx.updated_segments.push(SegmentChange {
                segment_id,
                item_count: self.element_count[segment_id as usize],
            });
        }

        let adjuster = AddressAdjuster::new(&ctx, &self.element_count, s, address);
        let landed = adjuster
            .adjust_inserted(address)
            .expect("insert address inside its own rebalance window");

        for i in 0..ctx.updated_segments.len() {
            let change = ctx.updated_segments[i];
            for j in 0..change.item_count {
                let current = (change.segment_id + 1) * s - 1 - j;
                self.rewrite_node_pointers(current, landed, &adjuster)?;
            }
        }

        // The inserted node's children still name their old parent slot.
        let inserted = self.node_at(landed)?;
        for entry in inserted.children() {
            let mut child = self.node_at(entry.addr)?;
            if child.parent != landed {
                child.parent = landed;
                self.write_node(entry.addr, &child)?;
            }
        }

        if let Some(moved_root) = adjuster.adjust(self.root_address) {
            self.root_address = moved_root;
        }

        for change in &ctx.updated_segments {
            self.element_count[change.segment_id as usize] = change.item_count;
        }
        Ok((landed, ctx))
    }

    /// Rewrites one node's parent and child pointers after a shift or
    /// rebalance. `current` is the node's post-rebalance address,
    /// `inserted` the landing slot of the new node (whose out-of-window
    /// parent has no entry for it yet and must not be patched).
    fn rewrite_node_pointers(
        &mut self,
        current: u64,
        inserted: u64,
        adjuster: &AddressAdjuster,
    ) -> Result<()> {
        let mut node = self.node_at(current)?;
        let mut dirty = false;

        if node.parent != NIL {
            match adjuster.adjust(node.parent) {
                Some(parent) => {
                    if parent != node.parent {
                        node.parent = parent;
                        dirty = true;
                    }
                }
                None if current != inserted => {
                    // The parent did not move; its child entry still
                    // names our pre-rebalance address.
                    let old_address = adjuster.revert(current);
                    if old_address != current {
                        let mut parent = self.node_at(node.parent)?;
                        if let Some(idx) = parent.find_child_by_addr(old_address) {
                            parent.entries[idx].addr = current;
                            self.write_node(node.parent, &parent)?;
                        }
                    }
                }
                None => {}
            }
        }

        if !node.is_leaf() {
            for i in 0..node.entries.len() {
                let addr = node.entries[i].addr;
                if addr == NIL {
                    break;
                }
                match adjuster.adjust(addr) {
                    Some(adjusted) => {
                        if adjusted != addr {
                            node.entries[i].addr = adjusted;
                            dirty = true;
                        }
                    }
                    None => {
                        // The child did not move but we did; repoint its
                        // parent pointer at our new slot.
                        let mut child = self.node_at(addr)?;
                        if child.parent != current {
                            child.parent = current;
                            self.write_node(addr, &child)?;
                        }
                    }
                }
            }
        }

        if dirty {
            self.write_node(current, &node)?;
        }
        Ok(())
    }

    /// Adds a child entry to a node, splitting it when it fills up.
    fn add_child_to_node(&mut self, node_address: u64, child_address: u64, child_key: u64) -> Result<()> {
        let mut node = self.node_at(node_address)?;
        let count = node.insert_entry(child_key, child_address);
        self.write_node(node_address, &node)?;
        if count == self.fanout as usize {
            self.node_split(node_address)
        } else {
            Ok(())
        }
    }

    /// Splits a full node, relocating the recursive-subtree leaves the
    /// new sibling takes over so the vEB layout invariant holds.
    fn node_split(&mut self, node_address: u64) -> Result<()> {
        let mut node_address = node_address;
        let mut node = self.node_at(node_address)?;

        if node.height == self.root_height {
            self.add_new_root()?;
            let new_root = self.node_at(self.root_address)?;
            node_address = new_root.entries[0].addr;
            node = self.node_at(node_address)?;
        }

        let height = node.height;
        let partition = (self.fanout / 2) as usize;
        let splitting_key = node.entries[0].key;

        // A node at the bottom of its recursive block splits in place
        // (sibling right below it); otherwise the sibling goes where its
        // first owned child subtree starts, keeping the layout recursive.
        let block_height = subtree_height(height);
        let insert_address = if block_height > 1 {
            node.entries[partition].addr
        } else {
            node_address - 1
        };
        assert_ne!(insert_address, NIL, "split without a placement address");

        let mut sibling = Node::new(height, node.parent, self.fanout);
        for i in partition..self.fanout as usize {
            sibling.entries[i - partition] = node.entries[i];
            node.entries[i] = NodeEntry::EMPTY;
        }
        self.write_node(node_address, &node)?;

        let (mut landed, _ctx) = self.add_node_to_pma(&sibling, insert_address)?;

        // The split node may have moved in the shuffle; find it again
        // through the shared parent by its separator key.
        let sibling_now = self.node_at(landed)?;
        let parent = self.node_at(sibling_now.parent)?;
        let node_now = parent
            .children()
            .find(|e| e.key == splitting_key)
            .expect("split node entry missing under parent")
            .addr;
        let node = self.node_at(node_now)?;

        let moved_roots = self.leaf_subtree_roots(&node)?;
        if !moved_roots.is_empty() {
            // Snapshot the sibling's top half before the moves overwrite
            // its slots, pack the split node's kept bottom subtrees
            // upward, then lay the top half down right below them.
            let top_copy = self.copy_subtree(landed, height, true)?;
            let mut dest = landed;
            for &root in &moved_roots {
                let moved = self.move_subtree(root, dest)?;
                dest = self.occupied_below(dest, moved);
            }
            self.insert_subtree(&top_copy, dest)?;
            landed = dest;
        }

        let sibling_now = self.node_at(landed)?;
        self.add_child_to_node(sibling_now.parent, landed, sibling_now.entries[0].key)
    }

    /// Creates a new root above the current one. The old root shifts one
    /// slot down; the new root takes its place at the high end.
    fn add_new_root(&mut self) -> Result<()> {
        let old_root = self.node_at(self.root_address)?;
        let mut new_root = Node::new(self.root_height + 1, NIL, self.fanout);
        new_root.entries[0] = NodeEntry {
            key: old_root.entries[0].key,
            addr: self.root_address,
        };
        let (landed, _ctx) = self.add_node_to_pma(&new_root, self.root_address)?;
        self.root_address = landed;
        self.root_height += 1;
        Ok(())
    }

    /// Addresses of the recursive-subtree leaves still owned by `node`
    /// after a split: its descendants at the bottom-half root height of
    /// its block, highest address first. Empty when the block is too
    /// short to have a bottom half worth relocating.
    fn leaf_subtree_roots(&self, node: &Node) -> Result<Vec<u64>> {
        let height = node.height;
        if height <= 2 {
            return Ok(Vec::new());
        }
        let block_height = subtree_height(height);
        if block_height < 4 {
            return Ok(Vec::new());
        }
        let bottom_root_height = height - block_height / 2;

        let mut stack: Vec<u64> = node.children().map(|e| e.addr).collect();
        let mut roots = Vec::new();
        while let Some(address) = stack.pop() {
            let n = self.node_at(address)?;
            if n.height == bottom_root_height {
                roots.push(address);
            } else {
                debug_assert!(n.height > bottom_root_height);
                stack.extend(n.children().map(|e| e.addr));
            }
        }
        roots.sort_unstable_by(|a, b| b.cmp(a));
        Ok(roots)
    }

    /// Copies the recursive block rooted at `root_address` (or only its
    /// top half) into a dense buffer, compacting in-block pointers to
    /// occupied-slot offsets from the root.
    fn copy_subtree(
        &self,
        root_address: u64,
        root_height: u64,
        top_part_only: bool,
    ) -> Result<SubtreeCopy> {
        let mut block_height = subtree_height(root_height);
        if top_part_only {
            block_height >>= 1;
        }
        assert!(block_height > 0);
        let leaf_height = root_height - block_height + 1;

        let mut nodes = Vec::new();
        let mut lowest = root_address;
        let mut current = root_address;
        loop {
            let mut n = self.node_at(current)?;
            let at_bottom = n.height == leaf_height;
            if current != root_address {
                n.parent = self.rank_between(root_address, n.parent);
            }
            if !at_bottom {
                for i in 0..n.entries.len() {
                    let addr = n.entries[i].addr;
                    if addr == NIL {
                        break;
                    }
                    lowest = lowest.min(addr);
                    n.entries[i].addr = self.rank_between(root_address, addr);
                }
            }
            nodes.push(n);
            if at_bottom && current == lowest {
                break;
            }
            current = self.occupied_below(current, 1);
        }
        Ok(SubtreeCopy {
            root_height,
            leaf_height,
            nodes,
        })
    }

    /// Lays a dense subtree copy down at `dest_address`, expanding the
    /// compact offsets against the current per-segment counts. Overwrites
    /// occupied slots only; the caller arranged for the region to be the
    /// copy's new home.
    fn insert_subtree(&mut self, copy: &SubtreeCopy, dest_address: u64) -> Result<()> {
        for (i, source) in copy.nodes.iter().enumerate() {
            let current = if i == 0 {
                dest_address
            } else {
                self.occupied_below(dest_address, i as u64)
            };
            let mut n = source.clone();
            if n.height != copy.root_height {
                n.parent = self.occupied_below(dest_address, n.parent);
            }
            if n.height != copy.leaf_height {
                for j in 0..n.entries.len() {
                    if n.entries[j].addr == NIL {
                        break;
                    }
                    n.entries[j].addr = self.occupied_below(dest_address, n.entries[j].addr);
                }
            } else if !n.is_leaf() {
                // The bottom row keeps absolute child addresses; the
                // children stayed put, so just repoint their parents.
                for entry in n.children() {
                    let mut child = self.node_at(entry.addr)?;
                    if child.parent != current {
                        child.parent = current;
                        self.write_node(entry.addr, &child)?;
                    }
                }
            }
            self.write_node(current, &n)?;
        }
        Ok(())
    }

    /// Moves a whole recursive block to `dest_address`, patching the
    /// parent's child entry. Returns the number of nodes moved.
    fn move_subtree(&mut self, root_address: u64, dest_address: u64) -> Result<u64> {
        let root = self.node_at(root_address)?;
        let copy = self.copy_subtree(root_address, root.height, false)?;

        let mut parent = self.node_at(root.parent)?;
        let idx = parent
            .find_child_by_addr(root_address)
            .expect("moved subtree missing from its parent");
        parent.entries[idx].addr = dest_address;
        self.write_node(root.parent, &parent)?;

        self.insert_subtree(&copy, dest_address)?;
        Ok(copy.nodes.len() as u64)
    }

    /// Number of occupied slots with address at most `address`
    /// (inclusive; `address` must be occupied).
    fn rank(&self, address: u64) -> u64 {
        let s = self.pma.segment_size();
        let segment = (address / s) as usize;
        let slot = address % s;
        let below: u64 = self.element_count[..segment].iter().sum();
        below + slot + 1 - (s - self.element_count[segment])
    }

    /// Address of the occupied slot with 1-based rank `rank`.
    fn address_of_rank(&self, rank: u64) -> u64 {
        debug_assert!(rank >= 1);
        let s = self.pma.segment_size();
        let mut cumulative = 0u64;
        for (segment, &count) in self.element_count.iter().enumerate() {
            if cumulative + count >= rank {
                let within = rank - cumulative;
                return segment as u64 * s + (s - count) + within - 1;
            }
            cumulative += count;
        }
        panic!("item rank {rank} beyond array population");
    }

    /// Address of the occupied slot `n` occupied positions below
    /// `address`.
    fn occupied_below(&self, address: u64, n: u64) -> u64 {
        self.address_of_rank(self.rank(address) - n)
    }

    /// Occupied-slot distance from `upper` down to `lower`.
    fn rank_between(&self, upper: u64, lower: u64) -> u64 {
        self.rank(upper) - self.rank(lower)
    }

    /// Renders every stored node in PMA order, for debugging.
    pub fn dump(&self) -> String {
        let s = self.pma.segment_size();
        let mut out = String::new();
        for (segment, &count) in self.element_count.iter().enumerate() {
            for i in 0..count {
                let address = (segment as u64 + 1) * s - count + i;
                match self.node_at(address) {
                    Ok(node) => {
                        let _ = write!(out, "{address}: h{} parent ", node.height);
                        if node.parent == NIL {
                            let _ = write!(out, "-");
                        } else {
                            let _ = write!(out, "{}", node.parent);
                        }
                        for entry in node.entries.iter().filter(|e| !e.is_empty()) {
                            let _ = write!(out, " ({}->{})", entry.key, entry.addr as i64);
                        }
                        let _ = writeln!(out);
                    }
                    Err(_) => {
                        let _ = writeln!(out, "{address}: <unreadable>");
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tree(est_leaves: u64) -> VebTree {
        let cache = Arc::new(BlockCache::new(4 * 1024 * 1024));
        VebTree::new(
            "veb-test",
            4,
            est_leaves,
            1.2,
            DensityOptions::default(),
            cache,
        )
        .unwrap()
    }

    /// Walks the whole tree checking the structural invariants: parent
    /// pointers, address ordering, height stepping, separator ordering,
    /// and separator agreement with each internal child's first entry.
    fn check_invariants(tree: &VebTree) {
        let mut stack = vec![tree.root_address()];
        while let Some(address) = stack.pop() {
            let node = tree.node_at(address).unwrap();
            if node.is_leaf() {
                continue;
            }
            let mut last_key = None;
            for entry in node.children() {
                let child = tree.node_at(entry.addr).unwrap();
                assert_eq!(
                    child.parent, address,
                    "stale parent pointer at {} under {}",
                    entry.addr, address
                );
                assert!(
                    entry.addr < address,
                    "child {} not below parent {}",
                    entry.addr,
                    address
                );
                assert_eq!(child.height + 1, node.height, "height step at {}", entry.addr);
                if let Some(last) = last_key {
                    assert!(entry.key >= last, "separator order at {address}");
                }
                last_key = Some(entry.key);
                if !child.is_leaf() {
                    assert_eq!(
                        child.entries[0].key, entry.key,
                        "separator mismatch for child {}",
                        entry.addr
                    );
                }
                stack.push(entry.addr);
            }
        }
    }

    #[test]
    fn test_subtree_height_table() {
        let expected = [(1, 1), (2, 2), (3, 1), (4, 4), (5, 1), (6, 2), (7, 1), (8, 8)];
        for (height, block) in expected {
            assert_eq!(subtree_height(height), block, "height {height}");
        }
        assert_eq!(subtree_height(0), 0);
        assert_eq!(subtree_height(12), 4);
    }

    #[test]
    fn test_new_tree_seeded() {
        let tree = test_tree(64);
        assert_eq!(tree.root_height(), 2);
        let (value, leaf, matched) = tree.get(100).unwrap();
        assert_eq!(value, 0);
        assert!(!matched);
        let leaf_node = tree.node_at(leaf).unwrap();
        assert!(leaf_node.is_leaf());
        assert_eq!(leaf_node.parent, tree.root_address());
        check_invariants(&tree);
    }

    #[test]
    fn test_insert_and_get_sequential() {
        let mut tree = test_tree(64);
        for i in 1..20u64 {
            tree.insert(i, i).unwrap();
            let (value, _, matched) = tree.get(i).unwrap();
            assert!(matched, "key {i} not matched right after insert");
            assert_eq!(value, i);
            if i > 1 {
                let (value, _, matched) = tree.get(i - 1).unwrap();
                assert!(matched);
                assert_eq!(value, i - 1);
            }
            check_invariants(&tree);
        }
        // Sequential fill splits nodes at minimum occupancy, so 20
        // leaves can push the root to height 5 but no further.
        assert!(tree.root_height() <= 5);
    }

    #[test]
    fn test_insert_existing_key_updates_value() {
        let mut tree = test_tree(64);
        tree.insert(5, 50).unwrap();
        tree.insert(5, 55).unwrap();
        let (value, _, matched) = tree.get(5).unwrap();
        assert!(matched);
        assert_eq!(value, 55);
        check_invariants(&tree);
    }

    #[test]
    fn test_get_between_keys_returns_floor_leaf() {
        let mut tree = test_tree(64);
        for key in [10u64, 20, 30] {
            tree.insert(key, key * 10).unwrap();
        }
        let (value, _, matched) = tree.get(25).unwrap();
        assert!(!matched);
        assert_eq!(value, 200);
    }

    #[test]
    fn test_first_split_keeps_pointers_fresh() {
        let mut tree = test_tree(64);
        let before = tree.root_height();
        // The seeded leaf plus three inserts fill the fanout-4 root.
        for i in 1..=3u64 {
            tree.insert(i, i).unwrap();
        }
        assert_eq!(tree.root_height(), before + 1, "root split expected");
        check_invariants(&tree);
        for i in 1..=3u64 {
            let (value, _, matched) = tree.get(i).unwrap();
            assert!(matched);
            assert_eq!(value, i);
        }
    }

    #[test]
    fn test_update_leaf_key_walks_up_from_leftmost() {
        let mut tree = test_tree(64);
        for i in [10u64, 20, 30] {
            tree.insert(i, i).unwrap();
        }
        let (_, leaf, _) = tree.get(10).unwrap();
        let parent = tree.node_at(leaf).unwrap().parent;
        tree.update_leaf_key(leaf, parent, 12).unwrap();
        let (value, _, matched) = tree.get(12).unwrap();
        assert!(matched);
        assert_eq!(value, 10);
    }

    #[test]
    fn test_leaf_cursor_walks_key_order() {
        let mut tree = test_tree(64);
        for i in 1..=9u64 {
            tree.insert(i, i * 100).unwrap();
        }
        // Start from the largest key and walk toward smaller keys in PMA
        // order, collecting leaf values.
        let (_, leaf, _) = tree.get(9).unwrap();
        let mut cursor = LeafCursor::new(&tree, leaf).unwrap();
        let mut seen = Vec::new();
        while cursor.valid() {
            seen.push(tree.node_at(cursor.address()).unwrap().value());
            cursor.next(&tree).unwrap();
        }
        let expected: Vec<u64> = (0..=9).rev().map(|i| i * 100).collect();
        assert_eq!(seen, expected);

        // And back up again.
        let (_, first, _) = tree.get(0).unwrap();
        let mut cursor = LeafCursor::new(&tree, first).unwrap();
        let mut seen = Vec::new();
        while cursor.valid() {
            seen.push(tree.node_at(cursor.address()).unwrap().value());
            cursor.prev(&tree).unwrap();
        }
        let expected: Vec<u64> = (0..=9).map(|i| i * 100).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_growth_through_many_splits() {
        let mut tree = test_tree(256);
        for i in 1..=60u64 {
            tree.insert(i, i + 1000).unwrap();
            check_invariants(&tree);
        }
        for i in 1..=60u64 {
            let (value, _, matched) = tree.get(i).unwrap();
            assert!(matched, "key {i} lost");
            assert_eq!(value, i + 1000);
        }
        assert!(tree.root_height() >= 4, "expected deep tree for 60 leaves");
    }
}
