//! Leaf cursors over the vEB tree.
//!
//! A cursor walks leaves in PMA order: `next` moves toward higher item
//! addresses, which by the layout convention is descending key order (the
//! order in which lower-level PMA segments are numbered), and `prev` moves
//! the other way. Navigation goes through parent/child addresses only, so
//! separator keys may be rewritten between steps without confusing the
//! cursor.

use super::VebTree;
use cobtree_common::{Result, NIL};

/// Position of one leaf plus its parent address.
#[derive(Debug, Clone, Copy)]
pub struct LeafCursor {
    address: u64,
    parent: u64,
    valid: bool,
}

impl LeafCursor {
    /// Opens a cursor on the leaf at `leaf_address`.
    pub fn new(tree: &VebTree, leaf_address: u64) -> Result<Self> {
        let leaf = tree.node_at(leaf_address)?;
        debug_assert!(leaf.is_leaf());
        Ok(Self {
            address: leaf_address,
            parent: leaf.parent,
            valid: true,
        })
    }

    /// True until the cursor steps past either end of the leaf row.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// PMA address of the current leaf.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// PMA address of the current leaf's parent.
    pub fn parent_address(&self) -> u64 {
        self.parent
    }

    /// Moves to the leaf with the next smaller key.
    ///
    /// Invalidates the cursor at the end of the row instead of failing.
    pub fn next(&mut self, tree: &VebTree) -> Result<()> {
        self.step(tree, Direction::SmallerKey)
    }

    /// Moves to the leaf with the next larger key.
    pub fn prev(&mut self, tree: &VebTree) -> Result<()> {
        self.step(tree, Direction::LargerKey)
    }

    fn step(&mut self, tree: &VebTree, direction: Direction) -> Result<()> {
        if !self.valid {
            return Ok(());
        }

        // Climb until some ancestor has an unvisited sibling subtree on
        // the target side.
        let mut child_address = self.address;
        let mut node_address = self.parent;
        let branch = loop {
            let node = tree.node_at(node_address)?;
            let idx = node
                .find_child_by_addr(child_address)
                .expect("cursor child missing from parent");
            let sibling = match direction {
                Direction::SmallerKey => {
                    if idx == 0 {
                        None
                    } else {
                        Some(idx - 1)
                    }
                }
                Direction::LargerKey => {
                    let last = node.rightmost_child().expect("internal node with no children");
                    if idx == last {
                        None
                    } else {
                        Some(idx + 1)
                    }
                }
            };
            match sibling {
                Some(i) => break node.entries[i].addr,
                None => {
                    if node.parent == NIL {
                        self.valid = false;
                        return Ok(());
                    }
                    child_address = node_address;
                    node_address = node.parent;
                }
            }
        };

        // Descend to the boundary leaf of the sibling subtree: its
        // largest-key leaf when moving to smaller keys came from the
        // left... the leaf adjacent to the one we left.
        let mut address = branch;
        let mut node = tree.node_at(address)?;
        while !node.is_leaf() {
            let idx = match direction {
                Direction::SmallerKey => node.rightmost_child().expect("empty internal node"),
                Direction::LargerKey => 0,
            };
            address = node.entries[idx].addr;
            node = tree.node_at(address)?;
        }
        self.address = address;
        self.parent = node.parent;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Direction {
    /// Toward larger PMA addresses (lower-numbered keys).
    SmallerKey,
    /// Toward smaller PMA addresses.
    LargerKey,
}
