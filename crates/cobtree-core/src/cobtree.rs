//! Three-level composed CoBtree.
//!
//! A vEB tree of index leaves routes to a PMA of separator items, which
//! routes to a PMA of records. Leaf values are separator-PMA segment ids;
//! separator items carry record-PMA segment ids. Ascending segment ids
//! hold descending key ranges at both lower levels, matching the
//! right-packed slot order inside a segment (the smallest key of a segment
//! sits in its last slot and serves as the separator).
//!
//! When a record insert rebalances the bottom level, the affected
//! segments' new smallest keys are mirrored into the separator PMA, and a
//! separator rebalance is mirrored into the vEB tree in turn, inserting
//! new leaves for freshly filled segments.

use crate::pma::{Pma, UpdateContext};
use crate::veb::{LeafCursor, VebTree};
use cobtree_cache::BlockCache;
use cobtree_common::{CobtreeConfig, Result};
use std::sync::Arc;

/// Bytes per record and per separator item: two little-endian u64s.
const ITEM_SIZE: u64 = 16;

fn encode_pair(first: u64, second: u64) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&first.to_le_bytes());
    buf[8..].copy_from_slice(&second.to_le_bytes());
    buf
}

fn decode_pair(bytes: &[u8]) -> (u64, u64) {
    (
        u64::from_le_bytes(bytes[..8].try_into().unwrap()),
        u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
    )
}

/// Cache-oblivious B-tree mapping u64 keys to u64 values.
pub struct CoBtree {
    tree: VebTree,
    index: Pma,
    data: Pma,
}

impl CoBtree {
    /// Builds an empty tree sized for the configured record estimate.
    ///
    /// A sentinel record with key 0 is threaded through all three levels
    /// so the very first insert finds a located position; the usable key
    /// space therefore starts at 1.
    pub fn new(config: &CobtreeConfig, cache: Arc<BlockCache>) -> Result<Self> {
        config.validate()?;
        let data = Pma::new(
            &format!("{}-l3", config.id_prefix),
            ITEM_SIZE,
            config.estimated_records.max(2),
            config.redundancy_l3,
            config.density_l3,
            cache.clone(),
        )?;
        let index = Pma::new(
            &format!("{}-l2", config.id_prefix),
            ITEM_SIZE,
            config.item_estimate_l2().max(2),
            config.redundancy_l2,
            config.density_l2,
            cache.clone(),
        )?;
        let tree = VebTree::new(
            &format!("{}-l1", config.id_prefix),
            config.fanout,
            config.leaf_estimate_l1().max(8),
            config.redundancy_l1,
            config.density_l1,
            cache,
        )?;

        let mut cobtree = Self { tree, index, data };
        let s3 = cobtree.data.segment_size();
        cobtree.data.add(&encode_pair(0, 0), 0, s3 - 1)?;
        let s2 = cobtree.index.segment_size();
        cobtree.index.add(&encode_pair(0, 0), 0, s2 - 1)?;
        // The seeded tree leaf already maps key 0 to index segment 0.
        Ok(cobtree)
    }

    /// The vEB tree level.
    pub fn tree(&self) -> &VebTree {
        &self.tree
    }

    /// The separator PMA.
    pub fn index(&self) -> &Pma {
        &self.index
    }

    /// The record PMA.
    pub fn data(&self) -> &Pma {
        &self.data
    }

    /// Separator item covering `key` in `l2_segment`: the item with the
    /// largest key at most `key`. Returns its slot and record segment id.
    fn locate_index_item(&self, l2_segment: u64, key: u64) -> Result<(u64, u64)> {
        let segment = self.index.get(l2_segment)?;
        let s = self.index.segment_size();
        assert!(segment.item_count > 0, "separator segment empty");
        let (mut slot, mut down) = (s - 1, decode_pair(segment.item(s - 1)).1);
        for i in 1..segment.item_count {
            let candidate = s - 1 - i;
            let (k, d) = decode_pair(segment.item(candidate));
            if k > key {
                break;
            }
            slot = candidate;
            down = d;
        }
        Ok((slot, down))
    }

    /// Sorted slot for `key` in a record segment, and whether the slot
    /// already holds exactly `key`.
    fn locate_record(&self, l3_segment: u64, key: u64) -> Result<(u64, bool)> {
        let segment = self.data.get(l3_segment)?;
        let s = self.data.segment_size();
        for i in 0..segment.item_count {
            let slot = s - 1 - i;
            let (k, _) = decode_pair(segment.item(slot));
            if k >= key {
                return Ok((slot, k == key));
            }
        }
        debug_assert!(segment.item_count < s);
        Ok((s - 1 - segment.item_count, false))
    }

    /// Smallest key stored in a record segment (its separator).
    fn first_key_l3(&self, segment: u64) -> Result<u64> {
        let s = self.data.segment_size();
        Ok(decode_pair(self.data.read_item(segment * s + s - 1)?).0)
    }

    /// Smallest key stored in a separator segment.
    fn first_key_l2(&self, segment: u64) -> Result<u64> {
        let s = self.index.segment_size();
        Ok(decode_pair(self.index.read_item(segment * s + s - 1)?).0)
    }

    /// Point lookup.
    pub fn get(&self, key: u64) -> Result<Option<u64>> {
        let (l2_segment, _, _) = self.tree.get(key)?;
        let (_, l3_segment) = self.locate_index_item(l2_segment, key)?;

        let segment = self.data.get(l3_segment)?;
        let s = self.data.segment_size();
        for i in 0..segment.item_count {
            let (k, v) = decode_pair(segment.item(s - 1 - i));
            if k == key {
                return Ok(Some(v));
            }
            if k > key {
                break;
            }
        }
        Ok(None)
    }

    /// Inserts or overwrites one record.
    ///
    /// `PmaFull` from any level propagates unmodified; the caller's only
    /// recovery is rebuilding with a larger estimate.
    pub fn insert(&mut self, key: u64, value: u64) -> Result<()> {
        let (l2_segment, leaf_address, _) = self.tree.get(key)?;
        let (l2_slot, l3_segment) = self.locate_index_item(l2_segment, key)?;
        let (position, matched) = self.locate_record(l3_segment, key)?;

        if matched {
            let address = l3_segment * self.data.segment_size() + position;
            return self.data.write_item(address, &encode_pair(key, value));
        }

        let ctx = self.data.add(&encode_pair(key, value), l3_segment, position)?;
        if ctx.is_empty() {
            return Ok(());
        }

        let l2_ctx = self.update_separators(l2_segment, l2_slot, l3_segment, &ctx)?;
        if l2_ctx.is_empty() {
            return Ok(());
        }
        self.update_leaves(leaf_address, &l2_ctx)
    }

    /// Mirrors a record-level rebalance into the separator PMA.
    ///
    /// Every rebalanced segment's separator key is rewritten in place;
    /// segments filled from empty get fresh separator items appended at
    /// the smallest-key end of the index, and those appends' own update
    /// contexts are merged into the returned aggregate.
    fn update_separators(
        &mut self,
        l2_segment: u64,
        l2_slot: u64,
        l3_insert_segment: u64,
        l3_ctx: &UpdateContext,
    ) -> Result<UpdateContext> {
        let changes = &l3_ctx.updated_segments;
        let insert_idx = changes
            .iter()
            .position(|c| c.segment_id == l3_insert_segment)
            .expect("insert segment missing from its own update log");
        let fresh_start = changes.len() - l3_ctx.filled_empty_segments as usize;

        // Backward: lower-numbered data segments hold larger keys, so
        // their separators sit at the next lower index addresses.
        let mut cursor = IndexCursor::new(l2_segment, l2_slot);
        for change in changes[..insert_idx].iter().rev() {
            cursor.retreat(&self.index);
            let separator = self.first_key_l3(change.segment_id)?;
            let address = cursor.address(&self.index);
            debug_assert_eq!(
                decode_pair(self.index.read_item(address)?).1,
                change.segment_id,
                "separator item out of step with the update log"
            );
            self.index
                .write_item(address, &encode_pair(separator, change.segment_id))?;
        }

        // Forward: the insert segment and everything after it that
        // already has a separator.
        let mut cursor = IndexCursor::new(l2_segment, l2_slot);
        for (offset, change) in changes[insert_idx..fresh_start].iter().enumerate() {
            if offset > 0 {
                let advanced = cursor.advance(&self.index);
                assert!(advanced, "separator row ended inside the update log");
            }
            let separator = self.first_key_l3(change.segment_id)?;
            self.index.write_item(
                cursor.address(&self.index),
                &encode_pair(separator, change.segment_id),
            )?;
        }

        // Freshly filled data segments have no separator yet; append one
        // per segment at the smallest-key end.
        let mut aggregate = UpdateContext::default();
        for change in &changes[fresh_start..] {
            let separator = self.first_key_l3(change.segment_id)?;
            let target = self.index.last_non_empty_segment();
            let position = self.index.segment_size() - 1;
            let add_ctx =
                self.index
                    .add(&encode_pair(separator, change.segment_id), target, position)?;
            aggregate.merge(&add_ctx);
        }
        Ok(aggregate)
    }

    /// Mirrors a separator-level rebalance into the vEB tree.
    ///
    /// Walks the leaf row with a cursor, rewriting each affected leaf's
    /// separator, then inserts new leaves for separator segments filled
    /// from empty.
    fn update_leaves(&mut self, leaf_address: u64, l2_ctx: &UpdateContext) -> Result<()> {
        let changes = &l2_ctx.updated_segments;
        if changes.is_empty() {
            return Ok(());
        }
        let fresh_start = changes.len() - l2_ctx.filled_empty_segments as usize;

        if fresh_start > 0 {
            // Leaf values are separator segment ids, ascending along the
            // cursor's forward direction. The append windows may sit away
            // from the routed leaf, so seek first.
            let mut cursor = LeafCursor::new(&self.tree, leaf_address)?;
            let first_segment = changes[0].segment_id;
            loop {
                let value = self.tree.node_at(cursor.address())?.value();
                if value == first_segment {
                    break;
                }
                if value < first_segment {
                    cursor.next(&self.tree)?;
                } else {
                    cursor.prev(&self.tree)?;
                }
                assert!(
                    cursor.valid(),
                    "no leaf for separator segment {first_segment}"
                );
            }

            for (offset, change) in changes[..fresh_start].iter().enumerate() {
                if offset > 0 {
                    cursor.next(&self.tree)?;
                    assert!(cursor.valid(), "leaf row ended inside the update log");
                }
                debug_assert_eq!(
                    self.tree.node_at(cursor.address())?.value(),
                    change.segment_id,
                    "leaf out of step with the separator update log"
                );
                let separator = self.first_key_l2(change.segment_id)?;
                self.tree
                    .update_leaf_key(cursor.address(), cursor.parent_address(), separator)?;
            }
        }

        for change in &changes[fresh_start..] {
            let separator = self.first_key_l2(change.segment_id)?;
            self.tree.insert(separator, change.segment_id)?;
        }
        Ok(())
    }
}

/// Walker over occupied separator slots, in global address order.
struct IndexCursor {
    segment: u64,
    slot: u64,
}

impl IndexCursor {
    fn new(segment: u64, slot: u64) -> Self {
        Self { segment, slot }
    }

    fn address(&self, pma: &Pma) -> u64 {
        self.segment * pma.segment_size() + self.slot
    }

    /// Steps to the next occupied slot (higher address, smaller key).
    /// Returns false at the end of the populated prefix.
    fn advance(&mut self, pma: &Pma) -> bool {
        if self.slot + 1 < pma.segment_size() {
            self.slot += 1;
            return true;
        }
        let next = self.segment + 1;
        if next >= pma.segment_count() || pma.item_count(next) == 0 {
            return false;
        }
        self.segment = next;
        self.slot = pma.segment_size() - pma.item_count(next);
        true
    }

    /// Steps to the previous occupied slot (lower address, larger key).
    fn retreat(&mut self, pma: &Pma) {
        let first_occupied = pma.segment_size() - pma.item_count(self.segment);
        if self.slot > first_occupied {
            self.slot -= 1;
        } else {
            assert!(self.segment > 0, "retreat past the first separator");
            self.segment -= 1;
            debug_assert!(pma.item_count(self.segment) > 0);
            self.slot = pma.segment_size() - 1;
        }
    }
}
