//! Address translation across a PMA rebalance.
//!
//! A rebalance moves items between segments without reordering them, so an
//! address translates by flattening to a compact per-window item rank
//! (using the pre-rebalance counts) and re-expanding (using the
//! post-rebalance counts). One wrinkle: the physical insert shifted every
//! item at or before the insertion slot one slot left inside the insertion
//! segment, so those addresses translate one rank earlier than a generic
//! in-window address would.

use crate::pma::UpdateContext;

struct CountChange {
    segment_id: u64,
    old_count: u64,
    new_count: u64,
}

/// Translates pre-insert item addresses to their post-rebalance locations
/// and back.
///
/// Built from the insert's update context together with the item counts as
/// they stood right after the insert (the insertion segment already
/// including the new item).
pub(crate) struct AddressAdjuster {
    segment_size: u64,
    insert_address: u64,
    insert_segment: u64,
    entries: Vec<CountChange>,
}

impl AddressAdjuster {
    pub fn new(
        ctx: &UpdateContext,
        old_counts: &[u64],
        segment_size: u64,
        insert_address: u64,
    ) -> Self {
        let entries = ctx
            .updated_segments
            .iter()
            .map(|change| CountChange {
                segment_id: change.segment_id,
                old_count: old_counts[change.segment_id as usize],
                new_count: change.item_count,
            })
            .collect();
        Self {
            segment_size,
            insert_address,
            insert_segment: insert_address / segment_size,
            entries,
        }
    }

    fn window_first_segment(&self) -> u64 {
        self.entries.first().map(|c| c.segment_id).unwrap_or(0)
    }

    fn window_last_segment(&self) -> u64 {
        self.entries.last().map(|c| c.segment_id).unwrap_or(0)
    }

    /// True if `address` lies inside the rebalanced window.
    pub fn contains(&self, address: u64) -> bool {
        address >= self.window_first_segment() * self.segment_size
            && address < (self.window_last_segment() + 1) * self.segment_size
    }

    /// Item rank of `address` within the window, counting occupied slots
    /// from the window start, per the given count column.
    fn flatten(&self, address: u64, old: bool) -> u64 {
        let base = self.window_first_segment() * self.segment_size;
        let segment = address / self.segment_size;
        let mut rank = address - base;
        for change in &self.entries {
            if change.segment_id > segment {
                break;
            }
            let count = if old { change.old_count } else { change.new_count };
            rank -= self.segment_size - count;
        }
        rank
    }

    /// Address of the item with window rank `rank`, per the given count
    /// column.
    fn expand(&self, mut rank: u64, old: bool) -> u64 {
        for change in &self.entries {
            let count = if old { change.old_count } else { change.new_count };
            if rank < count {
                return change.segment_id * self.segment_size + (self.segment_size - count) + rank;
            }
            rank -= count;
        }
        unreachable!("item rank past the rebalance window");
    }

    fn translate(&self, address: u64, is_insert: bool) -> Option<u64> {
        if !self.contains(address) {
            return None;
        }
        // Items at or before the insertion slot moved one slot left when
        // the new item was placed; the inserted item itself did not.
        let shifted = !is_insert
            && address / self.segment_size == self.insert_segment
            && address <= self.insert_address;
        let rank = self.flatten(address - shifted as u64, true);
        Some(self.expand(rank, false))
    }

    /// Maps a pre-insert address to its post-rebalance address, or `None`
    /// if it lies outside the rebalance window.
    pub fn adjust(&self, address: u64) -> Option<u64> {
        self.translate(address, false)
    }

    /// Maps the intended insertion address to where the inserted item
    /// landed.
    pub fn adjust_inserted(&self, address: u64) -> Option<u64> {
        self.translate(address, true)
    }

    /// Inverse of `adjust`: maps a post-rebalance address back to the
    /// pre-insert address of the item now living there. Out-of-window
    /// addresses map to themselves; the inserted item's slot maps to the
    /// intended insertion address.
    pub fn revert(&self, address: u64) -> u64 {
        if !self.contains(address) {
            return address;
        }
        let rank = self.flatten(address, false);
        let shifted = self.expand(rank, true);
        let in_insert_segment = shifted / self.segment_size == self.insert_segment;
        if in_insert_segment && shifted < self.insert_address {
            shifted + 1
        } else {
            shifted
        }
    }
}
