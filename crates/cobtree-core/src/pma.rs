//! Packed memory array over the simulated block device.
//!
//! A PMA stores fixed-width items in P segments of S slots each. Items in
//! a segment occupy the rightmost slots ("right-packed"); the calibrated
//! slack on the left absorbs inserts. When an insert pushes a segment past
//! its density threshold, items are redistributed over the smallest
//! power-of-two aligned window of segments that is below the threshold for
//! its height, and the caller receives an update context listing every
//! segment whose contents changed.

use cobtree_cache::{BlockCache, BlockDevice, Fingerprint};
use cobtree_common::{CobtreeError, DensityOptions, Result};
use std::collections::VecDeque;
use std::sync::Arc;

/// One segment of a PMA.
///
/// `bytes` is the full S-slot buffer; the `item_count` rightmost slots are
/// occupied. The reference stays valid until the next structural change of
/// the owning PMA.
#[derive(Debug)]
pub struct Segment<'a> {
    /// Raw segment buffer, `segment_size * item_size` bytes.
    pub bytes: &'a [u8],
    /// Number of occupied (rightmost) slots.
    pub item_count: u64,
    item_size: u64,
}

impl<'a> Segment<'a> {
    /// Returns the item stored in `slot`.
    pub fn item(&self, slot: u64) -> &'a [u8] {
        let start = (slot * self.item_size) as usize;
        &self.bytes[start..start + self.item_size as usize]
    }

    /// Number of slots in the segment.
    pub fn slot_count(&self) -> u64 {
        self.bytes.len() as u64 / self.item_size
    }
}

/// New item count of one segment touched by a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentChange {
    pub segment_id: u64,
    pub item_count: u64,
}

/// Log of segments affected by a successful insert.
///
/// Empty when the insert stayed within its segment's density threshold.
/// After a rebalance it lists every window segment, in ascending segment
/// order, with its post-rebalance item count.
#[derive(Debug, Clone, Default)]
pub struct UpdateContext {
    /// Affected segments in ascending id order.
    pub updated_segments: Vec<SegmentChange>,
    /// How many of them were empty before the rebalance. Signals to upper
    /// layers that new separators are needed.
    pub filled_empty_segments: u64,
}

impl UpdateContext {
    /// True when no rebalance happened.
    pub fn is_empty(&self) -> bool {
        self.updated_segments.is_empty()
    }

    /// Resets the context for reuse.
    pub fn clear(&mut self) {
        self.updated_segments.clear();
        self.filled_empty_segments = 0;
    }

    /// Merges `incoming` into this context.
    ///
    /// Both lists are ordered by segment id; on overlap the incoming count
    /// wins since it reflects the later rebalance.
    pub fn merge(&mut self, incoming: &UpdateContext) {
        self.filled_empty_segments += incoming.filled_empty_segments;
        if incoming.updated_segments.is_empty() {
            return;
        }
        if self.updated_segments.is_empty() {
            self.updated_segments = incoming.updated_segments.clone();
            return;
        }

        let old = std::mem::take(&mut self.updated_segments);
        let mut merged = Vec::with_capacity(old.len() + incoming.updated_segments.len());
        let mut a = old.into_iter().peekable();
        let mut b = incoming.updated_segments.iter().copied().peekable();
        loop {
            match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => {
                    if x.segment_id < y.segment_id {
                        merged.push(*x);
                        a.next();
                    } else if y.segment_id < x.segment_id {
                        merged.push(*y);
                        b.next();
                    } else {
                        merged.push(*y);
                        a.next();
                        b.next();
                    }
                }
                (Some(x), None) => {
                    merged.push(*x);
                    a.next();
                }
                (None, Some(y)) => {
                    merged.push(*y);
                    b.next();
                }
                (None, None) => break,
            }
        }
        self.updated_segments = merged;
    }
}

/// External-memory array of fixed-size items with calibrated empty slots.
pub struct Pma {
    id: String,
    epoch: u32,
    item_size: u64,
    segment_size: u64,
    segment_count: u64,
    depth: u64,
    item_count: Vec<u64>,
    last_non_empty_segment: u64,
    storage: BlockDevice,
    cache: Arc<BlockCache>,
    options: DensityOptions,
}

impl Pma {
    /// Creates a PMA sized for `est_items` items of `item_size` bytes.
    ///
    /// Segment size is S = ceil(log2(est_items)); the segment count is the
    /// smallest even P with P * S >= est_items * redundancy. The density
    /// thresholds interpolate over the logical binary tree of height
    /// ceil(log2(P)).
    pub fn new(
        id: &str,
        item_size: u64,
        est_items: u64,
        redundancy: f64,
        options: DensityOptions,
        cache: Arc<BlockCache>,
    ) -> Result<Self> {
        options.validate()?;
        if item_size == 0 {
            return Err(CobtreeError::InvalidParameter {
                name: "item_size".to_string(),
                value: "0".to_string(),
            });
        }
        if est_items < 2 {
            return Err(CobtreeError::InvalidParameter {
                name: "est_items".to_string(),
                value: est_items.to_string(),
            });
        }
        if redundancy < 1.0 {
            return Err(CobtreeError::InvalidParameter {
                name: "redundancy".to_string(),
                value: redundancy.to_string(),
            });
        }

        let segment_size = ((est_items as f64).log2().ceil() as u64).max(2);
        let capacity = (est_items as f64 * redundancy).ceil() as u64;
        let mut segment_count = capacity.div_ceil(segment_size).max(2);
        if segment_count % 2 == 1 {
            segment_count += 1;
        }
        let depth = (64 - (segment_count - 1).leading_zeros() as u64).max(1);

        let storage = BlockDevice::new(segment_count * segment_size * item_size);
        Ok(Self {
            id: id.to_string(),
            epoch: 0,
            item_size,
            segment_size,
            segment_count,
            depth,
            item_count: vec![0; segment_count as usize],
            last_non_empty_segment: 0,
            storage,
            cache,
            options,
        })
    }

    /// Bytes per item.
    #[inline]
    pub fn item_size(&self) -> u64 {
        self.item_size
    }

    /// Slots per segment (S).
    #[inline]
    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    /// Number of segments (P, always even).
    #[inline]
    pub fn segment_count(&self) -> u64 {
        self.segment_count
    }

    /// Total item slots in the array.
    #[inline]
    pub fn slot_count(&self) -> u64 {
        self.segment_count * self.segment_size
    }

    /// Items currently stored in `segment_id`.
    pub fn item_count(&self, segment_id: u64) -> u64 {
        self.item_count[segment_id as usize]
    }

    /// Highest-index segment holding at least one item.
    pub fn last_non_empty_segment(&self) -> u64 {
        self.last_non_empty_segment
    }

    fn segment_bytes(&self) -> u64 {
        self.segment_size * self.item_size
    }

    fn check_segment(&self, segment_id: u64) -> Result<()> {
        if segment_id >= self.segment_count {
            return Err(CobtreeError::SegmentOutOfRange {
                segment_id,
                segment_count: self.segment_count,
            });
        }
        Ok(())
    }

    fn meter(&self, segment_id: u64) {
        self.cache.touch(
            Fingerprint::new(&self.id, self.epoch, segment_id),
            self.segment_bytes(),
        );
    }

    /// Returns a view of `segment_id`, charging the cache meter.
    pub fn get(&self, segment_id: u64) -> Result<Segment<'_>> {
        self.check_segment(segment_id)?;
        self.meter(segment_id);
        let bytes = self
            .storage
            .read(segment_id * self.segment_bytes(), self.segment_bytes());
        Ok(Segment {
            bytes,
            item_count: self.item_count[segment_id as usize],
            item_size: self.item_size,
        })
    }

    /// Reads one item by its global slot address (segment * S + slot).
    pub fn read_item(&self, address: u64) -> Result<&[u8]> {
        if address >= self.slot_count() {
            return Err(CobtreeError::AddressOutOfRange {
                address,
                capacity: self.slot_count(),
            });
        }
        let segment_id = address / self.segment_size;
        self.meter(segment_id);
        let offset = address * self.item_size;
        Ok(self.storage.read(offset, self.item_size))
    }

    /// Overwrites one item in place by its global slot address.
    ///
    /// This is a plain overwrite with no structural effect; the slot must
    /// already be occupied.
    pub fn write_item(&mut self, address: u64, item: &[u8]) -> Result<()> {
        if address >= self.slot_count() {
            return Err(CobtreeError::AddressOutOfRange {
                address,
                capacity: self.slot_count(),
            });
        }
        assert_eq!(item.len() as u64, self.item_size);
        let segment_id = address / self.segment_size;
        let slot = address % self.segment_size;
        assert!(
            slot >= self.segment_size - self.item_count[segment_id as usize],
            "write_item into an unoccupied slot"
        );
        self.meter(segment_id);
        self.storage.write(address * self.item_size, item);
        Ok(())
    }

    /// Inserts `item` so that it ends up in slot `position` of
    /// `segment_id`, then rebalances if the segment crossed its density
    /// threshold.
    ///
    /// The caller chooses `position` as the sorted insertion point: items
    /// previously occupying slots left of `position` shift one slot left
    /// into the slack. Returns the update context of the rebalance, empty
    /// if none was needed, or `PmaFull` (with the array untouched) when
    /// even the whole array is above its threshold.
    pub fn add(&mut self, item: &[u8], segment_id: u64, position: u64) -> Result<UpdateContext> {
        self.check_segment(segment_id)?;
        assert_eq!(item.len() as u64, self.item_size);
        let count = self.item_count[segment_id as usize];
        assert!(count < self.segment_size, "insert into a full segment");
        assert!(position < self.segment_size, "insert position out of range");
        assert!(
            position + 1 >= self.segment_size - count,
            "insert position inside the empty slack"
        );

        // Decide the rebalance window before touching anything, so FULL
        // leaves the array in its pre-call state.
        let window = self.plan_rebalance(segment_id)?;

        // Shift slots left of `position` one slot into the slack, then
        // drop the item into place.
        self.meter(segment_id);
        let seg_offset = segment_id * self.segment_bytes();
        let mut buf = self.storage.read(seg_offset, self.segment_bytes()).to_vec();
        let isz = self.item_size as usize;
        let pos = position as usize;
        buf.copy_within(isz..(pos + 1) * isz, 0);
        buf[pos * isz..(pos + 1) * isz].copy_from_slice(item);
        self.storage.write(seg_offset, &buf);
        self.item_count[segment_id as usize] += 1;
        self.last_non_empty_segment = self.last_non_empty_segment.max(segment_id);

        match window {
            None => Ok(UpdateContext::default()),
            Some((left, right, total)) => Ok(self.redistribute(left, right, total)),
        }
    }

    /// Upper density threshold, in items, for a window of `segments`
    /// segments at logical height `height`.
    fn upper_threshold_items(&self, height: u64, segments: u64) -> f64 {
        self.options.upper_threshold(height.min(self.depth), self.depth)
            * (segments * self.segment_size) as f64
    }

    /// Picks the rebalance window for an insert into `segment_id`, using
    /// item counts as they will be after the insert.
    ///
    /// Returns `None` on the fast path (segment stays under its
    /// threshold), the chosen `(left, right, total)` window otherwise, or
    /// `PmaFull` when the whole array exceeds its threshold.
    fn plan_rebalance(&self, segment_id: u64) -> Result<Option<(u64, u64, u64)>> {
        let count = self.item_count[segment_id as usize] + 1;
        if (count as f64) < self.upper_threshold_items(1, 1) {
            return Ok(None);
        }

        // Initial window is the even-aligned pair (2k, 2k+1); each
        // expansion doubles the window, keeping power-of-two alignment.
        let mut size = 2u64;
        let mut height = 2u64;
        loop {
            let left = segment_id / size * size;
            let right = (left + size - 1).min(self.segment_count - 1);
            let total: u64 = (left..=right)
                .map(|s| self.item_count[s as usize])
                .sum::<u64>()
                + 1;

            if (total as f64) < self.upper_threshold_items(height, right - left + 1) {
                return Ok(Some((left, right, total)));
            }
            if left == 0 && right == self.segment_count - 1 {
                return Err(CobtreeError::PmaFull {
                    id: self.id.clone(),
                });
            }
            size *= 2;
            height += 1;
        }
    }

    /// Spreads `total` items across the window `[left, right]`.
    ///
    /// Target counts: the rightmost segments take ceil(total/window) each,
    /// the leftmost exactly one, with at most one fractional segment in
    /// between; no window segment is left empty. Items move right to left,
    /// destination-driven, snapshotting any source segment that would be
    /// overwritten before it has been read.
    fn redistribute(&mut self, left: u64, right: u64, total: u64) -> UpdateContext {
        let window = (right - left + 1) as usize;
        debug_assert!(total >= window as u64, "rebalance window too sparse");

        let quota = total.div_ceil(window as u64);
        let mut targets = vec![1u64; window];
        let mut remaining = total - window as u64;
        for target in targets.iter_mut().rev() {
            let extra = remaining.min(quota - 1);
            *target += extra;
            remaining -= extra;
            if remaining == 0 {
                break;
            }
        }
        debug_assert_eq!(remaining, 0);

        let mut ctx = UpdateContext {
            updated_segments: Vec::with_capacity(window),
            filled_empty_segments: (left..=right)
                .filter(|&s| self.item_count[s as usize] == 0)
                .count() as u64,
        };
        for (i, &target) in targets.iter().enumerate() {
            ctx.updated_segments.push(SegmentChange {
                segment_id: left + i as u64,
                item_count: target,
            });
        }

        let mut source = SourceCursor::new(right);
        let seg_bytes = self.segment_bytes() as usize;
        let isz = self.item_size as usize;

        for dest in (left..=right).rev() {
            let target = targets[(dest - left) as usize];
            let mut out = vec![0u8; seg_bytes];
            for placed in 0..target {
                let slot = (self.segment_size - 1 - placed) as usize;
                let item = source.next_item(self);
                out[slot * isz..(slot + 1) * isz].copy_from_slice(&item);
            }
            // Preserve the source view of this segment if it has not been
            // read yet; the FIFO order matches the right-to-left sweep.
            if self.item_count[dest as usize] > 0 && !source.visited(dest) {
                let bytes = self
                    .storage
                    .read(dest * self.segment_bytes(), self.segment_bytes())
                    .to_vec();
                source.snapshot(dest, bytes);
            }
            self.storage.write(dest * self.segment_bytes(), &out);
        }
        debug_assert!(source.drained(self, left));

        for change in &ctx.updated_segments {
            self.item_count[change.segment_id as usize] = change.item_count;
        }
        self.last_non_empty_segment = self.last_non_empty_segment.max(right);
        ctx
    }
}

/// Right-to-left item reader over the pre-rebalance window layout.
struct SourceCursor {
    segment: u64,
    buffered: Option<Vec<u8>>,
    remaining: u64,
    next_slot: u64,
    started: bool,
    snapshots: VecDeque<(u64, Vec<u8>)>,
}

impl SourceCursor {
    fn new(right: u64) -> Self {
        Self {
            segment: right + 1,
            buffered: None,
            remaining: 0,
            next_slot: 0,
            started: false,
            snapshots: VecDeque::new(),
        }
    }

    /// True if the cursor has already loaded (and therefore preserved)
    /// `segment_id`.
    fn visited(&self, segment_id: u64) -> bool {
        self.started && segment_id >= self.segment
    }

    fn snapshot(&mut self, segment_id: u64, bytes: Vec<u8>) {
        self.snapshots.push_back((segment_id, bytes));
    }

    fn next_item(&mut self, pma: &Pma) -> Vec<u8> {
        while self.remaining == 0 {
            assert!(self.segment > 0, "rebalance source exhausted");
            self.segment -= 1;
            self.started = true;
            let count = pma.item_count[self.segment as usize];
            if count == 0 {
                continue;
            }
            let bytes = match self.snapshots.front() {
                Some((id, _)) if *id == self.segment => self.snapshots.pop_front().unwrap().1,
                _ => pma
                    .storage
                    .read(self.segment * pma.segment_bytes(), pma.segment_bytes())
                    .to_vec(),
            };
            self.buffered = Some(bytes);
            self.remaining = count;
            self.next_slot = pma.segment_size - 1;
        }

        let isz = pma.item_size as usize;
        let start = self.next_slot as usize * isz;
        let item = self.buffered.as_ref().unwrap()[start..start + isz].to_vec();
        self.remaining -= 1;
        if self.next_slot > 0 {
            self.next_slot -= 1;
        }
        item
    }

    /// True once every item at or right of `left` has been consumed.
    fn drained(&self, pma: &Pma, left: u64) -> bool {
        self.remaining == 0
            && (self.segment <= left
                || (left..self.segment).all(|s| pma.item_count[s as usize] == 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: u64, value: u64) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&key.to_le_bytes());
        buf[8..].copy_from_slice(&value.to_le_bytes());
        buf
    }

    fn decode(item: &[u8]) -> (u64, u64) {
        (
            u64::from_le_bytes(item[..8].try_into().unwrap()),
            u64::from_le_bytes(item[8..16].try_into().unwrap()),
        )
    }

    fn test_pma(est_items: u64) -> Pma {
        let cache = Arc::new(BlockCache::new(1024 * 1024));
        Pma::new(
            "pma-test",
            16,
            est_items,
            1.2,
            DensityOptions::default(),
            cache,
        )
        .unwrap()
    }

    /// Sorted insertion slot for `key` in `segment`: keys ascend as slots
    /// descend, smallest key in the rightmost slot.
    fn find_position(pma: &Pma, segment_id: u64, key: u64) -> (u64, bool) {
        let segment = pma.get(segment_id).unwrap();
        let s = pma.segment_size();
        for i in 0..segment.item_count {
            let slot = s - 1 - i;
            let (k, _) = decode(segment.item(slot));
            if k >= key {
                return (slot, k == key);
            }
        }
        (s - 1 - segment.item_count, false)
    }

    /// Segment whose key range covers `key`: ascending segment ids hold
    /// descending key ranges.
    fn find_segment(pma: &Pma, key: u64) -> u64 {
        for segment_id in 0..=pma.last_non_empty_segment() {
            let segment = pma.get(segment_id).unwrap();
            if segment.item_count == 0 {
                break;
            }
            let (smallest, _) = decode(segment.item(pma.segment_size() - 1));
            if smallest <= key {
                return segment_id;
            }
        }
        pma.last_non_empty_segment()
    }

    fn find_value(pma: &Pma, key: u64) -> Option<u64> {
        let segment_id = find_segment(pma, key);
        let segment = pma.get(segment_id).unwrap();
        for i in 0..segment.item_count {
            let (k, v) = decode(segment.item(pma.segment_size() - 1 - i));
            if k == key {
                return Some(v);
            }
        }
        None
    }

    fn insert(pma: &mut Pma, key: u64, value: u64) -> UpdateContext {
        let segment_id = find_segment(pma, key);
        let (pos, matched) = find_position(pma, segment_id, key);
        assert!(!matched, "duplicate key {key}");
        pma.add(&record(key, value), segment_id, pos).unwrap()
    }

    #[test]
    fn test_pma_sizing() {
        let pma = test_pma(1024);
        assert_eq!(pma.segment_size(), 10);
        // ceil(1229 / 10) = 123, rounded up to even.
        assert_eq!(pma.segment_count(), 124);
        assert_eq!(pma.item_count(0), 0);
        assert_eq!(pma.last_non_empty_segment(), 0);
    }

    #[test]
    fn test_pma_rejects_bad_parameters() {
        let cache = Arc::new(BlockCache::new(1024 * 1024));
        assert!(Pma::new("x", 0, 100, 1.2, DensityOptions::default(), cache.clone()).is_err());
        assert!(Pma::new("x", 16, 1, 1.2, DensityOptions::default(), cache.clone()).is_err());
        assert!(Pma::new("x", 16, 100, 0.5, DensityOptions::default(), cache).is_err());
    }

    #[test]
    fn test_get_out_of_range() {
        let pma = test_pma(1024);
        let err = pma.get(pma.segment_count()).unwrap_err();
        assert!(matches!(err, CobtreeError::SegmentOutOfRange { .. }));
    }

    #[test]
    fn test_add_right_packs() {
        let mut pma = test_pma(1024);
        let s = pma.segment_size();

        let ctx = pma.add(&record(5, 50), 0, s - 1).unwrap();
        assert!(ctx.is_empty());
        assert_eq!(pma.item_count(0), 1);

        // A larger key lands one slot left of the smaller one.
        pma.add(&record(9, 90), 0, s - 2).unwrap();
        let segment = pma.get(0).unwrap();
        assert_eq!(decode(segment.item(s - 1)), (5, 50));
        assert_eq!(decode(segment.item(s - 2)), (9, 90));
    }

    #[test]
    fn test_add_shifts_into_slack() {
        let mut pma = test_pma(1024);
        let s = pma.segment_size();

        pma.add(&record(1, 1), 0, s - 1).unwrap();
        pma.add(&record(5, 5), 0, s - 2).unwrap();
        // Insert between them: 5 shifts one slot left.
        pma.add(&record(3, 3), 0, s - 2).unwrap();

        let segment = pma.get(0).unwrap();
        assert_eq!(segment.item_count, 3);
        assert_eq!(decode(segment.item(s - 1)), (1, 1));
        assert_eq!(decode(segment.item(s - 2)), (3, 3));
        assert_eq!(decode(segment.item(s - 3)), (5, 5));
    }

    #[test]
    fn test_sequential_inserts_stay_retrievable() {
        let mut pma = test_pma(1024);
        pma.add(&record(0, 0), 0, pma.segment_size() - 1).unwrap();
        for i in 1..700u64 {
            insert(&mut pma, i, i + 10);
        }
        for i in 1..700u64 {
            assert_eq!(find_value(&pma, i), Some(i + 10), "key {i}");
        }
        assert_eq!(find_value(&pma, 900), None);
    }

    #[test]
    fn test_interleaved_inserts_stay_retrievable() {
        let mut pma = test_pma(1024);
        pma.add(&record(0, 0), 0, pma.segment_size() - 1).unwrap();
        for j in 1..20u64 {
            for i in 1..20u64 {
                let key = j * 100 + i;
                insert(&mut pma, key, key);
            }
        }
        for j in 1..20u64 {
            for i in 1..20u64 {
                let key = j * 100 + i;
                assert_eq!(find_value(&pma, key), Some(key), "key {key}");
            }
        }
    }

    #[test]
    fn test_first_rebalance_context() {
        let mut pma = test_pma(1024);
        pma.add(&record(0, 0), 0, pma.segment_size() - 1).unwrap();

        let mut old_counts = vec![0u64; pma.segment_count() as usize];
        old_counts[0] = 1;
        let mut key = 1u64;
        loop {
            let segment_id = find_segment(&pma, key);
            let (pos, _) = find_position(&pma, segment_id, key);
            let before: u64 = old_counts.iter().sum();
            let ctx = pma.add(&record(key, key), segment_id, pos).unwrap();
            key += 1;
            if !ctx.is_empty() {
                // The window spans at least a segment pair and conserves
                // items: new counts sum to the old window total plus the
                // inserted item.
                assert!(ctx.updated_segments.len() >= 2);
                let new_total: u64 = ctx.updated_segments.iter().map(|c| c.item_count).sum();
                let old_total: u64 = ctx
                    .updated_segments
                    .iter()
                    .map(|c| old_counts[c.segment_id as usize])
                    .sum();
                assert_eq!(new_total, old_total + 1);
                assert_eq!(before + 1, {
                    for change in &ctx.updated_segments {
                        old_counts[change.segment_id as usize] = change.item_count;
                    }
                    old_counts.iter().sum::<u64>()
                });
                // Rebalanced windows never leave a segment empty.
                assert!(ctx.updated_segments.iter().all(|c| c.item_count >= 1));
                break;
            }
            old_counts[segment_id as usize] += 1;
        }
    }

    #[test]
    fn test_rebalance_fills_empty_segments() {
        let mut pma = test_pma(1024);
        pma.add(&record(0, 0), 0, pma.segment_size() - 1).unwrap();
        let mut filled_seen = false;
        for i in 1..100u64 {
            let segment_id = find_segment(&pma, i);
            let (pos, _) = find_position(&pma, segment_id, i);
            let ctx = pma.add(&record(i, i), segment_id, pos).unwrap();
            if ctx.filled_empty_segments > 0 {
                filled_seen = true;
                assert!(pma.last_non_empty_segment() > 0);
            }
        }
        assert!(filled_seen, "growth never filled a new segment");
    }

    #[test]
    fn test_full_is_reported_and_state_preserved() {
        let cache = Arc::new(BlockCache::new(1024 * 1024));
        // Tiny array: 16 estimated items, 4-slot segments.
        let mut pma = Pma::new("tiny", 16, 16, 1.0, DensityOptions::default(), cache).unwrap();
        pma.add(&record(0, 0), 0, pma.segment_size() - 1).unwrap();

        let mut inserted = 1u64;
        let full = loop {
            let key = inserted;
            let segment_id = find_segment(&pma, key);
            let (pos, _) = find_position(&pma, segment_id, key);
            match pma.add(&record(key, key), segment_id, pos) {
                Ok(_) => inserted += 1,
                Err(err) => break err,
            }
        };
        assert!(full.is_full());

        // Everything inserted before FULL is still there.
        for key in 1..inserted {
            assert_eq!(find_value(&pma, key), Some(key));
        }
        let total: u64 = (0..pma.segment_count()).map(|s| pma.item_count(s)).sum();
        assert_eq!(total, inserted);
    }

    #[test]
    fn test_write_item_in_place() {
        let mut pma = test_pma(1024);
        let s = pma.segment_size();
        pma.add(&record(1, 1), 0, s - 1).unwrap();
        pma.write_item(s - 1, &record(1, 99)).unwrap();
        assert_eq!(find_value(&pma, 1), Some(99));
    }

    #[test]
    fn test_update_context_merge() {
        let mut ctx = UpdateContext {
            updated_segments: vec![
                SegmentChange { segment_id: 2, item_count: 3 },
                SegmentChange { segment_id: 3, item_count: 4 },
            ],
            filled_empty_segments: 1,
        };
        let incoming = UpdateContext {
            updated_segments: vec![
                SegmentChange { segment_id: 3, item_count: 7 },
                SegmentChange { segment_id: 4, item_count: 2 },
            ],
            filled_empty_segments: 1,
        };
        ctx.merge(&incoming);
        assert_eq!(ctx.filled_empty_segments, 2);
        assert_eq!(
            ctx.updated_segments,
            vec![
                SegmentChange { segment_id: 2, item_count: 3 },
                SegmentChange { segment_id: 3, item_count: 7 },
                SegmentChange { segment_id: 4, item_count: 2 },
            ]
        );
    }
}
