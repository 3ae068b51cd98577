//! FIFO block cache with a block-transfer meter.

use crate::device::DEFAULT_BLOCK_SIZE;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use sysinfo::System;

/// Cache key for one PMA segment.
///
/// The epoch is the owning PMA's reallocate counter; bumping it after a
/// whole-array reallocation would invalidate every cached segment of that
/// PMA without an explicit flush. In the current scope the epoch stays 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Identifier of the owning PMA.
    pub pma_id: String,
    /// Reallocate epoch of the owning PMA.
    pub epoch: u32,
    /// Segment index within the PMA.
    pub segment_id: u64,
}

impl Fingerprint {
    /// Creates a fingerprint for a segment of the given PMA epoch.
    pub fn new(pma_id: &str, epoch: u32, segment_id: u64) -> Self {
        Self {
            pma_id: pma_id.to_string(),
            epoch,
            segment_id,
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.pma_id, self.epoch, self.segment_id)
    }
}

struct CacheInner {
    usage: u64,
    block_size: u64,
    transfer_count: u64,
    resident: HashMap<Fingerprint, u64>,
    fifo: VecDeque<Fingerprint>,
}

/// FIFO-evicted cache that counts block transfers.
///
/// The cache records which segments are resident and how large they are;
/// the segment bytes themselves stay in the block device. Admitting or
/// evicting an entry of `len` bytes credits the meter with one transfer
/// per device block the entry spans. The meter is what the test drivers
/// read, so the cache is shared by all PMAs of a tree through `Arc`.
pub struct BlockCache {
    capacity: u64,
    inner: Mutex<CacheInner>,
}

impl BlockCache {
    /// Creates a cache bounded to `capacity` bytes of resident segments.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                usage: 0,
                block_size: DEFAULT_BLOCK_SIZE,
                transfer_count: 0,
                resident: HashMap::new(),
                fifo: VecDeque::new(),
            }),
        }
    }

    /// Creates a cache sized to 25% of available system RAM.
    ///
    /// Minimum 1 MB so the simulator stays usable on constrained hosts.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory();
        let capacity = (available_bytes / 4).max(1024 * 1024);
        Self::new(capacity)
    }

    /// Returns the cache capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the bytes currently resident.
    pub fn usage(&self) -> u64 {
        self.inner.lock().usage
    }

    /// Returns true if the segment is resident.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.lock().resident.contains_key(fingerprint)
    }

    /// Records an access to a segment of `len` bytes.
    ///
    /// Returns true on a hit. On a miss the segment is admitted, evicting
    /// in FIFO order until it fits, and the meter is charged for the
    /// admission and every eviction.
    pub fn touch(&self, fingerprint: Fingerprint, len: u64) -> bool {
        assert!(len < self.capacity, "segment larger than the whole cache");
        let mut inner = self.inner.lock();

        if inner.resident.contains_key(&fingerprint) {
            return true;
        }

        while inner.usage + len > self.capacity {
            let victim = inner
                .fifo
                .pop_front()
                .expect("cache over capacity with empty FIFO");
            let victim_len = inner
                .resident
                .remove(&victim)
                .expect("FIFO entry missing from resident map");
            inner.usage -= victim_len;
            inner.transfer_count += victim_len.div_ceil(inner.block_size);
        }

        inner.usage += len;
        inner.transfer_count += len.div_ceil(inner.block_size);
        inner.fifo.push_back(fingerprint.clone());
        inner.resident.insert(fingerprint, len);
        false
    }

    /// Sets the block size used by the transfer meter.
    pub fn set_block_size_for_stats(&self, block_size: u64) {
        assert!(block_size > 0);
        self.inner.lock().block_size = block_size;
    }

    /// Returns the block transfers counted so far.
    pub fn recorded_block_transfer(&self) -> u64 {
        self.inner.lock().transfer_count
    }

    /// Resets the transfer meter to zero.
    pub fn reset_block_transfer_stats(&self) {
        self.inner.lock().transfer_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(segment_id: u64) -> Fingerprint {
        Fingerprint::new("test", 0, segment_id)
    }

    #[test]
    fn test_fingerprint_display() {
        let fingerprint = Fingerprint::new("l3-data", 2, 7);
        assert_eq!(fingerprint.to_string(), "l3-data:2:7");
    }

    #[test]
    fn test_cache_miss_then_hit() {
        let cache = BlockCache::new(64 * 1024);
        cache.set_block_size_for_stats(4096);

        assert!(!cache.touch(fp(0), 4096));
        assert_eq!(cache.recorded_block_transfer(), 1);

        assert!(cache.touch(fp(0), 4096));
        assert_eq!(cache.recorded_block_transfer(), 1);
    }

    #[test]
    fn test_cache_charges_per_block() {
        let cache = BlockCache::new(64 * 1024);
        cache.set_block_size_for_stats(4096);

        // 5000 bytes spans two 4K blocks.
        cache.touch(fp(0), 5000);
        assert_eq!(cache.recorded_block_transfer(), 2);
    }

    #[test]
    fn test_cache_fifo_eviction() {
        let cache = BlockCache::new(8192);
        cache.set_block_size_for_stats(4096);

        cache.touch(fp(0), 4096);
        cache.touch(fp(1), 4096);
        assert_eq!(cache.usage(), 8192);

        // Admitting a third segment evicts the oldest (segment 0):
        // one transfer for the eviction, one for the admission.
        cache.touch(fp(2), 4096);
        assert!(!cache.contains(&fp(0)));
        assert!(cache.contains(&fp(1)));
        assert!(cache.contains(&fp(2)));
        assert_eq!(cache.recorded_block_transfer(), 4);
    }

    #[test]
    fn test_cache_eviction_order_ignores_rereference() {
        let cache = BlockCache::new(8192);
        cache.set_block_size_for_stats(4096);

        cache.touch(fp(0), 4096);
        cache.touch(fp(1), 4096);
        // A hit does not refresh FIFO position.
        cache.touch(fp(0), 4096);
        cache.touch(fp(2), 4096);
        assert!(!cache.contains(&fp(0)));
    }

    #[test]
    fn test_cache_reset_stats() {
        let cache = BlockCache::new(64 * 1024);
        cache.set_block_size_for_stats(4096);

        cache.touch(fp(0), 4096);
        assert_eq!(cache.recorded_block_transfer(), 1);

        cache.reset_block_transfer_stats();
        assert_eq!(cache.recorded_block_transfer(), 0);
        // Residency survives a stats reset.
        assert!(cache.contains(&fp(0)));
    }

    #[test]
    fn test_cache_distinct_pma_ids_do_not_collide() {
        let cache = BlockCache::new(64 * 1024);
        cache.set_block_size_for_stats(4096);

        cache.touch(Fingerprint::new("a", 0, 0), 4096);
        assert!(!cache.touch(Fingerprint::new("b", 0, 0), 4096));
        assert_eq!(cache.recorded_block_transfer(), 2);
    }

    #[test]
    fn test_cache_epoch_invalidates() {
        let cache = BlockCache::new(64 * 1024);
        cache.set_block_size_for_stats(4096);

        cache.touch(Fingerprint::new("a", 0, 3), 4096);
        // Same segment under a bumped epoch is a distinct entry.
        assert!(!cache.touch(Fingerprint::new("a", 1, 3), 4096));
    }

    #[test]
    fn test_cache_auto_sized_minimum() {
        let cache = BlockCache::auto_sized();
        assert!(cache.capacity() >= 1024 * 1024);
    }
}
