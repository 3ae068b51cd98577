//! Flat RAM block device.

/// Default device block size in bytes (4 KB).
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// A byte-addressed backing store rounded up to whole blocks.
///
/// The device is a plain in-memory buffer; persistence is out of scope.
/// Reads return slices directly into the buffer so callers get zero-copy
/// access, and writes past the end are dropped rather than growing the
/// buffer (the PMA never writes out of range when executed correctly).
pub struct BlockDevice {
    block_size: u64,
    buffer: Vec<u8>,
}

impl BlockDevice {
    /// Creates a device of at least `len` bytes with the default block size.
    pub fn new(len: u64) -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE, len)
    }

    /// Creates a device of at least `len` bytes with a custom block size.
    pub fn with_block_size(block_size: u64, len: u64) -> Self {
        assert!(block_size > 0);
        let rounded = Self::round_to_block_size(block_size, len);
        Self {
            block_size,
            buffer: vec![0u8; rounded as usize],
        }
    }

    /// Rounds `len` up to a whole number of blocks.
    pub fn round_to_block_size(block_size: u64, len: u64) -> u64 {
        len.div_ceil(block_size) * block_size
    }

    /// Returns the device block size in bytes.
    #[inline]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Returns the total device capacity in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.buffer.len() as u64
    }

    /// Returns true if the device has zero capacity.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Reads `len` bytes starting at `offset`.
    ///
    /// A read crossing the end of the device is truncated to the bytes
    /// that exist.
    pub fn read(&self, offset: u64, len: u64) -> &[u8] {
        let start = offset.min(self.len()) as usize;
        let end = (offset + len).min(self.len()) as usize;
        &self.buffer[start..end]
    }

    /// Writes `data` starting at `offset`.
    ///
    /// A write crossing the end of the device is dropped entirely.
    pub fn write(&mut self, offset: u64, data: &[u8]) {
        let end = offset + data.len() as u64;
        if end > self.len() {
            return;
        }
        self.buffer[offset as usize..end as usize].copy_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_rounds_up_to_blocks() {
        let device = BlockDevice::new(1);
        assert_eq!(device.len(), DEFAULT_BLOCK_SIZE);

        let device = BlockDevice::new(DEFAULT_BLOCK_SIZE + 1);
        assert_eq!(device.len(), 2 * DEFAULT_BLOCK_SIZE);

        let device = BlockDevice::with_block_size(512, 1000);
        assert_eq!(device.len(), 1024);
        assert_eq!(device.block_size(), 512);
    }

    #[test]
    fn test_device_write_read_roundtrip() {
        let mut device = BlockDevice::new(8192);

        device.write(100, &[0xAB, 0xCD, 0xEF]);
        assert_eq!(device.read(100, 3), &[0xAB, 0xCD, 0xEF]);
        assert_eq!(device.read(99, 1), &[0x00]);
    }

    #[test]
    fn test_device_read_truncates_at_end() {
        let device = BlockDevice::with_block_size(512, 512);
        assert_eq!(device.read(500, 100).len(), 12);
        assert_eq!(device.read(512, 8).len(), 0);
        assert_eq!(device.read(1000, 8).len(), 0);
    }

    #[test]
    fn test_device_write_past_end_is_dropped() {
        let mut device = BlockDevice::with_block_size(512, 512);
        device.write(510, &[1, 2, 3, 4]);
        // Nothing was written, not even the in-range prefix.
        assert_eq!(device.read(510, 2), &[0, 0]);
    }

    #[test]
    fn test_device_zeroed_on_creation() {
        let device = BlockDevice::new(4096);
        assert!(device.read(0, 4096).iter().all(|&b| b == 0));
    }
}
