//! Simulated storage for the CoBtree.
//!
//! This crate provides:
//! - A flat RAM block device standing in for external memory
//! - A FIFO block cache that exists only to count block transfers
//!
//! The cache never holds data; the device is authoritative. A PMA asks the
//! cache to `touch` a segment fingerprint before every segment access, and
//! the cache charges one transfer per device block admitted or evicted.

mod cache;
mod device;

pub use cache::{BlockCache, Fingerprint};
pub use device::{BlockDevice, DEFAULT_BLOCK_SIZE};
