//! Core engines for the CoBtree simulator.
//!
//! This crate provides:
//! - Packed memory array (PMA) with density-triggered local rebalance
//! - van Emde Boas layout search tree stored inside a PMA
//! - The composed three-level CoBtree index
//!
//! All storage goes through the simulated block device and every segment
//! access is metered by the shared block cache, so test drivers can read
//! per-operation block-transfer counts.

mod cobtree;
mod pma;
mod veb;

pub use cobtree::CoBtree;
pub use pma::{Pma, Segment, SegmentChange, UpdateContext};
pub use veb::{subtree_height, LeafCursor, Node, NodeEntry, VebTree};
