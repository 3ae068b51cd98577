//! Error types for the CoBtree simulator.

use thiserror::Error;

/// Result type alias using CobtreeError.
pub type Result<T> = std::result::Result<T, CobtreeError>;

/// Errors that can occur in CoBtree operations.
///
/// `PmaFull` is the only error a caller can meaningfully react to: it
/// propagates unmodified through every layer and the failing structure is
/// left in its pre-call state. Everything else signals a broken caller
/// contract; internal invariant violations panic instead of returning.
#[derive(Debug, Error)]
pub enum CobtreeError {
    #[error("PMA {id} full: density above threshold at the whole-array level")]
    PmaFull { id: String },

    #[error("segment {segment_id} out of range (PMA has {segment_count} segments)")]
    SegmentOutOfRange {
        segment_id: u64,
        segment_count: u64,
    },

    #[error("item address {address} out of range (capacity {capacity})")]
    AddressOutOfRange { address: u64, capacity: u64 },

    #[error("invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl CobtreeError {
    /// True if this error is the capacity-exhausted signal.
    pub fn is_full(&self) -> bool {
        matches!(self, CobtreeError::PmaFull { .. })
    }
}
