//! CoBtree common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all CoBtree components.

pub mod config;
pub mod error;

pub use config::{CobtreeConfig, DensityOptions};
pub use error::{CobtreeError, Result};

/// Sentinel for an unset address, key, or height.
///
/// PMA item addresses, node parent pointers, and child entries all use the
/// full `u64` range with `u64::MAX` reserved as "empty".
pub const NIL: u64 = u64::MAX;
