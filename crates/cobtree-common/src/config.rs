//! Configuration structures for the CoBtree simulator.

use crate::error::{CobtreeError, Result};
use serde::{Deserialize, Serialize};

/// Density thresholds controlling PMA rebalance.
///
/// The upper pair bounds how full a rebalance window may get before its
/// items are spread over a wider window; the lower pair is the symmetric
/// merge schedule, carried for completeness but never consulted by the
/// insert-only workloads in scope.
///
/// Validity chain: 0 < lower_min < lower_max < upper_min < upper_max <= 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityOptions {
    /// Upper bound at a single segment (tau_d).
    pub upper_max: f64,
    /// Upper bound at the whole array (tau_0).
    pub upper_min: f64,
    /// Lower bound at the whole array (rho_0).
    pub lower_max: f64,
    /// Lower bound at a single segment (rho_d).
    pub lower_min: f64,
}

impl Default for DensityOptions {
    fn default() -> Self {
        Self {
            upper_max: 0.8,
            upper_min: 0.6,
            lower_max: 0.2,
            lower_min: 0.1,
        }
    }
}

impl DensityOptions {
    /// Creates density options, checking the validity chain.
    pub fn new(upper_max: f64, upper_min: f64, lower_max: f64, lower_min: f64) -> Result<Self> {
        let options = Self {
            upper_max,
            upper_min,
            lower_max,
            lower_min,
        };
        options.validate()?;
        Ok(options)
    }

    /// Checks 0 < rho_d < rho_0 < tau_0 < tau_d <= 1.
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 < self.lower_min
            && self.lower_min < self.lower_max
            && self.lower_max < self.upper_min
            && self.upper_min < self.upper_max
            && self.upper_max <= 1.0;
        if !ordered {
            return Err(CobtreeError::ConfigError(format!(
                "density thresholds must satisfy 0 < {} < {} < {} < {} <= 1",
                self.lower_min, self.lower_max, self.upper_min, self.upper_max
            )));
        }
        Ok(())
    }

    /// Upper density threshold for a rebalance window at logical height
    /// `height` of an index tree of total height `depth`.
    ///
    /// Interpolates linearly from `upper_max` at a single segment
    /// (height 1) down to `upper_min` at the whole array (height =
    /// depth).
    pub fn upper_threshold(&self, height: u64, depth: u64) -> f64 {
        if depth <= 1 {
            return self.upper_max;
        }
        self.upper_min
            + (self.upper_max - self.upper_min) * (depth - height) as f64 / (depth - 1) as f64
    }
}

/// Top-level configuration for a composed CoBtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CobtreeConfig {
    /// Maximum children per vEB tree node.
    pub fanout: u64,
    /// Estimated number of records the tree is sized for.
    pub estimated_records: u64,
    /// Redundancy factor for the vEB tree PMA.
    pub redundancy_l1: f64,
    /// Redundancy factor for the separator PMA.
    pub redundancy_l2: f64,
    /// Redundancy factor for the record PMA.
    pub redundancy_l3: f64,
    /// Density thresholds for the vEB tree PMA.
    pub density_l1: DensityOptions,
    /// Density thresholds for the separator PMA.
    pub density_l2: DensityOptions,
    /// Density thresholds for the record PMA.
    pub density_l3: DensityOptions,
    /// Prefix for cache fingerprints of the three PMAs.
    pub id_prefix: String,
}

impl Default for CobtreeConfig {
    fn default() -> Self {
        Self {
            fanout: 4,
            estimated_records: 1024 * 1024,
            redundancy_l1: 1.2,
            redundancy_l2: 1.2,
            redundancy_l3: 1.2,
            density_l1: DensityOptions::default(),
            density_l2: DensityOptions::default(),
            density_l3: DensityOptions::default(),
            id_prefix: "cobtree".to_string(),
        }
    }
}

impl CobtreeConfig {
    /// Checks fanout, sizing, and all three density chains.
    pub fn validate(&self) -> Result<()> {
        if self.fanout < 2 {
            return Err(CobtreeError::InvalidParameter {
                name: "fanout".to_string(),
                value: self.fanout.to_string(),
            });
        }
        if self.estimated_records < 2 {
            return Err(CobtreeError::InvalidParameter {
                name: "estimated_records".to_string(),
                value: self.estimated_records.to_string(),
            });
        }
        for (name, r) in [
            ("redundancy_l1", self.redundancy_l1),
            ("redundancy_l2", self.redundancy_l2),
            ("redundancy_l3", self.redundancy_l3),
        ] {
            if r < 1.0 {
                return Err(CobtreeError::InvalidParameter {
                    name: name.to_string(),
                    value: r.to_string(),
                });
            }
        }
        self.density_l1.validate()?;
        self.density_l2.validate()?;
        self.density_l3.validate()?;
        Ok(())
    }

    /// Record capacity of the bottom level: N * r3.
    pub fn record_capacity_l3(&self) -> u64 {
        (self.estimated_records as f64 * self.redundancy_l3).ceil() as u64
    }

    /// Estimated separator count of the middle level: one item per
    /// log2-sized chunk of the bottom level.
    pub fn item_estimate_l2(&self) -> u64 {
        let records = self.record_capacity_l3();
        (records as f64 / (records as f64).log2()).ceil() as u64
    }

    /// Estimated leaf count of the vEB tree: one leaf per log2-sized
    /// chunk of the middle level.
    pub fn leaf_estimate_l1(&self) -> u64 {
        let items = (self.item_estimate_l2() as f64 * self.redundancy_l2).ceil();
        (items / items.log2()).ceil() as u64
    }
}
