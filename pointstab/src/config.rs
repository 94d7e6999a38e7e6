//! Stabilizer thresholds.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Thresholds that drive keyframe and reference-frame management.
///
/// Fixed once the stabilizer is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Minimum inlier count. Below it the keyframe is advanced while the
    /// reference frame is kept.
    pub change_threshold: usize,

    /// Minimum active-track count. Below it a full reset occurs.
    pub reset_threshold: usize,

    /// Maximum drift (pixels) of the test point before the reference frame is
    /// abandoned.
    pub distance_threshold: f64,

    /// Point whose displacement under the accumulated transform measures drift.
    pub drift_test_point: (f32, f32),
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        StabilizerConfig {
            change_threshold: 40,
            reset_threshold: 20,
            distance_threshold: 60.0,
            drift_test_point: (0.0, 0.0),
        }
    }
}

impl StabilizerConfig {
    pub fn new(change_threshold: usize, reset_threshold: usize, distance_threshold: f64) -> Self {
        StabilizerConfig {
            change_threshold,
            reset_threshold,
            distance_threshold,
            ..Self::default()
        }
    }

    /// Checks that all thresholds are usable.
    ///
    /// A `reset_threshold` above `change_threshold` is accepted with a warning:
    /// every frame short of inliers would then also be short of tracks.
    pub fn validate(&self) -> Result<()> {
        if self.change_threshold == 0 {
            return Err(Error::InvalidConfig("change_threshold must be positive".to_string()));
        }
        if self.reset_threshold == 0 {
            return Err(Error::InvalidConfig("reset_threshold must be positive".to_string()));
        }
        if !self.distance_threshold.is_finite() || self.distance_threshold <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "distance_threshold must be a positive number of pixels, got {}",
                self.distance_threshold
            )));
        }
        if !self.drift_test_point.0.is_finite() || !self.drift_test_point.1.is_finite() {
            return Err(Error::InvalidConfig("drift_test_point must be finite".to_string()));
        }
        if self.reset_threshold > self.change_threshold {
            warn!(
                reset_threshold = self.reset_threshold,
                change_threshold = self.change_threshold,
                "reset threshold exceeds change threshold"
            );
        }
        Ok(())
    }

    /// `distance_threshold` squared, the form used for comparisons.
    pub fn distance_threshold2(&self) -> f64 {
        self.distance_threshold * self.distance_threshold
    }
}
