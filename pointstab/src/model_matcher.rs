//! Contract the stabilizer needs from a robust motion estimator.

use crate::affine_transform::AffineTransform;
use crate::feature_pair::FeaturePair;

/// Fits an affine model to a set of correspondences while rejecting outliers.
///
/// The fitted model maps each pair's `current` position onto its `keyframe`
/// position, i.e. it is the motion from the current frame to the keyframe.
pub trait ModelMatcher {
    /// Fit a model to `pairs`. Returns `false` if no model could be found.
    fn process(&mut self, pairs: &[FeaturePair]) -> bool;

    /// The model found by the last successful [`ModelMatcher::process`] call.
    fn model(&self) -> AffineTransform;

    /// The consensus set of the last successful fit.
    fn match_set(&self) -> &[FeaturePair];
}
