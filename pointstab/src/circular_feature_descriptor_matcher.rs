use crate::circular_feature_descriptor::CircularFeatureDescriptor;
use crate::circular_feature_grid::CircularFeatureGrid;
use kd_tree::{KdPoint, KdTree};

/// A descriptor placed in the joint appearance/position space searched by the
/// kd-tree: the six feature components followed by the weighted image position.
#[derive(Debug, Clone, Copy)]
struct DescriptorPoint {
    coords: [i64; 8],
    descriptor: CircularFeatureDescriptor,
}

impl DescriptorPoint {
    fn new(descriptor: CircularFeatureDescriptor, position: (f32, f32), position_weight: f32) -> Self {
        let mut coords = [0i64; 8];
        coords[..6].copy_from_slice(&descriptor.feature_vector);
        coords[6] = (position.0 * position_weight).round() as i64;
        coords[7] = (position.1 * position_weight).round() as i64;
        DescriptorPoint { coords, descriptor }
    }
}

impl KdPoint for DescriptorPoint {
    type Scalar = i64;
    type Dim = typenum::U8;
    fn at(&self, k: usize) -> i64 {
        self.coords[k]
    }
}

/// Limits applied when looking up a tracked feature in a new frame.
#[derive(Debug, Clone, Copy)]
pub struct MatchLimits {
    /// Number of kd-tree neighbours examined.
    pub candidate_count: usize,
    /// Maximum image distance (pixels) from the predicted position.
    pub search_radius: f32,
    /// Maximum feature-vector distance (pixels of centre-of-mass offset).
    pub max_descriptor_distance: f32,
}

/// Finds where a keyframe descriptor has moved to in a new frame.
///
/// This struct uses a [KdTree] (built from the `kd_tree` crate) over every
/// descriptor of the new frame's [`CircularFeatureGrid`]. Each entry combines the
/// feature vector with the image position scaled by `position_weight`, so the
/// nearest neighbours of a query are similar-looking regions close to where the
/// feature was last seen.
pub struct CircularFeatureDescriptorMatcher {
    kdtree: KdTree<DescriptorPoint>,
    position_weight: f32,
}

impl CircularFeatureDescriptorMatcher {
    pub fn new(grid: &CircularFeatureGrid, position_weight: f32) -> Self {
        let points: Vec<DescriptorPoint> = grid
            .descriptors()
            .iter()
            .map(|d| DescriptorPoint::new(*d, d.position(), position_weight))
            .collect();
        CircularFeatureDescriptorMatcher {
            kdtree: KdTree::build(points),
            position_weight,
        }
    }

    /// Best match for `descriptor` near `predicted`, or `None` if no candidate
    /// passes `limits`.
    ///
    /// Candidates are ranked by their joint appearance/position distance.
    pub fn find(
        &self,
        descriptor: &CircularFeatureDescriptor,
        predicted: (f32, f32),
        limits: &MatchLimits,
    ) -> Option<CircularFeatureDescriptor> {
        let query = DescriptorPoint::new(*descriptor, predicted, self.position_weight);
        let radius2 = limits.search_radius * limits.search_radius;

        self.kdtree
            .nearests(&query, limits.candidate_count)
            .into_iter()
            .map(|found| found.item.descriptor)
            .find(|candidate| {
                let (x, y) = candidate.position();
                let dx = x - predicted.0;
                let dy = y - predicted.1;
                dx * dx + dy * dy <= radius2
                    && candidate.distance(descriptor) <= limits.max_descriptor_distance
            })
    }
}
