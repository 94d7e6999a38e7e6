//! Point correspondence between the keyframe and the current frame.

/// A tracked point: where it was seen in the keyframe and where it is now.
///
/// Owned by the tracker; the stabilizer only reads these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeaturePair {
    /// Position in the keyframe.
    pub keyframe: (f32, f32),
    /// Position in the current frame.
    pub current: (f32, f32),
}

impl FeaturePair {
    /// Create a new feature pair
    pub fn new(keyframe: (f32, f32), current: (f32, f32)) -> Self {
        Self { keyframe, current }
    }

    /// Displacement from the keyframe position to the current position.
    pub fn displacement(&self) -> (f32, f32) {
        (self.current.0 - self.keyframe.0, self.current.1 - self.keyframe.1)
    }

    /// Get both positions as a `(keyframe, current)` tuple
    pub fn as_tuple(&self) -> ((f32, f32), (f32, f32)) {
        (self.keyframe, self.current)
    }
}
