//! Contract the stabilizer needs from a point tracker.

use crate::feature_pair::FeaturePair;
use crate::photo::Photo;

/// A tracker that is fed one image at a time.
///
/// The stabilizer requires this capability; it is expressed as a trait bound so
/// an unsuitable tracker is rejected when the stabilizer is constructed, not
/// when the first frame arrives.
pub trait SingleImageInput {
    /// Update all tracks with the next frame of the sequence.
    fn process(&mut self, frame: &Photo);
}

/// Maintains point tracks relative to a keyframe.
pub trait PointTracker {
    /// Tracks that survived the most recent call to [`SingleImageInput::process`].
    fn active_tracks(&self) -> &[FeaturePair];

    /// Make the most recently processed frame the keyframe. Existing tracks are dropped.
    fn set_current_to_keyframe(&mut self);

    /// Detect fresh features in the keyframe and start tracking them.
    fn spawn_tracks(&mut self);
}
