//! Sequential point tracker built on circular colour descriptors.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::circular_feature_descriptor::CircularFeatureDescriptor;
use crate::circular_feature_descriptor_matcher::{CircularFeatureDescriptorMatcher, MatchLimits};
use crate::circular_feature_grid::CircularFeatureGrid;
use crate::feature_pair::FeaturePair;
use crate::photo::Photo;
use crate::point_tracker::{PointTracker, SingleImageInput};
use crate::{Error, Result};

/// Tracker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Radius of the circular region described around each point.
    pub circle_radius: usize,
    /// Spacing of the positions at which descriptors are computed.
    pub sample_stride: usize,
    /// Size of the cells in which at most one new feature is spawned.
    pub feature_spacing: usize,
    /// Weakest centre-of-mass offset (pixels) accepted for a new feature.
    pub min_feature_strength: f32,
    /// Furthest a feature may move between consecutive frames (pixels).
    pub search_radius: f32,
    /// kd-tree neighbours examined per track.
    pub candidate_count: usize,
    /// Largest descriptor change accepted for a match.
    pub max_descriptor_distance: f32,
    /// Relative weight of image position against appearance when ranking candidates.
    pub position_weight: f32,
    /// Align descriptors to their dominant direction.
    pub rotation_invariant: bool,
    /// Upper bound on tracks spawned from one keyframe.
    pub max_tracks: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            circle_radius: 5,
            sample_stride: 2,
            feature_spacing: 16,
            min_feature_strength: 0.5,
            search_radius: 24.0,
            candidate_count: 48,
            max_descriptor_distance: 3.0,
            position_weight: 4.0,
            rotation_invariant: false,
            max_tracks: 400,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.circle_radius == 0 {
            return Err(Error::InvalidConfig("circle_radius must be positive".to_string()));
        }
        if self.sample_stride == 0 || self.feature_spacing == 0 {
            return Err(Error::InvalidConfig(
                "sample_stride and feature_spacing must be positive".to_string(),
            ));
        }
        if self.candidate_count == 0 || self.max_tracks == 0 {
            return Err(Error::InvalidConfig(
                "candidate_count and max_tracks must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("search_radius", self.search_radius),
            ("max_descriptor_distance", self.max_descriptor_distance),
            ("position_weight", self.position_weight),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        if !self.min_feature_strength.is_finite() || self.min_feature_strength < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "min_feature_strength must not be negative, got {}",
                self.min_feature_strength
            )));
        }
        Ok(())
    }

    fn match_limits(&self) -> MatchLimits {
        MatchLimits {
            candidate_count: self.candidate_count,
            search_radius: self.search_radius,
            max_descriptor_distance: self.max_descriptor_distance,
        }
    }
}

/// A feature followed from the keyframe.
#[derive(Debug, Clone, Copy)]
struct Track {
    /// Descriptor computed in the keyframe; every frame is matched against it.
    descriptor: CircularFeatureDescriptor,
    pair: FeaturePair,
}

/// [`PointTracker`] that follows circular colour descriptors from frame to frame.
///
/// Each track remembers its keyframe descriptor and is looked up in every new frame
/// near its last known position. Tracks that cannot be found are dropped; new ones
/// are only created by [`PointTracker::spawn_tracks`].
pub struct CircularFeatureTracker {
    config: TrackerConfig,
    /// Last frame passed to `process`.
    current: Option<Photo>,
    keyframe: Option<Photo>,
    tracks: Vec<Track>,
    /// Cache of `tracks` in the form handed out by `active_tracks`.
    pairs: Vec<FeaturePair>,
}

impl CircularFeatureTracker {
    /// # Errors
    /// [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(CircularFeatureTracker {
            config,
            current: None,
            keyframe: None,
            tracks: Vec::new(),
            pairs: Vec::new(),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// True once a keyframe has been set.
    pub fn has_keyframe(&self) -> bool {
        self.keyframe.is_some()
    }

    fn grid(&self, photo: &Photo) -> CircularFeatureGrid {
        CircularFeatureGrid::new(
            photo,
            self.config.circle_radius,
            self.config.sample_stride,
            self.config.rotation_invariant,
        )
    }

    fn refresh_pairs(&mut self) {
        self.pairs.clear();
        self.pairs.extend(self.tracks.iter().map(|t| t.pair));
    }
}

impl SingleImageInput for CircularFeatureTracker {
    fn process(&mut self, frame: &Photo) {
        match self.current.as_mut() {
            Some(current) => current.set_to(frame),
            None => self.current = Some(frame.clone()),
        }

        let keyframe_shape_matches = self
            .keyframe
            .as_ref()
            .is_some_and(|keyframe| keyframe.same_shape(frame));
        if !keyframe_shape_matches {
            self.tracks.clear();
        }

        if !self.tracks.is_empty() {
            let matcher = CircularFeatureDescriptorMatcher::new(&self.grid(frame), self.config.position_weight);
            let limits = self.config.match_limits();
            let before = self.tracks.len();

            self.tracks.retain_mut(|track| {
                match matcher.find(&track.descriptor, track.pair.current, &limits) {
                    Some(found) => {
                        track.pair.current = found.position();
                        true
                    }
                    None => false,
                }
            });
            trace!(before, after = self.tracks.len(), "tracks matched");
        }

        self.refresh_pairs();
    }
}

impl PointTracker for CircularFeatureTracker {
    fn active_tracks(&self) -> &[FeaturePair] {
        &self.pairs
    }

    fn set_current_to_keyframe(&mut self) {
        self.keyframe = self.current.clone();
        self.tracks.clear();
        self.pairs.clear();
    }

    fn spawn_tracks(&mut self) {
        let Some(keyframe) = self.keyframe.as_ref() else {
            return;
        };

        let mut features = self.grid(keyframe).strongest_per_cell(
            keyframe.width,
            keyframe.height,
            self.config.feature_spacing,
            self.config.min_feature_strength,
        );
        if features.len() > self.config.max_tracks {
            features.sort_by(|a, b| b.total_radius.total_cmp(&a.total_radius));
            features.truncate(self.config.max_tracks);
        }

        self.tracks.extend(features.into_iter().map(|descriptor| {
            let position = descriptor.position();
            Track {
                descriptor,
                pair: FeaturePair::new(position, position),
            }
        }));
        trace!(tracks = self.tracks.len(), "tracks spawned");
        self.refresh_pairs();
    }
}
