use tracing::{debug, trace, warn};

use crate::affine_transform::AffineTransform;
use crate::affine_warp::{BilinearAffineWarper, PixelWarper};
use crate::config::StabilizerConfig;
use crate::feature_pair::FeaturePair;
use crate::model_matcher::ModelMatcher;
use crate::photo::Photo;
use crate::point_tracker::{PointTracker, SingleImageInput};
use crate::Result;

/// Why a frame took the reset path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResetReason {
    /// Fewer active tracks than `reset_threshold`.
    InsufficientTracks { active: usize, required: usize },
    /// The matcher found no model.
    EstimationFailed,
    /// The accumulated transform cannot be inverted for rendering.
    DegenerateTransform,
    /// The test point moved further than `distance_threshold`.
    DriftExceeded { drift2: f64, limit2: f64 },
}

/// What happened to a frame passed to [`StabilizationController::process`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Warped into the reference frame; no state change.
    Stabilized,
    /// Warped into the reference frame, then the keyframe moved to this frame.
    /// The reference frame is unchanged.
    KeyframeChanged,
    /// The output is an unmodified copy of the input and this frame is the new
    /// reference frame.
    Reset(ResetReason),
}

impl FrameOutcome {
    pub fn is_reset(&self) -> bool {
        matches!(self, FrameOutcome::Reset(_))
    }
}

/// Point-feature image stabilization with an affine motion model.
///
/// Point features are tracked relative to a keyframe; the matcher turns those
/// tracks into a robust affine estimate of the motion from the current frame to
/// the keyframe. The keyframe changes when too few inliers remain. Motion across
/// keyframes is accumulated in `total_motion` so that every frame can be warped
/// into a common reference frame. The reference frame itself is re-anchored (a
/// reset) when tracking is lost or the accumulated motion drifts too far.
///
/// # Examples
/// ```
/// use pointstab::{
///     AffineTransform, FeaturePair, ModelMatcher, Photo, PixelFormat, PointTracker,
///     SingleImageInput, StabilizationController, StabilizerConfig,
/// };
///
/// /// Reports the same tracks on every frame.
/// struct Fixed(Vec<FeaturePair>);
/// impl SingleImageInput for Fixed {
///     fn process(&mut self, _frame: &Photo) {}
/// }
/// impl PointTracker for Fixed {
///     fn active_tracks(&self) -> &[FeaturePair] { &self.0 }
///     fn set_current_to_keyframe(&mut self) {}
///     fn spawn_tracks(&mut self) {}
/// }
///
/// /// Always fits the identity using every pair.
/// struct Still(Vec<FeaturePair>);
/// impl ModelMatcher for Still {
///     fn process(&mut self, pairs: &[FeaturePair]) -> bool {
///         self.0 = pairs.to_vec();
///         true
///     }
///     fn model(&self) -> AffineTransform { AffineTransform::identity() }
///     fn match_set(&self) -> &[FeaturePair] { &self.0 }
/// }
///
/// let tracks = vec![FeaturePair::new((1.0, 1.0), (1.0, 1.0)); 10];
/// let config = StabilizerConfig::new(5, 3, 8.0);
/// let mut stabilizer = StabilizationController::new(Fixed(tracks), Still(vec![]), config).unwrap();
///
/// let frame = Photo::new(4, 4, PixelFormat::Gray8);
/// assert!(!stabilizer.process(&frame).is_reset());
/// assert_eq!(stabilizer.stabilized_image(), Some(&frame));
/// ```
pub struct StabilizationController<T, M, W = BilinearAffineWarper> {
    /// Tracks point features in the image.
    tracker: T,

    /// Computes the image motion robustly.
    matcher: M,

    /// Renders the stabilized image from the unstabilized one.
    warper: W,

    /// Thresholds, fixed at construction.
    config: StabilizerConfig,

    /// `config.distance_threshold` squared.
    distance_threshold2: f64,

    /// Motion from the keyframe to the reference frame, excluding the current frame.
    total_motion: AffineTransform,

    /// Stabilized output, allocated on the first frame.
    stabilized: Option<Photo>,

    /// Consensus set of the last frame that was not reset.
    inliers: Vec<FeaturePair>,

    /// True if the reference frame was re-anchored on the last frame.
    reference_frame_changed: bool,

    /// Drift metric scratch: the test point and its image under the candidate transform.
    test_point: (f32, f32),
    test_result: (f32, f32),

    frames_processed: usize,
}

impl<T, M> StabilizationController<T, M, BilinearAffineWarper>
where
    T: PointTracker + SingleImageInput,
    M: ModelMatcher,
{
    /// Creates a stabilizer that renders with bilinear interpolation.
    ///
    /// # Errors
    /// [`crate::Error::InvalidConfig`] if `config` fails validation.
    pub fn new(tracker: T, matcher: M, config: StabilizerConfig) -> Result<Self> {
        Self::with_warper(tracker, matcher, BilinearAffineWarper::default(), config)
    }
}

impl<T, M, W> StabilizationController<T, M, W>
where
    T: PointTracker + SingleImageInput,
    M: ModelMatcher,
    W: PixelWarper,
{
    /// Creates a stabilizer with a caller-supplied warper.
    ///
    /// # Errors
    /// [`crate::Error::InvalidConfig`] if `config` fails validation.
    pub fn with_warper(tracker: T, matcher: M, warper: W, config: StabilizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(StabilizationController {
            tracker,
            matcher,
            warper,
            distance_threshold2: config.distance_threshold2(),
            test_point: config.drift_test_point,
            test_result: config.drift_test_point,
            config,
            total_motion: AffineTransform::identity(),
            stabilized: None,
            inliers: Vec::new(),
            reference_frame_changed: false,
            frames_processed: 0,
        })
    }

    /// Computes the stabilized image. Frames are assumed to be sequential.
    ///
    /// Never fails: lost tracking, failed fits and excessive drift all re-anchor
    /// the reference frame on this frame, which is reported through the returned
    /// [`FrameOutcome`].
    pub fn process(&mut self, frame: &Photo) -> FrameOutcome {
        self.frames_processed += 1;
        self.ensure_output(frame);

        self.tracker.process(frame);
        let active = self.tracker.active_tracks().len();

        let outcome = if active < self.config.reset_threshold {
            FrameOutcome::Reset(ResetReason::InsufficientTracks {
                active,
                required: self.config.reset_threshold,
            })
        } else if !self.matcher.process(self.tracker.active_tracks()) {
            FrameOutcome::Reset(ResetReason::EstimationFailed)
        } else {
            self.apply_model(frame)
        };

        match outcome {
            FrameOutcome::Reset(reason) => {
                debug!(frame = self.frames_processed, ?reason, active, "reference frame reset");
                self.reset_reference(frame);
            }
            FrameOutcome::KeyframeChanged => {
                debug!(
                    frame = self.frames_processed,
                    inliers = self.inliers.len(),
                    "keyframe changed"
                );
                self.reference_frame_changed = false;
            }
            FrameOutcome::Stabilized => {
                trace!(frame = self.frames_processed, inliers = self.inliers.len(), "stabilized");
                self.reference_frame_changed = false;
            }
        }
        outcome
    }

    /// Success path: render through the accumulated transform, then decide
    /// whether the result is trustworthy and whether the keyframe must move.
    fn apply_model(&mut self, frame: &Photo) -> FrameOutcome {
        // current frame -> keyframe -> reference frame
        let candidate = self.total_motion.compose(&self.matcher.model());

        if self.warper.set_transform(&candidate).is_err() {
            return FrameOutcome::Reset(ResetReason::DegenerateTransform);
        }
        if let Some(output) = self.stabilized.as_mut() {
            self.warper.apply(frame, output);
        }

        self.test_result = candidate.transform(self.test_point.0, self.test_point.1);
        let dx = self.test_result.0 as f64 - self.test_point.0 as f64;
        let dy = self.test_result.1 as f64 - self.test_point.1 as f64;
        let drift2 = dx * dx + dy * dy;

        if drift2 > self.distance_threshold2 {
            return FrameOutcome::Reset(ResetReason::DriftExceeded {
                drift2,
                limit2: self.distance_threshold2,
            });
        }

        self.inliers.clear();
        self.inliers.extend_from_slice(self.matcher.match_set());

        if self.inliers.len() < self.config.change_threshold {
            self.total_motion = candidate;
            self.tracker.set_current_to_keyframe();
            self.tracker.spawn_tracks();
            FrameOutcome::KeyframeChanged
        } else {
            FrameOutcome::Stabilized
        }
    }

    /// Tracking is lost or the reference frame is unusable: make this frame the
    /// new keyframe and the new reference frame.
    fn reset_reference(&mut self, frame: &Photo) {
        self.tracker.set_current_to_keyframe();
        self.tracker.spawn_tracks();
        if let Some(output) = self.stabilized.as_mut() {
            output.set_to(frame);
        }
        self.total_motion.reset();
        self.inliers.clear();
        self.reference_frame_changed = true;
    }

    fn ensure_output(&mut self, frame: &Photo) {
        match &self.stabilized {
            Some(output) if output.same_shape(frame) => {}
            Some(output) => {
                warn!(
                    old_width = output.width,
                    old_height = output.height,
                    width = frame.width,
                    height = frame.height,
                    "frame shape changed, reallocating stabilized output"
                );
                self.stabilized = Some(frame.new_like());
            }
            None => self.stabilized = Some(frame.new_like()),
        }
    }

    /// Forgets all history: identity motion, no output, no inliers.
    ///
    /// The next frame re-keys the tracker through the normal reset path unless
    /// the tracker still reports enough tracks.
    pub fn reset(&mut self) {
        self.total_motion.reset();
        self.stabilized = None;
        self.inliers.clear();
        self.reference_frame_changed = false;
        self.frames_processed = 0;
    }

    /// The stabilized image of the last frame, `None` before the first frame.
    pub fn stabilized_image(&self) -> Option<&Photo> {
        self.stabilized.as_ref()
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Consensus set of the last frame; empty if that frame was reset.
    pub fn inlier_features(&self) -> &[FeaturePair] {
        &self.inliers
    }

    /// Motion from the current keyframe to the reference frame.
    pub fn total_motion(&self) -> &AffineTransform {
        &self.total_motion
    }

    /// True only if the last frame re-anchored the reference frame.
    pub fn is_reference_frame_changed(&self) -> bool {
        self.reference_frame_changed
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed
    }
}
