use std::collections::VecDeque;

use approx::assert_relative_eq;
use pointstab::{
    AffineTransform, BilinearAffineWarper, FeaturePair, FrameOutcome, ModelMatcher, Photo,
    PixelFormat, PixelWarper, PointTracker, ResetReason, SingleImageInput,
    StabilizationController, StabilizerConfig,
};

/// Calls received by [`ScriptedTracker`], in order.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TrackerCall {
    Process,
    SetCurrentToKeyframe,
    SpawnTracks,
}

/// Reports a scripted number of tracks per frame and records every call.
struct ScriptedTracker {
    counts: VecDeque<usize>,
    default_count: usize,
    tracks: Vec<FeaturePair>,
    calls: Vec<TrackerCall>,
}

impl ScriptedTracker {
    fn always(count: usize) -> Self {
        Self::scripted(&[], count)
    }

    fn scripted(counts: &[usize], default_count: usize) -> Self {
        ScriptedTracker {
            counts: counts.iter().copied().collect(),
            default_count,
            tracks: Vec::new(),
            calls: Vec::new(),
        }
    }

    fn count(&self, call: TrackerCall) -> usize {
        self.calls.iter().filter(|&&c| c == call).count()
    }

    fn rekeys(&self) -> usize {
        self.count(TrackerCall::SetCurrentToKeyframe)
    }
}

impl SingleImageInput for ScriptedTracker {
    fn process(&mut self, _frame: &Photo) {
        self.calls.push(TrackerCall::Process);
        let count = self.counts.pop_front().unwrap_or(self.default_count);
        self.tracks = (0..count)
            .map(|i| {
                let p = (i as f32 * 3.0, i as f32 * 2.0);
                FeaturePair::new(p, p)
            })
            .collect();
    }
}

impl PointTracker for ScriptedTracker {
    fn active_tracks(&self) -> &[FeaturePair] {
        &self.tracks
    }

    fn set_current_to_keyframe(&mut self) {
        self.calls.push(TrackerCall::SetCurrentToKeyframe);
    }

    fn spawn_tracks(&mut self) {
        self.calls.push(TrackerCall::SpawnTracks);
    }
}

/// One scripted fit: `None` fails, `Some((model, inliers))` succeeds.
type Fit = Option<(AffineTransform, usize)>;

/// Returns scripted fits in order, then `fallback` forever.
struct ScriptedMatcher {
    fits: VecDeque<Fit>,
    fallback: Fit,
    model: AffineTransform,
    inliers: Vec<FeaturePair>,
    calls: usize,
}

impl ScriptedMatcher {
    fn always(fit: Fit) -> Self {
        Self::scripted(&[], fit)
    }

    fn scripted(fits: &[Fit], fallback: Fit) -> Self {
        ScriptedMatcher {
            fits: fits.iter().copied().collect(),
            fallback,
            model: AffineTransform::identity(),
            inliers: Vec::new(),
            calls: 0,
        }
    }
}

impl ModelMatcher for ScriptedMatcher {
    fn process(&mut self, _pairs: &[FeaturePair]) -> bool {
        self.calls += 1;
        match self.fits.pop_front().unwrap_or(self.fallback) {
            Some((model, inliers)) => {
                self.model = model;
                self.inliers = vec![FeaturePair::new((1.0, 1.0), (1.0, 1.0)); inliers];
                true
            }
            None => {
                self.inliers.clear();
                false
            }
        }
    }

    fn model(&self) -> AffineTransform {
        self.model
    }

    fn match_set(&self) -> &[FeaturePair] {
        &self.inliers
    }
}

type Stabilizer = StabilizationController<ScriptedTracker, ScriptedMatcher>;

/// Thresholds used by the scenarios: change 5, reset 3, distance 8.
fn scenario_config() -> StabilizerConfig {
    StabilizerConfig::new(5, 3, 8.0)
}

fn stabilizer(tracker: ScriptedTracker, matcher: ScriptedMatcher) -> Stabilizer {
    StabilizationController::new(tracker, matcher, scenario_config()).unwrap()
}

/// Grey photo with a distinct value at every pixel.
fn gradient(seed: u8) -> Photo {
    let (width, height) = (12, 9);
    let data = (0..width * height)
        .map(|i| ((i * 7 + seed as usize * 13) % 256) as u8)
        .collect();
    Photo::from_raw(width, height, PixelFormat::Gray8, data).unwrap()
}

/// What the default warper renders for `frame` under `model`.
fn rendered(frame: &Photo, model: &AffineTransform) -> Photo {
    let mut warper = BilinearAffineWarper::default();
    warper.set_transform(model).unwrap();
    let mut output = frame.new_like();
    warper.apply(frame, &mut output);
    output
}

fn translation_fit(dx: f32, inliers: usize) -> Fit {
    Some((AffineTransform::translation(dx, 0.0), inliers))
}

#[test]
fn test_identity_stability() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::always(10),
        ScriptedMatcher::always(Some((AffineTransform::identity(), 5))),
    );

    for i in 0..10 {
        let frame = gradient(i);
        assert_eq!(stabilizer.process(&frame), FrameOutcome::Stabilized);
        assert!(!stabilizer.is_reference_frame_changed());
        assert!(stabilizer.total_motion().is_identity());
        assert_eq!(stabilizer.stabilized_image(), Some(&frame));
    }
    assert_eq!(stabilizer.tracker().rekeys(), 0);
}

#[test]
fn test_reset_on_starvation() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::scripted(&[10, 2, 0, 1], 10),
        ScriptedMatcher::always(translation_fit(1.0, 4)),
    );

    // keyframe promotion moves total_motion away from identity
    stabilizer.process(&gradient(0));
    assert!(!stabilizer.total_motion().is_identity());

    for (i, active) in [(1u8, 2usize), (2, 0), (3, 1)] {
        let frame = gradient(i);
        let calls_before = stabilizer.tracker().calls.len();

        let outcome = stabilizer.process(&frame);
        assert_eq!(
            outcome,
            FrameOutcome::Reset(ResetReason::InsufficientTracks { active, required: 3 })
        );
        assert_eq!(stabilizer.stabilized_image(), Some(&frame));
        assert!(stabilizer.total_motion().is_identity());
        assert!(stabilizer.is_reference_frame_changed());
        assert!(stabilizer.inlier_features().is_empty());
        assert_eq!(
            &stabilizer.tracker().calls[calls_before..],
            &[
                TrackerCall::Process,
                TrackerCall::SetCurrentToKeyframe,
                TrackerCall::SpawnTracks
            ]
        );
    }
    // only the first frame reached the estimator
    assert_eq!(stabilizer.matcher().calls, 1);
}

#[test]
fn test_estimation_failure_resets() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::always(10),
        ScriptedMatcher::scripted(&[translation_fit(1.0, 4), None], translation_fit(0.0, 6)),
    );
    stabilizer.process(&gradient(0));

    let frame = gradient(1);
    assert_eq!(
        stabilizer.process(&frame),
        FrameOutcome::Reset(ResetReason::EstimationFailed)
    );
    assert_eq!(stabilizer.stabilized_image(), Some(&frame));
    assert!(stabilizer.total_motion().is_identity());
    assert_eq!(stabilizer.tracker().rekeys(), 2);
    assert_eq!(stabilizer.tracker().count(TrackerCall::SpawnTracks), 2);

    // the next good frame clears the flag again
    assert_eq!(stabilizer.process(&gradient(2)), FrameOutcome::Stabilized);
    assert!(!stabilizer.is_reference_frame_changed());
}

#[test]
fn test_drift_equal_to_threshold_does_not_reset() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::always(10),
        ScriptedMatcher::always(translation_fit(8.0, 6)),
    );
    assert_eq!(stabilizer.process(&gradient(0)), FrameOutcome::Stabilized);
    assert!(!stabilizer.is_reference_frame_changed());
}

#[test]
fn test_drift_above_threshold_resets() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::always(10),
        ScriptedMatcher::always(translation_fit(8.001, 6)),
    );
    let frame = gradient(0);
    match stabilizer.process(&frame) {
        FrameOutcome::Reset(ResetReason::DriftExceeded { drift2, limit2 }) => {
            assert!(drift2 > limit2);
            assert_relative_eq!(limit2, 64.0);
        }
        other => panic!("expected a drift reset, got {other:?}"),
    }
    assert_eq!(stabilizer.stabilized_image(), Some(&frame));
}

#[test]
fn test_drift_is_measured_at_configured_point() {
    // a rotation about the origin leaves the default test point in place
    let (sin, cos) = 0.5f32.sin_cos();
    let rotation = AffineTransform::from_params([cos, -sin, 0.0, sin, cos, 0.0]);

    let mut at_origin = stabilizer(
        ScriptedTracker::always(10),
        ScriptedMatcher::always(Some((rotation, 6))),
    );
    assert_eq!(at_origin.process(&gradient(0)), FrameOutcome::Stabilized);

    let config = StabilizerConfig {
        drift_test_point: (100.0, 0.0),
        ..scenario_config()
    };
    let mut far = StabilizationController::new(
        ScriptedTracker::always(10),
        ScriptedMatcher::always(Some((rotation, 6))),
        config,
    )
    .unwrap();
    assert!(far.process(&gradient(0)).is_reset());
}

#[test]
fn test_composition_neutrality() {
    let samples = [
        AffineTransform::identity(),
        AffineTransform::translation(-3.5, 12.0),
        AffineTransform::from_params([1.2, 0.3, -7.0, -0.4, 0.8, 2.5]),
        AffineTransform::from_params([0.0, -1.0, 100.0, 1.0, 0.0, -50.0]),
    ];
    let identity = AffineTransform::identity();
    for m in samples {
        assert!(m.compose(&identity).approx_eq(&m, 1e-6));
        assert!(identity.compose(&m).approx_eq(&m, 1e-6));
    }
}

#[test]
fn test_scenario_a_small_motion_is_rendered() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::always(10),
        ScriptedMatcher::scripted(&[translation_fit(1.0, 4)], translation_fit(0.5, 6)),
    );
    // first frame promotes the keyframe so total_motion is not trivial
    assert_eq!(stabilizer.process(&gradient(0)), FrameOutcome::KeyframeChanged);
    let total = *stabilizer.total_motion();
    let rekeys = stabilizer.tracker().rekeys();

    let frame = gradient(1);
    assert_eq!(stabilizer.process(&frame), FrameOutcome::Stabilized);

    let expected = rendered(&frame, &total.compose(&AffineTransform::translation(0.5, 0.0)));
    assert_eq!(stabilizer.stabilized_image(), Some(&expected));
    assert_eq!(*stabilizer.total_motion(), total);
    assert_eq!(stabilizer.tracker().rekeys(), rekeys);
    assert_eq!(stabilizer.inlier_features().len(), 6);
    assert!(!stabilizer.is_reference_frame_changed());
}

#[test]
fn test_scenario_b_too_few_tracks() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::scripted(&[10], 2),
        ScriptedMatcher::always(translation_fit(1.0, 4)),
    );
    stabilizer.process(&gradient(0));
    let rekeys = stabilizer.tracker().rekeys();

    let frame = gradient(1);
    assert!(stabilizer.process(&frame).is_reset());
    assert_eq!(stabilizer.stabilized_image(), Some(&frame));
    assert!(stabilizer.total_motion().is_identity());
    assert_eq!(stabilizer.tracker().rekeys(), rekeys + 1);
}

#[test]
fn test_scenario_c_keyframe_promotion_keeps_render() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::always(10),
        ScriptedMatcher::scripted(&[translation_fit(0.0, 6)], translation_fit(1.0, 4)),
    );
    stabilizer.process(&gradient(0));
    let before = *stabilizer.total_motion();

    let frame = gradient(1);
    assert_eq!(stabilizer.process(&frame), FrameOutcome::KeyframeChanged);

    let candidate = before.compose(&AffineTransform::translation(1.0, 0.0));
    assert_eq!(*stabilizer.total_motion(), candidate);
    assert_eq!(stabilizer.tracker().rekeys(), 1);
    assert_eq!(stabilizer.tracker().count(TrackerCall::SpawnTracks), 1);

    let output = stabilizer.stabilized_image().unwrap();
    assert_eq!(output, &rendered(&frame, &candidate));
    assert_ne!(output, &frame);
    assert!(!stabilizer.is_reference_frame_changed());
    assert_eq!(stabilizer.inlier_features().len(), 4);

    // promotions accumulate
    stabilizer.process(&gradient(2));
    assert_relative_eq!(stabilizer.total_motion().translate_x, 2.0);
}

#[test]
fn test_scenario_d_drift_overrides_render() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::always(10),
        ScriptedMatcher::scripted(&[translation_fit(5.0, 4)], translation_fit(4.0, 6)),
    );
    // total_motion becomes a 5 pixel shift, within the 8 pixel limit
    assert_eq!(stabilizer.process(&gradient(0)), FrameOutcome::KeyframeChanged);

    // 5 + 4 = 9 pixels of drift
    let frame = gradient(1);
    let outcome = stabilizer.process(&frame);
    assert_eq!(
        outcome,
        FrameOutcome::Reset(ResetReason::DriftExceeded { drift2: 81.0, limit2: 64.0 })
    );
    assert_eq!(stabilizer.stabilized_image(), Some(&frame));
    assert!(stabilizer.total_motion().is_identity());
    assert!(stabilizer.is_reference_frame_changed());
    assert!(stabilizer.inlier_features().is_empty());
    assert_eq!(stabilizer.tracker().rekeys(), 2);
}

#[test]
fn test_reset_rekeys_on_next_frame() {
    let mut stabilizer = stabilizer(
        ScriptedTracker::scripted(&[10, 10, 0], 10),
        ScriptedMatcher::always(translation_fit(1.0, 6)),
    );
    stabilizer.process(&gradient(0));
    stabilizer.process(&gradient(1));
    stabilizer.reset();
    assert!(stabilizer.stabilized_image().is_none());

    let frame = gradient(2);
    assert!(stabilizer.process(&frame).is_reset());
    assert_eq!(stabilizer.stabilized_image(), Some(&frame));
    assert_eq!(stabilizer.frames_processed(), 1);
}
