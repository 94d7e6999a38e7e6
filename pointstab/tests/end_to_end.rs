use pointstab::{
    CircularFeatureTracker, FrameOutcome, ModelMatcher, Photo, PixelFormat, PointTracker,
    RansacAffineMatcher, RansacConfig, StabilizationController, StabilizerConfig, TrackerConfig,
};

const WIDTH: usize = 96;
const HEIGHT: usize = 72;

/// 3x3 coloured spots on black, one per 12x12 cell, with the content moved right by `shift`.
fn spots(shift: usize) -> Photo {
    let mut photo = Photo::new(WIDTH, HEIGHT, PixelFormat::Rgb8);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let (u, v) = (x + 120 - shift, y + 120);
            let (i, j) = (u / 12, v / 12);
            let cx = 12 * i + (i * 7 + j * 3) % 6 + 3;
            let cy = 12 * j + (i * 5 + j * 11) % 6 + 3;
            if u.abs_diff(cx) <= 1 && v.abs_diff(cy) <= 1 {
                let p = (y * WIDTH + x) * 3;
                photo.img_data[p] = 200;
                photo.img_data[p + 1] = ((i * 53 + j * 31) % 200 + 55) as u8;
                photo.img_data[p + 2] = ((i * 17 + j * 71) % 200 + 55) as u8;
            }
        }
    }
    photo
}

fn stabilizer() -> StabilizationController<CircularFeatureTracker, RansacAffineMatcher> {
    let tracker = CircularFeatureTracker::new(TrackerConfig::default()).unwrap();
    let matcher = RansacAffineMatcher::new(RansacConfig {
        seed: Some(11),
        ..RansacConfig::default()
    })
    .unwrap();
    StabilizationController::new(tracker, matcher, StabilizerConfig::new(8, 4, 30.0)).unwrap()
}

#[test]
fn test_panning_sequence_is_held_still() {
    let mut stabilizer = stabilizer();
    let reference = spots(0);

    assert!(stabilizer.process(&reference).is_reset());
    assert_eq!(stabilizer.stabilized_image(), Some(&reference));
    assert!(!stabilizer.tracker().active_tracks().is_empty());

    for k in 1..=6 {
        let shift = 2 * k;
        let outcome = stabilizer.process(&spots(shift));
        assert_eq!(outcome, FrameOutcome::Stabilized, "frame {k}");

        // the fitted motion undoes the pan
        let model = stabilizer.total_motion().compose(&stabilizer.matcher().model());
        assert!((model.translate_x + shift as f32).abs() < 0.05, "frame {k}: {model:?}");
        assert!(model.translate_y.abs() < 0.05, "frame {k}: {model:?}");
        assert!((model.a11 - 1.0).abs() < 1e-3 && (model.a22 - 1.0).abs() < 1e-3);
        assert!(stabilizer.inlier_features().len() >= 8);

        // everything still in view lines up with the reference frame
        let output = stabilizer.stabilized_image().unwrap();
        for y in 0..HEIGHT {
            for x in 0..WIDTH - shift - 1 {
                let p = (y * WIDTH + x) * 3;
                assert_eq!(
                    output.img_data[p..p + 3],
                    reference.img_data[p..p + 3],
                    "frame {k} at ({x}, {y})"
                );
            }
        }
    }
}
