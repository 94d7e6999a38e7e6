//! RANSAC estimation of the affine motion between two frames.

use nalgebra::{Matrix3, Vector3};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::affine_transform::AffineTransform;
use crate::feature_pair::FeaturePair;
use crate::model_matcher::ModelMatcher;
use crate::{Error, Result};

/// Points needed to determine an affine map.
const SAMPLE_SIZE: usize = 3;

/// RANSAC parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Upper bound on hypotheses drawn per call.
    pub max_iterations: usize,
    /// Reprojection distance (pixels) within which a pair counts as an inlier.
    pub inlier_threshold: f64,
    /// Probability of drawing at least one all-inlier sample, for early termination.
    pub confidence: f64,
    /// Fewer inliers than this and the fit fails.
    pub min_inliers: usize,
    /// Row scale of the linear part must lie in `[1/max_scale, max_scale]`.
    pub max_scale: f32,
    /// Fixed seed for reproducible runs. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for RansacConfig {
    fn default() -> Self {
        RansacConfig {
            max_iterations: 1000,
            inlier_threshold: 2.0,
            confidence: 0.99,
            min_inliers: 3,
            max_scale: 4.0,
            seed: None,
        }
    }
}

impl RansacConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be positive".to_string()));
        }
        if !self.inlier_threshold.is_finite() || self.inlier_threshold <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "inlier_threshold must be positive, got {}",
                self.inlier_threshold
            )));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        if self.min_inliers < SAMPLE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "min_inliers must be at least {SAMPLE_SIZE}"
            )));
        }
        if !self.max_scale.is_finite() || self.max_scale <= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "max_scale must be greater than 1, got {}",
                self.max_scale
            )));
        }
        Ok(())
    }
}

/// [`ModelMatcher`] that fits an affine map with RANSAC.
///
/// Each hypothesis is fitted to three randomly chosen pairs. The hypothesis with
/// the most inliers is refined by least squares over all of its inliers.
///
/// # Examples
/// ```
/// use pointstab::{AffineTransform, FeaturePair, ModelMatcher, RansacAffineMatcher, RansacConfig};
///
/// let motion = AffineTransform::translation(3.0, -1.0);
/// let pairs: Vec<FeaturePair> = (0..20)
///     .map(|i| {
///         let current = ((i % 5) as f32 * 10.0, (i / 5) as f32 * 10.0);
///         FeaturePair::new(motion.transform(current.0, current.1), current)
///     })
///     .collect();
///
/// let config = RansacConfig { seed: Some(7), ..RansacConfig::default() };
/// let mut matcher = RansacAffineMatcher::new(config).unwrap();
/// assert!(matcher.process(&pairs));
/// assert!(matcher.model().approx_eq(&motion, 1e-3));
/// assert_eq!(matcher.match_set().len(), 20);
/// ```
pub struct RansacAffineMatcher {
    config: RansacConfig,
    rng: ChaCha8Rng,
    model: AffineTransform,
    match_set: Vec<FeaturePair>,
    sample: Vec<usize>,
    candidate_inliers: Vec<usize>,
    best_inliers: Vec<usize>,
}

impl RansacAffineMatcher {
    /// # Errors
    /// [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(config: RansacConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::seed_from_u64(rand::random()),
        };
        Ok(RansacAffineMatcher {
            config,
            rng,
            model: AffineTransform::identity(),
            match_set: Vec::new(),
            sample: Vec::with_capacity(SAMPLE_SIZE),
            candidate_inliers: Vec::new(),
            best_inliers: Vec::new(),
        })
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Indices of the pairs that `model` maps within the inlier threshold.
    fn collect_inliers(&self, pairs: &[FeaturePair], model: &AffineTransform, inliers: &mut Vec<usize>) {
        let threshold2 = self.config.inlier_threshold * self.config.inlier_threshold;
        inliers.clear();
        for (i, pair) in pairs.iter().enumerate() {
            if reprojection_error2(model, pair) <= threshold2 {
                inliers.push(i);
            }
        }
    }
}

impl ModelMatcher for RansacAffineMatcher {
    fn process(&mut self, pairs: &[FeaturePair]) -> bool {
        self.match_set.clear();
        let n = pairs.len();
        if n < SAMPLE_SIZE {
            return false;
        }

        let mut best_model = None;
        let mut best_inliers = std::mem::take(&mut self.best_inliers);
        let mut candidate_inliers = std::mem::take(&mut self.candidate_inliers);
        best_inliers.clear();

        let mut max_iterations = self.config.max_iterations;
        let mut iteration = 0;
        while iteration < max_iterations {
            iteration += 1;

            random_sample_into(&mut self.rng, n, SAMPLE_SIZE, &mut self.sample);
            let hypothesis = match fit_affine(self.sample.iter().map(|&i| &pairs[i])) {
                Some(model) if model.is_scale_valid(self.config.max_scale) => model,
                _ => continue,
            };

            self.collect_inliers(pairs, &hypothesis, &mut candidate_inliers);
            if candidate_inliers.len() > best_inliers.len() {
                std::mem::swap(&mut best_inliers, &mut candidate_inliers);
                best_model = Some(hypothesis);

                let ratio = best_inliers.len() as f64 / n as f64;
                max_iterations = max_iterations
                    .min(adaptive_iterations(ratio, SAMPLE_SIZE, self.config.confidence));
            }
        }

        let found = match best_model {
            Some(model) if best_inliers.len() >= self.config.min_inliers => {
                // least squares over the consensus set, kept only if it does not lose support
                if let Some(refined) = fit_affine(best_inliers.iter().map(|&i| &pairs[i])) {
                    if refined.is_scale_valid(self.config.max_scale) {
                        self.collect_inliers(pairs, &refined, &mut candidate_inliers);
                        if candidate_inliers.len() >= best_inliers.len() {
                            std::mem::swap(&mut best_inliers, &mut candidate_inliers);
                            self.model = refined;
                        } else {
                            self.model = model;
                        }
                    } else {
                        self.model = model;
                    }
                } else {
                    self.model = model;
                }
                self.match_set.extend(best_inliers.iter().map(|&i| pairs[i]));
                true
            }
            _ => false,
        };

        trace!(pairs = n, iterations = iteration, inliers = self.match_set.len(), found, "ransac");

        self.best_inliers = best_inliers;
        self.candidate_inliers = candidate_inliers;
        found
    }

    fn model(&self) -> AffineTransform {
        self.model
    }

    fn match_set(&self) -> &[FeaturePair] {
        &self.match_set
    }
}

/// Squared distance between `model(current)` and `keyframe`.
fn reprojection_error2(model: &AffineTransform, pair: &FeaturePair) -> f64 {
    let (x, y) = model.transform(pair.current.0, pair.current.1);
    let dx = x as f64 - pair.keyframe.0 as f64;
    let dy = y as f64 - pair.keyframe.1 as f64;
    dx * dx + dy * dy
}

/// Least-squares affine map from each pair's `current` point to its `keyframe` point.
///
/// Coordinates are centred on the mean current point before the normal equations
/// are formed. Returns `None` for fewer than three pairs or collinear points.
fn fit_affine<'a>(pairs: impl Iterator<Item = &'a FeaturePair> + Clone) -> Option<AffineTransform> {
    let mut count = 0usize;
    let (mut cx, mut cy) = (0.0f64, 0.0f64);
    for pair in pairs.clone() {
        cx += pair.current.0 as f64;
        cy += pair.current.1 as f64;
        count += 1;
    }
    if count < SAMPLE_SIZE {
        return None;
    }
    cx /= count as f64;
    cy /= count as f64;

    let mut normal = Matrix3::<f64>::zeros();
    let mut rhs_x = Vector3::<f64>::zeros();
    let mut rhs_y = Vector3::<f64>::zeros();
    for pair in pairs {
        let row = Vector3::new(pair.current.0 as f64 - cx, pair.current.1 as f64 - cy, 1.0);
        normal += row * row.transpose();
        rhs_x += row * pair.keyframe.0 as f64;
        rhs_y += row * pair.keyframe.1 as f64;
    }

    // collinear points leave the 2x2 spread matrix rank deficient
    let sxx = normal[(0, 0)];
    let syy = normal[(1, 1)];
    let sxy = normal[(0, 1)];
    let spread = sxx + syy;
    if spread <= f64::EPSILON || sxx * syy - sxy * sxy <= 1e-9 * spread * spread {
        return None;
    }

    let lu = normal.lu();
    let px = lu.solve(&rhs_x)?;
    let py = lu.solve(&rhs_y)?;

    let (a11, a12) = (px[0], px[1]);
    let (a21, a22) = (py[0], py[1]);
    let model = AffineTransform {
        a11: a11 as f32,
        a12: a12 as f32,
        a21: a21 as f32,
        a22: a22 as f32,
        translate_x: (px[2] - a11 * cx - a12 * cy) as f32,
        translate_y: (py[2] - a21 * cx - a22 * cy) as f32,
    };
    let finite = [model.a11, model.a12, model.a21, model.a22, model.translate_x, model.translate_y]
        .iter()
        .all(|v| v.is_finite());
    finite.then_some(model)
}

/// Draws `k` distinct indices from `0..n` into `buffer`.
fn random_sample_into<R: Rng>(rng: &mut R, n: usize, k: usize, buffer: &mut Vec<usize>) {
    debug_assert!(k <= n, "cannot sample {k} indices from {n}");
    buffer.clear();

    if k <= n / 2 {
        // Floyd's algorithm
        for j in (n - k)..n {
            let t = rng.random_range(0..=j);
            if buffer.contains(&t) {
                buffer.push(j);
            } else {
                buffer.push(t);
            }
        }
    } else {
        buffer.extend(0..n);
        buffer.shuffle(rng);
        buffer.truncate(k);
    }
}

/// Iterations needed to draw one all-inlier sample with probability `confidence`.
fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio >= 1.0 {
        return 1;
    }
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    let all_inliers = inlier_ratio.powi(sample_size as i32);
    let iterations = (1.0 - confidence).ln() / (1.0 - all_inliers).ln();
    if iterations.is_finite() {
        iterations.ceil().max(1.0) as usize
    } else {
        usize::MAX
    }
}
