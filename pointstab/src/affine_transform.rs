use serde::{Deserialize, Serialize};

/// Determinants smaller than this are treated as singular.
const SINGULAR_EPSILON: f32 = 1e-9;

/// Represents a 2D affine transformation. It includes:
/// - A 2×2 linear transform matrix (`a11`, `a12`, `a21`, `a22`).
/// - A translation offset (`translate_x`, `translate_y`).
///
/// A point `(x, y)` is transformed into `(X, Y)` by:
///
/// ```text
///   X = (x * a11) + (y * a12) + translate_x;
///   Y = (x * a21) + (y * a22) + translate_y;
/// ```
///
/// `Default` is the identity.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    /// Matrix entry: row 1, col 1.
    pub a11: f32,

    /// Matrix entry: row 1, col 2.
    pub a12: f32,

    /// Matrix entry: row 2, col 1.
    pub a21: f32,

    /// Matrix entry: row 2, col 2.
    pub a22: f32,

    /// Translation offset in the transformed space (x-direction).
    pub translate_x: f32,

    /// Translation offset in the transformed space (y-direction).
    pub translate_y: f32,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    /// The neutral transform: `identity().transform(x, y) == (x, y)`.
    pub fn identity() -> Self {
        AffineTransform {
            a11: 1.0,
            a12: 0.0,
            a21: 0.0,
            a22: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }

    /// A pure translation by `(dx, dy)`.
    pub fn translation(dx: f32, dy: f32) -> Self {
        AffineTransform {
            translate_x: dx,
            translate_y: dy,
            ..Self::identity()
        }
    }

    /// Builds a transform from `[a11, a12, tx, a21, a22, ty]` (the two rows of
    /// the 2×3 matrix).
    pub fn from_params(params: [f32; 6]) -> Self {
        AffineTransform {
            a11: params[0],
            a12: params[1],
            translate_x: params[2],
            a21: params[3],
            a22: params[4],
            translate_y: params[5],
        }
    }

    /// Resets this transform to the identity in place.
    pub fn reset(&mut self) {
        *self = Self::identity();
    }

    /// Returns the transform equivalent to applying `other` first and then `self`,
    /// i.e. `c(p) = self(other(p))`.
    ///
    /// Linear parts multiply (`A_c = A_self · A_other`) and the translation becomes
    /// `t_c = A_self · t_other + t_self`.
    ///
    /// The stabilizer composes as `total_motion.compose(&model)`: `model` carries the
    /// current frame into the keyframe, `total_motion` carries the keyframe into the
    /// reference frame, and the result carries the current frame into the reference
    /// frame.
    ///
    /// # Examples
    /// ```
    /// # use pointstab::affine_transform::AffineTransform;
    /// let scale = AffineTransform::from_params([2.0, 0.0, 0.0, 0.0, 2.0, 0.0]);
    /// let shift = AffineTransform::translation(1.0, 0.0);
    ///
    /// // shift first, then scale: (0, 0) -> (1, 0) -> (2, 0)
    /// assert_eq!(scale.compose(&shift).transform(0.0, 0.0), (2.0, 0.0));
    /// // scale first, then shift: (0, 0) -> (0, 0) -> (1, 0)
    /// assert_eq!(shift.compose(&scale).transform(0.0, 0.0), (1.0, 0.0));
    /// ```
    pub fn compose(&self, other: &AffineTransform) -> AffineTransform {
        AffineTransform {
            a11: self.a11 * other.a11 + self.a12 * other.a21,
            a12: self.a11 * other.a12 + self.a12 * other.a22,
            a21: self.a21 * other.a11 + self.a22 * other.a21,
            a22: self.a21 * other.a12 + self.a22 * other.a22,
            translate_x: self.a11 * other.translate_x + self.a12 * other.translate_y + self.translate_x,
            translate_y: self.a21 * other.translate_x + self.a22 * other.translate_y + self.translate_y,
        }
    }

    /// Transform a point `(x, y)` according to this affine transform.
    pub fn transform(&self, x: f32, y: f32) -> (f32, f32) {
        let tx = self.a11 * x + self.a12 * y + self.translate_x;
        let ty = self.a21 * x + self.a22 * y + self.translate_y;
        (tx, ty)
    }

    /// Determinant of the linear part.
    pub fn determinant(&self) -> f32 {
        self.a11 * self.a22 - self.a12 * self.a21
    }

    /// Returns the inverse transform, or `None` if the linear part is singular.
    ///
    /// # Examples
    /// ```
    /// # use pointstab::affine_transform::AffineTransform;
    /// let t = AffineTransform::from_params([0.0, -1.0, 5.0, 1.0, 0.0, -2.0]);
    /// let inv = t.invert().unwrap();
    /// let (x, y) = t.transform(3.0, 4.0);
    /// let (bx, by) = inv.transform(x, y);
    /// assert!((bx - 3.0).abs() < 1e-5 && (by - 4.0).abs() < 1e-5);
    ///
    /// let flat = AffineTransform::from_params([1.0, 2.0, 0.0, 2.0, 4.0, 0.0]);
    /// assert!(flat.invert().is_none());
    /// ```
    pub fn invert(&self) -> Option<AffineTransform> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let a11 = self.a22 * inv_det;
        let a12 = -self.a12 * inv_det;
        let a21 = -self.a21 * inv_det;
        let a22 = self.a11 * inv_det;
        Some(AffineTransform {
            a11,
            a12,
            a21,
            a22,
            translate_x: -(a11 * self.translate_x + a12 * self.translate_y),
            translate_y: -(a21 * self.translate_x + a22 * self.translate_y),
        })
    }

    /// Checks if the scale factors (the magnitudes of each row in the 2×2 portion)
    /// are within the range `[1/scale_bound, scale_bound]`.
    ///
    /// Used to reject degenerate motion fits.
    ///
    /// # Returns
    /// - `true` if both scale factors lie in the valid range.
    /// - `false` otherwise, or if `scale_bound` is non-positive.
    ///
    /// # Examples
    /// ```
    /// # use pointstab::affine_transform::AffineTransform;
    /// let t = AffineTransform::identity();
    /// assert!(t.is_scale_valid(2.0));
    /// assert!(!t.is_scale_valid(0.0));
    /// ```
    pub fn is_scale_valid(&self, scale_bound: f32) -> bool {
        if scale_bound <= 0.0 {
            return false;
        }

        let min_scale = 1.0 / scale_bound;
        let scale_x = (self.a11.powi(2) + self.a12.powi(2)).sqrt();
        let scale_y = (self.a21.powi(2) + self.a22.powi(2)).sqrt();

        scale_x > min_scale && scale_x < scale_bound && scale_y > min_scale && scale_y < scale_bound
    }

    /// True when all six coefficients differ by at most `epsilon`.
    pub fn approx_eq(&self, other: &AffineTransform, epsilon: f32) -> bool {
        (self.a11 - other.a11).abs() <= epsilon
            && (self.a12 - other.a12).abs() <= epsilon
            && (self.a21 - other.a21).abs() <= epsilon
            && (self.a22 - other.a22).abs() <= epsilon
            && (self.translate_x - other.translate_x).abs() <= epsilon
            && (self.translate_y - other.translate_y).abs() <= epsilon
    }

    /// True for an exact identity.
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}
