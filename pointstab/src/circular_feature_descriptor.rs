use crate::photo::Photo;

/// Scale applied to centre-of-mass offsets when they are quantized into
/// [`CircularFeatureDescriptor::feature_vector`].
pub const FEATURE_SCALE: f32 = 100.0;

/// Stores the "centre of mass" of the colour channels in a circular region of an
/// image. Each channel's centre of mass is an offset (in pixels) from the region's
/// centre; textured regions have large, distinctive offsets and flat regions have
/// none.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct CircularFeatureDescriptor {
    /// The x-coordinate of the region's centre in the image.
    pub x: u32,

    /// The y-coordinate of the region's centre in the image.
    pub y: u32,

    /// Direction (`atan2`) of the combined colour centre of mass.
    pub total_angle: f32,

    /// Distance of the combined colour centre of mass from the centre. Used as the
    /// feature strength.
    pub total_radius: f32,

    /// Sum of all channel values in the region.
    pub intensity: u32,

    /// Quantized per-channel offsets `[red_x, red_y, green_x, green_y, blue_x, blue_y]`,
    /// scaled by [`FEATURE_SCALE`].
    pub feature_vector: [i64; 6],
}

impl CircularFeatureDescriptor {
    /// Computes the descriptor of the region `offsets` around `(x, y)`.
    ///
    /// Positions outside the image are clamped to the nearest edge pixel. Grey
    /// photos contribute the same value to all three channels.
    ///
    /// # Parameters
    /// - `photo`: Source image.
    /// - `x`, `y`: Region centre.
    /// - `offsets`: Pixel offsets making up the region (see [`circle_offsets`]).
    /// - `rotation_invariant`: When `true`, the channel offsets are rotated so the
    ///   combined centre of mass lies on the positive x axis.
    pub fn compute(
        photo: &Photo,
        x: usize,
        y: usize,
        offsets: &[(isize, isize)],
        rotation_invariant: bool,
    ) -> CircularFeatureDescriptor {
        let max_x = photo.width as isize - 1;
        let max_y = photo.height as isize - 1;

        let mut sums = [0i64; 3];
        let mut weighted_x = [0i64; 3];
        let mut weighted_y = [0i64; 3];

        for &(dx, dy) in offsets {
            let sx = (x as isize + dx).clamp(0, max_x) as usize;
            let sy = (y as isize + dy).clamp(0, max_y) as usize;
            let (r, g, b) = photo.get_rgb(sx, sy);
            for (c, value) in [r, g, b].into_iter().enumerate() {
                let value = value as i64;
                sums[c] += value;
                weighted_x[c] += dx as i64 * value;
                weighted_y[c] += dy as i64 * value;
            }
        }

        let centre_of_mass = |wx: i64, wy: i64, sum: i64| -> (f32, f32) {
            if sum == 0 {
                (0.0, 0.0)
            } else {
                (wx as f32 / sum as f32, wy as f32 / sum as f32)
            }
        };

        let sum_all: i64 = sums.iter().sum();
        let (total_x, total_y) = centre_of_mass(
            weighted_x.iter().sum(),
            weighted_y.iter().sum(),
            sum_all,
        );
        let total_angle = if sum_all == 0 { 0.0 } else { total_y.atan2(total_x) };

        // rotating by -total_angle makes the descriptor independent of region orientation
        let (sin, cos) = if rotation_invariant {
            (-total_angle).sin_cos()
        } else {
            (0.0, 1.0)
        };

        let mut feature_vector = [0i64; 6];
        for c in 0..3 {
            let (cx, cy) = centre_of_mass(weighted_x[c], weighted_y[c], sums[c]);
            let ax = cos * cx - sin * cy;
            let ay = sin * cx + cos * cy;
            feature_vector[2 * c] = (ax * FEATURE_SCALE).round() as i64;
            feature_vector[2 * c + 1] = (ay * FEATURE_SCALE).round() as i64;
        }

        CircularFeatureDescriptor {
            x: x as u32,
            y: y as u32,
            total_angle,
            total_radius: (total_x * total_x + total_y * total_y).sqrt(),
            intensity: sum_all as u32,
            feature_vector,
        }
    }

    /// Region centre as floating point image coordinates.
    pub fn position(&self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }

    /// Euclidean distance between the feature vectors, in pixels.
    pub fn distance(&self, other: &CircularFeatureDescriptor) -> f32 {
        let sum: i64 = self
            .feature_vector
            .iter()
            .zip(other.feature_vector.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        (sum as f32).sqrt() / FEATURE_SCALE
    }
}

/// Offsets of every pixel within `radius` of the centre, row by row.
pub fn circle_offsets(radius: usize) -> Vec<(isize, isize)> {
    let radius = radius as isize;
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        let row_radius = (((radius * radius) - (dy * dy)) as f64).sqrt().round() as isize;
        for dx in -row_radius..=row_radius {
            offsets.push((dx, dy));
        }
    }
    offsets
}
