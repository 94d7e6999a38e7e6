use crate::circular_feature_descriptor::{circle_offsets, CircularFeatureDescriptor};
use crate::photo::Photo;

/// A grid that computes and stores `CircularFeatureDescriptor` values for every
/// `stride`-th pixel of an image, row-major.
pub struct CircularFeatureGrid {
    /// Number of sample positions per row.
    columns: usize,
    /// Number of sample rows.
    rows: usize,
    /// The radius of the circular neighbourhood used to compute features.
    circle_radius: usize,
    /// One descriptor per sample position.
    feature_descriptors: Vec<CircularFeatureDescriptor>,
}

impl CircularFeatureGrid {
    /// Creates a new `CircularFeatureGrid` over `photo`.
    ///
    /// - `circle_radius` sets how large each neighbourhood is.
    /// - `stride` is the spacing of sample positions (at least 1).
    /// - `rotation_invariant` aligns each descriptor to its own dominant direction.
    pub fn new(photo: &Photo, circle_radius: usize, stride: usize, rotation_invariant: bool) -> Self {
        let stride = stride.max(1);
        let columns = photo.width.div_ceil(stride);
        let rows = photo.height.div_ceil(stride);
        let offsets = circle_offsets(circle_radius);

        let mut feature_descriptors = Vec::with_capacity(columns * rows);
        for row in 0..rows {
            for column in 0..columns {
                feature_descriptors.push(CircularFeatureDescriptor::compute(
                    photo,
                    column * stride,
                    row * stride,
                    &offsets,
                    rotation_invariant,
                ));
            }
        }

        CircularFeatureGrid {
            columns,
            rows,
            circle_radius,
            feature_descriptors,
        }
    }

    /// Returns all descriptors, row-major.
    pub fn descriptors(&self) -> &[CircularFeatureDescriptor] {
        &self.feature_descriptors
    }

    /// The strongest descriptor in each `cell_size` × `cell_size` block of the
    /// image, skipping positions whose neighbourhood crosses the image border and
    /// descriptors weaker than `min_strength`.
    pub fn strongest_per_cell(
        &self,
        width: usize,
        height: usize,
        cell_size: usize,
        min_strength: f32,
    ) -> Vec<CircularFeatureDescriptor> {
        let cell_size = cell_size.max(1);
        let cells_x = width.div_ceil(cell_size);
        let cells_y = height.div_ceil(cell_size);
        let mut best: Vec<Option<CircularFeatureDescriptor>> = vec![None; cells_x * cells_y];

        let r = self.circle_radius;
        for row in 0..self.rows {
            for column in 0..self.columns {
                let descriptor = &self.feature_descriptors[row * self.columns + column];
                let (x, y) = (descriptor.x as usize, descriptor.y as usize);
                if x < r || y < r || x + r >= width || y + r >= height {
                    continue;
                }
                if descriptor.total_radius < min_strength {
                    continue;
                }
                let cell = &mut best[(y / cell_size) * cells_x + x / cell_size];
                match cell {
                    Some(current) if current.total_radius >= descriptor.total_radius => {}
                    _ => *cell = Some(*descriptor),
                }
            }
        }

        best.into_iter().flatten().collect()
    }
}
