//! Rendering a photo through an affine transform.

use crate::affine_transform::AffineTransform;
use crate::photo::Photo;
use crate::{Error, Result};

/// Renders an output image from an input image and a transform.
///
/// Mapping convention: with transform `m`, the output pixel at `q` is the input
/// sampled at `m⁻¹(q)`. The output is therefore drawn in the coordinate frame
/// that `m` maps *into*.
pub trait PixelWarper {
    /// Set the transform used by subsequent [`PixelWarper::apply`] calls.
    ///
    /// Fails with [`Error::SingularTransform`] when `model` cannot be inverted.
    fn set_transform(&mut self, model: &AffineTransform) -> Result<()>;

    /// Render `output` from `input`. Every output pixel is written.
    fn apply(&self, input: &Photo, output: &mut Photo);
}

/// [`PixelWarper`] using bilinear interpolation.
///
/// Samples that fall outside the input take `border_value` in every channel. At
/// integer source coordinates the sample is exact, so the identity transform
/// reproduces the input byte for byte.
#[derive(Debug, Clone)]
pub struct BilinearAffineWarper {
    /// Output → input mapping (the inverse of the transform last set).
    inverse: AffineTransform,
    /// Value written where the source position is outside the input.
    border_value: u8,
}

impl Default for BilinearAffineWarper {
    fn default() -> Self {
        Self::new(0)
    }
}

impl BilinearAffineWarper {
    pub fn new(border_value: u8) -> Self {
        BilinearAffineWarper {
            inverse: AffineTransform::identity(),
            border_value,
        }
    }

    /// The output → input mapping currently in use.
    pub fn inverse_transform(&self) -> &AffineTransform {
        &self.inverse
    }

    /// Bilinear sample of one channel at a fractional position.
    fn sample(&self, input: &Photo, x: f32, y: f32, channel: usize) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let x0 = x0 as isize;
        let y0 = y0 as isize;

        let p00 = self.pixel(input, x0, y0, channel);
        let p10 = self.pixel(input, x0 + 1, y0, channel);
        let p01 = self.pixel(input, x0, y0 + 1, channel);
        let p11 = self.pixel(input, x0 + 1, y0 + 1, channel);

        let top = p00 + fx * (p10 - p00);
        let bottom = p01 + fx * (p11 - p01);
        top + fy * (bottom - top)
    }

    fn pixel(&self, input: &Photo, x: isize, y: isize, channel: usize) -> f32 {
        if x < 0 || y < 0 || x as usize >= input.width || y as usize >= input.height {
            self.border_value as f32
        } else {
            input.get_channel(x as usize, y as usize, channel) as f32
        }
    }
}

impl PixelWarper for BilinearAffineWarper {
    fn set_transform(&mut self, model: &AffineTransform) -> Result<()> {
        self.inverse = model
            .invert()
            .ok_or_else(|| Error::SingularTransform(model.determinant()))?;
        Ok(())
    }

    fn apply(&self, input: &Photo, output: &mut Photo) {
        if !output.same_shape(input) {
            *output = input.new_like();
        }

        let channels = input.channels();
        let max_x = input.width as f32 - 1.0;
        let max_y = input.height as f32 - 1.0;

        for y in 0..output.height {
            for x in 0..output.width {
                let (sx, sy) = self.inverse.transform(x as f32, y as f32);
                let index = (y * output.width + x) * channels;

                // entirely outside the input: border only
                if !(sx > -1.0 && sy > -1.0 && sx < max_x + 1.0 && sy < max_y + 1.0) {
                    output.img_data[index..index + channels].fill(self.border_value);
                    continue;
                }

                for c in 0..channels {
                    let v = self.sample(input, sx, sy, c);
                    output.img_data[index + c] = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}
