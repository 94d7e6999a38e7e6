use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Pixel layout of a [`Photo`]. Every format stores one `u8` per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Single luminance channel.
    Gray8,
    /// Red, green, blue.
    Rgb8,
    /// Red, green, blue, alpha.
    Rgba8,
}

impl PixelFormat {
    /// Number of bytes used by one pixel.
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A basic image: interleaved 8-bit pixel data in row-major order.
///
/// The pixel format plays the role of the image element type: the stabilizer
/// allocates its output with the same format as the first frame it sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    /// Pixel data, `width * height * format.channels()` bytes.
    pub img_data: Vec<u8>,
    /// The width (in pixels) of the image.
    pub width: usize,
    /// The height (in pixels) of the image.
    pub height: usize,
    /// Layout of each pixel in `img_data`.
    pub format: PixelFormat,
}

impl Default for Photo {
    /// An empty RGBA photo with zero width and height.
    fn default() -> Photo {
        Photo {
            img_data: Vec::new(),
            width: 0,
            height: 0,
            format: PixelFormat::Rgba8,
        }
    }
}

impl Photo {
    /// Creates a zero-filled photo.
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Photo {
        Photo {
            img_data: vec![0u8; width * height * format.channels()],
            width,
            height,
            format,
        }
    }

    /// Wraps an existing buffer, checking that its length matches the shape.
    ///
    /// # Examples
    /// ```
    /// # use pointstab::photo::{Photo, PixelFormat};
    /// let photo = Photo::from_raw(2, 1, PixelFormat::Gray8, vec![10, 20]).unwrap();
    /// assert_eq!(photo.get_channel(1, 0, 0), 20);
    /// assert!(Photo::from_raw(2, 2, PixelFormat::Gray8, vec![0; 3]).is_err());
    /// ```
    pub fn from_raw(width: usize, height: usize, format: PixelFormat, img_data: Vec<u8>) -> Result<Photo> {
        let expected = width * height * format.channels();
        if img_data.len() != expected {
            return Err(Error::InvalidImage(format!(
                "{}x{} {:?} image needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                img_data.len()
            )));
        }
        Ok(Photo {
            img_data,
            width,
            height,
            format,
        })
    }

    /// Creates a zero-filled photo with the same shape and format as `self`.
    pub fn new_like(&self) -> Photo {
        Photo::new(self.width, self.height, self.format)
    }

    /// True when `other` has the same width, height and format.
    pub fn same_shape(&self, other: &Photo) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }

    /// Number of bytes per pixel.
    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    /// Overwrites this photo with a copy of `other`, reusing the buffer when possible.
    pub fn set_to(&mut self, other: &Photo) {
        self.width = other.width;
        self.height = other.height;
        self.format = other.format;
        self.img_data.clear();
        self.img_data.extend_from_slice(&other.img_data);
    }

    /// Returns one channel of the pixel at `(x, y)`. Caller guarantees bounds.
    pub fn get_channel(&self, x: usize, y: usize, channel: usize) -> u8 {
        self.img_data[(y * self.width + x) * self.channels() + channel]
    }

    /// Returns the `(R, G, B)` components at `(x, y)`. Grey pixels are replicated
    /// into all three components.
    ///
    /// Out-of-bounds coordinates return black.
    pub fn get_rgb(&self, x: usize, y: usize) -> (u8, u8, u8) {
        if x >= self.width || y >= self.height {
            return (0, 0, 0);
        }
        let index = (y * self.width + x) * self.channels();
        match self.format {
            PixelFormat::Gray8 => {
                let v = self.img_data[index];
                (v, v, v)
            }
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => (
                self.img_data[index],
                self.img_data[index + 1],
                self.img_data[index + 2],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_of_gray_is_replicated() {
        let photo = Photo::from_raw(2, 1, PixelFormat::Gray8, vec![7, 9]).unwrap();
        assert_eq!(photo.get_rgb(1, 0), (9, 9, 9));
        assert_eq!(photo.get_rgb(2, 0), (0, 0, 0));
    }

    #[test]
    fn test_set_to_copies_shape_and_data() {
        let src = Photo::from_raw(1, 2, PixelFormat::Rgb8, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let mut dst = Photo::new(5, 5, PixelFormat::Gray8);
        dst.set_to(&src);
        assert_eq!(dst, src);
        assert!(dst.same_shape(&src));
    }

    #[test]
    fn test_from_raw_rejects_wrong_length() {
        let err = Photo::from_raw(3, 3, PixelFormat::Rgba8, vec![0; 35]).unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }
}
