//! Decoded frame types.
//!
//! A [`FrameBuffer`] is one decoded image with a fixed [`FrameShape`]
//! (height, width, channels). Frames are owned values: each pipeline stage
//! receives a frame by move and never shares it with the decoder that
//! produced it.
//!
//! A frame that failed to decode mid-stream is carried as
//! [`FrameBuffer::Corrupt`] rather than as a magic value. Writers that need a
//! plain numeric array call [`FrameBuffer::to_f32`], which materialises the
//! corrupt frame as a NaN-filled array of the correct shape; consumers detect
//! it with [`is_sentinel`].

use std::fmt::{Display, Formatter, Result as FmtResult};

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use ndarray::Array3;

use crate::error::IngestError;

/// Per-frame dimensions in `(height, width, channels)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    /// Rows of pixels.
    pub height: usize,
    /// Columns of pixels.
    pub width: usize,
    /// Samples per pixel (1 for grayscale, 3 for RGB, 4 for RGBA).
    pub channels: usize,
}

impl FrameShape {
    /// Create a shape from its three extents.
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// The shape as an `(H, W, C)` tuple, as accepted by `ndarray`.
    pub fn as_tuple(self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    /// Number of samples in one frame.
    pub fn element_count(self) -> usize {
        self.height * self.width * self.channels
    }

    /// Bytes occupied by one frame stored with `dtype`.
    pub fn byte_size(self, dtype: FrameDtype) -> u64 {
        self.element_count() as u64 * dtype.size_in_bytes() as u64
    }
}

impl Display for FrameShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// Element type of a frame's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameDtype {
    /// Unsigned 8-bit samples, as produced by every decoder in this crate.
    #[default]
    U8,
    /// 32-bit floats, the representation used once corrupt frames are
    /// materialised as NaN sentinels.
    F32,
}

impl FrameDtype {
    /// Width of one sample in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            FrameDtype::U8 => 1,
            FrameDtype::F32 => 4,
        }
    }

    /// Short lowercase name (`"uint8"`, `"float32"`).
    pub fn name(self) -> &'static str {
        match self {
            FrameDtype::U8 => "uint8",
            FrameDtype::F32 => "float32",
        }
    }
}

impl Display for FrameDtype {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// A single decoded frame, or the record of one that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBuffer {
    /// Successfully decoded samples in `(H, W, C)` layout.
    Pixels(Array3<u8>),
    /// The frame at `index` failed to decode. Only frames after the first can
    /// be corrupt; a bad first frame makes the whole source unavailable.
    Corrupt {
        /// Frame index that failed.
        index: u64,
        /// Shape the frame would have had.
        shape: FrameShape,
    },
}

impl FrameBuffer {
    /// Shape of the frame, whether or not it decoded.
    pub fn shape(&self) -> FrameShape {
        match self {
            FrameBuffer::Pixels(pixels) => {
                let (height, width, channels) = pixels.dim();
                FrameShape::new(height, width, channels)
            }
            FrameBuffer::Corrupt { shape, .. } => *shape,
        }
    }

    /// `true` when this frame stands in for a failed decode.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, FrameBuffer::Corrupt { .. })
    }

    /// Borrow the decoded samples, if any.
    pub fn pixels(&self) -> Option<&Array3<u8>> {
        match self {
            FrameBuffer::Pixels(pixels) => Some(pixels),
            FrameBuffer::Corrupt { .. } => None,
        }
    }

    /// Convert to a float array. Corrupt frames become a NaN-filled array of
    /// the same shape (the sentinel buffer).
    pub fn to_f32(&self) -> Array3<f32> {
        match self {
            FrameBuffer::Pixels(pixels) => pixels.mapv(f32::from),
            FrameBuffer::Corrupt { shape, .. } => Array3::from_elem(shape.as_tuple(), f32::NAN),
        }
    }

    /// Convert to an [`image::DynamicImage`] for previews.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::VideoDecodeError`] for corrupt frames or channel
    /// counts other than 1, 3 and 4.
    pub fn to_image(&self) -> Result<DynamicImage, IngestError> {
        let pixels = match self {
            FrameBuffer::Pixels(pixels) => pixels,
            FrameBuffer::Corrupt { index, .. } => {
                return Err(IngestError::VideoDecodeError(format!(
                    "frame {index} is corrupt and has no image"
                )));
            }
        };
        let shape = self.shape();
        let width = shape.width as u32;
        let height = shape.height as u32;
        let raw: Vec<u8> = pixels.iter().copied().collect();

        let image = match shape.channels {
            1 => GrayImage::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(width, height, raw).map(DynamicImage::ImageRgba8),
            other => {
                return Err(IngestError::VideoDecodeError(format!(
                    "cannot build an image from {other} channels"
                )));
            }
        };
        image.ok_or_else(|| {
            IngestError::VideoDecodeError(format!("pixel data does not fill a {shape} image"))
        })
    }
}

/// `true` if `array` is a corrupt-frame sentinel (every sample is NaN).
///
/// An empty array is never a sentinel.
pub fn is_sentinel(array: &Array3<f32>) -> bool {
    !array.is_empty() && array.iter().all(|sample| sample.is_nan())
}
