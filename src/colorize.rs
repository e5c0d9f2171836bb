//! Turning frames of scalars into RGBA images.
//!
//! The byte layout of a [`ColorImage`] is the one rendering surfaces
//! consume: `width * height * 4` bytes, row-major starting with the
//! top-left sample, R, G, B, A interleaved.

use rgb::{ComponentBytes, RGBA8};
use crate::{Error, Lut, Result};

/// How the alpha channel of [`colorize`] is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlphaMode {
    /// Every pixel has alpha 255.
    #[default]
    Opaque,
    /// Alpha grows linearly from 0 at the minimum of the LUT range to
    /// 255 at its maximum, so faint background fades out when sprites
    /// overlap.  A degenerate range gives alpha 0.
    Transparent,
}

/// A row-major frame of scalar samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl Frame {
    /// Fails with [`Error::ShapeMismatch`] unless
    /// `values.len() == width * height`.
    pub fn new(width: usize, height: usize, values: Vec<f64>) -> Result<Self> {
        check_shape(width, height, values.len())?;
        Ok(Frame { width, height, values })
    }

    pub fn width(&self) -> usize { self.width }

    pub fn height(&self) -> usize { self.height }

    pub fn values(&self) -> &[f64] { &self.values }
}

fn check_shape(width: usize, height: usize, len: usize) -> Result<()> {
    if width.checked_mul(height) != Some(len) {
        return Err(Error::ShapeMismatch { width, height, len })
    }
    Ok(())
}

/// An RGBA image ready to be handed to a rendering surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorImage {
    width: usize,
    height: usize,
    pixels: Vec<RGBA8>, // Invariant: length width * height
}

impl ColorImage {
    pub fn new(width: usize, height: usize, pixels: Vec<RGBA8>) -> Result<Self> {
        check_shape(width, height, pixels.len())?;
        Ok(ColorImage { width, height, pixels })
    }

    pub(crate) fn from_pixels(width: usize, height: usize,
                              pixels: Vec<RGBA8>) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        ColorImage { width, height, pixels }
    }

    pub fn width(&self) -> usize { self.width }

    pub fn height(&self) -> usize { self.height }

    pub fn pixels(&self) -> &[RGBA8] { &self.pixels }

    /// Pixel in column `x` of row `y` (row 0 at the top).
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the image.
    pub fn pixel(&self, x: usize, y: usize) -> RGBA8 {
        assert!(x < self.width && y < self.height,
                "pixel ({x}, {y}) outside {}x{}", self.width, self.height);
        self.pixels[y * self.width + x]
    }

    /// The wire format: RGBA interleaved, row-major.
    pub fn as_bytes(&self) -> &[u8] { self.pixels.as_bytes() }
}

/// Convert a channel in \[0, 1\] to a byte, rounding and saturating.
#[inline]
pub fn to_byte(x: f64) -> u8 {
    (x * 255.).round().max(0.).min(255.) as u8
}

/// Color `values` (a `width` × `height` row-major frame) with `lut`.
///
/// The range of `lut` is used both for the colors and, in
/// [`AlphaMode::Transparent`], for the alpha ramp; callers set it to the
/// extrema of the whole frame.
///
/// # Example
///
/// ```
/// use fits_atlas::{colorize, AlphaMode, Lut, ValueRange, GRAYSCALE};
/// let lut = Lut::new(&GRAYSCALE)?.with_range(ValueRange::new(0., 1.));
/// let img = colorize(&[0., 1.], 2, 1, &lut, AlphaMode::Opaque)?;
/// assert_eq!(img.as_bytes(), [0, 0, 0, 255, 255, 255, 255, 255]);
/// # Ok::<(), fits_atlas::Error>(())
/// ```
pub fn colorize(values: &[f64], width: usize, height: usize, lut: &Lut,
                mode: AlphaMode) -> Result<ColorImage> {
    check_shape(width, height, values.len())?;
    Ok(colorize_unchecked(values, width, height, lut, mode))
}

fn colorize_unchecked(values: &[f64], width: usize, height: usize,
                      lut: &Lut, mode: AlphaMode) -> ColorImage {
    let range = lut.range();
    let pixels = values.iter().map(|&v| {
        let a = match mode {
            AlphaMode::Opaque => 255,
            AlphaMode::Transparent => to_byte(range.normalize(v)),
        };
        lut.rgba8_at(v, a)
    }).collect();
    ColorImage::from_pixels(width, height, pixels)
}

impl Frame {
    /// [`colorize`] this frame.
    pub fn colorize(&self, lut: &Lut, mode: AlphaMode) -> ColorImage {
        colorize_unchecked(&self.values, self.width, self.height, lut, mode)
    }
}
