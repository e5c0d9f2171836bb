pub(crate) use rgb::RGB;

/// A control point of a [`Palette`](crate::Palette): the color reached
/// at the position `t` ∈ \[0, 1\] of the ramp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stop {
    pub t: f64,
    /// Channels in \[0, 1\].
    pub color: RGB<f64>,
}

impl Stop {
    /// Stop from a packed `0xRRGGBB` color.
    pub fn hex(t: f64, rgb: u32) -> Self {
        Stop { t, color: rgb_of_hex(rgb) }
    }
}

/// Unpack `0xRRGGBB` into channels in \[0, 1\].
pub fn rgb_of_hex(hex: u32) -> RGB<f64> {
    RGB { r: ((hex >> 16) & 255) as f64 / 255.,
          g: ((hex >> 8) & 255) as f64 / 255.,
          b: (hex & 255) as f64 / 255. }
}

/// Linear interpolation between `c0` (at `alpha == 0.`) and `c1`.
#[inline]
pub(crate) fn lerp(c0: RGB<f64>, c1: RGB<f64>, alpha: f64) -> RGB<f64> {
    RGB { r: c0.r + (c1.r - c0.r) * alpha,
          g: c0.g + (c1.g - c0.g) * alpha,
          b: c0.b + (c1.b - c0.b) * alpha }
}

/// Palette literal: `(threshold, 0xRRGGBB)` pairs.
pub(crate) type Literal = &'static [(f64, u32)];
