//! Lookup tables mapping data values to colors.

use rgb::{RGB, RGBA8};
use crate::{ColorImage, ColorRange, Error, Palette, Result};
use crate::colorize::to_byte;

/// Number of intervals of a [`Lut`] when none is specified.
pub const DEFAULT_SAMPLES: usize = 32;

/// The data values mapped onto a color ramp.
///
/// `min <= max` is expected but not enforced.  When `min == max` the
/// range is *degenerate*: [`ValueRange::try_normalize`] reports it and
/// [`ValueRange::normalize`] maps every value to `0.`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ValueRange {
    fn default() -> Self { ValueRange { min: 0., max: 1. } }
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self { ValueRange { min, max } }

    /// Extrema of `values` in a single pass, ignoring NaN.  Returns
    /// `None` if there is no comparable value.
    ///
    /// # Example
    ///
    /// ```
    /// use fits_atlas::ValueRange;
    /// let r = ValueRange::of_values([3., f64::NAN, -1., 2.]).unwrap();
    /// assert_eq!((r.min, r.max), (-1., 3.));
    /// ```
    pub fn of_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut it = values.into_iter().filter(|v| !v.is_nan());
        let v0 = it.next()?;
        let (min, max) = it.fold((v0, v0), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some(ValueRange { min, max })
    }

    pub fn is_degenerate(&self) -> bool { self.min == self.max }

    /// Clamp `v` to the range and map it to \[0, 1\].  A NaN `v` is
    /// mapped to `0.`.
    pub fn try_normalize(&self, v: f64) -> Result<f64> {
        if self.is_degenerate() {
            return Err(Error::DegenerateRange { min: self.min, max: self.max })
        }
        // Not `f64::clamp`: it panics when `min > max`.
        let v = v.max(self.min).min(self.max);
        let alpha = (v - self.min) / (self.max - self.min);
        Ok(if alpha.is_finite() { alpha.max(0.).min(1.) } else { 0. })
    }

    /// Like [`ValueRange::try_normalize`] with the degenerate range
    /// mapped to `0.`.  Never returns NaN.
    pub fn normalize(&self, v: f64) -> f64 {
        self.try_normalize(v).unwrap_or(0.)
    }
}


/// A resolved table of `n + 1` colors sampled from a [`Palette`],
/// together with the [`ValueRange`] it represents.
#[derive(Clone, Debug)]
pub struct Lut {
    name: String,
    table: Vec<RGB<f64>>, // Invariant: length n + 1 ≥ 2
    n: usize,
    range: ValueRange,
}

impl Lut {
    /// Sample `palette` at `0, 1/n, ..., 1`.  The end points take the
    /// first and last colors of the palette verbatim.
    ///
    /// # Example
    ///
    /// ```
    /// use fits_atlas::{Lut, VIRIDIS};
    /// let mut lut = Lut::build(&VIRIDIS, 4)?;
    /// lut.set_range(10., 20.);
    /// assert_eq!(lut.table().len(), 5);
    /// assert_eq!(lut.color_at(10.), VIRIDIS.first());
    /// assert_eq!(lut.color_at(25.), VIRIDIS.last());
    /// # Ok::<(), fits_atlas::Error>(())
    /// ```
    pub fn build(palette: &Palette, n: usize) -> Result<Lut> {
        if n == 0 { return Err(Error::InvalidSampleCount) }
        let step = 1. / n as f64;
        let mut table = Vec::with_capacity(n + 1);
        table.push(palette.first());
        table.extend((1 .. n).map(|i| palette.rgb(i as f64 * step)));
        table.push(palette.last());
        Ok(Lut { name: palette.name().to_string(), table, n,
                 range: ValueRange::default() })
    }

    /// [`Lut::build`] with [`DEFAULT_SAMPLES`] intervals.
    pub fn new(palette: &Palette) -> Result<Lut> {
        Self::build(palette, DEFAULT_SAMPLES)
    }

    pub fn with_range(mut self, range: ValueRange) -> Self {
        self.range = range;
        self
    }

    /// Name of the palette the table was sampled from.
    pub fn name(&self) -> &str { &self.name }

    /// Number of intervals `n`; the table holds `n + 1` colors.
    pub fn samples(&self) -> usize { self.n }

    pub fn table(&self) -> &[RGB<f64>] { &self.table }

    pub fn range(&self) -> ValueRange { self.range }

    pub fn set_range(&mut self, min: f64, max: f64) {
        self.range = ValueRange { min, max };
    }

    pub fn set_min(&mut self, min: f64) { self.range.min = min }

    pub fn set_max(&mut self, max: f64) { self.range.max = max }

    /// Table index selected for `value`: `round(alpha * n)` where
    /// `alpha` is the normalized, clamped value.  A degenerate range
    /// selects index 0.
    pub fn index_of(&self, value: f64) -> usize {
        let alpha = self.range.normalize(value);
        ((alpha * self.n as f64).round() as usize).min(self.n)
    }

    /// Color of `value`, clamped to the range.
    pub fn color_at(&self, value: f64) -> RGB<f64> {
        self.table[self.index_of(value)]
    }

    /// [`Lut::color_at`] as bytes with the given alpha.
    pub fn rgba8_at(&self, value: f64, alpha: u8) -> RGBA8 {
        let c = self.color_at(value);
        RGBA8 { r: to_byte(c.r), g: to_byte(c.g), b: to_byte(c.b), a: alpha }
    }

    /// A 1 pixel wide legend of `height` rows, the top row showing the
    /// maximum of the range.
    pub fn color_bar(&self, height: usize) -> ColorImage {
        let pixels = ColorRange::range(self, 1., 0., height)
            .map(|(_, c)| RGBA8 { r: to_byte(c.r), g: to_byte(c.g),
                                  b: to_byte(c.b), a: 255 })
            .collect();
        ColorImage::from_pixels(1, height, pixels)
    }
}

impl ColorRange<RGB<f64>> for Lut {
    /// Table entry nearest to the normalized position `t`.
    fn rgb(&self, t: f64) -> RGB<f64> {
        let t = t.max(0.).min(1.);
        self.table[((t * self.n as f64).round() as usize).min(self.n)]
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::palettes::{rgb_of_hex, GRAYSCALE, VIRIDIS};

    fn assert_rgb_eq(c0: RGB<f64>, c1: RGB<f64>) {
        assert_relative_eq!(c0.r, c1.r, epsilon = 1e-12);
        assert_relative_eq!(c0.g, c1.g, epsilon = 1e-12);
        assert_relative_eq!(c0.b, c1.b, epsilon = 1e-12);
    }

    fn viridis(min: f64, max: f64) -> Lut {
        Lut::new(&VIRIDIS).unwrap().with_range(ValueRange::new(min, max))
    }

    #[test]
    fn table_samples_palette() {
        let lut = Lut::new(&VIRIDIS).unwrap();
        assert_eq!(lut.samples(), 32);
        assert_eq!(lut.table().len(), 33);
        // alpha = 8/32 = 0.25 lands exactly on the second stop.
        assert_rgb_eq(lut.table()[8], rgb_of_hex(0x414487));
        assert_rgb_eq(lut.table()[16], rgb_of_hex(0x2a788e));
        let gray = Lut::build(&GRAYSCALE, 4).unwrap();
        let r: Vec<f64> = gray.table().iter().map(|c| c.r).collect();
        for (x, y) in r.iter().zip([0., 0.25, 0.5, 0.75, 1.]) {
            assert_relative_eq!(*x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn zero_samples_is_an_error() {
        assert!(matches!(Lut::build(&VIRIDIS, 0),
                         Err(Error::InvalidSampleCount)));
    }

    #[test]
    fn range_ends_select_table_ends() {
        let lut = viridis(-5., 5.);
        assert_eq!(lut.color_at(-5.), lut.table()[0]);
        assert_eq!(lut.color_at(5.), lut.table()[32]);
        assert_eq!(lut.index_of(0.), 16);
    }

    #[test]
    fn out_of_range_is_clamped() {
        let lut = viridis(2., 3.);
        assert_eq!(lut.color_at(2. - 100.), lut.color_at(2.));
        assert_eq!(lut.color_at(3. + 100.), lut.color_at(3.));
    }

    #[test]
    fn index_is_monotonic() {
        let lut = viridis(-1., 7.);
        let mut prev = 0;
        for k in 0 ..= 1000 {
            let v = -1. + 8. * k as f64 / 1000.;
            let i = lut.index_of(v);
            assert!(i >= prev, "index({v}) = {i} < {prev}");
            assert!(lut.table().contains(&lut.color_at(v)));
            prev = i;
        }
        assert_eq!(prev, 32);
    }

    #[test]
    fn degenerate_range_uses_first_entry() {
        let lut = viridis(4., 4.);
        for v in [3., 4., 5., f64::NAN, f64::INFINITY] {
            assert_eq!(lut.index_of(v), 0);
        }
        assert!(matches!(lut.range().try_normalize(4.),
                         Err(Error::DegenerateRange { .. })));
        assert_eq!(lut.range().normalize(4.), 0.);
    }

    #[test]
    fn nan_value_never_escapes() {
        let lut = viridis(0., 1.);
        assert_eq!(lut.index_of(f64::NAN), 0);
        let r = ValueRange::new(f64::NEG_INFINITY, f64::INFINITY);
        assert_eq!(r.normalize(1.), 0.);
    }

    #[test]
    fn reversed_range_does_not_panic() {
        let mut lut = viridis(0., 1.);
        lut.set_min(3.);
        lut.set_max(1.);
        let i = lut.index_of(2.);
        assert!(i <= 32);
    }

    #[test]
    fn color_bar_runs_top_down() {
        let lut = viridis(0., 1.);
        let bar = lut.color_bar(33);
        assert_eq!((bar.width(), bar.height()), (1, 33));
        assert_eq!(bar.pixel(0, 0), lut.rgba8_at(1., 255));
        assert_eq!(bar.pixel(0, 32), lut.rgba8_at(0., 255));
    }

    #[test]
    fn extrema_ignore_nan() {
        assert_eq!(ValueRange::of_values([f64::NAN]), None);
        assert_eq!(ValueRange::of_values(std::iter::empty()), None);
        assert_eq!(ValueRange::of_values([2.]), Some(ValueRange::new(2., 2.)));
    }
}
