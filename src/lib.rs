//! Color lookup tables, sprite batching and point picking for exploring
//! astronomical images laid out by an embedding.
//!
//! - [`Palette`]s and the [`Lut`] sampled from them,
//! - [`colorize`] to turn a frame of scalars into RGBA bytes,
//! - [`find_closest`] to pick the record under the pointer,
//! - [`BatchProcessor`] to colorize and draw many sources with bounded
//!   concurrency, a newer run superseding older ones,
//! - [`Session`] tying the above to a [`SourceCatalog`], a table of
//!   [`Record`]s and an external [`Reducer`].
//!
//! Image decoding, the dimensionality reduction itself and rendering
//! are left to the application through the [`SourceReader`],
//! [`Reducer`] and [`Surface`] traits.
//!
//! Built-in palettes: [`struct@VIRIDIS`], [`struct@GNBU`],
//! [`struct@PURD`], [`struct@YLGNBU`] and [`struct@GRAYSCALE`].

use std::marker::PhantomData;

mod error;
pub mod palettes;
pub mod lut;
pub mod colorize;
pub mod pick;
pub mod source;
pub mod table;
pub mod layout;
pub mod batch;
pub mod config;
pub mod session;

pub use error::{BoxError, Error, Result};
pub use palettes::{Palette, PaletteRegistry, Stop,
                   VIRIDIS, GNBU, PURD, YLGNBU, GRAYSCALE};
pub use lut::{Lut, ValueRange, DEFAULT_SAMPLES};
pub use colorize::{AlphaMode, ColorImage, Frame, colorize};
pub use pick::{Point, Positioned, Hit, find_closest, first_opaque};
pub use source::{Decoded, SourceCatalog, SourceReader, file_name_of};
pub use table::{Record, TableSchema, load_table};
pub use layout::{Bounds, MapGeometry, Progress, Reducer, compute_layout};
pub use batch::{BatchProcessor, RunReport, RunToken, Runs, Stage,
                StaleResults};
pub use config::ViewerConfig;
pub use session::{Selection, Session, SpriteStage, Surface};

/// A “continuous” range of colors parametrized by reals in \[0, 1\].
pub trait ColorRange<Color> {
    /// Returns the color corresponding to `t` ∈ \[0., 1.\].
    fn rgb(&self, t: f64) -> Color;

    /// Return an iterator yielding `n` uniformly spaced positions from
    /// `a` to `b` (both included) together with their colors.  It is
    /// not required that `a <= b`.
    ///
    /// # Example
    ///
    /// ```
    /// use fits_atlas::{ColorRange, GRAYSCALE};
    /// let ts: Vec<f64> = GRAYSCALE.range(1., 0., 5).map(|(t, _)| t).collect();
    /// assert_eq!(ts, [1., 0.75, 0.5, 0.25, 0.]);
    /// ```
    fn range(&self, a: f64, b: f64, n: usize) -> Range<'_, Self, Color>
    where Self: Sized {
        if n == 0 {
            Range { range: self, color: PhantomData, a, b, flast: 0.,
                    last: 0, i: 1, j: 0 } // Empty iterator
        } else {
            Range { range: self, color: PhantomData, a, b,
                    flast: (n - 1) as f64, last: n - 1, i: 0, j: n - 1 }
        }
    }
}

/// An iterator yielding `f64` in a given range together with colors.
///
/// Created by [`ColorRange::range`].
pub struct Range<'a, R, Color> {
    range: &'a R,
    color: PhantomData<Color>,
    a: f64,
    b: f64,
    flast: f64, // `last` as a floating-point number
    last: usize,
    i: usize, // first position to be consumed (i ≤ j)
    j: usize, // last position to be consumed
}

impl<'a, R, Color> Range<'a, R, Color> where R: ColorRange<Color> {
    /// Position `k` (assumed in `0 ..= self.last`) and its color.
    fn at(&self, k: usize) -> (f64, Color) {
        let t = if k == 0 { self.a }
                else if k == self.last { self.b }
                else {
                    let s = k as f64 / self.flast;
                    (1. - s) * self.a + s * self.b
                };
        (t, self.range.rgb(t))
    }
}

impl<'a, R, Color> Iterator for Range<'a, R, Color>
where R: ColorRange<Color> {
    type Item = (f64, Color);

    fn next(&mut self) -> Option<Self::Item> {
        if self.i <= self.j {
            let item = self.at(self.i);
            self.i += 1;
            Some(item)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = (self.j + 1).saturating_sub(self.i);
        (len, Some(len))
    }
}

impl<'a, R, Color> ExactSizeIterator for Range<'a, R, Color>
where R: ColorRange<Color> {}

impl<'a, R, Color> DoubleEndedIterator for Range<'a, R, Color>
where R: ColorRange<Color> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.i <= self.j {
            let item = self.at(self.j);
            if self.j == 0 {
                self.i = 1
            } else {
                self.j -= 1;
            }
            Some(item)
        } else {
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_and_length() {
        let r = GRAYSCALE.range(0., 1., 11);
        assert_eq!(r.len(), 11);
        for (i, (t, c)) in GRAYSCALE.range(0., 1., 11).enumerate() {
            assert!((t - 0.1 * i as f64).abs() <= 1e-15,
                    "{} ≉ {}", t, 0.1 * i as f64);
            assert_eq!(GRAYSCALE.rgb(t), c);
        }
        assert_eq!(GRAYSCALE.range(0., 1., 0).count(), 0);
        assert_eq!(GRAYSCALE.range(0.3, 1., 1).map(|(t, _)| t)
                   .collect::<Vec<_>>(), [0.3]);
    }

    #[test]
    fn range_is_double_ended() {
        let fwd: Vec<_> = VIRIDIS.range(0., 1., 7).map(|(t, _)| t).collect();
        let mut bwd: Vec<_> = VIRIDIS.range(0., 1., 7).rev()
            .map(|(t, _)| t).collect();
        bwd.reverse();
        assert_eq!(fwd, bwd);
    }
}
