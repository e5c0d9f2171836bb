//! Named palettes: ordered control points from which lookup tables are
//! sampled.

use std::collections::BTreeMap;
use std::ops::Deref;
use lazy_static::lazy_static;
use tracing::debug;
use crate::{ColorRange, Error, Result};

pub(crate) mod ty;
pub use ty::{Stop, rgb_of_hex};
use ty::{Literal, RGB, lerp};

/// A piecewise-linear color ramp over \[0, 1\].
///
/// Invariant: at least two stops, thresholds strictly increasing from
/// `0.` to `1.`.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    name: String,
    stops: Vec<Stop>,
}

impl Palette {
    /// Create a palette, checking the threshold invariants.
    ///
    /// # Example
    ///
    /// ```
    /// use fits_atlas::{Palette, Stop};
    /// let red_blue = Palette::new("red-blue", vec![Stop::hex(0., 0xff0000),
    ///                                              Stop::hex(1., 0x0000ff)]);
    /// assert!(red_blue.is_ok());
    /// assert!(Palette::new("short", vec![Stop::hex(0., 0)]).is_err());
    /// ```
    pub fn new(name: impl Into<String>, stops: Vec<Stop>) -> Result<Self> {
        let name = name.into();
        if stops.len() < 2 {
            return Err(Error::InvalidPalette(
                format!("{name}: {} stop(s), at least 2 required", stops.len())))
        }
        let first = stops[0].t;
        let last = stops[stops.len() - 1].t;
        if first != 0. || last != 1. {
            return Err(Error::InvalidPalette(
                format!("{name}: thresholds must run from 0 to 1, \
                         got {first} to {last}")))
        }
        if let Some(w) = stops.windows(2).find(|w| !(w[0].t < w[1].t)) {
            return Err(Error::InvalidPalette(
                format!("{name}: threshold {} does not follow {}",
                        w[1].t, w[0].t)))
        }
        Ok(Palette { name, stops })
    }

    fn from_literal(name: &str, literal: Literal) -> Self {
        let stops = literal.iter().map(|&(t, hex)| Stop::hex(t, hex)).collect();
        Palette { name: name.to_string(), stops }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn stops(&self) -> &[Stop] { &self.stops }

    /// Number of control points (at least 2).
    pub fn len(&self) -> usize { self.stops.len() }

    pub fn first(&self) -> RGB<f64> { self.stops[0].color }

    pub fn last(&self) -> RGB<f64> { self.stops[self.stops.len() - 1].color }

    /// Built-in palette by name; unknown names fall back to
    /// [`struct@GRAYSCALE`].
    pub fn by_name(name: &str) -> &'static Palette {
        builtin(name).unwrap_or_else(|| {
            debug!(palette = name, "unknown palette, using grayscale");
            GRAYSCALE.deref()
        })
    }
}

impl ColorRange<RGB<f64>> for Palette {
    /// Color at `t`.  Within a segment `(t_j, t_{j+1}]` the color is
    /// interpolated linearly; `t` at or below the first threshold gives
    /// the first color and above the last one the last color.
    fn rgb(&self, t: f64) -> RGB<f64> {
        if !(t > self.stops[0].t) { return self.first() }
        for w in self.stops.windows(2) {
            let (s0, s1) = (w[0], w[1]);
            if t <= s1.t {
                return lerp(s0.color, s1.color, (t - s0.t) / (s1.t - s0.t))
            }
        }
        self.last()
    }
}

lazy_static! {
    /// Matplotlib viridis, five stops.
    pub static ref VIRIDIS: Palette = Palette::from_literal("viridis", &[
        (0.0, 0x440154), (0.25, 0x414487), (0.5, 0x2a788e),
        (0.75, 0x22a884), (1.0, 0x7ad151)]);

    /// Brewer "light green to dark blue".
    pub static ref GNBU: Palette = Palette::from_literal("GnBu", &[
        (0.0, 0xf0f9e8), (0.25, 0xbae4bc), (0.5, 0x7bccc4),
        (0.75, 0x43a2ca), (1.0, 0x0868ac)]);

    /// Brewer "light purple to dark red".
    pub static ref PURD: Palette = Palette::from_literal("PuRd", &[
        (0.0, 0xf1eef6), (0.25, 0xd7b5d8), (0.5, 0xdf65b0),
        (0.75, 0xdd1c77), (1.0, 0x980043)]);

    /// Brewer "light yellow to green to dark blue".
    pub static ref YLGNBU: Palette = Palette::from_literal("YlGnBu", &[
        (0.0, 0xffffcc), (0.25, 0xa1dab4), (0.5, 0x41b6c4),
        (0.75, 0x2c7fb8), (1.0, 0x253494)]);

    /// Black to white.
    pub static ref GRAYSCALE: Palette = Palette::from_literal("grayscale", &[
        (0.0, 0x000000), (1.0, 0xffffff)]);

    pub(crate) static ref ALL_BUILTIN: [&'static Palette; 5] = [
        VIRIDIS.deref(), GNBU.deref(), PURD.deref(), YLGNBU.deref(),
        GRAYSCALE.deref()];
}

/// Built-in palette called `name`, if any.
pub fn builtin(name: &str) -> Option<&'static Palette> {
    ALL_BUILTIN.iter().copied().find(|p| p.name == name)
}

/// Built-in palettes plus the ones added by the application.
///
/// User palettes shadow built-in ones of the same name.
#[derive(Clone, Debug, Default)]
pub struct PaletteRegistry {
    custom: BTreeMap<String, Palette>,
}

impl PaletteRegistry {
    pub fn new() -> Self { Self::default() }

    /// Add (or replace) a palette under its own name.
    pub fn insert(&mut self, palette: Palette) -> Option<Palette> {
        self.custom.insert(palette.name.clone(), palette)
    }

    /// Parse `(threshold, 0xRRGGBB)` pairs and add them under `name`.
    pub fn add(&mut self, name: &str, stops: &[(f64, u32)]) -> Result<()> {
        let stops = stops.iter().map(|&(t, hex)| Stop::hex(t, hex)).collect();
        self.insert(Palette::new(name, stops)?);
        Ok(())
    }

    /// Palette called `name`, falling back to grayscale.
    pub fn get(&self, name: &str) -> &Palette {
        match self.custom.get(name) {
            Some(p) => p,
            None => Palette::by_name(name),
        }
    }

    /// All known names, user palettes last.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        ALL_BUILTIN.iter().map(|p| p.name())
            .filter(|n| !self.custom.contains_key(*n))
            .chain(self.custom.keys().map(|n| n.as_str()))
    }
}
