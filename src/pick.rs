//! Picking the record under the pointer.

use crate::ColorImage;

/// A position in layout coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self { Point { x, y } }

    pub fn distance_sq(&self, p: Point) -> f64 {
        let dx = self.x - p.x;
        let dy = self.y - p.y;
        dx * dx + dy * dy
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self { Point { x, y } }
}

/// Anything with a position in layout coordinates.
pub trait Positioned {
    fn position(&self) -> Point;
}

impl Positioned for Point {
    fn position(&self) -> Point { *self }
}

impl Positioned for [f64; 2] {
    fn position(&self) -> Point { Point::from(*self) }
}

/// Index of the position closest to `query`, provided its squared
/// distance is `< max_dist_sq`.  The first of equally close positions
/// wins, so the result depends on the order of `positions`.
pub fn closest_index(query: Point, positions: impl IntoIterator<Item = Point>,
                     max_dist_sq: f64) -> Option<usize> {
    let mut best = None;
    let mut best_d = max_dist_sq;
    for (i, p) in positions.into_iter().enumerate() {
        let d = p.distance_sq(query);
        if d < best_d {
            best = Some(i);
            best_d = d;
        }
    }
    best
}

/// The candidate closest to `query`, if it lies strictly within
/// `max_dist_sq` (squared distance).  Ties go to the earliest
/// candidate.
///
/// # Example
///
/// ```
/// use fits_atlas::{find_closest, Point};
/// let pts = [Point::new(1., 1.), Point::new(5., 5.)];
/// assert_eq!(find_closest(Point::new(0., 0.), &pts, 10.), Some(&pts[0]));
/// assert_eq!(find_closest(Point::new(0., 0.), &pts, 1.), None);
/// ```
pub fn find_closest<P: Positioned>(query: Point, candidates: &[P],
                                   max_dist_sq: f64) -> Option<&P> {
    closest_index(query, candidates.iter().map(Positioned::position),
                  max_dist_sq)
        .map(|i| &candidates[i])
}

/// A renderer hit: the picked item, where the ray met its texture (`uv`
/// in \[0, 1\]², `v` pointing up) and the texture itself, if any.
#[derive(Clone, Copy, Debug)]
pub struct Hit<'a, T> {
    pub item: T,
    pub uv: (f64, f64),
    pub texture: Option<&'a ColorImage>,
}

impl<'a, T> Hit<'a, T> {
    /// Whether the texel under `uv` is fully transparent.  Hits without
    /// texture are opaque; empty textures are transparent.
    pub fn is_transparent(&self) -> bool {
        let Some(img) = self.texture else { return false };
        let (w, h) = (img.width(), img.height());
        if w == 0 || h == 0 { return true }
        let (u, v) = self.uv;
        let x = ((u * w as f64).round().max(0.) as usize).min(w - 1);
        // Texture rows run top-down, `v` bottom-up.
        let y = h.saturating_sub((v * h as f64).round().max(0.) as usize)
            .min(h - 1);
        img.pixel(x, y).a == 0
    }
}

/// The first hit, in renderer order, that is not on a transparent texel.
pub fn first_opaque<'h, 'a, T>(hits: &'h [Hit<'a, T>]) -> Option<&'h Hit<'a, T>> {
    hits.iter().find(|h| !h.is_transparent())
}
