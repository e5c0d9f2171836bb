//! 2D layout of the records, and where they land on a map canvas.

use std::future::Future;
use std::ops::ControlFlow;
use tracing::info;
use crate::{BoxError, Error, Point, Record, Result};

/// Progress callback of a [`Reducer`]: called with the number of the
/// optimization step just finished; `Break` asks the reducer to stop
/// early and return its current layout.
pub type Progress<'a> = dyn FnMut(usize) -> ControlFlow<()> + Send + 'a;

/// A dimensionality reduction engine (UMAP or similar).
pub trait Reducer: Sync {
    /// Number of optimization steps [`Reducer::fit`] will run on `n`
    /// vectors, for progress reporting.
    fn steps(&self, n: usize) -> usize;

    /// One 2D position per vector, deterministic for a given `seed`.
    fn fit(&self, vectors: &[Vec<f64>], seed: u64, progress: &mut Progress<'_>)
           -> impl Future<Output = Result<Vec<[f64; 2]>, BoxError>> + Send;
}

/// Lay out `records` with `reducer` and store the position of each.
///
/// All embeddings must have the same length.  Nothing is done for an
/// empty slice.
pub async fn compute_layout<R: Reducer>(records: &mut [Record], reducer: &R,
                                        seed: u64, progress: &mut Progress<'_>)
                                        -> Result<()> {
    let Some(first) = records.first() else { return Ok(()) };
    let dims = first.embedding.len();
    if let Some((index, r)) = records.iter().enumerate()
        .find(|(_, r)| r.embedding.len() != dims) {
        return Err(Error::RaggedEmbedding { index, expected: dims,
                                            found: r.embedding.len() })
    }
    let vectors: Vec<Vec<f64>> = records.iter()
        .map(|r| r.embedding.clone()).collect();
    info!(records = records.len(), dims, steps = reducer.steps(records.len()),
          "computing layout");
    let layout = reducer.fit(&vectors, seed, progress).await
        .map_err(Error::Reduce)?;
    if layout.len() != records.len() {
        return Err(Error::LayoutMismatch { expected: records.len(),
                                           found: layout.len() })
    }
    for (r, p) in records.iter_mut().zip(layout) {
        r.position = Some(Point::from(p));
    }
    Ok(())
}

/// Axis-aligned bounding box of a set of points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Bounds {
    /// Bounds of `points`, NaN coordinates ignored; `None` when there is
    /// no point.
    pub fn of(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut points = points.into_iter()
            .filter(|p| !p.x.is_nan() && !p.y.is_nan());
        let p0 = points.next()?;
        let b = Bounds { xmin: p0.x, xmax: p0.x, ymin: p0.y, ymax: p0.y };
        Some(points.fold(b, |b, p| Bounds {
            xmin: b.xmin.min(p.x), xmax: b.xmax.max(p.x),
            ymin: b.ymin.min(p.y), ymax: b.ymax.max(p.y) }))
    }

    /// Bounds of the positioned records.
    pub fn of_records(records: &[Record]) -> Option<Self> {
        Self::of(records.iter().filter_map(|r| r.position))
    }

    pub fn width(&self) -> f64 { self.xmax - self.xmin }

    pub fn height(&self) -> f64 { self.ymax - self.ymin }
}

/// Maps layout coordinates to pixels of a canvas covering `bounds`, `y`
/// pointing down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapGeometry {
    pub bounds: Bounds,
    /// Pixels per layout unit.
    pub scale: f64,
}

impl MapGeometry {
    pub fn new(bounds: Bounds, scale: f64) -> Self { MapGeometry { bounds, scale } }

    /// Canvas width and height in pixels.
    pub fn canvas_size(&self) -> (f64, f64) {
        (self.bounds.width() * self.scale, self.bounds.height() * self.scale)
    }

    /// Pixel position of `p`; the top of the canvas is `ymax`.
    ///
    /// ```
    /// use fits_atlas::{Bounds, MapGeometry, Point};
    /// let b = Bounds { xmin: -1., xmax: 1., ymin: 0., ymax: 2. };
    /// let g = MapGeometry::new(b, 100.);
    /// assert_eq!(g.canvas_size(), (200., 200.));
    /// assert_eq!(g.place(Point::new(-1., 2.)), (0., 0.));
    /// assert_eq!(g.place(Point::new(0., 0.)), (100., 200.));
    /// ```
    pub fn place(&self, p: Point) -> (f64, f64) {
        let (_, height) = self.canvas_size();
        ((p.x - self.bounds.xmin) * self.scale,
         height - (p.y - self.bounds.ymin) * self.scale)
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Keeps the first two coordinates; one step per vector.
    pub(crate) struct Project;

    impl Reducer for Project {
        fn steps(&self, n: usize) -> usize { n }

        async fn fit(&self, vectors: &[Vec<f64>], _seed: u64,
                     progress: &mut Progress<'_>)
                     -> Result<Vec<[f64; 2]>, BoxError> {
            let mut out = Vec::new();
            for (i, v) in vectors.iter().enumerate() {
                if v.len() < 2 { return Err("need two dimensions".into()) }
                out.push([v[0], v[1]]);
                if progress(i).is_break() { break }
            }
            Ok(out)
        }
    }

    fn records(embeddings: &[&[f64]]) -> Vec<Record> {
        embeddings.iter().map(|e| Record { embedding: e.to_vec(),
                                           ..Record::default() }).collect()
    }

    #[tokio::test]
    async fn positions_are_stored() {
        let mut rs = records(&[&[1., 2., 9.], &[3., 4., 9.]]);
        let mut steps = Vec::new();
        compute_layout(&mut rs, &Project, 42, &mut |i| {
            steps.push(i);
            ControlFlow::Continue(())
        }).await.unwrap();
        assert_eq!(steps, [0, 1]);
        assert_eq!(rs[1].position, Some(Point::new(3., 4.)));
    }

    #[tokio::test]
    async fn early_stop_is_a_mismatch_here() {
        let mut rs = records(&[&[1., 2.], &[3., 4.]]);
        let err = compute_layout(&mut rs, &Project, 0,
                                 &mut |_| ControlFlow::Break(())).await;
        assert!(matches!(err, Err(Error::LayoutMismatch { expected: 2,
                                                          found: 1 })));
        assert!(rs.iter().all(|r| r.position.is_none()));
    }

    #[tokio::test]
    async fn ragged_and_failing_inputs() {
        let mut rs = records(&[&[1., 2.], &[3.]]);
        let err = compute_layout(&mut rs, &Project, 0,
                                 &mut |_| ControlFlow::Continue(())).await;
        assert!(matches!(err, Err(Error::RaggedEmbedding { index: 1, .. })));
        let mut rs = records(&[&[1.]]);
        let err = compute_layout(&mut rs, &Project, 0,
                                 &mut |_| ControlFlow::Continue(())).await;
        assert!(matches!(err, Err(Error::Reduce(_))));
        compute_layout(&mut [], &Project, 0,
                       &mut |_| ControlFlow::Continue(())).await.unwrap();
    }

    #[test]
    fn bounds_skip_unplaced() {
        let mut rs = records(&[&[], &[], &[]]);
        rs[0].position = Some(Point::new(-2., 5.));
        rs[2].position = Some(Point::new(4., 1.));
        let b = Bounds::of_records(&rs).unwrap();
        assert_eq!(b, Bounds { xmin: -2., xmax: 4., ymin: 1., ymax: 5. });
        assert_eq!((b.width(), b.height()), (6., 4.));
        assert_eq!(Bounds::of_records(&rs[1..2]), None);
    }
}
