//! A viewing session: the image sources, the table of records, the
//! settings and the runs drawing the map.

use std::sync::Arc;
use tracing::{info, warn};
use crate::{AlphaMode, BatchProcessor, Bounds, ColorImage, Error, Lut,
            MapGeometry, Palette, PaletteRegistry, Point, Positioned, Record,
            Reducer, Result, RunReport, Runs, SourceCatalog, SourceReader,
            Stage, ViewerConfig, load_table};
use crate::layout::{self, Progress};
use crate::pick::closest_index;

/// Where map sprites are drawn.  Shared by concurrent runs, so
/// implementations synchronize internally.
pub trait Surface: Send + Sync {
    /// Draw the sprite of `record`, `size` pixels wide, centered on the
    /// canvas pixel `at`.
    fn draw(&self, record: &Record, at: (f64, f64), size: f64,
            image: &ColorImage);
}

/// Draws one record of the map: decodes its source, colors it with
/// transparency and puts it on the surface.
pub struct SpriteStage<R: SourceReader> {
    catalog: Arc<SourceCatalog<R>>,
    records: Arc<Vec<Record>>,
    lut: Lut,
    geometry: MapGeometry,
    sprite_scale: f64,
    surface: Arc<dyn Surface>,
}

impl<R: SourceReader> Stage for SpriteStage<R> {
    /// Index of the record.
    type Item = usize;
    /// File name of the source.
    type Source = String;
    type Output = ColorImage;

    fn resolve(&self, &i: &usize) -> Result<String> {
        let r = self.records.get(i)
            .ok_or_else(|| Error::MissingSource(format!("record {i}")))?;
        if r.position.is_none() { return Err(Error::NoLayout) }
        let name = r.file_name().ok_or_else(
            || Error::MissingSource(format!("record {i} has no file path")))?;
        if !self.catalog.contains(name) {
            return Err(Error::MissingSource(name.to_string()))
        }
        Ok(name.to_string())
    }

    async fn process(&self, name: String) -> Result<ColorImage> {
        self.catalog.colorize_with(&name, &self.lut, AlphaMode::Transparent)
            .await
    }

    fn apply(&self, &i: &usize, image: ColorImage) {
        let Some(r) = self.records.get(i) else { return };
        let Some(p) = r.position else { return };
        let size = image.width() as f64 * self.sprite_scale;
        self.surface.draw(r, self.geometry.place(p), size, &image);
    }
}

/// What is shown for a selected record.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    /// Index of the record in [`Session::records`].
    pub index: usize,
    pub details: Vec<(&'static str, String)>,
    /// The source colored without transparency, if it could be read.
    pub image: Option<ColorImage>,
}

/// Everything needed to explore one table of records.
pub struct Session<R: SourceReader> {
    config: ViewerConfig,
    palettes: PaletteRegistry,
    catalog: Arc<SourceCatalog<R>>,
    records: Arc<Vec<Record>>,
    runs: Arc<Runs>,
}

impl<R: SourceReader> Session<R> {
    /// Fails if a configured palette is invalid.
    pub fn new(reader: R, config: ViewerConfig) -> Result<Self> {
        let palettes = config.palette_registry()?;
        Ok(Session { config, palettes,
                     catalog: Arc::new(SourceCatalog::new(reader)),
                     records: Arc::new(Vec::new()),
                     runs: Runs::new() })
    }

    pub fn config(&self) -> &ViewerConfig { &self.config }

    pub fn palettes(&self) -> &PaletteRegistry { &self.palettes }

    /// The palette named by the `color_scheme` setting.
    pub fn palette(&self) -> &Palette {
        self.palettes.get(&self.config.color_scheme)
    }

    pub fn catalog(&self) -> &Arc<SourceCatalog<R>> { &self.catalog }

    pub fn records(&self) -> &[Record] { &self.records }

    pub fn runs(&self) -> &Arc<Runs> { &self.runs }

    /// Make image files available; see [`SourceCatalog::register`].
    pub fn register_sources(&self, handles: impl IntoIterator<Item = R::Handle>)
                            -> usize {
        self.catalog.register(handles)
    }

    /// Replace the records with those of `text`.  Returns their number.
    pub fn load_table(&mut self, text: &str) -> Result<usize> {
        let records = load_table(text, &self.config.schema())?;
        info!(records = records.len(), "table loaded");
        self.records = Arc::new(records);
        Ok(self.records.len())
    }

    /// Position every record with `reducer`, seeded with the
    /// `layout_seed` setting.
    pub async fn compute_layout<Re: Reducer>(&mut self, reducer: &Re,
                                             progress: &mut Progress<'_>)
                                             -> Result<()> {
        let records = Arc::make_mut(&mut self.records);
        layout::compute_layout(records, reducer, self.config.layout_seed,
                               progress).await
    }

    /// The map canvas of the positioned records.
    pub fn geometry(&self) -> Result<MapGeometry> {
        let bounds = Bounds::of_records(&self.records).ok_or(Error::NoLayout)?;
        Ok(MapGeometry::new(bounds, self.config.map_scale))
    }

    /// A processor drawing the current records on `surface`.
    pub fn sprite_processor(&self, surface: Arc<dyn Surface>)
                            -> Result<BatchProcessor<SpriteStage<R>>> {
        let stage = SpriteStage {
            catalog: Arc::clone(&self.catalog),
            records: Arc::clone(&self.records),
            lut: Lut::build(self.palette(), self.config.lut_samples)?,
            geometry: self.geometry()?,
            sprite_scale: self.config.sprite_scale,
            surface };
        Ok(BatchProcessor::new(Arc::new(stage), Arc::clone(&self.runs))
           .width(self.config.batch_width)
           .stale_results(self.config.stale_results)
           .seed(self.config.shuffle_seed))
    }

    /// Draw a sprite of every record on `surface`, superseding maps
    /// being drawn.  Records whose source is unknown are skipped.
    pub async fn draw_full_map(&self, surface: Arc<dyn Surface>)
                               -> Result<RunReport> {
        let processor = self.sprite_processor(surface)?;
        Ok(processor.run((0 .. self.records.len()).collect()).await)
    }

    /// The record closest to `point` (layout coordinates), if its squared
    /// distance is below `max_dist_sq`.
    pub async fn select_at(&self, point: Point, max_dist_sq: f64)
                           -> Option<Selection> {
        let index = closest_index(
            point, self.records.iter().map(Positioned::position), max_dist_sq)?;
        let record = &self.records[index];
        let image = match record.file_name() {
            Some(name) => {
                let colored = self.catalog.colorize(
                    name, self.palette(), self.config.lut_samples,
                    AlphaMode::Opaque).await;
                match colored {
                    Ok(img) => Some(img),
                    Err(e) => {
                        warn!(source = name, error = %e, "no image for selection");
                        None
                    }
                }
            }
            None => None,
        };
        Some(Selection { index, details: record.detail_rows(), image })
    }

    /// [`Session::select_at`] within the `pick_radius_sq` setting.
    pub async fn select(&self, point: Point) -> Option<Selection> {
        self.select_at(point, self.config.pick_radius_sq).await
    }
}
