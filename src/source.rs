//! Image sources: registered by file name, decoded on first use and
//! kept in memory afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::OnceCell;
use tracing::debug;
use crate::{AlphaMode, BoxError, ColorImage, Error, Frame, Lut, Palette,
            Result, ValueRange};

/// Decodes image files into [`Frame`]s.  Implemented by the
/// application (e.g. over a FITS library).
pub trait SourceReader: Send + Sync + 'static {
    /// An opaque reference to a file.
    type Handle: Send + Sync + 'static;

    /// Path or name of the file behind `handle`.
    fn name(&self, handle: &Self::Handle) -> String;

    /// Decode the first frame of the file.
    fn read(&self, handle: &Self::Handle)
            -> impl Future<Output = Result<Frame, BoxError>> + Send;
}

/// Last `/`-separated component of `path`.
///
/// ```
/// assert_eq!(fits_atlas::file_name_of("data/run_3/m31.fits"), "m31.fits");
/// assert_eq!(fits_atlas::file_name_of("m31.fits"), "m31.fits");
/// ```
pub fn file_name_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1 ..],
        None => path,
    }
}

/// A decoded frame with its extrema.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub frame: Frame,
    /// Extrema of the whole frame, NaN ignored.  A frame without any
    /// comparable sample gets the degenerate range `[0, 0]`.
    pub range: ValueRange,
}

impl Decoded {
    pub fn new(frame: Frame) -> Self {
        let range = ValueRange::of_values(frame.values().iter().copied())
            .unwrap_or(ValueRange::new(0., 0.));
        Decoded { frame, range }
    }
}

struct Entry<H> {
    handle: H,
    decoded: OnceCell<Arc<Decoded>>,
}

type Entries<H> = HashMap<String, Arc<Entry<H>>>;

/// Registered sources, keyed by file name.  Sources may be registered
/// while others are being decoded.
pub struct SourceCatalog<R: SourceReader> {
    reader: R,
    entries: RwLock<Entries<R::Handle>>,
}

impl<R: SourceReader> SourceCatalog<R> {
    pub fn new(reader: R) -> Self {
        SourceCatalog { reader, entries: RwLock::new(HashMap::new()) }
    }

    pub fn reader(&self) -> &R { &self.reader }

    fn entry(&self, name: &str) -> Option<Arc<Entry<R::Handle>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).cloned()
    }

    /// Register `handles` under their file names, replacing (and
    /// forgetting the decoded data of) sources with the same name.
    /// Returns the number of handles registered.
    pub fn register(&self, handles: impl IntoIterator<Item = R::Handle>)
                    -> usize {
        let new: Vec<_> = handles.into_iter().map(|handle| {
            let name = file_name_of(&self.reader.name(&handle)).to_string();
            (name, Arc::new(Entry { handle, decoded: OnceCell::new() }))
        }).collect();
        let n = new.len();
        debug!(sources = n, "registering");
        self.entries.write().unwrap_or_else(PoisonError::into_inner).extend(new);
        n
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn contains(&self, name: &str) -> bool { self.entry(name).is_some() }

    /// Whether `name` has already been decoded.
    pub fn is_decoded(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|e| e.decoded.initialized())
    }

    /// The decoded source called `name`.  The file is read at most once;
    /// concurrent callers wait for the same decode.
    pub async fn decoded(&self, name: &str) -> Result<Arc<Decoded>> {
        let entry = self.entry(name)
            .ok_or_else(|| Error::MissingSource(name.to_string()))?;
        let decoded = entry.decoded.get_or_try_init(|| async {
            debug!(source = name, "decoding");
            let frame = self.reader.read(&entry.handle).await
                .map_err(|source| Error::Read { name: name.to_string(),
                                                source })?;
            Ok::<_, Error>(Arc::new(Decoded::new(frame)))
        }).await?;
        Ok(Arc::clone(decoded))
    }

    /// Color the source `name` with `palette` sampled at `samples`
    /// intervals over the extrema of the source.
    pub async fn colorize(&self, name: &str, palette: &Palette, samples: usize,
                          mode: AlphaMode) -> Result<ColorImage> {
        self.colorize_with(name, &Lut::build(palette, samples)?, mode).await
    }

    /// Color the source `name` with the table of `lut`, over the extrema
    /// of the source.
    pub async fn colorize_with(&self, name: &str, lut: &Lut, mode: AlphaMode)
                               -> Result<ColorImage> {
        let decoded = self.decoded(name).await?;
        let lut = lut.clone().with_range(decoded.range);
        Ok(decoded.frame.colorize(&lut, mode))
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::VIRIDIS;

    /// Frames held in memory; counts decodes.  Paths containing
    /// "broken" fail to decode.
    #[derive(Default)]
    pub(crate) struct MemoryReader {
        pub(crate) reads: AtomicUsize,
    }

    impl SourceReader for MemoryReader {
        type Handle = (String, Frame);

        fn name(&self, handle: &Self::Handle) -> String { handle.0.clone() }

        async fn read(&self, handle: &Self::Handle) -> Result<Frame, BoxError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if handle.0.contains("broken") {
                return Err("truncated header".into())
            }
            Ok(handle.1.clone())
        }
    }

    pub(crate) fn ramp(path: &str, n: usize) -> (String, Frame) {
        let values = (0 .. n * n).map(|v| v as f64).collect();
        (path.to_string(), Frame::new(n, n, values).unwrap())
    }

    #[tokio::test]
    async fn decodes_once_and_caches_extrema() {
        let cat = SourceCatalog::new(MemoryReader::default());
        assert_eq!(cat.register([ramp("dir/a.fits", 3), ramp("b.fits", 2)]), 2);
        assert!(cat.contains("a.fits") && !cat.contains("dir/a.fits"));
        assert!(!cat.is_decoded("a.fits"));
        let d = cat.decoded("a.fits").await.unwrap();
        assert_eq!(d.range, ValueRange::new(0., 8.));
        assert!(cat.is_decoded("a.fits"));
        for _ in 0 .. 3 {
            cat.colorize("a.fits", &VIRIDIS, 32, AlphaMode::Transparent)
                .await.unwrap();
        }
        assert_eq!(cat.reader().reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_decode() {
        let cat = SourceCatalog::new(MemoryReader::default());
        cat.register([ramp("a.fits", 4)]);
        let (x, y) = tokio::join!(cat.decoded("a.fits"), cat.decoded("a.fits"));
        assert!(Arc::ptr_eq(&x.unwrap(), &y.unwrap()));
        assert_eq!(cat.reader().reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_and_broken_sources() {
        let cat = SourceCatalog::new(MemoryReader::default());
        cat.register([ramp("broken.fits", 2)]);
        assert!(matches!(cat.decoded("nope.fits").await,
                         Err(Error::MissingSource(n)) if n == "nope.fits"));
        assert!(matches!(cat.decoded("broken.fits").await,
                         Err(Error::Read { .. })));
        assert!(!cat.is_decoded("broken.fits"));
    }

    #[tokio::test]
    async fn colorized_extremes() {
        let cat = SourceCatalog::new(MemoryReader::default());
        cat.register([ramp("a.fits", 2)]);
        let img = cat.colorize("a.fits", &VIRIDIS, 32, AlphaMode::Transparent)
            .await.unwrap();
        assert_eq!((img.pixel(0, 0).a, img.pixel(1, 1).a), (0, 255));
        assert_eq!(img.as_bytes().len(), 16);
    }

    #[test]
    fn empty_frame_is_degenerate() {
        let d = Decoded::new(Frame::new(0, 0, vec![]).unwrap());
        assert!(d.range.is_degenerate());
    }
}
