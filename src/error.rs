use thiserror::Error;

/// Boxed error produced by external collaborators (image readers,
/// reducers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors of this crate.  All of them are recoverable at the call
/// site; the batch processor logs and skips the per-item ones.
#[derive(Debug, Error)]
pub enum Error {
    /// The palette does not describe a ramp over \[0, 1\].
    #[error("invalid palette: {0}")]
    InvalidPalette(String),

    /// A lookup table needs at least one interval.
    #[error("a lookup table needs a positive sample count")]
    InvalidSampleCount,

    /// A data record references a source that was never registered.
    #[error("missing source: {0}")]
    MissingSource(String),

    /// `min == max`: values cannot be normalized.
    #[error("degenerate value range [{min}, {max}]")]
    DegenerateRange { min: f64, max: f64 },

    /// The number of samples does not match `width * height`.
    #[error("{len} samples do not fit a {width}x{height} frame")]
    ShapeMismatch { width: usize, height: usize, len: usize },

    /// Embedding vectors of different lengths cannot be reduced together.
    #[error("record {index} has {found} embedding dimensions, expected {expected}")]
    RaggedEmbedding { index: usize, expected: usize, found: usize },

    /// The reducer returned a different number of positions than inputs.
    #[error("layout has {found} positions for {expected} records")]
    LayoutMismatch { expected: usize, found: usize },

    /// An external reader failed to decode a source.
    #[error("failed to read {name}: {source}")]
    Read { name: String, #[source] source: BoxError },

    /// No record has a layout position yet.
    #[error("records have no layout position")]
    NoLayout,

    /// The reducer failed.
    #[error("layout computation failed: {0}")]
    Reduce(#[source] BoxError),

    /// Malformed delimited text.
    #[error("table: {0}")]
    Table(String),

    /// Malformed configuration.
    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
