//! Viewer settings.
//!
//! Settings are read from [Hjson](https://hjson.github.io/).  Every key
//! is optional; unknown keys are ignored.
//!
//! ```
//! use fits_atlas::{ViewerConfig, StaleResults};
//! let c = ViewerConfig::from_hjson("{
//!     // what the map is drawn with
//!     color_scheme: PuRd
//!     batch_width: 4
//!     stale_results: discard
//! }")?;
//! assert_eq!(c.color_scheme, "PuRd");
//! assert_eq!(c.batch_width, 4);
//! assert_eq!(c.stale_results, StaleResults::Discard);
//! assert_eq!(c.lut_samples, 32);
//! # Ok::<(), fits_atlas::Error>(())
//! ```

use std::path::Path;
use serde_hjson::Value;
use tracing::debug;
use crate::{Error, PaletteRegistry, Result, StaleResults, TableSchema,
            DEFAULT_SAMPLES};

/// Everything a [`Session`](crate::Session) can be tuned with.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerConfig {
    /// Palette of the map sprites and of the selection.
    pub color_scheme: String,
    /// Number of intervals of the lookup tables.
    pub lut_samples: usize,
    /// Maximum number of sprites processed at the same time.
    pub batch_width: usize,
    /// Map pixels per layout unit.
    pub map_scale: f64,
    /// Size of a sprite relative to the width of its image.
    pub sprite_scale: f64,
    pub separator: u8,
    pub text_columns: Vec<String>,
    pub embedding_prefix: String,
    pub layout_seed: u64,
    /// Fixed seed for the order sprites are drawn in.
    pub shuffle_seed: Option<u64>,
    pub stale_results: StaleResults,
    /// Squared layout distance within which a click selects a record.
    pub pick_radius_sq: f64,
    /// Additional palettes: name and `(threshold, 0xRRGGBB)` stops.
    pub palettes: Vec<(String, Vec<(f64, u32)>)>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let schema = TableSchema::default();
        ViewerConfig {
            color_scheme: "viridis".into(),
            lut_samples: DEFAULT_SAMPLES,
            batch_width: crate::batch::DEFAULT_WIDTH,
            map_scale: 100.,
            sprite_scale: 1.,
            separator: schema.separator,
            text_columns: schema.text_columns,
            embedding_prefix: schema.embedding_prefix,
            layout_seed: 42,
            shuffle_seed: None,
            stale_results: StaleResults::Apply,
            pick_radius_sq: f64::INFINITY,
            palettes: vec![],
        }
    }
}

fn wrong(key: &str, expected: &str, v: &Value) -> Error {
    Error::Config(format!("{key:?} must be {expected}, got {v:?}"))
}

fn string(key: &str, v: &Value) -> Result<String> {
    match v {
        Value::String(s) => Ok(s.clone()),
        _ => Err(wrong(key, "a string", v)),
    }
}

fn unsigned(key: &str, v: &Value) -> Result<u64> {
    match *v {
        Value::U64(n) => Ok(n),
        Value::I64(n) if n >= 0 => Ok(n as u64),
        Value::F64(x) if x >= 0. && x.fract() == 0. && x < u64::MAX as f64 =>
            Ok(x as u64),
        _ => Err(wrong(key, "a non-negative integer", v)),
    }
}

fn positive(key: &str, v: &Value) -> Result<usize> {
    match unsigned(key, v)? {
        0 => Err(wrong(key, "positive", v)),
        n => usize::try_from(n).map_err(|_| wrong(key, "smaller", v)),
    }
}

fn number(key: &str, v: &Value) -> Result<f64> {
    v.as_f64().ok_or_else(|| wrong(key, "a number", v))
}

fn strings(key: &str, v: &Value) -> Result<Vec<String>> {
    match v {
        Value::Array(a) => a.iter().map(|s| string(key, s)).collect(),
        _ => Err(wrong(key, "an array of strings", v)),
    }
}

/// Accept `"#440154"`, `"440154"` or the integer `0x440154`.
fn hex_color(key: &str, v: &Value) -> Result<u32> {
    match v {
        Value::String(s) => {
            let s = s.strip_prefix('#').unwrap_or(s);
            let digits = s.len() == 6 && s.bytes().all(|b| b.is_ascii_hexdigit());
            match u32::from_str_radix(s, 16) {
                Ok(c) if digits => Ok(c),
                _ => Err(wrong(key, "a color \"#RRGGBB\"", v)),
            }
        }
        _ => match unsigned(key, v)? {
            c if c <= 0xFF_FF_FF => Ok(c as u32),
            _ => Err(wrong(key, "a 24 bits color", v)),
        }
    }
}

fn stops(key: &str, v: &Value) -> Result<Vec<(f64, u32)>> {
    let Value::Array(a) = v else {
        return Err(wrong(key, "an array of [threshold, color] pairs", v)) };
    a.iter().map(|stop| match stop {
        Value::Array(p) if p.len() == 2 =>
            Ok((number(key, &p[0])?, hex_color(key, &p[1])?)),
        _ => Err(wrong(key, "a [threshold, color] pair", stop)),
    }).collect()
}

impl ViewerConfig {
    /// Parse the Hjson object `text`, starting from the defaults.
    pub fn from_hjson(text: &str) -> Result<Self> {
        let value: Value = serde_hjson::from_str(text)
            .map_err(|e| Error::Config(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(Error::Config("the settings must be an object".into()))
        };
        let mut c = ViewerConfig::default();
        for (key, v) in map.iter() {
            let key = key.as_str();
            match key {
                "color_scheme" => c.color_scheme = string(key, v)?,
                "lut_samples" => c.lut_samples = positive(key, v)?,
                "batch_width" => c.batch_width = positive(key, v)?,
                "map_scale" => c.map_scale = number(key, v)?,
                "sprite_scale" => c.sprite_scale = number(key, v)?,
                "separator" => {
                    c.separator = match string(key, v)?.as_bytes() {
                        &[b] if b.is_ascii() => b,
                        _ => return Err(wrong(key, "one ASCII character", v)),
                    }
                }
                "text_columns" => c.text_columns = strings(key, v)?,
                "embedding_prefix" => c.embedding_prefix = string(key, v)?,
                "layout_seed" => c.layout_seed = unsigned(key, v)?,
                "shuffle_seed" => {
                    c.shuffle_seed = match v {
                        Value::Null => None,
                        _ => Some(unsigned(key, v)?),
                    }
                }
                "stale_results" => {
                    c.stale_results = match string(key, v)?.as_str() {
                        "apply" => StaleResults::Apply,
                        "discard" => StaleResults::Discard,
                        _ => return Err(wrong(key, "\"apply\" or \"discard\"", v)),
                    }
                }
                // Hjson has no infinity.
                "pick_radius_sq" => {
                    c.pick_radius_sq = match v {
                        Value::Null => f64::INFINITY,
                        _ => number(key, v)?,
                    }
                }
                "palettes" => {
                    let Value::Object(p) = v else {
                        return Err(wrong(key, "an object", v)) };
                    c.palettes = p.iter()
                        .map(|(name, s)| Ok((name.clone(), stops(name, s)?)))
                        .collect::<Result<_>>()?;
                }
                _ => debug!(key, "ignoring unknown setting"),
            }
        }
        Ok(c)
    }

    /// Read and parse the Hjson file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_hjson(&std::fs::read_to_string(path)?)
    }

    /// How tables are read with these settings.
    pub fn schema(&self) -> TableSchema {
        TableSchema { separator: self.separator,
                      text_columns: self.text_columns.clone(),
                      embedding_prefix: self.embedding_prefix.clone() }
    }

    /// The built-in palettes plus the configured ones.
    pub fn palette_registry(&self) -> Result<PaletteRegistry> {
        let mut reg = PaletteRegistry::new();
        for (name, stops) in &self.palettes {
            reg.add(name, stops)?;
        }
        Ok(reg)
    }
}
