//! Records read from delimited text with a header row.
//!
//! Columns named `<prefix><n>` (`emb_dim_0`, `emb_dim_1`, ...) form the
//! embedding vector of each record, in the order of `n`.  Text columns
//! are kept verbatim; every other column is numeric.

use std::collections::BTreeMap;
use csv::{ReaderBuilder, Trim};
use crate::{Error, Point, Positioned, Result, file_name_of};

/// How to interpret the columns of a table.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSchema {
    pub separator: u8,
    /// Columns kept as strings.
    pub text_columns: Vec<String>,
    /// Prefix of the embedding columns.
    pub embedding_prefix: String,
}

impl Default for TableSchema {
    fn default() -> Self {
        TableSchema { separator: b';',
                      text_columns: vec!["object".into(), "filepath".into()],
                      embedding_prefix: "emb_dim_".into() }
    }
}

/// One row of the table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub embedding: Vec<f64>,
    pub text: BTreeMap<String, String>,
    /// Numeric columns; unparsable cells are NaN.
    pub scalars: BTreeMap<String, f64>,
    /// Layout position, once computed.
    pub position: Option<Point>,
}

const FILE_PATH: &str = "filepath";

impl Record {
    pub fn text(&self, column: &str) -> Option<&str> {
        self.text.get(column).map(|s| s.as_str())
    }

    pub fn scalar(&self, column: &str) -> Option<f64> {
        self.scalars.get(column).copied()
    }

    /// Path of the image of this record.
    pub fn file_path(&self) -> Option<&str> { self.text(FILE_PATH) }

    /// The key of the image in a [`SourceCatalog`](crate::SourceCatalog).
    pub fn file_name(&self) -> Option<&str> { self.file_path().map(file_name_of) }

    fn field(&self, column: &str) -> String {
        match (self.text(column), self.scalar(column)) {
            (Some(s), _) => s.to_string(),
            (None, Some(x)) => x.to_string(),
            (None, None) => String::new(),
        }
    }

    /// Labelled metadata shown for a selected record.  Absent fields
    /// are empty.
    pub fn detail_rows(&self) -> Vec<(&'static str, String)> {
        let (x, y) = match self.position {
            Some(p) => (p.x.to_string(), p.y.to_string()),
            None => (String::new(), String::new()),
        };
        vec![("cluster", self.field("cluster")),
             ("object", self.field("object")),
             ("right ascension", self.field("right ascension")),
             ("declination", self.field("declination")),
             ("rest freq", self.field("rest freq")),
             ("layout x", x),
             ("layout y", y),
             ("filename", self.file_name().unwrap_or_default().to_string())]
    }
}

impl Positioned for Record {
    /// Records without a position are at NaN and never picked.
    fn position(&self) -> Point {
        self.position.unwrap_or(Point::new(f64::NAN, f64::NAN))
    }
}

enum Column {
    Text(String),
    Embedding(usize),
    Scalar(String),
}

fn classify(header: &str, schema: &TableSchema) -> Result<Column> {
    if schema.text_columns.iter().any(|c| c == header) {
        return Ok(Column::Text(header.to_string()))
    }
    match header.strip_prefix(schema.embedding_prefix.as_str()) {
        Some(n) => n.parse().map(Column::Embedding).map_err(|_| Error::Table(
            format!("embedding column {header:?} has no dimension index"))),
        None => Ok(Column::Scalar(header.to_string())),
    }
}

/// Parse `text` into records.
///
/// # Example
///
/// ```
/// use fits_atlas::{load_table, TableSchema};
/// let csv = "object;emb_dim_1;emb_dim_0;cluster\nM31;0.5;-1;3\n";
/// let rows = load_table(csv, &TableSchema::default())?;
/// assert_eq!(rows[0].embedding, [-1., 0.5]);
/// assert_eq!(rows[0].text("object"), Some("M31"));
/// assert_eq!(rows[0].scalar("cluster"), Some(3.));
/// # Ok::<(), fits_atlas::Error>(())
/// ```
pub fn load_table(text: &str, schema: &TableSchema) -> Result<Vec<Record>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(schema.separator)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let columns = rdr.headers()?.iter()
        .map(|h| classify(h, schema))
        .collect::<Result<Vec<_>>>()?;

    let mut dims: Vec<usize> = columns.iter().filter_map(|c| match c {
        Column::Embedding(i) => Some(*i),
        _ => None }).collect();
    dims.sort_unstable();
    if let Some((k, &i)) = dims.iter().enumerate().find(|&(k, &i)| k != i) {
        return Err(Error::Table(format!(
            "embedding dimensions are not 0..{}: found {i} at position {k}",
            dims.len())))
    }

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let mut r = Record { embedding: vec![f64::NAN; dims.len()],
                             ..Record::default() };
        for (k, col) in columns.iter().enumerate() {
            let cell = row.get(k);
            match col {
                Column::Text(name) => {
                    if let Some(cell) = cell {
                        r.text.insert(name.clone(), cell.to_string());
                    }
                }
                Column::Embedding(i) => r.embedding[*i] = parse_number(cell),
                Column::Scalar(name) => {
                    r.scalars.insert(name.clone(), parse_number(cell));
                }
            }
        }
        records.push(r);
    }
    Ok(records)
}

fn parse_number(cell: Option<&str>) -> f64 {
    cell.and_then(|c| c.parse().ok()).unwrap_or(f64::NAN)
}
