use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::{DatasetError, Result};

/// Column names every loaded dataset carries, in positional order.
pub const REQUIRED_COLUMNS: [&str; 11] = [
    "tweet_id",
    "text",
    "event_id",
    "words",
    "filtered_words",
    "entities",
    "user_id",
    "created_at",
    "urls",
    "hashtags",
    "user_mentions",
];

// ---------------------------------------------------------------------------
// CellValue – a single cell of the tweet table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the Python objects stored in the
/// object-dtype arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// ISO-8601 timestamp kept as text.
    Date(String),
    List(Vec<CellValue>),
    Null,
}

// -- Manual Eq/Ord so cells can live in a BTreeSet --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
                List(_) => 6,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) | (Date(a), Date(b)) => a.cmp(b),
            (List(a), List(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::String(s) | CellValue::Date(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::List(items) => items.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(d) => write!(f, "{d}"),
            CellValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) | CellValue::Date(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[CellValue]> {
        match self {
            CellValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// JSON rendering used by the exporters.
    pub fn to_json(&self) -> JsonValue {
        match self {
            CellValue::String(s) | CellValue::Date(s) => JsonValue::String(s.clone()),
            CellValue::Integer(i) => JsonValue::from(*i),
            CellValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            CellValue::Bool(b) => JsonValue::Bool(*b),
            CellValue::List(items) => JsonValue::Array(items.iter().map(|c| c.to_json()).collect()),
            CellValue::Null => JsonValue::Null,
        }
    }

    /// Flat text for single-string sinks (CSV fields, Utf8 columns).
    /// Scalars print as-is, lists as JSON, null as the empty string.
    pub fn to_field(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::List(_) => self.to_json().to_string(),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// TweetTable – the loaded dataset
// ---------------------------------------------------------------------------

/// Row-major table with the fixed [`REQUIRED_COLUMNS`] schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TweetTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl TweetTable {
    /// Build a table from positional rows; every row must have exactly one
    /// cell per required column.
    pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != REQUIRED_COLUMNS.len() {
                return Err(DatasetError::schema(format!(
                    "row {i} has {} values, expected {}",
                    row.len(),
                    REQUIRED_COLUMNS.len()
                )));
            }
        }
        Ok(TweetTable {
            columns: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<CellValue>> {
        self.rows
    }

    /// Number of tweets.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&CellValue> {
        let col = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// All cells of column `name`, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&CellValue>> {
        let col = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[col]).collect())
    }

    /// Sorted distinct values of column `name`.
    pub fn unique_values(&self, name: &str) -> Option<BTreeSet<&CellValue>> {
        self.column(name).map(|cells| cells.into_iter().collect())
    }

    /// New table holding the rows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> TweetTable {
        TweetTable {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> TweetTable {
        let end = n.min(self.rows.len());
        TweetTable {
            columns: self.columns.clone(),
            rows: self.rows[..end].to_vec(),
        }
    }
}
