//! Reader (and a small writer) for numpy's `.npy` container.
//!
//! ```text
//!  "\x93NUMPY" major minor | header_len | {'descr': ..., 'fortran_order': ..., 'shape': (...), }
//!        │
//!        ▼
//!  payload: pickle (descr '|O')  or  raw fixed-width cells ('<U8', '<i8', '<f8', ...)
//! ```
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use super::model::CellValue;
use super::pickle::{read_pickle, Object};
use crate::error::{DatasetError, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Parsed `.npy` header dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub descr: String,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

/// Number of elements implied by `shape`, failing on overflow.
pub fn checked_len(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| DatasetError::format(format!("array shape {shape:?} is too large")))
}

impl NpyHeader {
    /// Number of elements implied by the shape.
    pub fn element_count(&self) -> Result<usize> {
        checked_len(&self.shape)
    }

    /// Render as the python dict literal numpy writes.
    fn to_dict_literal(&self) -> String {
        let shape = match self.shape.as_slice() {
            [n] => format!("({n},)"),
            dims => format!(
                "({})",
                dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
            ),
        };
        let fortran = if self.fortran_order { "True" } else { "False" };
        format!(
            "{{'descr': '{}', 'fortran_order': {fortran}, 'shape': {shape}, }}",
            self.descr
        )
    }
}

/// Locate `'key':` in the header and return the text after it.
fn value_after<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    for quote in ['\'', '"'] {
        let needle = format!("{quote}{key}{quote}");
        if let Some(pos) = header.find(&needle) {
            let rest = header[pos + needle.len()..].trim_start();
            let rest = rest
                .strip_prefix(':')
                .ok_or_else(|| DatasetError::format(format!("missing ':' after '{key}' in npy header")))?;
            return Ok(rest.trim_start());
        }
    }
    Err(DatasetError::format(format!("npy header has no '{key}' entry")))
}

/// Parse the python dict literal of an `.npy` header.
pub fn parse_header(header: &str) -> Result<NpyHeader> {
    let descr_text = value_after(header, "descr")?;
    let quote = descr_text
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| DatasetError::format("npy 'descr' is not a plain string (structured dtypes are unsupported)"))?;
    let descr_end = descr_text[1..]
        .find(quote)
        .ok_or_else(|| DatasetError::format("unterminated npy 'descr'"))?;
    let descr = descr_text[1..1 + descr_end].to_string();

    let fortran_text = value_after(header, "fortran_order")?;
    let fortran_order = if fortran_text.starts_with("True") {
        true
    } else if fortran_text.starts_with("False") {
        false
    } else {
        return Err(DatasetError::format("npy 'fortran_order' is not a bool"));
    };

    let shape_text = value_after(header, "shape")?;
    let shape_text = shape_text
        .strip_prefix('(')
        .ok_or_else(|| DatasetError::format("npy 'shape' is not a tuple"))?;
    let shape_end = shape_text
        .find(')')
        .ok_or_else(|| DatasetError::format("unterminated npy 'shape'"))?;
    let shape = shape_text[..shape_end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|e| DatasetError::format(format!("invalid npy dimension '{s}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    checked_len(&shape)?;

    Ok(NpyHeader {
        descr,
        fortran_order,
        shape,
    })
}

/// Read magic, version and header dict.
pub fn read_header<R: Read>(r: &mut R) -> Result<NpyHeader> {
    let mut magic = [0u8; 6];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(DatasetError::format("not a .npy file (bad magic)"));
    }
    let major = r.read_u8()?;
    let _minor = r.read_u8()?;
    let header_len = match major {
        1 => r.read_u16::<LittleEndian>()? as usize,
        2 | 3 => r.read_u32::<LittleEndian>()? as usize,
        v => {
            return Err(DatasetError::format(format!(
                "unsupported .npy format version {v}"
            )))
        }
    };
    let mut raw = Vec::new();
    r.by_ref().take(header_len as u64).read_to_end(&mut raw)?;
    if raw.len() != header_len {
        return Err(DatasetError::format(format!(
            "npy header truncated: {} of {header_len} bytes",
            raw.len()
        )));
    }
    // Versions 1 and 2 are latin-1, version 3 is UTF-8.
    let text = if major == 3 {
        String::from_utf8(raw).map_err(|e| DatasetError::format(format!("npy header: {e}")))?
    } else {
        raw.into_iter().map(char::from).collect()
    };
    parse_header(&text)
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

/// A decoded `.npy` array with its cells in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub cells: Vec<CellValue>,
}

impl NpyArray {
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Split a 2-D array into rows.
    pub fn into_rows(self) -> Result<Vec<Vec<CellValue>>> {
        let [_, ncols] = self.shape[..] else {
            return Err(DatasetError::schema(format!(
                "expected a 2-D array, got shape {:?}",
                self.shape
            )));
        };
        if ncols == 0 {
            return Ok(Vec::new());
        }
        let mut rows = Vec::with_capacity(self.cells.len() / ncols);
        let mut cells = self.cells.into_iter();
        loop {
            let row: Vec<CellValue> = cells.by_ref().take(ncols).collect();
            if row.is_empty() {
                break;
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Load a `.npy` file from disk.
pub fn read_npy(path: &Path) -> Result<NpyArray> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_npy_from(&mut reader)
}

/// Decode a `.npy` stream.
pub fn read_npy_from<R: BufRead>(r: &mut R) -> Result<NpyArray> {
    let header = read_header(r)?;
    debug!(
        "npy header: descr={} fortran={} shape={:?}",
        header.descr, header.fortran_order, header.shape
    );

    let expected = header.element_count()?;
    let cells = if header.descr.ends_with('O') {
        object_cells(r, &header).map_err(truncated)?
    } else {
        let cells = fixed_width_cells(r, &header, expected).map_err(truncated)?;
        if header.fortran_order {
            fortran_to_c(cells, &header.shape)
        } else {
            cells
        }
    };

    if cells.len() != expected {
        return Err(DatasetError::format(format!(
            "npy payload holds {} cells but shape {:?} needs {expected}",
            cells.len(),
            header.shape
        )));
    }
    Ok(NpyArray {
        shape: header.shape,
        cells,
    })
}

/// A payload that ends early is a malformed file, not an IO failure.
fn truncated(e: DatasetError) -> DatasetError {
    match e {
        DatasetError::Io(io) if io.kind() == ErrorKind::UnexpectedEof => {
            DatasetError::format(format!("npy payload is truncated: {io}"))
        }
        other => other,
    }
}

fn object_cells<R: BufRead>(r: &mut R, header: &NpyHeader) -> Result<Vec<CellValue>> {
    let items = match read_pickle(r)? {
        Object::Array { shape, items } => {
            if shape != header.shape {
                return Err(DatasetError::format(format!(
                    "pickled array shape {shape:?} disagrees with header {:?}",
                    header.shape
                )));
            }
            items
        }
        // Nested python lists are accepted as long as they flatten to the header shape.
        nested @ (Object::List(_) | Object::Tuple(_)) => {
            let mut flat = Vec::new();
            flatten(nested, header.shape.len(), &mut flat)?;
            flat
        }
        other => {
            return Err(DatasetError::format(format!(
                "object array payload is {}, expected an ndarray",
                other.describe()
            )))
        }
    };
    Ok(items.into_iter().map(CellValue::from).collect())
}

fn flatten(obj: Object, depth: usize, out: &mut Vec<Object>) -> Result<()> {
    if depth == 0 {
        out.push(obj);
        return Ok(());
    }
    match obj {
        Object::List(items) | Object::Tuple(items) => {
            for item in items {
                flatten(item, depth - 1, out)?;
            }
            Ok(())
        }
        other => Err(DatasetError::format(format!(
            "expected a nested sequence, found {}",
            other.describe()
        ))),
    }
}

fn fixed_width_cells<R: Read>(r: &mut R, header: &NpyHeader, n: usize) -> Result<Vec<CellValue>> {
    let descr = header.descr.as_str();
    let (order, kind) = match descr.chars().next() {
        Some(c @ ('<' | '>' | '|' | '=')) => (c, &descr[1..]),
        _ => ('=', descr),
    };
    if order == '>' {
        return Err(DatasetError::format(format!(
            "big-endian dtype '{descr}' is not supported"
        )));
    }
    let mut cells = Vec::new();

    match kind {
        k if k.starts_with('U') => {
            let width: usize = k[1..]
                .parse()
                .map_err(|e| DatasetError::format(format!("invalid unicode width in '{descr}': {e}")))?;
            width
                .checked_mul(4)
                .and_then(|item| item.checked_mul(n))
                .ok_or_else(|| DatasetError::format(format!("npy payload of {n} x '{descr}' is too large")))?;
            for _ in 0..n {
                let mut s = String::new();
                for _ in 0..width {
                    let code = r.read_u32::<LittleEndian>()?;
                    if code == 0 {
                        continue;
                    }
                    let c = char::from_u32(code).ok_or_else(|| {
                        DatasetError::format(format!("invalid code point {code:#x} in npy string"))
                    })?;
                    s.push(c);
                }
                cells.push(CellValue::String(s));
            }
        }
        "i8" => {
            for _ in 0..n {
                cells.push(CellValue::Integer(r.read_i64::<LittleEndian>()?));
            }
        }
        "i4" => {
            for _ in 0..n {
                cells.push(CellValue::Integer(r.read_i32::<LittleEndian>()? as i64));
            }
        }
        "f8" => {
            for _ in 0..n {
                cells.push(float_cell(r.read_f64::<LittleEndian>()?));
            }
        }
        "f4" => {
            for _ in 0..n {
                cells.push(float_cell(r.read_f32::<LittleEndian>()? as f64));
            }
        }
        "b1" => {
            for _ in 0..n {
                cells.push(CellValue::Bool(r.read_u8()? != 0));
            }
        }
        _ => {
            return Err(DatasetError::format(format!(
                "unsupported npy dtype '{descr}'"
            )))
        }
    }
    Ok(cells)
}

fn float_cell(v: f64) -> CellValue {
    if v.is_nan() {
        CellValue::Null
    } else {
        CellValue::Float(v)
    }
}

/// Reorder column-major cells into row-major order.
fn fortran_to_c(cells: Vec<CellValue>, shape: &[usize]) -> Vec<CellValue> {
    let [rows, cols] = shape[..] else {
        // 1-D arrays have the same layout either way.
        return cells;
    };
    let mut slots: Vec<Option<CellValue>> = cells.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());
    for i in 0..rows {
        for j in 0..cols {
            out.push(slots[j * rows + i].take().unwrap_or(CellValue::Null));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Object → CellValue
// ---------------------------------------------------------------------------

impl From<Object> for CellValue {
    fn from(obj: Object) -> Self {
        match obj {
            Object::String(s) => CellValue::String(s),
            Object::Int(i) => CellValue::Integer(i),
            // pandas stores missing values as NaN.
            Object::Float(f) => float_cell(f),
            Object::Bool(b) => CellValue::Bool(b),
            Object::None => CellValue::Null,
            Object::DateTime(s) => CellValue::Date(s),
            Object::List(items) | Object::Tuple(items) | Object::Array { items, .. } => {
                CellValue::List(items.into_iter().map(CellValue::from).collect())
            }
            Object::Bytes(b) => CellValue::String(String::from_utf8_lossy(&b).into_owned()),
            Object::Dict(entries) => {
                let map: serde_json::Map<String, serde_json::Value> = entries
                    .into_iter()
                    .map(|(k, v)| (CellValue::from(k).to_field(), CellValue::from(v).to_json()))
                    .collect();
                CellValue::String(serde_json::Value::Object(map).to_string())
            }
            other => CellValue::String(other.describe()),
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Write a version 1.0 header padded to a 64-byte boundary.
pub fn write_header<W: Write>(w: &mut W, header: &NpyHeader) -> Result<()> {
    let mut dict = header.to_dict_literal();
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let pad = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.extend(std::iter::repeat(' ').take(pad));
    dict.push('\n');
    let len = u16::try_from(dict.len())
        .map_err(|_| DatasetError::format("npy header too long for format 1.0"))?;

    w.write_all(MAGIC)?;
    w.write_all(&[1, 0])?;
    w.write_u16::<LittleEndian>(len)?;
    w.write_all(dict.as_bytes())?;
    Ok(())
}

/// Write a 2-D array of strings as a fixed-width unicode (`<U`) array.
pub fn write_unicode<W: Write>(w: &mut W, rows: &[Vec<String>]) -> Result<()> {
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().position(|r| r.len() != ncols) {
        return Err(DatasetError::schema(format!(
            "row {bad} has {} values, expected {ncols}",
            rows[bad].len()
        )));
    }
    let width = rows
        .iter()
        .flatten()
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(0)
        .max(1);

    let header = NpyHeader {
        descr: format!("<U{width}"),
        fortran_order: false,
        shape: vec![rows.len(), ncols],
    };
    write_header(w, &header)?;
    for s in rows.iter().flatten() {
        let mut written = 0;
        for c in s.chars() {
            w.write_u32::<LittleEndian>(c as u32)?;
            written += 1;
        }
        for _ in written..width {
            w.write_u32::<LittleEndian>(0)?;
        }
    }
    Ok(())
}

/// [`write_unicode`] into a new file at `path`.
pub fn write_unicode_file(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let mut file = std::io::BufWriter::new(File::create(path)?);
    write_unicode(&mut file, rows)?;
    file.flush()?;
    Ok(())
}
