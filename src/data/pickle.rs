//! Just enough pickle support to read the payload numpy writes for
//! object-dtype arrays (`np.save(..., allow_pickle=True)`).
//!
//! Covers protocols 2 to 5 and the classes such arrays typically reference:
//! numpy's array reconstruction, `datetime.datetime`/`datetime.date`, pandas
//! `Timestamp`, sets and `OrderedDict`. Any other class is kept as an opaque
//! [`Object::Reduce`] / [`Object::Build`] node.
use std::collections::HashMap;
use std::io::{self, BufRead, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use super::npy::checked_len;
use crate::error::{DatasetError, Result};

// https://github.com/python/cpython/blob/main/Lib/pickletools.py
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum OpCode {
    Proto = 0x80,
    Frame = 0x95,
    Stop = b'.',
    Mark = b'(',
    Pop = b'0',
    PopMark = b'1',
    Dup = b'2',
    None = b'N',
    NewTrue = 0x88,
    NewFalse = 0x89,
    Int = b'I',
    BinInt = b'J',
    BinInt1 = b'K',
    BinInt2 = b'M',
    Long = b'L',
    Long1 = 0x8a,
    Long4 = 0x8b,
    Float = b'F',
    BinFloat = b'G',
    BinUnicode = b'X',
    ShortBinUnicode = 0x8c,
    BinUnicode8 = 0x8d,
    BinString = b'T',
    ShortBinString = b'U',
    BinBytes = b'B',
    ShortBinBytes = b'C',
    BinBytes8 = 0x8e,
    ByteArray8 = 0x96,
    EmptyTuple = b')',
    Tuple = b't',
    Tuple1 = 0x85,
    Tuple2 = 0x86,
    Tuple3 = 0x87,
    EmptyList = b']',
    List = b'l',
    Append = b'a',
    Appends = b'e',
    EmptyDict = b'}',
    Dict = b'd',
    SetItem = b's',
    SetItems = b'u',
    EmptySet = 0x8f,
    AddItems = 0x90,
    FrozenSet = 0x91,
    Global = b'c',
    StackGlobal = 0x93,
    Reduce = b'R',
    Build = b'b',
    NewObj = 0x81,
    NewObjEx = 0x92,
    Put = b'p',
    BinPut = b'q',
    LongBinPut = b'r',
    Memoize = 0x94,
    Get = b'g',
    BinGet = b'h',
    LongBinGet = b'j',
}

impl TryFrom<u8> for OpCode {
    type Error = u8;
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        use OpCode::*;
        let op = match value {
            0x80 => Proto,
            0x95 => Frame,
            b'.' => Stop,
            b'(' => Mark,
            b'0' => Pop,
            b'1' => PopMark,
            b'2' => Dup,
            b'N' => None,
            0x88 => NewTrue,
            0x89 => NewFalse,
            b'I' => Int,
            b'J' => BinInt,
            b'K' => BinInt1,
            b'M' => BinInt2,
            b'L' => Long,
            0x8a => Long1,
            0x8b => Long4,
            b'F' => Float,
            b'G' => BinFloat,
            b'X' => BinUnicode,
            0x8c => ShortBinUnicode,
            0x8d => BinUnicode8,
            b'T' => BinString,
            b'U' => ShortBinString,
            b'B' => BinBytes,
            b'C' => ShortBinBytes,
            0x8e => BinBytes8,
            0x96 => ByteArray8,
            b')' => EmptyTuple,
            b't' => Tuple,
            0x85 => Tuple1,
            0x86 => Tuple2,
            0x87 => Tuple3,
            b']' => EmptyList,
            b'l' => List,
            b'a' => Append,
            b'e' => Appends,
            b'}' => EmptyDict,
            b'd' => Dict,
            b's' => SetItem,
            b'u' => SetItems,
            0x8f => EmptySet,
            0x90 => AddItems,
            0x91 => FrozenSet,
            b'c' => Global,
            0x93 => StackGlobal,
            b'R' => Reduce,
            b'b' => Build,
            0x81 => NewObj,
            0x92 => NewObjEx,
            b'p' => Put,
            b'q' => BinPut,
            b'r' => LongBinPut,
            0x94 => Memoize,
            b'g' => Get,
            b'h' => BinGet,
            b'j' => LongBinGet,
            value => return Err(value),
        };
        Ok(op)
    }
}

/// Decoded pickle value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Class {
        module_name: String,
        name: String,
    },
    String(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Tuple(Vec<Object>),
    List(Vec<Object>),
    Dict(Vec<(Object, Object)>),
    /// ISO-8601 rendering of a `datetime`, `date` or pandas `Timestamp`.
    DateTime(String),
    /// A reconstructed numpy array; `items` are always in C order.
    Array { shape: Vec<usize>, items: Vec<Object> },
    Reduce {
        callable: Box<Object>,
        args: Box<Object>,
    },
    Build {
        callable: Box<Object>,
        args: Box<Object>,
    },
}

impl Object {
    fn is_array_reconstruct(&self) -> bool {
        match self {
            Object::Reduce { callable, .. } => matches!(
                callable.as_ref(),
                Object::Class { module_name, name }
                    if module_name.starts_with("numpy") && module_name.ends_with("multiarray") && name == "_reconstruct"
            ),
            _ => false,
        }
    }

    /// Short human-readable text for values with no natural cell form.
    pub fn describe(&self) -> String {
        match self {
            Object::Class { module_name, name } => format!("{module_name}.{name}"),
            Object::Reduce { callable, .. } | Object::Build { callable, .. } => {
                format!("<{}>", callable.describe())
            }
            Object::Array { shape, .. } => format!("<ndarray {shape:?}>"),
            other => format!("{other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Stack machine
// ---------------------------------------------------------------------------

/// A stack entry. Once memoized, a container lives in the memo and the stack
/// holds a reference to it, so later appends are visible through every `GET`.
#[derive(Debug, Clone)]
enum Slot {
    Value(Object),
    Memo(u32),
}

#[derive(Default)]
struct Stack {
    stack: Vec<Slot>,
    marks: Vec<usize>,
    memo: HashMap<u32, Object>,
}

fn underflow() -> DatasetError {
    DatasetError::format("pickle stack underflow")
}

impl Stack {
    fn push(&mut self, o: Object) {
        self.stack.push(Slot::Value(o))
    }

    fn push_slot(&mut self, slot: Slot) {
        self.stack.push(slot)
    }

    fn pop_slot(&mut self) -> Result<Slot> {
        self.stack.pop().ok_or_else(underflow)
    }

    fn resolve(&self, slot: Slot) -> Result<Object> {
        match slot {
            Slot::Value(o) => Ok(o),
            Slot::Memo(idx) => self.memo_get(idx),
        }
    }

    fn pop(&mut self) -> Result<Object> {
        let slot = self.pop_slot()?;
        self.resolve(slot)
    }

    fn top_slot(&self) -> Result<&Slot> {
        self.stack.last().ok_or_else(underflow)
    }

    /// The object on top of the stack, following memo references.
    fn last_mut(&mut self) -> Result<&mut Object> {
        match self.stack.last_mut() {
            Some(Slot::Value(o)) => Ok(o),
            Some(Slot::Memo(idx)) => {
                let idx = *idx;
                self.memo
                    .get_mut(&idx)
                    .ok_or_else(|| DatasetError::format(format!("pickle memo entry {idx} not found")))
            }
            None => Err(underflow()),
        }
    }

    fn push_mark(&mut self) {
        self.marks.push(self.stack.len());
    }

    fn pop_to_marker(&mut self) -> Result<Vec<Object>> {
        let pos = self
            .marks
            .pop()
            .ok_or_else(|| DatasetError::format("pickle mark not found"))?;
        if pos > self.stack.len() {
            return Err(DatasetError::format("pickle mark beyond stack"));
        }
        let slots = self.stack.split_off(pos);
        slots.into_iter().map(|s| self.resolve(s)).collect()
    }

    fn memo_get(&self, idx: u32) -> Result<Object> {
        self.memo
            .get(&idx)
            .cloned()
            .ok_or_else(|| DatasetError::format(format!("pickle memo entry {idx} not found")))
    }

    fn memo_ref(&mut self, idx: u32) -> Result<()> {
        if !self.memo.contains_key(&idx) {
            return Err(DatasetError::format(format!("pickle memo entry {idx} not found")));
        }
        self.push_slot(Slot::Memo(idx));
        Ok(())
    }

    /// Move the top object into the memo and leave a reference in its place.
    fn memo_put(&mut self, idx: u32) -> Result<()> {
        let top = self.stack.last_mut().ok_or_else(underflow)?;
        let value = match std::mem::replace(top, Slot::Memo(idx)) {
            Slot::Value(o) => o,
            Slot::Memo(other) => self.memo_get(other)?,
        };
        self.memo.insert(idx, value);
        Ok(())
    }
}

fn read_to_newline<R: BufRead>(r: &mut R) -> Result<Vec<u8>> {
    let mut data: Vec<u8> = Vec::with_capacity(32);
    r.read_until(b'\n', &mut data)?;
    data.pop();
    if data.last() == Some(&b'\r') {
        data.pop();
    }
    Ok(data)
}

fn buf_to_str(buf: Vec<u8>) -> Result<String> {
    String::from_utf8(buf).map_err(|e| DatasetError::format(format!("invalid UTF-8 in pickle: {e}")))
}

fn read_line_str<R: BufRead>(r: &mut R) -> Result<String> {
    buf_to_str(read_to_newline(r)?)
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
fn read_bytes<R: BufRead>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    r.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("pickle item of {len} bytes truncated after {}", data.len()),
        )
        .into());
    }
    Ok(data)
}

fn read_len<R: BufRead>(r: &mut R, width: u8) -> Result<usize> {
    let len = match width {
        1 => r.read_u8()? as u64,
        4 => r.read_u32::<LittleEndian>()? as u64,
        _ => r.read_u64::<LittleEndian>()?,
    };
    usize::try_from(len).map_err(|_| DatasetError::format("pickle length overflows usize"))
}

/// Little-endian two's complement integer of arbitrary byte length.
fn decode_long(data: &[u8]) -> Result<i64> {
    if data.is_empty() {
        return Ok(0);
    }
    if data.len() > 8 {
        return Err(DatasetError::format(format!(
            "pickle integer of {} bytes does not fit in i64",
            data.len()
        )));
    }
    let mut value = 0i64;
    for (i, &byte) in data.iter().enumerate() {
        value |= (byte as i64) << (i * 8);
    }
    let bits = data.len() * 8;
    if bits < 64 && data[data.len() - 1] & 0x80 != 0 {
        value |= -1i64 << bits;
    }
    Ok(value)
}

fn parse_text_int(s: &str) -> Result<Object> {
    match s {
        "00" => return Ok(Object::Bool(false)),
        "01" => return Ok(Object::Bool(true)),
        _ => {}
    }
    s.trim_end_matches('L')
        .parse::<i64>()
        .map(Object::Int)
        .map_err(|e| DatasetError::format(format!("invalid pickle INT '{s}': {e}")))
}

// ---------------------------------------------------------------------------
// Class reconstruction
// ---------------------------------------------------------------------------

/// Interpret `callable(*args)` for the handful of classes we understand.
fn reduce(callable: Object, args: Object) -> Object {
    let (module_name, name) = match &callable {
        Object::Class { module_name, name } => (module_name.clone(), name.clone()),
        _ => {
            return Object::Reduce {
                callable: Box::new(callable),
                args: Box::new(args),
            }
        }
    };
    let items = match &args {
        Object::Tuple(items) => items.as_slice(),
        _ => &[],
    };

    match (module_name.as_str(), name.as_str(), items) {
        ("datetime", "datetime", [Object::Bytes(b), ..]) => {
            if let Some(s) = datetime_from_bytes(b) {
                return Object::DateTime(s);
            }
        }
        ("datetime", "date", [Object::Bytes(b), ..]) if b.len() >= 4 => {
            let year = u16::from_be_bytes([b[0], b[1]]);
            return Object::DateTime(format!("{year:04}-{:02}-{:02}", b[2], b[3]));
        }
        (m, "_unpickle_timestamp" | "Timestamp", [Object::Int(value), rest @ ..])
            if m.starts_with("pandas") =>
        {
            // Trailing argument on pandas >= 2 is the resolution unit code.
            let nanos = match rest.get(2) {
                Some(Object::Int(7)) => value.saturating_mul(1_000_000_000),
                Some(Object::Int(8)) => value.saturating_mul(1_000_000),
                Some(Object::Int(9)) => value.saturating_mul(1_000),
                _ => *value,
            };
            let aware = !matches!(rest.get(1), None | Some(Object::None));
            let mut s = iso_from_unix_nanos(nanos);
            if aware {
                s.push('Z');
            }
            return Object::DateTime(s);
        }
        ("_codecs", "encode", [Object::String(s), ..]) => {
            // Protocol 2 stores bytes as latin-1 text.
            return Object::Bytes(s.chars().map(|c| c as u32 as u8).collect());
        }
        ("builtins" | "__builtin__", "set" | "frozenset" | "list", [Object::List(v)]) => {
            return Object::List(v.clone());
        }
        ("builtins" | "__builtin__", "set" | "frozenset" | "list", []) => {
            return Object::List(Vec::new());
        }
        ("collections", "OrderedDict", [Object::List(pairs)]) => {
            let dict = pairs
                .iter()
                .filter_map(|p| match p {
                    Object::Tuple(kv) | Object::List(kv) if kv.len() == 2 => {
                        Some((kv[0].clone(), kv[1].clone()))
                    }
                    _ => None,
                })
                .collect();
            return Object::Dict(dict);
        }
        ("collections", "OrderedDict", []) => return Object::Dict(Vec::new()),
        _ => {}
    }

    Object::Reduce {
        callable: Box::new(callable),
        args: Box::new(args),
    }
}

/// Apply `BUILD` (i.e. `__setstate__`) to `obj`.
fn build(obj: Object, state: Object) -> Result<Object> {
    if obj.is_array_reconstruct() {
        return array_from_state(state);
    }
    match obj {
        // OrderedDict and friends: state is a plain update of the dict.
        Object::Dict(mut entries) => {
            if let Object::Dict(extra) = state {
                entries.extend(extra);
            }
            Ok(Object::Dict(entries))
        }
        other => Ok(Object::Build {
            callable: Box::new(other),
            args: Box::new(state),
        }),
    }
}

/// ndarray state: `(version, shape, dtype, is_fortran, rawdata)`.
fn array_from_state(state: Object) -> Result<Object> {
    let Object::Tuple(parts) = state else {
        return Err(DatasetError::format("ndarray state is not a tuple"));
    };
    if parts.len() < 5 {
        return Err(DatasetError::format(format!(
            "ndarray state has {} fields, expected 5",
            parts.len()
        )));
    }
    let mut parts = parts.into_iter();
    let _version = parts.next();
    let shape = match parts.next() {
        Some(Object::Tuple(dims)) => dims
            .into_iter()
            .map(|d| match d {
                Object::Int(n) if n >= 0 => Ok(n as usize),
                other => Err(DatasetError::format(format!(
                    "ndarray shape entry is not a size: {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(DatasetError::format(format!(
                "ndarray shape is not a tuple: {other:?}"
            )))
        }
    };
    // Object arrays pickle their items in C order whatever the memory layout.
    let _dtype = parts.next();
    let _is_fortran = parts.next();
    let items = match parts.next() {
        Some(Object::List(items)) => items,
        Some(Object::Bytes(_)) => {
            return Err(DatasetError::format(
                "ndarray with a numeric dtype nested in an object array is not supported",
            ))
        }
        other => {
            return Err(DatasetError::format(format!(
                "ndarray data is not a list: {other:?}"
            )))
        }
    };
    let expected = checked_len(&shape)?;
    if items.len() != expected {
        return Err(DatasetError::format(format!(
            "ndarray of shape {shape:?} holds {} items",
            items.len()
        )));
    }
    Ok(Object::Array { shape, items })
}

/// Decode the 10-byte payload of `datetime.datetime.__reduce__`.
fn datetime_from_bytes(b: &[u8]) -> Option<String> {
    if b.len() < 10 {
        return None;
    }
    let year = u16::from_be_bytes([b[0], b[1]]);
    let (month, day, hour, minute, second) = (b[2], b[3], b[4], b[5], b[6]);
    let micros = (b[7] as u32) << 16 | (b[8] as u32) << 8 | b[9] as u32;
    let base = format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}");
    Some(if micros == 0 {
        base
    } else {
        format!("{base}.{micros:06}")
    })
}

/// Nanoseconds since the Unix epoch as a naive ISO-8601 string.
pub fn iso_from_unix_nanos(nanos: i64) -> String {
    const NANOS_PER_DAY: i64 = 86_400 * 1_000_000_000;
    let days = nanos.div_euclid(NANOS_PER_DAY);
    let rem = nanos.rem_euclid(NANOS_PER_DAY);
    let secs = rem / 1_000_000_000;
    let sub = rem % 1_000_000_000;

    // Civil-from-days (proleptic Gregorian).
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    let base = format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    if sub == 0 {
        base
    } else if sub % 1000 == 0 {
        format!("{base}.{:06}", sub / 1000)
    } else {
        format!("{base}.{sub:09}")
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Decode one pickle from `r`, stopping at its STOP opcode.
pub fn read_pickle<R: BufRead>(r: &mut R) -> Result<Object> {
    let mut stack = Stack::default();
    loop {
        let code = r.read_u8()?;
        let op = OpCode::try_from(code).map_err(|c| {
            DatasetError::format(format!(
                "invalid pickle opcode 0x{c:02x}; the file may be corrupted"
            ))
        })?;

        match op {
            OpCode::Proto => {
                let version = r.read_u8()?;
                if !(2..=5).contains(&version) {
                    return Err(DatasetError::format(format!(
                        "unsupported pickle protocol {version}, expected 2-5"
                    )));
                }
            }
            OpCode::Frame => {
                r.read_u64::<LittleEndian>()?;
            }
            OpCode::Stop => {
                return match stack.pop_slot()? {
                    Slot::Value(o) => Ok(o),
                    Slot::Memo(idx) => stack.memo.remove(&idx).ok_or_else(|| {
                        DatasetError::format(format!("pickle memo entry {idx} not found"))
                    }),
                }
            }
            OpCode::Mark => stack.push_mark(),
            OpCode::Pop => {
                stack.pop()?;
            }
            OpCode::PopMark => {
                stack.pop_to_marker()?;
            }
            OpCode::Dup => {
                let top = stack.top_slot()?.clone();
                stack.push_slot(top);
            }
            OpCode::None => stack.push(Object::None),
            OpCode::NewTrue => stack.push(Object::Bool(true)),
            OpCode::NewFalse => stack.push(Object::Bool(false)),
            OpCode::Int | OpCode::Long => {
                let line = read_line_str(r)?;
                stack.push(parse_text_int(&line)?);
            }
            OpCode::BinInt => stack.push(Object::Int(r.read_i32::<LittleEndian>()? as i64)),
            OpCode::BinInt1 => stack.push(Object::Int(r.read_u8()? as i64)),
            OpCode::BinInt2 => stack.push(Object::Int(r.read_u16::<LittleEndian>()? as i64)),
            OpCode::Long1 => {
                let len = read_len(r, 1)?;
                stack.push(Object::Int(decode_long(&read_bytes(r, len)?)?));
            }
            OpCode::Long4 => {
                let len = read_len(r, 4)?;
                stack.push(Object::Int(decode_long(&read_bytes(r, len)?)?));
            }
            OpCode::Float => {
                let line = read_line_str(r)?;
                let v = line
                    .parse::<f64>()
                    .map_err(|e| DatasetError::format(format!("invalid pickle FLOAT '{line}': {e}")))?;
                stack.push(Object::Float(v));
            }
            // Python's BINFLOAT is big-endian.
            OpCode::BinFloat => stack.push(Object::Float(r.read_f64::<BigEndian>()?)),
            OpCode::ShortBinUnicode => {
                let len = read_len(r, 1)?;
                stack.push(Object::String(buf_to_str(read_bytes(r, len)?)?));
            }
            OpCode::BinUnicode => {
                let len = read_len(r, 4)?;
                stack.push(Object::String(buf_to_str(read_bytes(r, len)?)?));
            }
            OpCode::BinUnicode8 => {
                let len = read_len(r, 8)?;
                stack.push(Object::String(buf_to_str(read_bytes(r, len)?)?));
            }
            // Python 2 str; numpy writes these as latin-1 compatible text.
            OpCode::ShortBinString | OpCode::BinString => {
                let width = if op == OpCode::ShortBinString { 1 } else { 4 };
                let len = read_len(r, width)?;
                let data = read_bytes(r, len)?;
                stack.push(Object::String(data.into_iter().map(char::from).collect()));
            }
            OpCode::ShortBinBytes | OpCode::BinBytes | OpCode::BinBytes8 | OpCode::ByteArray8 => {
                let width = match op {
                    OpCode::ShortBinBytes => 1,
                    OpCode::BinBytes => 4,
                    _ => 8,
                };
                let len = read_len(r, width)?;
                stack.push(Object::Bytes(read_bytes(r, len)?));
            }
            OpCode::EmptyTuple => stack.push(Object::Tuple(Vec::new())),
            OpCode::Tuple => {
                let items = stack.pop_to_marker()?;
                stack.push(Object::Tuple(items));
            }
            OpCode::Tuple1 => {
                let a = stack.pop()?;
                stack.push(Object::Tuple(vec![a]));
            }
            OpCode::Tuple2 => {
                let b = stack.pop()?;
                let a = stack.pop()?;
                stack.push(Object::Tuple(vec![a, b]));
            }
            OpCode::Tuple3 => {
                let c = stack.pop()?;
                let b = stack.pop()?;
                let a = stack.pop()?;
                stack.push(Object::Tuple(vec![a, b, c]));
            }
            OpCode::EmptyList | OpCode::EmptySet => stack.push(Object::List(Vec::new())),
            OpCode::List | OpCode::FrozenSet => {
                let items = stack.pop_to_marker()?;
                stack.push(Object::List(items));
            }
            OpCode::Append => {
                let value = stack.pop()?;
                match stack.last_mut()? {
                    Object::List(items) => items.push(value),
                    other => {
                        return Err(DatasetError::format(format!(
                            "APPEND on non-list {other:?}"
                        )))
                    }
                }
            }
            OpCode::Appends | OpCode::AddItems => {
                let values = stack.pop_to_marker()?;
                match stack.last_mut()? {
                    Object::List(items) => items.extend(values),
                    other => {
                        return Err(DatasetError::format(format!(
                            "APPENDS on non-list {other:?}"
                        )))
                    }
                }
            }
            OpCode::EmptyDict => stack.push(Object::Dict(Vec::new())),
            OpCode::Dict => {
                let items = stack.pop_to_marker()?;
                stack.push(Object::Dict(pairs(items)?));
            }
            OpCode::SetItem => {
                let value = stack.pop()?;
                let key = stack.pop()?;
                match stack.last_mut()? {
                    Object::Dict(entries) => entries.push((key, value)),
                    other => {
                        return Err(DatasetError::format(format!(
                            "SETITEM on non-dict {other:?}"
                        )))
                    }
                }
            }
            OpCode::SetItems => {
                let items = stack.pop_to_marker()?;
                let new_pairs = pairs(items)?;
                match stack.last_mut()? {
                    Object::Dict(entries) => entries.extend(new_pairs),
                    other => {
                        return Err(DatasetError::format(format!(
                            "SETITEMS on non-dict {other:?}"
                        )))
                    }
                }
            }
            OpCode::Global => {
                let module_name = read_line_str(r)?;
                let name = read_line_str(r)?;
                stack.push(Object::Class { module_name, name });
            }
            OpCode::StackGlobal => {
                let name = stack.pop()?;
                let module_name = stack.pop()?;
                match (module_name, name) {
                    (Object::String(module_name), Object::String(name)) => {
                        stack.push(Object::Class { module_name, name })
                    }
                    (m, n) => {
                        return Err(DatasetError::format(format!(
                            "STACK_GLOBAL expects two strings, got {m:?} and {n:?}"
                        )))
                    }
                }
            }
            OpCode::Reduce | OpCode::NewObj => {
                let args = stack.pop()?;
                let callable = stack.pop()?;
                stack.push(reduce(callable, args));
            }
            OpCode::NewObjEx => {
                let _kwargs = stack.pop()?;
                let args = stack.pop()?;
                let callable = stack.pop()?;
                stack.push(reduce(callable, args));
            }
            OpCode::Build => {
                let state = stack.pop()?;
                match stack.pop_slot()? {
                    Slot::Memo(idx) => {
                        let built = build(stack.memo_get(idx)?, state)?;
                        stack.memo.insert(idx, built);
                        stack.push_slot(Slot::Memo(idx));
                    }
                    Slot::Value(obj) => stack.push(build(obj, state)?),
                }
            }
            OpCode::Put => {
                let line = read_line_str(r)?;
                let idx = line
                    .parse::<u32>()
                    .map_err(|e| DatasetError::format(format!("invalid PUT index '{line}': {e}")))?;
                stack.memo_put(idx)?;
            }
            OpCode::BinPut => {
                let idx = r.read_u8()? as u32;
                stack.memo_put(idx)?;
            }
            OpCode::LongBinPut => {
                let idx = r.read_u32::<LittleEndian>()?;
                stack.memo_put(idx)?;
            }
            OpCode::Memoize => {
                let idx = stack.memo.len() as u32;
                stack.memo_put(idx)?;
            }
            OpCode::Get => {
                let line = read_line_str(r)?;
                let idx = line
                    .parse::<u32>()
                    .map_err(|e| DatasetError::format(format!("invalid GET index '{line}': {e}")))?;
                stack.memo_ref(idx)?;
            }
            OpCode::BinGet => {
                let idx = r.read_u8()? as u32;
                stack.memo_ref(idx)?;
            }
            OpCode::LongBinGet => {
                let idx = r.read_u32::<LittleEndian>()?;
                stack.memo_ref(idx)?;
            }
        }
    }
}

fn pairs(items: Vec<Object>) -> Result<Vec<(Object, Object)>> {
    if items.len() % 2 != 0 {
        return Err(DatasetError::format("odd number of items for dict"));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        out.push((k, v));
    }
    Ok(out)
}
