//! Per-pool configuration overrides and their persisted textual form.
//!
//! An [`OverrideMap`] travels as a single string value
//! (`HexAsciiSerializedMap[<hex>]`) wherever configuration has room for
//! only one field. The hex payload is a versioned, length-prefixed binary
//! layout:
//!
//! ```text
//! payload := version:u8 body
//! body    := count:u32 (key value)*
//! key     := len:u32 utf8
//! value   := 0x00 len:u32 utf8      string
//!          | 0x01 i64               integer
//!          | 0x02 f64               float (IEEE 754 bits)
//!          | 0x03 u8                bool
//!          | 0x04 body              nested map
//! ```
//!
//! All integers are big-endian.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

/// Literal prefix of every envelope.
pub const HEADER: &str = "HexAsciiSerializedMap";

/// Payload layout version written by [`encode`].
pub const FORMAT_VERSION: u8 = 1;

/// Deepest nesting of maps accepted in either direction.
pub const MAX_DEPTH: usize = 32;

const TAG_STRING: u8 = 0x00;
const TAG_INTEGER: u8 = 0x01;
const TAG_FLOAT: u8 = 0x02;
const TAG_BOOL: u8 = 0x03;
const TAG_MAP: u8 = 0x04;

// ---------------------------------------------------------------------------
// OverrideValue / OverrideMap
// ---------------------------------------------------------------------------

/// A single override value.
///
/// Floats compare by bit pattern, so `NaN` equals itself and `0.0` differs
/// from `-0.0`. That keeps decoded maps equal to the maps they came from.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(untagged)
)]
pub enum OverrideValue {
    /// Boolean flag.
    Bool(bool),
    /// Whole number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    String(String),
    /// Nested group of overrides, e.g. per-user settings.
    Map(OverrideMap),
}

impl OverrideValue {
    /// Borrow the value as text, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the value as a nested map, if it is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&OverrideMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl PartialEq for OverrideValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for OverrideValue {}

impl From<&str> for OverrideValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for OverrideValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for OverrideValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for OverrideValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for OverrideValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for OverrideValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<OverrideMap> for OverrideValue {
    fn from(value: OverrideMap) -> Self {
        Self::Map(value)
    }
}

/// Read-only, key-ordered map of overrides.
///
/// There is no way to mutate a map once built; decoded maps are handed out
/// as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct OverrideMap {
    entries: BTreeMap<String, OverrideValue>,
}

impl OverrideMap {
    /// The empty map ("no overrides configured").
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used while constructing a map.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OverrideValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Look up an override.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OverrideValue> {
        self.entries.get(key)
    }

    /// Whether `key` is overridden.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of top-level overrides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no overrides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OverrideValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<BTreeMap<String, OverrideValue>> for OverrideMap {
    fn from(entries: BTreeMap<String, OverrideValue>) -> Self {
        Self { entries }
    }
}

impl<K, V> FromIterator<(K, V)> for OverrideMap
where
    K: Into<String>,
    V: Into<OverrideValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

/// Render `map` as a `HexAsciiSerializedMap[...]` envelope.
///
/// # Errors
///
/// [`Error::Encoding`] when the map nests deeper than [`MAX_DEPTH`] or a
/// length does not fit the layout's `u32` prefixes.
pub fn encode(map: &OverrideMap) -> Result<String> {
    let mut buf = BytesMut::new();
    buf.put_u8(FORMAT_VERSION);
    write_map(&mut buf, map, 0)?;

    let payload = hex::encode(&buf);
    let mut out = String::with_capacity(HEADER.len() + payload.len() + 2);
    out.push_str(HEADER);
    out.push('[');
    out.push_str(&payload);
    out.push(']');
    Ok(out)
}

fn write_map(buf: &mut BytesMut, map: &OverrideMap, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::encoding(format!(
            "overrides nest deeper than {MAX_DEPTH} levels"
        )));
    }
    buf.put_u32(prefix_len(map.len(), "entry count")?);
    for (key, value) in map.iter() {
        write_str(buf, key)?;
        write_value(buf, value, depth)?;
    }
    Ok(())
}

fn write_value(buf: &mut BytesMut, value: &OverrideValue, depth: usize) -> Result<()> {
    match value {
        OverrideValue::String(s) => {
            buf.put_u8(TAG_STRING);
            write_str(buf, s)?;
        }
        OverrideValue::Integer(i) => {
            buf.put_u8(TAG_INTEGER);
            buf.put_i64(*i);
        }
        OverrideValue::Float(f) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_f64(*f);
        }
        OverrideValue::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*b));
        }
        OverrideValue::Map(m) => {
            buf.put_u8(TAG_MAP);
            write_map(buf, m, depth + 1)?;
        }
    }
    Ok(())
}

fn write_str(buf: &mut BytesMut, s: &str) -> Result<()> {
    buf.put_u32(prefix_len(s.len(), "string length")?);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn prefix_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::encoding(format!("{what} {len} does not fit in u32")))
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// Parse an envelope produced by [`encode`]. `None` means "no overrides".
///
/// # Errors
///
/// - [`Error::Decoding`] when the text is not exactly `HEADER[<hex>]` or the
///   hex is invalid.
/// - [`Error::Deserialization`] when the payload is not a valid map: unknown
///   version or type tag, truncation, bad UTF-8, duplicate keys, excessive
///   nesting or trailing bytes.
pub fn decode(envelope: Option<&str>) -> Result<OverrideMap> {
    let Some(envelope) = envelope else {
        return Ok(OverrideMap::new());
    };

    let payload = envelope
        .strip_prefix(HEADER)
        .and_then(|rest| rest.strip_prefix('['))
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| Error::decoding(format!("expected `{HEADER}[<hex>]`")))?;

    let bytes =
        hex::decode(payload).map_err(|e| Error::decoding(format!("invalid hex payload: {e}")))?;
    let mut buf = bytes.as_slice();

    let version = take_u8(&mut buf)?;
    if version != FORMAT_VERSION {
        return Err(Error::deserialization(format!(
            "unsupported payload version {version}"
        )));
    }

    let map = read_map(&mut buf, 0)?;
    if buf.has_remaining() {
        return Err(Error::deserialization(format!(
            "{} trailing bytes after map",
            buf.remaining()
        )));
    }
    Ok(map)
}

fn read_map(buf: &mut &[u8], depth: usize) -> Result<OverrideMap> {
    if depth > MAX_DEPTH {
        return Err(Error::deserialization(format!(
            "map nests deeper than {MAX_DEPTH} levels"
        )));
    }
    let count = take_u32(buf)?;
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let key = read_str(buf)?;
        let value = read_value(buf, depth)?;
        if entries.insert(key.clone(), value).is_some() {
            return Err(Error::deserialization(format!("duplicate key '{key}'")));
        }
    }
    Ok(OverrideMap { entries })
}

fn read_value(buf: &mut &[u8], depth: usize) -> Result<OverrideValue> {
    let value = match take_u8(buf)? {
        TAG_STRING => OverrideValue::String(read_str(buf)?),
        TAG_INTEGER => {
            ensure(buf, 8)?;
            OverrideValue::Integer(buf.get_i64())
        }
        TAG_FLOAT => {
            ensure(buf, 8)?;
            OverrideValue::Float(buf.get_f64())
        }
        TAG_BOOL => match take_u8(buf)? {
            0 => OverrideValue::Bool(false),
            1 => OverrideValue::Bool(true),
            other => {
                return Err(Error::deserialization(format!(
                    "invalid bool byte {other:#04x}"
                )));
            }
        },
        TAG_MAP => OverrideValue::Map(read_map(buf, depth + 1)?),
        other => {
            return Err(Error::deserialization(format!(
                "unknown value type tag {other:#04x}"
            )));
        }
    };
    Ok(value)
}

fn read_str(buf: &mut &[u8]) -> Result<String> {
    let len = take_u32(buf)? as usize;
    ensure(buf, len)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| Error::deserialization(format!("string is not UTF-8: {e}")))
}

fn take_u8(buf: &mut &[u8]) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

fn ensure(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(Error::deserialization(format!(
            "payload truncated: needed {needed} bytes, {} left",
            buf.len()
        )));
    }
    Ok(())
}
