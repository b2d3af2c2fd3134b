//! Named statistics: decoding of `kstat_named_t` records.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::backend::{Backend, RawNamed};
use crate::kstat::Kstat;
use crate::raw::{extract_fixed_bytes, extract_fixed_string};

/// Type tag of a named statistic (`data_type` of `kstat_named_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DataType(pub u8);

impl DataType {
    /// Up to 16 bytes inline, usually a short string.
    pub const CHAR: DataType = DataType(0);
    pub const INT32: DataType = DataType(1);
    pub const UINT32: DataType = DataType(2);
    pub const INT64: DataType = DataType(3);
    pub const UINT64: DataType = DataType(4);
    // 5 and 6 are KSTAT_DATA_FLOAT/DOUBLE, long obsolete.
    /// Out-of-line, zero-terminated string.
    pub const STRING: DataType = DataType(9);

    /// Canonical short name, as used by kstat(1).
    pub fn label(self) -> Option<&'static str> {
        match self {
            DataType::CHAR => Some("char"),
            DataType::INT32 => Some("int32"),
            DataType::UINT32 => Some("uint32"),
            DataType::INT64 => Some("int64"),
            DataType::UINT64 => Some("uint64"),
            DataType::STRING => Some("string"),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(label),
            None => write!(f, "type-{}", self.0),
        }
    }
}

/// Decoded value of a named statistic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NamedValue {
    /// `CHAR` and `STRING` records holding valid UTF-8.
    String(String),
    /// `CHAR` and `STRING` records that are not valid UTF-8, byte for byte.
    Bytes(Vec<u8>),
    /// `INT32` and `INT64` records.
    Int(i64),
    /// `UINT32` and `UINT64` records.
    Uint(u64),
}

impl NamedValue {
    /// Decodes the value union of `raw` according to its type tag.
    ///
    /// # Panics
    ///
    /// Panics on a tag outside the supported set. That means the backend
    /// returned a record shape this crate does not know, not a user error.
    pub fn decode(raw: &RawNamed<'_>) -> NamedValue {
        let v = &raw.value;
        match DataType(raw.data_type) {
            DataType::CHAR => NamedValue::text(extract_fixed_bytes(v)),
            DataType::STRING => NamedValue::text(raw.string.unwrap_or_default()),
            DataType::INT32 => {
                NamedValue::Int(i32::from_ne_bytes([v[0], v[1], v[2], v[3]]) as i64)
            }
            DataType::INT64 => NamedValue::Int(i64::from_ne_bytes(first8(v))),
            DataType::UINT32 => {
                NamedValue::Uint(u32::from_ne_bytes([v[0], v[1], v[2], v[3]]) as u64)
            }
            DataType::UINT64 => NamedValue::Uint(u64::from_ne_bytes(first8(v))),
            other => panic!(
                "unknown kstat named data type {} for '{}'",
                other,
                extract_fixed_string(raw.name)
            ),
        }
    }

    /// String if `bytes` is valid UTF-8, otherwise the bytes unchanged.
    fn text(bytes: &[u8]) -> NamedValue {
        match std::str::from_utf8(bytes) {
            Ok(s) => NamedValue::String(s.to_string()),
            Err(_) => NamedValue::Bytes(bytes.to_vec()),
        }
    }
}

fn first8(v: &[u8; 16]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&v[..8]);
    out
}

/// One named statistic, `module:instance:name:statistic`, and its value
/// as of the owning kstat's snapshot.
///
/// Built fresh on every lookup; never cached.
pub struct Named<B: Backend> {
    pub name: String,
    pub data_type: DataType,
    pub value: NamedValue,
    /// Snapshot time of the kstat data this was decoded from.
    pub snaptime: i64,
    /// The kstat this statistic belongs to.
    pub kstat: Rc<Kstat<B>>,
}

impl<B: Backend> Named<B> {
    pub(crate) fn from_raw(kstat: &Rc<Kstat<B>>, raw: &RawNamed<'_>, snaptime: i64) -> Self {
        let value = NamedValue::decode(raw);
        let name = extract_fixed_string(raw.name);
        tracing::trace!(kstat = %kstat, stat = %name, "decoded named record");
        Self {
            name,
            data_type: DataType(raw.data_type),
            value,
            snaptime,
            kstat: Rc::clone(kstat),
        }
    }

    /// String value, or `""` for numeric statistics.
    ///
    /// Bytes that are not valid UTF-8 show up as U+FFFD here; use
    /// [`bytes_val`](Self::bytes_val) for the exact contents.
    pub fn string_val(&self) -> Cow<'_, str> {
        match &self.value {
            NamedValue::String(s) => Cow::Borrowed(s),
            NamedValue::Bytes(b) => String::from_utf8_lossy(b),
            _ => Cow::Borrowed(""),
        }
    }

    /// Exact bytes of a string statistic, empty for numeric ones.
    pub fn bytes_val(&self) -> &[u8] {
        match &self.value {
            NamedValue::String(s) => s.as_bytes(),
            NamedValue::Bytes(b) => b,
            _ => &[],
        }
    }

    /// Signed value, or 0 for other statistics.
    pub fn int_val(&self) -> i64 {
        match self.value {
            NamedValue::Int(v) => v,
            _ => 0,
        }
    }

    /// Unsigned value, or 0 for other statistics.
    pub fn uint_val(&self) -> u64 {
        match self.value {
            NamedValue::Uint(v) => v,
            _ => 0,
        }
    }
}

impl<B: Backend> fmt::Display for Named<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.kstat.module(),
            self.kstat.instance(),
            self.kstat.name(),
            self.name
        )
    }
}

impl<B: Backend> fmt::Debug for Named<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Named")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("value", &self.value)
            .field("snaptime", &self.snaptime)
            .field("kstat", &self.kstat.to_string())
            .finish()
    }
}
