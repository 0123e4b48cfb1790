// String-column encoding for structured document fields.
//
// tags, blocks and code live in TEXT columns as single-encoded JSON. Older
// writers sometimes encoded a value twice, so reads repair one layer of
// nesting and fall back to a per-field default instead of failing.

mod code;
mod tags;

use serde::Serialize;
use serde_json::{Map, Value};

pub use code::{CodeSnippet, DEFAULT_CODE_LANGUAGE};
pub use tags::{split_legacy_tags, TagsField};

const JSON_NULL: &str = "null";

/// Upper bound on nested string layers peeled by [`repair_decode`].
const MAX_REPAIR_DEPTH: usize = 8;

/// A structured field as it reaches the decoder.
///
/// Column reads are always `Null` or `Stored`; request payloads may hand over
/// a value that is already decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldSource<'a> {
    Null,
    Stored(&'a str),
    Decoded(&'a Value),
}

impl<'a> From<Option<&'a str>> for FieldSource<'a> {
    fn from(raw: Option<&'a str>) -> Self {
        raw.map_or(Self::Null, Self::Stored)
    }
}

impl<'a> From<&'a str> for FieldSource<'a> {
    fn from(raw: &'a str) -> Self {
        Self::Stored(raw)
    }
}

impl<'a> From<&'a Value> for FieldSource<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(raw) => Self::Stored(raw),
            other => Self::Decoded(other),
        }
    }
}

/// Shape of a decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldShape {
    Absent,
    List(Vec<Value>),
    Object(Map<String, Value>),
    Text(String),
    Scalar(Value),
}

impl From<Value> for FieldShape {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Absent,
            Value::Array(items) => Self::List(items),
            Value::Object(map) => Self::Object(map),
            Value::String(text) => Self::Text(text),
            scalar => Self::Scalar(scalar),
        }
    }
}

/// Which column a canonical rewrite targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Tags,
    Blocks,
    Code,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Tags | Self::Blocks => value.is_array(),
            Self::Code => value.is_object(),
        }
    }
}

/// Serialize `value` (or `fallback` when absent) for a TEXT column.
///
/// Never fails: if serialization errors, the fallback is encoded instead, and
/// `null` if there is no usable fallback either.
pub fn to_storage_string<V, F>(value: Option<&V>, fallback: Option<&F>) -> String
where
    V: Serialize + ?Sized,
    F: Serialize + ?Sized,
{
    let encoded = match value {
        Some(value) => serde_json::to_string(value),
        None => encode_fallback(fallback),
    };

    encoded.unwrap_or_else(|_| encode_fallback(fallback).unwrap_or_else(|_| JSON_NULL.to_owned()))
}

fn encode_fallback<F>(fallback: Option<&F>) -> serde_json::Result<String>
where
    F: Serialize + ?Sized,
{
    match fallback {
        Some(fallback) => serde_json::to_string(fallback),
        None => Ok(JSON_NULL.to_owned()),
    }
}

/// Decode a TEXT column value, returning `fallback` when it is missing,
/// empty or not JSON.
pub fn from_storage_string(raw: Option<&str>, fallback: Value) -> Value {
    decode_field(FieldSource::from(raw), fallback)
}

/// Decode any [`FieldSource`], repairing one layer of double encoding.
pub fn decode_field(source: FieldSource<'_>, fallback: Value) -> Value {
    match source {
        FieldSource::Null => fallback,
        FieldSource::Decoded(value) => value.clone(),
        FieldSource::Stored("") => fallback,
        FieldSource::Stored(raw) => decode_stored(raw).unwrap_or(fallback),
    }
}

/// Parse once, then try once more if the first parse produced a string.
fn decode_stored(raw: &str) -> serde_json::Result<Value> {
    match serde_json::from_str::<Value>(raw)? {
        Value::String(inner) => Ok(serde_json::from_str(&inner).unwrap_or(Value::String(inner))),
        value => Ok(value),
    }
}

/// Peel every nested string layer from a stored value.
///
/// Used by offline maintenance, which collapses double and deeper encodings
/// that the per-request decoder only partly unwraps.
pub fn repair_decode(raw: &str) -> Option<Value> {
    let mut value: Value = serde_json::from_str(raw).ok()?;
    for _ in 0..MAX_REPAIR_DEPTH {
        let Value::String(inner) = &value else { break };
        match serde_json::from_str::<Value>(inner) {
            Ok(next) => value = next,
            Err(_) => break,
        }
    }
    Some(value)
}

/// The canonical single-encoded text for `stored`, if it differs from it.
///
/// Returns `None` when the column is already canonical or when its repaired
/// value does not have the shape `kind` expects, in which case the stored
/// text is left for the forgiving read path.
pub fn canonical_rewrite(kind: FieldKind, stored: Option<&str>) -> Option<String> {
    let stored = stored?;
    let value = repair_decode(stored)?;
    if !kind.accepts(&value) {
        return None;
    }

    let canonical = to_storage_string(Some(&value), None::<&Value>);
    (canonical != stored).then_some(canonical)
}

/// Decode a blocks column; anything but an array becomes empty.
pub fn decode_blocks<'a>(source: impl Into<FieldSource<'a>>) -> Vec<Value> {
    match FieldShape::from(decode_field(source.into(), Value::Array(Vec::new()))) {
        FieldShape::List(blocks) => blocks,
        _ => Vec::new(),
    }
}

/// Encode a blocks value, defaulting to an empty array.
pub fn encode_blocks(value: Option<&Value>) -> String {
    to_storage_string(value, Some(&Value::Array(Vec::new())))
}

/// Encode a tags value, defaulting to an empty array.
pub fn encode_tags(value: Option<&Value>) -> String {
    to_storage_string(value, Some(&Value::Array(Vec::new())))
}
