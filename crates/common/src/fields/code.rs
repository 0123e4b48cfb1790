use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{decode_field, to_storage_string, FieldShape, FieldSource};

pub const DEFAULT_CODE_LANGUAGE: &str = "javascript";

/// The code snippet attached to a document.
///
/// Keys other than `language` and `value` are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeSnippet {
    pub language: String,
    pub value: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CodeSnippet {
    fn default() -> Self {
        Self { language: DEFAULT_CODE_LANGUAGE.to_owned(), value: String::new(), extra: Map::new() }
    }
}

impl CodeSnippet {
    pub fn new(language: impl Into<String>, value: impl Into<String>) -> Self {
        Self { language: language.into(), value: value.into(), extra: Map::new() }
    }

    /// Decode a code column; non-objects and malformed objects become the default.
    pub fn decode<'a>(source: impl Into<FieldSource<'a>>) -> Self {
        match FieldShape::from(decode_field(source.into(), Value::Null)) {
            FieldShape::Object(map) => serde_json::from_value(Value::Object(map)).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// Encode a request value for storage, defaulting when it is absent.
    pub fn encode_value(value: Option<&Value>) -> String {
        to_storage_string(value, Some(&Self::default()))
    }

    pub fn to_storage_string(&self) -> String {
        to_storage_string(Some(self), Some(&Self::default()))
    }
}
