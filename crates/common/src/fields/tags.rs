use serde_json::Value;

use super::{decode_stored, FieldShape, FieldSource};

/// A tags column after decoding.
///
/// Tags written before structured storage existed are free text such as
/// `"rust, cli；notes"`; they surface as `LegacyText` and are split on read.
#[derive(Debug, Clone, PartialEq)]
pub enum TagsField {
    List(Vec<Value>),
    LegacyText(String),
    Empty,
}

impl TagsField {
    pub fn decode<'a>(source: impl Into<FieldSource<'a>>) -> Self {
        match source.into() {
            FieldSource::Null | FieldSource::Stored("") => Self::Empty,
            FieldSource::Decoded(value) => Self::from_shape(FieldShape::from(value.clone())),
            FieldSource::Stored(raw) => match decode_stored(raw) {
                Ok(value) => Self::from_shape(FieldShape::from(value)),
                Err(_) => Self::LegacyText(raw.to_owned()),
            },
        }
    }

    fn from_shape(shape: FieldShape) -> Self {
        match shape {
            FieldShape::List(items) => Self::List(items),
            FieldShape::Text(text) => Self::LegacyText(text),
            FieldShape::Absent | FieldShape::Object(_) | FieldShape::Scalar(_) => Self::Empty,
        }
    }

    pub fn into_tags(self) -> Vec<String> {
        match self {
            Self::List(items) => items.into_iter().filter_map(tag_text).collect(),
            Self::LegacyText(text) => split_legacy_tags(&text),
            Self::Empty => Vec::new(),
        }
    }
}

fn tag_text(item: Value) -> Option<String> {
    match item {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Split free-text tags on whitespace and ASCII or full-width `,` `;`.
///
/// Leftover brackets and quotes from half-encoded arrays act as separators.
pub fn split_legacy_tags(text: &str) -> Vec<String> {
    text.split(|c: char| {
        c.is_whitespace() || matches!(c, '[' | ']' | '"' | ',' | '，' | ';' | '；')
    })
    .filter(|token| !token.is_empty())
    .map(str::to_owned)
    .collect()
}
