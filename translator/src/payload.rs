//! Decoding of raw inbound bytes into a generic key/value tree.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content type a plugin expects on its inbound route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Json,
    Xml,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("invalid XML: {0}")]
    Xml(String),
}

/// Deepest element nesting accepted in an XML payload, matching serde_json's
/// recursion limit for JSON.
pub const MAX_XML_DEPTH: usize = 128;

pub fn decode(format: PayloadFormat, raw: &[u8]) -> Result<Value, DecodeError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    match format {
        PayloadFormat::Json => {
            serde_json::from_slice(raw).map_err(|e| DecodeError::Json(e.to_string()))
        }
        PayloadFormat::Xml => {
            let text = std::str::from_utf8(raw)?;
            check_xml_depth(text)?;
            let document =
                roxmltree::Document::parse(text).map_err(|e| DecodeError::Xml(e.to_string()))?;
            Ok(element_to_value(document.root_element()))
        }
    }
}

/// Rejects documents nested deeper than [`MAX_XML_DEPTH`] without building a
/// tree. The XML parser recurses per level, so this runs before it.
///
/// Only tag structure is counted. Comments, CDATA, processing instructions and
/// quoted attribute values are skipped; anything malformed is left for the
/// parser to report.
pub(crate) fn check_xml_depth(text: &str) -> Result<(), DecodeError> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut pos = 0;

    while let Some(offset) = bytes[pos..].iter().position(|&b| b == b'<') {
        let start = pos + offset;
        let rest = &bytes[start..];

        pos = if rest.starts_with(b"<!--") {
            skip_past(bytes, start + 4, b"-->")
        } else if rest.starts_with(b"<![CDATA[") {
            skip_past(bytes, start + 9, b"]]>")
        } else if rest.starts_with(b"<?") {
            skip_past(bytes, start + 2, b"?>")
        } else if rest.starts_with(b"<!") {
            skip_tag(bytes, start + 2)
        } else if rest.starts_with(b"</") {
            depth = depth.saturating_sub(1);
            skip_tag(bytes, start + 2)
        } else {
            let end = skip_tag(bytes, start + 1);
            let self_closing = end >= 2 && bytes[end - 1] == b'>' && bytes[end - 2] == b'/';
            if !self_closing {
                depth += 1;
                if depth > MAX_XML_DEPTH {
                    return Err(DecodeError::Xml(format!(
                        "nesting too deep (limit {MAX_XML_DEPTH})"
                    )));
                }
            }
            end
        };
    }
    Ok(())
}

/// Index just after the next `pattern` at or after `from`, or the end of input.
fn skip_past(bytes: &[u8], from: usize, pattern: &[u8]) -> usize {
    bytes[from..]
        .windows(pattern.len())
        .position(|w| w == pattern)
        .map_or(bytes.len(), |i| from + i + pattern.len())
}

/// Index just after the `>` closing a tag, honouring quoted attribute values.
fn skip_tag(bytes: &[u8], from: usize) -> usize {
    let mut quote = None;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return i + 1,
            (None, _) => {}
        }
    }
    bytes.len()
}

/// Converts an XML element into a JSON-like tree.
///
/// Child elements become keys (repeated siblings collapse into an array),
/// attributes become `@name` keys, and a leaf becomes its trimmed text, or null
/// when empty. Mixed text next to child elements is kept under `#text`.
fn element_to_value(node: roxmltree::Node<'_, '_>) -> Value {
    let mut object = Map::new();

    for attribute in node.attributes() {
        object.insert(
            format!("@{}", attribute.name()),
            Value::String(attribute.value().to_string()),
        );
    }

    let mut has_children = false;
    for child in node.children().filter(|c| c.is_element()) {
        has_children = true;
        let name = child.tag_name().name().to_string();
        let value = element_to_value(child);

        match object.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(name, value);
            }
        }
    }

    let text: String = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect();
    let text = text.trim();

    if !has_children && object.is_empty() {
        return if text.is_empty() {
            Value::Null
        } else {
            Value::String(text.to_string())
        };
    }

    if !text.is_empty() {
        object.insert("#text".to_string(), Value::String(text.to_string()));
    }
    Value::Object(object)
}
