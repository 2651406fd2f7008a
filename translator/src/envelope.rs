//! XML envelope sent downstream.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <RGBridgeMessage><PmsCode>samplepms</PmsCode><Name>Alice</Name><RoomNumber/></RGBridgeMessage>
//! ```
//!
//! Element names are taken verbatim from the mapping targets. A target name
//! that is not a valid XML name yields a document the receiver cannot parse.
use crate::payload::{DecodeError, check_xml_depth};
use crate::types::TranslatedResult;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt::Write;

pub const ROOT_ELEMENT: &str = "RGBridgeMessage";
pub const SOURCE_ELEMENT: &str = "PmsCode";

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

pub fn encode(identifier: &str, result: &TranslatedResult) -> Vec<u8> {
    let mut xml = String::with_capacity(128 + result.len() * 32);
    xml.push_str(DECLARATION);
    xml.push('<');
    xml.push_str(ROOT_ELEMENT);
    xml.push('>');

    push_element(&mut xml, SOURCE_ELEMENT, Some(identifier));
    for (name, value) in result {
        push_element(&mut xml, name, text_of(value).as_deref());
    }

    let _ = write!(xml, "</{ROOT_ELEMENT}>");
    xml.into_bytes()
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Compound values resolved by a flat mapping entry travel as JSON text.
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn push_element(xml: &mut String, name: &str, text: Option<&str>) {
    match text {
        None => {
            let _ = write!(xml, "<{name}/>");
        }
        Some(text) => {
            let _ = write!(xml, "<{name}>");
            escape_into(xml, text);
            let _ = write!(xml, "</{name}>");
        }
    }
}

fn escape_into(xml: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => xml.push_str("&amp;"),
            '<' => xml.push_str("&lt;"),
            '>' => xml.push_str("&gt;"),
            '"' => xml.push_str("&quot;"),
            '\'' => xml.push_str("&apos;"),
            c => xml.push(c),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EnvelopeError {
    #[error("envelope is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("envelope is not well-formed XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("unexpected root element '{0}'")]
    UnexpectedRoot(String),
    #[error("envelope has no leading {SOURCE_ELEMENT} element")]
    MissingSource,
    #[error("envelope rejected: {0}")]
    Nesting(#[from] DecodeError),
}

/// An envelope read back into its parts. Empty elements decode to `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedEnvelope {
    pub source: String,
    pub fields: IndexMap<String, Option<String>>,
}

pub fn decode(bytes: &[u8]) -> Result<DecodedEnvelope, EnvelopeError> {
    let text = std::str::from_utf8(bytes)?;
    check_xml_depth(text)?;
    let document = roxmltree::Document::parse(text)?;
    let root = document.root_element();
    if root.tag_name().name() != ROOT_ELEMENT {
        return Err(EnvelopeError::UnexpectedRoot(
            root.tag_name().name().to_string(),
        ));
    }

    let mut children = root.children().filter(|n| n.is_element());
    let source = match children.next() {
        Some(first) if first.tag_name().name() == SOURCE_ELEMENT => {
            first.text().unwrap_or_default().to_string()
        }
        _ => return Err(EnvelopeError::MissingSource),
    };

    let fields = children
        .map(|node| {
            let text = node.text().filter(|t| !t.is_empty()).map(String::from);
            (node.tag_name().name().to_string(), text)
        })
        .collect();

    Ok(DecodedEnvelope { source, fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(pairs: &[(&str, Value)]) -> TranslatedResult {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_encode_layout() {
        let xml = encode(
            "samplepms",
            &result(&[("Name", json!("Alice")), ("RoomNumber", Value::Null)]),
        );
        assert_eq!(
            String::from_utf8(xml).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <RGBridgeMessage><PmsCode>samplepms</PmsCode>\
             <Name>Alice</Name><RoomNumber/></RGBridgeMessage>"
        );
    }

    #[test]
    fn test_round_trip() {
        let original = result(&[
            ("Name", json!("Ada & <Bob> \"quoted\" 'x'")),
            ("RoomNumber", json!(204)),
            ("Rate", json!(99.5)),
            ("Vip", json!(true)),
            ("Extras", json!({"late": true})),
            ("Nights", json!(["a", "b"])),
            ("Notes", Value::Null),
            ("Empty", json!("")),
        ]);

        let decoded = decode(&encode("samplepms", &original)).unwrap();
        assert_eq!(decoded.source, "samplepms");

        let expected: Vec<(&str, Option<&str>)> = vec![
            ("Name", Some("Ada & <Bob> \"quoted\" 'x'")),
            ("RoomNumber", Some("204")),
            ("Rate", Some("99.5")),
            ("Vip", Some("true")),
            ("Extras", Some(r#"{"late":true}"#)),
            ("Nights", Some(r#"["a","b"]"#)),
            // Null and the empty string are indistinguishable on the wire.
            ("Notes", None),
            ("Empty", None),
        ];
        let actual: Vec<(&str, Option<&str>)> = decoded
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_empty_result() {
        let decoded = decode(&encode("nopms", &TranslatedResult::new())).unwrap();
        assert_eq!(decoded.source, "nopms");
        assert!(decoded.fields.is_empty());
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode(b"<Other><PmsCode>x</PmsCode></Other>"),
            Err(EnvelopeError::UnexpectedRoot(root)) if root == "Other"
        ));
        assert!(matches!(
            decode(b"<RGBridgeMessage><Name>x</Name></RGBridgeMessage>"),
            Err(EnvelopeError::MissingSource)
        ));
        assert!(matches!(
            decode(b"<RGBridgeMessage>"),
            Err(EnvelopeError::Xml(_))
        ));

        let deep = format!("{}{}", "<x>".repeat(50_000), "</x>".repeat(50_000));
        assert!(matches!(
            decode(deep.as_bytes()),
            Err(EnvelopeError::Nesting(_))
        ));
    }
}
