//! Payload validation strategies selectable per plugin.
//!
//! Schemas are compiled once when a plugin is first resolved and then shared
//! by every request for that plugin. Validation collects every violation
//! instead of stopping at the first one.
pub mod json_schema;
pub mod xsd;

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;

pub use json_schema::JsonSchema;
pub use xsd::XmlSchema;

/// One schema violation, located by a path into the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Violation {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: {}", self.message)
    }
}

/// Non-empty list of violations found in one payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<Violation>);

impl ValidationErrors {
    /// Ok when `violations` is empty.
    pub fn check(violations: Vec<Violation>) -> Result<(), ValidationErrors> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(violations))
        }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("could not read schema: {0}")]
    Io(#[from] std::io::Error),
    #[error("schema is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema is not valid XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("unsupported schema: {0}")]
    Unsupported(String),
}

/// Validation strategy a plugin applies before translating.
#[derive(Debug)]
pub enum Validator {
    /// For sources without a formal schema.
    AcceptAll,
    JsonSchema(JsonSchema),
    Xsd(XmlSchema),
}

impl Validator {
    pub async fn json_schema_from_file(path: &Path) -> Result<Validator, SchemaError> {
        let text = tokio::fs::read_to_string(path).await?;
        let schema: Value = serde_json::from_str(&text)?;
        Ok(Validator::JsonSchema(JsonSchema::compile(schema)?))
    }

    pub async fn xsd_from_file(path: &Path) -> Result<Validator, SchemaError> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Validator::Xsd(XmlSchema::compile(&text)?))
    }

    /// `raw` is the undecoded payload, `parsed` its decoded tree. JSON schemas
    /// check the tree; XML schemas check the raw document.
    pub fn validate(&self, raw: &[u8], parsed: &Value) -> Result<(), ValidationErrors> {
        let violations = match self {
            Validator::AcceptAll => Vec::new(),
            Validator::JsonSchema(schema) => schema.validate(parsed),
            Validator::Xsd(schema) => schema.validate(raw),
        };
        ValidationErrors::check(violations)
    }
}
