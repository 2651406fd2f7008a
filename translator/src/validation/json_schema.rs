//! Structural subset of JSON Schema.
//!
//! Supported keywords: `type`, `properties`, `required`,
//! `additionalProperties` (boolean form), `items`, `enum`, `minLength`,
//! `maxLength`, `minimum` and `maximum`. Other keywords are ignored.
use super::{SchemaError, Violation};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum JsonType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl JsonType {
    fn matches(self, value: &Value) -> bool {
        match self {
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
            JsonType::String => value.is_string(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            JsonType::Boolean => value.is_boolean(),
            JsonType::Null => value.is_null(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Null => "null",
        }
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum TypeSet {
    One(JsonType),
    Many(Vec<JsonType>),
}

impl TypeSet {
    fn types(&self) -> &[JsonType] {
        match self {
            TypeSet::One(t) => std::slice::from_ref(t),
            TypeSet::Many(ts) => ts,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaNode {
    #[serde(rename = "type")]
    types: Option<TypeSet>,
    #[serde(default)]
    properties: IndexMap<String, SchemaNode>,
    #[serde(default)]
    required: Vec<String>,
    additional_properties: Option<bool>,
    items: Option<Box<SchemaNode>>,
    #[serde(rename = "enum")]
    allowed: Option<Vec<Value>>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    minimum: Option<f64>,
    maximum: Option<f64>,
}

/// A compiled schema, ready to validate any number of payloads.
#[derive(Clone, Debug)]
pub struct JsonSchema {
    root: SchemaNode,
}

impl JsonSchema {
    pub fn compile(schema: Value) -> Result<JsonSchema, SchemaError> {
        if !schema.is_object() {
            return Err(SchemaError::Unsupported(
                "schema root must be an object".to_string(),
            ));
        }
        let root: SchemaNode = serde_json::from_value(schema)?;
        Ok(JsonSchema { root })
    }

    pub fn validate(&self, value: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        validate_node(&self.root, value, "", &mut violations);
        violations
    }
}

fn validate_node(node: &SchemaNode, value: &Value, path: &str, violations: &mut Vec<Violation>) {
    if let Some(types) = &node.types
        && !types.types().iter().any(|t| t.matches(value))
    {
        let expected: Vec<&str> = types.types().iter().map(|t| t.as_str()).collect();
        violations.push(Violation::new(
            path,
            format!(
                "expected {}, found {}",
                expected.join(" or "),
                type_of(value)
            ),
        ));
        // Deeper checks would only repeat the type mismatch.
        return;
    }

    if let Some(allowed) = &node.allowed
        && !allowed.contains(value)
    {
        violations.push(Violation::new(
            path,
            format!("value {value} is not one of the allowed values"),
        ));
    }

    match value {
        Value::String(s) => {
            let len = s.chars().count();
            if let Some(min) = node.min_length
                && len < min
            {
                violations.push(Violation::new(
                    path,
                    format!("string is shorter than {min} characters"),
                ));
            }
            if let Some(max) = node.max_length
                && len > max
            {
                violations.push(Violation::new(
                    path,
                    format!("string is longer than {max} characters"),
                ));
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = node.minimum
                && n < min
            {
                violations.push(Violation::new(path, format!("{n} is less than {min}")));
            }
            if let Some(max) = node.maximum
                && n > max
            {
                violations.push(Violation::new(path, format!("{n} is greater than {max}")));
            }
        }
        Value::Object(object) => {
            for key in &node.required {
                if !object.contains_key(key) {
                    violations.push(Violation::new(
                        child_path(path, key),
                        "required property is missing",
                    ));
                }
            }
            for (key, child) in object {
                match node.properties.get(key) {
                    Some(child_node) => {
                        validate_node(child_node, child, &child_path(path, key), violations)
                    }
                    None if node.additional_properties == Some(false) => {
                        violations.push(Violation::new(
                            child_path(path, key),
                            "additional property is not allowed",
                        ));
                    }
                    None => {}
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_node) = &node.items {
                for (i, item) in items.iter().enumerate() {
                    validate_node(item_node, item, &child_path(path, &i.to_string()), violations);
                }
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}

/// Appends a JSON pointer segment, escaping `~` and `/`.
fn child_path(path: &str, segment: &str) -> String {
    format!("{path}/{}", segment.replace('~', "~0").replace('/', "~1"))
}
