//! Compiled subset of XML Schema (XSD 1.0).
//!
//! Supported: global `element` declarations, named and anonymous
//! `complexType`s with a `sequence` or `all` of child elements,
//! `minOccurs`/`maxOccurs` (including `unbounded`), `simpleType` restrictions
//! by base type, and the built-in types `string`, `int`/`integer`/`long`,
//! `decimal`/`double`/`float`, `boolean` and `date`. Attributes are not checked.
use super::{SchemaError, Violation};
use crate::payload::check_xml_depth;
use roxmltree::{Document, Node};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SimpleType {
    Any,
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
}

impl SimpleType {
    fn from_name(name: &str) -> Option<SimpleType> {
        // Strip any namespace prefix, e.g. `xs:int`.
        let local = name.rsplit(':').next().unwrap_or(name);
        let simple = match local {
            "anyType" | "anySimpleType" => SimpleType::Any,
            "string" | "normalizedString" | "token" => SimpleType::String,
            "int" | "integer" | "long" | "short" | "nonNegativeInteger" | "positiveInteger" => {
                SimpleType::Integer
            }
            "decimal" | "double" | "float" => SimpleType::Decimal,
            "boolean" => SimpleType::Boolean,
            "date" => SimpleType::Date,
            _ => return None,
        };
        Some(simple)
    }

    fn accepts(self, text: &str) -> bool {
        let text = text.trim();
        match self {
            SimpleType::Any | SimpleType::String => true,
            SimpleType::Integer => text.parse::<i64>().is_ok(),
            SimpleType::Decimal => text.parse::<f64>().is_ok_and(f64::is_finite),
            SimpleType::Boolean => matches!(text, "true" | "false" | "1" | "0"),
            SimpleType::Date => is_date(text),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SimpleType::Any => "anyType",
            SimpleType::String => "string",
            SimpleType::Integer => "integer",
            SimpleType::Decimal => "decimal",
            SimpleType::Boolean => "boolean",
            SimpleType::Date => "date",
        }
    }
}

/// `YYYY-MM-DD` with a plausible month and day.
fn is_date(text: &str) -> bool {
    let parts: Vec<&str> = text.split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return false;
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return false;
    }
    if !(all_digits(year) && all_digits(month) && all_digits(day)) {
        return false;
    }
    matches!(month.parse::<u8>(), Ok(1..=12)) && matches!(day.parse::<u8>(), Ok(1..=31))
}

#[derive(Clone, Debug)]
enum Content {
    Simple(SimpleType),
    Complex {
        children: Vec<ElementDecl>,
        ordered: bool,
    },
}

#[derive(Clone, Debug)]
struct ElementDecl {
    name: String,
    min_occurs: u32,
    /// None means unbounded.
    max_occurs: Option<u32>,
    /// Shared between every element declared with the same named type.
    content: Arc<Content>,
}

/// A compiled schema, ready to validate any number of documents.
#[derive(Clone, Debug)]
pub struct XmlSchema {
    roots: Vec<ElementDecl>,
}

impl XmlSchema {
    pub fn compile(xsd: &str) -> Result<XmlSchema, SchemaError> {
        let document = Document::parse(xsd)?;
        let schema = document.root_element();
        if !is_xsd(schema, "schema") {
            return Err(SchemaError::Unsupported(
                "root element is not xs:schema".to_string(),
            ));
        }

        let named_types: HashMap<&str, Node<'_, '_>> = schema
            .children()
            .filter(|n| is_xsd(*n, "complexType") || is_xsd(*n, "simpleType"))
            .filter_map(|n| n.attribute("name").map(|name| (name, n)))
            .collect();

        let compiler = Compiler {
            named_types,
            compiled: RefCell::default(),
        };
        let roots = schema
            .children()
            .filter(|n| is_xsd(*n, "element"))
            .map(|n| compiler.element(n, 0))
            .collect::<Result<Vec<_>, _>>()?;

        if roots.is_empty() {
            return Err(SchemaError::Unsupported(
                "schema declares no global element".to_string(),
            ));
        }
        Ok(XmlSchema { roots })
    }

    pub fn validate(&self, raw: &[u8]) -> Vec<Violation> {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => return vec![Violation::new("", format!("document is not UTF-8: {e}"))],
        };
        if let Err(e) = check_xml_depth(text) {
            return vec![Violation::new("", e.to_string())];
        }
        let document = match Document::parse(text) {
            Ok(document) => document,
            Err(e) => return vec![Violation::new("", format!("malformed XML: {e}"))],
        };

        let root = document.root_element();
        let name = root.tag_name().name();
        let mut violations = Vec::new();
        match self.roots.iter().find(|decl| decl.name == name) {
            Some(decl) => validate_element(decl, root, &format!("/{name}"), &mut violations),
            None => {
                let expected: Vec<&str> = self.roots.iter().map(|d| d.name.as_str()).collect();
                violations.push(Violation::new(
                    format!("/{name}"),
                    format!(
                        "unexpected root element '{name}', expected one of: {}",
                        expected.join(", ")
                    ),
                ));
            }
        }
        violations
    }
}

fn is_xsd(node: Node<'_, '_>, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace() == Some(XSD_NAMESPACE)
}

// Guards against self-referencing named types.
const MAX_DEPTH: usize = 32;

struct Compiler<'a, 'input> {
    named_types: HashMap<&'a str, Node<'a, 'input>>,
    // Named types compile once however often they are referenced.
    compiled: RefCell<HashMap<&'a str, Arc<Content>>>,
}

impl<'a, 'input> Compiler<'a, 'input> {
    fn element(&self, node: Node<'a, 'input>, depth: usize) -> Result<ElementDecl, SchemaError> {
        if depth > MAX_DEPTH {
            return Err(SchemaError::Unsupported(
                "element nesting is too deep or recursive".to_string(),
            ));
        }
        let name = node.attribute("name").ok_or_else(|| {
            SchemaError::Unsupported("element without a name (ref is not supported)".to_string())
        })?;

        let content = match node.attribute("type") {
            Some(type_name) => self.named_content(type_name, depth)?,
            None => Arc::new(match node.children().find(|n| n.is_element()) {
                Some(inline) if is_xsd(inline, "complexType") => self.complex(inline, depth)?,
                Some(inline) if is_xsd(inline, "simpleType") => self.simple(inline)?,
                _ => Content::Simple(SimpleType::Any),
            }),
        };

        Ok(ElementDecl {
            name: name.to_string(),
            min_occurs: parse_occurs(node.attribute("minOccurs"), 1)?.unwrap_or(0),
            max_occurs: parse_occurs(node.attribute("maxOccurs"), 1)?,
            content,
        })
    }

    fn named_content(&self, type_name: &str, depth: usize) -> Result<Arc<Content>, SchemaError> {
        if let Some(simple) = SimpleType::from_name(type_name) {
            return Ok(Arc::new(Content::Simple(simple)));
        }
        let local = type_name.rsplit(':').next().unwrap_or(type_name);
        let Some((&name, &node)) = self.named_types.get_key_value(local) else {
            return Err(SchemaError::Unsupported(format!(
                "unknown type '{type_name}'"
            )));
        };
        if let Some(content) = self.compiled.borrow().get(name) {
            return Ok(content.clone());
        }

        let content = Arc::new(if is_xsd(node, "complexType") {
            self.complex(node, depth)?
        } else {
            self.simple(node)?
        });
        self.compiled.borrow_mut().insert(name, content.clone());
        Ok(content)
    }

    fn complex(&self, node: Node<'a, 'input>, depth: usize) -> Result<Content, SchemaError> {
        let group = node
            .children()
            .find(|n| is_xsd(*n, "sequence") || is_xsd(*n, "all"));

        let Some(group) = group else {
            return Ok(Content::Complex {
                children: Vec::new(),
                ordered: true,
            });
        };

        let children = group
            .children()
            .filter(|n| is_xsd(*n, "element"))
            .map(|n| self.element(n, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Content::Complex {
            children,
            ordered: is_xsd(group, "sequence"),
        })
    }

    fn simple(&self, node: Node<'a, 'input>) -> Result<Content, SchemaError> {
        let base = node
            .children()
            .find(|n| is_xsd(*n, "restriction"))
            .and_then(|r| r.attribute("base"));
        match base {
            Some(base) => SimpleType::from_name(base)
                .map(Content::Simple)
                .ok_or_else(|| SchemaError::Unsupported(format!("unknown base type '{base}'"))),
            None => Ok(Content::Simple(SimpleType::Any)),
        }
    }
}

/// Returns None for `unbounded`.
fn parse_occurs(value: Option<&str>, default: u32) -> Result<Option<u32>, SchemaError> {
    match value {
        None => Ok(Some(default)),
        Some("unbounded") => Ok(None),
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| SchemaError::Unsupported(format!("invalid occurrence bound '{v}'"))),
    }
}

fn validate_element(
    decl: &ElementDecl,
    node: Node<'_, '_>,
    path: &str,
    violations: &mut Vec<Violation>,
) {
    let children: Vec<Node<'_, '_>> = node.children().filter(|n| n.is_element()).collect();

    match decl.content.as_ref() {
        Content::Simple(simple) => {
            if !children.is_empty() {
                violations.push(Violation::new(path, "element must not contain child elements"));
                return;
            }
            let text = node.text().unwrap_or("");
            if !simple.accepts(text) {
                violations.push(Violation::new(
                    path,
                    format!("'{}' is not a valid {}", text.trim(), simple.as_str()),
                ));
            }
        }
        Content::Complex {
            children: declared,
            ordered,
        } => {
            let mut counts = vec![0u32; declared.len()];
            let mut last_index = 0;

            for child in &children {
                let name = child.tag_name().name();
                let child_path = format!("{path}/{name}");
                let Some(index) = declared.iter().position(|d| d.name == name) else {
                    violations.push(Violation::new(
                        child_path,
                        format!("unexpected element '{name}'"),
                    ));
                    continue;
                };

                if *ordered && index < last_index {
                    violations.push(Violation::new(
                        &child_path,
                        format!("element '{name}' is out of sequence order"),
                    ));
                }
                last_index = last_index.max(index);
                counts[index] += 1;
                validate_element(&declared[index], *child, &child_path, violations);
            }

            for (child_decl, count) in declared.iter().zip(counts) {
                if count < child_decl.min_occurs {
                    violations.push(Violation::new(
                        format!("{path}/{}", child_decl.name),
                        format!(
                            "missing required element '{}' (expected at least {})",
                            child_decl.name, child_decl.min_occurs
                        ),
                    ));
                }
                if let Some(max) = child_decl.max_occurs
                    && count > max
                {
                    violations.push(Violation::new(
                        format!("{path}/{}", child_decl.name),
                        format!(
                            "element '{}' occurs {count} times, at most {max} allowed",
                            child_decl.name
                        ),
                    ));
                }
            }
        }
    }
}
