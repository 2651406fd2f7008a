//! Applies a mapping document to a parsed payload.
//!
//! Missing fields are data, not errors: any source field that cannot be
//! resolved produces a null target.
use crate::types::{MappingDocument, MappingTarget, TranslatedResult};
use serde_json::Value;

pub fn apply(mapping: &MappingDocument, payload: &Value) -> TranslatedResult {
    let mut result = TranslatedResult::with_capacity(mapping.len());

    for (source_field, target) in mapping.iter() {
        let source_value = payload.get(source_field);

        match target {
            MappingTarget::Flat(name) => {
                result.insert(name.clone(), resolved(source_value));
            }
            MappingTarget::Nested(fields) => {
                for (subfield, sub_target) in fields {
                    match sub_target {
                        MappingTarget::Flat(name) => {
                            // `get` yields None for non-object parents too.
                            let value = source_value.and_then(|parent| parent.get(subfield));
                            result.insert(name.clone(), resolved(value));
                        }
                        MappingTarget::Nested(_) => {
                            tracing::debug!(
                                source_field = %source_field,
                                subfield = %subfield,
                                "Mapping nests deeper than one level, targets resolve to null"
                            );
                            for name in sub_target.target_names() {
                                result.insert(name.to_string(), Value::Null);
                            }
                        }
                    }
                }
            }
        }
    }

    result
}

fn resolved(value: Option<&Value>) -> Value {
    value.cloned().unwrap_or(Value::Null)
}
