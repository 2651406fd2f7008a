//! Built-in plugin for the reference PMS.
use super::{MappedPluginFactory, SchemaSource};
use crate::payload::PayloadFormat;
use serde_json::json;

pub const IDENTIFIER: &str = "samplepms";

pub fn factory() -> MappedPluginFactory {
    let schema = json!({
        "type": "object",
        "required": ["guestName"],
        "properties": {
            "guestName": {"type": "string", "minLength": 1},
            "room": {
                "type": "object",
                "properties": {
                    "number": {"type": ["string", "integer"]}
                }
            }
        }
    });
    MappedPluginFactory::new(PayloadFormat::Json, SchemaSource::InlineJsonSchema(schema))
}
