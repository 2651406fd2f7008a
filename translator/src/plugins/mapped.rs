//! Plugin driven entirely by a mapping document and an optional schema.
use super::{PluginContext, PluginFactory, Translator};
use crate::config::PluginConfig;
use crate::engine;
use crate::errors::TranslatorError;
use crate::payload::{self, PayloadFormat};
use crate::types::{MappingDocument, TranslatedResult};
use crate::validation::{JsonSchema, SchemaError, ValidationErrors, Validator};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum SchemaSource {
    None,
    JsonSchemaFile(PathBuf),
    XsdFile(PathBuf),
    InlineJsonSchema(Value),
}

pub struct MappedPluginFactory {
    format: PayloadFormat,
    schema: SchemaSource,
    // Compiled on first use and kept until `reset`, which swaps in a fresh
    // empty slot.
    compiled: ArcSwap<Option<Arc<Validator>>>,
}

impl MappedPluginFactory {
    pub fn new(format: PayloadFormat, schema: SchemaSource) -> Self {
        MappedPluginFactory {
            format,
            schema,
            compiled: ArcSwap::from_pointee(None),
        }
    }

    pub fn from_config(config: &PluginConfig) -> Self {
        let schema = match (&config.json_schema, &config.xsd) {
            (Some(path), _) => SchemaSource::JsonSchemaFile(path.clone()),
            (None, Some(path)) => SchemaSource::XsdFile(path.clone()),
            (None, None) => SchemaSource::None,
        };
        MappedPluginFactory::new(config.format, schema)
    }

    async fn validator(&self) -> Result<Arc<Validator>, SchemaError> {
        let slot = self.compiled.load_full();
        if let Some(validator) = slot.as_ref() {
            return Ok(validator.clone());
        }

        let validator = Arc::new(match &self.schema {
            SchemaSource::None => Validator::AcceptAll,
            SchemaSource::JsonSchemaFile(path) => Validator::json_schema_from_file(path).await?,
            SchemaSource::XsdFile(path) => Validator::xsd_from_file(path).await?,
            SchemaSource::InlineJsonSchema(schema) => {
                Validator::JsonSchema(JsonSchema::compile(schema.clone())?)
            }
        });
        self.remember(&slot, validator.clone());
        Ok(validator)
    }

    /// Caches `validator` only if the slot is still the one read before
    /// compiling. A `reset` in between leaves the new empty slot in place.
    fn remember(&self, seen: &Arc<Option<Arc<Validator>>>, validator: Arc<Validator>) {
        self.compiled.compare_and_swap(seen, Arc::new(Some(validator)));
    }
}

#[async_trait]
impl PluginFactory for MappedPluginFactory {
    async fn instantiate(
        &self,
        ctx: &PluginContext<'_>,
    ) -> Result<Box<dyn Translator>, TranslatorError> {
        let mapping = ctx
            .mappings
            .load(ctx.identifier)
            .await
            .map_err(|e| TranslatorError::load_error(ctx.identifier, e))?;
        let validator = self
            .validator()
            .await
            .map_err(|e| TranslatorError::load_error(ctx.identifier, e))?;

        Ok(Box::new(MappedTranslator {
            identifier: ctx.identifier.to_string(),
            format: self.format,
            mapping,
            validator,
        }))
    }

    fn reset(&self) {
        self.compiled.store(Arc::new(None));
    }
}

/// One request's view of a mapped plugin.
pub struct MappedTranslator {
    identifier: String,
    format: PayloadFormat,
    mapping: Arc<MappingDocument>,
    validator: Arc<Validator>,
}

impl Translator for MappedTranslator {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn decode(&self, raw: &[u8]) -> Result<Value, TranslatorError> {
        payload::decode(self.format, raw)
            .map_err(|e| TranslatorError::PayloadDecodeError(e.to_string()))
    }

    fn validate(&self, raw: &[u8], payload: &Value) -> Result<(), ValidationErrors> {
        self.validator.validate(raw, payload)
    }

    fn translate(&self, payload: &Value) -> Result<TranslatedResult, TranslatorError> {
        Ok(engine::apply(&self.mapping, payload))
    }

    fn mapping(&self) -> &MappingDocument {
        &self.mapping
    }
}
