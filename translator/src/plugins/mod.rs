//! Registry of translator plugins, keyed by source identifier.
//!
//! A plugin is registered as a named [`PluginFactory`]. Resolving an
//! identifier asks its factory for a fresh [`Translator`] built from cached,
//! immutable parts, so a request never shares mutable state with another.
//! The registration table is an `ArcSwap` snapshot: registering a new plugin
//! swaps in a new table and readers keep whichever table they loaded.
mod mapped;
mod samplepms;

pub use mapped::{MappedPluginFactory, MappedTranslator, SchemaSource};

use crate::config::PluginConfig;
use crate::errors::TranslatorError;
use crate::mapping_store::MappingStore;
use crate::metrics_defs::PLUGIN_LOAD_FAILURES;
use crate::types::{MappingDocument, TranslatedResult, is_valid_identifier};
use crate::validation::ValidationErrors;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value;
use shared::counter;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Capabilities every plugin exposes to the gateway.
pub trait Translator: Send + Sync {
    fn identifier(&self) -> &str;

    /// Turns the raw request body into a key/value tree.
    fn decode(&self, raw: &[u8]) -> Result<Value, TranslatorError>;

    fn validate(&self, raw: &[u8], payload: &Value) -> Result<(), ValidationErrors>;

    fn translate(&self, payload: &Value) -> Result<TranslatedResult, TranslatorError>;

    fn mapping(&self) -> &MappingDocument;
}

/// What a factory gets to build a plugin instance.
pub struct PluginContext<'a> {
    pub identifier: &'a str,
    pub mappings: &'a MappingStore,
}

#[async_trait]
pub trait PluginFactory: Send + Sync {
    async fn instantiate(
        &self,
        ctx: &PluginContext<'_>,
    ) -> Result<Box<dyn Translator>, TranslatorError>;

    /// Forgets anything cached by earlier instantiations.
    fn reset(&self) {}
}

type FactoryTable = HashMap<String, Arc<dyn PluginFactory>>;

struct RegistryInner {
    factories: ArcSwap<FactoryTable>,
    mappings: MappingStore,
}

#[derive(Clone)]
pub struct PluginRegistry {
    inner: Arc<RegistryInner>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new(mappings: MappingStore) -> Self {
        PluginRegistry {
            inner: Arc::new(RegistryInner {
                factories: ArcSwap::from_pointee(HashMap::new()),
                mappings,
            }),
        }
    }

    /// Registers the built-in plugins, then every configured one. A configured
    /// plugin replaces a built-in of the same name.
    pub fn from_config(plugins: &[PluginConfig], mappings: MappingStore) -> Self {
        let registry = PluginRegistry::new(mappings);
        registry.register(samplepms::IDENTIFIER, Arc::new(samplepms::factory()));

        for plugin in plugins {
            if registry.contains(&plugin.id) {
                tracing::warn!(identifier = %plugin.id, "Configured plugin replaces a built-in plugin");
            }
            registry.register(
                plugin.id.clone(),
                Arc::new(MappedPluginFactory::from_config(plugin)),
            );
        }

        tracing::info!(plugins = ?registry.list_available(), "Plugin registry ready");
        registry
    }

    pub fn register(&self, identifier: impl Into<String>, factory: Arc<dyn PluginFactory>) {
        let identifier = identifier.into();
        self.inner.factories.rcu(|table| {
            let mut next = FactoryTable::clone(table);
            next.insert(identifier.clone(), factory.clone());
            next
        });
    }

    pub async fn resolve(&self, identifier: &str) -> Result<Box<dyn Translator>, TranslatorError> {
        if !is_valid_identifier(identifier) {
            return Err(TranslatorError::InvalidIdentifier(identifier.to_string()));
        }

        let factory = self
            .inner
            .factories
            .load()
            .get(identifier)
            .cloned()
            .ok_or_else(|| TranslatorError::PluginNotFound(identifier.to_string()))?;

        let ctx = PluginContext {
            identifier,
            mappings: &self.inner.mappings,
        };
        match factory.instantiate(&ctx).await {
            Ok(plugin) => {
                tracing::debug!(identifier, "Resolved plugin");
                Ok(plugin)
            }
            Err(e) => {
                counter!(PLUGIN_LOAD_FAILURES).increment(1);
                tracing::error!(identifier, error = %e, "Could not instantiate plugin");
                Err(e)
            }
        }
    }

    pub fn list_available(&self) -> BTreeSet<String> {
        self.inner.factories.load().keys().cloned().collect()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.inner.factories.load().contains_key(identifier)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.factories.load().is_empty()
    }

    /// Drops the cached mapping and compiled schema so the next resolution
    /// reads both again.
    pub fn reload(&self, identifier: &str) {
        self.inner.mappings.invalidate(identifier);
        if let Some(factory) = self.inner.factories.load().get(identifier) {
            factory.reset();
        }
        tracing::info!(identifier, "Plugin reloaded");
    }

    pub fn mappings(&self) -> &MappingStore {
        &self.inner.mappings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_store::{FilesystemMappingProvider, InMemoryMappingProvider};
    use crate::payload::PayloadFormat;
    use serde_json::json;

    const SAMPLE_MAPPING: &str = "guestName: Name\nroom:\n  number: RoomNumber\n";

    fn registry_with(provider: InMemoryMappingProvider) -> PluginRegistry {
        PluginRegistry::from_config(&[], MappingStore::new(Arc::new(provider)))
    }

    #[tokio::test]
    async fn test_resolve_samplepms() {
        let registry =
            registry_with(InMemoryMappingProvider::new().with_raw("samplepms", SAMPLE_MAPPING));
        let plugin = registry.resolve("samplepms").await.unwrap();
        assert_eq!(plugin.identifier(), "samplepms");

        let raw = br#"{"guestName": "Alice", "room": {"number": "204"}}"#;
        let payload = plugin.decode(raw).unwrap();
        plugin.validate(raw, &payload).unwrap();
        let result = plugin.translate(&payload).unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"Name": "Alice", "RoomNumber": "204"})
        );

        let payload = plugin.decode(br#"{"guestName": "Bob"}"#).unwrap();
        let result = plugin.translate(&payload).unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"Name": "Bob", "RoomNumber": null})
        );
    }

    #[tokio::test]
    async fn test_samplepms_schema() {
        let registry =
            registry_with(InMemoryMappingProvider::new().with_raw("samplepms", SAMPLE_MAPPING));
        let plugin = registry.resolve("samplepms").await.unwrap();

        let raw = br#"{"room": {"number": true}}"#;
        let payload = plugin.decode(raw).unwrap();
        let errors = plugin.validate(raw, &payload).unwrap_err();
        let paths: Vec<&str> = errors.violations().iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, ["/guestName", "/room/number"]);
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let registry = registry_with(InMemoryMappingProvider::new());

        assert!(matches!(
            registry.resolve("nopms").await,
            Err(TranslatorError::PluginNotFound(id)) if id == "nopms"
        ));
        assert!(matches!(
            registry.resolve("../pms").await,
            Err(TranslatorError::InvalidIdentifier(_))
        ));
        // Registered, but there is no mapping to build it from.
        assert!(matches!(
            registry.resolve("samplepms").await,
            Err(TranslatorError::PluginLoadError { identifier, .. }) if identifier == "samplepms"
        ));
    }

    #[tokio::test]
    async fn test_malformed_mapping_is_a_load_error() {
        let registry =
            registry_with(InMemoryMappingProvider::new().with_raw("samplepms", "guestName: [x"));
        assert!(matches!(
            registry.resolve("samplepms").await,
            Err(TranslatorError::PluginLoadError { .. })
        ));
    }

    #[tokio::test]
    async fn test_configured_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let xsd_path = dir.path().join("schema.xsd");
        std::fs::write(
            &xsd_path,
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="Reservation">
                   <xs:complexType><xs:sequence>
                     <xs:element name="guestName" type="xs:string"/>
                   </xs:sequence></xs:complexType>
                 </xs:element>
               </xs:schema>"#,
        )
        .unwrap();

        let plugins = vec![
            PluginConfig {
                id: "otherpms".to_string(),
                format: PayloadFormat::Xml,
                json_schema: None,
                xsd: Some(xsd_path),
            },
            PluginConfig {
                id: "brokenpms".to_string(),
                format: PayloadFormat::Json,
                json_schema: Some(dir.path().join("missing.json")),
                xsd: None,
            },
        ];
        let provider = InMemoryMappingProvider::new()
            .with_raw("otherpms", "guestName: Name\n")
            .with_raw("brokenpms", "guestName: Name\n");
        let registry = PluginRegistry::from_config(&plugins, MappingStore::new(Arc::new(provider)));

        assert_eq!(
            registry.list_available().into_iter().collect::<Vec<_>>(),
            ["brokenpms", "otherpms", "samplepms"]
        );

        let plugin = registry.resolve("otherpms").await.unwrap();
        let raw = b"<Reservation><guestName>Alice</guestName></Reservation>";
        let payload = plugin.decode(raw).unwrap();
        plugin.validate(raw, &payload).unwrap();
        assert_eq!(plugin.translate(&payload).unwrap()["Name"], json!("Alice"));

        let raw = b"<Reservation><name>Alice</name></Reservation>";
        let payload = plugin.decode(raw).unwrap();
        assert_eq!(plugin.validate(raw, &payload).unwrap_err().violations().len(), 2);

        assert!(matches!(
            registry.resolve("brokenpms").await,
            Err(TranslatorError::PluginLoadError { .. })
        ));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("schema.json");
        std::fs::write(&schema_path, r#"{"type": "object"}"#).unwrap();
        std::fs::create_dir_all(dir.path().join("jsonpms")).unwrap();
        std::fs::write(dir.path().join("jsonpms/mappings.yaml"), "a: A\n").unwrap();

        let plugins = vec![PluginConfig {
            id: "jsonpms".to_string(),
            format: PayloadFormat::Json,
            json_schema: Some(schema_path.clone()),
            xsd: None,
        }];
        let store = MappingStore::new(Arc::new(FilesystemMappingProvider::new(dir.path())));
        let registry = PluginRegistry::from_config(&plugins, store);

        let plugin = registry.resolve("jsonpms").await.unwrap();
        assert!(plugin.validate(b"", &json!({})).is_ok());
        assert_eq!(plugin.mapping().len(), 1);

        std::fs::write(&schema_path, r#"{"type": "object", "required": ["a"]}"#).unwrap();
        std::fs::write(dir.path().join("jsonpms/mappings.yaml"), "a: A\nb: B\n").unwrap();

        // Cached until reloaded.
        let plugin = registry.resolve("jsonpms").await.unwrap();
        assert!(plugin.validate(b"", &json!({})).is_ok());
        assert_eq!(plugin.mapping().len(), 1);

        registry.reload("jsonpms");
        let plugin = registry.resolve("jsonpms").await.unwrap();
        assert!(plugin.validate(b"", &json!({})).is_err());
        assert_eq!(plugin.mapping().len(), 2);
    }

    #[tokio::test]
    async fn test_register_custom_factory() {
        struct Fixed;

        struct FixedTranslator(MappingDocument);

        impl Translator for FixedTranslator {
            fn identifier(&self) -> &str {
                "fixedpms"
            }
            fn decode(&self, _raw: &[u8]) -> Result<Value, TranslatorError> {
                Ok(Value::Null)
            }
            fn validate(&self, _raw: &[u8], _payload: &Value) -> Result<(), ValidationErrors> {
                Ok(())
            }
            fn translate(&self, _payload: &Value) -> Result<TranslatedResult, TranslatorError> {
                Ok(TranslatedResult::from_iter([("Fixed".to_string(), json!(1))]))
            }
            fn mapping(&self) -> &MappingDocument {
                &self.0
            }
        }

        #[async_trait]
        impl PluginFactory for Fixed {
            async fn instantiate(
                &self,
                _ctx: &PluginContext<'_>,
            ) -> Result<Box<dyn Translator>, TranslatorError> {
                Ok(Box::new(FixedTranslator(MappingDocument::default())))
            }
        }

        let registry = PluginRegistry::new(MappingStore::new(Arc::new(
            InMemoryMappingProvider::new(),
        )));
        assert!(registry.is_empty());

        registry.register("fixedpms", Arc::new(Fixed));
        assert!(!registry.is_empty());
        let plugin = registry.resolve("fixedpms").await.unwrap();
        assert_eq!(plugin.translate(&Value::Null).unwrap()["Fixed"], json!(1));
    }
}
