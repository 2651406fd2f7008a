//! Source-side half of the bridge: plugin resolution, mapping storage,
//! payload decoding and validation, translation and envelope encoding.
pub mod config;
pub mod engine;
pub mod envelope;
pub mod errors;
pub mod mapping_store;
pub mod metrics_defs;
pub mod payload;
pub mod plugins;
pub mod types;
pub mod validation;

pub use errors::TranslatorError;
pub use mapping_store::{MappingError, MappingStore};
pub use plugins::{PluginRegistry, Translator};
pub use types::{MappingDocument, MappingTarget, TranslatedResult, is_valid_identifier};
