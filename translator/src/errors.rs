use crate::mapping_store::MappingError;
use crate::validation::ValidationErrors;

/// Errors raised while resolving a plugin or running one of its capabilities.
#[derive(thiserror::Error, Debug)]
pub enum TranslatorError {
    #[error("invalid source identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("no plugin registered for '{0}'")]
    PluginNotFound(String),

    #[error("could not load plugin for '{identifier}': {reason}")]
    PluginLoadError { identifier: String, reason: String },

    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("could not decode payload: {0}")]
    PayloadDecodeError(String),

    #[error("payload failed validation: {0}")]
    ValidationFailed(ValidationErrors),
}

impl TranslatorError {
    pub(crate) fn load_error(identifier: &str, reason: impl ToString) -> Self {
        TranslatorError::PluginLoadError {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ValidationErrors> for TranslatorError {
    fn from(errors: ValidationErrors) -> Self {
        TranslatorError::ValidationFailed(errors)
    }
}
