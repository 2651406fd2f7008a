use crate::orchestrator::Stage;
use outbound::DeliveryError;
use serde::Serialize;
use std::fmt;
use translator::validation::Violation;
use translator::{MappingError, TranslatorError};

/// Caller-visible error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidIdentifier,
    PluginNotFound,
    PluginLoadError,
    MappingNotFound,
    MappingParseError,
    PayloadDecodeError,
    ValidationFailed,
    DeliveryFailed,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidIdentifier => "invalid_identifier",
            ErrorKind::PluginNotFound => "plugin_not_found",
            ErrorKind::PluginLoadError => "plugin_load_error",
            ErrorKind::MappingNotFound => "mapping_not_found",
            ErrorKind::MappingParseError => "mapping_parse_error",
            ErrorKind::PayloadDecodeError => "payload_decode_error",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::DeliveryFailed => "delivery_failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }

    /// HTTP status the API answers with for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidIdentifier | ErrorKind::PayloadDecodeError => 400,
            ErrorKind::PluginNotFound | ErrorKind::MappingNotFound => 404,
            ErrorKind::ValidationFailed => 422,
            ErrorKind::DeliveryFailed => 502,
            // The client has gone away, nobody reads this.
            ErrorKind::Cancelled => 499,
            ErrorKind::PluginLoadError | ErrorKind::MappingParseError | ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed pipeline run or API call.
#[derive(Debug)]
pub struct GatewayError {
    pub kind: ErrorKind,
    /// Pipeline stage that failed, when the error comes from the pipeline.
    pub stage: Option<Stage>,
    pub detail: String,
    pub violations: Vec<Violation>,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} at {}: {}", self.kind, stage, self.detail),
            None => write!(f, "{}: {}", self.kind, self.detail),
        }
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        GatewayError {
            kind,
            stage: None,
            detail: detail.into(),
            violations: Vec::new(),
        }
    }

    pub fn at(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

impl From<MappingError> for GatewayError {
    fn from(e: MappingError) -> Self {
        let kind = match &e {
            MappingError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            MappingError::NotFound(_) => ErrorKind::MappingNotFound,
            MappingError::Parse { .. } => ErrorKind::MappingParseError,
            MappingError::Encode(_) | MappingError::Io(_) | MappingError::Closed(_) => {
                ErrorKind::Internal
            }
        };
        GatewayError::new(kind, e.to_string())
    }
}

impl From<TranslatorError> for GatewayError {
    fn from(e: TranslatorError) -> Self {
        let kind = match e {
            TranslatorError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            TranslatorError::PluginNotFound(_) => ErrorKind::PluginNotFound,
            TranslatorError::PluginLoadError { .. } => ErrorKind::PluginLoadError,
            TranslatorError::Mapping(e) => return e.into(),
            TranslatorError::PayloadDecodeError(_) => ErrorKind::PayloadDecodeError,
            TranslatorError::ValidationFailed(errors) => {
                return GatewayError {
                    kind: ErrorKind::ValidationFailed,
                    stage: None,
                    detail: format!("{} schema violation(s)", errors.violations().len()),
                    violations: errors.into_violations(),
                };
            }
        };
        GatewayError::new(kind, e.to_string())
    }
}

impl From<DeliveryError> for GatewayError {
    fn from(e: DeliveryError) -> Self {
        let kind = match e {
            DeliveryError::DeliveryFailed { .. } => ErrorKind::DeliveryFailed,
            DeliveryError::Cancelled => ErrorKind::Cancelled,
            DeliveryError::Client(_) => ErrorKind::Internal,
        };
        GatewayError::new(kind, e.to_string())
    }
}
