use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn new(host: &str, port: u16) -> Self {
        Listener {
            host: host.to_string(),
            port,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Everything the HTTP surface needs besides the pipeline itself.
#[derive(Clone, Debug, PartialEq)]
pub struct ServeConfig {
    pub listener: Listener,
    pub admin_listener: Listener,
    /// Expected value of the `x-api-key` header.
    pub api_key: String,
}
