//! Delivery of encoded envelopes to the RGBridge endpoint.
pub mod ack;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod retry;
pub mod sender;

#[cfg(test)]
mod testutils;

pub use ack::Ack;
pub use config::{OutboundConfig, RetryConfig};
pub use errors::{AttemptFailure, DeliveryError};
pub use retry::RetryPolicy;
pub use sender::{DeliveryOutcome, Sender};
