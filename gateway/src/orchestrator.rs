//! Per-request pipeline: resolve, validate, translate, encode, deliver.
//!
//! Every stage either hands its output to the next or ends the run with a
//! [`GatewayError`] tagged with the stage that failed. Nothing survives a run
//! except the registry's caches.
use crate::errors::GatewayError;
use crate::metrics_defs::{PIPELINE_DURATION, PIPELINE_ERRORS, PIPELINE_REQUESTS};
use outbound::{Ack, Sender};
use serde::Serialize;
use shared::{counter, histogram};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use translator::{PluginRegistry, TranslatedResult, TranslatorError, envelope};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolving,
    Validating,
    Translating,
    Encoding,
    Delivering,
    AckParsing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolving => "resolving",
            Stage::Validating => "validating",
            Stage::Translating => "translating",
            Stage::Encoding => "encoding",
            Stage::Delivering => "delivering",
            Stage::AckParsing => "ack_parsing",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a successful run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub identifier: String,
    pub result: TranslatedResult,
    pub outbound_status: u16,
    pub outbound_response: String,
    pub attempts: u32,
    pub ack: Ack,
}

pub struct Gateway {
    registry: PluginRegistry,
    sender: Arc<Sender>,
}

impl Gateway {
    pub fn new(registry: PluginRegistry, sender: Arc<Sender>) -> Self {
        Gateway { registry, sender }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub async fn process(
        &self,
        identifier: &str,
        raw: &[u8],
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, GatewayError> {
        counter!(PIPELINE_REQUESTS).increment(1);
        let start = Instant::now();

        let result = self.run_pipeline(identifier, raw, cancel).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => {
                let stage = e.stage.map_or("none", |s| s.as_str());
                counter!(PIPELINE_ERRORS, "kind" => e.kind.as_str(), "stage" => stage)
                    .increment(1);
                tracing::warn!(
                    identifier,
                    kind = %e.kind,
                    stage,
                    detail = %e.detail,
                    "Pipeline failed"
                );
                "error"
            }
        };
        histogram!(PIPELINE_DURATION, "outcome" => outcome).record(start.elapsed().as_secs_f64());

        result
    }

    async fn run_pipeline(
        &self,
        identifier: &str,
        raw: &[u8],
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, GatewayError> {
        enter(identifier, Stage::Resolving);
        let plugin = self
            .registry
            .resolve(identifier)
            .await
            .map_err(|e| GatewayError::from(e).at(Stage::Resolving))?;

        // Decoding is part of validation: a payload that does not decode never
        // reaches the schema.
        enter(identifier, Stage::Validating);
        let payload = plugin
            .decode(raw)
            .map_err(|e| GatewayError::from(e).at(Stage::Validating))?;
        plugin
            .validate(raw, &payload)
            .map_err(|e| GatewayError::from(TranslatorError::from(e)).at(Stage::Validating))?;

        enter(identifier, Stage::Translating);
        let result = plugin
            .translate(&payload)
            .map_err(|e| GatewayError::from(e).at(Stage::Translating))?;

        enter(identifier, Stage::Encoding);
        let encoded = envelope::encode(identifier, &result);

        enter(identifier, Stage::Delivering);
        let outcome = self
            .sender
            .deliver(&encoded, cancel)
            .await
            .map_err(|e| GatewayError::from(e).at(Stage::Delivering))?;

        enter(identifier, Stage::AckParsing);
        if let Ack::Unknown { raw } = &outcome.ack {
            tracing::warn!(
                identifier,
                status = outcome.status,
                response = %raw,
                "Delivery acknowledged without success"
            );
        }

        enter(identifier, Stage::Done);
        Ok(GatewayResponse {
            identifier: identifier.to_string(),
            result,
            outbound_status: outcome.status,
            outbound_response: outcome.body,
            attempts: outcome.attempts,
            ack: outcome.ack,
        })
    }
}

fn enter(identifier: &str, stage: Stage) {
    tracing::debug!(identifier, stage = stage.as_str(), "Pipeline stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testutils::{TestRgBridge, sample_gateway};
    use serde_json::json;

    #[tokio::test]
    async fn test_alice_end_to_end() {
        let rgbridge = TestRgBridge::spawn(vec![(200, "<Ack>Success</Ack>")]).await;
        let gateway = sample_gateway(&rgbridge);

        let response = gateway
            .process(
                "samplepms",
                br#"{"guestName": "Alice", "room": {"number": "204"}}"#,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&response.result).unwrap(),
            json!({"Name": "Alice", "RoomNumber": "204"})
        );
        assert_eq!(response.attempts, 1);
        assert_eq!(response.ack, Ack::Success);

        let received = rgbridge.bodies();
        assert_eq!(received.len(), 1);
        let decoded = envelope::decode(&received[0]).unwrap();
        assert_eq!(decoded.source, "samplepms");
        assert_eq!(decoded.fields["Name"].as_deref(), Some("Alice"));
        assert_eq!(decoded.fields["RoomNumber"].as_deref(), Some("204"));
    }

    #[tokio::test]
    async fn test_stage_of_each_failure() {
        let rgbridge = TestRgBridge::spawn(vec![(500, "down")]).await;
        let gateway = sample_gateway(&rgbridge);
        let cancel = CancellationToken::new();

        let e = gateway.process("nopms", b"{}", &cancel).await.unwrap_err();
        assert_eq!((e.kind, e.stage), (ErrorKind::PluginNotFound, Some(Stage::Resolving)));

        let e = gateway.process("samplepms", b"{not json", &cancel).await.unwrap_err();
        assert_eq!(
            (e.kind, e.stage),
            (ErrorKind::PayloadDecodeError, Some(Stage::Validating))
        );
        assert!(e.violations.is_empty());

        let e = gateway
            .process("samplepms", br#"{"room": "204"}"#, &cancel)
            .await
            .unwrap_err();
        assert_eq!(
            (e.kind, e.stage),
            (ErrorKind::ValidationFailed, Some(Stage::Validating))
        );
        assert_eq!(e.violations.len(), 2);

        // Nothing reached the endpoint so far.
        assert!(rgbridge.bodies().is_empty());

        let e = gateway
            .process("samplepms", br#"{"guestName": "Bob"}"#, &cancel)
            .await
            .unwrap_err();
        assert_eq!(
            (e.kind, e.stage),
            (ErrorKind::DeliveryFailed, Some(Stage::Delivering))
        );
        assert_eq!(rgbridge.bodies().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_ack_is_reported() {
        let rgbridge = TestRgBridge::spawn(vec![(200, "queued")]).await;
        let gateway = sample_gateway(&rgbridge);

        let response = gateway
            .process("samplepms", br#"{"guestName": "Bob"}"#, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            response.ack,
            Ack::Unknown {
                raw: "queued".to_string()
            }
        );
        assert_eq!(response.result["RoomNumber"], serde_json::Value::Null);
    }
}
