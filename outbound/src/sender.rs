//! Single-endpoint HTTP delivery of XML envelopes.
use crate::ack::Ack;
use crate::config::OutboundConfig;
use crate::errors::{AttemptFailure, DeliveryError};
use crate::metrics_defs::{OUTBOUND_ATTEMPTS, OUTBOUND_DURATION};
use crate::retry::RetryPolicy;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use shared::{counter, histogram};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Result of a delivery the endpoint accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub status: u16,
    pub body: String,
    pub attempts: u32,
    pub ack: Ack,
}

pub struct Sender {
    client: reqwest::Client,
    url: Url,
    credentials: Option<(String, Option<String>)>,
    timeout: Duration,
    policy: RetryPolicy,
}

impl Sender {
    pub fn new(config: &OutboundConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Sender {
            client,
            url: config.url.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
            timeout: Duration::from_secs(config.timeout_secs),
            policy: RetryPolicy::from(&config.retry),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// POSTs `envelope`, retrying per the configured policy. Any 2xx answer
    /// is a delivery; its body is parsed as the acknowledgment.
    pub async fn deliver(
        &self,
        envelope: &[u8],
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let ((status, body), attempts) = self
            .policy
            .run(cancel, |attempt| self.attempt(envelope, attempt))
            .await?;

        let ack = Ack::parse(&body);
        Ok(DeliveryOutcome {
            status,
            body,
            attempts,
            ack,
        })
    }

    async fn attempt(&self, envelope: &[u8], attempt: u32) -> Result<(u16, String), AttemptFailure> {
        counter!(OUTBOUND_ATTEMPTS).increment(1);
        tracing::debug!(attempt, url = %self.url, "Sending envelope");

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/xml")
            .body(envelope.to_vec());
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, password.as_ref());
        }

        let start = Instant::now();
        // The timeout covers reading the body as well as the headers.
        let result = tokio::time::timeout(self.timeout, async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        })
        .await;
        histogram!(OUTBOUND_DURATION).record(start.elapsed().as_secs_f64());

        match result {
            Err(_elapsed) => Err(AttemptFailure::Timeout),
            Ok(Err(e)) if e.is_timeout() => Err(AttemptFailure::Timeout),
            Ok(Err(e)) => Err(AttemptFailure::Transport(e.to_string())),
            Ok(Ok((status, body))) if status.is_success() => {
                tracing::info!(attempt, status = status.as_u16(), "Envelope delivered");
                Ok((status.as_u16(), body))
            }
            Ok(Ok((status, body))) => Err(AttemptFailure::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }
}
