use serde::Deserialize;
use url::Url;

const DEFAULT_URL: &str = "https://internal-api.example.com/rgbridge";

fn default_url() -> Url {
    Url::parse(DEFAULT_URL).expect("default outbound URL is valid")
}

fn default_timeout_secs() -> u64 {
    10
}

/// Where and how envelopes are delivered.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct OutboundConfig {
    #[serde(default = "default_url")]
    pub url: Url,
    /// Basic auth is sent only when a username is set.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Applies to each attempt separately.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        OutboundConfig {
            url: default_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 2000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}
