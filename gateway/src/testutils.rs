use crate::orchestrator::Gateway;
use axum::{Router, body::Bytes, extract::State, http::StatusCode, routing::post};
use outbound::{OutboundConfig, RetryPolicy, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use translator::mapping_store::InMemoryMappingProvider;
use translator::{MappingStore, PluginRegistry};

pub const SAMPLE_MAPPING: &str = "guestName: Name\nroom:\n  number: RoomNumber\n";

#[derive(Clone, Default)]
struct Script {
    replies: Arc<Vec<(u16, &'static str)>>,
    bodies: Arc<Mutex<Vec<Vec<u8>>>>,
}

/// Stand-in for the RGBridge endpoint. The n-th request gets the n-th reply,
/// the last reply repeats.
pub struct TestRgBridge {
    pub url: url::Url,
    script: Script,
}

impl TestRgBridge {
    pub async fn spawn(replies: Vec<(u16, &'static str)>) -> TestRgBridge {
        assert!(!replies.is_empty());
        let script = Script {
            replies: Arc::new(replies),
            bodies: Arc::default(),
        };

        let app = Router::new()
            .route("/rgbridge", post(receive))
            .with_state(script.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestRgBridge {
            url: url::Url::parse(&format!("http://127.0.0.1:{port}/rgbridge")).unwrap(),
            script,
        }
    }

    /// Envelopes received so far.
    pub fn bodies(&self) -> Vec<Vec<u8>> {
        self.script.bodies.lock().unwrap().clone()
    }
}

async fn receive(State(script): State<Script>, body: Bytes) -> (StatusCode, &'static str) {
    let mut bodies = script.bodies.lock().unwrap();
    bodies.push(body.to_vec());
    let (status, reply) = script.replies[(bodies.len() - 1).min(script.replies.len() - 1)];
    (StatusCode::from_u16(status).unwrap(), reply)
}

/// Gateway with the built-in plugins, an in-memory `samplepms` mapping and a
/// sender that retries fast against `rgbridge`.
pub fn sample_gateway(rgbridge: &TestRgBridge) -> Gateway {
    let provider = InMemoryMappingProvider::new().with_raw("samplepms", SAMPLE_MAPPING);
    let registry = PluginRegistry::from_config(&[], MappingStore::new(Arc::new(provider)));

    let config = OutboundConfig {
        url: rgbridge.url.clone(),
        ..OutboundConfig::default()
    };
    let sender = Sender::new(&config).unwrap().with_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        multiplier: 2.0,
        max_delay: Duration::from_millis(20),
    });
    Gateway::new(registry, Arc::new(sender))
}
