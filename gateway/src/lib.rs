pub mod api;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod orchestrator;

#[cfg(test)]
mod testutils;

use config::ServeConfig;
use orchestrator::Gateway;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use errors::{ErrorKind, GatewayError};

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Serves the API and the admin listener until either of them fails.
pub async fn run(config: ServeConfig, gateway: Gateway) -> Result<(), ServeError> {
    let gateway = Arc::new(gateway);

    let registry = gateway.registry().clone();
    let admin_service = AdminService::<_, io::Error>::new(move || !registry.is_empty());
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    let app = api::router(gateway, &config.api_key);
    let api_task = async {
        let addr = format!("{}:{}", config.listener.host, config.listener.port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "API listening");
        axum::serve(listener, app).await
    };

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}
