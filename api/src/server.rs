use crate::{create_router, AppState};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Reverse proxies allowed to report the client address in
    /// `X-Forwarded-For` / `X-Real-IP`. Empty means the socket peer is the client.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3030,
            trusted_proxies: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create a new API configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Serve the API until `shutdown` resolves.
///
/// Peer addresses are recorded; they identify the client unless the peer is
/// one of the configured trusted proxies.
pub async fn start_server_with_config<F>(
    state: AppState,
    config: ApiConfig,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if !config.trusted_proxies.is_empty() {
        info!("Trusting forwarding headers from {:?}", config.trusted_proxies);
    }
    let app = create_router(state.with_trusted_proxies(config.trusted_proxies.clone()));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API server listening on {}", addr);
    info!(
        "OpenAPI document available at http://localhost:{}/api/v1/openapi.json",
        config.port
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    info!("API server stopped");
    Ok(())
}

/// Serve the API on the default address until Ctrl+C
pub async fn start_server(state: AppState) -> std::io::Result<()> {
    start_server_with_config(state, ApiConfig::default(), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
