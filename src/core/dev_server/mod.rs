//! Development Server
//!
//! Serves the built front-end and forwards realtime websocket traffic to the
//! voice backend while developing locally.
//!
//! ## Routes
//! - `GET /__voicerag/health` - Health check
//! - `{prefix}` and `{prefix}/*` for every proxy rule - websocket relay
//! - everything else - static files from the serve directory

mod ws_proxy;

pub use ws_proxy::ProxyTarget;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Json, Router};
use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::{AppConfig, ConfigError, ServerConfig};

/// Path of the dev server's own health endpoint.
pub const HEALTH_PATH: &str = "/__voicerag/health";

#[derive(Debug, Error, Diagnostic)]
pub enum ProxyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to bind dev server to {addr}: {source}")]
    #[diagnostic(
        code("VOICERAG::DEV_BIND"),
        help("Another process may own the port; pick one with --port")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Dev server already running")]
    #[diagnostic(code("VOICERAG::DEV_RUNNING"))]
    AlreadyRunning,

    #[error("Client websocket error: {0}")]
    #[diagnostic(code("VOICERAG::WS_CLIENT"))]
    Client(#[from] axum::Error),

    #[error("Upstream websocket error: {0}")]
    #[diagnostic(code("VOICERAG::WS_UPSTREAM"))]
    Upstream(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid header value: {0}")]
    #[diagnostic(code("VOICERAG::WS_HEADER"))]
    Header(#[from] axum::http::header::InvalidHeaderValue),
}

/// Local development server with realtime websocket forwarding
pub struct DevServer {
    config: ServerConfig,
    serve_dir: PathBuf,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl DevServer {
    pub fn new(config: ServerConfig, serve_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            serve_dir: serve_dir.into(),
            local_addr: None,
            shutdown_tx: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.server.clone(), config.serve_dir())
    }

    /// Base URL; reflects the bound address once started.
    pub fn url(&self) -> String {
        match self.local_addr {
            Some(addr) => format!("http://{}", addr),
            None => format!("http://{}:{}", self.config.host, self.config.port),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Build the router without binding a socket.
    pub fn router(&self) -> Result<Router, ProxyError> {
        let mut router = Router::new().route(HEALTH_PATH, get(health_check));

        for rule in &self.config.proxy {
            let target = Arc::new(ProxyTarget::new(rule)?);
            let prefix = rule.prefix.trim_end_matches('/');
            log::debug!("Proxying websocket {} -> {}", prefix, rule.target);

            router = router
                .route(
                    prefix,
                    get(ws_proxy::proxy_websocket).with_state(target.clone()),
                )
                .route(
                    &format!("{}/*rest", prefix),
                    get(ws_proxy::proxy_websocket).with_state(target),
                );
        }

        Ok(router
            .fallback_service(ServeDir::new(&self.serve_dir))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ))
    }

    /// Bind and serve in a background task. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, ProxyError> {
        if self.shutdown_tx.is_some() {
            return Err(ProxyError::AlreadyRunning);
        }

        let app = self.router()?;
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let bind_err = |source| ProxyError::Bind {
            addr: addr.clone(),
            source,
        };

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            log::info!("Dev server started on http://{}", local_addr);

            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    log::info!("Dev server shutting down");
                })
                .await
            {
                log::error!("Dev server failed: {}", e);
            }
        });

        log::info!("Serving static files from {}", self.serve_dir.display());
        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(local_addr)
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            self.local_addr = None;
            log::info!("Dev server stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyRule;

    #[test]
    fn test_url_before_start() {
        let server = DevServer::new(ServerConfig::default(), "static");
        assert_eq!(server.url(), "http://127.0.0.1:5173");
        assert!(!server.is_running());
    }

    #[test]
    fn test_router_rejects_bad_rule() {
        let config = ServerConfig {
            proxy: vec![ProxyRule {
                prefix: "/realtime".to_string(),
                target: "ftp://localhost:21".to_string(),
                rewrite_ws_origin: true,
            }],
            ..ServerConfig::default()
        };
        let server = DevServer::new(config, "static");
        assert!(matches!(server.router(), Err(ProxyError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let mut server = DevServer::new(config, "static");
        server.start().await.unwrap();
        assert!(server.is_running());
        assert!(matches!(server.start().await, Err(ProxyError::AlreadyRunning)));
        server.stop().await;
        assert!(!server.is_running());
    }
}
