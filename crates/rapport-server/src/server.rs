//! `RapportServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use rapport_core::errors::LiveError;
use rapport_core::ids::SessionId;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::health;
use crate::hub::Hub;
use crate::metrics;
use crate::protocol::Reply;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sessions and their connections.
    pub hub: Arc<Hub>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics` when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Query string of `GET /ws/{session_id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectParams {
    token: Option<String>,
    last_seq: Option<u64>,
}

/// The live session gateway.
pub struct RapportServer {
    config: Arc<ServerConfig>,
    hub: Arc<Hub>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl RapportServer {
    /// Create a new server around a hub.
    pub fn new(config: ServerConfig, hub: Arc<Hub>) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this recorder handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/{session_id}", get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve until the shutdown token is cancelled.
    ///
    /// Returns the bound address (useful with port `0`) and the listener task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, "rapport server listening");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                warn!(error = %e, "listener exited with error");
            }
        });
        Ok((addr, handle))
    }

    /// Get the hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let shutting_down = state.shutdown.is_shutting_down();
    let resp = health::health_check(
        state.start_time,
        state.hub.connection_count(),
        state.hub.session_count(),
        shutting_down,
    );
    let status = if shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(resp))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws/{session_id}?token=..&lastSeq=..
///
/// Admission is checked before the upgrade so refusals are plain HTTP.
async fn ws_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<ConnectParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return refuse(
            StatusCode::SERVICE_UNAVAILABLE,
            &LiveError::Connection("server is shutting down".into()),
        );
    }
    if state.hub.connection_count() >= state.config.max_connections {
        warn!(max = state.config.max_connections, "connection limit reached");
        return refuse(
            StatusCode::SERVICE_UNAVAILABLE,
            &LiveError::Connection("connection limit reached".into()),
        );
    }

    let session_id = SessionId::from_raw(session_id);
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        return refuse(
            StatusCode::UNAUTHORIZED,
            &LiveError::Unauthorized("missing token".into()),
        );
    };
    let identity = match state.hub.authenticate(&token, &session_id).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(%session_id, error = %e, "connect refused");
            return refuse(StatusCode::UNAUTHORIZED, &e);
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let AppState { hub, config, .. } = state;
    let last_seq = params.last_seq;
    ws.max_message_size(config.max_message_bytes)
        .on_upgrade(move |socket| run_ws_session(socket, session_id, identity, last_seq, hub, config))
}

fn refuse(status: StatusCode, err: &LiveError) -> Response {
    (status, Json(Reply::error(err))).into_response()
}
