//! HTTP binding.
//!
//! Exposes the query handler through a single JSON route, mirroring the
//! tool-call envelope used by the MCP binding.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/mcp-tools` | Call a tool: `{"tool_name": "...", "params": {...}}` |
//!
//! # Response Contract
//!
//! | Situation | Status | Body |
//! |-----------|--------|------|
//! | Tool ran (including adapter failures and unknown tools) | `200` | `{"content": [...], "data"?: {...}, "isError"?: true}` |
//! | Any other path or method | `404` | `{"error": "Not Found"}` |
//! | Malformed body or params | `500` | `{"error": "<message>"}` |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::handler::{QueryHandler, ToolResponse};

pub const TOOLS_PATH: &str = "/mcp-tools";

/// Request envelope for `POST /mcp-tools`.
#[derive(Debug, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub params: Value,
}

/// Starts the HTTP server on `[server].bind` (or `bind_override`).
///
/// Runs until SIGINT, then stops accepting connections and returns once
/// in-flight requests have finished.
pub async fn run_server(config: &Config, bind_override: Option<String>) -> anyhow::Result<()> {
    let bind_addr = bind_override.unwrap_or_else(|| config.server.bind.clone());
    let handler = Arc::new(QueryHandler::from_config(config)?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        addr = %listener.local_addr()?,
        collection = %config.qdrant.collection,
        "REST API server listening"
    );

    axum::serve(listener, router(handler))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
    info!("Shutting down server...");
}

/// Builds the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(handler: Arc<QueryHandler>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(TOOLS_PATH, post(handle_tool_call).fallback(handle_not_found))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(handler)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

async fn handle_not_found() -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: "Not Found".to_string(),
    }
}

// ============ POST /mcp-tools ============

/// Handler for `POST /mcp-tools`.
///
/// The body is decoded here rather than through the `Json` extractor so
/// that decode failures produce the `500 {"error": ...}` contract instead
/// of axum's default rejection.
async fn handle_tool_call(
    State(handler): State<Arc<QueryHandler>>,
    body: Bytes,
) -> Result<Json<ToolResponse>, AppError> {
    let call: ToolCall = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "error processing request");
        internal(e.to_string())
    })?;

    info!(tool = %call.tool_name, params = %call.params, "received tool call");

    let response = handler
        .call(&call.tool_name, call.params)
        .await
        .map_err(|e| {
            error!(tool = %call.tool_name, error = %e, "error processing request");
            internal(format!("{:#}", e))
        })?;

    Ok(Json(response))
}
