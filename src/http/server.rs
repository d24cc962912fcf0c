//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Translate `POST /api/v1/{operation}` into registry calls
//! - Serve the published schema (plain text and websocket)
//! - Bind server to listener with graceful shutdown

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::map_response_body::MapResponseBodyLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin::{self, auth::authorize};
use crate::config::ListenerConfig;
use crate::http::request::{make_request_span, propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::{ApiError, ApiResponse};
use crate::http::websocket::subscribe_schema;
use crate::registry::{Operation, Registry};
use crate::sync::SchemaBroadcast;

pub const X_SCHEMA_SEQUENCE: HeaderName = HeaderName::from_static("x-schema-sequence");

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub schema: SchemaBroadcast,
    /// Bearer token for mutations and admin routes; `None` leaves them open.
    pub admin_api_key: Option<Arc<str>>,
    pub backend: &'static str,
}

#[derive(Debug, Deserialize)]
struct OperationRequest {
    #[serde(default)]
    input: serde_json::Value,
}

pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ListenerConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// The fully layered router, for serving or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/api/v1/schema", get(get_schema))
            .route("/api/v1/schema/subscribe", get(subscribe_schema))
            .route("/api/v1/{operation}", post(execute_operation))
            .with_state(state.clone())
            .merge(admin::setup_admin_router(state))
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
                    .layer(propagate_request_id_layer())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
                    .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                    .layer(RequestBodyLimitLayer::new(config.max_body_bytes)),
            )
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn execute_operation(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<OperationRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let operation: Operation = name.parse()?;
    if operation.is_mutation() {
        authorize(state.admin_api_key.as_deref(), &headers)?;
    }

    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let patch = operation.parse_input(request.input)?;

    tracing::debug!(request_id = %request_id(&headers), operation = %operation, "Executing operation");
    state.registry.execute(operation, patch).await?;
    Ok(Json(ApiResponse::ok()))
}

async fn get_schema(State(state): State<AppState>) -> Result<Response, ApiError> {
    let latest = state
        .schema
        .latest()
        .ok_or_else(|| ApiError::NotFound("no schema has been published yet".into()))?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
        (X_SCHEMA_SEQUENCE, HeaderValue::from(latest.sequence)),
    ];
    Ok((headers, latest.sdl.clone()).into_response())
}
