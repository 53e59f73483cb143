//! HTTP query surface.
//!
//! Exposes the query bridge to the web front end as a small JSON API.
//! Each request is independent and stateless; the bridge holds no session
//! state between calls.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Run one dual-space query, returns formatted output |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "empty query" }
//! ```
//!
//! Blank queries return `400`; any bridge failure returns `500` with the
//! failure message only — stack traces are never exposed.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser front
//! end can call the bridge directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::bridge::Bridge;
use crate::config::Config;
use crate::present;

#[derive(Clone)]
struct AppState {
    bridge: Arc<Bridge>,
}

/// Start the bridge server.
///
/// Opens both collections up front so a missing index fails at startup
/// rather than on the first request, then serves until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bridge = Arc::new(Bridge::open(config).await?);
    let state = AppState { bridge };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Bridge server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

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

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: String,
}

#[derive(Serialize)]
struct QueryResponse {
    output: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(AppError {
            status: StatusCode::BAD_REQUEST,
            message: "empty query".to_string(),
        });
    }

    let result = state.bridge.query(query).await.map_err(|e| AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: e.to_string(),
    })?;

    Ok(Json(QueryResponse {
        output: present::render(&result),
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
