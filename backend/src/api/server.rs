//! HTTP Server for the trackreport API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/run`        | Run the pipeline on a document       |
//! | GET    | `/api/operators`  | Matrix operators and transforms      |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, LOG_BROADCASTER};
use super::types::{error_response, RunRequest, RunResponse};
use crate::pipeline::Dispatcher;
use crate::source::{DataSource, DocumentSource};
use crate::table::{operators_description, MatrixOperator};
use crate::transform::{transforms_description, TransformRegistry};

/// Shared by all handlers.
pub struct ServerState {
    pub cache_dir: PathBuf,
    pub registry: TransformRegistry,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    let message = message.to_string();
    log_error(&message);
    (status, Json(error_response(&message)))
}

/// Build the router (exposed for tests and embedding).
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/run", post(run_pipeline))
        .route("/api/operators", get(operators))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Start the HTTP server
pub async fn start_server(port: u16, cache_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(ServerState {
        cache_dir,
        registry: TransformRegistry::builtin(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Trackreport server running on http://localhost:{}", port);
    println!("   POST /api/run       - Run the pipeline");
    println!("   GET  /api/operators - Operator reference");
    println!("   GET  /api/logs      - SSE log stream");
    println!("   GET  /health        - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "trackreport",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "run": "POST /api/run",
            "operators": "GET /api/operators",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn operators(State(state): State<Arc<ServerState>>) -> Json<Value> {
    let keywords: Vec<&str> = MatrixOperator::ALL.iter().map(|op| op.keyword()).collect();
    Json(json!({
        "operators": keywords,
        "transforms": state.registry.names(),
        "help": format!("{}\n{}", operators_description(), transforms_description()),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Run endpoint. Pipeline failures are part of the response body; only
/// malformed documents are rejected.
async fn run_pipeline(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let source = DocumentSource::from_value(request.document.clone())
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid document: {}", e)))?;

    let response = tokio::task::spawn_blocking(move || {
        let identity = source.identity();
        let cached = source.cacheable() && request.config.uses_cache();
        let dispatcher = Dispatcher::new(Box::new(source), &state.cache_dir);
        let outcome = dispatcher.run(&request.config, &state.registry, request.renderer.sink());
        RunResponse::new(identity, cached, outcome)
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Pipeline task failed: {}", e)))?;

    Ok(Json(response))
}
