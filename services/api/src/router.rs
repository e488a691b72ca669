//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoints, and OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, HealthResponse, SessionMode, SessionSummary},
    state::AppState,
    ws::{audio_ws_handler, text_ws_handler, ws_handler},
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health, handlers::list_sessions, handlers::get_session),
    components(schemas(HealthResponse, SessionSummary, SessionMode, ErrorResponse)),
    tags(
        (name = "Live Agent API", description = "Streaming sessions between clients and agent pipelines")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/", get(handlers::health))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/ws/{client_id}", get(ws_handler))
        .route("/ws/audio/{client_id}", get(audio_ws_handler))
        .route("/ws/text/{client_id}", get(text_ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
