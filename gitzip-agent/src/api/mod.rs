//! HTTP API module for the download agent.

pub mod health;
pub mod requests;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::queue::TransferQueue;
use crate::storage::{CredentialStore, SettingsStore};
use crate::utils::errors::GitzipError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub queue: TransferQueue,
    pub settings: Arc<SettingsStore>,
    pub credentials: Arc<CredentialStore>,
}

impl AppState {
    pub fn new(
        queue: TransferQueue,
        settings: Arc<SettingsStore>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            queue,
            settings,
            credentials,
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        // Queue, settings and credential requests
        .route("/requests", post(requests::handle_request))
        // WebSocket endpoint
        .route("/ws", get(crate::ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl GitzipError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GitzipError::Validation(_) => StatusCode::BAD_REQUEST,
            GitzipError::Auth(_) => StatusCode::UNAUTHORIZED,
            GitzipError::NotFound(_) | GitzipError::JobNotFound(_) => StatusCode::NOT_FOUND,
            GitzipError::InvalidTransition { .. } => StatusCode::CONFLICT,
            GitzipError::SizeLimit { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GitzipError::Quota { .. } => StatusCode::TOO_MANY_REQUESTS,
            GitzipError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GitzipError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
                "recoverable": self.is_user_recoverable(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// In-memory state over a [`MemoryForge`](crate::forge::memory::MemoryForge).
#[cfg(test)]
pub(crate) fn test_state(forge: crate::forge::memory::MemoryForge) -> AppState {
    use crate::config::TransferConfig;
    use crate::delivery::MemorySink;
    use crate::forge::memory::MemoryConnector;
    use crate::queue::Pipeline;
    use crate::storage::{KeyValueStore, MemoryStore};

    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let credentials = Arc::new(CredentialStore::new(store.clone()));
    let settings = Arc::new(SettingsStore::new(store, 100));
    let pipeline = Pipeline::new(
        Arc::new(MemoryConnector(Arc::new(forge))),
        credentials.clone(),
        settings.clone(),
        Arc::new(MemorySink::new()),
        TransferConfig::default(),
    );
    AppState::new(TransferQueue::new(pipeline), settings, credentials)
}
