pub mod handlers;
pub mod response;

use axum::routing::any;
use axum::{middleware, Router};
use std::sync::Arc;

use crate::auth;
use crate::backend::Backend;
use crate::config::AppConfig;
use crate::logging;
use crate::schema::SchemaRegistry;

/// Shared state of the resource server: the backend, the immutable schema
/// registry, and the configuration.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub registry: Arc<SchemaRegistry>,
    pub config: Arc<AppConfig>,
}

/// Build the SCIM router: every registered resource endpoint is served
/// under the configured base URI.
pub fn build_router(state: AppState) -> Router {
    let base = state.config.server.base_uri.trim_end_matches('/').to_string();
    Router::new()
        .route(&format!("{}/:endpoint", base), any(handlers::handle))
        .route(&format!("{}/:endpoint/:id", base), any(handlers::handle))
        .layer(middleware::from_fn(logging::logging_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .with_state(state)
}
