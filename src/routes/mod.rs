use std::{path::PathBuf, sync::Arc};

use axum::{extract::DefaultBodyLimit, routing::get, Extension, Router};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir};

use crate::state::Gateway;

pub mod rooms;
pub mod ws;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(|| async { "Whiteboard server is running" }))
        .nest("/api", rooms::router())
        .nest("/ws",  ws::router())
}

/// Full application: API + socket + static files, with the gateway attached.
pub fn app(gateway: Arc<Gateway>, static_dir: PathBuf, body_limit: usize) -> Router {
    router()
        .fallback_service(ServeDir::new(static_dir))
        .layer(Extension(gateway))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
}
