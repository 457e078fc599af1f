//! Climate adaptation plan report server
//!
//! Accepts a template, project metadata, spreadsheets and images, runs the
//! report pipeline in the background and serves the finished document.
//!
//! ## Architecture
//!
//! - [`state::AppState`] holds the shared narrative generator (cache,
//!   rate gate, text client), the optional Dropbox client and the
//!   progress map
//! - [`pipeline`] is an ordered list of stages run by one background task
//!   per report
//! - [`api`] exposes the HTTP endpoints

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod state;

use api::{
    handle_clear_uploads, handle_download, handle_health, handle_mural_extract,
    handle_mural_status, handle_process, handle_progress,
};
pub use state::AppState;

/// Request size cap for `/process` uploads
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// All routes, without the per-IP rate limiter
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Reports
        .route("/process", post(handle_process))
        .route("/progress/:task_id", get(handle_progress))
        .route("/download/:filename", get(handle_download))
        .route("/clear-uploads", post(handle_clear_uploads))
        // Whiteboard
        .route("/mural/extract", post(handle_mural_extract))
        .route("/mural/status", get(handle_mural_status))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
