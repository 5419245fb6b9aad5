//! faceloom — photo face clustering and collage service.
//!
//! Ingests a folder of photographs, groups them into time buckets, detects
//! and clusters faces across the whole corpus, lets a reviewer correct the
//! clustering, and renders print-ready collages from the reviewed faces.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::Settings;
use crate::services::{PipelineOrchestrator, RunRegistry};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Run-id-to-context and run-id-to-channel tables.
    pub registry: Arc<RunRegistry>,
    /// Drives each run's worker through scan → detect → cluster.
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<RunRegistry>,
        orchestrator: Arc<PipelineOrchestrator>,
    ) -> Self {
        Self {
            settings,
            registry,
            orchestrator,
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    let static_dir = state.settings.static_dir.clone();
    axum::Router::new()
        .merge(api::scan_routes())
        .merge(api::face_routes())
        .merge(api::collage_routes())
        .merge(api::health_routes())
        .nest_service("/api/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
