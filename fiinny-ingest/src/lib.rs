//! fiinny-ingest library interface
//!
//! Transaction ingestion and categorization pipeline, its document store,
//! and the HTTP trigger surface. Exposed as a library for integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod heuristics;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use fiinny_common::config::OracleConfig;

use crate::services::{
    Classifier, ClassifyError, HeuristicClassifier, IngestPipeline, OracleClient,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Deliveries handled since startup
    pub jobs_processed: Arc<AtomicU64>,
    /// Last delivery error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self {
            pipeline,
            startup_time: Utc::now(),
            jobs_processed: Arc::new(AtomicU64::new(0)),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Classifier for the configured oracle
///
/// Without an endpoint the keyword heuristic answers alone.
pub fn build_classifier(config: &OracleConfig) -> Result<Arc<dyn Classifier>, ClassifyError> {
    match &config.endpoint {
        Some(endpoint) => {
            let client = OracleClient::new(endpoint.clone(), Duration::from_secs(config.timeout_secs))?
                .with_degrade_on_unreachable(config.degrade_on_unreachable);
            tracing::info!(
                endpoint = %client.endpoint(),
                timeout_secs = config.timeout_secs,
                degrade_on_unreachable = config.degrade_on_unreachable,
                "Using classification oracle"
            );
            Ok(Arc::new(client))
        }
        None => {
            tracing::warn!("No oracle endpoint configured, classifying with keyword heuristics only");
            Ok(Arc::new(HeuristicClassifier))
        }
    }
}
