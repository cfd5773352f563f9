//! REST API handlers for the Grove server

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use grove_core::{FileCapsule, GraphStats, Neighbor, NeighborhoodQuery, QueryEngine, SymbolHit};
use grove_enrich::EnrichError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::ServerState;

const DEFAULT_RADIUS: usize = 1;
const DEFAULT_CAP: usize = 50;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no file matches `{0}`")]
    NotFound(String),
}

impl From<EnrichError> for ApiError {
    fn from(err: EnrichError) -> Self {
        match err {
            EnrichError::UnknownFile(query) => ApiError::NotFound(query),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub analyzer: String,
    pub enriching: bool,
}

pub async fn health_check(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        analyzer: state.scheduler.analyzer().name().to_string(),
        enriching: state.scheduler.is_running(),
    })
}

pub async fn get_stats(State(state): State<Arc<ServerState>>) -> Json<GraphStats> {
    let graph = state.graph.read().await;
    Json(QueryEngine::new(&graph).stats())
}

#[derive(Debug, Deserialize)]
pub struct CapsuleParams {
    pub path: String,
}

pub async fn get_capsule(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CapsuleParams>,
) -> Result<Json<FileCapsule>, ApiError> {
    let graph = state.graph.read().await;
    QueryEngine::new(&graph)
        .get_capsule(&params.path)
        .cloned()
        .map(Json)
        .ok_or(ApiError::NotFound(params.path))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn search_symbols(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<SymbolHit>> {
    let graph = state.graph.read().await;
    Json(QueryEngine::new(&graph).search(&params.q).into_iter().cloned().collect())
}

fn default_true() -> bool {
    true
}

fn default_radius() -> usize {
    DEFAULT_RADIUS
}

fn default_cap() -> usize {
    DEFAULT_CAP
}

#[derive(Debug, Deserialize)]
pub struct NeighborhoodParams {
    pub path: String,
    #[serde(default = "default_radius")]
    pub radius: usize,
    #[serde(default = "default_cap")]
    pub cap: usize,
    #[serde(default = "default_true")]
    pub dependents: bool,
    #[serde(default = "default_true")]
    pub dependencies: bool,
}

pub async fn get_neighborhood(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<NeighborhoodParams>,
) -> Result<Json<Vec<Neighbor>>, ApiError> {
    let graph = state.graph.read().await;
    let engine = QueryEngine::new(&graph);
    if engine.get_capsule(&params.path).is_none() {
        return Err(ApiError::NotFound(params.path));
    }

    let query = NeighborhoodQuery {
        include_dependents: params.dependents,
        include_dependencies: params.dependencies,
        ..NeighborhoodQuery::new(params.path, params.radius, params.cap)
    };
    Ok(Json(engine.neighborhood(&query)))
}

#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    /// False when a run was already in progress.
    pub started: bool,
}

pub async fn start_enrichment(State(state): State<Arc<ServerState>>) -> (StatusCode, Json<EnrichResponse>) {
    if state.scheduler.is_running() {
        return (StatusCode::OK, Json(EnrichResponse { started: false }));
    }
    info!("Enrichment started over HTTP");
    state.scheduler.start();
    (StatusCode::ACCEPTED, Json(EnrichResponse { started: true }))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub path: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub relative_path: String,
}

pub async fn analyze_file(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    let path = state.scheduler.request_analysis(&request.path, request.force).await?;
    let relative_path = state.graph.read().await.relative_path(&path);
    Ok((StatusCode::ACCEPTED, Json(AnalyzeResponse { relative_path })))
}
