use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use engine::{DocId, SearchEngine, SplitIndex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const MAX_K: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(alias = "query")]
    pub q: Option<String>,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchResult>,
}

#[derive(Serialize)]
pub struct SearchResult {
    pub doc_id: DocId,
    pub url: String,
    pub score: f32,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: SearchEngine,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": msg.into() })))
}

/// Open the published index under `index_dir` and build the router.
/// Fails when the index is missing or does not pass the open-time checks.
pub fn build_app(index_dir: &str) -> Result<Router> {
    let index = SplitIndex::open(index_dir)?;
    tracing::info!(
        generation = index.generation(),
        num_docs = index.num_docs(),
        num_terms = index.num_terms(),
        "index loaded"
    );
    Ok(router(SearchEngine::new(Arc::new(index))))
}

pub fn router(engine: SearchEngine) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(AppState { engine })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = match params.q {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err(api_error(StatusCode::BAD_REQUEST, "missing query parameter 'q'")),
    };
    let k = params.k.clamp(1, MAX_K);
    let start = std::time::Instant::now();

    // Posting reads hit the disk; keep them off the async workers.
    let engine = state.engine.clone();
    let q = query.clone();
    let hits = tokio::task::spawn_blocking(move || engine.search(&q))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            tracing::error!(error = %e, query = %query, "search failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let total_hits = hits.len();
    let results = hits
        .into_iter()
        .take(k)
        .map(|h| SearchResult { doc_id: h.doc_id, url: h.url, score: h.score })
        .collect();
    let took_s = start.elapsed().as_secs_f64();
    tracing::debug!(query = %query, total_hits, took_s, "search");
    Ok(Json(SearchResponse { query, took_s, total_hits, results }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<Value>, ApiError> {
    match state.engine.index().document(doc_id) {
        Some(rec) => serde_json::to_value(rec)
            .map(Json)
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        None => Err(api_error(StatusCode::NOT_FOUND, "not found")),
    }
}
