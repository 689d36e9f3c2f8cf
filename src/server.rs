//! HTTP server exposing the translation workflow graph

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::graph::{is_unknown_thread, RunOutcome, TranslationGraph};
use crate::types::{ChunkInput, StatePatch, TermEntry, WorkflowState};

#[derive(Debug, Deserialize)]
pub struct TranslateChunkRequest {
    pub book_id: String,
    pub chapter_id: u32,
    pub chunk_id: u32,
    pub source_text: String,
    /// Defaults to `ch{chapter}_ck{chunk}`.
    pub thread_id: Option<String>,
    pub use_retrieval: Option<bool>,
    pub human_review: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub thread_id: String,
    /// Human-edited glossary to merge before continuing.
    pub glossary: Option<Vec<TermEntry>>,
}

#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub status: String,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<i64>,
    pub revision_count: u32,
    pub glossary: Vec<TermEntry>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

impl WorkflowResponse {
    fn from_outcome(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed(state) => Self::completed(state),
            RunOutcome::Suspended {
                thread_id,
                paused_after,
            } => Self {
                status: "suspended".to_string(),
                thread_id,
                paused_after: Some(paused_after.label().to_string()),
                translation: None,
                quality_score: None,
                revision_count: 0,
                glossary: Vec::new(),
            },
        }
    }

    fn completed(state: WorkflowState) -> Self {
        Self {
            status: "completed".to_string(),
            thread_id: state.thread_id,
            paused_after: None,
            translation: state.combined_translation,
            quality_score: state.quality_score,
            revision_count: state.revision_count,
            glossary: state.glossary,
        }
    }
}

async fn translate_handler(
    State(graph): State<Arc<TranslationGraph>>,
    Json(req): Json<TranslateChunkRequest>,
) -> Result<Json<WorkflowResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(
        "translate request: book={} chapter={} chunk={}",
        req.book_id, req.chapter_id, req.chunk_id
    );

    let thread_id = req
        .thread_id
        .unwrap_or_else(|| format!("ch{}_ck{}", req.chapter_id, req.chunk_id));
    let input = ChunkInput {
        book_id: req.book_id,
        chapter_id: req.chapter_id,
        chunk_id: req.chunk_id,
        source_text: req.source_text,
        thread_id,
        use_retrieval: req.use_retrieval.unwrap_or(true),
        human_review_enabled: req.human_review.unwrap_or(false),
        ..Default::default()
    };

    match graph.run(input).await {
        Ok(outcome) => Ok(Json(WorkflowResponse::from_outcome(outcome))),
        Err(e) => {
            error!("workflow run failed: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "workflow run failed".to_string(),
                    details: Some(e.to_string()),
                }),
            ))
        }
    }
}

async fn resume_handler(
    State(graph): State<Arc<TranslationGraph>>,
    Json(req): Json<ResumeRequest>,
) -> Result<Json<WorkflowResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(
        "resume request: thread={} (edited glossary: {})",
        req.thread_id,
        req.glossary.is_some()
    );

    let result = match req.glossary {
        Some(glossary) => {
            let patch = StatePatch {
                glossary: Some(glossary),
            };
            graph.resume_with_patch(&req.thread_id, patch).await
        }
        None => graph.resume(&req.thread_id).await,
    };

    match result {
        Ok(outcome) => Ok(Json(WorkflowResponse::from_outcome(outcome))),
        Err(e) if is_unknown_thread(&e) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "unknown thread".to_string(),
                details: Some(e.to_string()),
            }),
        )),
        Err(e) => {
            error!("resume failed: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "resume failed".to_string(),
                    details: Some(e.to_string()),
                }),
            ))
        }
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "linguagraph".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create and configure the HTTP router.
pub fn create_router(graph: Arc<TranslationGraph>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/translate_chunk", post(translate_handler))
        .route("/resume", post(resume_handler))
        .with_state(graph)
}

/// Run the HTTP server until shutdown.
pub async fn run_server(graph: Arc<TranslationGraph>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    info!("starting linguagraph server on {addr}");

    let app = create_router(graph);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("server listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
