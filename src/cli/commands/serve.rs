//! HTTP API server for integration with other systems.
//!
//! Exposes processing, topics and question answering as JSON endpoints.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::TubeqaError;
use crate::index::ScoredChunk;
use crate::orchestrator::{Pipeline, ProcessResult};
use crate::rag::ChatTurn;
use crate::topics::TopicBlock;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::new(settings)?);
    let app = router(pipeline);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("tubeqa API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Process", "POST /process");
    Output::kv("Topics", "GET  /topics/{video_id}");
    Output::kv("Search", "POST /search");
    Output::kv("Videos", "GET  /videos");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Routes over a shared pipeline, with permissive CORS.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/process", post(process))
        .route("/topics/{video_id}", get(topics))
        .route("/search", post(search))
        .route("/videos", get(videos))
        .layer(cors)
        .with_state(pipeline)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ProcessRequest {
    /// YouTube URL or video id
    url: String,
    /// Re-process even if cached
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    video_id: String,
    #[serde(default)]
    conversation_history: Vec<Message>,
}

#[derive(Serialize)]
struct SearchResponse {
    answer: String,
    sources: Vec<ScoredChunk>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

/// Library errors as HTTP responses.
struct ApiError(TubeqaError);

impl From<TubeqaError> for ApiError {
    fn from(e: TubeqaError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TubeqaError::InvalidVideoId(_) => StatusCode::BAD_REQUEST,
            TubeqaError::VideoNotIndexed(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

/// Pair each user message with the assistant reply that follows it.
fn history_from_messages(messages: &[Message]) -> Vec<ChatTurn> {
    let mut turns = Vec::new();
    let mut question: Option<&str> = None;
    for message in messages {
        match message.role.as_str() {
            "user" => question = Some(&message.content),
            "assistant" => {
                if let Some(q) = question.take() {
                    let turn = ChatTurn::following(&turns, q, message.content.as_str());
                    turns.push(turn);
                }
            }
            _ => {}
        }
    }
    turns
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn process(
    State(pipeline): State<Arc<Pipeline>>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResult>, ApiError> {
    info!("Processing video: {}", req.url);
    let result = if req.force {
        pipeline.process_forced(&req.url).await?
    } else {
        pipeline.process(&req.url).await?
    };
    Ok(Json(result))
}

async fn topics(
    State(pipeline): State<Arc<Pipeline>>,
    Path(video_id): Path<String>,
) -> Result<Json<Vec<TopicBlock>>, ApiError> {
    Ok(Json(pipeline.topics(&video_id).await?))
}

async fn search(
    State(pipeline): State<Arc<Pipeline>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let history = history_from_messages(&req.conversation_history);
    let answer = pipeline.search(&req.query, &req.video_id, &history).await?;
    Ok(Json(SearchResponse {
        answer: answer.text,
        sources: answer.sources,
    }))
}

async fn videos(State(pipeline): State<Arc<Pipeline>>) -> Result<impl IntoResponse, ApiError> {
    let videos = pipeline.list().await?;
    Ok(Json(serde_json::json!({ "total": videos.len(), "videos": videos })))
}
