//! HTTP surface for the policy QA service.
//!
//! The router exposes three endpoints:
//!
//! - `POST /api/chat` – Answer a question from indexed policy documents.
//!   Accepts the question and optional conversation history, returns the
//!   answer with its citations.
//! - `POST /api/chat/debug` – Same pipeline, but the response also carries
//!   the full query trace (retrieved chunks, prompt, raw model output).
//! - `GET /health` – Liveness probe.

use crate::retrieval::{AnswerApi, AnswerError, HistoryTurn, Source};
use crate::trace::QueryTrace;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router over any answer pipeline implementation.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: AnswerApi + 'static,
{
    Router::new()
        .route("/api/chat", post(chat::<S>))
        .route("/api/chat/debug", post(chat_debug::<S>))
        .route("/health", get(health))
        .with_state(service)
}

/// Request body shared by both chat endpoints.
#[derive(Deserialize)]
struct ChatRequest {
    /// Question to answer.
    question: String,
    /// Prior conversation turns, oldest first.
    #[serde(default)]
    history: Vec<HistoryTurn>,
}

/// Success response for `POST /api/chat`.
#[derive(Serialize)]
struct ChatResponse {
    /// Answer text, or a clarifying question.
    answer: String,
    /// Citations backing the answer.
    sources: Vec<Source>,
}

/// Success response for `POST /api/chat/debug`.
#[derive(Serialize)]
struct ChatDebugResponse {
    answer: String,
    sources: Vec<Source>,
    /// Everything recorded about the exchange.
    trace: QueryTrace,
}

async fn chat<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: AnswerApi,
{
    let outcome = answer_request(service.as_ref(), request).await?;
    Ok(Json(ChatResponse {
        answer: outcome.answer,
        sources: outcome.sources,
    }))
}

async fn chat_debug<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatDebugResponse>, AppError>
where
    S: AnswerApi,
{
    let outcome = answer_request(service.as_ref(), request).await?;
    Ok(Json(ChatDebugResponse {
        answer: outcome.answer,
        sources: outcome.sources,
        trace: outcome.trace,
    }))
}

async fn answer_request<S>(
    service: &S,
    request: ChatRequest,
) -> Result<crate::retrieval::AnswerOutcome, AppError>
where
    S: AnswerApi + ?Sized,
{
    let question = request.question.trim();
    if question.is_empty() {
        return Err(AppError::EmptyQuestion);
    }

    let outcome = service.answer(question, &request.history).await?;
    tracing::info!(
        question,
        sources = outcome.sources.len(),
        "Chat request completed"
    );
    Ok(outcome)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

enum AppError {
    EmptyQuestion,
    Pipeline(AnswerError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::EmptyQuestion => {
                (StatusCode::BAD_REQUEST, "question must not be empty").into_response()
            }
            // Provider failures are the upstream's fault, not ours.
            Self::Pipeline(error @ AnswerError::Chat(_))
            | Self::Pipeline(error @ AnswerError::Embedding(_)) => {
                (StatusCode::BAD_GATEWAY, error.to_string()).into_response()
            }
            Self::Pipeline(error) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
            }
        }
    }
}

impl From<AnswerError> for AppError {
    fn from(inner: AnswerError) -> Self {
        Self::Pipeline(inner)
    }
}
