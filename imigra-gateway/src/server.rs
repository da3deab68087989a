use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use imigra_db::{DbError, NewUser, PendingTicket};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::answerer::AnswerOptions;
use crate::deterministic_messages::operator;
use crate::desk::{DeskError, DeskService};
use crate::state::AppState;
use crate::web::search::SearchDepth;

/// Incoming question from a transport
#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub user: NewUser,
    pub text: String,
    #[serde(default)]
    pub use_web_search: bool,
    #[serde(default)]
    pub search_depth: Option<SearchDepth>,
}

/// Operator reply to an escalated question
#[derive(Debug, Deserialize)]
pub struct OperatorAnswerRequest {
    pub operator_id: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct TicketsQuery {
    pub operator_id: String,
}

#[derive(Debug, Serialize)]
pub struct TicketsResponse {
    pub tickets: Vec<PendingTicket>,
    /// Rendered listing for chat transports
    pub text: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>, bind_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/questions", post(question_handler))
        .route("/questions/{id}/answer", post(answer_handler))
        .route("/tickets", get(tickets_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /questions
async fn question_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuestionRequest>,
) -> Response {
    let options = AnswerOptions {
        use_web_search: request.use_web_search,
        search_depth: request.search_depth.unwrap_or(state.search_depth),
    };

    match state
        .desk
        .handle_question(&request.user, &request.text, options)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(DeskError::EmptyQuestion) => {
            error_response(StatusCode::BAD_REQUEST, "question text is empty")
        }
        Err(e) => {
            error!("Failed to handle question: {}", e);
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                DeskService::technical_error_reply(&request.text),
            )
        }
    }
}

/// POST /questions/{id}/answer
async fn answer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<OperatorAnswerRequest>,
) -> Response {
    if !state.access.is_operator(&request.operator_id) {
        warn!(operator_id = %request.operator_id, "answer rejected: not an operator");
        return error_response(StatusCode::FORBIDDEN, operator::NOT_AN_OPERATOR);
    }
    if request.answer.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "answer is empty");
    }

    match state
        .desk
        .record_human_answer(id, request.operator_id.trim(), request.answer.trim())
        .await
    {
        Ok(recorded) => (StatusCode::OK, Json(recorded)).into_response(),
        Err(DeskError::Db(DbError::InteractionNotFound(_))) => {
            error_response(StatusCode::NOT_FOUND, format!("question {} not found", id))
        }
        Err(DeskError::Db(DbError::AlreadyAnswered(_))) => error_response(
            StatusCode::CONFLICT,
            format!("question {} is already answered", id),
        ),
        Err(DeskError::Db(DbError::InvalidTransition { .. })) => error_response(
            StatusCode::CONFLICT,
            format!("question {} is still being answered automatically", id),
        ),
        Err(e) => {
            error!("Failed to record operator answer: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /tickets?operator_id=...
async fn tickets_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TicketsQuery>,
) -> Response {
    if !state.access.is_operator(&query.operator_id) {
        return error_response(StatusCode::FORBIDDEN, operator::NOT_AN_OPERATOR);
    }

    match state.desk.pending_tickets().await {
        Ok(tickets) => {
            let text = operator::pending_list(&tickets);
            (StatusCode::OK, Json(TicketsResponse { tickets, text })).into_response()
        }
        Err(e) => {
            error!("Failed to list tickets: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
