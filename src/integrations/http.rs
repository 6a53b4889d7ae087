//! HTTP 传输：/chat 会话接口
//!
//! 一个 thread_id 对应一个会话；请求携带 user_input（新消息）或 human_response（审批决定）之一。

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::agent::{SessionReply, SessionRequest, SessionService};
use crate::core::{AgentError, ReviewDecision, ReviewPrompt, Turn};

/// POST /chat 请求体
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub thread_id: String,
    #[serde(default)]
    pub user_input: Option<String>,
    /// `{"action": "continue" | "reject", "data": "reason"}`
    #[serde(default)]
    pub human_response: Option<ReviewDecision>,
}

/// POST /chat 响应体
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub full_messages: Vec<Turn>,
    pub requires_human_input: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_input_prompt: Option<ReviewPrompt>,
}

impl From<SessionReply> for ChatResponse {
    fn from(reply: SessionReply) -> Self {
        Self {
            response: reply.reply_text,
            full_messages: reply.turns,
            requires_human_input: reply.awaiting_review,
            human_input_prompt: reply.review_prompt,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub thread_id: String,
}

/// 错误响应：Validation -> 400，Protocol -> 409，外部服务失败 -> 500
pub struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgentError::Validation(_) => StatusCode::BAD_REQUEST,
            AgentError::Protocol(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("chat request failed: {}", self.0);
        } else {
            tracing::warn!("chat request rejected: {}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn create_router(service: Arc<SessionService>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/retry", post(retry))
        .route("/health", get(|| async { "OK" }))
        .with_state(service)
}

/// POST /chat
async fn chat(
    State(service): State<Arc<SessionService>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = SessionRequest {
        session_id: req.thread_id,
        user_text: req.user_input,
        decision: req.human_response,
    };
    let reply = service.handle(request).await?;
    Ok(Json(reply.into()))
}

/// POST /chat/retry - 外部错误后重新驱动会话
async fn retry(
    State(service): State<Arc<SessionService>>,
    Json(req): Json<RetryRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = service.retry(&req.thread_id).await?;
    Ok(Json(reply.into()))
}
