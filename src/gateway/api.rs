//! JSON handlers for the chatbot frontend.
//!
//! Error bodies are always `{"error": "..."}` except `/delete_prompt`, which
//! answers `{"success": bool, "message": "..."}` like the frontend expects.

use super::AppState;
use crate::chat::{ChatError, ChatTurn};
use crate::mail::{self, MailError, TranscriptRequest};
use crate::prompts::{ChatbotPrompt, PromptError};
use crate::sessions::{build_conversation_pairs, SessionToken, HISTORY_VIEW_PAIR_LIMIT};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_LANGUAGE: &str = "English";

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

/// Parse a caller-supplied token; absent or blank is a 400.
fn require_token(raw: Option<&str>) -> Result<SessionToken, Response> {
    let raw = raw.map(str::trim).filter(|t| !t.is_empty()).ok_or_else(|| {
        error_response(StatusCode::BAD_REQUEST, "User token is required")
    })?;
    SessionToken::parse(raw)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("Invalid user token: {e}")))
}

// ── Request bodies ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GetResponseBody {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "selectedChatbot")]
    pub selected_chatbot: String,
    pub user_token: Option<String>,
    pub user_name: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub user_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendTranscriptBody {
    pub user_token: Option<String>,
    pub professor_email: Option<String>,
    #[serde(default)]
    pub professor_name: String,
    #[serde(default)]
    pub extra_note: String,
    pub student_email: Option<String>,
    pub student_name: Option<String>,
    pub chatbot_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PromptBody {
    pub title: Option<String>,
    #[serde(flatten)]
    pub prompt: ChatbotPrompt,
}

#[derive(Debug, Deserialize)]
pub struct DeletePromptBody {
    pub prompt_name: Option<String>,
}

// ── Conversation handlers ────────────────────────────────────────

/// POST /start_conversation: mint a fresh session token
pub async fn handle_start_conversation() -> impl IntoResponse {
    let token = SessionToken::generate();
    tracing::info!(token = %token.redacted(), "Conversation started");
    Json(json!({
        "user_token": token,
        "message": "New conversation started",
    }))
}

/// POST /get_response: one chat turn
pub async fn handle_get_response(
    State(state): State<AppState>,
    Json(body): Json<GetResponseBody>,
) -> Response {
    if body.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, ChatError::EmptyMessage);
    }

    let Some(chatbot) = state.prompts.get(&body.selected_chatbot).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Chatbot '{}' not found.", body.selected_chatbot),
        );
    };

    let language = body
        .language
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    let turn = match ChatTurn::new(
        body.user_token.as_deref(),
        body.message,
        chatbot.prompt_text(),
        Some(language),
    ) {
        Ok(turn) => turn,
        Err(e) => return chat_error_response(&e),
    };

    tracing::debug!(
        user = body.user_name.as_deref().unwrap_or("Student"),
        chatbot = %body.selected_chatbot,
        "Handling chat turn"
    );

    match state.chat.respond(turn).await {
        Ok(reply) => Json(json!({
            "response": reply.response,
            "user_token": reply.token,
            "conversation_length": reply.conversation_length,
        }))
        .into_response(),
        Err(e) => chat_error_response(&e),
    }
}

fn chat_error_response(error: &ChatError) -> Response {
    let status = match error {
        ChatError::InvalidToken(_) | ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
        ChatError::Upstream(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(status, error)
}

/// GET /get_conversation: recent complete pairs for display
pub async fn handle_get_conversation(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let token = match require_token(query.user_token.as_deref()) {
        Ok(token) => token,
        Err(response) => return response,
    };

    match state.store.read_raw(&token).await {
        Ok(raw) => {
            let conversations = build_conversation_pairs(&raw, HISTORY_VIEW_PAIR_LIMIT);
            Json(json!({
                "total": conversations.len(),
                "conversations": conversations,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::error!(token = %token.redacted(), error = %e, "Failed to read transcript");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read conversation")
        }
    }
}

/// POST /clear_conversation: delete a transcript (idempotent)
pub async fn handle_clear_conversation(
    State(state): State<AppState>,
    Json(query): Json<TokenQuery>,
) -> Response {
    let token = match require_token(query.user_token.as_deref()) {
        Ok(token) => token,
        Err(response) => return response,
    };

    let _guard = state.store.lock(&token).await;
    match state.store.clear(&token).await {
        Ok(()) => Json(json!({"message": "Conversation history cleared"})).into_response(),
        Err(e) => {
            tracing::error!(token = %token.redacted(), error = %e, "Failed to clear transcript");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to clear conversation",
            )
        }
    }
}

/// POST /send_transcript: mail the transcript to the professor (and student)
pub async fn handle_send_transcript(
    State(state): State<AppState>,
    Json(body): Json<SendTranscriptBody>,
) -> Response {
    let professor_email = body
        .professor_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let (Some(raw_token), Some(professor_email)) = (
        body.user_token.as_deref().filter(|t| !t.trim().is_empty()),
        professor_email,
    ) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "User token and professor email are required",
        );
    };
    let token = match require_token(Some(raw_token)) {
        Ok(token) => token,
        Err(response) => return response,
    };

    let Some(mailer) = state.mailer.as_deref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, MailError::NotConfigured);
    };

    let request = TranscriptRequest {
        token,
        professor_email: professor_email.to_string(),
        professor_name: body.professor_name,
        extra_note: body.extra_note,
        student_email: body.student_email,
        student_name: body.student_name.unwrap_or_else(|| "Student".into()),
        chatbot_name: body.chatbot_name.unwrap_or_else(|| "General Chatbot".into()),
    };

    match mail::send_transcript(
        state.store.as_ref(),
        mailer,
        &request,
        state.clock.now(),
    )
    .await
    {
        Ok(recipients) => {
            state
                .observer
                .record_event(&crate::observability::ObserverEvent::TranscriptMailed {
                    recipients: recipients.len(),
                });
            Json(json!({
                "message": "Transcript sent successfully.",
                "recipients": recipients,
            }))
            .into_response()
        }
        Err(e) => {
            let status = match &e {
                MailError::TranscriptNotFound => StatusCode::NOT_FOUND,
                MailError::Address(_) => StatusCode::BAD_REQUEST,
                MailError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                MailError::Build(_) | MailError::Transport(_) | MailError::Read(_) => {
                    tracing::error!(error = %e, "Transcript email failed");
                    state
                        .observer
                        .record_event(&crate::observability::ObserverEvent::Error {
                            component: "mail".into(),
                            message: e.to_string(),
                        });
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            error_response(status, e)
        }
    }
}

// ── Prompt catalog handlers ──────────────────────────────────────

/// GET /data: the whole chatbot catalog
pub async fn handle_get_data(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.prompts.load().await)
}

fn prompt_error_response(error: &PromptError) -> Response {
    match error {
        PromptError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "Prompt not found"),
        PromptError::Conflict(_) => error_response(
            StatusCode::CONFLICT,
            "A prompt with this title already exists.",
        ),
        PromptError::Io(_) | PromptError::Serialize(_) => {
            tracing::error!(error = %error, "Prompt catalog write failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, error)
        }
    }
}

fn require_title(body: &PromptBody) -> Result<&str, Response> {
    body.title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Title is required"))
}

/// POST /save_prompt: add a chatbot
pub async fn handle_save_prompt(
    State(state): State<AppState>,
    Json(body): Json<PromptBody>,
) -> Response {
    let title = match require_title(&body) {
        Ok(title) => title.to_string(),
        Err(response) => return response,
    };
    match state.prompts.insert(&title, body.prompt).await {
        Ok(()) => Json(json!({"message": "Prompt saved successfully."})).into_response(),
        Err(e) => prompt_error_response(&e),
    }
}

/// POST /update_prompt: replace a chatbot
pub async fn handle_update_prompt(
    State(state): State<AppState>,
    Json(body): Json<PromptBody>,
) -> Response {
    let title = match require_title(&body) {
        Ok(title) => title.to_string(),
        Err(response) => return response,
    };
    match state.prompts.update(&title, body.prompt).await {
        Ok(()) => Json(json!({"message": "Prompt updated successfully."})).into_response(),
        Err(e) => prompt_error_response(&e),
    }
}

/// POST /delete_prompt: remove a chatbot
pub async fn handle_delete_prompt(
    State(state): State<AppState>,
    Json(body): Json<DeletePromptBody>,
) -> Response {
    let Some(name) = body
        .prompt_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": "Prompt name not provided"})),
        )
            .into_response();
    };

    match state.prompts.remove(name).await {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("Prompt \"{name}\" deleted successfully"),
        }))
        .into_response(),
        Err(PromptError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "message": format!("Prompt \"{name}\" not found")})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Prompt catalog write failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "message": "Internal server error"})),
            )
                .into_response()
        }
    }
}

// ── Operational endpoints ────────────────────────────────────────

/// GET /health
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "store": state.store.name(),
        "mailer": state.mailer.as_ref().map(|m| m.name()),
        "observer": state.observer.name(),
    }))
}

/// GET /metrics: Prometheus text exposition when that backend is active
pub async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.observer.render_metrics() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "Metrics are disabled; set [observability] backend = \"prometheus\"",
        ),
    }
}
