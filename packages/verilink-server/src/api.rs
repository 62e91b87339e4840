//! HTTP API.
//!
//! The command surface of the linking engine. Every code failure is
//! reported with the same message so callers cannot probe which codes exist.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use verilink_core::linking::{
    CommunityConfig, InteractionEvent, InteractiveStart, LinkOutcome, MemberTransition,
    UnlinkOutcome,
};
use verilink_core::Error;

use crate::state::AppState;

const CODE_NOT_FOUND: &str = "Code not found!";
const NOT_CONFIGURED: &str = "This community has not been configured yet";
const SOMETHING_WRONG: &str = "Something went wrong";

// ── Request Bodies ────────────────────────────────────────────────────────────

/// POST /link/code
#[derive(Debug, Deserialize)]
pub struct CodeLinkRequest {
    pub community_id: String,
    pub chat_id: String,
    /// Content platform username the code was issued for.
    pub username: String,
    /// Code as typed by the user.
    pub code: String,
}

/// POST /link/interactive
#[derive(Debug, Deserialize)]
pub struct InteractiveLinkRequest {
    pub community_id: String,
    pub chat_id: String,
    /// Display tag of the chat user, quoted in the code message.
    pub chat_tag: String,
    pub username: String,
    /// Message carrying the Yes/No buttons.
    pub message_id: String,
}

/// POST /unlink
#[derive(Debug, Deserialize)]
pub struct UnlinkRequest {
    pub community_id: String,
    pub chat_id: String,
}

/// POST /members/screening
#[derive(Debug, Deserialize)]
pub struct ScreeningRequest {
    pub community_id: String,
    #[serde(flatten)]
    pub transition: MemberTransition,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/link/code", post(link_by_code))
        .route("/link/interactive", post(start_interactive_link))
        .route("/interactions", post(publish_interaction))
        .route("/sessions/:id", get(get_session))
        .route("/unlink", post(unlink))
        .route("/links/:chat_id", get(get_link))
        .route("/communities/:id", put(set_community))
        .route("/members/screening", post(member_screening))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

fn unexpected(error: Error) -> Response {
    tracing::error!(code = error.code(), error = %error, "Unexpected failure");
    message(StatusCode::INTERNAL_SERVER_ERROR, SOMETHING_WRONG)
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "verilink-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Link with a one-time code.
///
/// POST /link/code
/// Body: { "community_id": "...", "chat_id": "...", "username": "nimrod", "code": "482193" }
async fn link_by_code(
    State(state): State<AppState>,
    Json(request): Json<CodeLinkRequest>,
) -> Response {
    let outcome = state
        .facade
        .link_by_code(
            &request.community_id,
            &request.chat_id,
            &request.username,
            &request.code,
        )
        .await;

    match outcome {
        Ok(LinkOutcome::Linked { connection }) => (
            StatusCode::OK,
            Json(json!({
                "status": "linked",
                "message": "You are now verified!",
                "connection": connection,
            })),
        )
            .into_response(),
        Ok(LinkOutcome::CodeNotFound) => message(StatusCode::NOT_FOUND, CODE_NOT_FOUND),
        Ok(LinkOutcome::AlreadyLinked) => message(StatusCode::CONFLICT, CODE_NOT_FOUND),
        Ok(LinkOutcome::NotConfigured) => message(StatusCode::PRECONDITION_FAILED, NOT_CONFIGURED),
        Ok(LinkOutcome::PartialFailure { connection, reason }) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "status": "partial_failure",
                "message": SOMETHING_WRONG,
                "reason": reason,
                "connection": connection,
            })),
        )
            .into_response(),
        Err(e) => unexpected(e),
    }
}

/// Start the interactive protocol.
///
/// POST /link/interactive
/// Returns 202 with the session ID; poll GET /sessions/{id} for the result.
async fn start_interactive_link(
    State(state): State<AppState>,
    Json(request): Json<InteractiveLinkRequest>,
) -> Response {
    let started = state
        .facade
        .start_interactive_link(
            &request.community_id,
            &request.chat_id,
            &request.chat_tag,
            &request.username,
            &request.message_id,
        )
        .await;

    match started {
        Ok(InteractiveStart::Started(session)) => {
            let window = state.facade.settings().confirmation_window.as_secs();
            let candidate = session.candidate().clone();
            let session_id = state.track_session(session);
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "session_id": session_id,
                    "candidate": candidate,
                    "message": format!("Is this you? (Please answer within {} seconds!)", window),
                    "expires_in_secs": window,
                })),
            )
                .into_response()
        }
        Ok(InteractiveStart::UnknownAccount) => message(StatusCode::NOT_FOUND, "User not found!"),
        Ok(InteractiveStart::NotConfigured) => {
            message(StatusCode::PRECONDITION_FAILED, NOT_CONFIGURED)
        }
        Err(e) => unexpected(e),
    }
}

/// Deliver a button press.
///
/// POST /interactions
/// Body: { "responder_id": "...", "message_id": "...", "response": "accept" }
async fn publish_interaction(
    State(state): State<AppState>,
    Json(event): Json<InteractionEvent>,
) -> impl IntoResponse {
    let listeners = state.facade.bus().publish(event);
    Json(json!({ "listeners": listeners }))
}

/// Poll a session.
///
/// GET /sessions/{id}
async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(entry) = state.session(&id) else {
        return message(StatusCode::NOT_FOUND, "Session not found");
    };

    match entry.report {
        None => Json(json!({
            "session_id": id,
            "state": "open",
            "opened_at": entry.opened_at,
        }))
        .into_response(),
        Some(report) => Json(json!({
            "session_id": report.session_id,
            "state": report.state,
            "notice": report.notice,
            "message": report.notice.message(),
            "candidate": report.candidate,
            "finished_at": entry.finished_at,
        }))
        .into_response(),
    }
}

/// Unlink a chat identity.
///
/// POST /unlink
async fn unlink(State(state): State<AppState>, Json(request): Json<UnlinkRequest>) -> Response {
    match state
        .facade
        .unlink(&request.community_id, &request.chat_id)
        .await
    {
        Ok(UnlinkOutcome::Unlinked { connection }) => (
            StatusCode::OK,
            Json(json!({
                "status": "unlinked",
                "message": "You are no longer verified!",
                "connection": connection,
            })),
        )
            .into_response(),
        Ok(UnlinkOutcome::NotFound) => message(StatusCode::NOT_FOUND, "You are not verified!"),
        Ok(UnlinkOutcome::NotConfigured) => {
            message(StatusCode::PRECONDITION_FAILED, NOT_CONFIGURED)
        }
        Ok(UnlinkOutcome::PartialFailure { connection, reason }) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "status": "partial_failure",
                "message": SOMETHING_WRONG,
                "reason": reason,
                "connection": connection,
            })),
        )
            .into_response(),
        Err(e) => unexpected(e),
    }
}

/// Active link of a chat identity.
///
/// GET /links/{chat_id}
async fn get_link(State(state): State<AppState>, Path(chat_id): Path<String>) -> Response {
    match state.facade.linked_account(&chat_id) {
        Ok(Some(connection)) => Json(connection).into_response(),
        Ok(None) => message(StatusCode::NOT_FOUND, "You are not verified!"),
        Err(e) => unexpected(e),
    }
}

/// Set a community's configuration.
///
/// PUT /communities/{id}
/// Body: { "verified_role_id": "...", "welcome_channel_id": "..." }
async fn set_community(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(config): Json<CommunityConfig>,
) -> Response {
    match state.communities.set(&id, config.clone()) {
        Ok(()) => Json(config).into_response(),
        Err(e) => unexpected(e),
    }
}

/// Member screening transition. Posts the welcome prompt when it applies.
///
/// POST /members/screening
async fn member_screening(
    State(state): State<AppState>,
    Json(request): Json<ScreeningRequest>,
) -> Response {
    let notice = match state
        .facade
        .welcome_for(&request.community_id, &request.transition)
        .await
    {
        Ok(Some(notice)) => notice,
        Ok(None) => return Json(json!({ "welcomed": false })).into_response(),
        Err(e) => return unexpected(e),
    };

    let text = format!("<@{}> {}", notice.chat_id, notice.text);
    match state.messenger.post_message(&notice.channel_id, &text).await {
        Ok(()) => Json(json!({ "welcomed": true, "channel_id": notice.channel_id }))
            .into_response(),
        Err(e) => {
            tracing::warn!(channel = notice.channel_id.as_str(), error = %e, "Failed to post welcome");
            message(StatusCode::BAD_GATEWAY, SOMETHING_WRONG)
        }
    }
}
