use crate::config::{GatewayConfig, LimitsConfig};
use crate::converse::ConverseClient;
use crate::error::{GatewayError, Result};
use crate::gateway::{Gateway, SseFrame, SseStream};
use crate::logging::SharedRequestLog;
use crate::models::{catalog, owned_by};
use crate::translate::anthropic_types::{ErrorResponse, MessagesRequest};
use crate::translate::openai_types::{ChatCompletionRequest, ChatErrorResponse, ModelList, ModelObject};

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub gateway: Gateway,
    /// `None` disables authentication.
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        client: Arc<dyn ConverseClient>,
        log: SharedRequestLog,
        api_key: Option<String>,
    ) -> Self {
        let gateway = Gateway::new(config.model_resolver(), client, log);
        Self {
            config,
            gateway,
            api_key,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/v1/models", get(handle_models))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/messages", post(handle_messages))
        .route("/v1/messages/count_tokens", post(handle_count_tokens))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(handle_health))
        .merge(api)
        .layer(DefaultBodyLimit::max(state.config.limits.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

async fn require_api_key(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(req).await;
    };

    if presented_keys(req.headers()).any(|key| key_matches(key, expected)) {
        return next.run(req).await;
    }

    tracing::warn!(path = %req.uri().path(), "Rejected request with missing or invalid API key");
    let message = "Invalid or missing API key";
    if req.uri().path().starts_with("/v1/chat") {
        chat_error(StatusCode::UNAUTHORIZED, message)
    } else {
        messages_error(StatusCode::UNAUTHORIZED, message)
    }
}

/// Keys offered via `x-api-key` or `Authorization: Bearer`. A bare
/// `Authorization` value without the scheme is not a key.
fn presented_keys(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    let x_api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim());
    x_api_key.into_iter().chain(bearer)
}

fn key_matches(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_health() -> StatusCode {
    StatusCode::OK
}

async fn handle_models() -> Json<ModelList> {
    let created = chrono::Utc::now().timestamp();
    let data = catalog()
        .into_iter()
        .map(|entry| ModelObject {
            id: entry.name.to_string(),
            object: "model".to_string(),
            created,
            owned_by: owned_by(entry.model_id),
        })
        .collect();

    Json(ModelList {
        object: "list".to_string(),
        data,
    })
}

async fn handle_chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: ChatCompletionRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(e) => return chat_error_response(&e),
    };

    if let Err(e) = check_chat_limits(&req, &state.config.limits) {
        tracing::warn!(error = %e, "Chat request exceeds input limits");
        return chat_error_response(&e);
    }

    tracing::debug!(model = %req.model, stream = req.is_stream(), messages = req.messages.len(), "Chat completion request");

    if req.is_stream() {
        match state.gateway.chat_completion_stream(&req).await {
            Ok(stream) => sse_response(stream),
            Err(e) => chat_error_response(&e),
        }
    } else {
        match state.gateway.chat_completion(&req).await {
            Ok(resp) => Json(resp).into_response(),
            Err(e) => chat_error_response(&e),
        }
    }
}

async fn handle_messages(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: MessagesRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(e) => return messages_error_response(&e),
    };

    tracing::debug!(model = %req.model, stream = req.is_stream(), messages = req.messages.len(), "Messages request");

    if req.is_stream() {
        match state.gateway.messages_stream(&req).await {
            Ok(stream) => sse_response(stream),
            Err(e) => messages_error_response(&e),
        }
    } else {
        match state.gateway.messages(&req).await {
            Ok(resp) => Json(resp).into_response(),
            Err(e) => messages_error_response(&e),
        }
    }
}

async fn handle_count_tokens(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match parse_body::<MessagesRequest>(&body) {
        Ok(req) => Json(state.gateway.count_tokens(&req)).into_response(),
        Err(e) => messages_error_response(&e),
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse request body");
        GatewayError::invalid_request(format!("Invalid request body: {e}"))
    })
}

// ---------------------------------------------------------------------------
// Input guardrails
// ---------------------------------------------------------------------------

/// Reject oversized chat requests before translation. Limits are inclusive.
pub fn check_chat_limits(req: &ChatCompletionRequest, limits: &LimitsConfig) -> Result<()> {
    if req.model.chars().count() > limits.max_model_name_length {
        return Err(GatewayError::invalid_request(format!(
            "Model name exceeds {} characters",
            limits.max_model_name_length
        )));
    }

    if req.messages.len() > limits.max_messages {
        return Err(GatewayError::invalid_request(format!(
            "Too many messages: {} (max {})",
            req.messages.len(),
            limits.max_messages
        )));
    }

    if let Some(index) = req
        .messages
        .iter()
        .position(|m| m.content.text_only().chars().count() > limits.max_message_chars)
    {
        return Err(GatewayError::invalid_request(format!(
            "Message {index} exceeds {} characters",
            limits.max_message_chars
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn sse_response(stream: SseStream) -> Response {
    let events = stream.map(|frame| Ok::<_, Infallible>(sse_event(frame)));
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

fn sse_event(frame: SseFrame) -> Event {
    let event = Event::default().data(frame.data);
    match frame.event {
        Some(name) => event.event(name),
        None => event,
    }
}

fn chat_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ChatErrorResponse::new(status.as_u16(), message))).into_response()
}

fn messages_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::for_status(status.as_u16(), message))).into_response()
}

fn chat_error_response(err: &GatewayError) -> Response {
    chat_error(err.status_code(), err.client_message())
}

fn messages_error_response(err: &GatewayError) -> Response {
    messages_error(err.status_code(), err.client_message())
}
