//! Request orchestration: resolve the model, translate, call the backend and
//! translate the answer back for the calling protocol.

use crate::converse::{BackendEventStream, BackendStreamEvent, ConverseClient, StopReason, TokenUsage};
use crate::error::{reason_phrase, GatewayError, Result};
use crate::logging::SharedRequestLog;
use crate::models::ModelResolver;
use crate::translate::anthropic_request::{anthropic_to_converse, estimate_input_tokens};
use crate::translate::anthropic_response::converse_to_anthropic;
use crate::translate::anthropic_types::{CountTokensResponse, MessagesRequest, MessagesResponse, StreamEvent};
use crate::translate::openai_types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::translate::request::openai_to_converse;
use crate::translate::response::{
    completion_id, converse_to_openai, role_chunk, stop_chunk, stream_chunk, text_fragment,
};
use crate::translate::streaming::StreamTranslator;

use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::sync::Arc;

pub const OPENAI: &str = "openai";
pub const ANTHROPIC: &str = "anthropic";

/// One server-sent event, before transport framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<&'static str>,
    pub data: String,
}

impl SseFrame {
    fn data(data: String) -> Self {
        Self { event: None, data }
    }

    fn named(event: &'static str, data: String) -> Self {
        Self {
            event: Some(event),
            data,
        }
    }
}

pub type SseStream = BoxStream<'static, SseFrame>;

#[derive(Clone)]
pub struct Gateway {
    resolver: ModelResolver,
    client: Arc<dyn ConverseClient>,
    log: SharedRequestLog,
}

impl Gateway {
    pub fn new(resolver: ModelResolver, client: Arc<dyn ConverseClient>, log: SharedRequestLog) -> Self {
        Self {
            resolver,
            client,
            log,
        }
    }

    pub fn log(&self) -> &SharedRequestLog {
        &self.log
    }

    pub async fn chat_completion(&self, req: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let model_id = self.resolver.resolve(&req.model);
        self.log.request(OPENAI, &req.model, &model_id, false);

        let converse_req = openai_to_converse(req, &model_id)
            .map_err(|e| self.record_failure(OPENAI, &model_id, e))?;

        let resp = self
            .client
            .converse(converse_req)
            .await
            .map_err(|e| self.record_failure(OPENAI, &model_id, e.into()))?;

        tracing::info!(
            model = %model_id,
            input_tokens = resp.usage.input_tokens,
            output_tokens = resp.usage.output_tokens,
            latency_ms = resp.latency_ms,
            "Chat completion finished"
        );
        self.log.completion(OPENAI, &model_id, resp.usage.input_tokens, resp.usage.output_tokens);

        let created = chrono::Utc::now().timestamp();
        Ok(converse_to_openai(&resp, &req.model, &completion_id(), created))
    }

    /// Open a chat-completions stream. Translation and handshake failures are
    /// returned as `Err` before any frame exists.
    pub async fn chat_completion_stream(&self, req: &ChatCompletionRequest) -> Result<SseStream> {
        let model_id = self.resolver.resolve(&req.model);
        self.log.request(OPENAI, &req.model, &model_id, true);

        let converse_req = openai_to_converse(req, &model_id)
            .map_err(|e| self.record_failure(OPENAI, &model_id, e))?;

        let events = self
            .client
            .converse_stream(converse_req)
            .await
            .map_err(|e| self.record_failure(OPENAI, &model_id, e.into()))?;

        Ok(chat_frames(events, req.model.clone(), model_id, self.log.clone()))
    }

    pub async fn messages(&self, req: &MessagesRequest) -> Result<MessagesResponse> {
        let model_id = self.resolver.resolve(&req.model);
        self.log.request(ANTHROPIC, &req.model, &model_id, false);

        let converse_req = anthropic_to_converse(req, &model_id)
            .map_err(|e| self.record_failure(ANTHROPIC, &model_id, e))?;

        let resp = self
            .client
            .converse(converse_req)
            .await
            .map_err(|e| self.record_failure(ANTHROPIC, &model_id, e.into()))?;

        tracing::info!(
            model = %model_id,
            stop_reason = resp.stop_reason.as_str(),
            input_tokens = resp.usage.input_tokens,
            output_tokens = resp.usage.output_tokens,
            "Message finished"
        );
        self.log.completion(ANTHROPIC, &model_id, resp.usage.input_tokens, resp.usage.output_tokens);

        Ok(converse_to_anthropic(&resp, &req.model))
    }

    pub async fn messages_stream(&self, req: &MessagesRequest) -> Result<SseStream> {
        let model_id = self.resolver.resolve(&req.model);
        self.log.request(ANTHROPIC, &req.model, &model_id, true);

        let converse_req = anthropic_to_converse(req, &model_id)
            .map_err(|e| self.record_failure(ANTHROPIC, &model_id, e))?;

        let events = self
            .client
            .converse_stream(converse_req)
            .await
            .map_err(|e| self.record_failure(ANTHROPIC, &model_id, e.into()))?;

        Ok(message_frames(events, req.model.clone(), model_id, self.log.clone()))
    }

    pub fn count_tokens(&self, req: &MessagesRequest) -> CountTokensResponse {
        CountTokensResponse {
            input_tokens: estimate_input_tokens(req),
        }
    }

    /// Log a failure with full detail and hand the error back for the client.
    fn record_failure(&self, protocol: &str, model_id: &str, err: GatewayError) -> GatewayError {
        let status = err.status_code();
        if status.is_server_error() {
            tracing::error!(protocol, model = %model_id, status = status.as_u16(), error = %err, "Request failed");
        } else {
            tracing::warn!(protocol, model = %model_id, status = status.as_u16(), error = %err, "Request rejected");
        }
        self.log
            .failure(protocol, model_id, status.as_u16(), err.kind(), &err.to_string());
        err
    }
}

fn encode<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize stream frame");
            None
        }
    }
}

fn anthropic_frame(event: &StreamEvent) -> Option<SseFrame> {
    encode(event).map(|json| SseFrame::named(event.event_name(), json))
}

/// Chat-completions framing: role chunk, one chunk per text fragment, stop
/// chunk, `[DONE]`. A backend failure ends the stream with a single `error`
/// event and no `[DONE]`.
fn chat_frames(
    mut events: BackendEventStream,
    model: String,
    model_id: String,
    log: SharedRequestLog,
) -> SseStream {
    let stream = async_stream::stream! {
        let id = completion_id();
        let created = chrono::Utc::now().timestamp();

        if let Some(json) = encode(&role_chunk(&id, &model, created)) {
            yield SseFrame::data(json);
        }

        let mut stop_reason: Option<StopReason> = None;
        let mut usage = TokenUsage::default();
        let mut failure = None;

        while let Some(item) = events.next().await {
            match item {
                Ok(BackendStreamEvent::MessageStop { stop_reason: reason }) => stop_reason = Some(reason),
                Ok(BackendStreamEvent::Metadata { usage: u }) => usage = u,
                Ok(event) => {
                    if let Some(text) = text_fragment(&event) {
                        if let Some(json) = encode(&stream_chunk(text, &id, &model, created)) {
                            yield SseFrame::data(json);
                        }
                    }
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        match failure {
            Some(err) => {
                let status = err.status_code();
                tracing::error!(model = %model_id, error = %err, "Backend stream failed");
                log.failure(OPENAI, &model_id, status.as_u16(), &err.kind, &err.message);
                let body = serde_json::json!({ "error": reason_phrase(status) });
                yield SseFrame::named("error", body.to_string());
            }
            None => {
                if let Some(json) = encode(&stop_chunk(stop_reason, &id, &model, created)) {
                    yield SseFrame::data(json);
                }
                yield SseFrame::data("[DONE]".to_string());
                log.completion(OPENAI, &model_id, usage.input_tokens, usage.output_tokens);
            }
        }
    };
    stream.boxed()
}

/// Messages framing, driven by [`StreamTranslator`]. Reading stops at the
/// backend's `MessageStop`; dropping `events` releases the backend stream.
fn message_frames(
    mut events: BackendEventStream,
    model: String,
    model_id: String,
    log: SharedRequestLog,
) -> SseStream {
    let stream = async_stream::stream! {
        let mut translator = StreamTranslator::new(&model);
        let mut usage = TokenUsage::default();
        let mut failed = false;

        for event in translator.start() {
            if let Some(frame) = anthropic_frame(&event) {
                yield frame;
            }
        }

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if let BackendStreamEvent::Metadata { usage: u } = &event {
                        usage = *u;
                    }
                    for out in translator.process_event(&event) {
                        if let Some(frame) = anthropic_frame(&out) {
                            yield frame;
                        }
                    }
                    if translator.is_finished() {
                        break;
                    }
                }
                Err(err) => {
                    let status = err.status_code();
                    tracing::error!(model = %model_id, error = %err, "Backend stream failed");
                    log.failure(ANTHROPIC, &model_id, status.as_u16(), &err.kind, &err.message);
                    let out = translator.error_event(reason_phrase(status));
                    if let Some(frame) = anthropic_frame(&out) {
                        yield frame;
                    }
                    failed = true;
                    break;
                }
            }
        }

        if !translator.is_finished() {
            tracing::warn!(model = %model_id, "Backend stream ended without MessageStop");
            log.warn(ANTHROPIC, "stream ended without message_stop");
            for out in translator.finish() {
                if let Some(frame) = anthropic_frame(&out) {
                    yield frame;
                }
            }
        }

        if !failed {
            log.completion(ANTHROPIC, &model_id, usage.input_tokens, usage.output_tokens);
        }
    };
    stream.boxed()
}
