//! Backend → chat-completions responses and stream chunks.

use super::openai_types::{
    ChatCompletionChunk, ChatCompletionResponse, ChatMessage, ChatUsage, Choice, ChunkChoice,
    ChunkDelta,
};
use crate::converse::{BackendStreamEvent, BlockDelta, ContentBlock, ConverseResponse, StopReason};

pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

/// Translate a non-streaming backend response. `model` is the name the client
/// asked for, not the resolved backend ID.
pub fn converse_to_openai(
    resp: &ConverseResponse,
    model: &str,
    completion_id: &str,
    created: i64,
) -> ChatCompletionResponse {
    let text: String = resp
        .message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();

    ChatCompletionResponse {
        id: completion_id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage::new("assistant", text),
            finish_reason: Some(finish_reason(Some(resp.stop_reason)).to_string()),
        }],
        usage: ChatUsage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.total_tokens,
        },
    }
}

/// Map a backend stop reason to an OpenAI `finish_reason`.
pub fn finish_reason(stop_reason: Option<StopReason>) -> &'static str {
    match stop_reason {
        Some(StopReason::MaxTokens) => "length",
        Some(StopReason::ToolUse) => "tool_calls",
        Some(StopReason::ContentFiltered | StopReason::GuardrailIntervened) => "content_filter",
        Some(StopReason::EndTurn | StopReason::StopSequence) | None => "stop",
    }
}

/// The text carried by a backend event, if any. Everything else (tool-use
/// starts and input fragments, block stops, metadata) has no chat-completions
/// representation and is dropped.
pub fn text_fragment(event: &BackendStreamEvent) -> Option<&str> {
    match event {
        BackendStreamEvent::ContentBlockDelta {
            delta: BlockDelta::Text(text),
            ..
        } => Some(text.as_str()),
        _ => None,
    }
}

fn chunk(
    completion_id: &str,
    model: &str,
    created: i64,
    delta: ChunkDelta,
    finish_reason: Option<&str>,
) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: completion_id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason: finish_reason.map(str::to_string),
        }],
    }
}

pub fn role_chunk(completion_id: &str, model: &str, created: i64) -> ChatCompletionChunk {
    let delta = ChunkDelta {
        role: Some("assistant".to_string()),
        content: None,
    };
    chunk(completion_id, model, created, delta, None)
}

/// One chunk per text fragment, carrying only that fragment.
pub fn stream_chunk(text: &str, completion_id: &str, model: &str, created: i64) -> ChatCompletionChunk {
    let delta = ChunkDelta {
        role: None,
        content: Some(text.to_string()),
    };
    chunk(completion_id, model, created, delta, None)
}

pub fn stop_chunk(
    stop_reason: Option<StopReason>,
    completion_id: &str,
    model: &str,
    created: i64,
) -> ChatCompletionChunk {
    chunk(
        completion_id,
        model,
        created,
        ChunkDelta::default(),
        Some(finish_reason(stop_reason)),
    )
}
