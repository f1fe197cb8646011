//! Backend Converse data model and the client seam.
//!
//! These types are what the translators produce and consume. They mirror the
//! Converse API closely but carry no SDK types, so translators stay pure and
//! tests can drive the gateway with a mock [`ConverseClient`].

use crate::error::BackendError;
use crate::translate::image::ImageData;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Only the two conversational roles map; everything else is `None`.
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    Image(ImageData),
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<String>,
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InferenceConfig {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// `None` is deliberately absent: it has no backend encoding and is expressed
/// by omitting the whole [`ToolConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoicePolicy {
    Auto,
    Any,
    Specific(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub tools: Vec<ToolSpec>,
    pub choice: ToolChoicePolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConverseRequest {
    pub model_id: String,
    pub system: Vec<String>,
    pub messages: Vec<Message>,
    pub inference_config: InferenceConfig,
    pub tool_config: Option<ToolConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    GuardrailIntervened,
    ContentFiltered,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::ToolUse => "tool_use",
            Self::MaxTokens => "max_tokens",
            Self::StopSequence => "stop_sequence",
            Self::GuardrailIntervened => "guardrail_intervened",
            Self::ContentFiltered => "content_filtered",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConverseResponse {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStart {
    ToolUse { id: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockDelta {
    Text(String),
    ToolInput(String),
}

/// One event of a backend stream, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendStreamEvent {
    ContentBlockStart { index: u32, start: BlockStart },
    ContentBlockDelta { index: u32, delta: BlockDelta },
    ContentBlockStop { index: u32 },
    MessageStop { stop_reason: StopReason },
    Metadata { usage: TokenUsage },
}

pub type BackendEventStream = BoxStream<'static, Result<BackendStreamEvent, BackendError>>;

/// The backend seam. Implementations own connection handling, signing and
/// retries.
///
/// `converse_stream` must finish the handshake before returning so that
/// throttling or validation failures surface as a plain `Err` rather than
/// inside an already-open stream.
#[async_trait]
pub trait ConverseClient: Send + Sync {
    async fn converse(&self, request: ConverseRequest) -> Result<ConverseResponse, BackendError>;

    async fn converse_stream(
        &self,
        request: ConverseRequest,
    ) -> Result<BackendEventStream, BackendError>;
}
