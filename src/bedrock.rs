//! [`ConverseClient`] backed by the AWS Bedrock runtime SDK.
//!
//! This is the only module that sees SDK types. Images are base64-decoded
//! here, after the translators have validated format and estimated size.

use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_bedrockruntime::types::{
    AnyToolChoice, AutoToolChoice, ContentBlock as SdkBlock, ContentBlockDelta as SdkDelta,
    ContentBlockStart as SdkStart, ConversationRole, ConverseOutput, ConverseStreamOutput,
    ImageBlock, ImageFormat as SdkImageFormat, ImageSource, InferenceConfiguration,
    Message as SdkMessage, SpecificToolChoice, StopReason as SdkStopReason, SystemContentBlock,
    TokenUsage as SdkUsage, Tool, ToolChoice, ToolConfiguration, ToolInputSchema,
    ToolResultBlock, ToolResultContentBlock, ToolResultStatus, ToolSpecification, ToolUseBlock,
};
use aws_sdk_bedrockruntime::Client;
use aws_smithy_types::{Blob, Document, Number};
use base64::Engine;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::AwsConfig;
use crate::converse::{
    BackendEventStream, BackendStreamEvent, BlockDelta, BlockStart, ContentBlock, ConverseClient,
    ConverseRequest, ConverseResponse, InferenceConfig, Message, Role, StopReason, TokenUsage,
    ToolChoicePolicy, ToolConfig,
};
use crate::error::BackendError;
use crate::translate::image::{ImageData, ImageFormat};

/// Events buffered between the backend pump task and the client writer.
const STREAM_BUFFER: usize = 32;

pub struct BedrockConverseClient {
    client: Client,
}

impl BedrockConverseClient {
    /// Load AWS configuration (region, optional named profile, default
    /// credential chain) and build a runtime client.
    pub async fn from_config(config: &AwsConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl ConverseClient for BedrockConverseClient {
    async fn converse(&self, request: ConverseRequest) -> Result<ConverseResponse, BackendError> {
        let parts = SdkRequest::build(&request)?;

        let output = self
            .client
            .converse()
            .model_id(&request.model_id)
            .set_system(parts.system)
            .set_messages(Some(parts.messages))
            .inference_config(parts.inference_config)
            .set_tool_config(parts.tool_config)
            .send()
            .await
            .map_err(|e| sdk_error(&e))?;

        let message = match output.output() {
            Some(ConverseOutput::Message(msg)) => message_from_sdk(msg),
            _ => Message {
                role: Role::Assistant,
                content: Vec::new(),
            },
        };

        Ok(ConverseResponse {
            message,
            stop_reason: stop_reason_from_sdk(output.stop_reason()),
            usage: output.usage().map(usage_from_sdk).unwrap_or_default(),
            latency_ms: output
                .metrics()
                .map_or(0, |m| u64::try_from(m.latency_ms()).unwrap_or(0)),
        })
    }

    async fn converse_stream(
        &self,
        request: ConverseRequest,
    ) -> Result<BackendEventStream, BackendError> {
        let parts = SdkRequest::build(&request)?;

        // The handshake happens here; failures surface before any stream exists
        let output = self
            .client
            .converse_stream()
            .model_id(&request.model_id)
            .set_system(parts.system)
            .set_messages(Some(parts.messages))
            .inference_config(parts.inference_config)
            .set_tool_config(parts.tool_config)
            .send()
            .await
            .map_err(|e| sdk_error(&e))?;

        let mut receiver = output.stream;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            loop {
                let item = match receiver.recv().await {
                    Ok(Some(output)) => match event_from_sdk(output) {
                        Some(event) => Ok(event),
                        None => continue,
                    },
                    Ok(None) => break,
                    Err(e) => Err(sdk_error(&e)),
                };

                let terminal = item.is_err();
                if tx.send(item).await.is_err() {
                    tracing::debug!("Stream receiver dropped, releasing backend stream");
                    break;
                }
                if terminal {
                    break;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// SDK-typed request parts shared by `converse` and `converse_stream`.
struct SdkRequest {
    system: Option<Vec<SystemContentBlock>>,
    messages: Vec<SdkMessage>,
    inference_config: InferenceConfiguration,
    tool_config: Option<ToolConfiguration>,
}

impl SdkRequest {
    fn build(request: &ConverseRequest) -> Result<Self, BackendError> {
        let system = (!request.system.is_empty()).then(|| {
            request
                .system
                .iter()
                .map(|text| SystemContentBlock::Text(text.clone()))
                .collect()
        });

        let messages = request
            .messages
            .iter()
            .map(message_to_sdk)
            .collect::<Result<Vec<_>, _>>()?;

        let tool_config = request.tool_config.as_ref().map(tool_config_to_sdk).transpose()?;

        Ok(Self {
            system,
            messages,
            inference_config: inference_config_to_sdk(&request.inference_config),
            tool_config,
        })
    }
}

fn build_error(e: impl std::fmt::Display) -> BackendError {
    BackendError::new("ValidationException", e.to_string())
}

fn sdk_error<E>(err: &E) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    BackendError::new(
        err.code().unwrap_or("Unknown"),
        DisplayErrorContext(err).to_string(),
    )
}

fn message_to_sdk(message: &Message) -> Result<SdkMessage, BackendError> {
    let role = match message.role {
        Role::User => ConversationRole::User,
        Role::Assistant => ConversationRole::Assistant,
    };
    let content = message
        .content
        .iter()
        .map(block_to_sdk)
        .collect::<Result<Vec<_>, _>>()?;

    SdkMessage::builder()
        .role(role)
        .set_content(Some(content))
        .build()
        .map_err(build_error)
}

fn block_to_sdk(block: &ContentBlock) -> Result<SdkBlock, BackendError> {
    let block = match block {
        ContentBlock::Text(text) => SdkBlock::Text(text.clone()),
        ContentBlock::Image(image) => SdkBlock::Image(image_to_sdk(image)?),
        ContentBlock::ToolUse { id, name, input } => SdkBlock::ToolUse(
            ToolUseBlock::builder()
                .tool_use_id(id)
                .name(name)
                .input(value_to_document(input))
                .build()
                .map_err(build_error)?,
        ),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let mut builder = ToolResultBlock::builder()
                .tool_use_id(tool_use_id)
                .set_content(Some(
                    content
                        .iter()
                        .map(|t| ToolResultContentBlock::Text(t.clone()))
                        .collect(),
                ));
            if *is_error {
                builder = builder.status(ToolResultStatus::Error);
            }
            SdkBlock::ToolResult(builder.build().map_err(build_error)?)
        }
    };
    Ok(block)
}

fn image_to_sdk(image: &ImageData) -> Result<ImageBlock, BackendError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&image.base64_payload)
        .map_err(|e| BackendError::new("ValidationException", format!("invalid base64 image: {e}")))?;

    let format = match image.format {
        ImageFormat::Jpeg => SdkImageFormat::Jpeg,
        ImageFormat::Png => SdkImageFormat::Png,
        ImageFormat::Gif => SdkImageFormat::Gif,
        ImageFormat::Webp => SdkImageFormat::Webp,
    };

    ImageBlock::builder()
        .format(format)
        .source(ImageSource::Bytes(Blob::new(bytes)))
        .build()
        .map_err(build_error)
}

fn inference_config_to_sdk(config: &InferenceConfig) -> InferenceConfiguration {
    InferenceConfiguration::builder()
        .max_tokens(i32::try_from(config.max_tokens).unwrap_or(i32::MAX))
        .set_temperature(config.temperature)
        .set_top_p(config.top_p)
        .set_stop_sequences((!config.stop_sequences.is_empty()).then(|| config.stop_sequences.clone()))
        .build()
}

fn tool_config_to_sdk(config: &ToolConfig) -> Result<ToolConfiguration, BackendError> {
    let tools = config
        .tools
        .iter()
        .map(|tool| {
            ToolSpecification::builder()
                .name(&tool.name)
                .set_description(tool.description.clone())
                .input_schema(ToolInputSchema::Json(value_to_document(&tool.input_schema)))
                .build()
                .map(Tool::ToolSpec)
                .map_err(build_error)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let choice = match &config.choice {
        ToolChoicePolicy::Auto => ToolChoice::Auto(AutoToolChoice::builder().build()),
        ToolChoicePolicy::Any => ToolChoice::Any(AnyToolChoice::builder().build()),
        ToolChoicePolicy::Specific(name) => ToolChoice::Tool(
            SpecificToolChoice::builder()
                .name(name)
                .build()
                .map_err(build_error)?,
        ),
    };

    ToolConfiguration::builder()
        .set_tools(Some(tools))
        .tool_choice(choice)
        .build()
        .map_err(build_error)
}

fn message_from_sdk(message: &SdkMessage) -> Message {
    let content = message
        .content()
        .iter()
        .filter_map(|block| match block {
            SdkBlock::Text(text) => Some(ContentBlock::Text(text.clone())),
            SdkBlock::ToolUse(tool) => Some(ContentBlock::ToolUse {
                id: tool.tool_use_id().to_string(),
                name: tool.name().to_string(),
                input: document_to_value(tool.input()),
            }),
            _ => None,
        })
        .collect();

    let role = match message.role() {
        ConversationRole::User => Role::User,
        _ => Role::Assistant,
    };

    Message { role, content }
}

fn stop_reason_from_sdk(reason: &SdkStopReason) -> StopReason {
    match reason {
        SdkStopReason::ToolUse => StopReason::ToolUse,
        SdkStopReason::MaxTokens => StopReason::MaxTokens,
        SdkStopReason::StopSequence => StopReason::StopSequence,
        SdkStopReason::GuardrailIntervened => StopReason::GuardrailIntervened,
        SdkStopReason::ContentFiltered => StopReason::ContentFiltered,
        _ => StopReason::EndTurn,
    }
}

fn usage_from_sdk(usage: &SdkUsage) -> TokenUsage {
    let count = |n: i32| u32::try_from(n).unwrap_or(0);
    TokenUsage {
        input_tokens: count(usage.input_tokens()),
        output_tokens: count(usage.output_tokens()),
        total_tokens: count(usage.total_tokens()),
    }
}

fn block_index(index: i32) -> u32 {
    u32::try_from(index).unwrap_or(0)
}

/// Map one SDK stream event. Events with no core counterpart (message start,
/// reasoning or citation deltas, unknown variants) yield `None`.
fn event_from_sdk(output: ConverseStreamOutput) -> Option<BackendStreamEvent> {
    match output {
        ConverseStreamOutput::ContentBlockStart(event) => match event.start() {
            Some(SdkStart::ToolUse(tool)) => Some(BackendStreamEvent::ContentBlockStart {
                index: block_index(event.content_block_index()),
                start: BlockStart::ToolUse {
                    id: tool.tool_use_id().to_string(),
                    name: tool.name().to_string(),
                },
            }),
            _ => None,
        },
        ConverseStreamOutput::ContentBlockDelta(event) => {
            let delta = match event.delta() {
                Some(SdkDelta::Text(text)) => BlockDelta::Text(text.clone()),
                Some(SdkDelta::ToolUse(tool)) => BlockDelta::ToolInput(tool.input().to_string()),
                _ => return None,
            };
            Some(BackendStreamEvent::ContentBlockDelta {
                index: block_index(event.content_block_index()),
                delta,
            })
        }
        ConverseStreamOutput::ContentBlockStop(event) => Some(BackendStreamEvent::ContentBlockStop {
            index: block_index(event.content_block_index()),
        }),
        ConverseStreamOutput::MessageStop(event) => Some(BackendStreamEvent::MessageStop {
            stop_reason: stop_reason_from_sdk(event.stop_reason()),
        }),
        ConverseStreamOutput::Metadata(event) => event.usage().map(|usage| BackendStreamEvent::Metadata {
            usage: usage_from_sdk(usage),
        }),
        _ => None,
    }
}

/// Convert a `serde_json::Value` to a smithy `Document`.
fn value_to_document(value: &serde_json::Value) -> Document {
    match value {
        serde_json::Value::Null => Document::Null,
        serde_json::Value::Bool(b) => Document::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Document::Number(Number::PosInt(u))
            } else if let Some(i) = n.as_i64() {
                Document::Number(Number::NegInt(i))
            } else {
                n.as_f64()
                    .map_or(Document::Null, |f| Document::Number(Number::Float(f)))
            }
        }
        serde_json::Value::String(s) => Document::String(s.clone()),
        serde_json::Value::Array(arr) => Document::Array(arr.iter().map(value_to_document).collect()),
        serde_json::Value::Object(map) => Document::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_document(v)))
                .collect(),
        ),
    }
}

/// Convert a smithy `Document` back to a `serde_json::Value`.
fn document_to_value(doc: &Document) -> serde_json::Value {
    match doc {
        Document::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), document_to_value(v)))
                .collect(),
        ),
        Document::Array(arr) => serde_json::Value::Array(arr.iter().map(document_to_value).collect()),
        Document::Number(Number::PosInt(u)) => serde_json::Value::from(*u),
        Document::Number(Number::NegInt(i)) => serde_json::Value::from(*i),
        Document::Number(Number::Float(f)) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Document::String(s) => serde_json::Value::String(s.clone()),
        Document::Bool(b) => serde_json::Value::Bool(*b),
        Document::Null => serde_json::Value::Null,
    }
}
