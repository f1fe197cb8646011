//! Demonstrate the translation layer without a server or AWS credentials.
//!
//! Usage:
//!   `cargo run --example translate_only`

use converse_bridge::converse::{
    BackendStreamEvent, BlockDelta, BlockStart, ContentBlock, ConverseResponse, Message, Role,
    StopReason, TokenUsage,
};
use converse_bridge::translate::anthropic_response::converse_to_anthropic;
use converse_bridge::translate::openai_types::{ChatCompletionRequest, ChatMessage};
use converse_bridge::translate::request::openai_to_converse;
use converse_bridge::translate::streaming::StreamTranslator;
use converse_bridge::ModelResolver;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let resolver = ModelResolver::new("us.anthropic.claude-sonnet-4-5-20250929-v1:0");

    // A chat-completions request as an OpenAI SDK would send it
    let chat_req = ChatCompletionRequest {
        model: "gpt-4".to_string(),
        messages: vec![
            ChatMessage::new("system", "You are a geography expert. Be concise."),
            ChatMessage::new("user", "What is the capital of France?"),
            ChatMessage::new("user", "And Germany?"),
        ],
        max_tokens: Some(256),
        temperature: Some(0.7),
        top_p: None,
        stream: None,
        stop: None,
    };

    let model_id = resolver.resolve(&chat_req.model);
    let converse_req = openai_to_converse(&chat_req, &model_id)?;

    println!("=== Translated Request (Converse) ===");
    println!("{converse_req:#?}");

    // A simulated backend answer, rendered for a messages-API client
    let backend_resp = ConverseResponse {
        message: Message {
            role: Role::Assistant,
            content: vec![
                ContentBlock::Text("Let me look that up.".to_string()),
                ContentBlock::ToolUse {
                    id: "tooluse_demo".to_string(),
                    name: "lookup_capital".to_string(),
                    input: serde_json::json!({ "country": "Germany" }),
                },
            ],
        },
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage {
            input_tokens: 42,
            output_tokens: 18,
            total_tokens: 60,
        },
        latency_ms: 350,
    };

    let messages_resp = converse_to_anthropic(&backend_resp, "claude-sonnet-4-5");

    println!();
    println!("=== Translated Response (messages API) ===");
    println!("{}", serde_json::to_string_pretty(&messages_resp)?);

    println!();
    println!("=== Streaming Translation Demo ===");

    let mut translator = StreamTranslator::new("claude-sonnet-4-5");
    for event in translator.start() {
        println!("  start -> event: {}", event.event_name());
    }

    let backend_events = [
        BackendStreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::Text("Berlin.".to_string()),
        },
        BackendStreamEvent::ContentBlockStop { index: 0 },
        BackendStreamEvent::ContentBlockStart {
            index: 1,
            start: BlockStart::ToolUse {
                id: "tooluse_demo".to_string(),
                name: "lookup_capital".to_string(),
            },
        },
        BackendStreamEvent::ContentBlockDelta {
            index: 1,
            delta: BlockDelta::ToolInput(r#"{"country":"Germany"}"#.to_string()),
        },
        BackendStreamEvent::ContentBlockStop { index: 1 },
        BackendStreamEvent::MessageStop {
            stop_reason: StopReason::ToolUse,
        },
    ];

    for (i, backend_event) in backend_events.iter().enumerate() {
        for event in translator.process_event(backend_event) {
            println!("  backend {} -> event: {}", i, event.event_name());
        }
    }

    println!();
    println!("Done! The translation layer works without any network calls.");
    Ok(())
}
