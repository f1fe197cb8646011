//! Translate OpenAI-style Chat Completions requests into backend Converse requests.
//!
//! System messages are lifted out of the turn sequence, consecutive same-role
//! turns are merged so the backend's strict user/assistant alternation holds,
//! and inline images are validated before any backend call is made.

use super::content::MessagePart;
use super::image;
use super::openai_types::{ChatCompletionRequest, ChatMessage};
use crate::converse::{ContentBlock, ConverseRequest, InferenceConfig, Message, Role};
use crate::error::{GatewayError, Result};
use crate::models::supports_image_input;

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Translate a chat completion request for an already-resolved backend model.
pub fn openai_to_converse(req: &ChatCompletionRequest, model_id: &str) -> Result<ConverseRequest> {
    let (system_messages, turns): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
        req.messages.iter().partition(|m| m.role == "system");

    let system = if system_messages.is_empty() {
        Vec::new()
    } else {
        let text = system_messages
            .iter()
            .map(|m| m.content.text_only())
            .collect::<Vec<_>>()
            .join("\n");
        vec![text]
    };

    if turns.iter().any(|m| m.content.has_images()) && !supports_image_input(model_id) {
        return Err(GatewayError::UnsupportedModel(model_id.to_string()));
    }

    let messages = consolidate(&turns)?;

    let inference_config = InferenceConfig {
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: req.temperature.map(|t| t as f32),
        top_p: req.top_p.map(|p| p as f32),
        stop_sequences: req
            .stop
            .clone()
            .map(|s| s.into_vec())
            .unwrap_or_default(),
    };

    Ok(ConverseRequest {
        model_id: model_id.to_string(),
        system,
        messages,
        inference_config,
        tool_config: None,
    })
}

/// Merge adjacent same-role messages, then build backend content per turn.
///
/// Turns with nothing to send are skipped before grouping so their
/// neighbours merge. Grouping is by the raw role string, so unknown roles
/// group too; their groups are dropped afterwards rather than merged into a
/// neighbour.
fn consolidate(turns: &[&ChatMessage]) -> Result<Vec<Message>> {
    let mut groups: Vec<(&str, Vec<MessagePart>)> = Vec::new();

    for msg in turns.iter().filter(|m| has_content(m)) {
        let same_role = groups.last().is_some_and(|(role, _)| *role == msg.role);
        if !same_role {
            groups.push((msg.role.as_str(), msg.content.as_parts()));
            continue;
        }
        if let Some((_, parts)) = groups.last_mut() {
            parts.push(MessagePart::Text("\n".to_string()));
            parts.extend(msg.content.as_parts());
        }
    }

    let mut messages = Vec::with_capacity(groups.len());
    for (role, parts) in groups {
        let Some(role) = Role::parse(role) else {
            continue;
        };
        let content = build_blocks(parts)?;
        if !content.is_empty() {
            messages.push(Message { role, content });
        }
    }
    Ok(messages)
}

fn has_content(msg: &ChatMessage) -> bool {
    msg.content.as_parts().iter().any(|part| match part {
        MessagePart::Text(t) => !t.is_empty(),
        MessagePart::Image(_) => true,
    })
}

fn build_blocks(parts: Vec<MessagePart>) -> Result<Vec<ContentBlock>> {
    let mut blocks = Vec::new();
    let mut text = String::new();

    for part in parts {
        match part {
            MessagePart::Text(t) => text.push_str(&t),
            MessagePart::Image(url) => {
                if !text.is_empty() {
                    blocks.push(ContentBlock::Text(std::mem::take(&mut text)));
                }
                let image = image::validate(&url.format, &url.payload)?;
                blocks.push(ContentBlock::Image(image));
            }
        }
    }

    if !text.is_empty() {
        blocks.push(ContentBlock::Text(text));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::content::MessageContent;
    use crate::translate::image::{DataUrl, ImageFormat};

    const VISION_MODEL: &str = "us.anthropic.claude-sonnet-4-5-20250929-v1:0";
    const TEXT_MODEL: &str = "us.amazon.nova-micro-v1:0";

    fn request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-4".to_string(),
            messages,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: None,
            stop: None,
        }
    }

    fn image_message(role: &str, text: &str, format: &str, payload: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: MessageContent::Parts(vec![
                MessagePart::Text(text.to_string()),
                MessagePart::Image(DataUrl {
                    format: format.to_string(),
                    payload: payload.to_string(),
                }),
            ]),
        }
    }

    fn texts(msg: &Message) -> Vec<&str> {
        msg.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_system_extracted() {
        let req = request(vec![
            ChatMessage::new("system", "Be helpful"),
            ChatMessage::new("user", "Hi"),
        ]);
        let out = openai_to_converse(&req, VISION_MODEL).unwrap();

        assert_eq!(out.system, vec!["Be helpful"]);
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].role, Role::User);
        assert_eq!(texts(&out.messages[0]), vec!["Hi"]);
    }

    #[test]
    fn test_multiple_system_messages_collapse() {
        let req = request(vec![
            ChatMessage::new("system", "Rule one"),
            ChatMessage::new("user", "Hi"),
            ChatMessage::new("system", "Rule two"),
        ]);
        let out = openai_to_converse(&req, VISION_MODEL).unwrap();
        assert_eq!(out.system, vec!["Rule one\nRule two"]);
    }

    #[test]
    fn test_no_system_means_no_system_block() {
        let req = request(vec![ChatMessage::new("user", "Hi")]);
        let out = openai_to_converse(&req, VISION_MODEL).unwrap();
        assert!(out.system.is_empty());
    }

    #[test]
    fn test_consecutive_user_messages_merge() {
        let req = request(vec![
            ChatMessage::new("user", "First"),
            ChatMessage::new("user", "Second"),
        ]);
        let out = openai_to_converse(&req, VISION_MODEL).unwrap();

        assert_eq!(out.messages.len(), 1);
        assert_eq!(texts(&out.messages[0]), vec!["First\nSecond"]);
    }

    #[test]
    fn test_alternation_holds_for_any_user_assistant_sequence() {
        let roles = ["user", "user", "assistant", "assistant", "assistant", "user", "assistant", "user", "user"];
        let messages = roles
            .iter()
            .enumerate()
            .map(|(i, r)| ChatMessage::new(*r, format!("m{i}")))
            .collect();
        let out = openai_to_converse(&request(messages), VISION_MODEL).unwrap();

        assert_eq!(out.messages.len(), 5);
        assert!(out.messages.windows(2).all(|w| w[0].role != w[1].role));
    }

    #[test]
    fn test_null_assistant_turn_does_not_break_alternation() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{
                "model": "gpt-4",
                "messages": [
                    {"role": "user", "content": "What is the weather?"},
                    {"role": "assistant", "content": null},
                    {"role": "user", "content": "Thanks"}
                ]
            }"#,
        )
        .unwrap();
        let out = openai_to_converse(&req, VISION_MODEL).unwrap();

        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].role, Role::User);
        assert_eq!(texts(&out.messages[0]), vec!["What is the weather?\nThanks"]);
    }

    #[test]
    fn test_remote_image_only_turn_is_skipped() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{
                "model": "gpt-4",
                "messages": [
                    {"role": "user", "content": "Look at this"},
                    {"role": "assistant", "content": [
                        {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
                    ]},
                    {"role": "user", "content": "Well?"},
                    {"role": "assistant", "content": "A cat."}
                ]
            }"#,
        )
        .unwrap();
        let out = openai_to_converse(&req, TEXT_MODEL).unwrap();

        let roles: Vec<Role> = out.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert!(out.messages.windows(2).all(|w| w[0].role != w[1].role));
        assert_eq!(texts(&out.messages[0]), vec!["Look at this\nWell?"]);
    }

    #[test]
    fn test_unknown_role_dropped() {
        let req = request(vec![
            ChatMessage::new("user", "a"),
            ChatMessage::new("function", "f"),
            ChatMessage::new("user", "b"),
        ]);
        let out = openai_to_converse(&req, VISION_MODEL).unwrap();
        assert_eq!(out.messages.len(), 2);
        assert!(out.messages.iter().all(|m| m.role == Role::User));
    }

    #[test]
    fn test_inference_defaults() {
        let out = openai_to_converse(&request(vec![ChatMessage::new("user", "Hi")]), VISION_MODEL)
            .unwrap();
        assert_eq!(out.inference_config.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(out.inference_config.temperature.is_none());
        assert!(out.inference_config.top_p.is_none());
        assert!(out.inference_config.stop_sequences.is_empty());
        assert!(out.tool_config.is_none());
    }

    #[test]
    fn test_inference_passthrough() {
        let mut req = request(vec![ChatMessage::new("user", "Hi")]);
        req.max_tokens = Some(256);
        req.temperature = Some(0.5);
        req.top_p = Some(0.9);
        req.stop = Some(crate::translate::openai_types::StopSequences::One("END".into()));
        let out = openai_to_converse(&req, VISION_MODEL).unwrap();

        assert_eq!(out.inference_config.max_tokens, 256);
        assert_eq!(out.inference_config.temperature, Some(0.5));
        assert_eq!(out.inference_config.top_p, Some(0.9_f32));
        assert_eq!(out.inference_config.stop_sequences, vec!["END"]);
    }

    #[test]
    fn test_image_splits_text_blocks() {
        let mut msg = image_message("user", "Look: ", "png", "iVBORw0KGgo=");
        if let MessageContent::Parts(ref mut parts) = msg.content {
            parts.push(MessagePart::Text("what is it?".into()));
        }
        let out = openai_to_converse(&request(vec![msg]), VISION_MODEL).unwrap();
        let content = &out.messages[0].content;

        assert_eq!(content.len(), 3);
        assert_eq!(content[0], ContentBlock::Text("Look: ".into()));
        if let ContentBlock::Image(img) = &content[1] {
            assert_eq!(img.format, ImageFormat::Png);
            assert_eq!(img.base64_payload, "iVBORw0KGgo=");
        } else {
            panic!("Expected image block");
        }
        assert_eq!(content[2], ContentBlock::Text("what is it?".into()));
    }

    #[test]
    fn test_merge_preserves_images() {
        let req = request(vec![
            image_message("user", "one", "png", "AAAA"),
            image_message("user", "two", "jpeg", "BBBB"),
        ]);
        let out = openai_to_converse(&req, VISION_MODEL).unwrap();
        let content = &out.messages[0].content;

        let images = content
            .iter()
            .filter(|b| matches!(b, ContentBlock::Image(_)))
            .count();
        assert_eq!(images, 2);
        assert_eq!(texts(&out.messages[0]), vec!["one", "\ntwo"]);
    }

    #[test]
    fn test_image_on_text_only_model_rejected() {
        let req = request(vec![image_message("user", "hi", "png", "AAAA")]);
        match openai_to_converse(&req, TEXT_MODEL) {
            Err(GatewayError::UnsupportedModel(id)) => assert_eq!(id, TEXT_MODEL),
            other => panic!("Expected UnsupportedModel, got {other:?}"),
        }
    }

    #[test]
    fn test_model_check_precedes_format_check() {
        let req = request(vec![image_message("user", "hi", "bmp", "AAAA")]);
        assert!(matches!(
            openai_to_converse(&req, TEXT_MODEL),
            Err(GatewayError::UnsupportedModel(_))
        ));
        assert!(matches!(
            openai_to_converse(&req, VISION_MODEL),
            Err(GatewayError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_oversized_image_rejected() {
        let payload = "A".repeat(5_242_882);
        let req = request(vec![image_message("user", "hi", "png", &payload)]);
        assert!(matches!(
            openai_to_converse(&req, VISION_MODEL),
            Err(GatewayError::ImageTooLarge(3_932_161))
        ));
    }

    #[test]
    fn test_parse_and_translate_from_json() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{
                "model": "gpt-4o",
                "messages": [
                    {"role": "user", "content": [
                        {"type": "text", "text": "Describe"},
                        {"type": "image_url", "image_url": {"url": "https://example.com/x.png"}}
                    ]}
                ]
            }"#,
        )
        .unwrap();
        // remote image dropped, so even a text-only model is fine
        let out = openai_to_converse(&req, TEXT_MODEL).unwrap();
        assert_eq!(out.messages[0].content, vec![ContentBlock::Text("Describe".into())]);
    }
}
