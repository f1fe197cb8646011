//! Translate Anthropic-style Messages requests into backend Converse requests.
//!
//! Unlike the chat-completions path, messages already arrive as discrete
//! blocks and no alternation repair is attempted: a caller that breaks
//! alternation gets the backend's own validation error.

use super::anthropic_types::{
    ContentBlock as ClientBlock, ImageSource, Message as ClientMessage, MessagesRequest, Tool,
    ToolChoice,
};
use super::image;
use super::request::DEFAULT_MAX_TOKENS;
use crate::converse::{
    ContentBlock, ConverseRequest, InferenceConfig, Message, Role, ToolChoicePolicy, ToolConfig,
    ToolSpec,
};
use crate::error::{GatewayError, Result};
use crate::models::supports_image_input;
use serde_json::{Map, Value};

/// Translate a messages request for an already-resolved backend model.
pub fn anthropic_to_converse(req: &MessagesRequest, model_id: &str) -> Result<ConverseRequest> {
    let has_images = req.messages.iter().any(|m| {
        m.content
            .blocks()
            .iter()
            .any(|b| b.block_type == "image" && b.source.is_some())
    });
    if has_images && !supports_image_input(model_id) {
        return Err(GatewayError::UnsupportedModel(model_id.to_string()));
    }

    let system = req
        .system
        .as_ref()
        .map(|s| vec![s.as_text()])
        .unwrap_or_default();

    let mut messages = Vec::with_capacity(req.messages.len());
    for msg in &req.messages {
        if let Some(translated) = translate_message(msg)? {
            messages.push(translated);
        }
    }

    let inference_config = InferenceConfig {
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: req.temperature.map(|t| t as f32),
        top_p: req.top_p.map(|p| p as f32),
        stop_sequences: req.stop_sequences.clone().unwrap_or_default(),
    };

    Ok(ConverseRequest {
        model_id: model_id.to_string(),
        system,
        messages,
        inference_config,
        tool_config: translate_tool_config(req.tools.as_deref(), req.tool_choice.as_ref()),
    })
}

fn translate_message(msg: &ClientMessage) -> Result<Option<Message>> {
    let Some(role) = Role::parse(&msg.role) else {
        return Ok(None);
    };

    let mut content = Vec::new();
    for block in msg.content.blocks() {
        if let Some(translated) = translate_block(block)? {
            content.push(translated);
        }
    }

    if content.is_empty() {
        return Ok(None);
    }
    Ok(Some(Message { role, content }))
}

fn translate_block(block: ClientBlock) -> Result<Option<ContentBlock>> {
    let translated = match block.block_type.as_str() {
        "text" => block.text.map(ContentBlock::Text),
        "tool_use" => match (block.id, block.name) {
            (Some(id), Some(name)) => Some(ContentBlock::ToolUse {
                id,
                name,
                input: block.input.unwrap_or_else(|| Value::Object(Map::new())),
            }),
            _ => None,
        },
        "tool_result" => block.tool_use_id.map(|tool_use_id| ContentBlock::ToolResult {
            tool_use_id,
            content: block.content.map(|c| vec![c.as_text()]).unwrap_or_default(),
            is_error: block.is_error.unwrap_or(false),
        }),
        "image" => match block.source {
            Some(source) => Some(translate_image(&source)?),
            None => None,
        },
        _ => None,
    };
    Ok(translated)
}

fn translate_image(source: &ImageSource) -> Result<ContentBlock> {
    let format = source
        .media_type
        .strip_prefix("image/")
        .ok_or_else(|| GatewayError::UnsupportedFormat(source.media_type.clone()))?;
    Ok(ContentBlock::Image(image::validate(format, &source.data)?))
}

fn translate_tool_config(tools: Option<&[Tool]>, choice: Option<&ToolChoice>) -> Option<ToolConfig> {
    let tools = tools.filter(|t| !t.is_empty())?;

    let choice = match choice {
        Some(choice) => translate_tool_choice(choice)?,
        None => ToolChoicePolicy::Auto,
    };

    let tools = tools
        .iter()
        .map(|t| ToolSpec {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.input_schema.clone(),
        })
        .collect();

    Some(ToolConfig { tools, choice })
}

/// `None` means the caller asked for no tools at all.
fn translate_tool_choice(choice: &ToolChoice) -> Option<ToolChoicePolicy> {
    match choice.choice_type.as_str() {
        "none" => None,
        "any" => Some(ToolChoicePolicy::Any),
        "tool" => Some(
            choice
                .name
                .clone()
                .map_or(ToolChoicePolicy::Auto, ToolChoicePolicy::Specific),
        ),
        _ => Some(ToolChoicePolicy::Auto),
    }
}

/// Coarse token estimate: a quarter of the characters in the system prompt
/// and all message text, never less than one.
pub fn estimate_input_tokens(req: &MessagesRequest) -> u32 {
    let system_chars = req
        .system
        .as_ref()
        .map_or(0, |s| s.as_text().chars().count());

    let message_chars: usize = req
        .messages
        .iter()
        .flat_map(|m| m.content.blocks())
        .map(|b| block_chars(&b))
        .sum();

    let tokens = (system_chars + message_chars) / 4;
    u32::try_from(tokens).unwrap_or(u32::MAX).max(1)
}

fn block_chars(block: &ClientBlock) -> usize {
    match block.block_type.as_str() {
        "text" => block.text.as_deref().map_or(0, |t| t.chars().count()),
        "tool_result" => block.content.as_ref().map_or(0, |c| c.as_text().chars().count()),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::anthropic_types::{MessageContent, SystemContent, ToolResultContent};
    use serde_json::json;

    const MODEL: &str = "us.anthropic.claude-sonnet-4-5-20250929-v1:0";

    fn request(messages: Vec<ClientMessage>) -> MessagesRequest {
        MessagesRequest {
            model: "claude-sonnet".to_string(),
            max_tokens: Some(1024),
            messages,
            system: None,
            stream: None,
            temperature: None,
            top_p: None,
            tools: None,
            tool_choice: None,
            stop_sequences: None,
        }
    }

    fn text_message(role: &str, text: &str) -> ClientMessage {
        ClientMessage {
            role: role.to_string(),
            content: MessageContent::Text(text.to_string()),
        }
    }

    fn blocks_message(role: &str, blocks: Vec<ClientBlock>) -> ClientMessage {
        ClientMessage {
            role: role.to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: Some("Reads a file".to_string()),
            input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        }
    }

    fn choice(choice_type: &str, name: Option<&str>) -> ToolChoice {
        ToolChoice {
            choice_type: choice_type.to_string(),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_simple_text_request() {
        let mut req = request(vec![text_message("user", "Hello")]);
        req.system = Some(SystemContent::Text("You are terse.".into()));
        let out = anthropic_to_converse(&req, MODEL).unwrap();

        assert_eq!(out.model_id, MODEL);
        assert_eq!(out.system, vec!["You are terse."]);
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].content, vec![ContentBlock::Text("Hello".into())]);
        assert_eq!(out.inference_config.max_tokens, 1024);
        assert!(out.tool_config.is_none());
    }

    #[test]
    fn test_system_blocks_become_one_block() {
        let mut req = request(vec![text_message("user", "Hi")]);
        req.system = Some(
            serde_json::from_value(json!([
                {"type": "text", "text": "Part one. "},
                {"type": "text", "text": "Part two."}
            ]))
            .unwrap(),
        );
        let out = anthropic_to_converse(&req, MODEL).unwrap();
        assert_eq!(out.system, vec!["Part one. Part two."]);
    }

    #[test]
    fn test_tool_blocks_translate() {
        let req = request(vec![
            blocks_message(
                "assistant",
                vec![ClientBlock {
                    block_type: "tool_use".into(),
                    id: Some("toolu_1".into()),
                    name: Some("read".into()),
                    input: Some(json!({"path": "a.txt"})),
                    ..ClientBlock::default()
                }],
            ),
            blocks_message(
                "user",
                vec![ClientBlock {
                    block_type: "tool_result".into(),
                    tool_use_id: Some("toolu_1".into()),
                    content: Some(ToolResultContent::Text("contents".into())),
                    ..ClientBlock::default()
                }],
            ),
        ]);
        let out = anthropic_to_converse(&req, MODEL).unwrap();

        assert_eq!(out.messages.len(), 2);
        assert_eq!(
            out.messages[0].content[0],
            ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "read".into(),
                input: json!({"path": "a.txt"}),
            }
        );
        assert_eq!(
            out.messages[1].content[0],
            ContentBlock::ToolResult {
                tool_use_id: "toolu_1".into(),
                content: vec!["contents".into()],
                is_error: false,
            }
        );
    }

    #[test]
    fn test_tool_use_without_input_gets_empty_object() {
        let req = request(vec![blocks_message(
            "assistant",
            vec![ClientBlock {
                block_type: "tool_use".into(),
                id: Some("t".into()),
                name: Some("noop".into()),
                ..ClientBlock::default()
            }],
        )]);
        let out = anthropic_to_converse(&req, MODEL).unwrap();
        if let ContentBlock::ToolUse { input, .. } = &out.messages[0].content[0] {
            assert_eq!(input, &json!({}));
        } else {
            panic!("Expected ToolUse block");
        }
    }

    #[test]
    fn test_tool_result_error_flag_and_block_content() {
        let req = request(vec![blocks_message(
            "user",
            vec![ClientBlock {
                block_type: "tool_result".into(),
                tool_use_id: Some("t".into()),
                is_error: Some(true),
                content: Some(ToolResultContent::Blocks(vec![
                    ClientBlock::text("no such file"),
                    ClientBlock::text("exit 1"),
                ])),
                ..ClientBlock::default()
            }],
        )]);
        let out = anthropic_to_converse(&req, MODEL).unwrap();
        assert_eq!(
            out.messages[0].content[0],
            ContentBlock::ToolResult {
                tool_use_id: "t".into(),
                content: vec!["no such file\nexit 1".into()],
                is_error: true,
            }
        );
    }

    #[test]
    fn test_malformed_blocks_dropped() {
        let req = request(vec![blocks_message(
            "user",
            vec![
                ClientBlock {
                    block_type: "tool_use".into(),
                    name: Some("missing_id".into()),
                    ..ClientBlock::default()
                },
                ClientBlock {
                    block_type: "tool_result".into(),
                    content: Some(ToolResultContent::Text("orphan".into())),
                    ..ClientBlock::default()
                },
                ClientBlock {
                    block_type: "text".into(),
                    ..ClientBlock::default()
                },
                ClientBlock {
                    block_type: "thinking".into(),
                    ..ClientBlock::default()
                },
                ClientBlock::text("kept"),
            ],
        )]);
        let out = anthropic_to_converse(&req, MODEL).unwrap();
        assert_eq!(out.messages[0].content, vec![ContentBlock::Text("kept".into())]);
    }

    #[test]
    fn test_message_with_null_image_dropped() {
        let req: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-sonnet",
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": [{"type": "image", "source": null}]},
                {"role": "user", "content": "Still there?"}
            ]
        }))
        .unwrap();
        let out = anthropic_to_converse(&req, MODEL).unwrap();

        assert_eq!(out.messages.len(), 2);
        // no alternation repair on this path
        assert!(out.messages.iter().all(|m| m.role == Role::User));
    }

    #[test]
    fn test_image_block_translates() {
        let req: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-sonnet",
            "messages": [{"role": "user", "content": [
                {"type": "image", "source": {"type": "base64", "media_type": "image/webp", "data": "UklGRg=="}},
                {"type": "text", "text": "What is this?"}
            ]}]
        }))
        .unwrap();
        let out = anthropic_to_converse(&req, MODEL).unwrap();
        let content = &out.messages[0].content;

        assert_eq!(content.len(), 2);
        if let ContentBlock::Image(img) = &content[0] {
            assert_eq!(img.format, image::ImageFormat::Webp);
        } else {
            panic!("Expected image block");
        }
        assert_eq!(out.inference_config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_image_errors() {
        let make = |media_type: &str| {
            request(vec![blocks_message(
                "user",
                vec![ClientBlock {
                    block_type: "image".into(),
                    source: Some(ImageSource {
                        source_type: "base64".into(),
                        media_type: media_type.into(),
                        data: "AAAA".into(),
                    }),
                    ..ClientBlock::default()
                }],
            )])
        };

        assert!(matches!(
            anthropic_to_converse(&make("application/pdf"), MODEL),
            Err(GatewayError::UnsupportedFormat(f)) if f == "application/pdf"
        ));
        assert!(matches!(
            anthropic_to_converse(&make("image/bmp"), MODEL),
            Err(GatewayError::UnsupportedFormat(f)) if f == "bmp"
        ));
        assert!(matches!(
            anthropic_to_converse(&make("image/png"), "cohere.command-r-plus-v1:0"),
            Err(GatewayError::UnsupportedModel(_))
        ));
    }

    #[test]
    fn test_tool_choice_mapping() {
        let cases = [
            (None, Some(ToolChoicePolicy::Auto)),
            (Some(choice("auto", None)), Some(ToolChoicePolicy::Auto)),
            (Some(choice("any", None)), Some(ToolChoicePolicy::Any)),
            (
                Some(choice("tool", Some("read"))),
                Some(ToolChoicePolicy::Specific("read".into())),
            ),
            (Some(choice("tool", None)), Some(ToolChoicePolicy::Auto)),
            (Some(choice("something_new", None)), Some(ToolChoicePolicy::Auto)),
            (Some(choice("none", None)), None),
        ];

        for (tool_choice, expected) in cases {
            let mut req = request(vec![text_message("user", "Hi")]);
            req.tools = Some(vec![tool("read")]);
            req.tool_choice = tool_choice;
            let out = anthropic_to_converse(&req, MODEL).unwrap();
            assert_eq!(out.tool_config.map(|c| c.choice), expected);
        }
    }

    #[test]
    fn test_tool_specs() {
        let mut req = request(vec![text_message("user", "Hi")]);
        req.tools = Some(vec![tool("read"), tool("write")]);
        let config = anthropic_to_converse(&req, MODEL).unwrap().tool_config.unwrap();

        assert_eq!(config.tools.len(), 2);
        assert_eq!(config.tools[0].name, "read");
        assert_eq!(config.tools[0].description.as_deref(), Some("Reads a file"));
        assert_eq!(config.tools[0].input_schema["type"], "object");
    }

    #[test]
    fn test_empty_tools_means_no_config() {
        let mut req = request(vec![text_message("user", "Hi")]);
        req.tools = Some(vec![]);
        req.tool_choice = Some(choice("any", None));
        assert!(anthropic_to_converse(&req, MODEL).unwrap().tool_config.is_none());
    }

    #[test]
    fn test_stop_sequences_pass_through() {
        let mut req = request(vec![text_message("user", "Hi")]);
        req.stop_sequences = Some(vec!["\n\nHuman:".into()]);
        let out = anthropic_to_converse(&req, MODEL).unwrap();
        assert_eq!(out.inference_config.stop_sequences, vec!["\n\nHuman:"]);
    }

    #[test]
    fn test_token_estimate() {
        // 12 chars -> 3
        assert_eq!(estimate_input_tokens(&request(vec![text_message("user", "Hello, world")])), 3);
        // 2 chars -> floor 0 -> 1
        assert_eq!(estimate_input_tokens(&request(vec![text_message("user", "Hi")])), 1);
        // 8 + 8 -> 4
        assert_eq!(
            estimate_input_tokens(&request(vec![
                text_message("user", "Hello!!!"),
                text_message("assistant", "Worldxxx"),
            ])),
            4
        );
    }

    #[test]
    fn test_token_estimate_counts_system() {
        let mut req = request(vec![text_message("user", "Hi")]);
        req.system = Some(SystemContent::Text("Hello".into()));
        // 5 + 2 = 7 -> 1
        assert_eq!(estimate_input_tokens(&req), 1);

        req.system = Some(SystemContent::Text("Hello, world".into()));
        // 12 + 2 = 14 -> 3
        assert_eq!(estimate_input_tokens(&req), 3);
    }
}
