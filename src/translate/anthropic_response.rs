use super::anthropic_types::{MessagesResponse, ResponseContentBlock, Usage};
use crate::converse::{ContentBlock, ConverseResponse, TokenUsage};

/// `msg_` followed by 32 hex characters.
pub fn message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

pub fn usage(usage: &TokenUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
    }
}

/// Translate a non-streaming backend response into a Messages response.
/// Pure function: `model` is the name the client originally requested.
pub fn converse_to_anthropic(resp: &ConverseResponse, model: &str) -> MessagesResponse {
    let mut content: Vec<ResponseContentBlock> = resp
        .message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => Some(ResponseContentBlock::Text { text: text.clone() }),
            ContentBlock::ToolUse { id, name, input } => Some(ResponseContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            ContentBlock::Image(_) | ContentBlock::ToolResult { .. } => None,
        })
        .collect();

    // Clients expect non-empty content
    if content.is_empty() {
        content.push(ResponseContentBlock::Text {
            text: String::new(),
        });
    }

    MessagesResponse {
        id: message_id(),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: model.to_string(),
        stop_reason: Some(resp.stop_reason.as_str().to_string()),
        stop_sequence: None,
        usage: usage(&resp.usage),
    }
}
