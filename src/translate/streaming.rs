//! State machine for re-framing backend stream events as Messages SSE events.
//!
//! The [`StreamTranslator`] consumes backend events one at a time, in arrival
//! order, tracking which content blocks are open (keyed by the backend's block
//! index) and the running usage, and emits the corresponding client events
//! (`message_start`, `content_block_delta`, ...). Per block index the output
//! always follows `content_block_start`, any number of deltas, then
//! `content_block_stop`; across indices events interleave exactly as the
//! backend interleaves them.

use std::collections::BTreeMap;

use super::anthropic_response::{self, message_id};
use super::anthropic_types::{
    Delta, ErrorBody, MessageDeltaBody, MessagesResponse, ResponseContentBlock, StreamEvent, Usage,
};
use crate::converse::{BackendStreamEvent, BlockDelta, BlockStart, StopReason, TokenUsage};

#[derive(Debug, Clone, PartialEq, Eq)]
enum OpenBlock {
    Text,
    ToolUse {
        id: String,
        name: String,
        /// Every input fragment seen so far. The wire carries fragments
        /// incrementally; the full document is only kept for inspection.
        input_json: String,
    },
}

/// Per-request translator from backend stream events to client SSE events.
///
/// Usage:
///   let mut translator = StreamTranslator::new("claude-sonnet");
///   send(translator.start());
///   for event in backend_events {
///       send(translator.process_event(&event));
///       if translator.is_finished() { break; }
///   }
///   send(translator.finish());
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    msg_id: String,
    started: bool,
    finished: bool,
    open_blocks: BTreeMap<u32, OpenBlock>,
    usage: Usage,
}

impl StreamTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            msg_id: message_id(),
            started: false,
            finished: false,
            open_blocks: BTreeMap::new(),
            usage: Usage::default(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Accumulated tool input for an open tool-use block.
    pub fn tool_input(&self, index: u32) -> Option<&str> {
        match self.open_blocks.get(&index) {
            Some(OpenBlock::ToolUse { input_json, .. }) => Some(input_json.as_str()),
            _ => None,
        }
    }

    /// `message_start` and `ping`, emitted once before any backend event.
    pub fn start(&mut self) -> Vec<StreamEvent> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        vec![self.make_message_start(), StreamEvent::Ping]
    }

    /// Process one backend event, returning zero or more client events.
    pub fn process_event(&mut self, event: &BackendStreamEvent) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = self.start();

        match event {
            BackendStreamEvent::ContentBlockStart {
                index,
                start: BlockStart::ToolUse { id, name },
            } => {
                if self.open_blocks.contains_key(index) {
                    tracing::warn!(index, "Duplicate content block start ignored");
                    return events;
                }
                self.open_blocks.insert(
                    *index,
                    OpenBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input_json: String::new(),
                    },
                );
                events.push(StreamEvent::ContentBlockStart {
                    index: *index,
                    content_block: ResponseContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: serde_json::Value::Object(serde_json::Map::new()),
                    },
                });
            }

            BackendStreamEvent::ContentBlockDelta {
                index,
                delta: BlockDelta::Text(text),
            } => {
                // The backend does not announce text blocks; open on first delta
                if !self.open_blocks.contains_key(index) {
                    self.open_blocks.insert(*index, OpenBlock::Text);
                    events.push(StreamEvent::ContentBlockStart {
                        index: *index,
                        content_block: ResponseContentBlock::Text {
                            text: String::new(),
                        },
                    });
                }
                events.push(StreamEvent::ContentBlockDelta {
                    index: *index,
                    delta: Delta::TextDelta { text: text.clone() },
                });
            }

            BackendStreamEvent::ContentBlockDelta {
                index,
                delta: BlockDelta::ToolInput(fragment),
            } => match self.open_blocks.get_mut(index) {
                Some(OpenBlock::ToolUse { input_json, .. }) => {
                    input_json.push_str(fragment);
                    events.push(StreamEvent::ContentBlockDelta {
                        index: *index,
                        delta: Delta::InputJsonDelta {
                            partial_json: fragment.clone(),
                        },
                    });
                }
                _ => tracing::warn!(index, "Tool input for a block that is not an open tool_use dropped"),
            },

            BackendStreamEvent::ContentBlockStop { index } => {
                if let Some(block) = self.open_blocks.remove(index) {
                    if let OpenBlock::ToolUse { name, input_json, .. } = &block {
                        tracing::debug!(index, tool = %name, input = %input_json, "Tool input complete");
                    }
                    events.push(StreamEvent::ContentBlockStop { index: *index });
                }
            }

            BackendStreamEvent::MessageStop { stop_reason } => {
                events.append(&mut self.make_finish_events(*stop_reason));
            }

            BackendStreamEvent::Metadata { usage } => {
                self.record_usage(usage);
            }
        }

        events
    }

    /// Call when the backend stream ends. If no `MessageStop` was seen, closes
    /// every open block and emits a synthetic `end_turn` stop.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = self.start();
        events.append(&mut self.make_finish_events(StopReason::EndTurn));
        events
    }

    /// Terminal in-band error. Open blocks are left as they are; nothing is
    /// emitted after this.
    pub fn error_event(&mut self, message: impl Into<String>) -> StreamEvent {
        self.finished = true;
        self.open_blocks.clear();
        StreamEvent::Error {
            error: ErrorBody::new("api_error", message),
        }
    }

    fn record_usage(&mut self, usage: &TokenUsage) {
        self.usage = anthropic_response::usage(usage);
    }

    fn make_message_start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse {
                id: self.msg_id.clone(),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage::default(),
            },
        }
    }

    fn make_finish_events(&mut self, stop_reason: StopReason) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        // BTreeMap keeps this in ascending index order
        let mut events: Vec<StreamEvent> = std::mem::take(&mut self.open_blocks)
            .into_keys()
            .map(|index| StreamEvent::ContentBlockStop { index })
            .collect();

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason.as_str().to_string()),
                stop_sequence: None,
            },
            usage: self.usage,
        });
        events.push(StreamEvent::MessageStop);

        events
    }
}
