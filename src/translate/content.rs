//! Client message content: either a plain string or an ordered list of parts.

use super::image::{parse_data_url, DataUrl};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Text(String),
    Image(DataUrl),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<MessagePart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// All text parts concatenated in order; images are skipped.
    pub fn text_only(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    MessagePart::Text(t) => Some(t.as_str()),
                    MessagePart::Image(_) => None,
                })
                .collect(),
        }
    }

    pub fn as_parts(&self) -> Vec<MessagePart> {
        match self {
            Self::Text(text) => vec![MessagePart::Text(text.clone())],
            Self::Parts(parts) => parts.clone(),
        }
    }

    pub fn has_images(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Parts(parts) => parts.iter().any(|p| matches!(p, MessagePart::Image(_))),
        }
    }
}

// Wire shape: a string, an array of typed parts, or null.

#[derive(Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Parts(Vec<RawPart>),
}

#[derive(Deserialize)]
struct RawPart {
    #[serde(rename = "type")]
    part_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image_url: Option<RawImageUrl>,
}

#[derive(Deserialize)]
struct RawImageUrl {
    url: String,
}

impl RawPart {
    fn into_part(self) -> Option<MessagePart> {
        match self.part_type.as_str() {
            "text" => self.text.map(MessagePart::Text),
            // only inline data URLs are honoured; remote URLs are dropped
            "image_url" => self
                .image_url
                .and_then(|u| parse_data_url(&u.url))
                .map(MessagePart::Image),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<RawContent>::deserialize(deserializer)?;
        Ok(match raw {
            None => Self::default(),
            Some(RawContent::Text(text)) => Self::Text(text),
            Some(RawContent::Parts(parts)) => {
                Self::Parts(parts.into_iter().filter_map(RawPart::into_part).collect())
            }
        })
    }
}

/// Content is input-only for images; on the way out it is always plain text.
impl Serialize for MessageContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text_only())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MessageContent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_plain_string() {
        assert_eq!(parse(r#""hello""#), MessageContent::Text("hello".into()));
    }

    #[test]
    fn test_null_is_empty_text() {
        assert_eq!(parse("null"), MessageContent::Text(String::new()));
    }

    #[test]
    fn test_parts_with_image() {
        let content = parse(
            r#"[
                {"type": "text", "text": "What is "},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBORw0KGgo="}},
                {"type": "text", "text": "this?"}
            ]"#,
        );
        assert!(content.has_images());
        assert_eq!(content.text_only(), "What is this?");
        assert_eq!(content.as_parts().len(), 3);
    }

    #[test]
    fn test_remote_and_unknown_parts_dropped() {
        let content = parse(
            r#"[
                {"type": "image_url", "image_url": {"url": "https://example.com/a.png"}},
                {"type": "input_audio", "input_audio": {"data": "..."}},
                {"type": "text", "text": "hi"}
            ]"#,
        );
        assert!(!content.has_images());
        assert_eq!(content.as_parts(), vec![MessagePart::Text("hi".into())]);
    }

    #[test]
    fn test_text_only_ignores_image_positions() {
        let img = || {
            MessagePart::Image(DataUrl {
                format: "png".into(),
                payload: "AAAA".into(),
            })
        };
        let a = MessageContent::Parts(vec![
            img(),
            MessagePart::Text("ab".into()),
            MessagePart::Text("cd".into()),
        ]);
        let b = MessageContent::Parts(vec![
            MessagePart::Text("ab".into()),
            img(),
            MessagePart::Text("cd".into()),
            img(),
        ]);
        assert_eq!(a.text_only(), "abcd");
        assert_eq!(a.text_only(), b.text_only());
    }

    #[test]
    fn test_plain_text_as_single_part() {
        let content = MessageContent::Text("x".into());
        assert_eq!(content.as_parts(), vec![MessagePart::Text("x".into())]);
        assert!(!content.has_images());
    }

    #[test]
    fn test_serializes_as_text() {
        let content = MessageContent::Parts(vec![MessagePart::Text("hi".into())]);
        assert_eq!(serde_json::to_string(&content).unwrap(), r#""hi""#);
    }
}
