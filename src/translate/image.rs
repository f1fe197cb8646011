//! Inline image parsing and validation.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// Backend ceiling for a single image, in decoded bytes (3.75 MiB).
pub const MAX_IMAGE_BYTES: usize = 3_932_160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Only the exact lowercase names are accepted; `jpg` is not `jpeg`.
    pub fn parse(format: &str) -> Option<Self> {
        match format {
            "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

/// A parsed `data:image/<format>;base64,<payload>` reference.
///
/// The format is whatever the client wrote; it is checked by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub format: String,
    pub payload: String,
}

/// A validated image ready for the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub format: ImageFormat,
    pub base64_payload: String,
}

/// Parse a data URL. Returns `None` for anything that is not an inline image.
pub fn parse_data_url(url: &str) -> Option<DataUrl> {
    let rest = url.strip_prefix("data:image/")?;
    let (format, rest) = rest.split_once(';')?;
    let payload = rest.strip_prefix("base64,")?;
    if payload.is_empty() {
        return None;
    }
    Some(DataUrl {
        format: format.to_string(),
        payload: payload.to_string(),
    })
}

/// Decoded size estimate. No decoding is done.
pub fn estimated_bytes(base64_payload: &str) -> usize {
    base64_payload.len() * 3 / 4
}

/// Check the format allow-list, then the size ceiling.
pub fn validate(format: &str, base64_payload: &str) -> Result<ImageData> {
    let format =
        ImageFormat::parse(format).ok_or_else(|| GatewayError::UnsupportedFormat(format.into()))?;

    let estimated = estimated_bytes(base64_payload);
    if estimated > MAX_IMAGE_BYTES {
        return Err(GatewayError::ImageTooLarge(estimated));
    }

    Ok(ImageData {
        format,
        base64_payload: base64_payload.to_string(),
    })
}
