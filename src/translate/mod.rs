//! Translation between the two client protocols and the backend Converse shape.
//!
//! The core of the gateway: converts requests, responses, and streaming events.
//! All translation functions are pure (no I/O).

pub mod anthropic_request;
pub mod anthropic_response;
pub mod anthropic_types;
pub mod content;
pub mod image;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
