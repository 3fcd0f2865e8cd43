//! Bidirectional mapping between OpenAI chat-completion shapes and the
//! Qwen-native wire format.
//!
//! Everything here is pure (no I/O): request payload builders one way,
//! frame/response mapping the other. The streaming byte adapter that feeds
//! [`map_frame`] lives in `qwengate-provider`.
//!
//! [`map_frame`]: qwen_to_openai::map_frame

pub mod openai_to_qwen;
pub mod qwen_to_openai;

pub use openai_to_qwen::{build_completion_payload, build_create_chat_payload, build_message};
pub use qwen_to_openai::{
    FrameAction, content_chunk, extract_parent_id, finish_chunk, map_frame, map_usage,
    non_stream_response,
};
