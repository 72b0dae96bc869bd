//! 类型模块：网关调用的请求、消息与输出类型。
//!
//! # Types Module
//!
//! Vendor-neutral request and result types shared by every dialect.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and text content |
//! | [`UnifiedRequest`] | One immutable completion request |
//! | [`GenerationOutput`] | Final result of a streaming generation |
//! | [`CallStats`] | Per-call diagnostics (attempts, status, upstream id) |
//!
//! ## Example
//!
//! ```rust
//! use ghosttype_gateway::types::{Message, UnifiedRequest};
//!
//! let request = UnifiedRequest::builder()
//!     .mode("dictation")
//!     .system_prompt("Polish the transcript.")
//!     .message(Message::user("um so basically the meeting moved to friday"))
//!     .max_tokens(4096)
//!     .build();
//! assert!(request.params.stream);
//! ```

pub mod events;
pub mod message;
pub mod request;

pub use events::{CallStats, GenerationOutput};
pub use message::{Message, MessageRole};
pub use request::{
    GenerationParams, RequestMetadata, ResponseFormat, UnifiedRequest, UnifiedRequestBuilder,
};
