//! HTTP transport shared by every gateway call.

pub mod http;

pub use http::{HttpTransport, TransportError};
