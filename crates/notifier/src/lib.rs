//! Push gateway delivery.
//!
//! The dispatcher only talks to [`PushGateway`]; the concrete transport lives
//! behind it. [`HttpPushGateway`] posts batches to a JSON gateway endpoint.

pub mod gateway;
pub mod http;

pub use gateway::{GatewayError, InvalidReason, PushGateway, PushMessage, PushOutcome, TokenResult};
pub use http::HttpPushGateway;
