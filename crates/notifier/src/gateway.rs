//! Gateway contract shared by the dispatcher and concrete transports.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One push addressed to one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
}

/// Why the gateway refused a token for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    InvalidToken,
    Unregistered,
}

impl InvalidReason {
    /// Stored as the device's `disabled_reason`.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::InvalidToken => "INVALID_TOKEN",
            InvalidReason::Unregistered => "UNREGISTERED",
        }
    }
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-token result of a batch send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Ok,
    /// The token will never work again; the device should be disabled.
    InvalidToken(InvalidReason),
    /// Timeout, rate limit or similar. The message is dropped.
    TransientFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResult {
    pub token: String,
    pub outcome: PushOutcome,
}

impl TokenResult {
    pub fn new(token: impl Into<String>, outcome: PushOutcome) -> Self {
        Self {
            token: token.into(),
            outcome,
        }
    }
}

/// Batch-level failure: the call as a whole did not go through.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Gateway rejected batch: {0}")]
    Rejected(String),

    #[error("Gateway response could not be decoded: {0}")]
    Decode(String),
}

/// External push gateway (FCM, APNs relay, Web Push relay, ...).
///
/// Implementations do not retry; delivery is at-most-once per send.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Largest batch a single [`PushGateway::send`] call accepts.
    fn max_batch_size(&self) -> usize;

    /// Send a batch and report one outcome per token.
    async fn send(&self, batch: &[PushMessage]) -> Result<Vec<TokenResult>, GatewayError>;
}
