//! JSON-over-HTTP gateway client.
//!
//! Request: `POST {url}` with `{"messages": [PushMessage, ...]}`.
//! Response: `{"results": [{"token": "...", "status": "ok", "error": null}, ...]}`
//! where `status` is one of `ok`, `invalid_token`, `unregistered`, `transient`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::gateway::{
    GatewayError, InvalidReason, PushGateway, PushMessage, PushOutcome, TokenResult,
};

/// Default per-call token limit, matching common provider multicast limits.
const DEFAULT_MAX_BATCH_SIZE: usize = 500;

#[derive(Serialize)]
struct BatchRequest<'a> {
    messages: &'a [PushMessage],
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Vec<TokenStatus>,
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    token: String,
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP push gateway client.
pub struct HttpPushGateway {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    max_batch_size: usize,
}

impl HttpPushGateway {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            api_key,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        })
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Map the gateway's per-token statuses back onto the batch.
    ///
    /// Tokens the gateway did not report on count as transient failures.
    fn map_results(batch: &[PushMessage], response: BatchResponse) -> Vec<TokenResult> {
        let mut by_token: HashMap<String, TokenStatus> = response
            .results
            .into_iter()
            .map(|r| (r.token.clone(), r))
            .collect();

        batch
            .iter()
            .map(|msg| {
                let outcome = match by_token.remove(&msg.token) {
                    Some(status) => Self::classify(&status),
                    None => PushOutcome::TransientFailure("no result for token".to_string()),
                };
                TokenResult::new(msg.token.clone(), outcome)
            })
            .collect()
    }

    fn classify(status: &TokenStatus) -> PushOutcome {
        match status.status.to_ascii_lowercase().as_str() {
            "ok" | "success" => PushOutcome::Ok,
            "invalid_token" | "invalid_argument" => {
                PushOutcome::InvalidToken(InvalidReason::InvalidToken)
            }
            "unregistered" | "not_found" => PushOutcome::InvalidToken(InvalidReason::Unregistered),
            other => PushOutcome::TransientFailure(
                status
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("status {}", other)),
            ),
        }
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn send(&self, batch: &[PushMessage]) -> Result<Vec<TokenResult>, GatewayError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(&self.url)
            .json(&BatchRequest { messages: batch });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Unavailable(format!("timed out: {}", e))
            } else {
                GatewayError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("HTTP {}: {}", status, detail)));
        }

        let body: BatchResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        tracing::debug!(
            tokens = batch.len(),
            results = body.results.len(),
            "Gateway batch accepted"
        );

        Ok(Self::map_results(batch, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(token: &str) -> PushMessage {
        PushMessage {
            token: token.to_string(),
            title: "New review".to_string(),
            body: "Someone reviewed your post".to_string(),
            link_url: None,
        }
    }

    fn response(json: serde_json::Value) -> BatchResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_map_results_classifies_statuses() {
        let batch = vec![message("a"), message("b"), message("c"), message("d")];
        let body = response(serde_json::json!({
            "results": [
                {"token": "a", "status": "ok"},
                {"token": "b", "status": "invalid_token"},
                {"token": "c", "status": "UNREGISTERED"},
                {"token": "d", "status": "transient", "error": "rate limited"}
            ]
        }));

        let results = HttpPushGateway::map_results(&batch, body);
        assert_eq!(results[0].outcome, PushOutcome::Ok);
        assert_eq!(
            results[1].outcome,
            PushOutcome::InvalidToken(InvalidReason::InvalidToken)
        );
        assert_eq!(
            results[2].outcome,
            PushOutcome::InvalidToken(InvalidReason::Unregistered)
        );
        assert_eq!(
            results[3].outcome,
            PushOutcome::TransientFailure("rate limited".to_string())
        );
    }

    #[test]
    fn test_missing_result_is_transient() {
        let batch = vec![message("a"), message("b")];
        let body = response(serde_json::json!({
            "results": [{"token": "a", "status": "ok"}]
        }));

        let results = HttpPushGateway::map_results(&batch, body);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].token, "b");
        assert!(matches!(results[1].outcome, PushOutcome::TransientFailure(_)));
    }

    #[test]
    fn test_results_follow_batch_order() {
        let batch = vec![message("x"), message("y")];
        let body = response(serde_json::json!({
            "results": [
                {"token": "y", "status": "ok"},
                {"token": "x", "status": "ok"}
            ]
        }));

        let tokens: Vec<String> = HttpPushGateway::map_results(&batch, body)
            .into_iter()
            .map(|r| r.token)
            .collect();
        assert_eq!(tokens, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_call() {
        let gateway = HttpPushGateway::new(
            "http://127.0.0.1:9/unreachable".to_string(),
            None,
            Duration::from_millis(50),
        )
        .unwrap();
        let results = gateway.send(&[]).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_unavailable() {
        let gateway = HttpPushGateway::new(
            "http://127.0.0.1:9/unreachable".to_string(),
            None,
            Duration::from_millis(200),
        )
        .unwrap();
        let result = gateway.send(&[message("a")]).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }
}
