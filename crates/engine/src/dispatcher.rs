//! Push dispatcher — turns released push intents into gateway calls.
//!
//! For one request:
//! 1. Resolve enabled devices of the recipients via the registry
//! 2. Split the distinct tokens into gateway-sized batches
//! 3. Send batches concurrently (bounded)
//! 4. Feed per-token outcomes back into the registry
//!
//! Nothing here returns an error to a caller. The originating transaction has
//! already committed; failures are logged and counted in the [`DispatchReport`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use courier_common::types::NotificationDispatchRequest;
use courier_notifier::{PushGateway, PushMessage, PushOutcome};

use crate::bus::DispatchReceiver;
use crate::registry::DeviceRegistry;

/// Default gateway batch size.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Default number of batches in flight at once.
const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 4;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on tokens per gateway call; capped by the gateway's own limit
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
        }
    }
}

/// What happened to one dispatch request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Distinct tokens targeted
    pub devices: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub delivered: usize,
    /// Tokens the gateway reported invalid or unregistered
    pub invalidated: usize,
    /// Tokens dropped after a transient per-token failure
    pub transient: usize,
}

impl DispatchReport {
    fn merge(&mut self, other: DispatchReport) {
        self.failed_batches += other.failed_batches;
        self.delivered += other.delivered;
        self.invalidated += other.invalidated;
        self.transient += other.transient;
    }
}

pub struct PushDispatcher {
    registry: Arc<dyn DeviceRegistry>,
    gateway: Arc<dyn PushGateway>,
    batch_size: usize,
    limiter: Arc<Semaphore>,
}

impl PushDispatcher {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        gateway: Arc<dyn PushGateway>,
        config: DispatcherConfig,
    ) -> Self {
        let batch_size = config
            .batch_size
            .min(gateway.max_batch_size())
            .max(1);
        Self {
            registry,
            gateway,
            batch_size,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_batches.max(1))),
        }
    }

    /// Deliver one request. Never fails; see [`DispatchReport`].
    pub async fn dispatch(&self, request: &NotificationDispatchRequest) -> DispatchReport {
        let mut report = DispatchReport::default();

        let devices = match self
            .registry
            .list_enabled_devices(request.recipient_user_ids())
            .await
        {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(
                    recipients = request.recipient_user_ids().len(),
                    error = %e,
                    "Could not resolve push devices, dispatch skipped"
                );
                return report;
            }
        };

        // Send each token once.
        let mut seen = HashSet::new();
        let messages: Vec<PushMessage> = devices
            .into_iter()
            .filter(|d| seen.insert(d.push_token.clone()))
            .map(|d| PushMessage {
                token: d.push_token,
                title: request.title.clone(),
                body: request.body.clone(),
                link_url: request.link_url.clone(),
            })
            .collect();

        if messages.is_empty() {
            tracing::debug!(
                recipients = request.recipient_user_ids().len(),
                "No enabled devices for recipients"
            );
            return report;
        }

        report.devices = messages.len();

        let mut batches = JoinSet::new();
        for (index, chunk) in messages.chunks(self.batch_size).enumerate() {
            let permit = match self.limiter.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let gateway = self.gateway.clone();
            let registry = self.registry.clone();
            let batch = chunk.to_vec();

            batches.spawn(async move {
                let _permit = permit;
                Self::send_batch(gateway.as_ref(), registry.as_ref(), index, batch).await
            });
            report.batches += 1;
        }

        while let Some(joined) = batches.join_next().await {
            match joined {
                Ok(batch_report) => report.merge(batch_report),
                Err(e) => {
                    tracing::error!(error = %e, "Push batch task aborted");
                    report.failed_batches += 1;
                }
            }
        }

        report
    }

    async fn send_batch(
        gateway: &dyn PushGateway,
        registry: &dyn DeviceRegistry,
        index: usize,
        batch: Vec<PushMessage>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        let results = match gateway.send(&batch).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(
                    batch = index,
                    tokens = batch.len(),
                    error = %e,
                    "Gateway batch failed, messages dropped"
                );
                report.failed_batches = 1;
                return report;
            }
        };

        for result in results {
            match result.outcome {
                PushOutcome::Ok => report.delivered += 1,
                PushOutcome::InvalidToken(reason) => {
                    report.invalidated += 1;
                    if let Err(e) = registry.disable_by_token(&result.token, reason.as_str()).await {
                        tracing::warn!(
                            batch = index,
                            reason = %reason,
                            error = %e,
                            "Failed to disable invalid push token"
                        );
                    }
                }
                PushOutcome::TransientFailure(detail) => {
                    report.transient += 1;
                    tracing::debug!(batch = index, detail = %detail, "Push dropped after transient failure");
                }
            }
        }

        report
    }

    /// Consume released requests in arrival order until the queue closes.
    pub async fn run(self, mut receiver: DispatchReceiver) {
        tracing::info!(batch_size = self.batch_size, "Push dispatcher started");

        while let Some(request) = receiver.recv().await {
            let report = self.dispatch(&request).await;
            tracing::info!(
                recipients = request.recipient_user_ids().len(),
                devices = report.devices,
                batches = report.batches,
                failed_batches = report.failed_batches,
                delivered = report.delivered,
                invalidated = report.invalidated,
                transient = report.transient,
                "Push dispatch finished"
            );
        }

        tracing::info!("Dispatch queue closed, push dispatcher stopped");
    }

    /// Run the worker on its own task.
    pub fn spawn(self, receiver: DispatchReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }
}
