//! Commit-gated event bus.
//!
//! Push intents produced during a unit of work sit in a [`PendingDispatches`]
//! buffer. Only [`EventBus::release`], called after a successful commit, moves
//! them onto the bounded dispatch queue. Dropping the buffer (rollback, error,
//! early return) discards everything in it.
//!
//! `release` never awaits: the producing request path sees no added latency.
//! When the queue is full, the rest of the batch moves to a background task
//! that waits for room and sends in order. Requests are dropped only once the
//! dispatcher is gone.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use courier_common::types::NotificationDispatchRequest;

/// Consumer side of the dispatch queue, owned by the dispatcher worker.
pub type DispatchReceiver = mpsc::Receiver<NotificationDispatchRequest>;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: mpsc::Sender<NotificationDispatchRequest>,
}

impl EventBus {
    /// Create the bus and the receiver the dispatcher consumes.
    pub fn new(capacity: usize) -> (Self, DispatchReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Start buffering for a new unit of work.
    pub fn begin(&self) -> PendingDispatches {
        PendingDispatches::default()
    }

    /// Hand buffered requests to the dispatcher, in enqueue order.
    ///
    /// Returns how many were handed off, either queued directly or held by a
    /// background sender while the queue is full.
    pub fn release(&self, mut pending: PendingDispatches) -> usize {
        let mut requests = std::mem::take(&mut pending.requests).into_iter();
        let total = requests.len();
        let mut queued = 0;
        let mut deferred = 0;

        while let Some(request) = requests.next() {
            match self.sender.try_send(request) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(request)) => {
                    let backlog: Vec<_> = std::iter::once(request).chain(requests.by_ref()).collect();
                    deferred = self.defer(backlog);
                    break;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(
                        dropped = total - queued,
                        "Dispatcher stopped, push intents dropped"
                    );
                    break;
                }
            }
        }

        if total > 0 {
            tracing::debug!(queued, deferred, total, "Released push intents after commit");
        }
        queued + deferred
    }

    /// Send `backlog` from a spawned task once the queue has room.
    fn defer(&self, backlog: Vec<NotificationDispatchRequest>) -> usize {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                dropped = backlog.len(),
                "Dispatch queue full outside a runtime, push intents dropped"
            );
            return 0;
        };

        let count = backlog.len();
        tracing::debug!(deferred = count, "Dispatch queue full, sending push intents in background");

        let sender = self.sender.clone();
        runtime.spawn(async move {
            let mut remaining = backlog.len();
            for request in backlog {
                if sender.send(request).await.is_err() {
                    tracing::warn!(
                        dropped = remaining,
                        "Dispatcher stopped, deferred push intents dropped"
                    );
                    return;
                }
                remaining -= 1;
            }
        });

        count
    }
}

/// Push intents buffered by one open unit of work.
#[derive(Debug, Default)]
pub struct PendingDispatches {
    requests: Vec<NotificationDispatchRequest>,
}

impl PendingDispatches {
    pub fn enqueue(&mut self, request: NotificationDispatchRequest) {
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Drop for PendingDispatches {
    fn drop(&mut self) {
        if !self.requests.is_empty() {
            tracing::debug!(
                discarded = self.requests.len(),
                "Unit of work ended without commit, push intents discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(title: &str) -> NotificationDispatchRequest {
        NotificationDispatchRequest::new([Uuid::new_v4()], title, "body", None).unwrap()
    }

    #[tokio::test]
    async fn test_rolled_back_requests_never_reach_dispatcher() {
        let (bus, mut receiver) = EventBus::new(8);

        let mut pending = bus.begin();
        pending.enqueue(request("a"));
        pending.enqueue(request("b"));
        drop(pending);

        drop(bus);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_committed_requests_arrive_once_in_order() {
        let (bus, mut receiver) = EventBus::new(8);

        let mut pending = bus.begin();
        for title in ["first", "second", "third"] {
            pending.enqueue(request(title));
        }
        assert_eq!(bus.release(pending), 3);
        drop(bus);

        let mut titles = Vec::new();
        while let Some(req) = receiver.recv().await {
            titles.push(req.title);
        }
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_units_of_work_are_isolated() {
        let (bus, mut receiver) = EventBus::new(8);

        let mut committed = bus.begin();
        let mut rolled_back = bus.begin();
        committed.enqueue(request("kept"));
        rolled_back.enqueue(request("lost"));

        drop(rolled_back);
        bus.release(committed);
        drop(bus);

        assert_eq!(receiver.recv().await.unwrap().title, "kept");
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_delivers_everything_in_order() {
        let (bus, mut receiver) = EventBus::new(1);

        let mut pending = bus.begin();
        for title in ["a", "b", "c"] {
            pending.enqueue(request(title));
        }
        assert_eq!(bus.release(pending), 3);
        drop(bus);

        let mut titles = Vec::new();
        while let Some(req) = receiver.recv().await {
            titles.push(req.title);
        }
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_release_under_pressure_does_not_block() {
        let (bus, mut receiver) = EventBus::new(2);

        for unit in 0..5 {
            let mut pending = bus.begin();
            pending.enqueue(request(&format!("{}-1", unit)));
            pending.enqueue(request(&format!("{}-2", unit)));
            assert_eq!(bus.release(pending), 2);
        }
        drop(bus);

        let mut titles = Vec::new();
        while let Some(req) = receiver.recv().await {
            titles.push(req.title);
        }
        assert_eq!(titles.len(), 10);
        for unit in 0..5 {
            let first = titles.iter().position(|t| *t == format!("{}-1", unit)).unwrap();
            let second = titles.iter().position(|t| *t == format!("{}-2", unit)).unwrap();
            assert!(first < second);
        }
    }

    #[test]
    fn test_full_queue_outside_runtime_drops_overflow() {
        let (bus, _receiver) = EventBus::new(1);

        let mut pending = bus.begin();
        pending.enqueue(request("fits"));
        pending.enqueue(request("overflow"));

        assert_eq!(bus.release(pending), 1);
    }

    #[test]
    fn test_release_after_dispatcher_stopped() {
        let (bus, receiver) = EventBus::new(4);
        drop(receiver);

        let mut pending = bus.begin();
        pending.enqueue(request("orphan"));
        assert_eq!(bus.release(pending), 0);
    }

    #[test]
    fn test_empty_release_is_noop() {
        let (bus, _receiver) = EventBus::new(4);
        let pending = bus.begin();
        assert!(pending.is_empty());
        assert_eq!(bus.release(pending), 0);
    }
}
