//! Unit of work — a database transaction paired with its pending push intents.

use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use courier_common::error::AppError;
use courier_common::types::NotificationDispatchRequest;

use crate::bus::{EventBus, PendingDispatches};

/// A transaction whose push intents are released only if it commits.
///
/// Dropping an uncommitted unit of work rolls the transaction back and
/// discards its intents.
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    pending: PendingDispatches,
    bus: EventBus,
}

impl UnitOfWork {
    pub async fn begin(pool: &PgPool, bus: &EventBus) -> Result<Self, AppError> {
        let tx = pool.begin().await?;
        Ok(Self {
            tx,
            pending: bus.begin(),
            bus: bus.clone(),
        })
    }

    /// Connection to run statements inside the transaction.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Buffer a push intent until commit.
    pub fn enqueue(&mut self, request: NotificationDispatchRequest) {
        self.pending.enqueue(request);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Commit, then release buffered intents. Returns how many were queued.
    ///
    /// A failed commit drops the intents with the transaction.
    pub async fn commit(self) -> Result<usize, AppError> {
        let UnitOfWork { tx, pending, bus } = self;
        tx.commit().await?;
        Ok(bus.release(pending))
    }

    pub async fn rollback(self) -> Result<(), AppError> {
        let UnitOfWork { tx, pending, .. } = self;
        drop(pending);
        tx.rollback().await?;
        Ok(())
    }
}
