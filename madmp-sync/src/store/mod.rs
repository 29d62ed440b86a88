//! Identity & Association Store
//!
//! DMPs, datasets and the link table between them. All writes go through a
//! [`UnitOfWork`]: one SQLite transaction plus the lifecycle events produced
//! inside it. Events reach the [`EventBus`] only after the commit succeeds.

pub mod datasets;
pub mod dmps;

pub use datasets::Dataset;
pub use dmps::DataManagementPlan;

use madmp_common::{EventBus, MadmpEvent, Result};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

/// Handle to the database and the event bus
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    bus: EventBus,
}

impl Store {
    pub fn new(pool: SqlitePool, bus: EventBus) -> Self {
        Self { pool, bus }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Connection for read-only lookups
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Start a write transaction
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front; concurrent writers
    /// wait on the busy timeout.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(UnitOfWork {
            tx,
            pending: Vec::new(),
            bus: self.bus.clone(),
        })
    }
}

/// One transaction and the events it has produced so far
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    pending: Vec<MadmpEvent>,
    bus: EventBus,
}

impl UnitOfWork {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Queue an event for publication on commit
    pub fn emit(&mut self, event: MadmpEvent) {
        debug!(event = event.name(), "Queued lifecycle event");
        self.pending.push(event);
    }

    pub fn pending_events(&self) -> &[MadmpEvent] {
        &self.pending
    }

    /// Commit, then publish the queued events in emission order
    ///
    /// Returns the published events.
    pub async fn commit(self) -> Result<Vec<MadmpEvent>> {
        let UnitOfWork { tx, pending, bus } = self;
        tx.commit().await?;

        for event in &pending {
            bus.emit_lossy(event.clone());
        }

        Ok(pending)
    }

    /// Roll back and drop the queued events
    pub async fn rollback(self) -> Result<()> {
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "Discarding events of rolled back transaction");
        }
        self.tx.rollback().await?;
        Ok(())
    }
}
