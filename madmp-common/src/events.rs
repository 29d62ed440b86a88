//! Lifecycle events for DMPs, datasets and records
//!
//! Provides one typed event per lifecycle transition and the [`EventBus`]
//! used to deliver them in-process.
//!
//! Events produced inside a storage transaction are buffered by the caller and
//! only handed to the bus after the transaction commits, so subscribers never
//! observe state that was rolled back.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Reference to a persistent identifier carried inside events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidRef {
    /// Row id in the PID table
    pub id: i64,
    pub pid_type: String,
    pub pid_value: String,
}

/// maDMP lifecycle event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MadmpEvent {
    /// A DMP was seen for the first time
    DmpCreated {
        dmp_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A DMP was deleted by an administrator (its datasets were detached)
    DmpDeleted {
        dmp_id: String,
        /// Datasets that were linked at deletion time
        dataset_ids: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A dataset entity was created
    DatasetCreated {
        dataset_id: String,
        record_pid: Option<PidRef>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A dataset entity was deleted by an administrator
    ///
    /// Carries the record it pointed to, because the dataset row is gone by the
    /// time subscribers see this.
    DatasetDeleted {
        dataset_id: String,
        record_id: Option<Uuid>,
        record_pid: Option<PidRef>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A dataset was linked to a DMP
    DatasetAddedToDmp {
        dmp_id: String,
        dataset_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A dataset was unlinked from a DMP
    DatasetRemovedFromDmp {
        dmp_id: String,
        dataset_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A dataset was re-pointed to a different record
    DatasetRecordChanged {
        dataset_id: String,
        old_record: Option<Uuid>,
        old_pid: Option<PidRef>,
        new_record: Option<Uuid>,
        new_pid: Option<PidRef>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A repository record's metadata was written
    RecordUpdated {
        record_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A repository record was deleted
    RecordDeleted {
        record_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl MadmpEvent {
    /// Stable event name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            MadmpEvent::DmpCreated { .. } => "dmp-created",
            MadmpEvent::DmpDeleted { .. } => "dmp-deleted",
            MadmpEvent::DatasetCreated { .. } => "dataset-created",
            MadmpEvent::DatasetDeleted { .. } => "dataset-deleted",
            MadmpEvent::DatasetAddedToDmp { .. } => "dmp-dataset-added",
            MadmpEvent::DatasetRemovedFromDmp { .. } => "dmp-dataset-removed",
            MadmpEvent::DatasetRecordChanged { .. } => "dataset-record-pid-changed",
            MadmpEvent::RecordUpdated { .. } => "record-updated",
            MadmpEvent::RecordDeleted { .. } => "record-deleted",
        }
    }
}

/// Event distribution bus
///
/// Wraps a `tokio::sync::broadcast` channel. Cloning is cheap and every clone
/// publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MadmpEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    ///
    /// # Examples
    ///
    /// ```
    /// use madmp_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MadmpEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MadmpEvent,
    ) -> Result<usize, broadcast::error::SendError<MadmpEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MadmpEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
