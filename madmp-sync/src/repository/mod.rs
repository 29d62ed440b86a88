//! Host repository stand-in
//!
//! Records, their persistent identifiers and the user accounts that own them.
//! The synchronization core only reaches records through PIDs.

pub mod pids;
pub mod records;
pub mod users;

pub use pids::{PersistentIdentifier, PidStatus};
pub use records::{fetch_unassigned_record, strip_identifier, Record, RECID_PID_TYPE};
pub use users::User;

/// Identity a record write is performed as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Internal process (CLI, authenticated DMP tool)
    System,
    /// A local user account
    User(i64),
    Anonymous,
}

impl Identity {
    pub fn can_create_records(&self) -> bool {
        !matches!(self, Identity::Anonymous)
    }

    /// System may update anything, users only records they own
    pub fn can_update(&self, record: &Record) -> bool {
        match self {
            Identity::System => true,
            Identity::User(id) => record.owners().contains(id),
            Identity::Anonymous => false,
        }
    }
}
