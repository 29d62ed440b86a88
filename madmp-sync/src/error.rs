//! Reconciliation failure taxonomy

use thiserror::Error;

/// Result type for reconciliation and converter operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a reconciliation run
///
/// Every variant except `Storage` carries a message that is safe to show to
/// callers. `Storage` wraps the underlying error for logs only.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed or structurally invalid input document
    #[error("invalid DMP document: {0}")]
    InvalidDocument(String),

    /// More than one distribution of a dataset is hosted here
    #[error("dataset '{dataset_id}' has {count} distributions hosted by this repository")]
    DuplicateDistribution { dataset_id: String, count: usize },

    /// Contributor e-mails without a local user account
    #[error("unknown contributors: {}", .emails.join(", "))]
    UnknownContributors { emails: Vec<String> },

    /// No user account could be made owner of the record
    #[error("no eligible record owner: {0}")]
    NoEligibleOwner(String),

    /// No converter matched and no fallback is registered
    #[error("no record converter for: {0}")]
    ConverterNotFound(String),

    /// The acting identity may not write records
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Duplicate external identifier on create; may be retried
    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    /// The store stayed locked by a concurrent run; may be retried
    #[error("storage is busy, retry later")]
    Busy,

    /// Storage failure (not shown verbatim to callers)
    #[error("storage error: {0}")]
    Storage(#[source] madmp_common::Error),
}

/// Coarse classification used by the HTTP and CLI surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Document,
    Ambiguity,
    IdentityResolution,
    Conflict,
    Permission,
    Storage,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidDocument(_) => ErrorKind::Document,
            SyncError::DuplicateDistribution { .. } => ErrorKind::Ambiguity,
            SyncError::UnknownContributors { .. } | SyncError::NoEligibleOwner(_) => {
                ErrorKind::IdentityResolution
            }
            SyncError::Conflict { .. } | SyncError::Busy => ErrorKind::Conflict,
            SyncError::PermissionDenied(_) => ErrorKind::Permission,
            SyncError::ConverterNotFound(_) | SyncError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Message safe to return to a remote caller
    pub fn public_message(&self) -> String {
        match self {
            SyncError::Storage(_) => "internal storage error".to_string(),
            SyncError::ConverterNotFound(_) => "record converter configuration error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<madmp_common::Error> for SyncError {
    fn from(err: madmp_common::Error) -> Self {
        match err {
            madmp_common::Error::DuplicateKey { entity, key } => SyncError::Conflict { entity, key },
            madmp_common::Error::Busy(_) => SyncError::Busy,
            madmp_common::Error::InvalidInput(msg) => SyncError::InvalidDocument(msg),
            other => SyncError::Storage(other),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        madmp_common::Error::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_becomes_conflict() {
        let err: SyncError = madmp_common::Error::DuplicateKey {
            entity: "DataManagementPlan",
            key: "dmp-1".to_string(),
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "DataManagementPlan already exists: dmp-1");
    }

    #[test]
    fn test_locked_database_is_retryable() {
        let err: SyncError = madmp_common::Error::Busy("database is locked".to_string()).into();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.public_message(), "storage is busy, retry later");
    }

    #[test]
    fn test_storage_errors_are_redacted() {
        let err: SyncError = madmp_common::Error::Internal("disk /var/x is full".to_string()).into();

        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(!err.public_message().contains("/var/x"));
    }

    #[test]
    fn test_unknown_contributors_lists_emails() {
        let err = SyncError::UnknownContributors {
            emails: vec!["a@x.org".to_string(), "b@y.org".to_string()],
        };

        assert_eq!(err.kind(), ErrorKind::IdentityResolution);
        assert_eq!(err.public_message(), "unknown contributors: a@x.org, b@y.org");
    }
}
