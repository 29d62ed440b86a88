//! Record owner resolution
//!
//! Owners come from the DMP contact and the contributors whose roles make
//! them eligible. E-mail addresses are resolved against local accounts once
//! per reconciliation run ([`UserDirectory`]); resolution itself is pure.

use std::collections::HashMap;

use madmp_common::config::SyncConfig;
use madmp_common::madmp::Dmp;
use madmp_common::Result;
use sqlx::SqliteConnection;

use crate::error::{SyncError, SyncResult};
use crate::repository::users::{self, User};

/// E-mail (lowercased) to user account, for the addresses of one document
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    by_email: HashMap<String, User>,
}

impl UserDirectory {
    /// Look up every address in `emails`
    pub async fn load<I, S>(conn: &mut SqliteConnection, emails: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_email = HashMap::new();
        for email in emails {
            let key = email.as_ref().trim().to_lowercase();
            if key.is_empty() || by_email.contains_key(&key) {
                continue;
            }
            if let Some(user) = users::find_by_email(conn, &key).await? {
                by_email.insert(key, user);
            }
        }
        Ok(Self { by_email })
    }

    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            by_email: users
                .into_iter()
                .map(|u| (u.email.to_lowercase(), u))
                .collect(),
        }
    }

    pub fn get(&self, email: &str) -> Option<&User> {
        self.by_email.get(&email.trim().to_lowercase())
    }
}

/// Every e-mail address a document mentions
pub fn document_emails(dmp: &Dmp) -> Vec<String> {
    dmp.contact
        .iter()
        .filter_map(|c| c.mbox.clone())
        .chain(dmp.contributor.iter().filter_map(|c| c.mbox.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOwners {
    pub owners: Vec<i64>,
    pub created_by: i64,
}

/// Decide who owns the records created from `dmp`
///
/// Fails with [`SyncError::NoEligibleOwner`] when no contributor has a
/// relevant role or no address belongs to a local user, and with
/// [`SyncError::UnknownContributors`] when some address is unknown and
/// unknown contributors are not allowed.
pub fn resolve_owners(dmp: &Dmp, config: &SyncConfig, users: &UserDirectory) -> SyncResult<RecordOwners> {
    let eligible: Vec<_> = dmp
        .contributor
        .iter()
        .filter(|c| config.is_relevant_contributor(&c.role))
        .collect();

    if eligible.is_empty() {
        return Err(SyncError::NoEligibleOwner(
            "the contributors contain no suitable record owners by role".to_string(),
        ));
    }

    let mut emails: Vec<String> = Vec::new();
    let contact = dmp.contact.as_ref().and_then(|c| c.mbox.as_deref());
    for email in contact.into_iter().chain(eligible.iter().filter_map(|c| c.mbox.as_deref())) {
        let email = email.trim();
        if !email.is_empty() && !emails.iter().any(|e| e.eq_ignore_ascii_case(email)) {
            emails.push(email.to_string());
        }
    }

    let unknown: Vec<String> = emails
        .iter()
        .filter(|e| users.get(e).is_none())
        .cloned()
        .collect();

    if !unknown.is_empty() && !config.allow_unknown_contributors {
        return Err(SyncError::UnknownContributors { emails: unknown });
    }

    let mut owners: Vec<i64> = Vec::new();
    for user in emails.iter().filter_map(|e| users.get(e)) {
        if !owners.contains(&user.id) {
            owners.push(user.id);
        }
    }

    let Some(first) = owners.first().copied() else {
        return Err(SyncError::NoEligibleOwner(format!(
            "no registered users found for any e-mail address: [{}]",
            emails.join(", ")
        )));
    };

    Ok(RecordOwners {
        owners,
        created_by: config.record_creator_user_id.unwrap_or(first),
    })
}
