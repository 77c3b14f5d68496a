//! credstore
//!
//! Persisted cache of previously validated credentials and session tokens.
//!
//! # Design
//!
//! Entries come in two shapes, told apart by [`CredentialScope`]:
//!
//! - **Session manager** entries, keyed by (server URL, session manager, user),
//!   for servers that log in through a session manager service.
//! - **Organization** entries, keyed by (server URL, org id, user), for
//!   CSP token based servers.
//!
//! Each entry holds a long-lived [`Secret`] and at most one active
//! [`SessionToken`]. Adding an entry with an existing identity replaces
//! it, so a fresh session always supersedes the old one.
//!
//! # Example
//!
//! ```
//! use vsession::credstore::{CredentialEntry, CredentialQuery, CredentialStore, SecretCredentialStore};
//! use vsession::core::types::Secret;
//!
//! let store = SecretCredentialStore::in_memory();
//! store
//!     .add(CredentialEntry::session_manager(
//!         "https://vc/api",
//!         "admin",
//!         "com.vmware.cis.session",
//!         Some(Secret::Password("pw".into())),
//!         None,
//!     ))
//!     .unwrap();
//!
//! let query = CredentialQuery::session_manager("https://vc/api", "com.vmware.cis.session", None);
//! assert_eq!(store.get(&query).unwrap().unwrap().user.as_deref(), Some("admin"));
//! ```

mod store;

pub use store::{CredstoreDocument, SecretCredentialStore, CREDSTORE_KEY, CREDSTORE_KIND, CREDSTORE_VERSION};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{OrgId, Secret, SessionToken};
use crate::secrets::SecretError;

/// Errors from credential store operations.
#[derive(Debug, Error)]
pub enum CredstoreError {
    #[error(transparent)]
    Storage(#[from] SecretError),

    #[error("invalid credentials store document: {0}")]
    InvalidDocument(String),

    #[error("Couldn't find credstore entry. Please pass correct user and server values")]
    NotFound,

    #[error("Found more than one credstore entry for given user and server, pass session manager")]
    Ambiguous,
}

/// What an entry is keyed on besides server and user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum CredentialScope {
    SessionManager(String),
    Organization(Option<OrgId>),
}

/// One persisted credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub server: String,
    pub user: Option<String>,
    pub scope: CredentialScope,
    pub secret: Option<Secret>,
    pub session: Option<SessionToken>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialEntry {
    /// Entry for a session manager based server.
    pub fn session_manager(
        server: impl Into<String>,
        user: impl Into<String>,
        session_manager: impl Into<String>,
        secret: Option<Secret>,
        session: Option<SessionToken>,
    ) -> Self {
        Self {
            server: server.into(),
            user: Some(user.into()),
            scope: CredentialScope::SessionManager(session_manager.into()),
            secret,
            session,
            updated_at: Utc::now(),
        }
    }

    /// Entry for a CSP token based server.
    pub fn organization(
        server: impl Into<String>,
        user: Option<String>,
        org: Option<OrgId>,
        refresh_token: impl Into<String>,
        session: Option<SessionToken>,
    ) -> Self {
        Self {
            server: server.into(),
            user,
            scope: CredentialScope::Organization(org),
            secret: Some(Secret::RefreshToken(refresh_token.into())),
            session,
            updated_at: Utc::now(),
        }
    }

    /// Whether `other` names the same stored credential.
    ///
    /// Organization entries are keyed by server and org alone; the user
    /// is whoever the refresh token belongs to.
    pub fn same_identity(&self, other: &CredentialEntry) -> bool {
        if self.server != other.server || self.scope != other.scope {
            return false;
        }
        match self.scope {
            CredentialScope::SessionManager(_) => self.user == other.user,
            CredentialScope::Organization(_) => true,
        }
    }

    pub fn session_manager_name(&self) -> Option<&str> {
        match &self.scope {
            CredentialScope::SessionManager(sm) => Some(sm),
            CredentialScope::Organization(_) => None,
        }
    }

    pub fn org(&self) -> Option<&OrgId> {
        match &self.scope {
            CredentialScope::Organization(org) => org.as_ref(),
            CredentialScope::SessionManager(_) => None,
        }
    }
}

/// Lookup key for [`CredentialStore::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialQuery {
    pub server: String,
    pub scope: CredentialScope,
    pub user: Option<String>,
}

impl CredentialQuery {
    /// Match a session manager entry.
    ///
    /// Without a user, only a single unambiguous entry matches.
    pub fn session_manager(
        server: impl Into<String>,
        session_manager: impl Into<String>,
        user: Option<&str>,
    ) -> Self {
        Self {
            server: server.into(),
            scope: CredentialScope::SessionManager(session_manager.into()),
            user: user.map(str::to_string),
        }
    }

    /// Match an organization entry.
    ///
    /// Without an org id, the first entry for the server matches.
    pub fn organization(server: impl Into<String>, org: Option<&OrgId>, user: Option<&str>) -> Self {
        Self {
            server: server.into(),
            scope: CredentialScope::Organization(org.cloned()),
            user: user.map(str::to_string),
        }
    }
}

/// Persistent credential cache.
///
/// Implementations are shared, external resources. Callers assume no
/// locking beyond what a single write needs.
pub trait CredentialStore: Send + Sync {
    /// Find the entry matching `query`.
    fn get(&self, query: &CredentialQuery) -> Result<Option<CredentialEntry>, CredstoreError>;

    /// Add `entry`, replacing any entry with the same identity.
    fn add(&self, entry: CredentialEntry) -> Result<(), CredstoreError>;

    /// Remove entries for `server`, narrowed by user and scope.
    ///
    /// # Errors
    ///
    /// - [`CredstoreError::NotFound`] if nothing matches
    /// - [`CredstoreError::Ambiguous`] if several session manager entries
    ///   match and no scope was given
    fn remove(
        &self,
        server: &str,
        user: Option<&str>,
        scope: Option<&CredentialScope>,
    ) -> Result<usize, CredstoreError>;

    /// Drop active sessions from session manager entries.
    fn remove_session_ids(
        &self,
        server: Option<&str>,
        user: Option<&str>,
        session_manager: Option<&str>,
    ) -> Result<(), CredstoreError>;

    /// Drop sessions held by organization entries: CSP access tokens and
    /// the session ids of GovCloud vCenter logins.
    fn remove_auth_tokens(&self, server: Option<&str>, user: Option<&str>)
        -> Result<(), CredstoreError>;

    /// List entries, optionally for one server.
    fn list(&self, server: Option<&str>) -> Result<Vec<CredentialEntry>, CredstoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_identity_ignores_secrets() {
        let a = CredentialEntry::session_manager(
            "https://vc/api",
            "admin",
            "sm",
            Some(Secret::Password("a".into())),
            None,
        );
        let b = CredentialEntry::session_manager(
            "https://vc/api",
            "admin",
            "sm",
            Some(Secret::Password("b".into())),
            Some(SessionToken::SessionId("s".into())),
        );
        let c = CredentialEntry::session_manager("https://vc/api", "root", "sm", None, None);

        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn organization_identity_ignores_user() {
        let org = OrgId::new("3f2a8c1e-4b5d-4e6f-8a9b-0c1d2e3f4a5b").unwrap();
        let a = CredentialEntry::organization("https://vmc", None, Some(org.clone()), "r1", None);
        let b = CredentialEntry::organization(
            "https://vmc",
            Some("alice".into()),
            Some(org),
            "r2",
            None,
        );
        let c = CredentialEntry::organization("https://vmc", None, None, "r3", None);

        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn scope_accessors() {
        let org = OrgId::new("3f2a8c1e-4b5d-4e6f-8a9b-0c1d2e3f4a5b").unwrap();
        let e = CredentialEntry::organization("https://vmc", None, Some(org.clone()), "r", None);
        assert_eq!(e.org(), Some(&org));
        assert!(e.session_manager_name().is_none());
        assert!(e.secret.as_ref().unwrap().is_refresh_token());
    }

    #[test]
    fn error_messages() {
        assert!(CredstoreError::NotFound
            .to_string()
            .starts_with("Couldn't find credstore entry"));
        assert!(CredstoreError::Ambiguous.to_string().contains("pass session manager"));
    }
}
