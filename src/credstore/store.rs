//! credstore::store
//!
//! Credential store persisted as one versioned JSON document under a
//! single [`SecretStore`] key.
//!
//! # Security
//!
//! The document holds passwords and refresh tokens. It is only ever
//! written through a `SecretStore`, and every secret-bearing type redacts
//! itself in `Debug`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{CredentialEntry, CredentialQuery, CredentialScope, CredentialStore, CredstoreError};
use crate::secrets::{MemorySecretStore, SecretStore};

/// Kind identifier for credential store documents.
pub const CREDSTORE_KIND: &str = "vsession.credstore";

/// Current schema version.
pub const CREDSTORE_VERSION: u32 = 1;

/// Key the document is stored under.
pub const CREDSTORE_KEY: &str = "credstore.v1";

/// Serialized form of the whole credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredstoreDocument {
    pub kind: String,
    pub schema_version: u32,
    #[serde(default)]
    pub entries: Vec<CredentialEntry>,
}

impl Default for CredstoreDocument {
    fn default() -> Self {
        Self {
            kind: CREDSTORE_KIND.to_string(),
            schema_version: CREDSTORE_VERSION,
            entries: Vec::new(),
        }
    }
}

impl CredstoreDocument {
    /// Parse a document, rejecting unknown kinds and versions.
    pub fn parse(json: &str) -> Result<Self, CredstoreError> {
        let doc: Self = serde_json::from_str(json)
            .map_err(|e| CredstoreError::InvalidDocument(e.to_string()))?;

        if doc.kind != CREDSTORE_KIND {
            return Err(CredstoreError::InvalidDocument(format!(
                "unexpected kind '{}', expected '{}'",
                doc.kind, CREDSTORE_KIND
            )));
        }
        if doc.schema_version != CREDSTORE_VERSION {
            return Err(CredstoreError::InvalidDocument(format!(
                "unsupported schema version {}, expected {}",
                doc.schema_version, CREDSTORE_VERSION
            )));
        }
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String, CredstoreError> {
        serde_json::to_string(self).map_err(|e| CredstoreError::InvalidDocument(e.to_string()))
    }
}

/// [`CredentialStore`] on top of any [`SecretStore`].
///
/// Every mutation reloads the document under the store's write lock, so
/// concurrent writers never lose each other's entries.
pub struct SecretCredentialStore {
    secrets: Box<dyn SecretStore>,
}

impl SecretCredentialStore {
    pub fn new(secrets: Box<dyn SecretStore>) -> Self {
        Self { secrets }
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemorySecretStore::new()))
    }

    fn load(&self) -> Result<CredstoreDocument, CredstoreError> {
        match self.secrets.read(CREDSTORE_KEY)? {
            Some(json) => CredstoreDocument::parse(&json),
            None => Ok(CredstoreDocument::default()),
        }
    }

    /// Apply `f` to the freshly loaded document and persist the result.
    ///
    /// Nothing is written when `f` fails or reports no change.
    fn mutate<T, F>(&self, f: F) -> Result<T, CredstoreError>
    where
        F: FnOnce(&mut CredstoreDocument) -> Result<(T, bool), CredstoreError>,
    {
        let guard = self.secrets.lock()?;
        let mut doc = self.load()?;
        let (out, changed) = f(&mut doc)?;
        if changed {
            if doc.entries.is_empty() {
                self.secrets.remove(&guard, CREDSTORE_KEY)?;
            } else {
                self.secrets.write(&guard, CREDSTORE_KEY, &doc.to_json()?)?;
            }
        }
        Ok(out)
    }

    fn strip_sessions<F>(&self, mut matches: F) -> Result<(), CredstoreError>
    where
        F: FnMut(&CredentialEntry) -> bool,
    {
        self.mutate(|doc| {
            let mut changed = false;
            for entry in doc.entries.iter_mut().filter(|e| e.session.is_some()) {
                if matches(entry) {
                    entry.session = None;
                    entry.updated_at = Utc::now();
                    changed = true;
                }
            }
            Ok(((), changed))
        })
    }
}

impl std::fmt::Debug for SecretCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCredentialStore").finish_non_exhaustive()
    }
}

fn user_matches(entry: &CredentialEntry, user: Option<&str>) -> bool {
    user.map_or(true, |u| entry.user.as_deref() == Some(u))
}

impl CredentialStore for SecretCredentialStore {
    fn get(&self, query: &CredentialQuery) -> Result<Option<CredentialEntry>, CredstoreError> {
        let doc = self.load()?;
        let on_server = doc.entries.into_iter().filter(|e| e.server == query.server);

        match &query.scope {
            CredentialScope::SessionManager(_) => {
                let candidates: Vec<_> = on_server.filter(|e| e.scope == query.scope).collect();
                match query.user.as_deref() {
                    Some(user) => Ok(candidates
                        .into_iter()
                        .find(|e| e.user.as_deref() == Some(user))),
                    // Without a user only an unambiguous entry is usable.
                    None if candidates.len() == 1 => Ok(candidates.into_iter().next()),
                    None => Ok(None),
                }
            }
            CredentialScope::Organization(org) => {
                let candidates: Vec<_> = on_server
                    .filter(|e| matches!(e.scope, CredentialScope::Organization(_)))
                    .filter(|e| org.is_none() || e.org() == org.as_ref())
                    .filter(|e| user_matches(e, query.user.as_deref()))
                    .collect();

                if let Some(first) = candidates.first() {
                    let org_label = first.org().map(|o| o.to_string()).unwrap_or_default();
                    if candidates.len() == 1 {
                        log::info!(
                            "Getting refresh token from credentials store for organization id: {}",
                            org_label
                        );
                    } else {
                        log::info!(
                            "Getting first available refresh token in credentials store. \
                             It is for organization with id: {}",
                            org_label
                        );
                    }
                }
                Ok(candidates.into_iter().next())
            }
        }
    }

    fn add(&self, mut entry: CredentialEntry) -> Result<(), CredstoreError> {
        entry.updated_at = Utc::now();
        log::debug!(
            "storing credentials for {} (user: {})",
            entry.server,
            entry.user.as_deref().unwrap_or("-")
        );
        self.mutate(|doc| {
            doc.entries.retain(|e| !e.same_identity(&entry));
            doc.entries.push(entry);
            Ok(((), true))
        })
    }

    fn remove(
        &self,
        server: &str,
        user: Option<&str>,
        scope: Option<&CredentialScope>,
    ) -> Result<usize, CredstoreError> {
        let is_match = |e: &CredentialEntry| {
            e.server == server && user_matches(e, user) && scope.map_or(true, |s| &e.scope == s)
        };

        self.mutate(|doc| {
            let matched: Vec<&CredentialEntry> =
                doc.entries.iter().filter(|e| is_match(e)).collect();
            if matched.is_empty() {
                return Err(CredstoreError::NotFound);
            }
            if scope.is_none()
                && matched
                    .iter()
                    .filter(|e| e.session_manager_name().is_some())
                    .count()
                    > 1
            {
                return Err(CredstoreError::Ambiguous);
            }

            let before = doc.entries.len();
            doc.entries.retain(|e| !is_match(e));
            Ok((before - doc.entries.len(), true))
        })
    }

    fn remove_session_ids(
        &self,
        server: Option<&str>,
        user: Option<&str>,
        session_manager: Option<&str>,
    ) -> Result<(), CredstoreError> {
        self.strip_sessions(|e| {
            server.map_or(true, |s| e.server == s)
                && user_matches(e, user)
                && match (e.session_manager_name(), session_manager) {
                    (Some(_), None) => true,
                    (Some(sm), Some(wanted)) => sm == wanted,
                    (None, _) => false,
                }
        })
    }

    fn remove_auth_tokens(
        &self,
        server: Option<&str>,
        user: Option<&str>,
    ) -> Result<(), CredstoreError> {
        self.strip_sessions(|e| {
            server.map_or(true, |s| e.server == s)
                && user_matches(e, user)
                && matches!(e.scope, CredentialScope::Organization(_))
        })
    }

    fn list(&self, server: Option<&str>) -> Result<Vec<CredentialEntry>, CredstoreError> {
        let doc = self.load()?;
        Ok(doc
            .entries
            .into_iter()
            .filter(|e| server.map_or(true, |s| e.server == s))
            .collect())
    }
}
