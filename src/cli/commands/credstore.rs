//! cli::commands::credstore
//!
//! Credentials store maintenance: list, remove and clear-sessions.
//!
//! Listing shows which kind of secret and session an entry holds, never
//! the values.

use anyhow::Result;

use crate::auth::AuthError;
use crate::cli::Context;
use crate::core::types::{Secret, SessionToken};
use crate::credstore::{CredentialEntry, CredentialScope, CredentialStore};
use crate::ui::output;

/// List stored entries, optionally for one server.
pub fn list(ctx: &Context, server: Option<&str>) -> Result<()> {
    let store = ctx.credstore()?;
    let server = server.map(normalize);
    let entries = store.list(server.as_deref()).map_err(AuthError::from)?;

    if entries.is_empty() {
        output::print("No credentials stored.", ctx.verbosity);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = entries.iter().map(row).collect();
    println!(
        "{}",
        output::format_table(&["SERVER", "USER", "SCOPE", "SECRET", "SESSION"], &rows)
    );
    Ok(())
}

/// Remove entries for `server`.
pub fn remove(
    ctx: &Context,
    server: &str,
    user: Option<&str>,
    session_manager: Option<&str>,
) -> Result<()> {
    let store = ctx.credstore()?;
    let scope = session_manager.map(|sm| CredentialScope::SessionManager(sm.to_string()));
    let removed = store
        .remove(&normalize(server), user, scope.as_ref())
        .map_err(AuthError::from)?;

    output::print(
        format!(
            "Removed {} credstore {}.",
            removed,
            if removed == 1 { "entry" } else { "entries" }
        ),
        ctx.verbosity,
    );
    Ok(())
}

/// Drop stored session ids and access tokens.
///
/// Server sessions are not logged out here; that needs a live connection
/// to the server, see [`crate::auth::Connection::clear_credentials_store_sessions`].
pub fn clear_sessions(ctx: &Context, server: Option<&str>) -> Result<()> {
    let store = ctx.credstore()?;
    let server = server.map(normalize);
    store
        .remove_session_ids(server.as_deref(), None, None)
        .map_err(AuthError::from)?;
    store
        .remove_auth_tokens(server.as_deref(), None)
        .map_err(AuthError::from)?;

    output::print("Cleared stored sessions.", ctx.verbosity);
    Ok(())
}

/// Server URLs are stored without a trailing slash.
fn normalize(server: &str) -> String {
    server.trim().trim_end_matches('/').to_string()
}

fn row(entry: &CredentialEntry) -> Vec<String> {
    let scope = match &entry.scope {
        CredentialScope::SessionManager(sm) => sm.clone(),
        CredentialScope::Organization(Some(org)) => format!("org {}", org),
        CredentialScope::Organization(None) => "org -".to_string(),
    };
    let secret = match &entry.secret {
        Some(Secret::Password(_)) => "password",
        Some(Secret::RefreshToken(_)) => "refresh token",
        None => "-",
    };
    let session = match &entry.session {
        Some(SessionToken::SessionId(_)) => "session id",
        Some(SessionToken::AccessToken(_)) => "access token",
        None => "-",
    };
    vec![
        entry.server.clone(),
        entry.user.clone().unwrap_or_else(|| "-".to_string()),
        scope,
        secret.to_string(),
        session.to_string(),
    ]
}
