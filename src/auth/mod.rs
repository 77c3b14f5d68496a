//! auth - session and authentication broker
//!
//! Decides, per remote operation, whether and how to authenticate, and
//! produces the security context the call is made with.
//!
//! # Architecture
//!
//! The broker:
//! - Picks username/password or SAML bearer from the schemes an operation accepts
//! - Sources credentials from the command line, the credential store or a prompt
//! - Exchanges CSP refresh tokens for access tokens on VMC and NSX
//! - Logs in through the server's session manager when the scheme is session aware
//! - Retries at most once after a credential-shaped server error
//!
//! # Components
//!
//! - [`Connection`] - Coordinator for one server; owns all mutable auth state
//! - [`SecurityContext`] - Scheme-tagged credential handle for one call
//! - [`TokenExchanger`] - CSP token cache and SAML token exchange
//! - [`SessionManager`] - Session create/delete with legacy method fallback
//! - [`classify_server_error`] - Retry decisions for server errors
//! - [`CspClient`] / [`SsoAuthenticator`] - Seams to CSP and the SSO library
//!
//! # Security
//!
//! Secrets MUST never appear in:
//! - logs (including --debug)
//! - error messages
//! - debug output
//!
//! All types in this module holding a secret implement a custom `Debug`
//! that redacts it.
//!
//! # Example
//!
//! ```ignore
//! use vsession::auth::{Collaborators, Connection};
//!
//! let mut conn = Connection::new(server, settings, collaborators);
//! let result = conn
//!     .call_command("com.vmware.vcenter.vm", "list", None, &executor)
//!     .await?;
//! ```

pub mod classify;
pub mod connection;
pub mod context;
pub mod csp;
mod errors;
mod factory;
pub mod jwt;
pub mod mock;
pub mod session;
pub mod sso;
pub mod token_exchange;

// Re-export public types
pub use classify::{
    classify_server_error, ErrorDecision, RecoveryAction, RetryState, USER_PASS_RETRY_LIMIT,
};
pub use connection::{AuthOutcome, Collaborators, Connection, IDENTITY_PROVIDERS_SERVICE};
pub use context::SecurityContext;
pub use csp::{CspClient, CspTokens, HttpCspClient, CSP_TOKEN_PATH};
pub use errors::{
    AuthError, ExitStatus, RETRY_PROMPT_MSG, UNABLE_TO_AUTHENTICATE_MSG, UNSUPPORTED_SCHEME_MSG,
};
pub use session::SessionManager;
pub use sso::SsoAuthenticator;
pub use token_exchange::{Grant, IssuedTokens, TokenExchanger, TokenRequest};
