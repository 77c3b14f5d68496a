//! auth::errors
//!
//! Authentication error types.
//!
//! # Design
//!
//! Error messages MUST NOT contain passwords, refresh tokens, access
//! tokens, session ids or SAML assertions. Variants carry server URLs,
//! user names and server error text only.
//!
//! Every error maps onto one CLI [`ExitStatus`] so the binary can report
//! a stable status code per failure kind.
//!
//! # Example
//!
//! ```
//! use vsession::auth::{AuthError, ExitStatus};
//!
//! let err = AuthError::NotAuthenticated("Unable to authenticate user.".to_string());
//! assert!(err.is_not_authenticated());
//! assert_eq!(err.exit_status(), ExitStatus::NotAuthenticated);
//! ```

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::types::TypeError;
use crate::credstore::CredstoreError;
use crate::transport::{ErrorValue, MetadataError, TransportError};
use crate::ui::prompts::PromptError;

/// Message for a scheme set with neither username/password nor SAML.
pub const UNSUPPORTED_SCHEME_MSG: &str =
    "This command does not support login through username/password";

/// Message for a rejected login once retries are used up.
pub const UNABLE_TO_AUTHENTICATE_MSG: &str = "Unable to authenticate user.";

/// Logged before credentials are asked for again.
pub const RETRY_PROMPT_MSG: &str =
    "Unable to authenticate user. Please enter the credentials again.";

/// Process exit status reported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    InvalidCommand = 1,
    InvalidArgument = 2,
    InvalidEnv = 3,
    NotAuthenticated = 4,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Errors from authentication operations.
///
/// # Security
///
/// Error messages intentionally do not include secret values.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Terminal authentication failure for the current invocation.
    #[error("{0}")]
    NotAuthenticated(String),

    /// The server rejected the login and retries are exhausted.
    #[error("Unable to authenticate user. {0}")]
    LoginRejected(ErrorValue),

    /// CSP answered the refresh token exchange with HTTP 400.
    #[error(
        "Invalid refresh token. CSP login address: {csp_url}. \
         Are you sure you have provided correct refresh token?"
    )]
    InvalidCspToken { csp_url: String },

    /// Any other failure of the refresh token exchange.
    #[error(
        "Unable to obtain VMC authentication token. Using CSP login address: {csp_url} \
         (override using VSESSION_CSP_URL env var). Error: {message}"
    )]
    CspExchange { csp_url: String, message: String },

    /// Refresh token was empty.
    #[error(
        "No refresh token provided. Provide a valid refresh token for \
         authentication to VMC when prompted"
    )]
    MissingRefreshToken,

    /// A CSP token could not be decoded.
    #[error("unable to decode token: {0}")]
    TokenDecode(String),

    /// The token exchange service did not return a usable SAML token.
    #[error("{0}")]
    SamlExchange(String),

    #[error(transparent)]
    InvalidServer(#[from] TypeError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("credentials store error: {0}")]
    Credstore(#[from] CredstoreError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Network error talking to CSP or STS.
    #[error("network error: {0}")]
    Network(String),

    /// Internal error (should not happen).
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this is the NotAuthenticated kind.
    pub fn is_not_authenticated(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated(_)
                | AuthError::LoginRejected(_)
                | AuthError::InvalidCspToken { .. }
                | AuthError::MissingRefreshToken
                | AuthError::Prompt(PromptError::Cancelled)
        )
    }

    /// CLI status code for this error.
    pub fn exit_status(&self) -> ExitStatus {
        if self.is_not_authenticated() {
            return ExitStatus::NotAuthenticated;
        }
        match self {
            AuthError::InvalidServer(_) => ExitStatus::InvalidArgument,
            AuthError::Metadata(e) if e.is_not_found() => ExitStatus::InvalidCommand,
            AuthError::Credstore(CredstoreError::NotFound | CredstoreError::Ambiguous) => {
                ExitStatus::InvalidCommand
            }
            AuthError::TokenDecode(_) | AuthError::SamlExchange(_) => ExitStatus::NotAuthenticated,
            _ => ExitStatus::InvalidEnv,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the URL but never the form body.
        AuthError::Network(err.without_url().to_string())
    }
}

impl From<crate::secrets::SecretError> for AuthError {
    fn from(err: crate::secrets::SecretError) -> Self {
        AuthError::Credstore(CredstoreError::Storage(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_rejected_formatting() {
        let err = AuthError::LoginRejected(ErrorValue::unauthenticated("bad password"));
        assert_eq!(
            err.to_string(),
            "Unable to authenticate user. unauthenticated: bad password"
        );
        assert!(err.is_not_authenticated());
    }

    #[test]
    fn csp_errors_name_the_csp_url() {
        let err = AuthError::CspExchange {
            csp_url: "https://csp.example.com".into(),
            message: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("https://csp.example.com"));
        assert!(msg.contains("connection refused"));

        let err = AuthError::InvalidCspToken {
            csp_url: "https://csp.example.com".into(),
        };
        assert!(err.to_string().contains("https://csp.example.com"));
        assert!(err.is_not_authenticated());
    }

    #[test]
    fn exit_status_mapping() {
        assert_eq!(
            AuthError::NotAuthenticated("x".into()).exit_status(),
            ExitStatus::NotAuthenticated
        );
        assert_eq!(
            AuthError::InvalidServer(TypeError::InvalidServerUrl("https://".into())).exit_status(),
            ExitStatus::InvalidArgument
        );
        assert_eq!(
            AuthError::Credstore(CredstoreError::Ambiguous).exit_status(),
            ExitStatus::InvalidCommand
        );
        assert_eq!(
            AuthError::Metadata(MetadataError::NotFound("svc/op".into())).exit_status(),
            ExitStatus::InvalidCommand
        );
        assert_eq!(
            AuthError::Network("down".into()).exit_status(),
            ExitStatus::InvalidEnv
        );
        assert_eq!(
            AuthError::Prompt(PromptError::NotInteractive).exit_status(),
            ExitStatus::InvalidEnv
        );
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::NotAuthenticated.code(), 4);
    }
}
