//! auth::context
//!
//! Scheme-tagged credential handles attached to remote calls.

use std::fmt;

use crate::core::types::{
    Credentials, OAUTH_SCHEME_ID, SAML_BEARER_SCHEME_ID, SESSION_SCHEME_ID, USER_PASSWORD_SCHEME_ID,
};

use super::errors::AuthError;

/// Credential handle for exactly one authentication scheme.
///
/// Values are never printed; `Debug` shows only the scheme and, for
/// username/password, the username.
#[derive(Clone, PartialEq, Eq)]
pub enum SecurityContext {
    UserPassword { username: String, password: String },
    OAuth { token: String },
    Session { session_id: String },
    SamlBearer { assertion: String },
}

impl SecurityContext {
    pub fn user_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        SecurityContext::UserPassword {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn oauth(token: impl Into<String>) -> Self {
        SecurityContext::OAuth {
            token: token.into(),
        }
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        SecurityContext::Session {
            session_id: session_id.into(),
        }
    }

    pub fn saml_bearer(assertion: impl Into<String>) -> Self {
        SecurityContext::SamlBearer {
            assertion: assertion.into(),
        }
    }

    /// Wire-level scheme id.
    pub fn scheme_id(&self) -> &'static str {
        match self {
            SecurityContext::UserPassword { .. } => USER_PASSWORD_SCHEME_ID,
            SecurityContext::OAuth { .. } => OAUTH_SCHEME_ID,
            SecurityContext::Session { .. } => SESSION_SCHEME_ID,
            SecurityContext::SamlBearer { .. } => SAML_BEARER_SCHEME_ID,
        }
    }
}

impl TryFrom<Credentials> for SecurityContext {
    type Error = AuthError;

    /// Refresh tokens must be exchanged first and are rejected here.
    fn try_from(creds: Credentials) -> Result<Self, Self::Error> {
        match creds {
            Credentials::UserPassword { username, password } => {
                Ok(SecurityContext::UserPassword { username, password })
            }
            Credentials::AccessToken { value } => Ok(SecurityContext::OAuth { token: value }),
            Credentials::SessionId { value } => Ok(SecurityContext::Session { session_id: value }),
            Credentials::SamlAssertion { value } => {
                Ok(SecurityContext::SamlBearer { assertion: value })
            }
            Credentials::RefreshToken { .. } => Err(AuthError::Internal(
                "refresh token must be exchanged before use".to_string(),
            )),
        }
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityContext::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            SecurityContext::OAuth { .. } => f.write_str("OAuth([REDACTED])"),
            SecurityContext::Session { .. } => f.write_str("Session([REDACTED])"),
            SecurityContext::SamlBearer { .. } => f.write_str("SamlBearer([REDACTED])"),
        }
    }
}
