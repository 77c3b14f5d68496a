//! auth::classify
//!
//! Classification of server-reported errors into retry decisions.
//!
//! # Rules
//!
//! Applied in order to the error returned by a remote call:
//!
//! 1. Unauthenticated or unauthorized, not session aware, a retry left and
//!    not a CSP token server: the credentials were wrong. Prompt again and
//!    retry.
//! 2. Unauthenticated otherwise: the session expired. On the first
//!    occurrence drop the cached session and retry; after that give up
//!    with the credentials marked invalid.
//! 3. Unauthorized in any other case: credentials invalid, no retry.
//! 4. Anything else is not an authentication problem and is passed on.

use crate::transport::{ErrorKind, ErrorValue};

/// Extra attempts allowed after a credential-shaped failure.
pub const USER_PASS_RETRY_LIMIT: u32 = 1;

/// Re-authentication attempts made during one command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts_used: u32,
    pub limit: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self {
            attempts_used: 0,
            limit: USER_PASS_RETRY_LIMIT,
        }
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_remaining(&self) -> bool {
        self.attempts_used < self.limit
    }

    fn consume(&mut self) {
        self.attempts_used += 1;
    }
}

/// Side effect required before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    None,
    /// Ask for credentials again, bypassing the credential store.
    Reprompt,
    /// Forget the cached session or access token, then authenticate again.
    DropSession,
}

/// Outcome of [`classify_server_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDecision {
    pub should_retry: bool,
    pub credentials_invalid: bool,
    pub action: RecoveryAction,
}

impl ErrorDecision {
    fn retry(action: RecoveryAction, credentials_invalid: bool) -> Self {
        Self {
            should_retry: true,
            credentials_invalid,
            action,
        }
    }

    fn fail(credentials_invalid: bool) -> Self {
        Self {
            should_retry: false,
            credentials_invalid,
            action: RecoveryAction::None,
        }
    }
}

/// Decide how to react to `error`, consuming a retry when one is granted.
pub fn classify_server_error(
    error: &ErrorValue,
    session_aware: bool,
    retry: &mut RetryState,
    csp_tokens: bool,
) -> ErrorDecision {
    let kind = error.kind();

    if error.is_credential_error() && !session_aware && retry.has_remaining() && !csp_tokens {
        retry.consume();
        return ErrorDecision::retry(RecoveryAction::Reprompt, true);
    }

    if kind == ErrorKind::Unauthenticated {
        if retry.has_remaining() {
            retry.consume();
            return ErrorDecision::retry(RecoveryAction::DropSession, false);
        }
        return ErrorDecision::fail(true);
    }

    if error.is_credential_error() {
        return ErrorDecision::fail(true);
    }

    ErrorDecision::fail(false)
}
