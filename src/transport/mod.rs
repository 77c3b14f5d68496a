//! transport
//!
//! Narrow interfaces to the remote API runtime.
//!
//! # Design
//!
//! The broker never speaks a wire protocol itself. It consumes three
//! collaborators, each a trait so the runtime can be swapped for
//! [`mock::MockTransport`] in tests:
//!
//! - [`MetadataProvider`] - authentication schemes and input shapes per operation
//! - [`ApiProvider`] - invoke an arbitrary `(service, operation)` pair
//! - [`CommandExecutor`] - run the user's command under a prepared [`CallContext`]
//!
//! Values crossing the seam are plain JSON ([`DataValue`]); server-side
//! failures come back inside [`MethodResult`] as an [`ErrorValue`], while
//! failures to reach the server at all are a [`TransportError`].

pub mod mock;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::context::SecurityContext;

/// Structured value passed to and returned from remote operations.
pub type DataValue = serde_json::Value;

/// Error name the server uses for missing or expired credentials.
pub const UNAUTHENTICATED_ERROR: &str = "com.vmware.vapi.std.errors.unauthenticated";

/// Error name the server uses for insufficient privileges.
pub const UNAUTHORIZED_ERROR: &str = "com.vmware.vapi.std.errors.unauthorized";

/// Classification of a server-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Unauthorized,
    Other,
}

/// A server-reported error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorValue {
    pub name: String,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: vec![message.into()],
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(UNAUTHENTICATED_ERROR, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(UNAUTHORIZED_ERROR, message)
    }

    pub fn kind(&self) -> ErrorKind {
        match self.name.as_str() {
            UNAUTHENTICATED_ERROR => ErrorKind::Unauthenticated,
            UNAUTHORIZED_ERROR => ErrorKind::Unauthorized,
            _ => ErrorKind::Other,
        }
    }

    /// Unauthenticated or unauthorized.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Unauthenticated | ErrorKind::Unauthorized
        )
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.name.rsplit('.').next().unwrap_or(&self.name);
        if self.messages.is_empty() {
            write!(f, "{}", short)
        } else {
            write!(f, "{}: {}", short, self.messages.join(" "))
        }
    }
}

/// Outcome of a remote call that reached the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodResult {
    pub output: Option<DataValue>,
    pub error: Option<ErrorValue>,
}

impl MethodResult {
    pub fn success(output: DataValue) -> Self {
        Self {
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(error: ErrorValue) -> Self {
        Self {
            output: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Input shape of an operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputDefinition {
    pub fields: Vec<String>,
}

impl InputDefinition {
    /// Structure with every field left unset.
    pub fn new_value(&self) -> DataValue {
        DataValue::Object(
            self.fields
                .iter()
                .map(|f| (f.clone(), DataValue::Null))
                .collect(),
        )
    }
}

/// Accepted authentication schemes of an operation, each mapped to the
/// session manager that backs it (if any).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthSchemes(BTreeMap<String, Option<String>>);

impl AuthSchemes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scheme: impl Into<String>, session_manager: Option<&str>) -> Self {
        self.0
            .insert(scheme.into(), session_manager.map(str::to_string));
        self
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.0.contains_key(scheme)
    }

    /// Session manager bound to `scheme`; empty names count as none.
    pub fn session_manager(&self, scheme: &str) -> Option<&str> {
        self.0
            .get(scheme)
            .and_then(|sm| sm.as_deref())
            .filter(|sm| !sm.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Per-call context attached to every remote invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    pub operation_id: String,
    pub show_unreleased_apis: bool,
    pub security_context: Option<SecurityContext>,
}

/// Errors from metadata lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("no metadata found for {0}")]
    NotFound(String),

    #[error("operation {service}/{operation} not found")]
    OperationNotFound { service: String, operation: String },

    #[error("metadata unavailable: {0}")]
    Unavailable(String),
}

impl MetadataError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MetadataError::NotFound(_) | MetadataError::OperationNotFound { .. }
        )
    }
}

/// Failures to reach or talk to the server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Source of per-operation metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Schemes accepted by `(service, operation)`.
    async fn authentication_schemes(
        &self,
        service: &str,
        operation: &str,
    ) -> Result<AuthSchemes, MetadataError>;

    /// Input definition for `(service, operation)`.
    async fn command_input_definition(
        &self,
        service: &str,
        operation: &str,
    ) -> Result<InputDefinition, MetadataError>;
}

/// Invokes arbitrary remote operations.
#[async_trait]
pub trait ApiProvider: Send + Sync {
    async fn invoke(
        &self,
        service: &str,
        operation: &str,
        input: DataValue,
        ctx: &CallContext,
    ) -> Result<MethodResult, TransportError>;
}

/// Runs the command being authenticated.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, ctx: &CallContext) -> Result<MethodResult, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_from_name() {
        assert_eq!(
            ErrorValue::unauthenticated("x").kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(ErrorValue::unauthorized("x").kind(), ErrorKind::Unauthorized);
        assert_eq!(
            ErrorValue::new("com.vmware.vapi.std.errors.not_found", "x").kind(),
            ErrorKind::Other
        );
        assert!(ErrorValue::unauthorized("x").is_credential_error());
    }

    #[test]
    fn error_display_uses_short_name() {
        let e = ErrorValue::unauthenticated("session expired");
        assert_eq!(e.to_string(), "unauthenticated: session expired");
    }

    #[test]
    fn empty_session_manager_is_none() {
        let schemes = AuthSchemes::new()
            .with("a", Some(""))
            .with("b", Some("sm"))
            .with("c", None);
        assert!(schemes.session_manager("a").is_none());
        assert_eq!(schemes.session_manager("b"), Some("sm"));
        assert!(schemes.session_manager("c").is_none());
        assert!(schemes.contains("c"));
    }

    #[test]
    fn input_definition_defaults_to_nulls() {
        let def = InputDefinition {
            fields: vec!["spec".into()],
        };
        assert_eq!(def.new_value(), serde_json::json!({"spec": null}));
    }
}
