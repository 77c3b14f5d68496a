//! transport::mock
//!
//! Scripted transport for deterministic testing.
//!
//! # Design
//!
//! `MockTransport` implements [`MetadataProvider`], [`ApiProvider`] and
//! [`CommandExecutor`] from in-memory tables. Results are queued per
//! `(service, operation)`; the last queued result keeps being returned
//! once the queue is down to one, so "the server always says X" needs a
//! single entry. Every call is recorded for later verification.
//!
//! # Example
//!
//! ```
//! use vsession::transport::mock::MockTransport;
//! use vsession::transport::{AuthSchemes, MetadataProvider};
//!
//! # tokio_test::block_on(async {
//! let transport = MockTransport::new()
//!     .with_schemes("com.vmware.vcenter.vm", "list", AuthSchemes::new().with("scheme", None));
//!
//! let schemes = transport.authentication_schemes("com.vmware.vcenter.vm", "list").await.unwrap();
//! assert!(schemes.contains("scheme"));
//! # });
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::{
    ApiProvider, AuthSchemes, CallContext, CommandExecutor, DataValue, InputDefinition,
    MetadataError, MetadataProvider, MethodResult, TransportError,
};

type Key = (String, String);

fn key(service: &str, operation: &str) -> Key {
    (service.to_string(), operation.to_string())
}

/// Mock transport for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    schemes: HashMap<Key, AuthSchemes>,
    inputs: HashMap<Key, InputDefinition>,
    results: HashMap<Key, VecDeque<MethodResult>>,
    executions: VecDeque<MethodResult>,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail every scheme lookup with the given error.
    Schemes(MetadataError),
    /// Fail invoke of the given service with the given error.
    Invoke(String, TransportError),
    /// Fail command execution with the given error.
    Execute(TransportError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOperation {
    Schemes {
        service: String,
        operation: String,
    },
    InputDefinition {
        service: String,
        operation: String,
    },
    Invoke {
        service: String,
        operation: String,
        input: DataValue,
        scheme: Option<&'static str>,
        operation_id: String,
    },
    Execute {
        scheme: Option<&'static str>,
        operation_id: String,
    },
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the schemes accepted by `(service, operation)`.
    pub fn with_schemes(self, service: &str, operation: &str, schemes: AuthSchemes) -> Self {
        self.inner
            .lock()
            .unwrap()
            .schemes
            .insert(key(service, operation), schemes);
        self
    }

    /// Declare that `(service, operation)` exists, with the given input fields.
    pub fn with_operation(self, service: &str, operation: &str, fields: &[&str]) -> Self {
        self.inner.lock().unwrap().inputs.insert(
            key(service, operation),
            InputDefinition {
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
        );
        self
    }

    /// Queue a result for invocations of `(service, operation)`.
    ///
    /// Also declares the operation if it was not declared yet.
    pub fn respond(self, service: &str, operation: &str, result: MethodResult) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .inputs
                .entry(key(service, operation))
                .or_default();
            inner
                .results
                .entry(key(service, operation))
                .or_default()
                .push_back(result);
        }
        self
    }

    /// Queue a result for command execution.
    pub fn respond_execute(self, result: MethodResult) -> Self {
        self.inner.lock().unwrap().executions.push_back(result);
        self
    }

    /// Configure the mock to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.inner.lock().unwrap().fail_on = Some(fail_on);
        self
    }

    pub fn clear_fail_on(&self) {
        self.inner.lock().unwrap().fail_on = None;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// Number of invocations of `(service, operation)` so far.
    pub fn invocations(&self, service: &str, operation: &str) -> usize {
        self.operations()
            .iter()
            .filter(|op| {
                matches!(op, MockOperation::Invoke { service: s, operation: o, .. }
                    if s == service && o == operation)
            })
            .count()
    }

    /// Number of command executions so far.
    pub fn executions(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, MockOperation::Execute { .. }))
            .count()
    }

    fn record(&self, op: MockOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }
}

fn next_result(queue: Option<&mut VecDeque<MethodResult>>) -> MethodResult {
    match queue {
        Some(q) if q.len() > 1 => q.pop_front().unwrap_or_default(),
        Some(q) => q.front().cloned().unwrap_or_default(),
        None => MethodResult::success(DataValue::Null),
    }
}

fn scheme_of(ctx: &CallContext) -> Option<&'static str> {
    ctx.security_context.as_ref().map(|c| c.scheme_id())
}

#[async_trait]
impl MetadataProvider for MockTransport {
    async fn authentication_schemes(
        &self,
        service: &str,
        operation: &str,
    ) -> Result<AuthSchemes, MetadataError> {
        self.record(MockOperation::Schemes {
            service: service.to_string(),
            operation: operation.to_string(),
        });

        let inner = self.inner.lock().unwrap();
        if let Some(FailOn::Schemes(e)) = &inner.fail_on {
            return Err(e.clone());
        }
        inner
            .schemes
            .get(&key(service, operation))
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("{}/{}", service, operation)))
    }

    async fn command_input_definition(
        &self,
        service: &str,
        operation: &str,
    ) -> Result<InputDefinition, MetadataError> {
        self.record(MockOperation::InputDefinition {
            service: service.to_string(),
            operation: operation.to_string(),
        });

        self.inner
            .lock()
            .unwrap()
            .inputs
            .get(&key(service, operation))
            .cloned()
            .ok_or_else(|| MetadataError::OperationNotFound {
                service: service.to_string(),
                operation: operation.to_string(),
            })
    }
}

#[async_trait]
impl ApiProvider for MockTransport {
    async fn invoke(
        &self,
        service: &str,
        operation: &str,
        input: DataValue,
        ctx: &CallContext,
    ) -> Result<MethodResult, TransportError> {
        self.record(MockOperation::Invoke {
            service: service.to_string(),
            operation: operation.to_string(),
            input,
            scheme: scheme_of(ctx),
            operation_id: ctx.operation_id.clone(),
        });

        let mut inner = self.inner.lock().unwrap();
        if let Some(FailOn::Invoke(s, e)) = &inner.fail_on {
            if s == service {
                return Err(e.clone());
            }
        }
        if !inner.inputs.contains_key(&key(service, operation)) {
            return Err(TransportError::Protocol(format!(
                "unknown operation {}/{}",
                service, operation
            )));
        }
        Ok(next_result(inner.results.get_mut(&key(service, operation))))
    }
}

#[async_trait]
impl CommandExecutor for MockTransport {
    async fn execute(&self, ctx: &CallContext) -> Result<MethodResult, TransportError> {
        self.record(MockOperation::Execute {
            scheme: scheme_of(ctx),
            operation_id: ctx.operation_id.clone(),
        });

        let mut inner = self.inner.lock().unwrap();
        if let Some(FailOn::Execute(e)) = &inner.fail_on {
            return Err(e.clone());
        }
        Ok(next_result(Some(&mut inner.executions)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ErrorValue;

    fn ctx() -> CallContext {
        CallContext {
            operation_id: "op-1".into(),
            show_unreleased_apis: false,
            security_context: None,
        }
    }

    #[tokio::test]
    async fn last_result_repeats() {
        let t = MockTransport::new()
            .respond("svc", "op", MethodResult::success(DataValue::from(1)))
            .respond("svc", "op", MethodResult::failure(ErrorValue::unauthenticated("x")));

        let first = t.invoke("svc", "op", DataValue::Null, &ctx()).await.unwrap();
        let second = t.invoke("svc", "op", DataValue::Null, &ctx()).await.unwrap();
        let third = t.invoke("svc", "op", DataValue::Null, &ctx()).await.unwrap();

        assert!(first.is_success());
        assert!(!second.is_success());
        assert_eq!(second, third);
        assert_eq!(t.invocations("svc", "op"), 3);
    }

    #[tokio::test]
    async fn unknown_operation_not_found() {
        let t = MockTransport::new();
        let err = t.command_input_definition("sm", "create").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(t.invoke("sm", "create", DataValue::Null, &ctx()).await.is_err());
    }

    #[tokio::test]
    async fn execute_defaults_to_success() {
        let t = MockTransport::new();
        assert!(t.execute(&ctx()).await.unwrap().is_success());
        assert_eq!(t.executions(), 1);
        assert_eq!(
            t.operations(),
            vec![MockOperation::Execute {
                scheme: None,
                operation_id: "op-1".into()
            }]
        );
    }

    #[tokio::test]
    async fn fail_on_execute() {
        let t = MockTransport::new().fail_on(FailOn::Execute(TransportError::Network(
            "connection refused".into(),
        )));
        assert!(matches!(
            t.execute(&ctx()).await,
            Err(TransportError::Network(_))
        ));

        t.clear_fail_on();
        assert!(t.execute(&ctx()).await.is_ok());
    }
}
