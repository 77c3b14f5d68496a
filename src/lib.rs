//! vsession - authentication and session broker for vAPI command-line clients
//!
//! Sits between a command invoker and a remote API transport. For each
//! remote operation it decides whether authentication is needed, which
//! scheme to use and where the credentials come from, establishes or
//! reuses a server session, and recovers from credential-shaped server
//! errors with a single bounded retry.
//!
//! # Architecture
//!
//! - [`auth`] - The broker: connection state machine, security contexts,
//!   CSP token exchange, session manager, error classification
//! - [`transport`] - Narrow traits for metadata, API invocation and command
//!   execution, plus a scripted mock
//! - [`credstore`] - Persisted credentials and session tokens
//! - [`secrets`] - Key/value secret storage backing the credentials store
//! - [`core`] - Domain types and configuration
//! - [`ui`] - Credential prompts and output helpers
//! - [`cli`] - Command-line front end
//!
//! # Invariants
//!
//! 1. At most one active session per (server, session manager, user)
//! 2. Plaintext credentials are dropped as soon as a context is handed out
//! 3. Secrets never appear in logs, error messages or `Debug` output

pub mod auth;
pub mod cli;
pub mod core;
pub mod credstore;
pub mod secrets;
pub mod transport;
pub mod ui;
