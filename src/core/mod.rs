//! core
//!
//! Core domain types and configuration for vsession.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ServerType, ServerIdentity, OrgId, Credentials
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Per-server-type behaviour lives in one lookup table
//! - Secrets never appear in `Debug` output

pub mod config;
pub mod types;
