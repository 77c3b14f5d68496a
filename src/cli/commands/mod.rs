//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Calls into the auth layer or the credentials store
//! 3. Formats and displays output
//!
//! # Async Commands
//!
//! `token` talks to CSP and is async. Its handler owns a tokio runtime and
//! blocks on it, so dispatch stays synchronous.

mod credstore;
mod token;

pub use credstore::{clear_sessions, list, remove};
pub use token::token;

use crate::cli::args::{Command, CredstoreAction};
use crate::cli::Context;
use anyhow::Result;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Token {
            server_type,
            server,
            org,
            save,
        } => token::token(
            ctx,
            server_type.into(),
            server.as_deref(),
            org.as_deref(),
            save,
        ),
        Command::Credstore { action } => match action {
            CredstoreAction::List { server } => credstore::list(ctx, server.as_deref()),
            CredstoreAction::Remove {
                server,
                user,
                session_manager,
            } => credstore::remove(ctx, &server, user.as_deref(), session_manager.as_deref()),
            CredstoreAction::ClearSessions { server } => {
                credstore::clear_sessions(ctx, server.as_deref())
            }
        },
    }
}
