//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Read configuration from this file
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output; never prompt

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::types::ServerType;

/// vsession - authentication and session broker for vAPI clients
#[derive(Parser, Debug)]
#[command(name = "vsession")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of the default locations
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output; disables credential prompts
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Obtain a CSP access token for VMC or NSX
    #[command(
        name = "token",
        long_about = "Obtain a CSP access token for VMC or NSX.\n\n\
            Exchanges a refresh token for an access token. The refresh token is \
            taken from the credentials store when one is stored for the server and \
            organization, otherwise it is prompted for. Only the user and \
            organization the token was issued for are printed, never the token.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Check that the stored VMC refresh token still works
    vsession token --server-type vmc

    # Prompt for a refresh token and remember it
    vsession token --server-type vmc --save

    # NSX: the organization comes from the URL when not passed
    vsession token --server-type nsx --server https://nsx.example.com/orgs/<GUID>/sddcs/<GUID>"
    )]
    Token {
        /// Kind of CSP token server
        #[arg(long, value_enum)]
        server_type: TokenServer,

        /// Server address (defaults to the configured VMC server)
        #[arg(long)]
        server: Option<String>,

        /// Organization id (GUID)
        #[arg(long)]
        org: Option<String>,

        /// Store the refresh token and access token after a successful exchange
        #[arg(long)]
        save: bool,
    },

    /// Inspect and edit the credentials store
    #[command(name = "credstore")]
    Credstore {
        #[command(subcommand)]
        action: CredstoreAction,
    },
}

/// Credentials store actions.
#[derive(Subcommand, Debug)]
pub enum CredstoreAction {
    /// List stored entries (secrets are never shown)
    List {
        /// Only list entries for this server URL
        #[arg(long)]
        server: Option<String>,
    },

    /// Remove stored entries for a server
    Remove {
        /// Server URL the entry is stored under
        #[arg(long)]
        server: String,

        /// Only remove the entry for this user
        #[arg(long)]
        user: Option<String>,

        /// Session manager the entry belongs to
        #[arg(long)]
        session_manager: Option<String>,
    },

    /// Drop stored session ids and access tokens, keeping credentials
    ClearSessions {
        /// Only clear sessions for this server URL
        #[arg(long)]
        server: Option<String>,
    },
}

/// Server types that authenticate with CSP tokens.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenServer {
    Vmc,
    Nsx,
}

impl From<TokenServer> for ServerType {
    fn from(value: TokenServer) -> Self {
        match value {
            TokenServer::Vmc => ServerType::Vmc,
            TokenServer::Nsx => ServerType::Nsx,
        }
    }
}
