//! cli
//!
//! Command-line interface layer for vsession.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and open the credentials store
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Authentication logic lives in [`crate::auth`];
//! handlers only wire configuration, the credentials store and the prompter
//! together and format the outcome.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, CredstoreAction, TokenServer};

use anyhow::{Context as _, Result};
use std::path::PathBuf;

use crate::auth::AuthError;
use crate::core::config::{AuthSettings, Config};
use crate::credstore::SecretCredentialStore;
use crate::secrets;
use crate::ui::output::Verbosity;

/// Per-invocation state shared by command handlers.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub settings: AuthSettings,
    pub verbosity: Verbosity,
}

impl Context {
    /// Build the context from global flags.
    pub fn new(config_path: Option<PathBuf>, quiet: bool, debug: bool) -> Result<Self> {
        let config = Config::load(config_path.as_deref())
            .map_err(AuthError::from)
            .context("Failed to load configuration")?;
        let mut settings = config.auth_settings();
        if quiet {
            settings.allow_prompts = false;
        }
        Ok(Self {
            config,
            settings,
            verbosity: Verbosity::from_flags(quiet, debug),
        })
    }

    /// Open the configured credentials store.
    pub fn credstore(&self) -> Result<SecretCredentialStore> {
        let provider = self.config.credstore_provider();
        let path = match provider {
            "file" => Some(self.config.credstore_path().map_err(AuthError::from)?),
            _ => None,
        };
        let secrets = secrets::create_store(provider, path)
            .map_err(AuthError::from)
            .context("Failed to initialize credentials store")?;
        Ok(SecretCredentialStore::new(secrets))
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context::new(cli.config.clone(), cli.quiet, cli.debug)?;
    commands::dispatch(cli.command, &ctx)
}
