//! cli::commands::token
//!
//! Exchange a CSP refresh token and report whom the token belongs to.
//!
//! # Security
//!
//! Neither the refresh token nor the access token is ever printed. Only
//! the user name and organization decoded from the access token are.

use anyhow::{Context as _, Result};

use crate::auth::jwt::decode_token;
use crate::auth::{AuthError, HttpCspClient, TokenExchanger, TokenRequest};
use crate::cli::Context;
use crate::core::types::{OrgId, ServerIdentity, ServerType};
use crate::ui::output;
use crate::ui::prompts::TerminalPrompter;

/// Run the token command.
///
/// # Arguments
///
/// * `ctx` - CLI context with settings and verbosity
/// * `server_type` - VMC or NSX
/// * `server` - Server address; the configured VMC server when absent
/// * `org` - Organization id; for NSX taken from the URL when absent
/// * `save` - Store a prompted refresh token with its access token
pub fn token(
    ctx: &Context,
    server_type: ServerType,
    server: Option<&str>,
    org: Option<&str>,
    save: bool,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(token_async(ctx, server_type, server, org, save))
}

async fn token_async(
    ctx: &Context,
    server_type: ServerType,
    server: Option<&str>,
    org: Option<&str>,
    save: bool,
) -> Result<()> {
    let org = org
        .map(OrgId::new)
        .transpose()
        .map_err(AuthError::from)?;
    let identity = ServerIdentity::new(
        Some(server.unwrap_or(ctx.settings.vmc_server.as_str())),
        server_type,
    )
    .map_err(AuthError::from)?;
    let lookup_org = identity.lookup_org(org.as_ref()).map_err(AuthError::from)?;

    let store = ctx.credstore()?;
    let client = HttpCspClient::new(&ctx.settings)?;
    let mut exchanger = TokenExchanger::new(Box::new(client));
    let mut prompter = TerminalPrompter::new(ctx.settings.allow_prompts);

    let request = TokenRequest {
        lookup_org,
        credstore_add: save,
        ..TokenRequest::new(server_type, ctx.settings.vmc_server.clone(), org)
    };
    log::debug!("Requesting CSP token for {}", identity);

    let issued = exchanger
        .get_token(&request, false, &store, &mut prompter)
        .await
        .context("Failed to obtain a CSP access token")?;
    let claims = decode_token(&issued.tokens.access_token)?;

    let user = claims.username.as_deref().unwrap_or("<unknown user>");
    match claims.context_name.as_deref() {
        Some(org) => output::print(
            format!("Authenticated as {} in organization {}.", user, org),
            ctx.verbosity,
        ),
        None => output::print(format!("Authenticated as {}.", user), ctx.verbosity),
    }
    Ok(())
}
