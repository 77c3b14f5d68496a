//! auth::factory
//!
//! Security context construction for [`Connection`].
//!
//! # Credential sourcing
//!
//! Credentials come from, in order: the command line, the credential
//! store, an interactive prompt. After a rejected attempt the store is
//! skipped once so the same stale credentials are not tried again.
//!
//! # Schemes
//!
//! - username/password: a literal [`SecurityContext::UserPassword`], except
//!   on CSP token servers where it is an OAuth context with a CSP access
//!   token
//! - SAML bearer: a configured bearer token, else an assertion from the
//!   SSO library (STS with credentials, or passthrough)
//! - GovCloud vSphere: a SAML assertion exchanged for a CSP token pair

use crate::core::types::{
    OrgId, Secret, SessionToken, SAML_BEARER_SCHEME_ID, USER_PASSWORD_SCHEME_ID,
};
use crate::credstore::CredentialQuery;
use crate::ui::prompts::CredentialRequest;

use super::connection::Connection;
use super::context::SecurityContext;
use super::csp::CspTokens;
use super::errors::{AuthError, UNABLE_TO_AUTHENTICATE_MSG, UNSUPPORTED_SCHEME_MSG};
use super::token_exchange::TokenRequest;

impl Connection {
    /// Build the security context for `scheme`.
    pub(super) async fn security_context(
        &mut self,
        scheme: &str,
        org: Option<&OrgId>,
    ) -> Result<SecurityContext, AuthError> {
        if self.secret.is_none() {
            if self.skip_credstore_lookup {
                self.skip_credstore_lookup = false;
            } else {
                self.load_stored_credentials()?;
            }
        }

        if self.is_gov_cloud == Some(true) {
            return self.gov_cloud_context(org).await;
        }

        match scheme {
            USER_PASSWORD_SCHEME_ID if self.uses_csp_tokens() => self.csp_oauth_context(org).await,
            USER_PASSWORD_SCHEME_ID => self.user_password_context(org),
            SAML_BEARER_SCHEME_ID => self.saml_context(org).await,
            _ => Err(AuthError::NotAuthenticated(
                UNSUPPORTED_SCHEME_MSG.to_string(),
            )),
        }
    }

    fn user_password_context(&mut self, org: Option<&OrgId>) -> Result<SecurityContext, AuthError> {
        let mut prompted = false;
        loop {
            let known = match (&self.username, &self.secret) {
                (Some(user), Some(secret)) if !user.is_empty() => Some(
                    SecurityContext::user_password(user.clone(), secret.expose()),
                ),
                _ => None,
            };
            if let Some(context) = known {
                return Ok(context);
            }
            if prompted {
                return Err(AuthError::NotAuthenticated(
                    UNABLE_TO_AUTHENTICATE_MSG.to_string(),
                ));
            }
            self.prompt_credentials(org)?;
            prompted = true;
        }
    }

    /// Username/password on CSP servers: an OAuth context with a CSP
    /// access token.
    async fn csp_oauth_context(&mut self, org: Option<&OrgId>) -> Result<SecurityContext, AuthError> {
        let mut token = None;
        let mut refresh_to_store = None;

        if !self.shell_mode {
            let storage = self.storage_server();
            let lookup = self.lookup_org(org)?;
            let query = CredentialQuery::organization(storage, lookup.as_ref(), None);
            if let Some(entry) = self.credstore.get(&query)? {
                self.username = entry.user.clone();
                match entry.session {
                    Some(SessionToken::AccessToken(t)) => token = Some(t),
                    _ => refresh_to_store = entry.secret,
                }
            }
        }

        let token = match token {
            Some(token) => token,
            None => self.csp_tokens(org, false).await?.access_token,
        };

        if let Some(refresh) = refresh_to_store {
            self.add_entry_to_credstore(
                None,
                Some(refresh),
                Some(SessionToken::AccessToken(token.clone())),
                org,
            )
            .await?;
        }

        Ok(SecurityContext::oauth(token))
    }

    async fn gov_cloud_context(&mut self, org: Option<&OrgId>) -> Result<SecurityContext, AuthError> {
        if let Some(token) = &self.session {
            return Ok(Connection::session_context(token));
        }

        let tokens = self.csp_tokens(org, false).await?;
        let base = self.call_context(None);
        let assertion = self
            .tokens
            .exchange_for_saml(self.api.as_ref(), &tokens, &base)
            .await?;
        Ok(SecurityContext::saml_bearer(assertion))
    }

    async fn saml_context(&mut self, org: Option<&OrgId>) -> Result<SecurityContext, AuthError> {
        if let Some(token) = &self.settings.sso_bearer_token {
            return Ok(SecurityContext::saml_bearer(token.clone()));
        }

        self.saml_from_sso(org)
            .await
            .map(SecurityContext::saml_bearer)
            .map_err(|e| {
                AuthError::NotAuthenticated(format!(
                    "Unable to get SAML token for the user. {}",
                    e
                ))
            })
    }

    async fn saml_from_sso(&mut self, org: Option<&OrgId>) -> Result<String, AuthError> {
        match self.settings.sts_url.clone() {
            Some(sts_url) => {
                log::info!("Getting SAML bearer token");
                if self.username.is_none() || self.secret.is_none() {
                    self.prompt_credentials(org)?;
                }
                let sso = self.sso.as_deref().ok_or_else(no_sso)?;
                let user = self.username.clone().unwrap_or_default();
                let password = self
                    .secret
                    .as_ref()
                    .map(|s| s.expose().to_string())
                    .unwrap_or_default();
                sso.bearer_assertion(&sts_url, &user, &password).await
            }
            None => {
                log::info!("Using passthrough authentication");
                let sso = self.sso.as_deref().ok_or_else(no_sso)?;
                sso.passthrough_assertion().await
            }
        }
    }

    /// Fill the scratch credentials from the credential store.
    fn load_stored_credentials(&mut self) -> Result<(), AuthError> {
        if self.is_gov_cloud == Some(true) {
            log::info!("Trying to read credstore for login GovCloud credentials");
            let query = CredentialQuery::organization(self.server.url(), None, None);
            let entry = self.credstore.get(&query)?;
            self.username = entry.as_ref().and_then(|e| e.user.clone());
            self.secret = entry
                .as_ref()
                .and_then(|e| e.secret.clone())
                .filter(Secret::is_refresh_token);
            self.session = entry.and_then(|e| e.session);
            return Ok(());
        }

        if self.uses_csp_tokens() {
            return Ok(());
        }

        log::info!("Trying to read credstore for login credentials");
        let query = CredentialQuery::session_manager(
            self.server.url(),
            self.session_manager.clone().unwrap_or_default(),
            self.username.as_deref(),
        );
        if let Some(entry) = self.credstore.get(&query)? {
            if entry.user.is_some() {
                self.username = entry.user;
            }
            self.secret = entry.secret;
        }
        Ok(())
    }

    /// Ask the user for credentials, dropping whatever tokens and session
    /// the old ones produced.
    pub(super) fn prompt_credentials(&mut self, org: Option<&OrgId>) -> Result<(), AuthError> {
        self.tokens.invalidate(org);
        self.session = None;

        let request = CredentialRequest {
            username: self.username.clone(),
            credstore_add: self.credstore_add,
            org_id: org.cloned(),
            is_gov_cloud: self.is_gov_cloud == Some(true),
            ..CredentialRequest::new(self.server.server_type())
        };
        let answer = self.prompter.prompt_credentials(&request)?;

        if answer.username.is_some() {
            self.username = answer.username;
        }
        self.secret = Some(answer.secret);
        if !self.credstore_add {
            self.credstore_add = answer.save;
        }
        Ok(())
    }

    /// CSP token pair for `org`, taking identity from a fresh exchange.
    pub(super) async fn csp_tokens(
        &mut self,
        org: Option<&OrgId>,
        force: bool,
    ) -> Result<CspTokens, AuthError> {
        let request = TokenRequest {
            lookup_org: self.lookup_org(org)?,
            is_gov_cloud: self.is_gov_cloud == Some(true),
            credstore_add: self.credstore_add,
            ..TokenRequest::new(
                self.server.server_type(),
                self.storage_server(),
                org.cloned(),
            )
        };

        let issued = self
            .tokens
            .get_token(&request, force, self.credstore.as_ref(), self.prompter.as_mut())
            .await?;

        if let Some(grant) = issued.grant {
            self.username = grant.username;
            self.secret = Some(Secret::RefreshToken(grant.refresh_token));
        }
        Ok(issued.tokens)
    }
}

fn no_sso() -> AuthError {
    AuthError::Internal("no SSO authenticator is configured".to_string())
}
