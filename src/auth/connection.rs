//! auth::connection
//!
//! The authentication coordinator for one server.
//!
//! # Flow
//!
//! For every command, [`Connection::authenticate`]:
//!
//! 1. asks the metadata provider which schemes the operation accepts and
//!    returns at once when it accepts no authentication;
//! 2. on vSphere, checks once whether the server federates through an
//!    OAuth identity provider (GovCloud);
//! 3. picks username/password over SAML bearer, and notes the session
//!    manager bound to the scheme, which makes the operation session aware;
//! 4. reuses an existing session, or builds a security context and, for
//!    session aware operations, logs in with it.
//!
//! [`Connection::call_command`] wraps this in the execute loop: server
//! errors are classified by [`classify_server_error`] and at most one
//! re-authentication is attempted.
//!
//! # Secrets
//!
//! Passwords and refresh tokens live in scratch fields only while they
//! are needed. After a session aware login they are cleared before the
//! context is returned; for other operations they are kept until the call
//! succeeded, so that they can be written to the credential store.
//!
//! # Concurrency
//!
//! Every operation that touches state takes `&mut self`; one connection
//! serves one command at a time.

use std::sync::Arc;

use crate::core::config::AuthSettings;
use crate::core::types::{
    OrgId, Secret, ServerIdentity, ServerType, SessionToken, NO_AUTHN_SCHEME_ID,
    SAML_BEARER_SCHEME_ID, USER_PASSWORD_SCHEME_ID,
};
use crate::credstore::{CredentialEntry, CredentialQuery, CredentialStore};
use crate::transport::{ApiProvider, CallContext, CommandExecutor, MetadataProvider, MethodResult};
use crate::ui::prompts::Prompter;

use super::classify::{classify_server_error, RecoveryAction, RetryState};
use super::context::SecurityContext;
use super::csp::CspClient;
use super::errors::{AuthError, RETRY_PROMPT_MSG, UNABLE_TO_AUTHENTICATE_MSG, UNSUPPORTED_SCHEME_MSG};
use super::jwt::decode_token;
use super::session::SessionManager;
use super::sso::SsoAuthenticator;
use super::token_exchange::TokenExchanger;

/// Service listing the identity providers of a vCenter.
pub const IDENTITY_PROVIDERS_SERVICE: &str = "com.vmware.vcenter.identity.providers";

/// Result of a successful [`Connection::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub session_aware: bool,
    /// `None` when the operation needs no authentication.
    pub context: Option<SecurityContext>,
    /// User the context belongs to, when known.
    pub user: Option<String>,
}

impl AuthOutcome {
    fn anonymous() -> Self {
        Self {
            session_aware: false,
            context: None,
            user: None,
        }
    }
}

/// External collaborators of a [`Connection`].
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataProvider>,
    pub api: Arc<dyn ApiProvider>,
    pub credstore: Box<dyn CredentialStore>,
    pub prompter: Box<dyn Prompter>,
    pub csp: Box<dyn CspClient>,
    pub sso: Option<Box<dyn SsoAuthenticator>>,
}

/// Authenticated connection to one server.
pub struct Connection {
    pub(super) server: ServerIdentity,
    pub(super) settings: AuthSettings,
    /// Organisation given for the connection (NSX).
    pub(super) org_id: Option<OrgId>,

    pub(super) metadata: Arc<dyn MetadataProvider>,
    pub(super) api: Arc<dyn ApiProvider>,
    pub(super) sessions: SessionManager,
    pub(super) credstore: Box<dyn CredentialStore>,
    pub(super) prompter: Box<dyn Prompter>,
    pub(super) sso: Option<Box<dyn SsoAuthenticator>>,
    pub(super) tokens: TokenExchanger,

    pub(super) username: Option<String>,
    pub(super) secret: Option<Secret>,
    pub(super) session: Option<SessionToken>,
    pub(super) session_manager: Option<String>,

    pub(super) credstore_add: bool,
    pub(super) shell_mode: bool,
    pub(super) is_gov_cloud: Option<bool>,
    /// Next credential lookup must prompt instead of reading the store.
    pub(super) skip_credstore_lookup: bool,

    operation_id: String,
    show_unreleased_apis: bool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("secret", &self.secret)
            .field("session", &self.session)
            .field("session_manager", &self.session_manager)
            .field("is_gov_cloud", &self.is_gov_cloud)
            .field("operation_id", &self.operation_id)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(server: ServerIdentity, settings: AuthSettings, collaborators: Collaborators) -> Self {
        let Collaborators {
            metadata,
            api,
            credstore,
            prompter,
            csp,
            sso,
        } = collaborators;

        Self {
            server,
            settings,
            org_id: None,
            sessions: SessionManager::new(metadata.clone(), api.clone()),
            metadata,
            api,
            credstore,
            prompter,
            sso,
            tokens: TokenExchanger::new(csp),
            username: None,
            secret: None,
            session: None,
            session_manager: None,
            credstore_add: false,
            shell_mode: false,
            is_gov_cloud: None,
            skip_credstore_lookup: false,
            operation_id: uuid::Uuid::new_v4().to_string(),
            show_unreleased_apis: false,
        }
    }

    /// Credentials given on the command line.
    pub fn with_credentials(mut self, username: impl Into<String>, secret: Option<Secret>) -> Self {
        self.username = Some(username.into());
        self.secret = secret;
        self
    }

    pub fn with_org(mut self, org: OrgId) -> Self {
        self.org_id = Some(org);
        self
    }

    /// Remember validated credentials in the credential store.
    pub fn with_credstore_add(mut self, credstore_add: bool) -> Self {
        self.credstore_add = credstore_add;
        self
    }

    /// Interactive shell: stored sessions are not picked up per command.
    pub fn with_shell_mode(mut self, shell_mode: bool) -> Self {
        self.shell_mode = shell_mode;
        self
    }

    pub fn with_unreleased_apis(mut self, show: bool) -> Self {
        self.show_unreleased_apis = show;
        self
    }

    /// Skip GovCloud detection with a known answer.
    pub fn with_gov_cloud(mut self, is_gov_cloud: bool) -> Self {
        self.is_gov_cloud = Some(is_gov_cloud);
        self
    }

    pub fn server(&self) -> &ServerIdentity {
        &self.server
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Whether a password or refresh token is held in memory.
    pub fn holds_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn session(&self) -> Option<&SessionToken> {
        self.session.as_ref()
    }

    pub fn session_manager(&self) -> Option<&str> {
        self.session_manager.as_deref()
    }

    pub fn is_gov_cloud(&self) -> Option<bool> {
        self.is_gov_cloud
    }

    pub fn credstore(&self) -> &dyn CredentialStore {
        self.credstore.as_ref()
    }

    /// Call context carrying this connection's operation id.
    pub fn call_context(&self, security_context: Option<SecurityContext>) -> CallContext {
        CallContext {
            operation_id: self.operation_id.clone(),
            show_unreleased_apis: self.show_unreleased_apis,
            security_context,
        }
    }

    pub(super) fn uses_csp_tokens(&self) -> bool {
        self.server.server_type().uses_csp_tokens()
    }

    /// Server URL credentials for this connection are stored under.
    pub(super) fn storage_server(&self) -> String {
        if self.uses_csp_tokens() {
            self.settings.vmc_server.clone()
        } else {
            self.server.url().to_string()
        }
    }

    pub(super) fn clear_scratch(&mut self) {
        self.username = None;
        self.secret = None;
    }

    pub(super) fn session_context(token: &SessionToken) -> SecurityContext {
        match token {
            SessionToken::SessionId(id) => SecurityContext::session(id.clone()),
            SessionToken::AccessToken(token) => SecurityContext::oauth(token.clone()),
        }
    }

    /// Authenticate `(service, operation)`.
    ///
    /// `org` is the organisation named by the command, if any.
    ///
    /// # Errors
    ///
    /// Any error with [`AuthError::is_not_authenticated`] set ends the
    /// invocation; collaborator errors are passed through.
    pub async fn authenticate(
        &mut self,
        service: &str,
        operation: &str,
        org: Option<&OrgId>,
    ) -> Result<AuthOutcome, AuthError> {
        let schemes = self
            .metadata
            .authentication_schemes(service, operation)
            .await?;

        if schemes.is_empty() || schemes.contains(NO_AUTHN_SCHEME_ID) {
            log::info!("Using no authentication scheme");
            return Ok(AuthOutcome::anonymous());
        }

        self.detect_gov_cloud().await?;

        let scheme = if schemes.contains(USER_PASSWORD_SCHEME_ID) {
            log::info!("Using username/password authentication scheme");
            USER_PASSWORD_SCHEME_ID
        } else if schemes.contains(SAML_BEARER_SCHEME_ID) {
            log::info!("Using SAML bearer token authentication scheme");
            SAML_BEARER_SCHEME_ID
        } else {
            return Err(AuthError::NotAuthenticated(
                UNSUPPORTED_SCHEME_MSG.to_string(),
            ));
        };

        let session_aware = match schemes.session_manager(scheme) {
            Some(sm) => {
                self.session_manager = Some(sm.to_string());
                true
            }
            None => false,
        };

        let mut retry = RetryState::new();
        loop {
            if session_aware {
                if self.session.is_none() && !self.shell_mode {
                    self.load_stored_session()?;
                }
                if let Some(token) = &self.session {
                    let context = Self::session_context(token);
                    let user = self.username.take();
                    self.clear_scratch();
                    return Ok(AuthOutcome {
                        session_aware,
                        context: Some(context),
                        user,
                    });
                }
            }

            let context = self.security_context(scheme, org).await?;
            if !session_aware {
                return Ok(AuthOutcome {
                    session_aware,
                    context: Some(context),
                    user: self.username.clone(),
                });
            }

            let user = self.username.clone();
            let secret = self.secret.take();
            let sm = self.session_manager.clone().unwrap_or_default();
            let login_ctx = self.call_context(Some(context));

            match self.sessions.login(&sm, &login_ctx).await {
                Ok(token) => {
                    self.session = Some(token.clone());
                    if self.credstore_add || self.user_in_credstore(user.as_deref())? {
                        self.add_entry_to_credstore(user.clone(), secret, Some(token.clone()), org)
                            .await?;
                    }
                    self.clear_scratch();
                    return Ok(AuthOutcome {
                        session_aware,
                        context: Some(Self::session_context(&token)),
                        user,
                    });
                }
                Err(AuthError::LoginRejected(error)) if retry.has_remaining() => {
                    log::debug!("Session login rejected: {}", error);
                    retry.attempts_used += 1;
                    log::info!("{}", RETRY_PROMPT_MSG);
                    self.username = None;
                    self.skip_credstore_lookup = true;
                }
                Err(e) => {
                    self.clear_scratch();
                    return Err(e);
                }
            }
        }
    }

    /// One-time check whether a vSphere server federates through an
    /// OAuth2 identity provider.
    async fn detect_gov_cloud(&mut self) -> Result<(), AuthError> {
        if self.is_gov_cloud.is_some() || !self.server.server_type().profile().checks_identity_providers
        {
            return Ok(());
        }

        let definition = match self
            .metadata
            .command_input_definition(IDENTITY_PROVIDERS_SERVICE, "list")
            .await
        {
            Ok(definition) => definition,
            Err(e) if e.is_not_found() => {
                log::info!(
                    "{}; Thus not executing against GovCloud instance",
                    e
                );
                self.is_gov_cloud = Some(false);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let result = match self
            .api
            .invoke(
                IDENTITY_PROVIDERS_SERVICE,
                "list",
                definition.new_value(),
                &self.call_context(None),
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Identity provider lookup failed: {}", e);
                self.is_gov_cloud = Some(false);
                return Ok(());
            }
        };

        let federated = match (&result.output, &result.error) {
            (Some(json_out), None) => json_out
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .any(|item| item.get("oauth2").map_or(false, |v| !v.is_null()))
                })
                .unwrap_or(false),
            (_, Some(error)) => {
                log::info!("Identity provider lookup failed: {}", error);
                false
            }
            (None, None) => false,
        };

        if federated {
            log::debug!("Identity provider with OAuth2 found; treating server as GovCloud");
        }
        // The detected value is kept for the life of the connection, so a
        // federated vCenter is treated as GovCloud on every later call.
        self.is_gov_cloud = Some(federated);
        Ok(())
    }

    /// Pick up a session stored for the current user, if any.
    fn load_stored_session(&mut self) -> Result<(), AuthError> {
        log::info!("Getting session id from credentials store");
        let query = if self.is_gov_cloud == Some(true) {
            CredentialQuery::organization(self.server.url(), None, self.username.as_deref())
        } else {
            CredentialQuery::session_manager(
                self.server.url(),
                self.session_manager.clone().unwrap_or_default(),
                self.username.as_deref(),
            )
        };
        if let Some(entry) = self.credstore.get(&query)? {
            if self.username.is_none() {
                self.username = entry.user;
            }
            self.session = entry.session;
        }
        Ok(())
    }

    fn user_in_credstore(&self, user: Option<&str>) -> Result<bool, AuthError> {
        let query = if self.is_gov_cloud == Some(true) {
            CredentialQuery::organization(self.server.url(), None, None)
        } else {
            CredentialQuery::session_manager(
                self.server.url(),
                self.session_manager.clone().unwrap_or_default(),
                user,
            )
        };
        Ok(self.credstore.get(&query)?.is_some())
    }

    /// Persist validated credentials and, optionally, the session they
    /// opened.
    pub(super) async fn add_entry_to_credstore(
        &mut self,
        user: Option<String>,
        secret: Option<Secret>,
        session: Option<SessionToken>,
        org: Option<&OrgId>,
    ) -> Result<(), AuthError> {
        if self.uses_csp_tokens() || self.is_gov_cloud == Some(true) {
            let Some(secret) = secret else {
                log::debug!("No refresh token held; nothing to store");
                return Ok(());
            };
            let access_token = match &session {
                Some(SessionToken::AccessToken(token)) => token.clone(),
                _ => self.csp_tokens(org, false).await?.access_token,
            };
            let claims = decode_token(&access_token)?;
            let server = if self.uses_csp_tokens() {
                self.settings.vmc_server.clone()
            } else {
                self.server.url().to_string()
            };

            log::info!("Adding credstore entry for provided refresh token");
            self.credstore.add(CredentialEntry::organization(
                server,
                claims.username,
                claims.context_name.and_then(|o| OrgId::new(o).ok()),
                secret.expose(),
                session,
            ))?;
            return Ok(());
        }

        let Some(user) = user else {
            log::debug!("No username held; nothing to store");
            return Ok(());
        };
        log::info!("Adding credstore entry for user '{}'", user);
        self.credstore.add(CredentialEntry::session_manager(
            self.server.url(),
            user,
            self.session_manager.clone().unwrap_or_default(),
            secret,
            session,
        ))?;
        Ok(())
    }

    /// Authenticate, run `executor` and react to credential errors.
    ///
    /// Server errors that are not about credentials come back inside the
    /// returned [`MethodResult`]. Credentials rejected beyond the retry
    /// limit end in [`AuthError::LoginRejected`].
    pub async fn call_command(
        &mut self,
        service: &str,
        operation: &str,
        org: Option<&OrgId>,
        executor: &dyn CommandExecutor,
    ) -> Result<MethodResult, AuthError> {
        let mut retry = RetryState::new();

        loop {
            let outcome = self.authenticate(service, operation, org).await?;

            let held = self.username.take();
            let user = outcome.user.clone().or(held);
            let secret = self.secret.take();
            let secret = if outcome.session_aware { None } else { secret };

            let ctx = self.call_context(outcome.context);
            let result = executor.execute(&ctx).await?;

            if let Some(error) = &result.error {
                let decision = classify_server_error(
                    error,
                    outcome.session_aware,
                    &mut retry,
                    self.uses_csp_tokens(),
                );

                if decision.should_retry {
                    match decision.action {
                        RecoveryAction::Reprompt => {
                            log::info!("{}", RETRY_PROMPT_MSG);
                            self.skip_credstore_lookup = true;
                        }
                        RecoveryAction::DropSession => {
                            self.drop_session(user.as_deref(), org).await?;
                            // Renew as the same user from the stored credentials.
                            self.username = user;
                        }
                        RecoveryAction::None => {}
                    }
                    continue;
                }

                if decision.credentials_invalid {
                    log::error!("{}", UNABLE_TO_AUTHENTICATE_MSG);
                    return Err(AuthError::LoginRejected(error.clone()));
                }
            }

            if self.credstore_add && !outcome.session_aware && secret.is_some() {
                self.add_entry_to_credstore(user, secret, None, org).await?;
            }
            return Ok(result);
        }
    }

    /// Forget an expired session or access token so the next attempt
    /// starts over.
    async fn drop_session(&mut self, user: Option<&str>, org: Option<&OrgId>) -> Result<(), AuthError> {
        if self.is_gov_cloud == Some(true) {
            self.credstore
                .remove_auth_tokens(Some(self.server.url()), user)?;
            self.session = None;
        } else if self.uses_csp_tokens() {
            self.credstore
                .remove_auth_tokens(Some(&self.settings.vmc_server), user)?;
            self.csp_tokens(org, true).await?;
        } else {
            self.credstore.remove_session_ids(
                Some(self.server.url()),
                user,
                self.session_manager.as_deref(),
            )?;
            self.session = None;
        }
        Ok(())
    }

    /// End the current server session.
    pub async fn logout(&mut self) -> Result<(), AuthError> {
        let (Some(sm), Some(token)) = (self.session_manager.clone(), self.session.take()) else {
            log::debug!("No active session to log out of");
            return Ok(());
        };
        let ctx = self.call_context(Some(Self::session_context(&token)));
        self.sessions.logout(&sm, &ctx).await?;
        self.session_manager = None;
        Ok(())
    }

    /// Log out of every stored session for this server and drop the
    /// stored session ids, or the cached access tokens on CSP servers.
    pub async fn clear_credentials_store_sessions(&mut self) -> Result<(), AuthError> {
        if self.uses_csp_tokens() {
            self.credstore
                .remove_auth_tokens(Some(&self.settings.vmc_server), None)?;
            return Ok(());
        }

        let entries = self.credstore.list(Some(self.server.url()))?;
        for entry in entries {
            let (Some(sm), Some(token)) = (entry.session_manager_name(), entry.session.as_ref())
            else {
                continue;
            };
            let ctx = self.call_context(Some(Self::session_context(token)));
            if let Err(e) = self.sessions.logout(sm, &ctx).await {
                log::warn!("Logout from {} failed: {}", sm, e);
            }
        }
        self.session = None;
        self.session_manager = None;
        self.credstore
            .remove_session_ids(Some(self.server.url()), None, None)?;
        Ok(())
    }

    /// Resolve the organisation the CSP credential store lookup uses.
    pub(super) fn lookup_org(&self, org: Option<&OrgId>) -> Result<Option<OrgId>, AuthError> {
        let org = if self.server.server_type() == ServerType::Nsx {
            self.org_id.as_ref()
        } else {
            org
        };
        Ok(self.server.lookup_org(org)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::mock::MockCspClient;
    use crate::credstore::SecretCredentialStore;
    use crate::transport::mock::MockTransport;
    use crate::ui::prompts::ScriptedPrompter;

    const ORG_A: &str = "3f2a8c1e-4b5d-4e6f-8a9b-0c1d2e3f4a5b";
    const ORG_B: &str = "9e8d7c6b-5a49-4837-a625-140f2e3d4c5b";

    fn connect(server: &str, server_type: ServerType) -> Connection {
        let transport = MockTransport::new();
        Connection::new(
            ServerIdentity::new(Some(server), server_type).unwrap(),
            AuthSettings::default(),
            Collaborators {
                metadata: Arc::new(transport.clone()),
                api: Arc::new(transport),
                credstore: Box::new(SecretCredentialStore::in_memory()),
                prompter: Box::new(ScriptedPrompter::new()),
                csp: Box::new(MockCspClient::new()),
                sso: None,
            },
        )
    }

    fn org(s: &str) -> OrgId {
        OrgId::new(s).unwrap()
    }

    #[test]
    fn csp_credentials_are_stored_under_vmc_server() {
        let nsx = connect("https://nsx.example.com", ServerType::Nsx);
        assert_eq!(nsx.storage_server(), AuthSettings::default().vmc_server);

        let vc = connect("vc.example.com", ServerType::Vsphere);
        assert_eq!(vc.storage_server(), "https://vc.example.com/api");
    }

    #[test]
    fn lookup_org_passes_through_off_nsx() {
        let vmc = connect("https://vmc.example.com", ServerType::Vmc);
        assert_eq!(vmc.lookup_org(None).unwrap(), None);
        assert_eq!(vmc.lookup_org(Some(&org(ORG_A))).unwrap(), Some(org(ORG_A)));
    }

    #[test]
    fn nsx_org_comes_from_connection_then_url() {
        let url = format!("https://nsx.example.com/orgs/{}/sddcs/1", ORG_B);

        let from_url = connect(&url, ServerType::Nsx);
        assert_eq!(from_url.lookup_org(None).unwrap(), Some(org(ORG_B)));

        let explicit = connect(&url, ServerType::Nsx).with_org(org(ORG_A));
        assert_eq!(
            explicit.lookup_org(Some(&org(ORG_B))).unwrap(),
            Some(org(ORG_A))
        );

        let missing = connect("https://nsx.example.com", ServerType::Nsx);
        assert!(missing.lookup_org(None).is_err());
    }

    #[test]
    fn call_context_carries_connection_flags() {
        let conn = connect("vc.example.com", ServerType::Vsphere).with_unreleased_apis(true);
        let ctx = conn.call_context(None);

        assert_eq!(ctx.operation_id, conn.operation_id());
        assert!(ctx.show_unreleased_apis);
        assert!(ctx.security_context.is_none());
    }

    #[test]
    fn debug_never_shows_the_secret() {
        let conn = connect("vc.example.com", ServerType::Vsphere)
            .with_credentials("admin", Some(Secret::Password("hunter2".into())));

        assert!(conn.holds_secret());
        assert!(!format!("{:?}", conn).contains("hunter2"));
    }
}
