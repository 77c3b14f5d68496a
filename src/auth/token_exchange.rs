//! auth::token_exchange
//!
//! CSP token cache and SAML token exchange.
//!
//! # Caching
//!
//! Token pairs are cached per organisation id for the lifetime of the
//! owning connection. A fetch without an organisation is cached under
//! `"default"` and, once the token is decoded, also under the
//! organisation the token was issued for, so a later lookup by that id
//! hits the cache.
//!
//! # Refresh token sourcing
//!
//! The refresh token comes from the credential store entry for the
//! organisation if one exists; otherwise the user is prompted. A prompted
//! token is only written to the store after CSP accepted it and only if
//! the user asked for it to be saved.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

use crate::core::types::{OrgId, Secret, ServerType, SessionToken};
use crate::credstore::{CredentialEntry, CredentialQuery, CredentialStore};
use crate::transport::{ApiProvider, CallContext, DataValue};
use crate::ui::prompts::{CredentialRequest, Prompter};

use super::context::SecurityContext;
use super::csp::{CspClient, CspTokens};
use super::errors::AuthError;
use super::jwt::decode_token;

/// Cache key used when no organisation was requested.
pub const DEFAULT_CACHE_KEY: &str = "default";

/// Service performing access token to SAML token exchange.
pub const TOKEN_EXCHANGE_SERVICE: &str = "com.vmware.vcenter.tokenservice.token_exchange";

/// Operation of [`TOKEN_EXCHANGE_SERVICE`].
pub const TOKEN_EXCHANGE_OPERATION: &str = "exchange";

const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";
const SAML2_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:saml2";

const SAML_EXCHANGE_FAILED_MSG: &str =
    "An error occurred while trying to exchange auth token for SAML token";

/// Parameters of one token fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub server_type: ServerType,
    /// Server URL the refresh token is stored under.
    pub storage_server: String,
    /// Organisation of the current command; selects the cache slot.
    pub org: Option<OrgId>,
    /// Organisation used for the credential store lookup and the prompt.
    pub lookup_org: Option<OrgId>,
    pub is_gov_cloud: bool,
    /// Saving was already requested by the caller.
    pub credstore_add: bool,
}

impl TokenRequest {
    /// Request where the command organisation is also the lookup organisation.
    pub fn new(
        server_type: ServerType,
        storage_server: impl Into<String>,
        org: Option<OrgId>,
    ) -> Self {
        Self {
            server_type,
            storage_server: storage_server.into(),
            lookup_org: org.clone(),
            org,
            is_gov_cloud: false,
            credstore_add: false,
        }
    }

    fn cache_key(&self) -> String {
        self.org
            .as_ref()
            .map(|o| o.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_CACHE_KEY.to_string())
    }
}

/// Identity learned from a fresh exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct Grant {
    pub username: Option<String>,
    pub refresh_token: String,
    /// Organisation the token was issued for.
    pub context_name: Option<String>,
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grant")
            .field("username", &self.username)
            .field("refresh_token", &"[REDACTED]")
            .field("context_name", &self.context_name)
            .finish()
    }
}

/// Result of [`TokenExchanger::get_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub tokens: CspTokens,
    /// Set when the pair came from CSP rather than the cache.
    pub grant: Option<Grant>,
}

pub struct TokenExchanger {
    client: Box<dyn CspClient>,
    cache: HashMap<String, CspTokens>,
}

impl std::fmt::Debug for TokenExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchanger")
            .field("csp_url", &self.client.csp_url())
            .field("cached", &self.cache.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TokenExchanger {
    pub fn new(client: Box<dyn CspClient>) -> Self {
        Self {
            client,
            cache: HashMap::new(),
        }
    }

    /// Whether a pair is cached under `key`.
    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Return the token pair for `request`, exchanging a refresh token
    /// when the cache misses or `force` is set.
    pub async fn get_token(
        &mut self,
        request: &TokenRequest,
        force: bool,
        store: &dyn CredentialStore,
        prompter: &mut dyn Prompter,
    ) -> Result<IssuedTokens, AuthError> {
        let key = request.cache_key();
        if !force {
            if let Some(tokens) = self.cache.get(&key) {
                log::debug!("Using cached CSP token for {}", key);
                return Ok(IssuedTokens {
                    tokens: tokens.clone(),
                    grant: None,
                });
            }
        }

        let (tokens, grant) = self.retrieve_token(request, store, prompter).await?;

        self.cache.insert(key.clone(), tokens.clone());
        if key == DEFAULT_CACHE_KEY {
            if let Some(org) = &grant.context_name {
                self.cache.insert(org.clone(), tokens.clone());
            }
        }

        Ok(IssuedTokens {
            tokens,
            grant: Some(grant),
        })
    }

    async fn retrieve_token(
        &self,
        request: &TokenRequest,
        store: &dyn CredentialStore,
        prompter: &mut dyn Prompter,
    ) -> Result<(CspTokens, Grant), AuthError> {
        let query = CredentialQuery::organization(
            &request.storage_server,
            request.lookup_org.as_ref(),
            None,
        );
        let stored = store
            .get(&query)?
            .and_then(|entry| entry.secret)
            .filter(Secret::is_refresh_token);

        let (refresh_token, should_save) = match stored {
            Some(secret) => {
                log::info!("Using refresh token from credentials store");
                (secret.expose().to_string(), false)
            }
            None => {
                let prompt = CredentialRequest {
                    org_id: request.lookup_org.clone(),
                    is_gov_cloud: request.is_gov_cloud,
                    credstore_add: request.credstore_add,
                    ..CredentialRequest::new(request.server_type)
                };
                let answer = prompter.prompt_credentials(&prompt)?;
                (answer.secret.expose().trim().to_string(), answer.save)
            }
        };

        let tokens = self.client.exchange_refresh_token(&refresh_token).await?;
        let access_claims = decode_token(&tokens.access_token)?;
        decode_token(&tokens.id_token)?;

        let grant = Grant {
            username: access_claims.username,
            refresh_token,
            context_name: access_claims.context_name,
        };

        if should_save {
            log::info!("Adding credstore entry for provided refresh token");
            store.add(CredentialEntry::organization(
                request.storage_server.clone(),
                grant.username.clone(),
                grant.context_name.as_deref().and_then(|o| OrgId::new(o).ok()),
                grant.refresh_token.clone(),
                Some(SessionToken::AccessToken(tokens.access_token.clone())),
            ))?;
        }

        Ok((tokens, grant))
    }

    /// Forget the pair cached for `org`, and the default slot if it holds
    /// the same pair.
    pub fn invalidate(&mut self, org: Option<&OrgId>) {
        let Some(org) = org else {
            return;
        };
        if let Some(tokens) = self.cache.remove(org.as_str()) {
            if self.cache.get(DEFAULT_CACHE_KEY) == Some(&tokens) {
                self.cache.remove(DEFAULT_CACHE_KEY);
            }
        }
    }

    /// Exchange a CSP token pair for a SAML assertion through the
    /// server's token exchange service.
    ///
    /// The call runs under an OAuth context built from the access token;
    /// `base` supplies the rest of the call context.
    pub async fn exchange_for_saml(
        &self,
        api: &dyn ApiProvider,
        tokens: &CspTokens,
        base: &CallContext,
    ) -> Result<String, AuthError> {
        let ctx = CallContext {
            security_context: Some(SecurityContext::oauth(tokens.access_token.clone())),
            ..base.clone()
        };
        let input = json!({
            "spec": {
                "subject_token_type": ACCESS_TOKEN_TYPE,
                "subject_token": tokens.access_token,
                "actor_token_type": ID_TOKEN_TYPE,
                "actor_token": tokens.id_token,
                "requested_token_type": SAML2_TOKEN_TYPE,
                "grant_type": SAML2_TOKEN_TYPE,
            }
        });

        let result = api
            .invoke(TOKEN_EXCHANGE_SERVICE, TOKEN_EXCHANGE_OPERATION, input, &ctx)
            .await?;
        if let Some(error) = result.error {
            return Err(AuthError::SamlExchange(format!(
                "{}. {}",
                SAML_EXCHANGE_FAILED_MSG, error
            )));
        }

        let encoded = result
            .output
            .as_ref()
            .and_then(|out| out.get("access_token"))
            .and_then(DataValue::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::SamlExchange(SAML_EXCHANGE_FAILED_MSG.to_string()))?;

        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(cleaned)
            .map_err(|e| AuthError::SamlExchange(format!("{}: {}", SAML_EXCHANGE_FAILED_MSG, e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AuthError::SamlExchange(format!("{}: {}", SAML_EXCHANGE_FAILED_MSG, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::mock::MockCspClient;
    use crate::credstore::SecretCredentialStore;
    use crate::transport::mock::{MockOperation, MockTransport};
    use crate::transport::MethodResult;
    use crate::ui::prompts::ScriptedPrompter;

    const ORG: &str = "3f2a8c1e-4b5d-4e6f-8a9b-0c1d2e3f4a5b";
    const VMC: &str = "https://vmc.vmware.com";

    fn org() -> OrgId {
        OrgId::new(ORG).unwrap()
    }

    fn exchanger(csp: &MockCspClient) -> TokenExchanger {
        TokenExchanger::new(Box::new(csp.clone()))
    }

    fn base_ctx() -> CallContext {
        CallContext {
            operation_id: "op".into(),
            show_unreleased_apis: false,
            security_context: None,
        }
    }

    mod get_token {
        use super::*;

        #[tokio::test]
        async fn default_fetch_is_cached_under_context_name() {
            let csp = MockCspClient::new().with_grant("rt", "alice", ORG);
            let store = SecretCredentialStore::in_memory();
            let script = ScriptedPrompter::new().refresh_token("rt", false);
            let mut prompter = script.clone();
            let mut tokens = exchanger(&csp);

            let request = TokenRequest::new(ServerType::Vmc, VMC, None);
            let first = tokens
                .get_token(&request, false, &store, &mut prompter)
                .await
                .unwrap();
            assert_eq!(
                first.grant.as_ref().unwrap().username.as_deref(),
                Some("alice")
            );

            let by_org = TokenRequest::new(ServerType::Vmc, VMC, Some(org()));
            let second = tokens
                .get_token(&by_org, false, &store, &mut prompter)
                .await
                .unwrap();

            assert_eq!(first.tokens, second.tokens);
            assert!(second.grant.is_none());
            assert_eq!(csp.exchange_count(), 1);
            assert_eq!(script.prompt_count(), 1);
        }

        #[tokio::test]
        async fn stored_refresh_token_is_used_without_prompt() {
            let csp = MockCspClient::new().with_grant("stored-rt", "bob", ORG);
            let store = SecretCredentialStore::in_memory();
            store
                .add(CredentialEntry::organization(
                    VMC,
                    Some("bob".into()),
                    Some(org()),
                    "stored-rt",
                    None,
                ))
                .unwrap();
            let script = ScriptedPrompter::new();
            let mut prompter = script.clone();
            let mut tokens = exchanger(&csp);

            let issued = tokens
                .get_token(
                    &TokenRequest::new(ServerType::Vmc, VMC, Some(org())),
                    false,
                    &store,
                    &mut prompter,
                )
                .await
                .unwrap();

            assert_eq!(issued.grant.unwrap().refresh_token, "stored-rt");
            assert_eq!(script.prompt_count(), 0);
        }

        #[tokio::test]
        async fn force_bypasses_cache() {
            let csp = MockCspClient::new().with_grant("rt", "alice", ORG);
            let store = SecretCredentialStore::in_memory();
            let mut prompter = ScriptedPrompter::new()
                .refresh_token("rt", false)
                .refresh_token("rt", false);
            let mut tokens = exchanger(&csp);
            let request = TokenRequest::new(ServerType::Vmc, VMC, None);

            tokens
                .get_token(&request, false, &store, &mut prompter)
                .await
                .unwrap();
            tokens
                .get_token(&request, true, &store, &mut prompter)
                .await
                .unwrap();
            assert_eq!(csp.exchange_count(), 2);
        }

        #[tokio::test]
        async fn saved_only_when_requested() {
            let csp = MockCspClient::new().with_grant("rt", "alice", ORG);
            let store = SecretCredentialStore::in_memory();
            let mut prompter = ScriptedPrompter::new().refresh_token("rt", true);
            let mut tokens = exchanger(&csp);

            tokens
                .get_token(
                    &TokenRequest::new(ServerType::Vmc, VMC, None),
                    false,
                    &store,
                    &mut prompter,
                )
                .await
                .unwrap();

            let entries = store.list(Some(VMC)).unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].user.as_deref(), Some("alice"));
            assert_eq!(entries[0].org(), Some(&org()));
            assert!(matches!(
                entries[0].session,
                Some(SessionToken::AccessToken(_))
            ));
        }

        #[tokio::test]
        async fn requested_save_reaches_prompt_and_stores_one_entry() {
            let csp = MockCspClient::new().with_grant("rt", "alice", ORG);
            let store = SecretCredentialStore::in_memory();
            let script = ScriptedPrompter::new().refresh_token("rt", true);
            let mut prompter = script.clone();
            let mut tokens = exchanger(&csp);
            let request = TokenRequest {
                credstore_add: true,
                ..TokenRequest::new(ServerType::Vmc, VMC, Some(org()))
            };

            let issued = tokens
                .get_token(&request, false, &store, &mut prompter)
                .await
                .unwrap();

            assert!(script.requests()[0].credstore_add);
            let entries = store.list(None).unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].server, VMC);
            assert_eq!(
                entries[0].session,
                Some(SessionToken::AccessToken(issued.tokens.access_token))
            );
        }

        #[tokio::test]
        async fn rejected_token_is_not_saved() {
            let csp = MockCspClient::new();
            let store = SecretCredentialStore::in_memory();
            let mut prompter = ScriptedPrompter::new().refresh_token("bad", true);
            let mut tokens = exchanger(&csp);

            let err = tokens
                .get_token(
                    &TokenRequest::new(ServerType::Vmc, VMC, None),
                    false,
                    &store,
                    &mut prompter,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCspToken { .. }));
            assert!(store.list(None).unwrap().is_empty());
            assert!(!tokens.is_cached(DEFAULT_CACHE_KEY));
        }

        #[tokio::test]
        async fn invalidate_drops_shared_default_slot() {
            let csp = MockCspClient::new().with_grant("rt", "alice", ORG);
            let store = SecretCredentialStore::in_memory();
            let mut prompter = ScriptedPrompter::new().refresh_token("rt", false);
            let mut tokens = exchanger(&csp);

            tokens
                .get_token(
                    &TokenRequest::new(ServerType::Vmc, VMC, None),
                    false,
                    &store,
                    &mut prompter,
                )
                .await
                .unwrap();
            assert!(tokens.is_cached(ORG));

            tokens.invalidate(None);
            assert!(tokens.is_cached(DEFAULT_CACHE_KEY));

            tokens.invalidate(Some(&org()));
            assert!(!tokens.is_cached(ORG));
            assert!(!tokens.is_cached(DEFAULT_CACHE_KEY));
        }
    }

    mod exchange_for_saml {
        use super::*;

        fn pair() -> CspTokens {
            CspTokens {
                access_token: "at".into(),
                id_token: "it".into(),
            }
        }

        #[tokio::test]
        async fn decodes_assertion() {
            let encoded = STANDARD.encode("<saml:Assertion/>");
            let transport = MockTransport::new().respond(
                TOKEN_EXCHANGE_SERVICE,
                TOKEN_EXCHANGE_OPERATION,
                MethodResult::success(json!({ "access_token": encoded })),
            );
            let tokens = exchanger(&MockCspClient::new());

            let saml = tokens
                .exchange_for_saml(&transport, &pair(), &base_ctx())
                .await
                .unwrap();
            assert_eq!(saml, "<saml:Assertion/>");

            let ops = transport.operations();
            assert!(ops.iter().any(|op| matches!(
                op,
                MockOperation::Invoke { service, scheme: Some(s), input, .. }
                    if service == TOKEN_EXCHANGE_SERVICE
                        && *s == crate::core::types::OAUTH_SCHEME_ID
                        && input["spec"]["grant_type"] == SAML2_TOKEN_TYPE
                        && input["spec"]["actor_token"] == "it"
            )));
        }

        #[tokio::test]
        async fn empty_output_fails() {
            let transport = MockTransport::new().respond(
                TOKEN_EXCHANGE_SERVICE,
                TOKEN_EXCHANGE_OPERATION,
                MethodResult::success(DataValue::Null),
            );
            let tokens = exchanger(&MockCspClient::new());

            let err = tokens
                .exchange_for_saml(&transport, &pair(), &base_ctx())
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), SAML_EXCHANGE_FAILED_MSG);
        }
    }
}
