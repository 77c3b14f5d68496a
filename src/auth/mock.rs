//! auth::mock
//!
//! Deterministic CSP and SSO doubles.
//!
//! # Design
//!
//! [`MockCspClient`] maps refresh tokens to identities and mints unsigned
//! JWTs carrying `username` and `context_name` claims, so token decoding
//! runs against realistic values. Unknown refresh tokens are rejected the
//! way CSP rejects them (HTTP 400). Clones share state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use super::csp::{CspClient, CspTokens};
use super::errors::AuthError;
use super::jwt::encode_unsigned;
use super::sso::SsoAuthenticator;

const MOCK_CSP_URL: &str = "https://csp.mock";

#[derive(Debug, Clone, Default)]
pub struct MockCspClient {
    inner: Arc<Mutex<MockCspInner>>,
}

#[derive(Debug, Default)]
struct MockCspInner {
    /// refresh token -> (username, org)
    grants: HashMap<String, (String, String)>,
    exchanges: Vec<String>,
}

impl MockCspClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `refresh_token` as belonging to `username` in `org`.
    pub fn with_grant(self, refresh_token: &str, username: &str, org: &str) -> Self {
        self.inner.lock().unwrap().grants.insert(
            refresh_token.to_string(),
            (username.to_string(), org.to_string()),
        );
        self
    }

    /// Number of exchanges performed.
    pub fn exchange_count(&self) -> usize {
        self.inner.lock().unwrap().exchanges.len()
    }

    /// Access token minted for `refresh_token`.
    pub fn access_token_for(&self, refresh_token: &str) -> Option<String> {
        self.tokens_for(refresh_token).map(|t| t.access_token)
    }

    fn tokens_for(&self, refresh_token: &str) -> Option<CspTokens> {
        let inner = self.inner.lock().unwrap();
        inner.grants.get(refresh_token).map(|(user, org)| {
            CspTokens {
                access_token: encode_unsigned(&json!({
                    "sub": refresh_token,
                    "username": user,
                    "context_name": org,
                })),
                id_token: encode_unsigned(&json!({ "username": user, "context_name": org })),
            }
        })
    }
}

#[async_trait]
impl CspClient for MockCspClient {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<CspTokens, AuthError> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }
        self.inner
            .lock()
            .unwrap()
            .exchanges
            .push(refresh_token.to_string());

        self.tokens_for(refresh_token)
            .ok_or_else(|| AuthError::InvalidCspToken {
                csp_url: MOCK_CSP_URL.to_string(),
            })
    }

    fn csp_url(&self) -> &str {
        MOCK_CSP_URL
    }
}

/// SSO double issuing fixed assertions.
#[derive(Debug, Clone, Default)]
pub struct MockSso {
    inner: Arc<Mutex<MockSsoInner>>,
}

#[derive(Debug, Default)]
struct MockSsoInner {
    /// (username, password) accepted by the STS flow.
    accepted: Option<(String, String)>,
    passthrough: bool,
    calls: Vec<String>,
}

impl MockSso {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(self, username: &str, password: &str) -> Self {
        self.inner.lock().unwrap().accepted = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn allow_passthrough(self) -> Self {
        self.inner.lock().unwrap().passthrough = true;
        self
    }

    /// Flows invoked so far ("sts:<url>" or "passthrough").
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl SsoAuthenticator for MockSso {
    async fn bearer_assertion(
        &self,
        sts_url: &str,
        username: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("sts:{}", sts_url));
        match &inner.accepted {
            Some((u, p)) if u == username && p == password => {
                Ok(format!("<saml:Assertion subject=\"{}\"/>", username))
            }
            _ => Err(AuthError::Network(
                "STS rejected the credentials".to_string(),
            )),
        }
    }

    async fn passthrough_assertion(&self) -> Result<String, AuthError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("passthrough".to_string());
        if inner.passthrough {
            Ok("<saml:Assertion subject=\"passthrough\"/>".to_string())
        } else {
            Err(AuthError::Network("no platform credentials".to_string()))
        }
    }
}
