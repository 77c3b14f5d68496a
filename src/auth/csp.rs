//! auth::csp
//!
//! CSP refresh token exchange.
//!
//! # Protocol
//!
//! The refresh token is POSTed as a form field to
//! `<csp_url>/csp/gateway/am/api/auth/api-tokens/authorize`. A successful
//! response carries an access token and an identity token, both JWTs.
//! HTTP 400 means the refresh token itself was rejected.
//!
//! # Example
//!
//! ```ignore
//! use vsession::auth::csp::{CspClient, HttpCspClient};
//!
//! let client = HttpCspClient::new(&settings)?;
//! let tokens = client.exchange_refresh_token(&refresh_token).await?;
//! ```

use std::fmt;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::core::config::AuthSettings;

use super::errors::AuthError;

/// Path of the token endpoint below the CSP base URL.
pub const CSP_TOKEN_PATH: &str = "/csp/gateway/am/api/auth/api-tokens/authorize";

/// User-Agent header for CSP requests.
const USER_AGENT: &str = "vsession-cli";

/// Access and identity token pair issued by CSP.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CspTokens {
    pub access_token: String,
    pub id_token: String,
}

impl fmt::Debug for CspTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CspTokens")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &"[REDACTED]")
            .finish()
    }
}

/// Exchanges refresh tokens for CSP token pairs.
#[async_trait]
pub trait CspClient: Send + Sync {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<CspTokens, AuthError>;

    /// Base URL the client talks to, for messages.
    fn csp_url(&self) -> &str;
}

/// reqwest-backed [`CspClient`].
#[derive(Debug, Clone)]
pub struct HttpCspClient {
    client: Client,
    csp_url: String,
}

impl HttpCspClient {
    /// Build a client honouring the CA bundle and verification settings.
    ///
    /// # Errors
    ///
    /// Fails if the CA bundle cannot be read or parsed.
    pub fn new(settings: &AuthSettings) -> Result<Self, AuthError> {
        let mut builder = Client::builder();

        if let Some(path) = &settings.cacert_file {
            let pem = std::fs::read(path).map_err(|e| {
                AuthError::Network(format!("cannot read CA bundle {}: {}", path.display(), e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }
        if settings.skip_server_verification {
            log::warn!("Server certificate verification is disabled for CSP requests");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            csp_url: settings.csp_url.clone(),
        })
    }

    /// Client for `csp_url` with default TLS settings.
    pub fn with_url(csp_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            csp_url: csp_url.into(),
        }
    }

    fn token_url(&self) -> String {
        format!("{}{}", self.csp_url.trim_end_matches('/'), CSP_TOKEN_PATH)
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(USER_AGENT),
        );
        headers
    }

    fn exchange_error(&self, message: impl fmt::Display) -> AuthError {
        AuthError::CspExchange {
            csp_url: self.csp_url.clone(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl CspClient for HttpCspClient {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<CspTokens, AuthError> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }

        log::debug!("Exchanging refresh token at {}", self.csp_url);

        let response = self
            .client
            .post(self.token_url())
            .headers(Self::headers())
            .form(&[("refresh_token", refresh_token)])
            .send()
            .await
            .map_err(|e| self.exchange_error(e.without_url()))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            return Err(AuthError::InvalidCspToken {
                csp_url: self.csp_url.clone(),
            });
        }
        if !status.is_success() {
            return Err(self.exchange_error(format!("HTTP {}", status)));
        }

        response
            .json::<CspTokens>()
            .await
            .map_err(|e| self.exchange_error(e.without_url()))
    }

    fn csp_url(&self) -> &str {
        &self.csp_url
    }
}
