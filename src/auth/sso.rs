//! auth::sso
//!
//! Seam for the SSO library that issues SAML bearer assertions.
//!
//! Two flows exist: an STS exchange with a username and password, and a
//! passthrough flow that uses the caller's existing platform login (no
//! prompt). The WS-Trust wire protocol lives behind this trait.

use async_trait::async_trait;

use super::errors::AuthError;

#[async_trait]
pub trait SsoAuthenticator: Send + Sync {
    /// Obtain a SAML bearer assertion from the STS at `sts_url`.
    async fn bearer_assertion(
        &self,
        sts_url: &str,
        username: &str,
        password: &str,
    ) -> Result<String, AuthError>;

    /// Obtain a SAML bearer assertion for the current platform user.
    async fn passthrough_assertion(&self) -> Result<String, AuthError>;
}
