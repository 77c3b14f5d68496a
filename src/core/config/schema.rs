//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Location
//!
//! In order of precedence:
//! 1. `$VSESSION_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/vsession/config.toml`
//! 3. `~/.vsession/config.toml`
//!
//! # Validation
//!
//! Config values are validated after parsing: endpoint URLs must parse and
//! the credential store provider must be a known one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// interactive = true
///
/// [endpoints]
/// vmc_server = "https://vmc.vmware.com"
/// csp_url = "https://console.cloud.vmware.com"
/// sts_url = "https://vcenter.example.com/sts/STSService"
///
/// [tls]
/// cacert_file = "/etc/ssl/certs/corp.pem"
/// skip_server_verification = false
///
/// [credstore]
/// provider = "file"
/// path = "/home/me/.vsession/credstore.toml"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Whether prompting for credentials is allowed
    pub interactive: Option<bool>,

    /// Remote service endpoints
    pub endpoints: Option<EndpointsConfig>,

    /// TLS settings for CSP calls
    pub tls: Option<TlsConfig>,

    /// Credential store settings
    pub credstore: Option<CredstoreConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoints) = &self.endpoints {
            endpoints.validate()?;
        }
        if let Some(credstore) = &self.credstore {
            credstore.validate()?;
        }
        Ok(())
    }
}

/// Remote endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointsConfig {
    /// VMware Cloud console URL
    pub vmc_server: Option<String>,

    /// CSP (cloud services portal) URL used for refresh token exchange
    pub csp_url: Option<String>,

    /// Secure token service URL for SAML bearer tokens
    pub sts_url: Option<String>,
}

impl EndpointsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("vmc_server", &self.vmc_server),
            ("csp_url", &self.csp_url),
            ("sts_url", &self.sts_url),
        ] {
            if let Some(value) = value {
                validate_url(name, value)?;
            }
        }
        Ok(())
    }
}

/// Validate that `value` is an absolute http(s) URL.
pub(crate) fn validate_url(name: &str, value: &str) -> Result<(), ConfigError> {
    match url::Url::parse(value) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => Ok(()),
        _ => Err(ConfigError::InvalidValue(format!(
            "invalid {} '{}', must be an http(s) URL",
            name, value
        ))),
    }
}

/// TLS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    /// PEM bundle of additional trusted CA certificates
    pub cacert_file: Option<PathBuf>,

    /// Disable server certificate verification
    pub skip_server_verification: Option<bool>,
}

/// Credential store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CredstoreConfig {
    /// Provider to use ("file" or "memory")
    pub provider: Option<String>,

    /// Override the credential store file location
    pub path: Option<PathBuf>,
}

impl CredstoreConfig {
    /// Valid credential store providers.
    pub const VALID_PROVIDERS: &'static [&'static str] = &["file", "memory"];

    /// Validate the credential store configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(provider) = &self.provider {
            if !Self::VALID_PROVIDERS.contains(&provider.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid credstore provider '{}', must be one of: {}",
                    provider,
                    Self::VALID_PROVIDERS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config: GlobalConfig = toml::from_str(
            r#"
            interactive = false

            [endpoints]
            csp_url = "https://csp.example.com"

            [tls]
            skip_server_verification = true

            [credstore]
            provider = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.interactive, Some(false));
        assert_eq!(
            config.endpoints.as_ref().unwrap().csp_url.as_deref(),
            Some("https://csp.example.com")
        );
        assert_eq!(config.tls.as_ref().unwrap().skip_server_verification, Some(true));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<GlobalConfig, _> = toml::from_str("default_forge = \"github\"");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_provider_rejected() {
        let config = GlobalConfig {
            credstore: Some(CredstoreConfig {
                provider: Some("keychain".into()),
                path: None,
            }),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("keychain"));
    }

    #[test]
    fn invalid_endpoint_rejected() {
        let config = GlobalConfig {
            endpoints: Some(EndpointsConfig {
                sts_url: Some("not a url".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GlobalConfig {
            endpoints: Some(EndpointsConfig {
                csp_url: Some("ftp://csp.example.com".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
