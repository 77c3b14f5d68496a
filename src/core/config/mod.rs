//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. Environment variables (`VSESSION_VMC_SERVER`, `VSESSION_CSP_URL`,
//!    `VSESSION_STS_URL`, `VSESSION_SSO_BEARER_TOKEN`, `VSESSION_CACERTS_BUNDLE`)
//! 4. `--quiet`, which turns prompting off (applied by the CLI)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. An explicit path (`--config`)
//! 2. `$VSESSION_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/vsession/config.toml`
//! 4. `~/.vsession/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use vsession::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! let settings = config.auth_settings();
//! println!("CSP: {}", settings.csp_url);
//! println!("Interactive: {}", config.interactive());
//! ```

pub mod schema;

pub use schema::{CredstoreConfig, EndpointsConfig, GlobalConfig, TlsConfig};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default VMware Cloud console.
pub const DEFAULT_VMC_SERVER: &str = "https://vmc.vmware.com";

/// Default CSP endpoint.
pub const DEFAULT_CSP_URL: &str = "https://console.cloud.vmware.com";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed configuration file contents
    pub global: GlobalConfig,
    /// Path the configuration was loaded from (if any)
    path: Option<PathBuf>,
}

/// Endpoint and TLS settings consumed by the authentication layer.
#[derive(Clone, PartialEq)]
pub struct AuthSettings {
    pub vmc_server: String,
    pub csp_url: String,
    pub sts_url: Option<String>,
    /// Pre-shared SAML bearer token; bypasses SSO when present.
    pub sso_bearer_token: Option<String>,
    pub cacert_file: Option<PathBuf>,
    pub skip_server_verification: bool,
    /// Whether credentials may be prompted for on the terminal.
    pub allow_prompts: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            vmc_server: DEFAULT_VMC_SERVER.to_string(),
            csp_url: DEFAULT_CSP_URL.to_string(),
            sts_url: None,
            sso_bearer_token: None,
            cacert_file: None,
            skip_server_verification: false,
            allow_prompts: true,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("vmc_server", &self.vmc_server)
            .field("csp_url", &self.csp_url)
            .field("sts_url", &self.sts_url)
            .field(
                "sso_bearer_token",
                &self.sso_bearer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("cacert_file", &self.cacert_file)
            .field("skip_server_verification", &self.skip_server_verification)
            .field("allow_prompts", &self.allow_prompts)
            .finish()
    }
}

impl Config {
    /// Load configuration from `explicit` or the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or
    /// if an explicit path does not exist. Missing default config files
    /// are not an error (defaults are used).
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Self::find_config(),
        };

        let global = match &path {
            Some(p) => Self::read_config(p)?,
            None => GlobalConfig::default(),
        };
        global.validate()?;

        if let Some(p) = &path {
            log::debug!("loaded config from {}", p.display());
        }

        Ok(Config { global, path })
    }

    fn find_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("VSESSION_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("vsession/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".vsession/config.toml"))
            .filter(|path| path.exists())
    }

    fn read_config(path: &Path) -> Result<GlobalConfig, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })
    }

    /// Whether credentials may be prompted for. On unless configured off.
    pub fn interactive(&self) -> bool {
        self.global.interactive.unwrap_or(true)
    }

    /// Credential store provider name.
    pub fn credstore_provider(&self) -> &str {
        self.global
            .credstore
            .as_ref()
            .and_then(|c| c.provider.as_deref())
            .unwrap_or(crate::secrets::DEFAULT_PROVIDER)
    }

    /// Credential store file, `~/.vsession/credstore.toml` unless configured.
    pub fn credstore_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = self.global.credstore.as_ref().and_then(|c| c.path.clone()) {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".vsession/credstore.toml"))
    }

    /// Resolve authentication settings, applying environment overrides.
    pub fn auth_settings(&self) -> AuthSettings {
        self.auth_settings_with(|key| std::env::var(key).ok())
    }

    /// Resolve authentication settings using `env` for variable lookup.
    pub fn auth_settings_with<F>(&self, env: F) -> AuthSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());
        let endpoints = self.global.endpoints.clone().unwrap_or_default();
        let tls = self.global.tls.clone().unwrap_or_default();

        AuthSettings {
            vmc_server: env("VSESSION_VMC_SERVER")
                .or(endpoints.vmc_server)
                .unwrap_or_else(|| DEFAULT_VMC_SERVER.to_string()),
            csp_url: env("VSESSION_CSP_URL")
                .or(endpoints.csp_url)
                .unwrap_or_else(|| DEFAULT_CSP_URL.to_string()),
            sts_url: env("VSESSION_STS_URL").or(endpoints.sts_url),
            sso_bearer_token: env("VSESSION_SSO_BEARER_TOKEN"),
            cacert_file: env("VSESSION_CACERTS_BUNDLE")
                .map(PathBuf::from)
                .or(tls.cacert_file),
            skip_server_verification: tls.skip_server_verification.unwrap_or(false),
            allow_prompts: self.interactive(),
        }
    }

    /// Get the path the config was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        let settings = config.auth_settings_with(no_env);

        assert_eq!(settings, AuthSettings::default());
        assert_eq!(config.credstore_provider(), "file");
        assert!(config.interactive());
    }

    #[test]
    fn load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
            interactive = false

            [endpoints]
            csp_url = "https://csp.internal.example"
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        let settings = config.auth_settings_with(no_env);

        assert!(!config.interactive());
        assert!(!settings.allow_prompts);
        assert_eq!(settings.csp_url, "https://csp.internal.example");
        assert_eq!(settings.vmc_server, DEFAULT_VMC_SERVER);
        assert_eq!(config.loaded_from(), Some(path.as_path()));
    }

    #[test]
    fn missing_explicit_path_is_error() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(Some(&temp.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn invalid_file_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[credstore]\nprovider = \"vault\"\n").unwrap();

        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn env_overrides_file() {
        let config = Config {
            global: GlobalConfig {
                endpoints: Some(EndpointsConfig {
                    vmc_server: Some("https://vmc.file.example".into()),
                    sts_url: Some("https://sts.file.example".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            path: None,
        };

        let env: HashMap<&str, &str> = [
            ("VSESSION_VMC_SERVER", "https://vmc.env.example"),
            ("VSESSION_SSO_BEARER_TOKEN", "bearer"),
            ("VSESSION_CACERTS_BUNDLE", "/tmp/ca.pem"),
            ("VSESSION_STS_URL", ""),
        ]
        .into_iter()
        .collect();
        let settings = config.auth_settings_with(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.vmc_server, "https://vmc.env.example");
        assert_eq!(settings.sts_url.as_deref(), Some("https://sts.file.example"));
        assert_eq!(settings.sso_bearer_token.as_deref(), Some("bearer"));
        assert_eq!(settings.cacert_file, Some(PathBuf::from("/tmp/ca.pem")));
    }

    #[test]
    fn settings_debug_redacts_bearer() {
        let settings = AuthSettings {
            sso_bearer_token: Some("very-secret".into()),
            ..Default::default()
        };
        let out = format!("{:?}", settings);
        assert!(!out.contains("very-secret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn unknown_keys_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[endpoints]\nvmc_url = \"https://vmc\"\n").unwrap();

        match Config::load(Some(&path)) {
            Err(ConfigError::ParseError { message, .. }) => assert!(message.contains("vmc_url")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn memory_provider_and_custom_path() {
        let config = Config {
            global: GlobalConfig {
                credstore: Some(CredstoreConfig {
                    provider: Some("memory".into()),
                    path: Some(PathBuf::from("/srv/creds.toml")),
                }),
                ..Default::default()
            },
            path: None,
        };

        assert_eq!(config.credstore_provider(), "memory");
        assert_eq!(
            config.credstore_path().unwrap(),
            PathBuf::from("/srv/creds.toml")
        );
    }
}
