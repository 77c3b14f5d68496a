//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ServerType`] - Closed set of server flavours, with a per-type [`ServerProfile`]
//! - [`ServerIdentity`] - Normalised server URL plus its type
//! - [`OrgId`] - Validated organisation GUID
//! - [`Secret`] - Password or refresh token, never printed
//! - [`SessionToken`] - The single active session credential for a session manager
//! - [`Credentials`] - Every credential shape the broker can hold
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use vsession::core::types::{OrgId, ServerIdentity, ServerType};
//!
//! let server = ServerIdentity::new(Some("vcenter.example.com"), ServerType::Vsphere).unwrap();
//! assert_eq!(server.url(), "https://vcenter.example.com/api");
//!
//! assert!(OrgId::new("not-a-guid").is_err());
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scheme id for requests that need no authentication at all.
pub const NO_AUTHN_SCHEME_ID: &str = "com.vmware.vapi.std.security.no_authentication";

/// Scheme id for username/password authentication.
pub const USER_PASSWORD_SCHEME_ID: &str = "com.vmware.vapi.std.security.user_pass";

/// Scheme id for SAML bearer token authentication.
pub const SAML_BEARER_SCHEME_ID: &str = "com.vmware.vapi.std.security.saml_bearer_token";

/// Scheme id for session id authentication.
pub const SESSION_SCHEME_ID: &str = "com.vmware.vapi.std.security.session_id";

/// Scheme id for OAuth bearer token authentication.
pub const OAUTH_SCHEME_ID: &str = "com.vmware.vapi.std.security.oauth";

const GUID_PATTERN: &str =
    "[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}";

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("Invalid server url {0}. URL must be of format http(s)://ip:port")]
    InvalidServerUrl(String),

    #[error("invalid organization id: {0}")]
    InvalidOrgId(String),

    #[error("unknown server type '{0}' (valid: vsphere, vmc, nsx, nsx-onprem, internal)")]
    UnknownServerType(String),

    #[error(
        "Couldn't fetch organization id from provided NSX address. \
         Are you sure you have provided correct NSX address?"
    )]
    MissingNsxOrg,
}

/// The kind of server a connection talks to.
///
/// Every per-type decision goes through [`ServerType::profile`] rather
/// than scattered comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerType {
    /// vCenter Server speaking vAPI over JSON-RPC.
    Vsphere,
    /// VMware Cloud console (CSP token based).
    Vmc,
    /// NSX in VMware Cloud (CSP token based, REST).
    Nsx,
    /// Self-managed NSX manager (username/password).
    NsxOnPrem,
    /// Built-in commands with file-backed metadata.
    Internal,
}

/// Static per-type facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerProfile {
    /// Path appended to a server given as `host[:port]`.
    pub api_base: &'static str,
    /// URL scheme used when the server is given without one.
    pub bare_host_scheme: &'static str,
    /// Whether username/password login is realised with CSP tokens.
    pub csp_tokens: bool,
    /// Whether the identity-provider check for OAuth federation applies.
    pub checks_identity_providers: bool,
}

impl ServerType {
    /// All variants, in display order.
    pub const ALL: [ServerType; 5] = [
        ServerType::Vsphere,
        ServerType::Vmc,
        ServerType::Nsx,
        ServerType::NsxOnPrem,
        ServerType::Internal,
    ];

    /// Look up the static profile for this server type.
    pub fn profile(self) -> ServerProfile {
        match self {
            ServerType::Vsphere => ServerProfile {
                api_base: "api",
                bare_host_scheme: "https",
                csp_tokens: false,
                checks_identity_providers: true,
            },
            ServerType::Vmc => ServerProfile {
                api_base: "",
                bare_host_scheme: "http",
                csp_tokens: true,
                checks_identity_providers: false,
            },
            ServerType::Nsx => ServerProfile {
                api_base: "",
                bare_host_scheme: "https",
                csp_tokens: true,
                checks_identity_providers: false,
            },
            ServerType::NsxOnPrem => ServerProfile {
                api_base: "",
                bare_host_scheme: "https",
                csp_tokens: false,
                checks_identity_providers: false,
            },
            ServerType::Internal => ServerProfile {
                api_base: "api",
                bare_host_scheme: "https",
                csp_tokens: false,
                checks_identity_providers: false,
            },
        }
    }

    /// Whether this server authenticates with CSP-issued tokens.
    pub fn uses_csp_tokens(self) -> bool {
        self.profile().csp_tokens
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ServerType::Vsphere => "vsphere",
            ServerType::Vmc => "vmc",
            ServerType::Nsx => "nsx",
            ServerType::NsxOnPrem => "nsx-onprem",
            ServerType::Internal => "internal",
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServerType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypeError::UnknownServerType(s.to_string()))
    }
}

/// A normalised server URL plus its type. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    url: String,
    server_type: ServerType,
}

impl ServerIdentity {
    /// Build a server identity, normalising the address.
    ///
    /// - no address: `http://localhost/<base>`
    /// - `http(s)://host[:port]` with an empty or `/` path: base path appended
    /// - any other `http(s)://` URL: kept as given
    /// - bare `host[:port]`: the type's scheme and base path are added
    ///
    /// A trailing `/` is always stripped.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidServerUrl`] for an `http(s)://` address
    /// without a host.
    pub fn new(server: Option<&str>, server_type: ServerType) -> Result<Self, TypeError> {
        let base = server_type.profile().api_base;

        let mut url = match server.map(str::trim).filter(|s| !s.is_empty()) {
            None => format!("http://localhost/{}", base),
            Some(s) if s.starts_with("http://") || s.starts_with("https://") => {
                let parsed =
                    url::Url::parse(s).map_err(|_| TypeError::InvalidServerUrl(s.to_string()))?;
                let host = parsed
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| TypeError::InvalidServerUrl(s.to_string()))?;

                if parsed.path().is_empty() || parsed.path() == "/" {
                    let netloc = match parsed.port() {
                        Some(port) => format!("{}:{}", host, port),
                        None => host.to_string(),
                    };
                    format!("{}://{}/{}", parsed.scheme(), netloc, base)
                } else {
                    s.to_string()
                }
            }
            Some(s) => format!(
                "{}://{}/{}",
                server_type.profile().bare_host_scheme,
                s,
                base
            ),
        };

        if url.ends_with('/') {
            url.pop();
        }

        Ok(Self { url, server_type })
    }

    /// The normalised URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The server type.
    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    /// Extract the organisation id from an NSX address (`.../orgs/<GUID>/...`).
    pub fn org_from_url(&self) -> Option<OrgId> {
        static ORG_PATH: OnceLock<Regex> = OnceLock::new();
        let re = ORG_PATH.get_or_init(|| {
            Regex::new(&format!("orgs/({})", GUID_PATTERN)).expect("static org path pattern")
        });
        re.captures(&self.url)
            .and_then(|c| c.get(1))
            .map(|m| OrgId(m.as_str().to_string()))
    }

    /// Organisation a CSP credential lookup uses on this server.
    ///
    /// Off NSX this is `org` as given. NSX always needs one: `org`, else
    /// the one in the address.
    pub fn lookup_org(&self, org: Option<&OrgId>) -> Result<Option<OrgId>, TypeError> {
        if self.server_type != ServerType::Nsx {
            return Ok(org.cloned());
        }
        org.cloned()
            .or_else(|| self.org_from_url())
            .map(Some)
            .ok_or(TypeError::MissingNsxOrg)
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.server_type)
    }
}

/// A validated organisation id (lowercase GUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrgId(String);

impl OrgId {
    /// Create a new validated organisation id.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidOrgId`] unless the value is a GUID.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if guid_regex().is_match(&value) {
            Ok(Self(value))
        } else {
            Err(TypeError::InvalidOrgId(value))
        }
    }

    /// Find `--org <GUID>` in a command's arguments.
    ///
    /// ```
    /// use vsession::core::types::OrgId;
    ///
    /// let args = ["esx", "list", "--org", "3f2a8c1e-4b5d-4e6f-8a9b-0c1d2e3f4a5b"];
    /// let org = OrgId::from_args(&args).unwrap();
    /// assert_eq!(org.as_str(), "3f2a8c1e-4b5d-4e6f-8a9b-0c1d2e3f4a5b");
    /// ```
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Option<Self> {
        args.windows(2)
            .find(|pair| pair[0].as_ref() == "--org")
            .and_then(|pair| OrgId::new(pair[1].as_ref()).ok())
    }

    /// Borrow the GUID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrgId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        OrgId::new(value)
    }
}

impl From<OrgId> for String {
    fn from(value: OrgId) -> Self {
        value.0
    }
}

impl FromStr for OrgId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrgId::new(s)
    }
}

fn guid_regex() -> &'static Regex {
    static GUID: OnceLock<Regex> = OnceLock::new();
    GUID.get_or_init(|| Regex::new(&format!("^{}$", GUID_PATTERN)).expect("static guid pattern"))
}

/// A long-lived secret supplied by the user.
///
/// VMC and NSX servers take a CSP refresh token where other servers take a
/// password; the variant records which one is held.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Secret {
    Password(String),
    RefreshToken(String),
}

impl Secret {
    /// The raw secret. Do not log or print it.
    pub fn expose(&self) -> &str {
        match self {
            Secret::Password(v) | Secret::RefreshToken(v) => v,
        }
    }

    pub fn is_refresh_token(&self) -> bool {
        matches!(self, Secret::RefreshToken(_))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Password(_) => f.write_str("Password([REDACTED])"),
            Secret::RefreshToken(_) => f.write_str("RefreshToken([REDACTED])"),
        }
    }
}

/// The one active session credential for a (server, session manager) pair.
///
/// Holding a single enum value is what keeps a session id and an access
/// token from being active at the same time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SessionToken {
    SessionId(String),
    AccessToken(String),
}

impl SessionToken {
    /// The raw token. Do not log or print it.
    pub fn expose(&self) -> &str {
        match self {
            SessionToken::SessionId(v) | SessionToken::AccessToken(v) => v,
        }
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionToken::SessionId(_) => f.write_str("SessionId([REDACTED])"),
            SessionToken::AccessToken(_) => f.write_str("AccessToken([REDACTED])"),
        }
    }
}

/// Every credential shape the broker handles.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    UserPassword { username: String, password: String },
    RefreshToken { token: String },
    SessionId { value: String },
    AccessToken { value: String },
    SamlAssertion { value: String },
}

impl From<SessionToken> for Credentials {
    fn from(token: SessionToken) -> Self {
        match token {
            SessionToken::SessionId(value) => Credentials::SessionId { value },
            SessionToken::AccessToken(value) => Credentials::AccessToken { value },
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credentials::RefreshToken { .. } => f.write_str("RefreshToken([REDACTED])"),
            Credentials::SessionId { .. } => f.write_str("SessionId([REDACTED])"),
            Credentials::AccessToken { .. } => f.write_str("AccessToken([REDACTED])"),
            Credentials::SamlAssertion { .. } => f.write_str("SamlAssertion([REDACTED])"),
        }
    }
}
