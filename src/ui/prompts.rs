//! ui::prompts
//!
//! Interactive credential prompts.
//!
//! # Design
//!
//! The broker asks for credentials through the [`Prompter`] trait so that
//! the terminal can be replaced by a [`ScriptedPrompter`] in tests. When
//! prompting is disabled, [`TerminalPrompter`] fails with
//! [`PromptError::NotInteractive`] instead of blocking on stdin.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::core::types::{OrgId, Secret, ServerType};

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("not in interactive mode")]
    NotInteractive,

    #[error("no credentials are needed for {0} servers")]
    NotApplicable(ServerType),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<io::Error> for PromptError {
    fn from(err: io::Error) -> Self {
        PromptError::IoError(err.to_string())
    }
}

/// What the broker needs from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    pub server_type: ServerType,
    /// Known username; only the password is asked for when set.
    pub username: Option<String>,
    /// Saving was already requested, so do not ask.
    pub credstore_add: bool,
    pub org_id: Option<OrgId>,
    pub is_gov_cloud: bool,
}

impl CredentialRequest {
    pub fn new(server_type: ServerType) -> Self {
        Self {
            server_type,
            username: None,
            credstore_add: false,
            org_id: None,
            is_gov_cloud: false,
        }
    }

    /// Whether the answer is a CSP refresh token rather than a password.
    pub fn wants_refresh_token(&self) -> bool {
        self.server_type.uses_csp_tokens() || self.is_gov_cloud
    }
}

/// What the user answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptedCredentials {
    pub username: Option<String>,
    pub secret: Secret,
    /// User asked for the credentials to be remembered.
    pub save: bool,
}

/// Source of interactively supplied credentials.
pub trait Prompter: Send {
    fn prompt_credentials(
        &mut self,
        request: &CredentialRequest,
    ) -> Result<PromptedCredentials, PromptError>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Clone)]
pub struct TerminalPrompter {
    interactive: bool,
}

impl TerminalPrompter {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }

    fn read_line(message: &str) -> Result<String, PromptError> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", message)?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(PromptError::Cancelled);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Answers accepted as "yes" to the save question; empty takes the default.
fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "" | "true" | "yes" | "y" | "t"
    )
}

impl Prompter for TerminalPrompter {
    fn prompt_credentials(
        &mut self,
        request: &CredentialRequest,
    ) -> Result<PromptedCredentials, PromptError> {
        if request.server_type == ServerType::Internal {
            return Err(PromptError::NotApplicable(request.server_type));
        }
        if !self.interactive {
            return Err(PromptError::NotInteractive);
        }

        let (username, secret) = if request.wants_refresh_token() {
            let message = match &request.org_id {
                Some(org) => format!("Refresh Token (for Organization with ID {}): ", org),
                None => "Refresh Token: ".to_string(),
            };
            let token = rpassword::prompt_password(message)?;
            (None, Secret::RefreshToken(token.trim().to_string()))
        } else {
            let username = match &request.username {
                Some(u) if !u.is_empty() => u.clone(),
                _ => Self::read_line("Username: ")?,
            };
            let password = rpassword::prompt_password("Password: ")?;
            (Some(username), Secret::Password(password))
        };

        let save = if request.credstore_add {
            true
        } else {
            let what = if request.server_type.uses_csp_tokens() {
                "refresh token"
            } else {
                "credentials"
            };
            is_yes(&Self::read_line(&format!(
                "Do you want to save {} in the credstore? (y or n) [y]:",
                what
            ))?)
        };

        Ok(PromptedCredentials {
            username,
            secret,
            save,
        })
    }
}

/// Prompter that replays canned answers and records every request.
///
/// Clones share the script and the record. Once the script runs out,
/// further prompts fail with [`PromptError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompter {
    answers: Arc<Mutex<VecDeque<PromptedCredentials>>>,
    requests: Arc<Mutex<Vec<CredentialRequest>>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer.
    pub fn answer(self, answer: PromptedCredentials) -> Self {
        self.answers.lock().unwrap().push_back(answer);
        self
    }

    /// Queue a username/password answer.
    pub fn password(self, username: &str, password: &str, save: bool) -> Self {
        self.answer(PromptedCredentials {
            username: Some(username.to_string()),
            secret: Secret::Password(password.to_string()),
            save,
        })
    }

    /// Queue a refresh token answer.
    pub fn refresh_token(self, token: &str, save: bool) -> Self {
        self.answer(PromptedCredentials {
            username: None,
            secret: Secret::RefreshToken(token.to_string()),
            save,
        })
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<CredentialRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt_credentials(
        &mut self,
        request: &CredentialRequest,
    ) -> Result<PromptedCredentials, PromptError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(PromptError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers() {
        for a in ["", "y", "Y", "yes", "true", " t "] {
            assert!(is_yes(a), "{:?} should be yes", a);
        }
        for a in ["n", "no", "false", "maybe"] {
            assert!(!is_yes(a), "{:?} should be no", a);
        }
    }

    #[test]
    fn refresh_token_wanted_for_cloud_and_gov_cloud() {
        assert!(CredentialRequest::new(ServerType::Vmc).wants_refresh_token());
        assert!(CredentialRequest::new(ServerType::Nsx).wants_refresh_token());
        assert!(!CredentialRequest::new(ServerType::Vsphere).wants_refresh_token());

        let gov = CredentialRequest {
            is_gov_cloud: true,
            ..CredentialRequest::new(ServerType::Vsphere)
        };
        assert!(gov.wants_refresh_token());
    }

    #[test]
    fn terminal_prompter_refuses_when_not_interactive() {
        let mut p = TerminalPrompter::new(false);
        let err = p
            .prompt_credentials(&CredentialRequest::new(ServerType::Vsphere))
            .unwrap_err();
        assert!(matches!(err, PromptError::NotInteractive));
    }

    #[test]
    fn terminal_prompter_skips_internal() {
        let mut p = TerminalPrompter::new(true);
        let err = p
            .prompt_credentials(&CredentialRequest::new(ServerType::Internal))
            .unwrap_err();
        assert!(matches!(err, PromptError::NotApplicable(ServerType::Internal)));
    }

    #[test]
    fn scripted_prompter_replays_and_records() {
        let script = ScriptedPrompter::new().password("admin", "pw", true);
        let mut p = script.clone();

        let got = p
            .prompt_credentials(&CredentialRequest::new(ServerType::Vsphere))
            .unwrap();
        assert_eq!(got.username.as_deref(), Some("admin"));
        assert!(got.save);

        assert!(matches!(
            p.prompt_credentials(&CredentialRequest::new(ServerType::Vsphere)),
            Err(PromptError::Cancelled)
        ));
        assert_eq!(script.prompt_count(), 2);
    }
}
