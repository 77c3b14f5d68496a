//! auth::session
//!
//! Login and logout against a server-declared session manager service.
//!
//! # Method names
//!
//! Session managers expose `create`/`delete`. Older servers expose
//! `login`/`logout` instead, so a missing `create` falls back to `login`
//! and a missing `delete` to `logout`. A server without any logout method
//! is tolerated; one without any login method is not.

use std::sync::Arc;

use crate::core::types::SessionToken;
use crate::transport::{
    ApiProvider, CallContext, DataValue, InputDefinition, MetadataProvider, MethodResult,
};

use super::errors::AuthError;

const LOGIN_UNHANDLED_MSG: &str = "Session login result can not be handled";

/// Client for one server's session manager services.
#[derive(Clone)]
pub struct SessionManager {
    metadata: Arc<dyn MetadataProvider>,
    api: Arc<dyn ApiProvider>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(metadata: Arc<dyn MetadataProvider>, api: Arc<dyn ApiProvider>) -> Self {
        Self { metadata, api }
    }

    /// Find the method to call, following the legacy name fallback.
    ///
    /// `Ok(None)` means neither `delete` nor `logout` exists.
    async fn resolve(
        &self,
        session_manager: &str,
        method: &str,
    ) -> Result<Option<(String, InputDefinition)>, AuthError> {
        let mut method = method;
        loop {
            match self
                .metadata
                .command_input_definition(session_manager, method)
                .await
            {
                Ok(definition) => return Ok(Some((method.to_string(), definition))),
                Err(e) if e.is_not_found() => match method {
                    "create" => method = "login",
                    "delete" => method = "logout",
                    "logout" => {
                        log::warn!("No logout or delete method found");
                        return Ok(None);
                    }
                    _ => {
                        log::error!("Invalid login session manager found: {}", e);
                        return Err(AuthError::NotAuthenticated(
                            "Invalid login session manager found".to_string(),
                        ));
                    }
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Invoke `method` on `session_manager` with default-valued input.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] when no session manager is given or
    /// no usable method exists.
    pub async fn invoke(
        &self,
        session_manager: Option<&str>,
        method: &str,
        ctx: &CallContext,
    ) -> Result<MethodResult, AuthError> {
        let Some(sm) = session_manager.filter(|sm| !sm.is_empty()) else {
            return Err(AuthError::NotAuthenticated(
                "No session manager configured".to_string(),
            ));
        };

        let Some((method, definition)) = self.resolve(sm, method).await? else {
            return Err(AuthError::NotAuthenticated(
                "No logout or delete method found".to_string(),
            ));
        };

        log::debug!("Invoking {}.{}", sm, method);
        Ok(self
            .api
            .invoke(sm, &method, definition.new_value(), ctx)
            .await?)
    }

    /// Create a session, returning the issued session credential.
    ///
    /// A server-side rejection is [`AuthError::LoginRejected`].
    pub async fn login(
        &self,
        session_manager: &str,
        ctx: &CallContext,
    ) -> Result<SessionToken, AuthError> {
        log::info!("Doing session login to session manager");
        let result = self.invoke(Some(session_manager), "create", ctx).await?;
        if let Some(error) = result.error {
            return Err(AuthError::LoginRejected(error));
        }
        parse_login_output(result.output)
    }

    /// Delete the session `ctx` carries. Missing logout methods and
    /// server-side errors are logged, not returned.
    pub async fn logout(&self, session_manager: &str, ctx: &CallContext) -> Result<(), AuthError> {
        log::info!("Doing session logout from session manager");
        let Some((method, definition)) = self.resolve(session_manager, "delete").await? else {
            return Ok(());
        };

        let result = self
            .api
            .invoke(session_manager, &method, definition.new_value(), ctx)
            .await?;
        if let Some(error) = result.error {
            log::warn!("Session logout failed: {}", error);
        }
        Ok(())
    }
}

fn parse_login_output(output: Option<DataValue>) -> Result<SessionToken, AuthError> {
    match output {
        Some(DataValue::Object(fields)) => match fields.get("access_token") {
            Some(DataValue::String(token)) => Ok(SessionToken::AccessToken(token.clone())),
            _ => Err(AuthError::NotAuthenticated(LOGIN_UNHANDLED_MSG.to_string())),
        },
        Some(DataValue::String(session_id)) => Ok(SessionToken::SessionId(session_id)),
        _ => Err(AuthError::NotAuthenticated(LOGIN_UNHANDLED_MSG.to_string())),
    }
}
