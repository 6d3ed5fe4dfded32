//! Session / bearer token lifecycle
//!
//! Owns the account credentials and the current bearer token. Expiry is
//! never tracked locally: a token is only found to be stale when the
//! remote validate endpoint rejects it. Every failure is logged and turned
//! into a `false` return; nothing here propagates an error to the caller.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use super::endpoints::Endpoints;
use super::gateway::HttpGateway;
use crate::types::{NovaError, Result};

/// Multipart field carrying the JSON-encoded login payload
const LOGIN_FORM_FIELD: &str = "LoginForm";

/// How many leading token characters appear in debug logs
const TOKEN_LOG_PREFIX: usize = 10;

/// Account credentials, fixed for the lifetime of a [`SessionManager`]
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Current bearer token, if any
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TokenState {
    /// No token: never logged in, or the last login attempt failed
    #[default]
    Absent,
    /// Token held but rejected by the last validation; kept only until the
    /// next login overwrites or clears it
    Pending(String),
    /// Token issued by the latest login or accepted by the latest validation
    Valid(String),
}

impl TokenState {
    pub fn token(&self) -> Option<&str> {
        match self {
            TokenState::Absent => None,
            TokenState::Pending(token) | TokenState::Valid(token) => Some(token),
        }
    }
}

pub struct SessionManager {
    credentials: Credentials,
    gateway: Arc<dyn HttpGateway>,
    endpoints: Endpoints,
    state: TokenState,
}

impl SessionManager {
    pub fn new(credentials: Credentials, gateway: Arc<dyn HttpGateway>, endpoints: Endpoints) -> Self {
        Self {
            credentials,
            gateway,
            endpoints,
            state: TokenState::Absent,
        }
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn state(&self) -> &TokenState {
        &self.state
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Token usable for authenticated calls. A token rejected by the last
    /// validation is not handed out.
    pub fn bearer(&self) -> Option<&str> {
        match &self.state {
            TokenState::Valid(token) => Some(token),
            _ => None,
        }
    }

    /// POST the credentials and store the issued token.
    ///
    /// Any failure clears the token, so a revoked token never lingers into
    /// the next cycle.
    pub fn login(&mut self) -> bool {
        tracing::debug!("Logging in as {}", self.credentials.email);

        match self.request_token() {
            Ok(token) => {
                tracing::debug!(
                    "Login succeeded, token {}...",
                    token.chars().take(TOKEN_LOG_PREFIX).collect::<String>()
                );
                self.state = TokenState::Valid(token);
                true
            }
            Err(e) => {
                tracing::error!("Login failed: {}", e);
                self.state = TokenState::Absent;
                false
            }
        }
    }

    fn request_token(&self) -> Result<String> {
        let payload = json!({
            "username": self.credentials.email,
            "password": self.credentials.password,
        });

        let response = self.gateway.post_form(
            &self.endpoints.login(),
            LOGIN_FORM_FIELD,
            payload.to_string(),
        )?;

        if !response.is_ok() {
            return Err(NovaError::Auth(format!(
                "status {}, body: {}",
                response.status, response.body
            )));
        }

        let body: Value = response.json()?;
        match body.get("data").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(NovaError::DataShape(format!(
                "no token in login response: {}",
                response.body
            ))),
        }
    }

    /// Ask the remote API whether the held token is still accepted.
    /// Without a token this fails immediately, without a network call.
    pub fn validate(&mut self) -> bool {
        let token = match self.state.token() {
            Some(token) => token.to_string(),
            None => {
                tracing::warn!("No token to validate; login required first");
                return false;
            }
        };

        match self.gateway.get(&self.endpoints.validate(), Some(&token)) {
            Ok(response) if response.is_ok() => {
                tracing::debug!("Token validated");
                self.state = TokenState::Valid(token);
                true
            }
            Ok(response) => {
                tracing::error!(
                    "Token validation rejected: status {}, body: {}",
                    response.status,
                    response.body
                );
                self.state = TokenState::Pending(token);
                false
            }
            Err(e) => {
                tracing::error!("Token validation failed: {}", e);
                self.state = TokenState::Pending(token);
                false
            }
        }
    }

    /// Make sure a usable token is held, logging in at most once.
    pub fn ensure_valid_session(&mut self) -> bool {
        if self.state.token().is_some() && self.validate() {
            return true;
        }

        tracing::debug!("Token missing or expired; logging in again");
        if !self.login() {
            tracing::error!("Could not obtain a valid token");
            return false;
        }
        true
    }

    /// Fresh login followed by validation, as done before accepting new
    /// credentials
    pub fn check_credentials(&mut self) -> bool {
        self.login() && self.validate()
    }
}
