//! Identity API transport.
//!
//! [`IdentityApi`] returns raw JSON bodies or a [`TransportError`]; turning
//! those into session outcomes is the manager's job, via [`classify`] and
//! [`super::response::extract_session`].

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::error::AuthError;
use super::response::server_message;
use super::types::{LoginCredentials, RegisterCredentials};
use crate::config::ApiConfig;

/// What went wrong on the wire, before any classification.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// A response arrived with a non-success status. `body` is the decoded
    /// JSON, when the body was JSON.
    #[error("HTTP {status}")]
    Status { status: u16, body: Option<Value> },

    #[error("request timed out")]
    Timeout,

    #[error("no response: {0}")]
    Network(String),
}

/// The remote identity service.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// `POST /users/login`
    async fn login(&self, credentials: &LoginCredentials) -> Result<Value, TransportError>;

    /// `POST /users/register`
    async fn register(&self, credentials: &RegisterCredentials) -> Result<Value, TransportError>;

    /// `PUT /users/change-password`, bearer-authenticated.
    async fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<Value, TransportError>;

    /// `DELETE /users/{id}`, bearer-authenticated.
    async fn delete_account(&self, token: &str, user_id: &str) -> Result<Value, TransportError>;
}

/// Which call failed; the same status means different things per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    Register,
    ChangePassword,
    DeleteAccount,
}

/// Map a transport failure to a classified, user-displayable error.
pub fn classify(operation: Operation, error: TransportError) -> AuthError {
    let (status, body) = match error {
        TransportError::Timeout => return AuthError::Timeout,
        TransportError::Network(detail) => return AuthError::Network { detail },
        TransportError::Status { status, body } => (status, body),
    };
    let server_says = |fallback: &str| {
        body.as_ref()
            .and_then(server_message)
            .unwrap_or_else(|| fallback.to_string())
    };

    match (operation, status) {
        (Operation::Login, 400) => {
            AuthError::validation("Incomplete data. Check your email and password")
        }
        (Operation::Login, 401) => AuthError::Authentication {
            message: "Invalid credentials or inactive account".into(),
        },
        (Operation::Login, 500) => AuthError::Server {
            status,
            message: "Internal server error. Please try again".into(),
        },
        (Operation::Register, 400) => {
            AuthError::validation(server_says("Invalid data. Check the submitted fields"))
        }
        (Operation::Register, 409) => AuthError::Conflict {
            message: server_says("An account with this email or username is already registered"),
        },
        (Operation::Register, 500) => AuthError::Server {
            status,
            message: server_says("Internal server error. Please try again"),
        },
        (Operation::ChangePassword, 400) => {
            AuthError::validation(server_says("Invalid password data"))
        }
        (Operation::ChangePassword, 401) => AuthError::Authentication {
            message: server_says("Current password is incorrect"),
        },
        (Operation::DeleteAccount, 401 | 403) => AuthError::Authentication {
            message: server_says("Not authorized to delete this account"),
        },
        (Operation::ChangePassword | Operation::DeleteAccount, _) => AuthError::Server {
            status,
            message: server_says(&format!("Server error ({status}). Please try again")),
        },
        (Operation::Login | Operation::Register, _) => AuthError::Server {
            status,
            message: format!("Server error ({status}). Please try again"),
        },
    }
}

/// reqwest-backed [`IdentityApi`].
pub struct HttpIdentityClient {
    base_url: String,
    base: reqwest::Url,
    http: reqwest::Client,
}

impl HttpIdentityClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        Self::with_timeout(&config.base_url, config.timeout())
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = reqwest::Url::parse(base_url)
            .with_context(|| format!("Invalid identity API base URL '{base_url}'"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("Identity API base URL '{base_url}' cannot carry a path");
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            base,
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `{base}/users/{id}` with `id` percent-encoded as a single segment.
    fn user_url(&self, user_id: &str) -> reqwest::Url {
        let mut url = self.base.clone();
        // Always Ok: `with_timeout` rejects cannot-be-a-base URLs.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["users", user_id]);
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, TransportError> {
        let resp = request.send().await.map_err(transport_error)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;
        let body = serde_json::from_str::<Value>(&text).ok();

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Identity API returned an error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body.unwrap_or(Value::Null))
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl IdentityApi for HttpIdentityClient {
    async fn login(&self, credentials: &LoginCredentials) -> Result<Value, TransportError> {
        let request = self
            .http
            .post(self.endpoint("users/login"))
            .json(credentials);
        self.send(request).await
    }

    async fn register(&self, credentials: &RegisterCredentials) -> Result<Value, TransportError> {
        let request = self
            .http
            .post(self.endpoint("users/register"))
            .json(credentials);
        self.send(request).await
    }

    async fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<Value, TransportError> {
        let request = self
            .http
            .put(self.endpoint("users/change-password"))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "currentPassword": current_password,
                "newPassword": new_password,
            }));
        self.send(request).await
    }

    async fn delete_account(&self, token: &str, user_id: &str) -> Result<Value, TransportError> {
        let request = self
            .http
            .delete(self.user_url(user_id))
            .bearer_auth(token);
        self.send(request).await
    }
}
