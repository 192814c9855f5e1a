//! Session data model: the identity record, the persisted envelope, the
//! credentials submitted to the identity API, and the in-memory auth state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use super::error::AuthError;

/// Minimum password length accepted by registration and password changes.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Minimum username length accepted by registration.
pub const MIN_USERNAME_LEN: usize = 3;

static EMAIL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern is valid")
});

/// An authenticated identity.
///
/// A new login always produces a new `User`; values are never mutated in place
/// while a session is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
    /// Bearer credential. Present only while authenticated; never written
    /// inside the persisted user record (see [`SessionEnvelope`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// The exact record written under the session key:
/// `{ "user": {id, username, email, createdAt}, "token": string|null, "message": string }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub user: User,
    pub token: Option<String>,
    pub message: String,
}

impl SessionEnvelope {
    /// Build the persisted form of a session. The token moves out of the
    /// user record into the envelope's own `token` slot.
    pub fn for_user(user: &User, message: impl Into<String>) -> Self {
        let token = user.token.clone();
        let user = User {
            token: None,
            ..user.clone()
        };
        Self {
            user,
            token,
            message: message.into(),
        }
    }

    /// Rehydrate the in-memory user, reattaching the stored token.
    pub fn into_user(self) -> User {
        User {
            token: self.token,
            ..self.user
        }
    }
}

/// Credentials for `POST /users/login`.
#[derive(Clone, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Reject obviously incomplete input before it reaches the network.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.email.trim().is_empty() || self.password.trim().is_empty() {
            return Err(AuthError::validation("Email and password are required"));
        }
        Ok(())
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Credentials for `POST /users/register`.
#[derive(Clone, Serialize)]
pub struct RegisterCredentials {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterCredentials {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Trimmed username, trimmed lower-cased email. The password is sent as typed.
    pub fn normalized(&self) -> Self {
        Self {
            username: self.username.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            password: self.password.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        let username = self.username.trim();
        let email = self.email.trim();

        if username.is_empty() || email.is_empty() || self.password.is_empty() {
            return Err(AuthError::validation("All fields are required"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if !EMAIL_RE.is_match(email) {
            return Err(AuthError::validation("Please enter a valid email address"));
        }
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(AuthError::validation(format!(
                "Username must be at least {MIN_USERNAME_LEN} characters"
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for RegisterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterCredentials")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Local checks for a password change request.
pub fn validate_password_change(current: &str, new: &str) -> Result<(), AuthError> {
    if current.is_empty() {
        return Err(AuthError::validation("Current password is required"));
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if current == new {
        return Err(AuthError::validation(
            "The new password must be different from the current one",
        ));
    }
    Ok(())
}

/// Authoritative in-memory session state.
///
/// After every settled transition `is_authenticated == user.is_some()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub is_session_restored: bool,
}

impl AuthState {
    /// State at process start, before restore has run.
    pub fn initial() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_loading: true,
            is_session_restored: false,
        }
    }

    pub(crate) fn signed_in(user: User, restored: bool) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
            is_loading: false,
            is_session_restored: restored,
        }
    }

    pub(crate) fn signed_out() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_loading: false,
            is_session_restored: false,
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::ErrorKind;

    fn sample_user(token: Option<&str>) -> User {
        User {
            id: "1".into(),
            username: "a".into(),
            email: "a@b.com".into(),
            created_at: "t".into(),
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn envelope_moves_token_out_of_user() {
        let envelope = SessionEnvelope::for_user(&sample_user(Some("jwt1")), "Login successful");
        assert_eq!(envelope.token.as_deref(), Some("jwt1"));
        assert!(envelope.user.token.is_none());

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "user": {"id": "1", "username": "a", "email": "a@b.com", "createdAt": "t"},
                "token": "jwt1",
                "message": "Login successful",
            })
        );
    }

    #[test]
    fn envelope_without_token_serializes_null() {
        let envelope = SessionEnvelope::for_user(&sample_user(None), "ok");
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json["token"].is_null());
    }

    #[test]
    fn into_user_reattaches_token() {
        let envelope = SessionEnvelope::for_user(&sample_user(Some("jwt1")), "ok");
        assert_eq!(envelope.into_user(), sample_user(Some("jwt1")));
    }

    #[test]
    fn login_requires_both_fields() {
        assert!(LoginCredentials::new("a@b.com", "x").validate().is_ok());
        let err = LoginCredentials::new("  ", "x").validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(LoginCredentials::new("a@b.com", "").validate().is_err());
        let blank_pw = LoginCredentials::new("a@b.com", " \t ").validate().unwrap_err();
        assert_eq!(blank_pw.to_string(), "Email and password are required");
    }

    #[test]
    fn register_validation_messages() {
        let ok = RegisterCredentials::new("alice", "alice@example.com", "secret1");
        assert!(ok.validate().is_ok());

        let missing = RegisterCredentials::new("", "alice@example.com", "secret1");
        assert_eq!(missing.validate().unwrap_err().to_string(), "All fields are required");

        let short_pw = RegisterCredentials::new("alice", "alice@example.com", "abc");
        assert!(short_pw.validate().unwrap_err().to_string().contains("6 characters"));

        let bad_email = RegisterCredentials::new("alice", "alice@example", "secret1");
        assert!(bad_email.validate().unwrap_err().to_string().contains("valid email"));

        let short_name = RegisterCredentials::new("al", "alice@example.com", "secret1");
        assert!(short_name.validate().unwrap_err().to_string().contains("3 characters"));
    }

    #[test]
    fn register_normalizes_username_and_email() {
        let creds = RegisterCredentials::new("  alice ", " Alice@Example.COM ", " pw pw ");
        let normalized = creds.normalized();
        assert_eq!(normalized.username, "alice");
        assert_eq!(normalized.email, "alice@example.com");
        assert_eq!(normalized.password, " pw pw ");
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let login = format!("{:?}", LoginCredentials::new("a@b.com", "hunter22"));
        let register = format!("{:?}", RegisterCredentials::new("a", "a@b.com", "hunter22"));
        assert!(!login.contains("hunter22"));
        assert!(!register.contains("hunter22"));
    }

    #[test]
    fn password_change_rules() {
        assert!(validate_password_change("old-secret", "new-secret").is_ok());
        assert!(validate_password_change("", "new-secret").is_err());
        assert!(validate_password_change("old-secret", "short").is_err());
        let same = validate_password_change("same-secret", "same-secret").unwrap_err();
        assert!(same.to_string().contains("different"));
    }

    #[test]
    fn initial_state_is_loading_and_signed_out() {
        let state = AuthState::default();
        assert!(state.is_loading);
        assert!(!state.is_authenticated);
        assert!(state.user.is_none());
        assert!(!state.is_session_restored);
    }
}
