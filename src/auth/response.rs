//! Identity API response normalization.
//!
//! The API has returned the user under `user`, under `data`, or flattened
//! into the top-level object. Those three shapes are tried in that order and
//! nothing else is guessed.

use serde_json::Value;

use super::error::AuthError;
use super::types::User;

/// A successful login/registration, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSession {
    /// Carries the bearer token, if the API sent one.
    pub user: User,
    pub message: String,
}

type ShapeProbe = fn(&Value) -> Option<&Value>;

/// Extraction strategies in priority order.
const USER_SHAPES: [(&str, ShapeProbe); 3] = [
    ("user", under_user),
    ("data", under_data),
    ("top_level", top_level),
];

fn under_user(body: &Value) -> Option<&Value> {
    body.get("user").filter(|v| v.is_object())
}

fn under_data(body: &Value) -> Option<&Value> {
    body.get("data").filter(|v| v.is_object())
}

fn top_level(body: &Value) -> Option<&Value> {
    let looks_like_user = ["_id", "id", "username"]
        .iter()
        .any(|key| body.get(key).is_some_and(|v| !v.is_null()));
    looks_like_user.then_some(body)
}

/// Locate the user object and normalize it into a session.
///
/// `submitted_email` fills in a missing `email`; `default_message` fills in a
/// missing `message`.
pub fn extract_session(
    body: &Value,
    submitted_email: &str,
    default_message: &str,
) -> Result<ExtractedSession, AuthError> {
    let Some((shape, raw_user)) = USER_SHAPES
        .iter()
        .find_map(|(name, probe)| probe(body).map(|raw| (*name, raw)))
    else {
        tracing::warn!("Identity API response carried no user object");
        return Err(AuthError::UnknownResponseShape);
    };

    let Some(id) = identifier(raw_user) else {
        tracing::warn!(shape, "Identity API user object has no id");
        return Err(AuthError::UnknownResponseShape);
    };
    tracing::debug!(shape, user_id = %id, "Extracted user from identity response");

    let email = non_empty_str(raw_user, "email")
        .map(str::to_string)
        .unwrap_or_else(|| submitted_email.trim().to_string());
    let username = non_empty_str(raw_user, "username")
        .map(str::to_string)
        .or_else(|| {
            email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "user".to_string());
    let created_at = non_empty_str(raw_user, "createdAt")
        .map(str::to_string)
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
    let token = non_empty_str(body, "token")
        .or_else(|| non_empty_str(raw_user, "token"))
        .map(str::to_string);

    Ok(ExtractedSession {
        user: User {
            id,
            username,
            email,
            created_at,
            token,
        },
        message: server_message(body).unwrap_or_else(|| default_message.to_string()),
    })
}

/// Human message a server put in `message` (preferred) or `error`.
pub fn server_message(body: &Value) -> Option<String> {
    non_empty_str(body, "message")
        .or_else(|| non_empty_str(body, "error"))
        .map(str::to_string)
}

fn identifier(raw: &Value) -> Option<String> {
    ["_id", "id"].iter().find_map(|key| match raw.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_key_wins_over_data_and_top_level() {
        let body = json!({
            "id": "top",
            "user": {"id": "from-user", "username": "u", "email": "u@x.io", "createdAt": "t"},
            "data": {"id": "from-data"},
            "token": "jwt1",
        });
        let session = extract_session(&body, "u@x.io", "Login successful").unwrap();
        assert_eq!(session.user.id, "from-user");
        assert_eq!(session.user.token.as_deref(), Some("jwt1"));
        assert_eq!(session.message, "Login successful");
    }

    #[test]
    fn data_key_used_when_user_missing() {
        let body = json!({
            "data": {"_id": "abc", "username": "d", "email": "d@x.io", "createdAt": "t"},
            "message": "Welcome",
        });
        let session = extract_session(&body, "d@x.io", "Login successful").unwrap();
        assert_eq!(session.user.id, "abc");
        assert_eq!(session.message, "Welcome");
        assert!(session.user.token.is_none());
    }

    #[test]
    fn top_level_used_when_body_is_the_user() {
        let body = json!({"id": 42, "username": "t", "email": "t@x.io", "createdAt": "t", "token": "jwt"});
        let session = extract_session(&body, "t@x.io", "ok").unwrap();
        assert_eq!(session.user.id, "42");
        assert_eq!(session.user.token.as_deref(), Some("jwt"));
    }

    #[test]
    fn unknown_shape_is_classified() {
        for body in [json!({"status": "ok"}), json!(null), json!("text"), json!({"user": "alice"})] {
            let err = extract_session(&body, "a@b.com", "ok").unwrap_err();
            assert_eq!(err, AuthError::UnknownResponseShape);
        }
    }

    #[test]
    fn user_without_id_is_unknown_shape() {
        let body = json!({"user": {"username": "noid"}});
        assert_eq!(
            extract_session(&body, "a@b.com", "ok").unwrap_err(),
            AuthError::UnknownResponseShape
        );
    }

    #[test]
    fn missing_fields_fall_back() {
        let body = json!({"user": {"_id": "7"}});
        let session = extract_session(&body, " maria@example.com ", "ok").unwrap();
        assert_eq!(session.user.email, "maria@example.com");
        assert_eq!(session.user.username, "maria");
        assert!(chrono::DateTime::parse_from_rfc3339(&session.user.created_at).is_ok());
    }

    #[test]
    fn token_inside_user_object_is_accepted() {
        let body = json!({"user": {"id": "1", "token": "inner"}});
        let session = extract_session(&body, "a@b.com", "ok").unwrap();
        assert_eq!(session.user.token.as_deref(), Some("inner"));
    }

    #[test]
    fn server_message_prefers_message_over_error() {
        assert_eq!(
            server_message(&json!({"message": "m", "error": "e"})).as_deref(),
            Some("m")
        );
        assert_eq!(server_message(&json!({"error": "e"})).as_deref(), Some("e"));
        assert_eq!(server_message(&json!({"message": "  "})), None);
    }
}
