use serde::{Deserialize, Serialize};

/// Coarse classification of an [`AuthError`], stable across transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed fields (local validation or HTTP 400).
    Validation,
    /// Bad credentials or an expired token (HTTP 401).
    Authentication,
    /// Account already exists (HTTP 409).
    Conflict,
    /// Any other non-success status, including 5xx.
    Server,
    /// The request exceeded its deadline.
    Timeout,
    /// No response was received.
    Network,
    /// Success status, but no user-bearing object in the body.
    UnknownResponseShape,
    /// The persisted envelope could not be decoded.
    CorruptSession,
    /// The durable store rejected a read or write.
    Storage,
    /// An account operation was attempted without a session.
    NotAuthenticated,
}

/// A classified session error. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Authentication { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("Connection timed out. Check your internet connection")]
    Timeout,

    #[error("Connection error. Check your internet connection")]
    Network { detail: String },

    #[error("Unrecognized response structure from server")]
    UnknownResponseShape,

    #[error("Stored session is unreadable: {reason}")]
    CorruptSession { reason: String },

    #[error("Could not access the session on this device: {message}")]
    Storage { message: String },

    #[error("You need to sign in first")]
    NotAuthenticated,
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Server { .. } => ErrorKind::Server,
            Self::Timeout => ErrorKind::Timeout,
            Self::Network { .. } => ErrorKind::Network,
            Self::UnknownResponseShape => ErrorKind::UnknownResponseShape,
            Self::CorruptSession { .. } => ErrorKind::CorruptSession,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::NotAuthenticated => ErrorKind::NotAuthenticated,
        }
    }

    /// HTTP status behind the error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure inside a [`KeyValueStore`](super::store::KeyValueStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}
