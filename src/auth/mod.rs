//! Client-side authentication session.
//!
//! Provides:
//! - Login / registration against the remote identity API
//! - Durable persistence of the session envelope under one storage key
//! - One-shot startup restore of a persisted session
//! - Logout that always ends signed out, even when storage fails
//! - Bearer-authenticated account operations (password change, deletion)
//!
//! ## Design Decisions
//! - State changes only through the pure [`state::reduce`] function over a
//!   closed [`AuthEvent`] enum; the manager publishes each result on a
//!   `tokio::sync::watch` channel.
//! - Transport and persistence sit behind traits ([`IdentityApi`],
//!   [`KeyValueStore`]) so the manager can run against fakes.
//! - Stale resolutions are dropped by a request-generation ticket instead of
//!   racing to the last write.

pub mod client;
pub mod error;
pub mod manager;
pub mod response;
pub mod state;
pub mod store;
pub mod types;

pub use client::{HttpIdentityClient, IdentityApi, TransportError};
pub use error::{AuthError, ErrorKind, StorageError};
pub use manager::SessionManager;
pub use state::{AuthEvent, SessionPhase};
pub use store::{
    FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, SessionStore, DEFAULT_SESSION_KEY,
};
pub use types::{AuthState, LoginCredentials, RegisterCredentials, SessionEnvelope, User};

use std::sync::Arc;

use crate::config::Config;

/// Factory: HTTP identity client + file-backed store from config, restored
/// and ready for consumers.
pub async fn create_session_manager(config: &Config) -> anyhow::Result<SessionManager> {
    let api = HttpIdentityClient::new(&config.api)?;
    let data_dir = config.storage.resolve_data_dir()?;
    tracing::debug!(data_dir = %data_dir.display(), "Opening session storage");

    let backend = Arc::new(FileKeyValueStore::new(data_dir));
    let store = SessionStore::new(backend, config.storage.session_key.clone());
    Ok(SessionManager::start(Arc::new(api), store).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn factory_restores_from_configured_dir() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.api.base_url = "http://127.0.0.1:1/api".into();
        config.storage.data_dir = Some(tmp.path().to_path_buf());

        let envelope = SessionEnvelope {
            user: User {
                id: "1".into(),
                username: "a".into(),
                email: "a@b.com".into(),
                created_at: "t".into(),
                token: None,
            },
            token: Some("jwt1".into()),
            message: "ok".into(),
        };
        SessionStore::new(
            Arc::new(FileKeyValueStore::new(tmp.path())),
            config.storage.session_key.clone(),
        )
        .save(&envelope)
        .await
        .unwrap();

        let manager = create_session_manager(&config).await.unwrap();
        assert_eq!(manager.phase(), SessionPhase::Restored);
        assert_eq!(manager.token().as_deref(), Some("jwt1"));
    }

    #[tokio::test]
    async fn factory_starts_signed_out_with_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = Some(tmp.path().to_path_buf());

        let manager = create_session_manager(&config).await.unwrap();
        assert_eq!(manager.phase(), SessionPhase::Unauthenticated);
    }
}
