//! Authentication session manager for the sensor dashboard client.
//!
//! Owns the signed-in user across restarts: login and registration against
//! the identity API, the persisted session envelope, startup restore and
//! logout. See [`auth::SessionManager`].

pub mod auth;
pub mod config;

pub use auth::{
    create_session_manager, AuthError, AuthState, ErrorKind, LoginCredentials,
    RegisterCredentials, SessionManager, SessionPhase, User,
};
pub use config::Config;
