//! Pure session state machine.
//!
//! [`reduce`] is the only way an [`AuthState`] changes; the manager feeds it
//! [`AuthEvent`]s and publishes the result.

use serde::Serialize;

use super::types::{AuthState, User};

/// Everything that can happen to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Startup hydration found a valid envelope.
    RestoreFound(User),
    /// Startup hydration found nothing.
    RestoreNone,
    /// Startup hydration found an undecodable envelope (already deleted).
    RestoreCorrupt,
    LoginStart,
    LoginSuccess(User),
    LoginError,
    RegisterStart,
    RegisterSuccess(User),
    RegisterError,
    Logout,
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RestoreFound(_) => "RESTORE_FOUND",
            Self::RestoreNone => "RESTORE_NONE",
            Self::RestoreCorrupt => "RESTORE_CORRUPT",
            Self::LoginStart => "LOGIN_START",
            Self::LoginSuccess(_) => "LOGIN_SUCCESS",
            Self::LoginError => "LOGIN_ERROR",
            Self::RegisterStart => "REGISTER_START",
            Self::RegisterSuccess(_) => "REGISTER_SUCCESS",
            Self::RegisterError => "REGISTER_ERROR",
            Self::Logout => "LOGOUT",
        }
    }
}

/// `(state, event) -> state`.
///
/// `*_START` keeps the current user so a failed re-login has something to
/// show while busy; `*_ERROR` clears it.
pub fn reduce(state: &AuthState, event: AuthEvent) -> AuthState {
    match event {
        AuthEvent::RestoreFound(user) => AuthState::signed_in(user, true),
        AuthEvent::LoginSuccess(user) | AuthEvent::RegisterSuccess(user) => {
            AuthState::signed_in(user, false)
        }
        AuthEvent::LoginStart | AuthEvent::RegisterStart => AuthState {
            is_loading: true,
            ..state.clone()
        },
        AuthEvent::RestoreNone
        | AuthEvent::RestoreCorrupt
        | AuthEvent::LoginError
        | AuthEvent::RegisterError
        | AuthEvent::Logout => AuthState::signed_out(),
    }
}

/// Named view of an [`AuthState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for the startup restore.
    Initializing,
    /// Signed in from the persisted envelope, no login since.
    Restored,
    Authenticated,
    Unauthenticated,
    /// A login or registration is in flight.
    Busy,
}

impl SessionPhase {
    /// `restore_settled` separates the startup wait from a later busy login;
    /// both look the same in the four state flags.
    pub fn of(state: &AuthState, restore_settled: bool) -> Self {
        if state.is_loading {
            if restore_settled {
                Self::Busy
            } else {
                Self::Initializing
            }
        } else if state.user.is_some() {
            if state.is_session_restored {
                Self::Restored
            } else {
                Self::Authenticated
            }
        } else {
            Self::Unauthenticated
        }
    }
}
