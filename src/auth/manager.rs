//! Session manager: drives the [`reduce`] state machine against the identity
//! API and the [`SessionStore`].
//!
//! ## Ordering
//! Every `login`, `register`, `logout` and `restore` takes a ticket from a
//! monotonically increasing generation counter. When a call resolves after a
//! newer call has started, its result is returned to its own caller but is
//! not persisted and does not transition the state. Persisting and the final
//! transition run under one commit lock, so an older login can never write
//! its envelope after a newer logout has cleared the slot.
//!
//! ## Durability
//! `LOGIN_SUCCESS` / `REGISTER_SUCCESS` are dispatched only after the
//! envelope write is acknowledged. A failed write ends in `*_ERROR` and the
//! call rejects with a `Storage` error.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{watch, Mutex};

use super::client::{classify, IdentityApi, Operation, TransportError};
use super::error::AuthError;
use super::response::{extract_session, server_message, ExtractedSession};
use super::state::{reduce, AuthEvent, SessionPhase};
use super::store::SessionStore;
use super::types::{
    validate_password_change, AuthState, LoginCredentials, RegisterCredentials, SessionEnvelope,
    User,
};

/// Login and registration share one flow; this picks the events and texts.
#[derive(Debug, Clone, Copy)]
enum Flow {
    Login,
    Register,
}

impl Flow {
    fn start(self) -> AuthEvent {
        match self {
            Self::Login => AuthEvent::LoginStart,
            Self::Register => AuthEvent::RegisterStart,
        }
    }

    fn success(self, user: User) -> AuthEvent {
        match self {
            Self::Login => AuthEvent::LoginSuccess(user),
            Self::Register => AuthEvent::RegisterSuccess(user),
        }
    }

    fn error(self) -> AuthEvent {
        match self {
            Self::Login => AuthEvent::LoginError,
            Self::Register => AuthEvent::RegisterError,
        }
    }

    fn operation(self) -> Operation {
        match self {
            Self::Login => Operation::Login,
            Self::Register => Operation::Register,
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            Self::Login => "Login successful",
            Self::Register => "Registration successful",
        }
    }
}

/// Settles a login/register whose future was dropped before it committed.
///
/// A cancelled call (timeout, `select!`, aborted task) must not leave the
/// state loading.
struct PendingFlow<'a> {
    manager: &'a SessionManager,
    flow: Flow,
    ticket: u64,
    armed: bool,
}

impl Drop for PendingFlow<'_> {
    fn drop(&mut self) {
        if self.armed && self.manager.is_current(self.ticket) {
            tracing::warn!(
                ticket = self.ticket,
                flow = ?self.flow,
                "Authentication cancelled before it settled"
            );
            self.manager.dispatch(self.flow.error());
        }
    }
}

/// Owns the authoritative [`AuthState`] for one process.
///
/// Construct one and share it (`Arc<SessionManager>`) with every consumer;
/// there is no global instance.
pub struct SessionManager {
    api: Arc<dyn IdentityApi>,
    store: SessionStore,
    state: watch::Sender<AuthState>,
    generation: AtomicU64,
    commit: Mutex<()>,
    restore_started: AtomicBool,
    restore_settled: AtomicBool,
}

impl SessionManager {
    /// A manager in the `Initializing` phase. Call [`restore`](Self::restore)
    /// before handing it to consumers, or use [`start`](Self::start).
    pub fn new(api: Arc<dyn IdentityApi>, store: SessionStore) -> Self {
        let (state, _) = watch::channel(AuthState::initial());
        Self {
            api,
            store,
            state,
            generation: AtomicU64::new(0),
            commit: Mutex::new(()),
            restore_started: AtomicBool::new(false),
            restore_settled: AtomicBool::new(false),
        }
    }

    /// Construct and run the startup restore.
    pub async fn start(api: Arc<dyn IdentityApi>, store: SessionStore) -> Self {
        let manager = Self::new(api, store);
        manager.restore().await;
        manager
    }

    // ── Observation ─────────────────────────────────────────────────

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn is_session_restored(&self) -> bool {
        self.state.borrow().is_session_restored
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::of(
            &self.state.borrow(),
            self.restore_settled.load(Ordering::SeqCst),
        )
    }

    /// Receives every transition, starting from the current state.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Bearer credential of the current session.
    pub fn token(&self) -> Option<String> {
        self.state
            .borrow()
            .user
            .as_ref()
            .and_then(|user| user.token.clone())
    }

    /// `Authorization` header value for downstream API calls.
    pub fn authorization_header(&self) -> Option<String> {
        self.token().map(|token| format!("Bearer {token}"))
    }

    // ── Session operations ──────────────────────────────────────────

    /// Hydrate from the persisted envelope. Runs once; later calls are no-ops.
    pub async fn restore(&self) {
        if self.restore_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Session restore already ran; skipping");
            return;
        }
        let ticket = self.next_ticket();
        let loaded = self.store.load().await;

        {
            let _commit = self.commit.lock().await;
            if self.is_current(ticket) {
                let event = match loaded {
                    Ok(Some(envelope)) => {
                        tracing::info!(user_id = %envelope.user.id, "Restoring session from storage");
                        AuthEvent::RestoreFound(envelope.into_user())
                    }
                    Ok(None) => {
                        tracing::info!("No stored session");
                        AuthEvent::RestoreNone
                    }
                    Err(AuthError::CorruptSession { reason }) => {
                        tracing::warn!("Stored session is corrupt, discarding it: {reason}");
                        if let Err(e) = self.store.clear().await {
                            tracing::warn!("Failed to delete corrupt session: {e}");
                        }
                        AuthEvent::RestoreCorrupt
                    }
                    Err(e) => {
                        tracing::warn!("Could not read stored session: {e}");
                        AuthEvent::RestoreNone
                    }
                };
                self.dispatch(event);
            } else {
                tracing::debug!(ticket, "Restore superseded by a newer session operation");
            }
        }

        self.restore_settled.store(true, Ordering::SeqCst);
    }

    /// Authenticate against `POST /users/login` and persist the session.
    ///
    /// If a newer `login`, `register` or `logout` starts before this call
    /// resolves, the server's answer is still returned here but neither
    /// persisted nor applied. Read [`state`](Self::state) or
    /// [`subscribe`](Self::subscribe) for who is signed in, not `Ok`.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<(), AuthError> {
        credentials.validate()?;
        tracing::info!("Logging in");
        self.authenticate(Flow::Login, &credentials.email, self.api.login(credentials))
            .await
    }

    /// Create an account via `POST /users/register` and sign into it.
    ///
    /// Superseded calls behave as in [`login`](Self::login).
    pub async fn register(&self, credentials: &RegisterCredentials) -> Result<(), AuthError> {
        let credentials = credentials.normalized();
        credentials.validate()?;
        tracing::info!(username = %credentials.username, "Registering account");
        self.authenticate(
            Flow::Register,
            &credentials.email,
            self.api.register(&credentials),
        )
        .await
    }

    /// Clear the stored envelope and sign out. Never fails: a storage error
    /// is logged and the state still ends `Unauthenticated`.
    pub async fn logout(&self) {
        let ticket = self.next_ticket();
        let _commit = self.commit.lock().await;

        match self.store.clear().await {
            Ok(()) => tracing::info!(ticket, "Session data removed from storage"),
            Err(e) => tracing::warn!("Failed to remove stored session during logout: {e}"),
        }
        self.dispatch(AuthEvent::Logout);
    }

    /// `PUT /users/change-password` for the signed-in user. Returns the
    /// server's confirmation message. The session itself is untouched.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<String, AuthError> {
        let token = self.token().ok_or(AuthError::NotAuthenticated)?;
        validate_password_change(current_password, new_password)?;

        let body = self
            .api
            .change_password(&token, current_password, new_password)
            .await
            .map_err(|e| classify(Operation::ChangePassword, e))?;
        tracing::info!("Password changed");
        Ok(server_message(&body).unwrap_or_else(|| "Password changed successfully".into()))
    }

    /// `DELETE /users/{id}` for the signed-in user, then log out. On failure
    /// the session is kept.
    pub async fn delete_account(&self) -> Result<String, AuthError> {
        let user = self.user().ok_or(AuthError::NotAuthenticated)?;
        let token = user.token.clone().ok_or(AuthError::NotAuthenticated)?;

        let body = self
            .api
            .delete_account(&token, &user.id)
            .await
            .map_err(|e| classify(Operation::DeleteAccount, e))?;
        tracing::info!(user_id = %user.id, "Account deleted");

        self.logout().await;
        Ok(server_message(&body).unwrap_or_else(|| "Account deleted successfully".into()))
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn authenticate<F>(
        &self,
        flow: Flow,
        submitted_email: &str,
        call: F,
    ) -> Result<(), AuthError>
    where
        F: Future<Output = Result<Value, TransportError>>,
    {
        let ticket = self.next_ticket();
        self.dispatch(flow.start());
        let mut pending = PendingFlow {
            manager: self,
            flow,
            ticket,
            armed: true,
        };

        let outcome = match call.await {
            Ok(body) => extract_session(&body, submitted_email, flow.default_message()),
            Err(e) => Err(classify(flow.operation(), e)),
        };

        let result = self.settle(flow, ticket, outcome).await;
        pending.armed = false;
        result
    }

    /// Persist and transition for a resolved login/register, under the
    /// commit lock. No `.await` follows the final dispatch.
    async fn settle(
        &self,
        flow: Flow,
        ticket: u64,
        outcome: Result<ExtractedSession, AuthError>,
    ) -> Result<(), AuthError> {
        let _commit = self.commit.lock().await;
        if !self.is_current(ticket) {
            tracing::debug!(ticket, ?flow, "Discarding superseded resolution");
            return outcome.map(|_| ());
        }

        let session = match outcome {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(?flow, kind = ?e.kind(), "Authentication failed: {e}");
                self.dispatch(flow.error());
                return Err(e);
            }
        };

        let envelope = SessionEnvelope::for_user(&session.user, session.message);
        if let Err(e) = self.store.save(&envelope).await {
            tracing::warn!(?flow, "Failed to persist session: {e}");
            self.dispatch(flow.error());
            return Err(e);
        }

        tracing::info!(?flow, user_id = %session.user.id, "Authenticated");
        self.dispatch(flow.success(session.user));
        Ok(())
    }

    fn next_ticket(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    fn dispatch(&self, event: AuthEvent) {
        let name = event.name();
        self.state.send_modify(|state| *state = reduce(state, event));
        tracing::debug!(event = name, "Auth state transition");
    }
}
