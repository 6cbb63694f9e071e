//! Process-wide authentication session
//!
//! The session starts in a `loading` state and becomes ready once the persisted token has
//! been validated (or found absent). Identity-scoped fetches gate on [`Session::ready`]
//! instead of on timing.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};

use crate::{
    client::MovieApi,
    error::{AppError, AppResult},
    models::{Registration, User},
};

pub mod token_store;

pub use token_store::{MemoryTokenStore, TokenStore};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub token: Option<String>,
    /// True until the initial token has been validated or found absent
    pub loading: bool,
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        !self.loading
    }

    pub fn is_authenticated(&self) -> bool {
        !self.loading && self.user.is_some()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String },
    SignedOut,
    /// The token was rejected by the API; the router should navigate to login
    Unauthenticated,
}

struct SessionInner {
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    /// Last token reported invalid, so a burst of 401s signals only once
    invalidated: Mutex<Option<String>>,
    store: Arc<dyn TokenStore>,
}

/// Cheaply cloneable handle to the shared session
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Creates a loading session seeded with the persisted token
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let token = store.load();
        Self::with_state(
            store,
            SessionState {
                user: None,
                token,
                loading: true,
            },
        )
    }

    /// Ready session without a user
    pub fn anonymous() -> Self {
        Self::with_state(
            Arc::new(MemoryTokenStore::new()),
            SessionState {
                user: None,
                token: None,
                loading: false,
            },
        )
    }

    /// Ready session for an already validated user
    pub fn authenticated(user: User, token: impl Into<String>) -> Self {
        let token = token.into();
        Self::with_state(
            Arc::new(MemoryTokenStore::with_token(token.clone())),
            SessionState {
                user: Some(user),
                token: Some(token),
                loading: false,
            },
        )
    }

    fn with_state(store: Arc<dyn TokenStore>, state: SessionState) -> Self {
        let (state, _) = watch::channel(state);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                state,
                events,
                invalidated: Mutex::new(None),
                store,
            }),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.borrow().token.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Waits until the session has been resolved
    pub async fn ready(&self) -> SessionState {
        let mut rx = self.inner.state.subscribe();
        let state = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            // the sender lives in `inner`, so this only happens during teardown
            Err(_) => self.snapshot(),
        };
        state
    }

    /// Ends the loading phase, keeping whatever token is present
    pub fn finish(&self, user: Option<User>) {
        self.inner.state.send_modify(|state| {
            state.user = user;
            state.loading = false;
        });
    }

    pub fn sign_in(&self, user: User, token: String) {
        self.inner.store.save(&token);
        let user_id = user.id.clone();
        self.inner.state.send_replace(SessionState {
            user: Some(user),
            token: Some(token),
            loading: false,
        });
        tracing::info!(user_id = %user_id, "Signed in");
        let _ = self.inner.events.send(SessionEvent::SignedIn { user_id });
    }

    pub fn sign_out(&self) {
        self.inner.store.clear();
        self.inner.state.send_replace(SessionState {
            user: None,
            token: None,
            loading: false,
        });
        tracing::info!("Signed out");
        let _ = self.inner.events.send(SessionEvent::SignedOut);
    }

    /// Handles a 401 for a request made with `token`
    ///
    /// Clears the session and emits [`SessionEvent::Unauthenticated`] the first time a given
    /// token is reported; later reports for the same token, or for a token that has already
    /// been replaced, are ignored. Returns whether the session was torn down.
    pub fn invalidate(&self, token: &str) -> bool {
        {
            let mut invalidated = self
                .inner
                .invalidated
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if invalidated.as_deref() == Some(token) {
                return false;
            }
            *invalidated = Some(token.to_string());
        }

        let mut cleared = false;
        self.inner.state.send_if_modified(|state| {
            if state.token.as_deref() == Some(token) {
                state.token = None;
                state.user = None;
                state.loading = false;
                cleared = true;
            }
            cleared
        });

        if cleared {
            self.inner.store.clear();
            tracing::warn!("Token rejected by the API, session cleared");
            let _ = self.inner.events.send(SessionEvent::Unauthenticated);
        }
        cleared
    }
}

/// Validates the persisted token and ends the loading phase
///
/// A rejected token leaves an anonymous session. A transport failure also ends loading
/// without a user but keeps the token, so a later `resolve_session` can try again.
pub async fn resolve_session(session: &Session, api: &dyn MovieApi) -> SessionState {
    let state = session.snapshot();
    if state.token.is_none() {
        session.finish(None);
        return session.snapshot();
    }

    match api.current_user().await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "Session restored");
            session.finish(Some(user));
        }
        Err(AppError::Auth(_)) => {
            tracing::info!("Stored token is no longer valid");
            session.finish(None);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not validate stored token");
            session.finish(None);
        }
    }
    session.snapshot()
}

/// Exchanges credentials for a token and signs the session in
pub async fn login(session: &Session, api: &dyn MovieApi, email: &str, password: &str) -> AppResult<User> {
    let grant = api.login(email, password).await?;
    let user = grant.user.clone();
    session.sign_in(grant.user, grant.token);
    Ok(user)
}

/// Creates an account and signs the session in as the new user
///
/// The form is checked locally first; an invalid form makes no request.
pub async fn register(
    session: &Session,
    api: &dyn MovieApi,
    username: &str,
    email: &str,
    password: &str,
) -> AppResult<User> {
    let form = Registration::new(username, email, password)?;
    let grant = api.register(&form).await?;
    let user = grant.user.clone();
    session.sign_in(grant.user, grant.token);
    Ok(user)
}
