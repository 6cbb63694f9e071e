use std::collections::HashSet;
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::{
    services::resource_key::{ResourceKey, Scope},
    session::Session,
};

/// Why a fetch was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A fetch for the same key is already running
    InFlight,
    /// The session has not been resolved yet
    AuthPending,
    /// The resource needs a signed-in user
    NoUser,
}

impl Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::InFlight => write!(f, "already in flight"),
            Rejection::AuthPending => write!(f, "session still loading"),
            Rejection::NoUser => write!(f, "no signed-in user"),
        }
    }
}

struct GuardInner {
    in_flight: Mutex<HashSet<ResourceKey>>,
    /// Bumped on every release so waiters can re-check
    released: watch::Sender<u64>,
}

/// Admission control over the set of in-flight resource keys
///
/// Shared by every view of the app, so equal keys are serialized process-wide.
#[derive(Clone)]
pub struct FetchGuard {
    inner: Arc<GuardInner>,
    session: Session,
}

impl FetchGuard {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                in_flight: Mutex::new(HashSet::new()),
                released: watch::channel(0).0,
            }),
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Marks `key` in flight, or says why it cannot be
    pub fn admit(&self, key: &ResourceKey) -> Result<FetchPermit, Rejection> {
        let state = self.session.snapshot();
        if state.loading {
            return Err(Rejection::AuthPending);
        }
        if key.scope() == Scope::User && state.user.is_none() {
            return Err(Rejection::NoUser);
        }

        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            tracing::debug!(key = %key, "Fetch rejected, already in flight");
            return Err(Rejection::InFlight);
        }

        tracing::trace!(key = %key, "Fetch admitted");
        Ok(FetchPermit {
            key: key.clone(),
            inner: self.inner.clone(),
        })
    }

    /// Like [`admit`](Self::admit), but queues behind a running fetch for the same key
    /// instead of rejecting
    pub async fn admit_or_wait(&self, key: &ResourceKey) -> Result<FetchPermit, Rejection> {
        loop {
            // subscribe before checking so a release in between is not missed
            let mut released = self.inner.released.subscribe();
            match self.admit(key) {
                Err(Rejection::InFlight) => {
                    if released.changed().await.is_err() {
                        return Err(Rejection::InFlight);
                    }
                }
                other => return other,
            }
        }
    }

    pub fn is_in_flight(&self, key: &ResourceKey) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Proof of admission; the key is released when this is dropped
///
/// Dropping covers every exit path of the fetch, including errors, panics and the
/// enclosing future being cancelled.
pub struct FetchPermit {
    key: ResourceKey,
    inner: Arc<GuardInner>,
}

impl FetchPermit {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

impl Drop for FetchPermit {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        self.inner.released.send_modify(|n| *n = n.wrapping_add(1));
        tracing::trace!(key = %self.key, "Fetch released");
    }
}
