//! View-owned stores
//!
//! Both stores run the same pipeline: the reconciler decides whether a request is needed,
//! the session gate and the fetch guard decide when it may start, the retry controller runs
//! it, and the reconciler decides whether the result may be committed.

use crate::{
    error::AppError,
    services::{FetchGuard, FetchPermit, Rejection, ResourceKey, Scope},
};

pub mod collection;
pub mod panel;

pub use collection::{CollectionPage, CollectionSnapshot, PageSource, PaginatedCollection};
pub use panel::{Panel, PanelSnapshot, Resource};

/// Result of asking a store to load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// New data was committed to the store
    Committed,
    /// Nothing needed fetching (same key already loaded or loading, or no more pages)
    Unchanged,
    /// A newer request took over; this result was dropped
    Superseded,
    /// The resource needs a signed-in user
    AwaitingAuth,
    /// The view is gone; the result was dropped
    Unmounted,
    Failed(AppError),
}

impl LoadOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, LoadOutcome::Committed)
    }

    pub(crate) fn discarded(mounted: bool) -> Self {
        if mounted {
            LoadOutcome::Superseded
        } else {
            LoadOutcome::Unmounted
        }
    }
}

/// Waits for the session to settle, then for the key to be free
pub(crate) async fn admit(guard: &FetchGuard, key: &ResourceKey) -> Result<FetchPermit, LoadOutcome> {
    let session = guard.session().ready().await;
    if key.scope() == Scope::User && session.user.is_none() {
        tracing::debug!(key = %key, "Waiting for a signed-in user");
        return Err(LoadOutcome::AwaitingAuth);
    }

    guard.admit_or_wait(key).await.map_err(|rejection| {
        tracing::debug!(key = %key, reason = %rejection, "Fetch not admitted");
        match rejection {
            Rejection::InFlight => LoadOutcome::Unchanged,
            Rejection::AuthPending | Rejection::NoUser => LoadOutcome::AwaitingAuth,
        }
    })
}
