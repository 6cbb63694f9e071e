//! Optimistic mutations
//!
//! A mutation is applied to local state before the remote write is issued, then either
//! confirmed with the server's answer or rolled back. Every state touch happens under a
//! short lock that is never held across the remote call.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use crate::{
    error::AppResult,
    services::refresh::{RefreshBus, RefreshSignal},
};

/// A local change that can be confirmed or undone
pub trait OptimisticUpdate<S> {
    /// Whatever is needed to restore the pre-mutation state
    type Undo: Send;
    /// What the remote write returns
    type Confirmed: Send;

    /// Applies the change; an error here aborts before any request is made
    fn apply(&self, state: &mut S) -> AppResult<Self::Undo>;

    fn confirm(&self, state: &mut S, undo: Self::Undo, confirmed: &Self::Confirmed);

    fn rollback(&self, state: &mut S, undo: Self::Undo);

    /// Signal published after a successful confirmation
    fn signal(&self, _confirmed: &Self::Confirmed) -> Option<RefreshSignal> {
        None
    }
}

/// Anything that can lend out its state for a synchronous edit
pub trait StateCell<S> {
    fn with_mut<T>(&self, f: impl FnOnce(&mut S) -> T) -> T;
}

impl<S> StateCell<S> for Mutex<S> {
    fn with_mut<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        let mut state = self.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

/// Applies `update`, awaits `remote`, then confirms or rolls back
///
/// The refresh signal, if any, is published after the state has been confirmed and
/// without waiting for listeners.
pub async fn run_optimistic<S, C, U, F, Fut>(
    cell: &C,
    update: U,
    remote: F,
    bus: Option<&RefreshBus>,
) -> AppResult<U::Confirmed>
where
    C: StateCell<S> + ?Sized,
    U: OptimisticUpdate<S>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<U::Confirmed>>,
{
    let undo = cell.with_mut(|state| update.apply(state))?;

    match remote().await {
        Ok(confirmed) => {
            cell.with_mut(|state| update.confirm(state, undo, &confirmed));
            if let (Some(bus), Some(signal)) = (bus, update.signal(&confirmed)) {
                bus.publish(signal);
            }
            Ok(confirmed)
        }
        Err(e) => {
            cell.with_mut(|state| update.rollback(state, undo));
            tracing::warn!(error = %e, "Remote write failed, optimistic change rolled back");
            Err(e)
        }
    }
}
