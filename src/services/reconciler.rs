//! Per-view fetch lifecycle
//!
//! ```text
//! Uninitialized -> WaitingForAuth -> Fetching -> Ready | Error
//! ```
//!
//! Every change of the desired key starts a new generation. Results are only committed
//! when they belong to the current generation and the view is still mounted; anything
//! else is dropped without touching the view.

use crate::{error::AppError, services::resource_key::ResourceKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Uninitialized,
    WaitingForAuth,
    Fetching,
    Ready,
    Error,
}

/// Monotonic request counter of one view
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Accepted,
    /// Superseded by a newer generation, or the view is gone
    Discarded,
}

#[derive(Debug)]
pub struct Reconciler {
    state: ViewState,
    generation: u64,
    desired: Option<ResourceKey>,
    mounted: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            state: ViewState::Uninitialized,
            generation: 0,
            desired: None,
            mounted: true,
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn desired(&self) -> Option<&ResourceKey> {
        self.desired.as_ref()
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.mounted && generation.0 == self.generation
    }

    /// Declares the key the view wants
    ///
    /// Returns the generation to fetch under, or `None` when there is nothing to do: the
    /// view is unmounted, or `force` is false and the same key is already being fetched
    /// or loaded. A forced request for a key that is being fetched supersedes that fetch.
    pub fn request(&mut self, key: ResourceKey, force: bool) -> Option<Generation> {
        if !self.mounted {
            return None;
        }
        if !force && self.desired.as_ref() == Some(&key) {
            match self.state {
                ViewState::Fetching | ViewState::Ready => return None,
                _ => {}
            }
        }

        self.generation += 1;
        self.desired = Some(key);
        self.state = ViewState::WaitingForAuth;
        Some(Generation(self.generation))
    }

    /// WaitingForAuth -> Fetching, once the fetch has been admitted
    pub fn begin(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) || self.state != ViewState::WaitingForAuth {
            return false;
        }
        self.state = ViewState::Fetching;
        true
    }

    pub fn resolve(&mut self, generation: Generation) -> Commit {
        if !self.is_current(generation) || self.state != ViewState::Fetching {
            return Commit::Discarded;
        }
        self.state = ViewState::Ready;
        Commit::Accepted
    }

    /// Fetching -> Error, or back to WaitingForAuth when the session was torn down
    pub fn fail(&mut self, generation: Generation, error: &AppError) -> Commit {
        if !self.is_current(generation) || self.state != ViewState::Fetching {
            return Commit::Discarded;
        }
        self.state = if error.is_auth() {
            ViewState::WaitingForAuth
        } else {
            ViewState::Error
        };
        Commit::Accepted
    }

    /// Ready -> WaitingForAuth, when a follow-up request (next page) hit a 401
    pub fn auth_lost(&mut self) {
        if self.mounted && self.state == ViewState::Ready {
            self.state = ViewState::WaitingForAuth;
        }
    }

    /// Stops honoring any outstanding generation
    pub fn unmount(&mut self) {
        self.mounted = false;
    }
}
