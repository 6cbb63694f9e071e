//! Page-level compositions of stores
//!
//! A view owns its stores and is dropped (after [`unmount`](MovieBrowser::unmount)) when the
//! page goes away. Everything shared between views lives in [`AppContext`].

use std::sync::Arc;

use crate::{
    client::MovieApi,
    config::Config,
    services::{FetchGuard, RefreshBus, RetryPolicy},
    session::Session,
    store::{Panel, Resource},
};

pub mod movie_details;
pub mod movies;
pub mod my_ratings;
pub mod profile;
pub mod recommendations;
pub mod resources;

pub use movie_details::{DetailSnapshot, MovieDetailView};
pub use movies::MovieBrowser;
pub use my_ratings::{filter_and_sort, MyRatingsView, RatingsFilter, RatingsSort};
pub use profile::ProfileView;
pub use recommendations::RecommendationsView;

/// Process-wide dependencies handed to every view
#[derive(Clone)]
pub struct AppContext {
    pub api: Arc<dyn MovieApi>,
    pub session: Session,
    /// Shared by all views so equal keys are never fetched concurrently
    pub guard: FetchGuard,
    pub bus: RefreshBus,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(api: Arc<dyn MovieApi>, session: Session, config: Config) -> Self {
        Self {
            api,
            guard: FetchGuard::new(session.clone()),
            session,
            bus: RefreshBus::new(),
            config: Arc::new(config),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.config.retry_policy()
    }

    pub(crate) fn panel<R: Resource>(&self, resource: R) -> Panel<R> {
        Panel::new(resource, self.guard.clone(), self.policy())
    }
}
