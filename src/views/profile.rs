//! The account page: profile activity and rating statistics

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    models::{RatingStats, UserProfile},
    store::{LoadOutcome, Panel, PanelSnapshot},
    views::{
        resources::{ProfileResource, RatingStatsResource},
        AppContext,
    },
};

/// Both panels are re-fetched when a rating change is signalled
pub struct ProfileView {
    profile: Arc<Panel<ProfileResource>>,
    stats: Arc<Panel<RatingStatsResource>>,
    listener: JoinHandle<()>,
}

impl ProfileView {
    /// Must be created inside a tokio runtime
    pub fn new(ctx: &AppContext) -> Self {
        let profile = Arc::new(ctx.panel(ProfileResource::new(ctx.api.clone())));
        let stats = Arc::new(ctx.panel(RatingStatsResource::new(ctx.api.clone())));

        let listener = {
            let profile = profile.clone();
            let stats = stats.clone();
            ctx.bus.listen(move |signal| {
                let profile = profile.clone();
                let stats = stats.clone();
                async move {
                    tracing::debug!(?signal, "Refreshing profile");
                    tokio::join!(profile.refresh(), stats.refresh());
                }
            })
        };

        Self {
            profile,
            stats,
            listener,
        }
    }

    /// Returns the statistics outcome; the activity lists are best effort
    pub async fn mount(&self) -> LoadOutcome {
        let (profile, stats) = tokio::join!(self.profile.load(()), self.stats.load(()));
        if let LoadOutcome::Failed(e) = profile {
            tracing::warn!(error = %e, "Profile activity unavailable");
        }
        stats
    }

    pub async fn retry(&self) -> LoadOutcome {
        let (_, stats) = tokio::join!(
            self.profile.retry_if_failed(),
            self.stats.retry_if_failed()
        );
        stats
    }

    pub fn profile(&self) -> PanelSnapshot<UserProfile> {
        self.profile.snapshot()
    }

    pub fn stats(&self) -> PanelSnapshot<RatingStats> {
        self.stats.snapshot()
    }

    pub fn unmount(&self) {
        self.listener.abort();
        self.profile.unmount();
        self.stats.unmount();
    }
}

impl Drop for ProfileView {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
