use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::{
    models::{AlgorithmType, Movie, RatingStats, RecommendationSet},
    store::{LoadOutcome, Panel, PanelSnapshot},
    views::{
        resources::{
            NewReleasesResource, PopularResource, RatingStatsResource, RecommendationsResource,
        },
        AppContext,
    },
};

/// The home page: personal recommendations, the user's rating stats, and the popular and
/// new-release rows
///
/// Personal recommendations and stats are re-fetched whenever a rating change is signalled
/// on the refresh bus. Must be created inside a tokio runtime.
pub struct RecommendationsView {
    personal: Arc<Panel<RecommendationsResource>>,
    stats: Arc<Panel<RatingStatsResource>>,
    popular: Panel<PopularResource>,
    new_releases: Panel<NewReleasesResource>,
    algorithm: Mutex<AlgorithmType>,
    listener: JoinHandle<()>,
}

impl RecommendationsView {
    pub fn new(ctx: &AppContext) -> Self {
        let config = &ctx.config;
        let personal = Arc::new(ctx.panel(RecommendationsResource::new(
            ctx.api.clone(),
            config.recommendation_limit,
        )));

        let stats = Arc::new(ctx.panel(RatingStatsResource::new(ctx.api.clone())));

        let listener = {
            let personal = personal.clone();
            let stats = stats.clone();
            ctx.bus.listen(move |signal| {
                let personal = personal.clone();
                let stats = stats.clone();
                async move {
                    tracing::debug!(?signal, "Refreshing personal recommendations");
                    tokio::join!(personal.refresh(), stats.refresh());
                }
            })
        };

        Self {
            personal,
            stats,
            popular: ctx.panel(PopularResource::new(ctx.api.clone(), config.popular_limit)),
            new_releases: ctx.panel(NewReleasesResource::new(
                ctx.api.clone(),
                config.new_releases_limit,
            )),
            algorithm: Mutex::new(AlgorithmType::default()),
            listener,
        }
    }

    /// Loads every row concurrently; returns the personal row's outcome
    pub async fn mount(&self) -> LoadOutcome {
        let (personal, stats, popular, new_releases) = tokio::join!(
            self.personal.load(self.algorithm()),
            self.stats.load(()),
            self.popular.load(None),
            self.new_releases.load(())
        );
        for (row, outcome) in [
            ("stats", stats),
            ("popular", popular),
            ("new_releases", new_releases),
        ] {
            if let LoadOutcome::Failed(e) = outcome {
                tracing::warn!(row, error = %e, "Row unavailable");
            }
        }
        personal
    }

    /// Switches the personal row; results of the previous algorithm are discarded
    pub async fn set_algorithm(&self, algorithm: AlgorithmType) -> LoadOutcome {
        *self.algorithm.lock().unwrap_or_else(PoisonError::into_inner) = algorithm;
        self.personal.load(algorithm).await
    }

    pub fn algorithm(&self) -> AlgorithmType {
        *self.algorithm.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retries every row whose last fetch failed; returns the personal row's outcome
    pub async fn retry(&self) -> LoadOutcome {
        let (personal, stats, popular, new_releases) = tokio::join!(
            self.personal.retry_if_failed(),
            self.stats.retry_if_failed(),
            self.popular.retry_if_failed(),
            self.new_releases.retry_if_failed()
        );
        for (row, outcome) in [
            ("stats", stats),
            ("popular", popular),
            ("new_releases", new_releases),
        ] {
            if let LoadOutcome::Failed(e) = outcome {
                tracing::warn!(row, error = %e, "Row unavailable");
            }
        }
        personal
    }

    pub fn personal(&self) -> PanelSnapshot<RecommendationSet> {
        self.personal.snapshot()
    }

    pub fn stats(&self) -> PanelSnapshot<RatingStats> {
        self.stats.snapshot()
    }

    pub fn popular(&self) -> PanelSnapshot<Vec<Movie>> {
        self.popular.snapshot()
    }

    pub fn new_releases(&self) -> PanelSnapshot<Vec<Movie>> {
        self.new_releases.snapshot()
    }

    pub fn unmount(&self) {
        self.listener.abort();
        self.personal.unmount();
        self.stats.unmount();
        self.popular.unmount();
        self.new_releases.unmount();
    }
}

impl Drop for RecommendationsView {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
