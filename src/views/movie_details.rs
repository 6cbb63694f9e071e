use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{Movie, MovieDetails, MovieId, UserRating},
    services::{MovieCard, RatingEngine, RatingSlot},
    session::Session,
    store::{LoadOutcome, Panel, PanelSnapshot},
    views::{
        resources::{MovieDetailsResource, RatingCheckResource, SimilarMoviesResource},
        AppContext,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct DetailSnapshot {
    pub details: PanelSnapshot<MovieDetails>,
    pub similar: PanelSnapshot<Vec<Movie>>,
    pub rating: RatingSlot,
    /// Aggregate to display; tracks optimistic rating changes
    pub card: Option<MovieCard>,
}

/// The detail page of one movie
pub struct MovieDetailView {
    id: MovieId,
    session: Session,
    details: Panel<MovieDetailsResource>,
    similar: Panel<SimilarMoviesResource>,
    rating_check: Panel<RatingCheckResource>,
    ratings: Arc<RatingEngine>,
}

impl MovieDetailView {
    /// Fails without any request when `raw_id` is not a usable movie id
    pub fn open(ctx: &AppContext, raw_id: &str) -> AppResult<Self> {
        let id = MovieId::parse(raw_id)?;
        let ratings = Arc::new(RatingEngine::new(ctx.api.clone(), ctx.bus.clone()));
        Ok(Self {
            id,
            session: ctx.session.clone(),
            details: ctx.panel(MovieDetailsResource::new(ctx.api.clone())),
            similar: ctx.panel(SimilarMoviesResource::new(
                ctx.api.clone(),
                ctx.config.similar_limit,
            )),
            rating_check: ctx.panel(RatingCheckResource::new(ratings.clone())),
            ratings,
        })
    }

    pub fn id(&self) -> &MovieId {
        &self.id
    }

    /// Loads details and similar movies, then the user's rating when signed in
    ///
    /// Returns the outcome of the details load; similar movies are best effort.
    pub async fn load(&self) -> LoadOutcome {
        let (details, similar) = tokio::join!(
            self.details.load(self.id.clone()),
            self.similar.load(self.id.clone())
        );
        if let LoadOutcome::Failed(e) = &similar {
            tracing::warn!(movie_id = %self.id, error = %e, "Similar movies unavailable");
        }
        self.after_details(&details).await;
        details
    }

    /// Retries every part of the page whose last fetch failed
    pub async fn retry(&self) -> LoadOutcome {
        let (details, similar) = tokio::join!(
            self.details.retry_if_failed(),
            self.similar.retry_if_failed()
        );
        if let LoadOutcome::Failed(e) = &similar {
            tracing::warn!(movie_id = %self.id, error = %e, "Similar movies unavailable");
        }
        self.after_details(&details).await;
        details
    }

    async fn after_details(&self, outcome: &LoadOutcome) {
        let Some(details) = self.details.data() else {
            return;
        };
        if outcome.is_committed() {
            self.ratings.show_card(&details.movie);
        }

        // anonymous sessions stop at the panel's auth gate
        match self.rating_check.load(self.id.clone()).await {
            LoadOutcome::Committed => {
                if let Some(check) = self.rating_check.data() {
                    self.ratings.record_check(&self.id, check);
                }
            }
            LoadOutcome::Failed(e) => {
                tracing::warn!(movie_id = %self.id, error = %e, "Rating check failed");
            }
            _ => {}
        }
    }

    pub async fn rate(&self, value: f64, review: &str) -> AppResult<UserRating> {
        self.require_user()?;
        self.ratings.submit_rating(&self.id, value, review).await
    }

    pub async fn delete_rating(&self) -> AppResult<()> {
        self.require_user()?;
        self.ratings.delete_rating(&self.id).await
    }

    fn require_user(&self) -> AppResult<()> {
        if self.session.snapshot().is_authenticated() {
            Ok(())
        } else {
            Err(AppError::Validation("Please log in to rate movies".to_string()))
        }
    }

    pub fn snapshot(&self) -> DetailSnapshot {
        DetailSnapshot {
            details: self.details.snapshot(),
            similar: self.similar.snapshot(),
            rating: self.ratings.slot(&self.id),
            card: self.ratings.card(&self.id),
        }
    }

    pub fn unmount(&self) {
        self.details.unmount();
        self.similar.unmount();
        self.rating_check.unmount();
        self.ratings.hide_card(&self.id);
    }
}
