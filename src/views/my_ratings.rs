//! The user's own ratings with local filtering and optimistic removal

use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::{
    client::MovieApi,
    error::{AppError, AppResult},
    models::{MovieId, RatedMovie, RatingStats},
    services::{run_optimistic, OptimisticUpdate, RefreshBus, RefreshSignal},
    store::{CollectionSnapshot, LoadOutcome, PaginatedCollection, Panel, PanelSnapshot},
    views::{
        resources::{MyRatingPages, RatingStatsResource},
        AppContext,
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RatingsSort {
    #[default]
    Newest,
    Oldest,
    Highest,
    Lowest,
    Title,
    Year,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RatingsFilter {
    pub sort: RatingsSort,
    /// Case-insensitive title substring
    pub search: String,
    /// Star bucket: a rating of 3.5 is in bucket 3
    pub stars: Option<u8>,
}

impl RatingsFilter {
    fn matches(&self, entry: &RatedMovie) -> bool {
        let term = self.search.trim().to_lowercase();
        if !term.is_empty() && !entry.movie_title.to_lowercase().contains(&term) {
            return false;
        }
        match self.stars {
            Some(stars) => entry.rating.value.floor() as u8 == stars,
            None => true,
        }
    }
}

/// Options sort last in both directions
fn cmp_present<T: Ord>(a: Option<T>, b: Option<T>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Applies the local filter and ordering; the sort is stable
pub fn filter_and_sort(entries: &[RatedMovie], filter: &RatingsFilter) -> Vec<RatedMovie> {
    let mut visible: Vec<RatedMovie> = entries
        .iter()
        .filter(|entry| filter.matches(entry))
        .cloned()
        .collect();

    visible.sort_by(|a, b| match filter.sort {
        RatingsSort::Newest => cmp_present(a.rating.timestamp, b.rating.timestamp, true),
        RatingsSort::Oldest => cmp_present(a.rating.timestamp, b.rating.timestamp, false),
        RatingsSort::Highest => b.rating.value.total_cmp(&a.rating.value),
        RatingsSort::Lowest => a.rating.value.total_cmp(&b.rating.value),
        RatingsSort::Title => a
            .movie_title
            .to_lowercase()
            .cmp(&b.movie_title.to_lowercase()),
        RatingsSort::Year => cmp_present(a.movie_year, b.movie_year, true),
    });
    visible
}

/// Removes one entry from the listing until the delete is confirmed
struct RemoveEntry {
    movie_id: MovieId,
}

impl OptimisticUpdate<Vec<RatedMovie>> for RemoveEntry {
    type Undo = (usize, RatedMovie);
    type Confirmed = ();

    fn apply(&self, entries: &mut Vec<RatedMovie>) -> AppResult<Self::Undo> {
        let index = entries
            .iter()
            .position(|entry| entry.movie_id == self.movie_id)
            .ok_or_else(|| {
                AppError::Validation(format!("No rating for movie {} to delete", self.movie_id))
            })?;
        Ok((index, entries.remove(index)))
    }

    fn confirm(&self, _entries: &mut Vec<RatedMovie>, _undo: Self::Undo, _confirmed: &()) {}

    fn rollback(&self, entries: &mut Vec<RatedMovie>, (index, entry): Self::Undo) {
        let index = index.min(entries.len());
        entries.insert(index, entry);
    }

    fn signal(&self, _confirmed: &()) -> Option<RefreshSignal> {
        Some(RefreshSignal::RatingsChanged {
            movie_id: self.movie_id.clone(),
        })
    }
}

pub struct MyRatingsView {
    api: Arc<dyn MovieApi>,
    bus: RefreshBus,
    ratings: Arc<PaginatedCollection<MyRatingPages>>,
    stats: Arc<Panel<RatingStatsResource>>,
    filter: Mutex<RatingsFilter>,
    listener: JoinHandle<()>,
}

impl MyRatingsView {
    /// Must be created inside a tokio runtime
    pub fn new(ctx: &AppContext) -> Self {
        let ratings = Arc::new(PaginatedCollection::new(
            MyRatingPages::new(ctx.api.clone()),
            ctx.guard.clone(),
            ctx.policy(),
            ctx.config.page_limit,
            ctx.config.page_limit,
        ));
        let stats = Arc::new(ctx.panel(RatingStatsResource::new(ctx.api.clone())));

        let listener = {
            let ratings = ratings.clone();
            let stats = stats.clone();
            ctx.bus.listen(move |signal| {
                let ratings = ratings.clone();
                let stats = stats.clone();
                async move {
                    tracing::debug!(?signal, "Reloading my ratings");
                    tokio::join!(ratings.reload(), stats.refresh());
                }
            })
        };

        Self {
            api: ctx.api.clone(),
            bus: ctx.bus.clone(),
            ratings,
            stats,
            filter: Mutex::new(RatingsFilter::default()),
            listener,
        }
    }

    pub async fn mount(&self) -> LoadOutcome {
        let (ratings, stats) = tokio::join!(self.ratings.reset_fetch(()), self.stats.load(()));
        if let LoadOutcome::Failed(e) = stats {
            tracing::warn!(error = %e, "Rating stats unavailable");
        }
        ratings
    }

    pub async fn load_more(&self) -> LoadOutcome {
        self.ratings.append_fetch().await
    }

    pub async fn retry(&self) -> LoadOutcome {
        let (ratings, _) = tokio::join!(
            self.ratings.retry_if_failed(),
            self.stats.retry_if_failed()
        );
        ratings
    }

    /// Removes the entry right away and restores it if the server refuses
    pub async fn delete_rating(&self, movie_id: &MovieId) -> AppResult<()> {
        run_optimistic(
            self.ratings.as_ref(),
            RemoveEntry {
                movie_id: movie_id.clone(),
            },
            || self.api.delete_rating(movie_id),
            Some(&self.bus),
        )
        .await?;
        tracing::info!(movie_id = %movie_id, "Rating removed from list");
        Ok(())
    }

    pub fn set_filter(&self, filter: RatingsFilter) {
        *self.filter.lock().unwrap_or_else(PoisonError::into_inner) = filter;
    }

    pub fn filter(&self) -> RatingsFilter {
        self.filter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Loaded entries after the local filter and sort
    pub fn visible(&self) -> Vec<RatedMovie> {
        filter_and_sort(&self.ratings.items(), &self.filter())
    }

    pub fn ratings(&self) -> CollectionSnapshot<RatedMovie> {
        self.ratings.snapshot()
    }

    pub fn stats(&self) -> PanelSnapshot<RatingStats> {
        self.stats.snapshot()
    }

    pub fn unmount(&self) {
        self.listener.abort();
        self.ratings.unmount();
        self.stats.unmount();
    }
}

impl Drop for MyRatingsView {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
