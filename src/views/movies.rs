use std::sync::{Mutex, PoisonError};

use crate::{
    models::{Movie, MovieQuery, SortBy},
    store::{CollectionSnapshot, LoadOutcome, PaginatedCollection, Panel, PanelSnapshot},
    views::{
        resources::{GenresResource, MoviePages},
        AppContext,
    },
};

/// The browse page: genre list plus the filtered, paginated catalogue
pub struct MovieBrowser {
    genres: Panel<GenresResource>,
    movies: PaginatedCollection<MoviePages>,
    query: Mutex<MovieQuery>,
}

impl MovieBrowser {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            genres: ctx.panel(GenresResource::new(ctx.api.clone())),
            movies: PaginatedCollection::new(
                MoviePages::new(ctx.api.clone()),
                ctx.guard.clone(),
                ctx.policy(),
                ctx.config.page_limit,
                ctx.config.search_limit,
            ),
            query: Mutex::new(MovieQuery::default()),
        }
    }

    /// Loads the genre list and the first page; the genre list is not critical
    pub async fn mount(&self) -> LoadOutcome {
        let query = self.query();
        let (genres, movies) = tokio::join!(self.genres.load(()), self.movies.reset_fetch(query));
        if let LoadOutcome::Failed(e) = genres {
            tracing::warn!(error = %e, "Genre list unavailable");
        }
        movies
    }

    /// Filters by genre; `None` or "" lists every genre. Clears the search.
    pub async fn set_genre(&self, genre: Option<String>) -> LoadOutcome {
        let query = self.update(|query| {
            query.genre = genre;
            query.search = None;
        });
        self.movies.reset_fetch(query).await
    }

    /// Switches to search mode; a blank term goes back to browsing. Clears the genre.
    pub async fn search(&self, term: &str) -> LoadOutcome {
        let term = term.trim().to_string();
        let query = self.update(|query| {
            query.genre = None;
            query.search = (!term.is_empty()).then_some(term);
        });
        self.movies.reset_fetch(query).await
    }

    pub async fn set_sort(&self, sort_by: SortBy) -> LoadOutcome {
        let query = self.update(|query| query.sort_by = sort_by);
        self.movies.reset_fetch(query).await
    }

    pub async fn load_more(&self) -> LoadOutcome {
        self.movies.append_fetch().await
    }

    /// Retries the listing and the genre list, whichever failed
    pub async fn retry(&self) -> LoadOutcome {
        let (genres, movies) = tokio::join!(
            self.genres.retry_if_failed(),
            self.movies.retry_if_failed()
        );
        if let LoadOutcome::Failed(e) = genres {
            tracing::warn!(error = %e, "Genre list unavailable");
        }
        movies
    }

    pub fn query(&self) -> MovieQuery {
        self.query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn genres(&self) -> PanelSnapshot<Vec<String>> {
        self.genres.snapshot()
    }

    pub fn movies(&self) -> CollectionSnapshot<Movie> {
        self.movies.snapshot()
    }

    pub fn unmount(&self) {
        self.genres.unmount();
        self.movies.unmount();
    }

    fn update(&self, f: impl FnOnce(&mut MovieQuery)) -> MovieQuery {
        let mut query = self.query.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut query);
        query.clone()
    }
}
