//! Resources and page sources backed by [`MovieApi`]

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    client::MovieApi,
    error::AppResult,
    models::{
        AlgorithmType, Movie, MovieDetails, MovieId, MovieQuery, RatedMovie, RatingStats,
        RecommendationSet, UserProfile,
    },
    services::{Endpoint, RatingCheck, RatingEngine, ResourceKey},
    store::{PageSource, Resource},
};

pub struct GenresResource {
    api: Arc<dyn MovieApi>,
}

impl GenresResource {
    pub fn new(api: Arc<dyn MovieApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for GenresResource {
    type Query = ();
    type Output = Vec<String>;

    fn key(&self, _query: &()) -> ResourceKey {
        ResourceKey::new(Endpoint::Genres)
    }

    async fn fetch(&self, _query: &()) -> AppResult<Vec<String>> {
        self.api.genres().await
    }
}

pub struct MovieDetailsResource {
    api: Arc<dyn MovieApi>,
}

impl MovieDetailsResource {
    pub fn new(api: Arc<dyn MovieApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for MovieDetailsResource {
    type Query = MovieId;
    type Output = MovieDetails;

    fn key(&self, id: &MovieId) -> ResourceKey {
        ResourceKey::new(Endpoint::MovieDetails).with("id", id)
    }

    async fn fetch(&self, id: &MovieId) -> AppResult<MovieDetails> {
        self.api.movie_details(id).await
    }
}

pub struct SimilarMoviesResource {
    api: Arc<dyn MovieApi>,
    limit: u32,
}

impl SimilarMoviesResource {
    pub fn new(api: Arc<dyn MovieApi>, limit: u32) -> Self {
        Self { api, limit }
    }
}

#[async_trait]
impl Resource for SimilarMoviesResource {
    type Query = MovieId;
    type Output = Vec<Movie>;

    fn key(&self, id: &MovieId) -> ResourceKey {
        ResourceKey::new(Endpoint::SimilarMovies)
            .with("id", id)
            .with("limit", self.limit)
    }

    async fn fetch(&self, id: &MovieId) -> AppResult<Vec<Movie>> {
        self.api.similar_movies(id, self.limit).await
    }
}

/// The signed-in user's rating of one movie, checked against a [`RatingEngine`]
pub struct RatingCheckResource {
    ratings: Arc<RatingEngine>,
}

impl RatingCheckResource {
    pub fn new(ratings: Arc<RatingEngine>) -> Self {
        Self { ratings }
    }
}

#[async_trait]
impl Resource for RatingCheckResource {
    type Query = MovieId;
    type Output = RatingCheck;

    fn key(&self, id: &MovieId) -> ResourceKey {
        ResourceKey::new(Endpoint::RatingCheck).with("id", id)
    }

    async fn fetch(&self, id: &MovieId) -> AppResult<RatingCheck> {
        self.ratings.check_rating(id).await
    }
}

/// Personal recommendations, keyed by algorithm
pub struct RecommendationsResource {
    api: Arc<dyn MovieApi>,
    limit: u32,
}

impl RecommendationsResource {
    pub fn new(api: Arc<dyn MovieApi>, limit: u32) -> Self {
        Self { api, limit }
    }
}

#[async_trait]
impl Resource for RecommendationsResource {
    type Query = AlgorithmType;
    type Output = RecommendationSet;

    fn key(&self, algorithm: &AlgorithmType) -> ResourceKey {
        ResourceKey::new(Endpoint::Recommendations)
            .with("type", algorithm)
            .with("limit", self.limit)
    }

    async fn fetch(&self, algorithm: &AlgorithmType) -> AppResult<RecommendationSet> {
        self.api.recommendations_for_me(*algorithm, self.limit).await
    }
}

/// Popular movies, optionally restricted to a genre
pub struct PopularResource {
    api: Arc<dyn MovieApi>,
    limit: u32,
}

impl PopularResource {
    pub fn new(api: Arc<dyn MovieApi>, limit: u32) -> Self {
        Self { api, limit }
    }
}

#[async_trait]
impl Resource for PopularResource {
    type Query = Option<String>;
    type Output = Vec<Movie>;

    fn key(&self, genre: &Option<String>) -> ResourceKey {
        ResourceKey::new(Endpoint::Popular)
            .with_opt("genre", genre.as_deref())
            .with("limit", self.limit)
    }

    async fn fetch(&self, genre: &Option<String>) -> AppResult<Vec<Movie>> {
        self.api.popular_movies(genre.clone(), self.limit).await
    }
}

pub struct NewReleasesResource {
    api: Arc<dyn MovieApi>,
    limit: u32,
}

impl NewReleasesResource {
    pub fn new(api: Arc<dyn MovieApi>, limit: u32) -> Self {
        Self { api, limit }
    }
}

#[async_trait]
impl Resource for NewReleasesResource {
    type Query = ();
    type Output = Vec<Movie>;

    fn key(&self, _query: &()) -> ResourceKey {
        ResourceKey::new(Endpoint::NewReleases).with("limit", self.limit)
    }

    async fn fetch(&self, _query: &()) -> AppResult<Vec<Movie>> {
        self.api.new_releases(self.limit).await
    }
}

pub struct RatingStatsResource {
    api: Arc<dyn MovieApi>,
}

impl RatingStatsResource {
    pub fn new(api: Arc<dyn MovieApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for RatingStatsResource {
    type Query = ();
    type Output = RatingStats;

    fn key(&self, _query: &()) -> ResourceKey {
        ResourceKey::new(Endpoint::RatingStats)
    }

    async fn fetch(&self, _query: &()) -> AppResult<RatingStats> {
        self.api.rating_stats().await
    }
}

pub struct ProfileResource {
    api: Arc<dyn MovieApi>,
}

impl ProfileResource {
    pub fn new(api: Arc<dyn MovieApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for ProfileResource {
    type Query = ();
    type Output = UserProfile;

    fn key(&self, _query: &()) -> ResourceKey {
        ResourceKey::new(Endpoint::Profile)
    }

    async fn fetch(&self, _query: &()) -> AppResult<UserProfile> {
        self.api.profile().await
    }
}

/// The browse listing; a search term switches it to a single bounded search request
pub struct MoviePages {
    api: Arc<dyn MovieApi>,
}

impl MoviePages {
    pub fn new(api: Arc<dyn MovieApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PageSource for MoviePages {
    type Query = MovieQuery;
    type Item = Movie;

    fn key(&self, query: &MovieQuery) -> ResourceKey {
        match query.search_term() {
            Some(term) => ResourceKey::new(Endpoint::Search).with("q", term),
            None => ResourceKey::new(Endpoint::Movies)
                .with_opt("genre", query.genre())
                .with("sort_by", query.sort_by.as_param()),
        }
    }

    fn is_bounded(&self, query: &MovieQuery) -> bool {
        query.is_search()
    }

    async fn fetch_page(&self, query: &MovieQuery, page: u32, limit: u32) -> AppResult<Vec<Movie>> {
        match query.search_term() {
            Some(term) => self.api.search_movies(term, limit).await,
            None => self.api.list_movies(query, page, limit).await,
        }
    }
}

pub struct MyRatingPages {
    api: Arc<dyn MovieApi>,
}

impl MyRatingPages {
    pub fn new(api: Arc<dyn MovieApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PageSource for MyRatingPages {
    type Query = ();
    type Item = RatedMovie;

    fn key(&self, _query: &()) -> ResourceKey {
        ResourceKey::new(Endpoint::MyRatings)
    }

    async fn fetch_page(&self, _query: &(), page: u32, limit: u32) -> AppResult<Vec<RatedMovie>> {
        self.api.my_ratings(page, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMovieApi;
    use crate::models::SortBy;
    use crate::services::Scope;

    fn pages() -> MoviePages {
        MoviePages::new(Arc::new(MockMovieApi::new()))
    }

    #[test]
    fn test_movie_keys_follow_filters() {
        let query = MovieQuery {
            genre: Some("Horror".to_string()),
            sort_by: SortBy::Year,
            search: None,
        };
        assert_eq!(pages().key(&query).to_string(), "movies?genre=Horror&sort_by=year");
        assert!(!pages().is_bounded(&query));

        let all = MovieQuery::default();
        assert_eq!(pages().key(&all).to_string(), "movies?sort_by=avg_rating");
    }

    #[test]
    fn test_search_key_ignores_genre_and_sort() {
        let query = MovieQuery {
            genre: Some("Horror".to_string()),
            sort_by: SortBy::Title,
            search: Some(" alien ".to_string()),
        };
        let key = pages().key(&query);
        assert_eq!(key.endpoint(), Endpoint::Search);
        assert_eq!(key.filter("q"), Some("alien"));
        assert_eq!(key.filter("genre"), None);
        assert!(pages().is_bounded(&query));
    }

    #[test]
    fn test_personal_resources_are_user_scoped() {
        let api: Arc<dyn MovieApi> = Arc::new(MockMovieApi::new());
        let recs = RecommendationsResource::new(api.clone(), 15);
        assert_eq!(recs.key(&AlgorithmType::Content).scope(), Scope::User);
        assert_eq!(RatingStatsResource::new(api.clone()).key(&()).scope(), Scope::User);
        assert_eq!(ProfileResource::new(api.clone()).key(&()).scope(), Scope::User);
        assert_eq!(MyRatingPages::new(api.clone()).key(&()).scope(), Scope::User);
        let check = RatingCheckResource::new(Arc::new(RatingEngine::new(
            api.clone(),
            crate::services::RefreshBus::new(),
        )));
        let key = check.key(&MovieId::parse("m1").unwrap());
        assert_eq!(key.scope(), Scope::User);
        assert_eq!(key.to_string(), "rating?id=m1");
        assert_eq!(PopularResource::new(api, 12).key(&None).scope(), Scope::Public);
    }

    #[tokio::test]
    async fn test_search_page_calls_search_endpoint() {
        let mut api = MockMovieApi::new();
        api.expect_search_movies()
            .withf(|term, limit| term == "alien" && *limit == 20)
            .returning(|_, _| Ok(Vec::new()));
        let pages = MoviePages::new(Arc::new(api));
        let query = MovieQuery {
            search: Some("alien".to_string()),
            ..MovieQuery::default()
        };
        assert!(pages.fetch_page(&query, 1, 20).await.unwrap().is_empty());
    }
}
