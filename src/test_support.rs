//! Test doubles shared by unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    client::{MockMovieApi, MovieApi},
    error::AppResult,
    models::{
        AlgorithmType, AuthGrant, Movie, MovieDetails, MovieId, MovieQuery, RateReceipt,
        RatedMovie, RatingStats, RecommendationSet, Registration, User, UserProfile, UserRating,
    },
    config::Config,
    services::RetryPolicy,
    session::Session,
    views::AppContext,
};

/// Holds a call open until the test releases it
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Waits until a call reached the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets one waiting (or the next) call through
    pub fn open(&self) {
        self.release.notify_one();
    }

    /// Called from inside the held call
    pub async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// Retry policy without the latency floor and with millisecond backoff
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        min_latency: Duration::ZERO,
    }
}

/// Configuration with millisecond backoff and no latency floor
pub fn test_config() -> Config {
    Config {
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 4,
        min_loading_ms: 0,
        page_limit: 3,
        search_limit: 10,
        ..Config::default()
    }
}

/// Views context over `api` for a signed-in user
pub fn signed_in_context(api: impl MovieApi + 'static) -> AppContext {
    AppContext::new(
        Arc::new(api),
        Session::authenticated(user(), "tok"),
        test_config(),
    )
}

/// Wraps a mock so selected calls can be held in flight
///
/// Gate names are method names, with recommendation calls keyed by algorithm
/// (`"recommendations:hybrid"`) and movie pages by genre (`"list_movies:Horror"`).
pub struct GatedApi {
    inner: MockMovieApi,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
}

impl GatedApi {
    pub fn new(inner: MockMovieApi) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn gate(&self, name: impl Into<String>) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .unwrap()
            .insert(name.into(), gate.clone());
        gate
    }

    async fn pass(&self, name: &str) {
        let gate = self.gates.lock().unwrap().get(name).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }
}

#[async_trait]
impl MovieApi for GatedApi {
    async fn current_user(&self) -> AppResult<User> {
        self.pass("current_user").await;
        self.inner.current_user().await
    }

    async fn login(&self, email: &str, password: &str) -> AppResult<AuthGrant> {
        self.pass("login").await;
        self.inner.login(email, password).await
    }

    async fn register(&self, form: &Registration) -> AppResult<AuthGrant> {
        self.pass("register").await;
        self.inner.register(form).await
    }

    async fn profile(&self) -> AppResult<UserProfile> {
        self.pass("profile").await;
        self.inner.profile().await
    }

    async fn list_movies(
        &self,
        query: &MovieQuery,
        page: u32,
        limit: u32,
    ) -> AppResult<Vec<Movie>> {
        self.pass(&format!("list_movies:{}", query.genre().unwrap_or("")))
            .await;
        self.inner.list_movies(query, page, limit).await
    }

    async fn search_movies(&self, term: &str, limit: u32) -> AppResult<Vec<Movie>> {
        self.pass("search_movies").await;
        self.inner.search_movies(term, limit).await
    }

    async fn movie_details(&self, id: &MovieId) -> AppResult<MovieDetails> {
        self.pass("movie_details").await;
        self.inner.movie_details(id).await
    }

    async fn genres(&self) -> AppResult<Vec<String>> {
        self.pass("genres").await;
        self.inner.genres().await
    }

    async fn check_rating(&self, id: &MovieId) -> AppResult<Option<UserRating>> {
        self.pass("check_rating").await;
        self.inner.check_rating(id).await
    }

    async fn rate_movie(&self, id: &MovieId, value: f64, review: &str) -> AppResult<RateReceipt> {
        self.pass("rate_movie").await;
        self.inner.rate_movie(id, value, review).await
    }

    async fn delete_rating(&self, id: &MovieId) -> AppResult<()> {
        self.pass("delete_rating").await;
        self.inner.delete_rating(id).await
    }

    async fn my_ratings(&self, page: u32, limit: u32) -> AppResult<Vec<RatedMovie>> {
        self.pass("my_ratings").await;
        self.inner.my_ratings(page, limit).await
    }

    async fn rating_stats(&self) -> AppResult<RatingStats> {
        self.pass("rating_stats").await;
        self.inner.rating_stats().await
    }

    async fn recommendations_for_me(
        &self,
        algorithm: AlgorithmType,
        limit: u32,
    ) -> AppResult<RecommendationSet> {
        self.pass(&format!("recommendations:{}", algorithm)).await;
        self.inner.recommendations_for_me(algorithm, limit).await
    }

    async fn popular_movies(&self, genre: Option<String>, limit: u32) -> AppResult<Vec<Movie>> {
        self.pass("popular_movies").await;
        self.inner.popular_movies(genre, limit).await
    }

    async fn new_releases(&self, limit: u32) -> AppResult<Vec<Movie>> {
        self.pass("new_releases").await;
        self.inner.new_releases(limit).await
    }

    async fn similar_movies(&self, id: &MovieId, limit: u32) -> AppResult<Vec<Movie>> {
        self.pass("similar_movies").await;
        self.inner.similar_movies(id, limit).await
    }
}

pub fn user() -> User {
    User {
        id: "user_1".to_string(),
        username: "ada".to_string(),
        email: "ada@example.com".to_string(),
        created_at: None,
    }
}

pub fn movie(id: &str) -> Movie {
    Movie::new(MovieId::parse(id).unwrap(), id.to_uppercase())
}

pub fn movies(prefix: &str, count: usize) -> Vec<Movie> {
    (0..count).map(|i| movie(&format!("{}{}", prefix, i))).collect()
}
