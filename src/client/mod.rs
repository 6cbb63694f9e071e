//! Typed access to the movie API
//!
//! `MovieApi` is the seam every store and view depends on. The HTTP implementation lives in
//! [`movie_api`]; tests substitute the generated mock.

use crate::{
    error::AppResult,
    models::{
        AlgorithmType, AuthGrant, Movie, MovieDetails, MovieId, MovieQuery, RateReceipt,
        RatedMovie, RatingStats, RecommendationSet, Registration, User, UserProfile, UserRating,
    },
};

pub mod http;
pub mod mapping;
pub mod movie_api;
pub mod request_id;

pub use http::ResourceClient;
pub use movie_api::HttpMovieApi;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieApi: Send + Sync {
    /// Profile of the token holder
    async fn current_user(&self) -> AppResult<User>;

    async fn login(&self, email: &str, password: &str) -> AppResult<AuthGrant>;

    /// Creates an account; the grant signs the new user in
    async fn register(&self, form: &Registration) -> AppResult<AuthGrant>;

    /// Identity plus rating activity of the token holder
    async fn profile(&self) -> AppResult<UserProfile>;

    /// One page of the catalogue, filtered by genre and ordered server-side
    async fn list_movies(&self, query: &MovieQuery, page: u32, limit: u32)
        -> AppResult<Vec<Movie>>;

    /// Title search; the server applies no pagination beyond `limit`
    async fn search_movies(&self, term: &str, limit: u32) -> AppResult<Vec<Movie>>;

    async fn movie_details(&self, id: &MovieId) -> AppResult<MovieDetails>;

    async fn genres(&self) -> AppResult<Vec<String>>;

    /// The signed-in user's rating for a movie, if any
    async fn check_rating(&self, id: &MovieId) -> AppResult<Option<UserRating>>;

    /// Creates or replaces the user's rating; never retried
    async fn rate_movie(&self, id: &MovieId, value: f64, review: &str) -> AppResult<RateReceipt>;

    async fn delete_rating(&self, id: &MovieId) -> AppResult<()>;

    async fn my_ratings(&self, page: u32, limit: u32) -> AppResult<Vec<RatedMovie>>;

    async fn rating_stats(&self) -> AppResult<RatingStats>;

    async fn recommendations_for_me(
        &self,
        algorithm: AlgorithmType,
        limit: u32,
    ) -> AppResult<RecommendationSet>;

    async fn popular_movies(&self, genre: Option<String>, limit: u32) -> AppResult<Vec<Movie>>;

    async fn new_releases(&self, limit: u32) -> AppResult<Vec<Movie>>;

    async fn similar_movies(&self, id: &MovieId, limit: u32) -> AppResult<Vec<Movie>>;
}
