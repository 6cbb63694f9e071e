use async_trait::async_trait;
use serde_json::json;

use crate::{
    client::{mapping, MovieApi, ResourceClient},
    error::{AppError, AppResult},
    models::{
        AlgorithmType, AuthGrant, Movie, MovieDetails, MovieId, MovieQuery, RateReceipt,
        RatedMovie, RatingStats, RecommendationSet, Registration, User, UserProfile, UserRating,
    },
};

/// [`MovieApi`] over HTTP
#[derive(Clone)]
pub struct HttpMovieApi {
    client: ResourceClient,
}

impl HttpMovieApi {
    pub fn new(client: ResourceClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ResourceClient {
        &self.client
    }
}

#[async_trait]
impl MovieApi for HttpMovieApi {
    async fn current_user(&self) -> AppResult<User> {
        mapping::user(self.client.get("/auth/me", &[]).await?)
    }

    async fn login(&self, email: &str, password: &str) -> AppResult<AuthGrant> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }
        let body = json!({ "email": email.trim(), "password": password });
        mapping::auth_grant(self.client.post("/auth/login", &body).await?)
    }

    async fn register(&self, form: &Registration) -> AppResult<AuthGrant> {
        let body = json!({
            "username": form.username,
            "email": form.email,
            "password": form.password,
        });
        let grant = mapping::auth_grant(self.client.post("/auth/register", &body).await?)?;
        tracing::info!(user_id = %grant.user.id, "Account created");
        Ok(grant)
    }

    async fn profile(&self) -> AppResult<UserProfile> {
        mapping::profile(self.client.get("/auth/profile", &[]).await?)
    }

    async fn list_movies(
        &self,
        query: &MovieQuery,
        page: u32,
        limit: u32,
    ) -> AppResult<Vec<Movie>> {
        let mut params = vec![
            ("page", page.to_string()),
            ("limit", limit.to_string()),
            ("sort_by", query.sort_by.as_param().to_string()),
        ];
        if let Some(genre) = query.genre() {
            params.push(("genre", genre.to_string()));
        }

        let movies = mapping::movie_list(
            self.client.get("/movies/", &params).await?,
            &["movies", "data"],
        )?;
        tracing::info!(page, count = movies.len(), "Fetched movie page");
        Ok(movies)
    }

    async fn search_movies(&self, term: &str, limit: u32) -> AppResult<Vec<Movie>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(AppError::Validation(
                "Search query cannot be empty".to_string(),
            ));
        }
        let params = [("q", term.to_string()), ("limit", limit.to_string())];
        let movies = mapping::movie_list(
            self.client.get("/movies/search", &params).await?,
            &["movies", "results", "data"],
        )?;
        tracing::info!(query = %term, count = movies.len(), "Search completed");
        Ok(movies)
    }

    async fn movie_details(&self, id: &MovieId) -> AppResult<MovieDetails> {
        let path = format!("/movies/{}", id);
        mapping::movie_details(self.client.get(&path, &[]).await?)
    }

    async fn genres(&self) -> AppResult<Vec<String>> {
        mapping::genres(self.client.get("/movies/genres", &[]).await?)
    }

    async fn check_rating(&self, id: &MovieId) -> AppResult<Option<UserRating>> {
        let path = format!("/ratings/check/{}", id);
        mapping::rating_check(id, self.client.get(&path, &[]).await?)
    }

    async fn rate_movie(&self, id: &MovieId, value: f64, review: &str) -> AppResult<RateReceipt> {
        let submitted = UserRating::draft(id.clone(), value, review)?;
        let body = json!({
            "movie_id": id.as_str(),
            "rating": submitted.value,
            "review": submitted.review,
        });
        let receipt = mapping::rate_receipt(
            &submitted,
            self.client.post("/ratings/rate", &body).await?,
        )?;
        tracing::info!(movie_id = %id, action = ?receipt.action, "Rating saved");
        Ok(receipt)
    }

    async fn delete_rating(&self, id: &MovieId) -> AppResult<()> {
        let path = format!("/ratings/delete/{}", id);
        self.client.delete(&path).await?;
        tracing::info!(movie_id = %id, "Rating deleted");
        Ok(())
    }

    async fn my_ratings(&self, page: u32, limit: u32) -> AppResult<Vec<RatedMovie>> {
        let params = [("page", page.to_string()), ("limit", limit.to_string())];
        mapping::rated_movies(self.client.get("/ratings/my-ratings", &params).await?)
    }

    async fn rating_stats(&self) -> AppResult<RatingStats> {
        mapping::rating_stats(self.client.get("/ratings/stats", &[]).await?)
    }

    async fn recommendations_for_me(
        &self,
        algorithm: AlgorithmType,
        limit: u32,
    ) -> AppResult<RecommendationSet> {
        let params = [
            ("type", algorithm.as_param().to_string()),
            ("limit", limit.to_string()),
        ];
        let set = mapping::recommendation_set(
            algorithm,
            self.client.get("/recommendations/for-me", &params).await?,
        )?;
        tracing::info!(%algorithm, count = set.items.len(), "Fetched recommendations");
        Ok(set)
    }

    async fn popular_movies(&self, genre: Option<String>, limit: u32) -> AppResult<Vec<Movie>> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(genre) = genre.filter(|g| !g.trim().is_empty()) {
            params.push(("genre", genre));
        }
        mapping::movie_list(
            self.client.get("/recommendations/popular", &params).await?,
            &["movies", "data"],
        )
    }

    async fn new_releases(&self, limit: u32) -> AppResult<Vec<Movie>> {
        let params = [("limit", limit.to_string())];
        mapping::movie_list(
            self.client
                .get("/recommendations/new-releases", &params)
                .await?,
            &["movies", "data"],
        )
    }

    async fn similar_movies(&self, id: &MovieId, limit: u32) -> AppResult<Vec<Movie>> {
        let path = format!("/recommendations/similar/{}", id);
        let params = [("limit", limit.to_string())];
        mapping::movie_list(
            self.client.get(&path, &params).await?,
            &["similar_movies", "data"],
        )
    }
}
