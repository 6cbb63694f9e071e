use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::{AppError, AppResult};

pub mod movie;
pub mod rating;
pub mod recommendation;
pub mod user;

pub use movie::{Movie, MovieDetails, MovieQuery, Review, SortBy};
pub use rating::{RateReceipt, RatedMovie, RatingAction, RatingStats, UserRating};
pub use recommendation::{AlgorithmType, Recommendation, RecommendationSet};
pub use user::{AuthGrant, GenreAffinity, RecentRating, Registration, User, UserProfile};

/// Stable identifier of a movie as issued by the API (e.g. "movie_inception_2010_42")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(String);

impl MovieId {
    /// Validates an id coming from a route or a link
    ///
    /// Blank ids and the literal strings "undefined" / "null" (left behind by broken links)
    /// are rejected before any request is made.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "undefined" || trimmed == "null" {
            return Err(AppError::Validation(format!(
                "Invalid movie ID provided: {:?}",
                raw
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MovieId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
