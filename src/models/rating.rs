use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MovieId;
use crate::error::{AppError, AppResult};

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;
pub const MAX_REVIEW_LEN: usize = 1000;

/// The signed-in user's rating of one movie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRating {
    pub movie_id: MovieId,
    pub value: f64,
    pub review: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl UserRating {
    /// Builds a locally-authored rating after validating value and review
    pub fn draft(movie_id: MovieId, value: f64, review: &str) -> AppResult<Self> {
        validate_rating(value, review)?;
        Ok(Self {
            movie_id,
            value,
            review: review.trim().to_string(),
            timestamp: Some(Utc::now()),
        })
    }
}

pub fn validate_rating(value: f64, review: &str) -> AppResult<()> {
    if !value.is_finite() || !(MIN_RATING..=MAX_RATING).contains(&value) {
        return Err(AppError::Validation(
            "Please select a rating between 1 and 5 stars".to_string(),
        ));
    }
    if review.trim().chars().count() > MAX_REVIEW_LEN {
        return Err(AppError::Validation(format!(
            "Review must be {} characters or less",
            MAX_REVIEW_LEN
        )));
    }
    Ok(())
}

/// Whether the server created a new rating or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingAction {
    Created,
    Updated,
}

/// Server confirmation of a rating submission
#[derive(Debug, Clone, PartialEq)]
pub struct RateReceipt {
    pub rating: UserRating,
    pub action: Option<RatingAction>,
    /// Recomputed movie average, when the server reports it
    pub new_avg_rating: Option<f64>,
}

/// An entry of the "my ratings" listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatedMovie {
    pub movie_id: MovieId,
    pub movie_title: String,
    pub movie_year: Option<i32>,
    pub poster_url: Option<String>,
    pub rating: UserRating,
    pub movie_avg_rating: f64,
    pub movie_rating_count: u64,
}

/// Aggregate statistics over the user's ratings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RatingStats {
    pub total_ratings: u64,
    pub avg_rating: f64,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub rated_genres: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie() -> MovieId {
        MovieId::parse("m1").unwrap()
    }

    #[test]
    fn test_draft_accepts_bounds() {
        assert!(UserRating::draft(movie(), 1.0, "").is_ok());
        assert!(UserRating::draft(movie(), 5.0, "").is_ok());
        assert!(UserRating::draft(movie(), 3.5, "fine").is_ok());
    }

    #[test]
    fn test_draft_rejects_out_of_range() {
        for value in [0.0, 0.99, 5.01, 6.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                UserRating::draft(movie(), value, ""),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_draft_rejects_long_review() {
        let review = "x".repeat(MAX_REVIEW_LEN + 1);
        assert!(matches!(
            UserRating::draft(movie(), 4.0, &review),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_draft_trims_review() {
        let rating = UserRating::draft(movie(), 4.0, "  great  ").unwrap();
        assert_eq!(rating.review, "great");
        assert!(rating.timestamp.is_some());
    }

    #[test]
    fn test_rating_action_serialization() {
        assert_eq!(
            serde_json::to_string(&RatingAction::Created).unwrap(),
            "\"created\""
        );
        let action: RatingAction = serde_json::from_str("\"updated\"").unwrap();
        assert_eq!(action, RatingAction::Updated);
    }
}
