use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::{MovieId, RatingStats},
};

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of a successful login or registration
#[derive(Debug, Clone, PartialEq)]
pub struct AuthGrant {
    pub token: String,
    pub user: User,
}

/// Sign-up form, checked before it is sent
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub username: String,
    /// Trimmed and lowercased
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn new(username: &str, email: &str, password: &str) -> AppResult<Self> {
        let username = username.trim();
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(AppError::Validation(format!(
                "Username must be at least {} characters",
                MIN_USERNAME_LEN
            )));
        }
        let email = email.trim().to_lowercase();
        if !looks_like_email(&email) {
            return Err(AppError::Validation("Email is invalid".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(Self {
            username: username.to_string(),
            email,
            password: password.to_string(),
        })
    }
}

/// `local@domain.tld` with no whitespace
fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain
                    .rsplit_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// A genre the user rates highly
#[derive(Debug, Clone, PartialEq)]
pub struct GenreAffinity {
    pub genre: String,
    pub count: u64,
    pub avg_rating: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecentRating {
    pub movie_id: MovieId,
    pub movie_title: String,
    pub poster_url: Option<String>,
    pub rating: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Account page data: identity plus rating activity
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user: User,
    pub stats: RatingStats,
    pub favorite_genres: Vec<GenreAffinity>,
    pub recent_ratings: Vec<RecentRating>,
}
