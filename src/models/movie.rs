use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MovieId;

/// A movie as displayed by every list and card
///
/// `avg_rating` and `rating_count` are owned by the server; the client only replaces them
/// with server-supplied values, except for the optimistic rating-count bump.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub year: Option<i32>,
    pub overview: Option<String>,
    pub poster_url: Option<String>,
    pub avg_rating: f64,
    pub rating_count: u64,
    pub genres: Vec<String>,
    pub runtime_minutes: Option<u32>,
    pub directors: Vec<String>,
    pub actors: Vec<String>,
    pub imdb_rating: Option<f64>,
    pub meta_score: Option<u32>,
    pub certificate: Option<String>,
}

impl Movie {
    /// Minimal movie, mostly useful for tests and placeholders
    pub fn new(id: MovieId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            year: None,
            overview: None,
            poster_url: None,
            avg_rating: 0.0,
            rating_count: 0,
            genres: Vec::new(),
            runtime_minutes: None,
            directors: Vec::new(),
            actors: Vec::new(),
            imdb_rating: None,
            meta_score: None,
            certificate: None,
        }
    }

    pub fn director(&self) -> Option<&str> {
        self.directors.first().map(String::as_str)
    }

    /// "2h 28m" style runtime
    pub fn runtime_label(&self) -> Option<String> {
        let minutes = self.runtime_minutes?;
        let hours = minutes / 60;
        let rest = minutes % 60;
        Some(if hours > 0 {
            format!("{}h {}m", hours, rest)
        } else {
            format!("{}m", rest)
        })
    }
}

/// A recent user review shown on the detail page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub username: String,
    pub rating: f64,
    pub review: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieDetails {
    pub movie: Movie,
    pub reviews: Vec<Review>,
}

/// Server-side ordering of the movie listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    AvgRating,
    Year,
    Title,
}

impl SortBy {
    pub fn as_param(&self) -> &'static str {
        match self {
            SortBy::AvgRating => "avg_rating",
            SortBy::Year => "year",
            SortBy::Title => "title",
        }
    }
}

/// Filters of the movie browser
///
/// A non-blank `search` switches the listing to search mode, which ignores genre and sort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MovieQuery {
    pub genre: Option<String>,
    pub sort_by: SortBy,
    pub search: Option<String>,
}

impl MovieQuery {
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    pub fn genre(&self) -> Option<&str> {
        self.genre
            .as_deref()
            .map(str::trim)
            .filter(|genre| !genre.is_empty())
    }

    pub fn is_search(&self) -> bool {
        self.search_term().is_some()
    }
}
