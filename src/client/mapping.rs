//! Wire formats of the movie API
//!
//! The backend is inconsistent about envelopes and field names: lists arrive bare or under
//! `movies` / `data` / `recommendations`, detail payloads may be wrapped in `movie` or `data`,
//! numbers sometimes come as strings and timestamps usually lack an offset. Everything is
//! normalized here so the rest of the crate only sees the typed models.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    models::{
        AlgorithmType, AuthGrant, GenreAffinity, Movie, MovieDetails, MovieId, RateReceipt,
        RatedMovie, RatingAction, RatingStats, RecentRating, Recommendation, RecommendationSet,
        Review, User, UserProfile, UserRating,
    },
};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses RFC 3339, or a naive ISO timestamp interpreted as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Human-readable message of an error body
///
/// Validation failures carry an `errors` list which is more useful than the generic
/// `message` next to it.
pub fn error_message(raw: &Value) -> Option<String> {
    if let Some(errors) = raw.get("errors").and_then(Value::as_array) {
        let errors: Vec<&str> = errors.iter().filter_map(Value::as_str).collect();
        if !errors.is_empty() {
            return Some(format!("Validation errors: {}", errors.join(", ")));
        }
    }
    raw.get("message")
        .or_else(|| raw.get("error"))
        .and_then(Value::as_str)
        .filter(|msg| !msg.trim().is_empty())
        .map(str::to_string)
}

// Lenient field decoders

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite()))
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(lenient_f64(d)?.filter(|v| *v >= 0.0).map(|v| v as u64))
}

fn lenient_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    Ok(lenient_f64(d)?.map(|v| v as i32))
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => parse_timestamp(&s),
        _ => None,
    })
}

/// Array of strings, or a comma separated string
fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let items = match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Object(mut map) => match map.remove("name") {
                    Some(Value::String(s)) => Some(s),
                    _ => None,
                },
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// Envelopes

/// Unwraps `{movie: {...}}` / `{data: {...}}` unless the value already looks like an entity
fn unwrap_entity(value: Value, wrappers: &[&str]) -> Value {
    match value {
        Value::Object(mut map) if !map.contains_key("id") => {
            for key in wrappers {
                if map.get(*key).is_some_and(Value::is_object) {
                    if let Some(inner) = map.remove(*key) {
                        return inner;
                    }
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

/// Finds the list in a bare array or under the first matching key
fn extract_list(value: Value, keys: &[&str]) -> AppResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in keys {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Ok(items);
                }
            }
            Err(AppError::Decode(format!("Expected a list under {:?}", keys)))
        }
        other => Err(AppError::Decode(format!(
            "Expected a list, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decodes every entry, skipping malformed ones
fn decode_items<W, T>(items: Vec<Value>, what: &str) -> Vec<T>
where
    W: DeserializeOwned,
    T: TryFrom<W, Error = AppError>,
{
    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| {
            serde_json::from_value::<W>(item)
                .map_err(AppError::from)
                .and_then(T::try_from)
                .map_err(|e| tracing::warn!(error = %e, what, "Skipping malformed entry"))
                .ok()
        })
        .collect();
    if decoded.len() < total {
        tracing::warn!(what, total, kept = decoded.len(), "Dropped malformed list entries");
    }
    decoded
}

fn decode<W: DeserializeOwned>(value: Value) -> AppResult<W> {
    serde_json::from_value(value).map_err(AppError::from)
}

// Movies

#[derive(Deserialize)]
struct WireMovie {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    year: Option<i32>,
    #[serde(default, deserialize_with = "lenient_i32")]
    released_year: Option<i32>,
    #[serde(default)]
    plot: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    avg_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    rating_count: Option<u64>,
    #[serde(default, deserialize_with = "string_list")]
    genres: Vec<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    runtime_minutes: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    runtime: Option<u64>,
    #[serde(default, deserialize_with = "string_list")]
    directors: Vec<String>,
    #[serde(default)]
    director: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    actors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    imdb_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    meta_score: Option<u64>,
    #[serde(default)]
    certificate: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    recommendation_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    similarity_score: Option<f64>,
    #[serde(default, deserialize_with = "string_list")]
    recommendation_sources: Vec<String>,
    #[serde(default)]
    reviews: Vec<WireReview>,
}

impl TryFrom<WireMovie> for Movie {
    type Error = AppError;

    fn try_from(wire: WireMovie) -> AppResult<Self> {
        let id = wire
            .id
            .ok_or_else(|| AppError::Decode("Invalid movie data received from server".to_string()))
            .and_then(|id| MovieId::parse(&id).map_err(|e| AppError::Decode(e.to_string())))?;

        let mut directors = wire.directors;
        if directors.is_empty() {
            directors.extend(non_blank(wire.director).map(|d| d.trim().to_string()));
        }

        Ok(Movie {
            id,
            title: wire.title.unwrap_or_default(),
            // the backend reports 0 for an unknown year
            year: wire.year.or(wire.released_year).filter(|y| *y > 0),
            overview: non_blank(wire.plot).or_else(|| non_blank(wire.overview)),
            poster_url: non_blank(wire.poster_url),
            avg_rating: wire.avg_rating.unwrap_or(0.0),
            rating_count: wire.rating_count.unwrap_or(0),
            genres: wire.genres,
            runtime_minutes: wire
                .runtime_minutes
                .or(wire.runtime)
                .filter(|m| *m > 0)
                .map(|m| m as u32),
            directors,
            actors: wire.actors,
            imdb_rating: wire.imdb_rating,
            meta_score: wire.meta_score.map(|m| m as u32),
            certificate: non_blank(wire.certificate),
        })
    }
}

impl TryFrom<WireMovie> for Recommendation {
    type Error = AppError;

    fn try_from(mut wire: WireMovie) -> AppResult<Self> {
        let score = wire.recommendation_score.or(wire.similarity_score);
        let sources = std::mem::take(&mut wire.recommendation_sources);
        Ok(Recommendation {
            movie: Movie::try_from(wire)?,
            score,
            sources,
        })
    }
}

#[derive(Deserialize)]
struct WireReview {
    #[serde(default, deserialize_with = "lenient_string")]
    username: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rating: Option<f64>,
    #[serde(default)]
    review: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

impl From<WireReview> for Review {
    fn from(wire: WireReview) -> Self {
        Review {
            username: wire.username.unwrap_or_else(|| "Anonymous".to_string()),
            rating: wire.rating.unwrap_or(0.0),
            review: wire.review.unwrap_or_default(),
            timestamp: wire.timestamp,
        }
    }
}

pub fn movie_details(value: Value) -> AppResult<MovieDetails> {
    let mut wire: WireMovie = decode(unwrap_entity(value, &["movie", "data"]))?;
    let reviews = std::mem::take(&mut wire.reviews)
        .into_iter()
        .map(Review::from)
        .collect();
    Ok(MovieDetails {
        movie: Movie::try_from(wire)?,
        reviews,
    })
}

pub fn movie_list(value: Value, keys: &[&str]) -> AppResult<Vec<Movie>> {
    let items = extract_list(value, keys)?;
    Ok(decode_items::<WireMovie, Movie>(items, "movie"))
}

pub fn genres(value: Value) -> AppResult<Vec<String>> {
    let items = extract_list(value, &["genres", "data"])?;
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Object(mut map) => match map.remove("name") {
                Some(Value::String(s)) => Some(s),
                _ => None,
            },
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

// Recommendations

pub fn recommendation_set(requested: AlgorithmType, value: Value) -> AppResult<RecommendationSet> {
    let notice = match &value {
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    if let Some(reported) = value.get("type").and_then(Value::as_str) {
        if AlgorithmType::from_param(reported) != requested {
            tracing::debug!(%requested, reported, "Server used a different algorithm");
        }
    }

    let items = extract_list(value, &["recommendations", "data"])?;
    let items = decode_items::<WireMovie, Recommendation>(items, "recommendation");
    Ok(RecommendationSet::new(requested, items, notice))
}

// Ratings

#[derive(Deserialize)]
struct WireRating {
    #[serde(default, deserialize_with = "lenient_f64")]
    rating: Option<f64>,
    #[serde(default)]
    review: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

impl WireRating {
    fn into_rating(self, movie_id: MovieId) -> Option<UserRating> {
        Some(UserRating {
            movie_id,
            value: self.rating?,
            review: self.review.unwrap_or_default(),
            timestamp: self.timestamp,
        })
    }
}

#[derive(Deserialize)]
struct WireRatingCheck {
    #[serde(default)]
    has_rated: bool,
    #[serde(default)]
    rating: Option<WireRating>,
}

pub fn rating_check(movie_id: &MovieId, value: Value) -> AppResult<Option<UserRating>> {
    let check: WireRatingCheck = decode(value)?;
    if !check.has_rated {
        return Ok(None);
    }
    Ok(check
        .rating
        .and_then(|rating| rating.into_rating(movie_id.clone())))
}

#[derive(Deserialize)]
struct WireRateResponse {
    #[serde(default)]
    rating: Option<WireRating>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    new_avg_rating: Option<f64>,
}

/// Maps a rate response; fields the server omits fall back to what was submitted
pub fn rate_receipt(submitted: &UserRating, value: Value) -> AppResult<RateReceipt> {
    let wire: WireRateResponse = match value {
        Value::Null => WireRateResponse {
            rating: None,
            action: None,
            new_avg_rating: None,
        },
        other => decode(other)?,
    };

    let rating = wire
        .rating
        .and_then(|rating| rating.into_rating(submitted.movie_id.clone()))
        .map(|mut confirmed| {
            if confirmed.timestamp.is_none() {
                confirmed.timestamp = submitted.timestamp;
            }
            confirmed
        })
        .unwrap_or_else(|| submitted.clone());

    let action = match wire.action.as_deref() {
        Some("created") => Some(RatingAction::Created),
        Some("updated") => Some(RatingAction::Updated),
        _ => None,
    };

    Ok(RateReceipt {
        rating,
        action,
        new_avg_rating: wire.new_avg_rating,
    })
}

#[derive(Deserialize)]
struct WireRatedMovie {
    #[serde(default, deserialize_with = "lenient_string")]
    movie_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    movie_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    movie_year: Option<i32>,
    #[serde(default)]
    poster_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rating: Option<f64>,
    #[serde(default)]
    review: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_f64")]
    movie_avg_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    movie_rating_count: Option<u64>,
}

impl TryFrom<WireRatedMovie> for RatedMovie {
    type Error = AppError;

    fn try_from(wire: WireRatedMovie) -> AppResult<Self> {
        let movie_id = wire
            .movie_id
            .ok_or_else(|| AppError::Decode("Rating entry without movie_id".to_string()))
            .and_then(|id| MovieId::parse(&id).map_err(|e| AppError::Decode(e.to_string())))?;
        let value = wire
            .rating
            .ok_or_else(|| AppError::Decode("Rating entry without a rating".to_string()))?;

        Ok(RatedMovie {
            rating: UserRating {
                movie_id: movie_id.clone(),
                value,
                review: wire.review.unwrap_or_default(),
                timestamp: wire.timestamp,
            },
            movie_id,
            movie_title: wire.movie_title.unwrap_or_default(),
            movie_year: wire.movie_year.filter(|y| *y > 0),
            poster_url: non_blank(wire.poster_url),
            movie_avg_rating: wire.movie_avg_rating.unwrap_or(0.0),
            movie_rating_count: wire.movie_rating_count.unwrap_or(0),
        })
    }
}

pub fn rated_movies(value: Value) -> AppResult<Vec<RatedMovie>> {
    let items = extract_list(value, &["ratings", "data"])?;
    Ok(decode_items::<WireRatedMovie, RatedMovie>(items, "rated movie"))
}

#[derive(Deserialize)]
struct WireStats {
    #[serde(default, deserialize_with = "lenient_u64")]
    total_ratings: Option<u64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    avg_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    min_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    max_rating: Option<f64>,
    #[serde(default, deserialize_with = "string_list")]
    rated_genres: Vec<String>,
}

impl From<WireStats> for RatingStats {
    fn from(wire: WireStats) -> Self {
        RatingStats {
            total_ratings: wire.total_ratings.unwrap_or(0),
            avg_rating: wire.avg_rating.unwrap_or(0.0),
            min_rating: wire.min_rating,
            max_rating: wire.max_rating,
            rated_genres: wire.rated_genres,
        }
    }
}

pub fn rating_stats(value: Value) -> AppResult<RatingStats> {
    let wire: WireStats = decode(unwrap_entity(value, &["stats", "data"]))?;
    Ok(wire.into())
}

// Auth

#[derive(Deserialize)]
struct WireUser {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    username: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<WireUser> for User {
    type Error = AppError;

    fn try_from(wire: WireUser) -> AppResult<Self> {
        Ok(User {
            id: wire
                .id
                .ok_or_else(|| AppError::Decode("User without id".to_string()))?,
            username: wire.username.unwrap_or_default(),
            email: wire.email.unwrap_or_default(),
            created_at: wire.created_at,
        })
    }
}

pub fn user(value: Value) -> AppResult<User> {
    User::try_from(decode::<WireUser>(unwrap_entity(value, &["user", "data"]))?)
}

#[derive(Deserialize)]
struct WireAuthGrant {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<Value>,
}

pub fn auth_grant(value: Value) -> AppResult<AuthGrant> {
    let wire: WireAuthGrant = decode(value)?;
    let token = non_blank(wire.access_token)
        .ok_or_else(|| AppError::Decode("Auth response without access_token".to_string()))?;
    let user = user(
        wire.user
            .ok_or_else(|| AppError::Decode("Auth response without user".to_string()))?,
    )?;
    Ok(AuthGrant { token, user })
}

#[derive(Deserialize)]
struct WireGenreAffinity {
    #[serde(default, deserialize_with = "lenient_string")]
    genre: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    count: Option<u64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    avg_rating: Option<f64>,
}

impl TryFrom<WireGenreAffinity> for GenreAffinity {
    type Error = AppError;

    fn try_from(wire: WireGenreAffinity) -> AppResult<Self> {
        Ok(GenreAffinity {
            genre: non_blank(wire.genre)
                .ok_or_else(|| AppError::Decode("Favorite genre without a name".to_string()))?,
            count: wire.count.unwrap_or(0),
            avg_rating: wire.avg_rating.unwrap_or(0.0),
        })
    }
}

#[derive(Deserialize)]
struct WireRecentRating {
    #[serde(default, deserialize_with = "lenient_string")]
    movie_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    movie_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    poster_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<WireRecentRating> for RecentRating {
    type Error = AppError;

    fn try_from(wire: WireRecentRating) -> AppResult<Self> {
        let movie_id = wire
            .movie_id
            .ok_or_else(|| AppError::Decode("Recent rating without movie_id".to_string()))
            .and_then(|id| MovieId::parse(&id).map_err(|e| AppError::Decode(e.to_string())))?;
        Ok(RecentRating {
            movie_id,
            movie_title: wire.movie_title.unwrap_or_default(),
            poster_url: non_blank(wire.poster_url),
            rating: wire
                .rating
                .ok_or_else(|| AppError::Decode("Recent rating without a rating".to_string()))?,
            timestamp: wire.timestamp,
        })
    }
}

#[derive(Deserialize)]
struct WireProfile {
    #[serde(default)]
    user: Option<Value>,
    #[serde(default)]
    stats: Option<Value>,
    #[serde(default)]
    favorite_genres: Option<Vec<Value>>,
    #[serde(default)]
    recent_ratings: Option<Vec<Value>>,
}

/// `{user, stats, favorite_genres, recent_ratings}`; missing activity decodes as empty
pub fn profile(value: Value) -> AppResult<UserProfile> {
    let wire: WireProfile = decode(value)?;
    let user = user(
        wire.user
            .ok_or_else(|| AppError::Decode("Profile without user".to_string()))?,
    )?;
    let stats = match wire.stats {
        Some(stats) => decode::<WireStats>(stats)?.into(),
        None => RatingStats::default(),
    };
    Ok(UserProfile {
        user,
        stats,
        favorite_genres: decode_items::<WireGenreAffinity, GenreAffinity>(
            wire.favorite_genres.unwrap_or_default(),
            "favorite genre",
        ),
        recent_ratings: decode_items::<WireRecentRating, RecentRating>(
            wire.recent_ratings.unwrap_or_default(),
            "recent rating",
        ),
    })
}
