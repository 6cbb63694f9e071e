use std::collections::BTreeMap;
use std::fmt::Display;

/// Kind of resource a view fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Movies,
    Search,
    MovieDetails,
    SimilarMovies,
    Genres,
    RatingCheck,
    MyRatings,
    RatingStats,
    Profile,
    Recommendations,
    Popular,
    NewReleases,
}

/// Whether a resource needs a signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Public,
    User,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Movies => "movies",
            Endpoint::Search => "search",
            Endpoint::MovieDetails => "movie",
            Endpoint::SimilarMovies => "similar",
            Endpoint::Genres => "genres",
            Endpoint::RatingCheck => "rating",
            Endpoint::MyRatings => "my-ratings",
            Endpoint::RatingStats => "rating-stats",
            Endpoint::Profile => "profile",
            Endpoint::Recommendations => "recommendations",
            Endpoint::Popular => "popular",
            Endpoint::NewReleases => "new-releases",
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Endpoint::RatingCheck
            | Endpoint::MyRatings
            | Endpoint::RatingStats
            | Endpoint::Profile
            | Endpoint::Recommendations => Scope::User,
            _ => Scope::Public,
        }
    }
}

/// Identity of a fetchable resource, excluding the pagination cursor
///
/// Two fetches with equal keys never run at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    endpoint: Endpoint,
    filters: BTreeMap<&'static str, String>,
}

impl ResourceKey {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            filters: BTreeMap::new(),
        }
    }

    /// Adds a filter; blank values are left out so "" and "no filter" are the same key
    pub fn with(mut self, name: &'static str, value: impl Display) -> Self {
        let value = value.to_string();
        if !value.trim().is_empty() {
            self.filters.insert(name, value.trim().to_string());
        }
        self
    }

    pub fn with_opt(self, name: &'static str, value: Option<impl Display>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn scope(&self) -> Scope {
        self.endpoint.scope()
    }

    pub fn filter(&self, name: &str) -> Option<&str> {
        self.filters.get(name).map(String::as_str)
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint.as_str())?;
        for (i, (name, value)) in self.filters.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, name, value)?;
        }
        Ok(())
    }
}
