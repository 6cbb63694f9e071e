use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::Movie;

/// Personalisation algorithm requested from `/recommendations/for-me`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmType {
    #[default]
    Hybrid,
    Collaborative,
    Content,
}

impl AlgorithmType {
    pub fn as_param(&self) -> &'static str {
        match self {
            AlgorithmType::Hybrid => "hybrid",
            AlgorithmType::Collaborative => "collaborative",
            AlgorithmType::Content => "content",
        }
    }

    /// Lenient parse; unknown values fall back to hybrid like the server does
    pub fn from_param(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "collaborative" => AlgorithmType::Collaborative,
            "content" => AlgorithmType::Content,
            _ => AlgorithmType::Hybrid,
        }
    }
}

impl Display for AlgorithmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_param())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub movie: Movie,
    pub score: Option<f64>,
    /// Algorithms that produced this item, e.g. ["collaborative", "content"]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationSet {
    pub algorithm: AlgorithmType,
    pub items: Vec<Recommendation>,
    /// Ordered union of the item sources
    pub source_tags: Vec<String>,
    /// Explanation sent by the server, e.g. when the user has no ratings yet
    pub notice: Option<String>,
}

impl RecommendationSet {
    pub fn new(algorithm: AlgorithmType, items: Vec<Recommendation>, notice: Option<String>) -> Self {
        let mut source_tags: Vec<String> = Vec::new();
        for source in items.iter().flat_map(|item| item.sources.iter()) {
            if !source_tags.contains(source) {
                source_tags.push(source.clone());
            }
        }
        Self {
            algorithm,
            items,
            source_tags,
            notice,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
