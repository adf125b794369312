use std::time::Duration;
// Use the interfaces crate for the shared data contracts
pub use interfaces::defs::{
    ArticleId, ArticleState, FetchError, LikedArticle, NewArticle, NewsItem, RawEntry, ReactionValue, Source,
    SourceId, StoreError,
};
pub use interfaces::defs::{ArticleStore, FeedFetcher, ReactionStore, SiteSampler};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "News-Aggregator/1.0".to_string(),
            timeout_seconds: 15,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

/// Bounds for one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewsQuery {
    pub max_sources: usize,
    pub per_source_limit: usize,
    pub max_items: usize,
}

impl Default for NewsQuery {
    fn default() -> Self {
        Self {
            max_sources: 5,
            per_source_limit: 5,
            max_items: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("No news source is configured")]
    NoSourceConfigured,

    #[error("All {attempted} sampled feeds failed to load")]
    FeedUnavailable { attempted: usize },

    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid reaction value {0}, expected -1, 0 or 1")]
    InvalidReaction(i64),

    #[error("Article not found: {article_id}")]
    ArticleNotFound { article_id: ArticleId },

    #[error("Invalid article: {0}")]
    InvalidArticle(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for AggregatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownArticle { article_id } => AggregatorError::ArticleNotFound { article_id },
            StoreError::InvalidArticle(message) => AggregatorError::InvalidArticle(message),
            other => AggregatorError::Storage(other),
        }
    }
}

impl AggregatorError {
    /// HTTP status the request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoSourceConfigured => 404,
            Self::FeedUnavailable { .. } => 502,
            Self::InvalidUrl { .. } => 400,
            Self::InvalidReaction(_) => 400,
            Self::ArticleNotFound { .. } => 404,
            Self::InvalidArticle(_) => 500,
            Self::Storage(_) => 500,
            Self::Database(_) => 500,
            Self::Http(_) => 500,
            Self::Config(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
