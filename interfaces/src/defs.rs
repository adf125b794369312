use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub type SourceId = i64;
pub type ArticleId = i64;

/// A configured feed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub feed_url: String,
}

/// One entry as it came out of a feed, before any normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub link: String,
    pub guid: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
}

/// Insert payload for an article that has not been seen before.
/// `link` is always a canonical link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub link: String,
    pub guid: Option<String>,
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArticleState {
    pub article_id: ArticleId,
    pub has_reaction: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: ArticleId,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedArticle {
    pub id: ArticleId,
    pub link: String,
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i64")]
pub enum ReactionValue {
    Dislike,
    Neutral,
    Like,
}

impl ReactionValue {
    pub fn as_i16(self) -> i16 {
        match self {
            ReactionValue::Dislike => -1,
            ReactionValue::Neutral => 0,
            ReactionValue::Like => 1,
        }
    }
}

impl TryFrom<i64> for ReactionValue {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(ReactionValue::Dislike),
            0 => Ok(ReactionValue::Neutral),
            1 => Ok(ReactionValue::Like),
            other => Err(other),
        }
    }
}

impl From<ReactionValue> for i16 {
    fn from(value: ReactionValue) -> Self {
        value.as_i16()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Feed parse error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Fetching {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Feed at {url} exceeds the {limit_mb}MB size limit")]
    TooLarge { url: String, limit_mb: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate article link: {0}")]
    DuplicateLink(String),

    #[error("Article {article_id} does not exist")]
    UnknownArticle { article_id: ArticleId },

    #[error("Invalid article: {0}")]
    InvalidArticle(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

// Contract notes:
// Implementations are shared across concurrent requests behind an `Arc`, so
// every method takes `&self`. Anything that needs to be atomic (a batch
// insert, a reaction replacement) must be atomic inside one call; callers
// never hold a transaction open between calls.

#[async_trait]
pub trait SiteSampler: Send + Sync {
    /// Up to `limit` sources in random order. Fewer when fewer are configured.
    async fn sample_sources(&self, limit: usize) -> Result<Vec<Source>, StoreError>;
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Download and parse one feed. Must give up once `timeout` has elapsed.
    async fn fetch_entries(&self, feed_url: &str, timeout: Duration) -> Result<Vec<RawEntry>, FetchError>;
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// State for the links that are already stored. Unknown links are omitted.
    async fn lookup_article_states(&self, links: &[String]) -> Result<HashMap<String, ArticleState>, StoreError>;

    /// Insert a batch in one transaction and return the new ids keyed by link.
    ///
    /// A link that turns out to exist already is either left out of the
    /// returned map or reported as `StoreError::DuplicateLink` with the whole
    /// batch rolled back. An empty title is `StoreError::InvalidArticle`.
    /// An empty batch is a no-op.
    async fn insert_articles(&self, articles: &[NewArticle]) -> Result<HashMap<String, ArticleId>, StoreError>;

    /// Articles carrying a `Like` reaction, newest first.
    async fn liked_articles(&self, limit: Option<usize>) -> Result<Vec<LikedArticle>, StoreError>;
}

#[async_trait]
pub trait ReactionStore: Send + Sync {
    /// Replace whatever reaction the article had. Unknown articles are
    /// `StoreError::UnknownArticle`.
    async fn replace_reaction(&self, article_id: ArticleId, value: ReactionValue) -> Result<(), StoreError>;
}
