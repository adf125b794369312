// In-memory collaborators shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use news_aggregator::types::{
    ArticleId, ArticleState, ArticleStore, FeedFetcher, FetchError, LikedArticle, NewArticle, RawEntry, ReactionStore,
    ReactionValue, SiteSampler, Source, StoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn source(id: i64, name: &str) -> Source {
    Source {
        id,
        name: name.to_string(),
        feed_url: format!("https://{}.example/feed.xml", name),
    }
}

pub fn entry(link: &str, title: &str) -> RawEntry {
    RawEntry {
        link: link.to_string(),
        guid: Some(format!("guid:{}", link)),
        title: Some(title.to_string()),
        summary: Some(format!("Summary of {}", title)),
    }
}

pub struct StaticSampler {
    sources: Vec<Source>,
}

impl StaticSampler {
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl SiteSampler for StaticSampler {
    async fn sample_sources(&self, limit: usize) -> Result<Vec<Source>, StoreError> {
        Ok(self.sources.iter().take(limit).cloned().collect())
    }
}

#[derive(Clone)]
pub enum FetchScript {
    Entries(Vec<RawEntry>),
    Fail,
    Hang,
}

/// Fetcher answering from a fixed table keyed by feed URL. Unknown URLs fail.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<String, FetchScript>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: &Source, script: FetchScript) -> Self {
        self.scripts.insert(source.feed_url.clone(), script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch_entries(&self, feed_url: &str, _timeout: Duration) -> Result<Vec<RawEntry>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(feed_url).cloned() {
            Some(FetchScript::Entries(entries)) => Ok(entries),
            Some(FetchScript::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Some(FetchScript::Fail) | None => Err(FetchError::Status {
                url: feed_url.to_string(),
                status: 503,
            }),
        }
    }
}

/// How the memory store reacts to inserting a link it already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictMode {
    /// Leave the link out of the result, like `ON CONFLICT DO NOTHING`.
    Skip,
    /// Reject the whole batch and keep nothing from it.
    Reject,
}

#[derive(Debug, Clone)]
pub struct StoredArticle {
    pub id: ArticleId,
    pub article: NewArticle,
}

#[derive(Default)]
struct MemoryState {
    next_id: ArticleId,
    articles: HashMap<String, StoredArticle>,
    reactions: HashMap<ArticleId, ReactionValue>,
    insert_attempts: HashMap<String, usize>,
}

/// Article and reaction store with a unique link constraint and a foreign
/// key from reactions to articles.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    conflict_mode: ConflictMode,
    stale_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_conflict_mode(ConflictMode::Skip)
    }

    pub fn with_conflict_mode(conflict_mode: ConflictMode) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                ..MemoryState::default()
            }),
            conflict_mode,
            stale_lookups: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` lookups report nothing, as if another pass
    /// stored the links right after we looked.
    pub fn serve_stale_lookups(&self, count: usize) {
        self.stale_lookups.store(count, Ordering::SeqCst);
    }

    pub fn seed_article(&self, link: &str, title: &str) -> ArticleId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.articles.insert(
            link.to_string(),
            StoredArticle {
                id,
                article: NewArticle {
                    link: link.to_string(),
                    guid: None,
                    title: title.to_string(),
                    summary: String::new(),
                },
            },
        );
        id
    }

    pub fn seed_reaction(&self, article_id: ArticleId, value: ReactionValue) {
        self.state.lock().unwrap().reactions.insert(article_id, value);
    }

    pub fn article(&self, link: &str) -> Option<StoredArticle> {
        self.state.lock().unwrap().articles.get(link).cloned()
    }

    pub fn article_count(&self) -> usize {
        self.state.lock().unwrap().articles.len()
    }

    /// Rows actually written for `link`, conflicts excluded.
    pub fn insert_count(&self, link: &str) -> usize {
        self.state.lock().unwrap().insert_attempts.get(link).copied().unwrap_or(0)
    }

    pub fn reaction(&self, article_id: ArticleId) -> Option<ReactionValue> {
        self.state.lock().unwrap().reactions.get(&article_id).copied()
    }

    pub fn reaction_count(&self) -> usize {
        self.state.lock().unwrap().reactions.len()
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn lookup_article_states(&self, links: &[String]) -> Result<HashMap<String, ArticleState>, StoreError> {
        let stale = self
            .stale_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(HashMap::new());
        }

        let state = self.state.lock().unwrap();
        Ok(links
            .iter()
            .filter_map(|link| {
                state.articles.get(link).map(|stored| {
                    (
                        link.clone(),
                        ArticleState {
                            article_id: stored.id,
                            has_reaction: state.reactions.contains_key(&stored.id),
                        },
                    )
                })
            })
            .collect())
    }

    async fn insert_articles(&self, articles: &[NewArticle]) -> Result<HashMap<String, ArticleId>, StoreError> {
        let mut state = self.state.lock().unwrap();

        // Validate the whole batch first so a failure leaves nothing behind
        for article in articles {
            if article.title.trim().is_empty() {
                return Err(StoreError::InvalidArticle(format!("empty title for {}", article.link)));
            }
            if self.conflict_mode == ConflictMode::Reject && state.articles.contains_key(&article.link) {
                return Err(StoreError::DuplicateLink(article.link.clone()));
            }
        }

        let mut inserted = HashMap::new();
        for article in articles {
            if state.articles.contains_key(&article.link) {
                continue;
            }
            let id = state.next_id;
            state.next_id += 1;
            state.articles.insert(
                article.link.clone(),
                StoredArticle {
                    id,
                    article: article.clone(),
                },
            );
            *state.insert_attempts.entry(article.link.clone()).or_insert(0) += 1;
            inserted.insert(article.link.clone(), id);
        }
        Ok(inserted)
    }

    async fn liked_articles(&self, limit: Option<usize>) -> Result<Vec<LikedArticle>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut liked: Vec<LikedArticle> = state
            .articles
            .values()
            .filter(|stored| state.reactions.get(&stored.id) == Some(&ReactionValue::Like))
            .map(|stored| LikedArticle {
                id: stored.id,
                link: stored.article.link.clone(),
                title: stored.article.title.clone(),
                summary: stored.article.summary.clone(),
            })
            .collect();
        // Ids grow with insertion time
        liked.sort_by(|a, b| b.id.cmp(&a.id));
        if let Some(limit) = limit {
            liked.truncate(limit);
        }
        Ok(liked)
    }
}

#[async_trait]
impl ReactionStore for MemoryStore {
    async fn replace_reaction(&self, article_id: ArticleId, value: ReactionValue) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.articles.values().any(|stored| stored.id == article_id) {
            return Err(StoreError::UnknownArticle { article_id });
        }
        state.reactions.insert(article_id, value);
        Ok(())
    }
}
