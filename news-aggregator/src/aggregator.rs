use crate::canonical::canonicalize;
use crate::types::{
    AggregatorError, ArticleId, ArticleState, ArticleStore, FeedFetcher, NewArticle, NewsItem, NewsQuery, RawEntry,
    Result, SiteSampler, Source, StoreError,
};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How many times a batch insert is retried after the store reports a link
/// that was stored by a concurrent pass.
const MAX_INSERT_ATTEMPTS: usize = 3;

/// A feed entry paired with the source it came from.
struct Candidate<'a> {
    entry: RawEntry,
    source: &'a Source,
}

/// A candidate that survived filtering, keyed by its canonical link.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PreparedCandidate {
    link: String,
    guid: Option<String>,
    title: String,
    summary: String,
    source_name: String,
}

impl PreparedCandidate {
    fn to_new_article(&self) -> NewArticle {
        NewArticle {
            link: self.link.clone(),
            guid: self.guid.clone(),
            title: self.title.clone(),
            summary: self.summary.clone(),
        }
    }
}

pub struct NewsAggregator {
    sampler: Arc<dyn SiteSampler>,
    fetcher: Arc<dyn FeedFetcher>,
    articles: Arc<dyn ArticleStore>,
    fetch_timeout: Duration,
    shuffle_seed: Option<u64>,
}

impl NewsAggregator {
    pub fn new(
        sampler: Arc<dyn SiteSampler>,
        fetcher: Arc<dyn FeedFetcher>,
        articles: Arc<dyn ArticleStore>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            sampler,
            fetcher,
            articles,
            fetch_timeout,
            shuffle_seed: None,
        }
    }

    /// Fix the candidate shuffle so a pass is reproducible.
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Sample sources, pull their feeds and return up to `max_items`
    /// articles the user has not reacted to yet. New articles are stored on
    /// the way.
    pub async fn get_latest_news(&self, query: NewsQuery) -> Result<Vec<NewsItem>> {
        let start_time = Instant::now();

        let sources = self.sampler.sample_sources(query.max_sources).await?;
        if sources.is_empty() {
            return Err(AggregatorError::NoSourceConfigured);
        }

        let mut candidates = self.collect_candidates(&sources, query.per_source_limit).await?;
        let candidate_count = candidates.len();
        self.shuffle(&mut candidates);

        let prepared = prepare_candidates(candidates, query.max_items);
        if prepared.is_empty() {
            info!("No usable entries among {} candidates", candidate_count);
            return Ok(Vec::new());
        }

        let links: Vec<String> = prepared.iter().map(|c| c.link.clone()).collect();
        let mut states = self.articles.lookup_article_states(&links).await?;
        let fresh = self.insert_new_articles(&prepared, &mut states).await?;

        let items = assemble_items(prepared, &fresh, &states, query.max_items);

        info!(
            "Aggregated {} items from {} sources ({} candidates, {} new articles) in {}ms",
            items.len(),
            sources.len(),
            candidate_count,
            fresh.len(),
            start_time.elapsed().as_millis()
        );
        Ok(items)
    }

    async fn collect_candidates<'a>(
        &self,
        sources: &'a [Source],
        per_source_limit: usize,
    ) -> Result<Vec<Candidate<'a>>> {
        let fetches = sources.iter().map(|source| async move {
            let outcome = tokio::time::timeout(
                self.fetch_timeout,
                self.fetcher.fetch_entries(&source.feed_url, self.fetch_timeout),
            )
            .await;
            (source, outcome)
        });

        let mut candidates = Vec::new();
        let mut failed = 0usize;

        for (source, outcome) in join_all(fetches).await {
            match outcome {
                Ok(Ok(entries)) => {
                    debug!("Source {} returned {} entries", source.name, entries.len());
                    candidates.extend(
                        entries
                            .into_iter()
                            .take(per_source_limit)
                            .map(|entry| Candidate { entry, source }),
                    );
                }
                Ok(Err(e)) => {
                    failed += 1;
                    warn!("Failed to fetch feed for source {} ({}): {}", source.name, source.feed_url, e);
                }
                Err(_) => {
                    failed += 1;
                    warn!(
                        "Feed for source {} ({}) timed out after {:?}",
                        source.name, source.feed_url, self.fetch_timeout
                    );
                }
            }
        }

        if failed == sources.len() {
            return Err(AggregatorError::FeedUnavailable { attempted: sources.len() });
        }

        debug!("Collected {} candidates, {}/{} sources failed", candidates.len(), failed, sources.len());
        Ok(candidates)
    }

    fn shuffle<T>(&self, items: &mut [T]) {
        match self.shuffle_seed {
            Some(seed) => items.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => items.shuffle(&mut rand::thread_rng()),
        }
    }

    /// Insert the candidates the store does not know yet and return their
    /// ids. Links that turn out to be stored already are resolved into
    /// `states` instead.
    async fn insert_new_articles(
        &self,
        prepared: &[PreparedCandidate],
        states: &mut HashMap<String, ArticleState>,
    ) -> Result<HashMap<String, ArticleId>> {
        let mut pending: Vec<NewArticle> = prepared
            .iter()
            .filter(|c| !states.contains_key(&c.link))
            .map(PreparedCandidate::to_new_article)
            .collect();
        let new_links: Vec<String> = pending.iter().map(|a| a.link.clone()).collect();

        let mut fresh = HashMap::new();
        let mut attempts = 0;
        while !pending.is_empty() {
            attempts += 1;
            match self.articles.insert_articles(&pending).await {
                Ok(inserted) => {
                    fresh.extend(inserted);
                    break;
                }
                Err(StoreError::DuplicateLink(detail)) => {
                    warn!(
                        "Batch insert rejected ({}), re-checking {} links stored concurrently",
                        detail,
                        pending.len()
                    );
                    if attempts >= MAX_INSERT_ATTEMPTS {
                        // Left to the final lookup below; anything still unresolved is skipped
                        warn!("Giving up inserting {} links after {} attempts", pending.len(), attempts);
                        break;
                    }
                    let links: Vec<String> = pending.iter().map(|a| a.link.clone()).collect();
                    let known = self.articles.lookup_article_states(&links).await?;
                    pending.retain(|a| !known.contains_key(&a.link));
                    states.extend(known);
                }
                Err(e) => return Err(e.into()),
            }
        }

        // The store skips links that another pass inserted after our lookup, and
        // an abandoned batch leaves links unresolved
        let skipped: Vec<String> = new_links
            .into_iter()
            .filter(|link| !fresh.contains_key(link) && !states.contains_key(link))
            .collect();
        if !skipped.is_empty() {
            debug!("Resolving {} links stored by a concurrent pass", skipped.len());
            let known = self.articles.lookup_article_states(&skipped).await?;
            states.extend(known);
        }

        Ok(fresh)
    }
}

/// Filter candidates in order until `max_items` remain. Drops entries with no
/// link, a link that does not canonicalize, no title, or a canonical link
/// seen earlier in the list.
fn prepare_candidates(candidates: Vec<Candidate<'_>>, max_items: usize) -> Vec<PreparedCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut prepared = Vec::new();

    for Candidate { entry, source } in candidates {
        if prepared.len() >= max_items {
            break;
        }

        let raw_link = entry.link.trim();
        if raw_link.is_empty() {
            debug!("Skipping entry without link from {}", source.name);
            continue;
        }

        let link = match canonicalize(raw_link) {
            Ok(link) => link,
            Err(e) => {
                debug!("Skipping entry from {}: {}", source.name, e);
                continue;
            }
        };

        let title = match entry.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => {
                debug!("Skipping untitled entry: {}", link);
                continue;
            }
        };

        if !seen.insert(link.clone()) {
            debug!("Skipping duplicate entry: {}", link);
            continue;
        }

        prepared.push(PreparedCandidate {
            link,
            guid: entry.guid,
            title,
            summary: entry.summary.unwrap_or_default(),
            source_name: source.name.clone(),
        });
    }

    prepared
}

/// Resolve ids in prepared order. Known articles with a reaction are left out.
fn assemble_items(
    prepared: Vec<PreparedCandidate>,
    fresh: &HashMap<String, ArticleId>,
    states: &HashMap<String, ArticleState>,
    max_items: usize,
) -> Vec<NewsItem> {
    let mut items = Vec::new();

    for candidate in prepared {
        if items.len() >= max_items {
            break;
        }

        let id = if let Some(id) = fresh.get(&candidate.link) {
            *id
        } else if let Some(state) = states.get(&candidate.link) {
            if state.has_reaction {
                debug!("Skipping already reacted article {}", state.article_id);
                continue;
            }
            state.article_id
        } else {
            warn!("No article id resolved for {}", candidate.link);
            continue;
        };

        items.push(NewsItem {
            id,
            title: candidate.title,
            link: candidate.link,
            summary: candidate.summary,
            source: candidate.source_name,
        });
    }

    items
}
