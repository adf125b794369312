use crate::types::{AggregatorError, ArticleId, ArticleStore, LikedArticle, ReactionStore, ReactionValue, Result};
use std::sync::Arc;
use tracing::info;

pub struct ReactionRecorder {
    reactions: Arc<dyn ReactionStore>,
    articles: Arc<dyn ArticleStore>,
}

impl ReactionRecorder {
    pub fn new(reactions: Arc<dyn ReactionStore>, articles: Arc<dyn ArticleStore>) -> Self {
        Self { reactions, articles }
    }

    /// Store `value` (-1, 0 or 1) as the only reaction on the article.
    pub async fn record_reaction(&self, article_id: ArticleId, value: i64) -> Result<ReactionValue> {
        let reaction = ReactionValue::try_from(value).map_err(AggregatorError::InvalidReaction)?;

        // UnknownArticle becomes ArticleNotFound through the From impl
        self.reactions.replace_reaction(article_id, reaction).await?;

        info!("Recorded reaction {} for article {}", reaction.as_i16(), article_id);
        Ok(reaction)
    }

    pub async fn liked_articles(&self, limit: Option<usize>) -> Result<Vec<LikedArticle>> {
        Ok(self.articles.liked_articles(limit).await?)
    }
}
