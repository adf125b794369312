use crate::types::{
    ArticleId, ArticleState, ArticleStore, LikedArticle, NewArticle, ReactionStore, ReactionValue, Result, SiteSampler,
    Source, StoreError,
};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info};

/// PostgreSQL-backed sites, articles and reactions.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { db })
    }

    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sites (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                feed_url TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id BIGSERIAL PRIMARY KEY,
                link TEXT NOT NULL UNIQUE,
                guid TEXT,
                title TEXT NOT NULL CHECK (title <> ''),
                summary TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_reactions (
                article_id BIGINT PRIMARY KEY REFERENCES articles(id) ON DELETE CASCADE,
                value SMALLINT NOT NULL CHECK (value IN (-1, 0, 1)),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        info!("Database schema is ready");
        Ok(())
    }

    /// Register a site, or rename it when the feed URL is already known.
    pub async fn add_site(&self, name: &str, feed_url: &str) -> Result<Source> {
        let row = sqlx::query(
            r#"
            INSERT INTO sites (name, feed_url)
            VALUES ($1, $2)
            ON CONFLICT (feed_url)
            DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, feed_url
            "#,
        )
        .bind(name)
        .bind(feed_url)
        .fetch_one(&self.db)
        .await?;

        let site = Source {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            feed_url: row.try_get("feed_url")?,
        };
        info!("Added site: {} ({}) with ID: {}", site.name, site.feed_url, site.id);
        Ok(site)
    }

    pub async fn list_sites(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query("SELECT id, name, feed_url FROM sites ORDER BY id")
            .fetch_all(&self.db)
            .await?;

        let mut sites = Vec::with_capacity(rows.len());
        for row in rows {
            sites.push(Source {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                feed_url: row.try_get("feed_url")?,
            });
        }
        Ok(sites)
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateLink(db_err.message().to_string());
        }
        if db_err.is_check_violation() {
            return StoreError::InvalidArticle(db_err.message().to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl SiteSampler for PgStore {
    async fn sample_sources(&self, limit: usize) -> std::result::Result<Vec<Source>, StoreError> {
        let rows = sqlx::query("SELECT id, name, feed_url FROM sites ORDER BY random() LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.db)
            .await
            .map_err(store_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(Source {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    feed_url: row.try_get("feed_url")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(store_error)
    }
}

#[async_trait]
impl ArticleStore for PgStore {
    async fn lookup_article_states(
        &self,
        links: &[String],
    ) -> std::result::Result<HashMap<String, ArticleState>, StoreError> {
        if links.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT a.link,
                   a.id,
                   EXISTS (
                       SELECT 1 FROM article_reactions ar WHERE ar.article_id = a.id
                   ) AS has_reaction
            FROM articles a
            WHERE a.link = ANY($1)
            "#,
        )
        .bind(links)
        .fetch_all(&self.db)
        .await
        .map_err(store_error)?;

        let mut states = HashMap::with_capacity(rows.len());
        for row in rows {
            let link: String = row.try_get("link").map_err(store_error)?;
            let state = ArticleState {
                article_id: row.try_get("id").map_err(store_error)?,
                has_reaction: row.try_get("has_reaction").map_err(store_error)?,
            };
            states.insert(link, state);
        }
        Ok(states)
    }

    async fn insert_articles(
        &self,
        articles: &[NewArticle],
    ) -> std::result::Result<HashMap<String, ArticleId>, StoreError> {
        if articles.is_empty() {
            return Ok(HashMap::new());
        }

        let mut tx = self.db.begin().await.map_err(store_error)?;
        let mut inserted = HashMap::with_capacity(articles.len());

        for article in articles {
            if article.title.trim().is_empty() {
                // Dropping the transaction rolls back the rows inserted so far
                return Err(StoreError::InvalidArticle(format!(
                    "article title must be provided ({})",
                    article.link
                )));
            }

            // A concurrent pass may have stored the link since the lookup
            let row = sqlx::query(
                r#"
                INSERT INTO articles (link, guid, title, summary)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (link) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(&article.link)
            .bind(&article.guid)
            .bind(&article.title)
            .bind(&article.summary)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;

            match row {
                Some(row) => {
                    let id: ArticleId = row.try_get("id").map_err(store_error)?;
                    inserted.insert(article.link.clone(), id);
                }
                None => debug!("Article already stored, skipping insert: {}", article.link),
            }
        }

        tx.commit().await.map_err(store_error)?;

        debug!("Inserted {} of {} articles", inserted.len(), articles.len());
        Ok(inserted)
    }

    async fn liked_articles(&self, limit: Option<usize>) -> std::result::Result<Vec<LikedArticle>, StoreError> {
        // LIMIT NULL means no limit
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.link, a.title, a.summary
            FROM articles a
            JOIN article_reactions ar ON ar.article_id = a.id
            WHERE ar.value = 1
            ORDER BY a.created_at DESC, a.id DESC
            LIMIT $1
            "#,
        )
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.db)
        .await
        .map_err(store_error)?;

        let mut liked = Vec::with_capacity(rows.len());
        for row in rows {
            let summary: Option<String> = row.try_get("summary").map_err(store_error)?;
            liked.push(LikedArticle {
                id: row.try_get("id").map_err(store_error)?,
                link: row.try_get("link").map_err(store_error)?,
                title: row.try_get("title").map_err(store_error)?,
                summary: summary.unwrap_or_default(),
            });
        }
        Ok(liked)
    }
}

#[async_trait]
impl ReactionStore for PgStore {
    async fn replace_reaction(&self, article_id: ArticleId, value: ReactionValue) -> std::result::Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO article_reactions (article_id, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (article_id)
            DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()
            "#,
        )
        .bind(article_id)
        .bind(value.as_i16())
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {
                debug!("Stored reaction {} for article {}", value.as_i16(), article_id);
                Ok(())
            }
            Err(err) if is_foreign_key_violation(&err) => Err(StoreError::UnknownArticle { article_id }),
            Err(err) => Err(store_error(err)),
        }
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map_or(false, |db_err| db_err.is_foreign_key_violation())
}
