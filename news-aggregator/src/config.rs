use crate::types::{AggregatorError, FetchConfig, NewsQuery, Result};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "news-aggregator", version, about = "Aggregate articles from configured news feeds")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "NEWS_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Per-feed fetch timeout in seconds
    #[arg(long, env = "NEWS_FETCH_TIMEOUT_SECS", default_value_t = 15)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "NEWS_USER_AGENT", default_value = "News-Aggregator/1.0")]
    pub user_agent: String,

    /// Fixed seed for the candidate shuffle
    #[arg(long, env = "NEWS_SHUFFLE_SEED")]
    pub shuffle_seed: Option<u64>,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(AggregatorError::Config("database URL is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(AggregatorError::Config("max connections must be at least 1".to_string()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(AggregatorError::Config("fetch timeout must be at least 1 second".to_string()));
        }
        Ok(())
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout_seconds: self.fetch_timeout_secs,
            ..FetchConfig::default()
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database tables
    Init,

    /// Register a feed
    AddSite { name: String, feed_url: String },

    /// List registered feeds
    Sites,

    /// Aggregate the latest unreacted articles and print them as JSON
    Latest(LatestArgs),

    /// Record a reaction (-1, 0 or 1) on an article
    React {
        article_id: i64,
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },

    /// Print liked articles as JSON, newest first
    Liked {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, Args)]
pub struct LatestArgs {
    #[arg(long, default_value_t = 5)]
    pub max_sources: usize,

    #[arg(long, default_value_t = 5)]
    pub per_source_limit: usize,

    #[arg(long, default_value_t = 5)]
    pub max_items: usize,
}

impl From<LatestArgs> for NewsQuery {
    fn from(args: LatestArgs) -> Self {
        Self {
            max_sources: args.max_sources,
            per_source_limit: args.per_source_limit,
            max_items: args.max_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_defaults_match_news_query_defaults() {
        let cli = Cli::try_parse_from(["news-aggregator", "--database-url", "postgres://localhost/news", "latest"])
            .unwrap();
        match cli.command {
            Command::Latest(args) => assert_eq!(NewsQuery::from(args), NewsQuery::default()),
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.settings.fetch_config().timeout_seconds, 15);
    }

    #[test]
    fn react_accepts_negative_values() {
        let cli = Cli::try_parse_from([
            "news-aggregator",
            "--database-url",
            "postgres://localhost/news",
            "react",
            "7",
            "-1",
        ])
        .unwrap();
        match cli.command {
            Command::React { article_id, value } => {
                assert_eq!(article_id, 7);
                assert_eq!(value, -1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn zero_sized_settings_are_rejected() {
        let cli = Cli::try_parse_from([
            "news-aggregator",
            "--database-url",
            "postgres://localhost/news",
            "--max-connections",
            "0",
            "sites",
        ])
        .unwrap();
        assert!(matches!(cli.settings.validate(), Err(AggregatorError::Config(_))));

        let cli = Cli::try_parse_from(["news-aggregator", "--database-url", "postgres://localhost/news", "sites"])
            .unwrap();
        assert!(cli.settings.validate().is_ok());
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
