use clap::Parser;
use news_aggregator::config::{Cli, Command};
use news_aggregator::{Fetcher, NewsAggregator, PgStore, ReactionRecorder};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the environment directly
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;
    settings.validate()?;

    info!("Connecting to database: {}", redact(&settings.database_url));

    let store = PgStore::connect(&settings.database_url, settings.max_connections)
        .await
        .map_err(|e| {
            error!("Failed to connect to database. Make sure PostgreSQL is running:");
            error!("  Check connection string: {}", redact(&settings.database_url));
            e
        })?;
    let store = Arc::new(store);

    match cli.command {
        Command::Init => {
            store.setup_schema().await?;
        }
        Command::AddSite { name, feed_url } => {
            let site = store.add_site(&name, &feed_url).await?;
            println!("{}", serde_json::to_string_pretty(&site)?);
        }
        Command::Sites => {
            let sites = store.list_sites().await?;
            println!("{}", serde_json::to_string_pretty(&sites)?);
        }
        Command::Latest(args) => {
            let fetch_config = settings.fetch_config();
            let fetch_timeout = fetch_config.timeout();
            let fetcher = Arc::new(Fetcher::new(fetch_config)?);

            let mut aggregator = NewsAggregator::new(store.clone(), fetcher, store.clone(), fetch_timeout);
            if let Some(seed) = settings.shuffle_seed {
                aggregator = aggregator.with_shuffle_seed(seed);
            }

            match aggregator.get_latest_news(args.into()).await {
                Ok(items) => println!("{}", serde_json::to_string_pretty(&items)?),
                Err(e) => {
                    error!("Aggregation failed (status {}): {}", e.status_code(), e);
                    return Err(e.into());
                }
            }
        }
        Command::React { article_id, value } => {
            let recorder = ReactionRecorder::new(store.clone(), store.clone());
            match recorder.record_reaction(article_id, value).await {
                Ok(reaction) => info!("Article {} now has reaction {}", article_id, reaction.as_i16()),
                Err(e) => {
                    error!("Failed to record reaction (status {}): {}", e.status_code(), e);
                    return Err(e.into());
                }
            }
        }
        Command::Liked { limit } => {
            let recorder = ReactionRecorder::new(store.clone(), store.clone());
            let liked = recorder.liked_articles(limit).await?;
            println!("{}", serde_json::to_string_pretty(&liked)?);
        }
    }

    Ok(())
}

/// Connection string with the password masked, for logging.
fn redact(database_url: &str) -> String {
    match Url::parse(database_url) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<unparseable database url>".to_string(),
    }
}
