use crate::parser::FeedParser;
use crate::types::{FeedFetcher, FetchConfig, FetchError, RawEntry, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// HTTP feed fetcher backed by reqwest and feed-rs.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let limit_bytes = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit_mb: self.config.max_feed_size_mb,
                });
            }
        }

        let body = response.bytes().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        // Servers are free to omit or misreport Content-Length
        if body.len() > limit_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit_mb: self.config.max_feed_size_mb,
            });
        }

        Ok(body.to_vec())
    }
}

#[async_trait]
impl FeedFetcher for Fetcher {
    async fn fetch_entries(&self, feed_url: &str, timeout: Duration) -> std::result::Result<Vec<RawEntry>, FetchError> {
        let start_time = Instant::now();
        debug!("Fetching feed: {}", feed_url);

        let body = tokio::time::timeout(timeout, self.download(feed_url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: feed_url.to_string(),
                timeout,
            })??;

        let entries = FeedParser::parse_entries(&body).map_err(|message| FetchError::Parse {
            url: feed_url.to_string(),
            message,
        })?;

        info!(
            "Fetched feed {} ({} bytes, {} entries) in {}ms",
            feed_url,
            body.len(),
            entries.len(),
            start_time.elapsed().as_millis()
        );
        Ok(entries)
    }
}
