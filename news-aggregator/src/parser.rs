use crate::types::RawEntry;
use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use tracing::debug;

pub struct FeedParser;

impl FeedParser {
    /// Parse an RSS/Atom document into raw entries, in document order.
    pub fn parse_entries(content: &[u8]) -> std::result::Result<Vec<RawEntry>, String> {
        debug!("Parsing feed content ({} bytes)", content.len());

        // Entries without an id keep an empty one instead of a generated hash
        let feed = parser::Builder::new()
            .id_generator(|_links, _title, _uri| String::new())
            .build()
            .parse(content)
            .map_err(|e| format!("Failed to parse feed: {}", e))?;

        let entries: Vec<RawEntry> = feed.entries.into_iter().map(Self::convert_entry).collect();

        debug!("Parsed feed with {} entries", entries.len());
        Ok(entries)
    }

    fn convert_entry(entry: Entry) -> RawEntry {
        let link = Self::primary_link(&entry.links).unwrap_or_default();

        let guid = if entry.id.trim().is_empty() {
            None
        } else {
            Some(entry.id.clone())
        };

        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty());

        // Prefer the summary/description, fall back to the full content body
        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .filter(|s| !s.trim().is_empty());

        RawEntry {
            link,
            guid,
            title,
            summary,
        }
    }

    fn primary_link(links: &[Link]) -> Option<String> {
        links
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
            .or_else(|| links.first())
            .map(|l| l.href.trim().to_string())
    }
}
