pub mod types;
pub mod canonical;
pub mod parser;
pub mod fetcher;
pub mod store;
pub mod aggregator;
pub mod reactions;
pub mod config;

pub use types::*;
pub use canonical::canonicalize;
pub use parser::FeedParser;
pub use fetcher::Fetcher;
pub use store::PgStore;
pub use aggregator::NewsAggregator;
pub use reactions::ReactionRecorder;
