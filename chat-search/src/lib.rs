//! chat-search: conversational search over Slack
//!
//! Turns a loose query ("what did I discuss with these people about this
//! topic, lately?") into scoped `search.messages` calls, then enriches every
//! hit with its thread or surrounding messages, keeps only hits involving the
//! requested participants, and returns them deduplicated, newest first.
//!
//! # Example
//!
//! ```no_run
//! use chat_search::{Config, ConversationSearch, SearchRequest, TimeRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let engine = ConversationSearch::from_config(&config)?;
//!
//!     let request = SearchRequest::default()
//!         .with_emails(["ann@example.com"])
//!         .with_topic("launch plan")
//!         .with_time_range(TimeRange::Last7Days);
//!
//!     let result = engine.search(request).await?;
//!     println!("{} message(s)", result.messages.len());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`api`]: remote API seam, Slack client and in-memory workspace
//! - [`config`]: configuration management
//! - [`engine`]: search entry point
//! - [`scope`], [`query`], [`executor`]: turning a request into searches
//! - [`enrich`], [`mentions`], [`identity`]: hit enrichment
//! - [`rank`]: deduplication and ordering

pub mod api;
pub mod config;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod executor;
pub mod identity;
pub mod mentions;
pub mod query;
pub mod rank;
pub mod scope;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use engine::ConversationSearch;
pub use error::{Result, SearchError};
pub use query::TimeRange;
pub use types::{ContextMessage, EnrichedMessage, SearchRequest, SearchResult};

use config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides
/// `logging.level`.
pub fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.format.eq_ignore_ascii_case("json") {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;
    }

    Ok(())
}
