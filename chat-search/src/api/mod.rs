//! Remote chat API abstraction
//!
//! Every remote call the search engine makes goes through [`ChatApi`], so the
//! engine can run against the real Slack Web API ([`SlackClient`]) or an
//! in-memory workspace ([`MockWorkspace`]).

use crate::error::Result;
use crate::rank::Timestamp;
use tracing::warn;

pub mod mock;
pub mod slack;
pub mod types;

pub use mock::MockWorkspace;
pub use slack::SlackClient;
pub use types::*;

/// Page size used when walking history forward from an anchor
pub const HISTORY_PAGE_SIZE: usize = 200;
/// Safety bound on history pagination
pub const MAX_HISTORY_PAGES: usize = 10;

/// Chat API trait
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    /// Id of the user owning the token
    async fn whoami(&self) -> Result<String>;

    /// Full-text search, newest first
    async fn search_messages(&self, query: &str, count: usize) -> Result<Vec<RawHit>>;

    async fn user_by_id(&self, user_id: &str) -> Result<UserProfile>;

    async fn user_by_email(&self, email: &str) -> Result<UserProfile>;

    /// The message at exactly `ts`, including thread replies
    async fn message(&self, channel: &str, ts: &str) -> Result<Option<ApiMessage>>;

    /// Thread root followed by its replies, oldest first
    async fn replies(&self, channel: &str, thread_ts: &str, limit: usize)
        -> Result<Vec<ApiMessage>>;

    /// One page of top-level messages inside `window`, newest first
    async fn history(&self, channel: &str, window: HistoryWindow) -> Result<HistoryPage>;

    /// Member user ids of a conversation
    async fn members(&self, channel: &str) -> Result<Vec<String>>;

    async fn conversation_info(&self, channel: &str) -> Result<ConversationInfo>;

    /// Open (or look up) the multi-party conversation among `user_ids` and
    /// return its id
    async fn open_conversation(&self, user_ids: &[String]) -> Result<String>;

    async fn permalink(&self, channel: &str, ts: &str) -> Result<String>;
}

/// The `count` top-level messages right after `ts`, oldest first.
///
/// History pages run newest first from the present, so every page down to
/// `ts` is walked and the oldest messages are kept. Returns nothing when
/// they lie beyond [`MAX_HISTORY_PAGES`].
pub async fn messages_after(
    api: &dyn ChatApi,
    channel: &str,
    ts: &str,
    count: usize,
) -> Result<Vec<ApiMessage>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut window = HistoryWindow::after(ts, HISTORY_PAGE_SIZE);
    let mut newer = Vec::new();

    for _ in 0..MAX_HISTORY_PAGES {
        let page = api.history(channel, window.clone()).await?;
        newer.extend(page.messages);

        match page.next_cursor.filter(|c| !c.is_empty()) {
            Some(cursor) => window = window.with_cursor(cursor),
            None => {
                newer.sort_by_key(|m| Timestamp::parse(&m.ts));
                newer.truncate(count);
                return Ok(newer);
            }
        }
    }

    warn!(
        "More than {} history pages after {} in {}; no messages after the anchor",
        MAX_HISTORY_PAGES, ts, channel
    );
    Ok(Vec::new())
}
