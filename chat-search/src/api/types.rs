//! Values exchanged with the remote chat API

use serde::{Deserialize, Serialize};

/// A search match exactly as returned by `search.messages`, not yet enriched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHit {
    /// Message timestamp (`"1700000000.123456"`)
    pub ts: String,
    /// Conversation the match lives in
    pub channel_id: String,
    /// Text with search highlighting markers
    pub text: String,
}

/// A single message from history/replies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiMessage {
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub reply_count: Option<u32>,
}

impl ApiMessage {
    /// Root timestamp of the thread this message belongs to, if any.
    ///
    /// A standalone message carries no `thread_ts`; a thread root carries its
    /// own `ts` and replies carry the root's.
    pub fn thread_root(&self) -> Option<&str> {
        self.thread_ts.as_deref().filter(|ts| !ts.is_empty())
    }
}

/// User profile as returned by `users.info` / `users.lookupByEmail`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    /// Handle (`name` field)
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserProfile {
    /// Best human-readable name: display name, then real name, then handle.
    pub fn preferred_name(&self) -> String {
        [self.display_name.as_deref(), self.real_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .unwrap_or(self.name.as_str())
            .to_string()
    }
}

/// Conversation kinds, decided once from conversation metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// 1:1 direct message
    Direct,
    /// Multi-party direct message
    Group,
    /// Public or private channel
    #[default]
    Channel,
}

impl ConversationKind {
    /// Direct and group conversations are filtered on membership, channels on
    /// authorship.
    pub fn is_private_conversation(&self) -> bool {
        matches!(self, ConversationKind::Direct | ConversationKind::Group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub id: String,
    pub name: Option<String>,
    pub kind: ConversationKind,
}

/// Bounds for a `conversations.history` call.
///
/// Pages are newest first and `limit` counts back from `latest` (or from now
/// when unset); `cursor` continues with the next, older page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryWindow {
    /// Only messages after this timestamp
    pub oldest: Option<String>,
    /// Only messages before this timestamp
    pub latest: Option<String>,
    /// Include messages exactly at `oldest`/`latest`
    pub inclusive: bool,
    pub limit: usize,
    pub cursor: Option<String>,
}

impl HistoryWindow {
    /// `limit` messages at or before `ts`.
    pub fn before(ts: &str, limit: usize) -> Self {
        Self {
            oldest: None,
            latest: Some(ts.to_string()),
            inclusive: true,
            limit,
            cursor: None,
        }
    }

    /// Messages strictly after `ts`, `page_size` per page starting from the
    /// newest. See [`crate::api::messages_after`] for the ones right after `ts`.
    pub fn after(ts: &str, page_size: usize) -> Self {
        Self {
            oldest: Some(ts.to_string()),
            latest: None,
            inclusive: false,
            limit: page_size,
            cursor: None,
        }
    }

    /// The single message at `ts`.
    pub fn exact(ts: &str) -> Self {
        Self {
            oldest: Some(ts.to_string()),
            latest: Some(ts.to_string()),
            inclusive: true,
            limit: 1,
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// One page of `conversations.history`
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    /// Newest first
    pub messages: Vec<ApiMessage>,
    /// Cursor of the next, older page
    pub next_cursor: Option<String>,
}
