//! In-memory chat workspace
//!
//! A deterministic [`ChatApi`] implementation holding users, conversations and
//! messages in memory. It understands the subset of the search query language
//! the engine emits (`in:` operands and keywords; time tokens are ignored),
//! records the calls it receives and can be told to fail specific calls.

use super::{
    ApiMessage, ChatApi, ConversationInfo, ConversationKind, HistoryPage, HistoryWindow, RawHit,
    UserProfile,
};
use crate::error::{Result, SearchError};
use crate::rank::Timestamp;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct MockConversation {
    info: ConversationInfo,
    members: Vec<String>,
    messages: Vec<ApiMessage>,
}

/// Calls received by a [`MockWorkspace`]
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub search_queries: Vec<String>,
    pub user_lookups: Vec<String>,
    pub email_lookups: Vec<String>,
    pub open_requests: Vec<Vec<String>>,
    pub member_fetches: Vec<String>,
    pub info_fetches: Vec<String>,
    /// Number of `conversations.history` pages served
    pub history_pages: usize,
}

/// In-memory workspace implementing [`ChatApi`]
pub struct MockWorkspace {
    me: String,
    users: HashMap<String, UserProfile>,
    conversations: HashMap<String, MockConversation>,
    fail_open: bool,
    broken_permalinks: HashSet<(String, String)>,
    latency: Option<Duration>,
    calls: Mutex<CallLog>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockWorkspace {
    /// Empty workspace whose token belongs to `me`
    pub fn new(me: &str, me_name: &str, me_email: &str) -> Self {
        Self {
            me: me.to_string(),
            users: HashMap::new(),
            conversations: HashMap::new(),
            fail_open: false,
            broken_permalinks: HashSet::new(),
            latency: None,
            calls: Mutex::new(CallLog::default()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
        .with_user(me, me_name, me_email)
    }

    pub fn with_user(mut self, id: &str, name: &str, email: &str) -> Self {
        self.users.insert(
            id.to_string(),
            UserProfile {
                id: id.to_string(),
                name: name.to_lowercase().replace(' ', "."),
                real_name: Some(name.to_string()),
                display_name: Some(name.to_string()),
                email: Some(email.to_string()),
            },
        );
        self
    }

    /// 1:1 conversation between the token owner and `other`
    pub fn with_direct(self, id: &str, other: &str) -> Self {
        let members = vec![self.me.clone(), other.to_string()];
        self.with_conversation(id, None, ConversationKind::Direct, members)
    }

    /// Multi-party conversation; the token owner is added to `members`
    pub fn with_group(self, id: &str, name: &str, members: &[&str]) -> Self {
        let mut all = vec![self.me.clone()];
        all.extend(members.iter().map(|m| m.to_string()));
        self.with_conversation(id, Some(name), ConversationKind::Group, all)
    }

    pub fn with_channel(self, id: &str, name: &str, members: &[&str]) -> Self {
        let members = members.iter().map(|m| m.to_string()).collect();
        self.with_conversation(id, Some(name), ConversationKind::Channel, members)
    }

    fn with_conversation(
        mut self,
        id: &str,
        name: Option<&str>,
        kind: ConversationKind,
        members: Vec<String>,
    ) -> Self {
        self.conversations.insert(
            id.to_string(),
            MockConversation {
                info: ConversationInfo {
                    id: id.to_string(),
                    name: name.map(str::to_string),
                    kind,
                },
                members,
                messages: Vec::new(),
            },
        );
        self
    }

    /// Top-level message. Unknown conversations are ignored.
    pub fn with_message(mut self, channel: &str, ts: &str, user: &str, text: &str) -> Self {
        if let Some(conversation) = self.conversations.get_mut(channel) {
            conversation.messages.push(ApiMessage {
                ts: ts.to_string(),
                user: Some(user.to_string()),
                text: text.to_string(),
                thread_ts: None,
                reply_count: None,
            });
        }
        self
    }

    /// Reply to the top-level message at `thread_ts`
    pub fn with_reply(
        mut self,
        channel: &str,
        thread_ts: &str,
        ts: &str,
        user: &str,
        text: &str,
    ) -> Self {
        if let Some(conversation) = self.conversations.get_mut(channel) {
            if let Some(root) = conversation.messages.iter_mut().find(|m| m.ts == thread_ts) {
                root.thread_ts = Some(thread_ts.to_string());
                root.reply_count = Some(root.reply_count.unwrap_or(0) + 1);
            }
            conversation.messages.push(ApiMessage {
                ts: ts.to_string(),
                user: Some(user.to_string()),
                text: text.to_string(),
                thread_ts: Some(thread_ts.to_string()),
                reply_count: None,
            });
        }
        self
    }

    /// Make `conversations.open` fail
    pub fn failing_open_conversation(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make `chat.getPermalink` fail for one message
    pub fn failing_permalink(mut self, channel: &str, ts: &str) -> Self {
        self.broken_permalinks.insert((channel.to_string(), ts.to_string()));
        self
    }

    /// Delay every anchor fetch and conversation lookup, so concurrent
    /// enrichments overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Snapshot of the calls received so far
    pub fn calls(&self) -> CallLog {
        self.log().clone()
    }

    /// Highest number of simultaneous `message` calls observed
    pub fn peak_concurrent_fetches(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn log(&self) -> std::sync::MutexGuard<'_, CallLog> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn conversation(&self, channel: &str) -> Result<&MockConversation> {
        self.conversations
            .get(channel)
            .ok_or_else(|| SearchError::api("conversations.info", "channel_not_found"))
    }

    /// Conversations an `in:` operand refers to
    fn scoped_conversations(&self, operand: &str) -> Vec<&MockConversation> {
        if let Some(user) = operand.strip_prefix("<@").and_then(|s| s.strip_suffix('>')) {
            return self
                .conversations
                .values()
                .filter(|c| c.info.kind == ConversationKind::Direct)
                .filter(|c| c.members.iter().any(|m| m == user))
                .collect();
        }

        let key = operand
            .strip_prefix("<#")
            .and_then(|s| s.strip_suffix('>'))
            .map(|s| s.split('|').next().unwrap_or(s))
            .unwrap_or_else(|| operand.trim_start_matches('#'));

        self.conversations
            .values()
            .filter(|c| c.info.id == key || c.info.name.as_deref() == Some(key))
            .collect()
    }
}

#[async_trait::async_trait]
impl ChatApi for MockWorkspace {
    async fn whoami(&self) -> Result<String> {
        Ok(self.me.clone())
    }

    async fn search_messages(&self, query: &str, count: usize) -> Result<Vec<RawHit>> {
        debug!("MockWorkspace: search {:?}", query);
        self.log().search_queries.push(query.to_string());

        let mut scope: Option<&str> = None;
        let mut keywords = Vec::new();
        for token in query.split_whitespace() {
            if let Some(operand) = token.strip_prefix("in:") {
                scope = Some(operand);
            } else if ["on:", "after:", "before:", "during:"]
                .iter()
                .any(|p| token.starts_with(p))
            {
                continue;
            } else {
                keywords.push(token.to_lowercase());
            }
        }

        let conversations: Vec<&MockConversation> = match scope {
            Some(operand) => self.scoped_conversations(operand),
            None => self.conversations.values().collect(),
        };

        let mut hits: Vec<RawHit> = conversations
            .into_iter()
            .flat_map(|c| {
                c.messages.iter().map(move |m| (c.info.id.clone(), m))
            })
            .filter(|(_, m)| {
                let text = m.text.to_lowercase();
                keywords.iter().all(|k| text.contains(k.as_str()))
            })
            .map(|(channel_id, m)| RawHit {
                ts: m.ts.clone(),
                channel_id,
                text: m.text.clone(),
            })
            .collect();

        hits.sort_by(|a, b| Timestamp::parse(&b.ts).cmp(&Timestamp::parse(&a.ts)));
        hits.truncate(count);
        Ok(hits)
    }

    async fn user_by_id(&self, user_id: &str) -> Result<UserProfile> {
        self.log().user_lookups.push(user_id.to_string());
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| SearchError::api("users.info", "user_not_found"))
    }

    async fn user_by_email(&self, email: &str) -> Result<UserProfile> {
        self.log().email_lookups.push(email.to_string());
        self.users
            .values()
            .find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .cloned()
            .ok_or_else(|| SearchError::api("users.lookupByEmail", "users_not_found"))
    }

    async fn message(&self, channel: &str, ts: &str) -> Result<Option<ApiMessage>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let found = self
            .conversation(channel)
            .map(|c| c.messages.iter().find(|m| m.ts == ts).cloned());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        found
    }

    async fn replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<ApiMessage>> {
        let conversation = self.conversation(channel)?;
        let mut thread: Vec<ApiMessage> = conversation
            .messages
            .iter()
            .filter(|m| m.ts == thread_ts || m.thread_ts.as_deref() == Some(thread_ts))
            .cloned()
            .collect();

        if thread.is_empty() {
            return Err(SearchError::api("conversations.replies", "thread_not_found"));
        }

        thread.sort_by_key(|m| Timestamp::parse(&m.ts));
        thread.truncate(limit);
        Ok(thread)
    }

    async fn history(&self, channel: &str, window: HistoryWindow) -> Result<HistoryPage> {
        self.log().history_pages += 1;
        let conversation = self.conversation(channel)?;
        let oldest = window.oldest.as_deref().map(Timestamp::parse);
        let latest = window.latest.as_deref().map(Timestamp::parse);

        let mut messages: Vec<ApiMessage> = conversation
            .messages
            .iter()
            .filter(|m| m.thread_root().map_or(true, |root| root == m.ts))
            .filter(|m| {
                let ts = Timestamp::parse(&m.ts);
                let after_oldest = oldest.as_ref().map_or(true, |o| {
                    if window.inclusive { ts >= *o } else { ts > *o }
                });
                let before_latest = latest.as_ref().map_or(true, |l| {
                    if window.inclusive { ts <= *l } else { ts < *l }
                });
                after_oldest && before_latest
            })
            .cloned()
            .collect();

        // Newest first, pages counted back from the newest end; the cursor
        // is the offset of the next page
        messages.sort_by(|a, b| Timestamp::parse(&b.ts).cmp(&Timestamp::parse(&a.ts)));
        let offset = match window.cursor.as_deref() {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| SearchError::api("conversations.history", "invalid_cursor"))?,
            None => 0,
        };
        let limit = window.limit.max(1);
        let next = offset + limit;

        Ok(HistoryPage {
            next_cursor: (next < messages.len()).then(|| next.to_string()),
            messages: messages.into_iter().skip(offset).take(limit).collect(),
        })
    }

    async fn members(&self, channel: &str) -> Result<Vec<String>> {
        self.log().member_fetches.push(channel.to_string());
        Ok(self.conversation(channel)?.members.clone())
    }

    async fn conversation_info(&self, channel: &str) -> Result<ConversationInfo> {
        self.log().info_fetches.push(channel.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.conversation(channel)?.info.clone())
    }

    async fn open_conversation(&self, user_ids: &[String]) -> Result<String> {
        self.log().open_requests.push(user_ids.to_vec());
        if self.fail_open {
            return Err(SearchError::api("conversations.open", "not_allowed"));
        }

        let mut wanted: HashSet<&str> = user_ids.iter().map(String::as_str).collect();
        wanted.insert(self.me.as_str());

        self.conversations
            .values()
            .filter(|c| c.info.kind == ConversationKind::Group)
            .find(|c| {
                let members: HashSet<&str> = c.members.iter().map(String::as_str).collect();
                members == wanted
            })
            .map(|c| c.info.id.clone())
            .ok_or_else(|| SearchError::api("conversations.open", "channel_not_found"))
    }

    async fn permalink(&self, channel: &str, ts: &str) -> Result<String> {
        if self
            .broken_permalinks
            .contains(&(channel.to_string(), ts.to_string()))
        {
            return Err(SearchError::api("chat.getPermalink", "message_not_found"));
        }
        Ok(format!(
            "https://mock.slack.com/archives/{}/p{}",
            channel,
            ts.replace('.', "")
        ))
    }
}
