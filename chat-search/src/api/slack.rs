//! Slack Web API client
//!
//! Implements [`ChatApi`] over HTTPS. Every method is a form-encoded POST to
//! `{api_base}/{method}` with a bearer token; responses use Slack's
//! `{"ok": bool, "error": "..."}` envelope.

use super::{
    ApiMessage, ChatApi, ConversationInfo, ConversationKind, HistoryPage, HistoryWindow, RawHit,
    UserProfile,
};
use crate::config::SlackConfig;
use crate::error::{Result, SearchError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Page size used when walking `conversations.members`
const MEMBERS_PAGE_SIZE: usize = 200;
/// Safety bound on `conversations.members` pagination
const MAX_MEMBER_PAGES: usize = 10;

/// Slack Web API client
pub struct SlackClient {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl SlackClient {
    /// Create a client; fails when no token is configured.
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let token = config
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SearchError::MissingToken)?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Result<T> {
        debug!("Slack: calling {}", method);

        let response = self
            .client
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Slack: {} failed with status {}: {}", method, status, error_text);
            return Err(SearchError::api(method, format!("HTTP {}", status)));
        }

        let body: serde_json::Value = response.json().await?;
        let envelope: Envelope = serde_json::from_value(body.clone())?;
        if !envelope.ok {
            let error = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
            debug!("Slack: {} returned error {}", method, error);
            return Err(SearchError::api(method, error));
        }

        Ok(serde_json::from_value(body)?)
    }

    async fn history_page(&self, channel: &str, window: &HistoryWindow) -> Result<HistoryPage> {
        let mut params = vec![
            ("channel", channel.to_string()),
            ("limit", window.limit.max(1).to_string()),
            ("inclusive", window.inclusive.to_string()),
        ];
        if let Some(oldest) = &window.oldest {
            params.push(("oldest", oldest.clone()));
        }
        if let Some(latest) = &window.latest {
            params.push(("latest", latest.clone()));
        }
        if let Some(cursor) = &window.cursor {
            params.push(("cursor", cursor.clone()));
        }

        let response: MessagesResponse = self.call("conversations.history", &params).await?;
        Ok(HistoryPage {
            messages: response.messages.into_iter().map(ApiMessage::from).collect(),
            next_cursor: response
                .response_metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    messages: SearchMessages,
}

#[derive(Debug, Deserialize)]
struct SearchMessages {
    #[serde(default)]
    matches: Vec<SearchMatch>,
}

#[derive(Debug, Deserialize)]
struct SearchMatch {
    ts: String,
    #[serde(default)]
    text: String,
    channel: SearchChannel,
}

#[derive(Debug, Deserialize)]
struct SearchChannel {
    id: String,
}

impl From<SearchMatch> for RawHit {
    fn from(m: SearchMatch) -> Self {
        Self {
            ts: m.ts,
            channel_id: m.channel.id,
            text: m.text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<SlackUserProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackUserProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl From<SlackUser> for UserProfile {
    fn from(user: SlackUser) -> Self {
        let profile = user.profile.unwrap_or_default();
        Self {
            id: user.id,
            name: user.name,
            real_name: profile.real_name.or(user.real_name),
            display_name: profile.display_name,
            email: profile.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct SlackMessage {
    ts: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    reply_count: Option<u32>,
}

impl From<SlackMessage> for ApiMessage {
    fn from(m: SlackMessage) -> Self {
        Self {
            ts: m.ts,
            user: m.user,
            text: m.text.unwrap_or_default(),
            thread_ts: m.thread_ts,
            reply_count: m.reply_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    channel: SlackChannel,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_im: bool,
    #[serde(default)]
    is_mpim: bool,
}

impl From<SlackChannel> for ConversationInfo {
    fn from(c: SlackChannel) -> Self {
        let kind = if c.is_im {
            ConversationKind::Direct
        } else if c.is_mpim {
            ConversationKind::Group
        } else {
            ConversationKind::Channel
        };

        Self {
            id: c.id,
            name: c.name.filter(|n| !n.is_empty()),
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink: String,
}

#[async_trait::async_trait]
impl ChatApi for SlackClient {
    async fn whoami(&self) -> Result<String> {
        let response: AuthTestResponse = self.call("auth.test", &[]).await?;
        response
            .user_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SearchError::MissingIdentity("auth.test returned no user_id".to_string()))
    }

    async fn search_messages(&self, query: &str, count: usize) -> Result<Vec<RawHit>> {
        let response: SearchResponse = self
            .call(
                "search.messages",
                &[
                    ("query", query.to_string()),
                    ("count", count.to_string()),
                    ("sort", "timestamp".to_string()),
                    ("sort_dir", "desc".to_string()),
                ],
            )
            .await?;

        Ok(response.messages.matches.into_iter().map(RawHit::from).collect())
    }

    async fn user_by_id(&self, user_id: &str) -> Result<UserProfile> {
        let response: UserResponse = self.call("users.info", &[("user", user_id.to_string())]).await?;
        Ok(response.user.into())
    }

    async fn user_by_email(&self, email: &str) -> Result<UserProfile> {
        let response: UserResponse = self
            .call("users.lookupByEmail", &[("email", email.to_string())])
            .await?;
        Ok(response.user.into())
    }

    async fn message(&self, channel: &str, ts: &str) -> Result<Option<ApiMessage>> {
        let top_level = self.history_page(channel, &HistoryWindow::exact(ts)).await?;
        if let Some(found) = top_level.messages.into_iter().find(|m| m.ts == ts) {
            return Ok(Some(found));
        }

        // Thread replies never show up in history
        let params = [
            ("channel", channel.to_string()),
            ("ts", ts.to_string()),
            ("oldest", ts.to_string()),
            ("latest", ts.to_string()),
            ("inclusive", "true".to_string()),
            ("limit", "1".to_string()),
        ];
        match self.call::<MessagesResponse>("conversations.replies", &params).await {
            Ok(response) => Ok(response
                .messages
                .into_iter()
                .map(ApiMessage::from)
                .find(|m| m.ts == ts)),
            Err(SearchError::Api { error, .. }) if error == "thread_not_found" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<ApiMessage>> {
        let response: MessagesResponse = self
            .call(
                "conversations.replies",
                &[
                    ("channel", channel.to_string()),
                    ("ts", thread_ts.to_string()),
                    ("limit", limit.max(1).to_string()),
                ],
            )
            .await?;

        let mut messages: Vec<ApiMessage> =
            response.messages.into_iter().map(ApiMessage::from).collect();
        messages.truncate(limit);
        Ok(messages)
    }

    async fn history(&self, channel: &str, window: HistoryWindow) -> Result<HistoryPage> {
        self.history_page(channel, &window).await
    }

    async fn members(&self, channel: &str) -> Result<Vec<String>> {
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_MEMBER_PAGES {
            let mut params = vec![
                ("channel", channel.to_string()),
                ("limit", MEMBERS_PAGE_SIZE.to_string()),
            ];
            if let Some(cursor) = &cursor {
                params.push(("cursor", cursor.clone()));
            }

            let page: MembersResponse = self.call("conversations.members", &params).await?;
            members.extend(page.members);

            cursor = page
                .response_metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        Ok(members)
    }

    async fn conversation_info(&self, channel: &str) -> Result<ConversationInfo> {
        let response: ChannelResponse = self
            .call("conversations.info", &[("channel", channel.to_string())])
            .await?;
        Ok(response.channel.into())
    }

    async fn open_conversation(&self, user_ids: &[String]) -> Result<String> {
        let response: ChannelResponse = self
            .call("conversations.open", &[("users", user_ids.join(","))])
            .await?;
        Ok(response.channel.id)
    }

    async fn permalink(&self, channel: &str, ts: &str) -> Result<String> {
        let response: PermalinkResponse = self
            .call(
                "chat.getPermalink",
                &[("channel", channel.to_string()), ("message_ts", ts.to_string())],
            )
            .await?;
        Ok(response.permalink)
    }
}
