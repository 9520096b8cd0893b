//! Request and result types of the search operation

use serde::{Deserialize, Serialize};

use crate::api::ConversationKind;
use crate::config::SearchSettings;
use crate::identity::IdentityRecord;
use crate::query::TimeRange;

/// Caller-supplied search parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Participants to search conversations with
    pub emails: Vec<String>,
    /// Free-text keywords
    pub topic: Option<String>,
    /// Channel to search in, with or without a leading `#`
    pub channel: Option<String>,
    pub time_range: TimeRange,
    /// Per-search and final result cap
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn with_emails<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emails = emails.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Trim and lower-case emails (dropping blanks and repeats), drop a blank
    /// topic or channel, and clamp the limit.
    pub fn normalized(self, settings: &SearchSettings) -> Self {
        let mut emails: Vec<String> = Vec::with_capacity(self.emails.len());
        for email in self.emails {
            let email = email.trim().to_lowercase();
            if !email.is_empty() && !emails.contains(&email) {
                emails.push(email);
            }
        }

        let non_blank = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let limit = self
            .limit
            .unwrap_or(settings.default_limit)
            .clamp(1, settings.max_limit.max(1));

        Self {
            emails,
            topic: non_blank(self.topic),
            channel: non_blank(self.channel),
            time_range: self.time_range,
            limit: Some(limit),
        }
    }
}

/// A message surrounding (or threaded with) a hit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub ts: String,
    pub author_id: Option<String>,
    pub author_name: String,
    pub text: String,
}

/// A hit with its conversation context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedMessage {
    pub conversation_id: String,
    pub kind: ConversationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_name: Option<String>,
    /// Thread root timestamp, or the hit's own timestamp outside threads
    pub root_ts: String,
    pub is_thread: bool,
    /// Anchor text with mentions expanded
    pub text: String,
    pub author_email: String,
    pub author_name: String,
    /// Full thread, or a small window around the anchor
    pub context: Vec<ContextMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// Membership; only for direct and group conversations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
}

/// Final, deduplicated and newest-first search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The acting user
    pub me: IdentityRecord,
    pub messages: Vec<EnrichedMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_request() {
        let settings = SearchSettings::default();
        let request = SearchRequest::default()
            .with_emails([" A@x.com", "a@x.com", "", "b@x.com"])
            .with_topic("   ")
            .with_channel(" #eng ")
            .normalized(&settings);

        assert_eq!(request.emails, vec!["a@x.com".to_string(), "b@x.com".to_string()]);
        assert_eq!(request.topic, None);
        assert_eq!(request.channel.as_deref(), Some("#eng"));
        assert_eq!(request.limit, Some(settings.default_limit));
    }

    #[test]
    fn test_limit_clamped() {
        let settings = SearchSettings::default();
        let high = SearchRequest::default().with_limit(10_000).normalized(&settings);
        assert_eq!(high.limit, Some(settings.max_limit));

        let zero = SearchRequest::default().with_limit(0).normalized(&settings);
        assert_eq!(zero.limit, Some(1));
    }

    #[test]
    fn test_request_from_json() {
        let request: SearchRequest = serde_json::from_value(serde_json::json!({
            "emails": ["a@x.com"],
            "topic": "launch plan",
            "time_range": "last_30d"
        }))
        .unwrap();
        assert_eq!(request.time_range, TimeRange::Last30Days);
        assert_eq!(request.limit, None);
        assert!(request.channel.is_none());
    }
}
