//! Deduplication and ordering of enriched hits

use crate::identity::IdentityRecord;
use crate::types::{EnrichedMessage, SearchResult};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Numeric view of a Slack message timestamp (`"1700000000.123456"`).
///
/// Compared as `(seconds, fractional digits)` so ordering never depends on
/// string length or float rounding. Unparseable input sorts as the oldest
/// possible value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    secs: u64,
    nanos: u32,
}

impl Timestamp {
    pub fn parse(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or(Self { secs: 0, nanos: 0 })
    }

    pub fn try_parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
        let secs = whole.parse::<u64>().ok()?;

        let digits: String = fraction
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .take(9)
            .collect();
        let nanos = if digits.is_empty() {
            0
        } else {
            format!("{:0<9}", digits).parse::<u32>().unwrap_or(0)
        };

        Some(Self { secs, nanos })
    }
}

/// Identity of a timestamp for deduplication: numeric when it parses, the
/// raw text otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimestampKey {
    Numeric(Timestamp),
    Raw(String),
}

impl TimestampKey {
    pub fn of(raw: &str) -> Self {
        match Timestamp::try_parse(raw) {
            Some(ts) => TimestampKey::Numeric(ts),
            None => TimestampKey::Raw(raw.trim().to_string()),
        }
    }
}

/// Newest first; equal timestamps keep their relative order.
pub fn compare_newest_first(a: &str, b: &str) -> Ordering {
    Timestamp::parse(b).cmp(&Timestamp::parse(a))
}

/// Drop repeated `(conversation, subject timestamp)` keys, keeping the first
/// occurrence, then sort newest first.
pub fn dedup_and_sort(messages: Vec<EnrichedMessage>) -> Vec<EnrichedMessage> {
    let mut seen = HashSet::new();
    let mut unique: Vec<EnrichedMessage> = messages
        .into_iter()
        .filter(|m| seen.insert((m.conversation_id.clone(), TimestampKey::of(&m.root_ts))))
        .collect();

    unique.sort_by(|a, b| compare_newest_first(&a.root_ts, &b.root_ts));
    unique
}

/// Build the final result for a request.
pub fn finalize(messages: Vec<EnrichedMessage>, me: IdentityRecord, limit: usize) -> SearchResult {
    let mut messages = dedup_and_sort(messages);
    messages.truncate(limit);
    SearchResult { me, messages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ConversationKind;

    fn message(channel: &str, root_ts: &str) -> EnrichedMessage {
        EnrichedMessage {
            conversation_id: channel.to_string(),
            root_ts: root_ts.to_string(),
            kind: ConversationKind::Channel,
            ..Default::default()
        }
    }

    #[test]
    fn test_timestamp_numeric_order() {
        assert!(Timestamp::parse("100.1") > Timestamp::parse("50.2"));
        assert!(Timestamp::parse("9.5") < Timestamp::parse("10.1"));
        assert!(Timestamp::parse("1700000000.000010") > Timestamp::parse("1700000000.000009"));
        assert_eq!(Timestamp::parse("5.1"), Timestamp::parse("5.100000"));
        assert!(Timestamp::parse("garbage") < Timestamp::parse("0.000001"));
    }

    #[test]
    fn test_sorted_newest_first() {
        let sorted = dedup_and_sort(vec![
            message("C1", "100.1"),
            message("C1", "50.2"),
            message("C2", "200.3"),
        ]);
        let ts: Vec<&str> = sorted.iter().map(|m| m.root_ts.as_str()).collect();
        assert_eq!(ts, vec!["200.3", "100.1", "50.2"]);
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let mut first = message("C1", "100.1");
        first.text = "first".to_string();
        let mut second = message("C1", "100.1");
        second.text = "second".to_string();

        let sorted = dedup_and_sort(vec![first, message("C2", "100.1"), second]);
        assert_eq!(sorted.len(), 2);
        let c1 = sorted.iter().find(|m| m.conversation_id == "C1").unwrap();
        assert_eq!(c1.text, "first");
    }

    #[test]
    fn test_malformed_timestamps_stay_distinct() {
        let sorted = dedup_and_sort(vec![
            message("C1", "abc"),
            message("C1", "xyz"),
            message("C1", "abc"),
            message("C1", "5.1"),
            message("C1", "5.100000"),
        ]);
        let ts: Vec<&str> = sorted.iter().map(|m| m.root_ts.as_str()).collect();
        assert_eq!(ts, vec!["5.1", "abc", "xyz"]);

        assert_eq!(TimestampKey::of("5.1"), TimestampKey::of("5.100000"));
        assert_ne!(TimestampKey::of("abc"), TimestampKey::of("xyz"));
        assert_ne!(TimestampKey::of("abc"), TimestampKey::of("0"));
        assert!(Timestamp::try_parse("abc").is_none());
    }

    #[test]
    fn test_finalize_truncates() {
        let me = IdentityRecord {
            id: "UME".to_string(),
            display_name: "Me".to_string(),
            email: "me@x.com".to_string(),
        };
        let result = finalize(
            vec![message("C1", "1.0"), message("C1", "2.0"), message("C1", "3.0")],
            me,
            2,
        );
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].root_ts, "3.0");
        assert_eq!(result.me.id, "UME");
    }
}
