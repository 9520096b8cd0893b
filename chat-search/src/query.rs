//! Search query composition

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::scope::ScopeOperand;

/// Time window of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// Newest matches, no date restriction
    #[default]
    Latest,
    Today,
    Yesterday,
    #[serde(rename = "last_7d")]
    Last7Days,
    #[serde(rename = "last_30d")]
    Last30Days,
    All,
}

impl TimeRange {
    /// Search filter token for this range, relative to `today`
    pub fn filter_token(&self, today: NaiveDate) -> Option<String> {
        match self {
            TimeRange::Latest | TimeRange::All => None,
            TimeRange::Today => Some("on:today".to_string()),
            TimeRange::Yesterday => Some("on:yesterday".to_string()),
            TimeRange::Last7Days => Some(after_token(today, 7)),
            TimeRange::Last30Days => Some(after_token(today, 30)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Latest => "latest",
            TimeRange::Today => "today",
            TimeRange::Yesterday => "yesterday",
            TimeRange::Last7Days => "last_7d",
            TimeRange::Last30Days => "last_30d",
            TimeRange::All => "all",
        }
    }
}

fn after_token(today: NaiveDate, days: i64) -> String {
    format!("after:{}", (today - Duration::days(days)).format("%Y-%m-%d"))
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest" => Ok(TimeRange::Latest),
            "today" => Ok(TimeRange::Today),
            "yesterday" => Ok(TimeRange::Yesterday),
            "last_7d" => Ok(TimeRange::Last7Days),
            "last_30d" => Ok(TimeRange::Last30Days),
            "all" => Ok(TimeRange::All),
            other => Err(format!(
                "unknown time range '{}' (expected latest, today, yesterday, last_7d, last_30d or all)",
                other
            )),
        }
    }
}

/// Compose `in:<scope> <topic> <time filter>`, skipping absent parts.
pub fn build_query(
    scope: Option<&ScopeOperand>,
    topic: Option<&str>,
    range: TimeRange,
    today: NaiveDate,
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(3);

    if let Some(scope) = scope {
        parts.push(format!("in:{}", scope.operand()));
    }
    if let Some(topic) = topic.map(str::trim).filter(|t| !t.is_empty()) {
        parts.push(topic.to_string());
    }
    if let Some(token) = range.filter_token(today) {
        parts.push(token);
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    #[test]
    fn test_filter_tokens() {
        assert_eq!(TimeRange::Latest.filter_token(today()), None);
        assert_eq!(TimeRange::All.filter_token(today()), None);
        assert_eq!(TimeRange::Today.filter_token(today()).as_deref(), Some("on:today"));
        assert_eq!(
            TimeRange::Yesterday.filter_token(today()).as_deref(),
            Some("on:yesterday")
        );
        assert_eq!(
            TimeRange::Last7Days.filter_token(today()).as_deref(),
            Some("after:2024-03-03")
        );
        assert_eq!(
            TimeRange::Last30Days.filter_token(today()).as_deref(),
            Some("after:2024-02-09")
        );
    }

    #[test]
    fn test_build_scoped_query() {
        let scope = ScopeOperand::Direct {
            user_id: "U1".to_string(),
        };
        let query = build_query(Some(&scope), Some("  launch plan "), TimeRange::Last7Days, today());
        assert_eq!(query, "in:<@U1> launch plan after:2024-03-03");
    }

    #[test]
    fn test_build_topic_only_query() {
        assert_eq!(build_query(None, Some("incident"), TimeRange::All, today()), "incident");
        assert_eq!(build_query(None, Some("   "), TimeRange::Today, today()), "on:today");
    }

    #[test]
    fn test_time_range_serde_names() {
        let range: TimeRange = serde_json::from_str("\"last_7d\"").unwrap();
        assert_eq!(range, TimeRange::Last7Days);
        assert_eq!(serde_json::to_string(&TimeRange::Last30Days).unwrap(), "\"last_30d\"");
        assert_eq!("Yesterday".parse::<TimeRange>(), Ok(TimeRange::Yesterday));
        assert!("fortnight".parse::<TimeRange>().is_err());
    }
}
