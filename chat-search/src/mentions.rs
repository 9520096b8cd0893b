//! Mention expansion
//!
//! Rewrites Slack's inline reference tokens into readable text:
//!
//! | token                       | output            |
//! |-----------------------------|-------------------|
//! | `<@U123>` / `<@U123\|ann>`   | `@<display name>` |
//! | `<#C123>` / `<#C123\|gen>`   | `#C123`           |
//! | `<!here>` `<!channel>` `<!everyone>` | `@here` ...  |
//! | `<!subteam^S123\|@team>`     | `@S123`           |
//! | `<https://x\|label>`         | `label`           |
//! | `<https://x>`                | `https://x`       |
//!
//! Channel ids are not resolved to names; only user ids cost a lookup.

use crate::identity::IdentityCache;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([^<>|\s]+)(?:\|([^<>]*))?>").expect("valid mention regex"));

const BROADCASTS: [&str; 3] = ["channel", "here", "everyone"];

/// A reference token found in message text
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    User(&'a str),
    Channel(&'a str),
    Broadcast(&'a str),
    Subteam(&'a str),
    Link { url: &'a str, label: Option<&'a str> },
    Other { body: &'a str, label: Option<&'a str> },
}

fn classify<'a>(body: &'a str, label: Option<&'a str>) -> Token<'a> {
    let label = label.map(str::trim).filter(|l| !l.is_empty());

    if let Some(id) = body.strip_prefix('@') {
        Token::User(id)
    } else if let Some(id) = body.strip_prefix('#') {
        Token::Channel(id)
    } else if let Some(id) = body.strip_prefix("!subteam^") {
        Token::Subteam(id)
    } else if let Some(keyword) = body.strip_prefix('!') {
        if BROADCASTS.contains(&keyword) {
            Token::Broadcast(keyword)
        } else {
            Token::Other { body: keyword, label }
        }
    } else {
        Token::Link { url: body, label }
    }
}

/// User ids referenced by `text`, without duplicates, in order of appearance
pub fn mentioned_users(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for caps in TOKEN_RE.captures_iter(text) {
        if let Token::User(id) = classify(&caps[1], caps.get(2).map(|m| m.as_str())) {
            if !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

/// Rewrite all tokens using already-resolved user names. Unknown users keep
/// their raw id.
pub fn render(text: &str, names: &HashMap<String, String>) -> String {
    TOKEN_RE
        .replace_all(text, |caps: &Captures| {
            match classify(&caps[1], caps.get(2).map(|m| m.as_str())) {
                Token::User(id) => {
                    format!("@{}", names.get(id).map(String::as_str).unwrap_or(id))
                }
                Token::Channel(id) => format!("#{}", id),
                Token::Broadcast(keyword) => format!("@{}", keyword),
                Token::Subteam(id) => format!("@{}", id),
                Token::Link { url, label } => label.unwrap_or(url).to_string(),
                Token::Other { body, label } => label.unwrap_or(body).to_string(),
            }
        })
        .into_owned()
}

/// Expands mentions, resolving user ids through the identity cache
pub struct MentionExpander<'a> {
    identities: &'a IdentityCache,
}

impl<'a> MentionExpander<'a> {
    pub fn new(identities: &'a IdentityCache) -> Self {
        Self { identities }
    }

    /// Expand every token in `text`. All mentioned users are resolved
    /// concurrently before substitution.
    pub async fn expand(&self, text: &str) -> String {
        let ids = mentioned_users(text);
        if ids.is_empty() {
            return render(text, &HashMap::new());
        }

        let names = join_all(ids.iter().map(|id| self.identities.display_name(id))).await;
        let names: HashMap<String, String> = ids.into_iter().zip(names).collect();

        render(text, &names)
    }
}
