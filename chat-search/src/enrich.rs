//! Hit enrichment pipeline
//!
//! For every raw hit, with at most `enrichment_concurrency` hits in flight:
//!
//! 1. fetch the anchor message
//! 2. pick the subject: thread root if the anchor is threaded, else the anchor
//! 3. fetch the whole thread, or a small window around a standalone anchor
//! 4. fetch the permalink of the subject
//! 5. apply the participant filter: membership for direct/group
//!    conversations, authorship within the context for channels
//! 6. expand mentions and resolve authors of the kept hits
//!
//! A failure in any step drops that hit only (permalink failures just leave
//! the permalink empty); other hits are unaffected.

use crate::api::{self, ApiMessage, ChatApi, ConversationInfo, HistoryWindow, RawHit};
use crate::config::SearchSettings;
use crate::error::{Result, SearchError};
use crate::identity::IdentityCache;
use crate::mentions::MentionExpander;
use crate::rank::{Timestamp, TimestampKey};
use crate::scope::TargetFilter;
use crate::types::{ContextMessage, EnrichedMessage};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Step of the pipeline a hit failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichStep {
    Anchor,
    Context,
    Conversation,
    Membership,
}

impl fmt::Display for EnrichStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnrichStep::Anchor => "anchor",
            EnrichStep::Context => "context",
            EnrichStep::Conversation => "conversation",
            EnrichStep::Membership => "membership",
        };
        f.write_str(name)
    }
}

/// Result of enriching one hit
#[derive(Debug)]
pub enum HitOutcome {
    Kept(Box<EnrichedMessage>),
    /// Did not involve any requested participant
    Filtered,
    Failed { step: EnrichStep, error: SearchError },
}

impl HitOutcome {
    fn failed(step: EnrichStep, error: SearchError) -> Self {
        HitOutcome::Failed { step, error }
    }
}

/// Counts of a finished enrichment run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub kept: usize,
    pub filtered: usize,
    pub failed: usize,
}

/// Collapse raw hits with the same conversation and timestamp, keeping the
/// first one.
pub fn unique_hits(hits: Vec<RawHit>) -> Vec<RawHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert((hit.channel_id.clone(), TimestampKey::of(&hit.ts))))
        .collect()
}

pub struct Enricher<'a> {
    api: &'a dyn ChatApi,
    identities: &'a IdentityCache,
    settings: &'a SearchSettings,
    conversations: Mutex<HashMap<String, Arc<OnceCell<ConversationInfo>>>>,
}

impl<'a> Enricher<'a> {
    pub fn new(
        api: &'a dyn ChatApi,
        identities: &'a IdentityCache,
        settings: &'a SearchSettings,
    ) -> Self {
        Self {
            api,
            identities,
            settings,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Enrich `hits`, returning kept messages in the order of their hits.
    pub async fn enrich(
        &self,
        hits: Vec<RawHit>,
        filter: &TargetFilter,
    ) -> (Vec<EnrichedMessage>, EnrichStats) {
        let hits = unique_hits(hits);
        let concurrency = self.settings.enrichment_concurrency.max(1);

        let mut outcomes: Vec<(usize, HitOutcome)> = stream::iter(hits.into_iter().enumerate())
            .map(|(index, hit)| async move { (index, self.enrich_one(&hit, filter).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut stats = EnrichStats::default();
        let mut kept = Vec::new();
        for (_, outcome) in outcomes {
            match outcome {
                HitOutcome::Kept(message) => {
                    stats.kept += 1;
                    kept.push(*message);
                }
                HitOutcome::Filtered => stats.filtered += 1,
                HitOutcome::Failed { .. } => stats.failed += 1,
            }
        }

        info!(
            "Enrichment finished: {} kept, {} filtered, {} failed",
            stats.kept, stats.filtered, stats.failed
        );
        (kept, stats)
    }

    /// Run the whole pipeline for one hit.
    pub async fn enrich_one(&self, hit: &RawHit, filter: &TargetFilter) -> HitOutcome {
        let channel = hit.channel_id.as_str();

        let anchor = match self.api.message(channel, &hit.ts).await {
            Ok(Some(anchor)) => anchor,
            Ok(None) => {
                let error = SearchError::NotFound(format!("message {} in {}", hit.ts, channel));
                return self.give_up(hit, EnrichStep::Anchor, error);
            }
            Err(e) => return self.give_up(hit, EnrichStep::Anchor, e),
        };

        let thread_root = anchor.thread_root().map(str::to_string);
        let root_ts = thread_root.clone().unwrap_or_else(|| anchor.ts.clone());

        let context = match &thread_root {
            Some(root) => self.api.replies(channel, root, self.settings.thread_message_limit).await,
            None => self.window(channel, &anchor).await,
        };
        let context = match context {
            Ok(context) => context,
            Err(e) => return self.give_up(hit, EnrichStep::Context, e),
        };

        let (permalink, conversation) =
            futures::join!(self.api.permalink(channel, &root_ts), self.conversation(channel));

        let permalink = match permalink {
            Ok(link) => Some(link),
            Err(e) => {
                warn!("No permalink for {} in {}: {}", root_ts, channel, e);
                None
            }
        };
        let conversation = match conversation {
            Ok(info) => info,
            Err(e) => return self.give_up(hit, EnrichStep::Conversation, e),
        };

        let members = if conversation.kind.is_private_conversation() {
            match self.api.members(channel).await {
                Ok(members) => Some(members),
                Err(e) => return self.give_up(hit, EnrichStep::Membership, e),
            }
        } else {
            None
        };

        let passes = match &members {
            Some(members) => filter.passes(members.iter().map(String::as_str)),
            None => filter.passes(context.iter().filter_map(|m| m.user.as_deref())),
        };
        if !passes {
            debug!("Dropping {} in {}: no requested participant involved", hit.ts, channel);
            return HitOutcome::Filtered;
        }

        let expander = MentionExpander::new(self.identities);
        let (text, (author_email, author_name), context) = futures::join!(
            expander.expand(&anchor.text),
            self.author(anchor.user.as_deref()),
            join_all(context.iter().map(|m| self.context_message(&expander, m))),
        );

        HitOutcome::Kept(Box::new(EnrichedMessage {
            conversation_id: conversation.id,
            kind: conversation.kind,
            conversation_name: conversation.name,
            root_ts,
            is_thread: thread_root.is_some(),
            text,
            author_email,
            author_name,
            context,
            permalink,
            members,
        }))
    }

    fn give_up(&self, hit: &RawHit, step: EnrichStep, error: SearchError) -> HitOutcome {
        warn!(
            "Skipping hit {} in {}: {} step failed: {}",
            hit.ts, hit.channel_id, step, error
        );
        HitOutcome::failed(step, error)
    }

    /// A few messages before and after a standalone anchor, oldest first,
    /// anchor included.
    async fn window(&self, channel: &str, anchor: &ApiMessage) -> Result<Vec<ApiMessage>> {
        let before = HistoryWindow::before(&anchor.ts, self.settings.context_before + 1);
        let (before, after) = futures::join!(
            self.api.history(channel, before),
            api::messages_after(self.api, channel, &anchor.ts, self.settings.context_after),
        );

        let mut messages = before?.messages;
        messages.extend(after?);
        if !messages.iter().any(|m| m.ts == anchor.ts) {
            messages.push(anchor.clone());
        }

        let mut seen = HashSet::new();
        messages.retain(|m| seen.insert(m.ts.clone()));
        messages.sort_by_key(|m| Timestamp::parse(&m.ts));
        Ok(messages)
    }

    /// Conversation metadata, fetched at most once per conversation.
    /// Concurrent callers wait on the first fetch; a failed fetch is retried
    /// by the next caller.
    async fn conversation(&self, channel: &str) -> Result<ConversationInfo> {
        let cell = self
            .conversations
            .lock()
            .await
            .entry(channel.to_string())
            .or_default()
            .clone();

        cell.get_or_try_init(|| self.api.conversation_info(channel))
            .await
            .cloned()
    }

    /// `(email, display name)` of an author; empty when unknown.
    async fn author(&self, user: Option<&str>) -> (String, String) {
        let Some(user) = user else {
            return (String::new(), String::new());
        };
        match self.identities.get(user).await {
            Some(record) => (record.email, record.display_name),
            None => (String::new(), String::new()),
        }
    }

    async fn context_message(
        &self,
        expander: &MentionExpander<'_>,
        message: &ApiMessage,
    ) -> ContextMessage {
        let (text, (_, author_name)) = futures::join!(
            expander.expand(&message.text),
            self.author(message.user.as_deref())
        );

        ContextMessage {
            ts: message.ts.clone(),
            author_id: message.user.clone(),
            author_name,
            text,
        }
    }
}
