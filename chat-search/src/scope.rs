//! Scope resolution
//!
//! Turns participant emails and/or a channel name into search operands:
//!
//! - one target: a direct-message scope (`in:<@U1>`)
//! - two or more targets: the multi-party conversation among them (when it
//!   can be opened) plus one direct scope per target, since multi-party hits
//!   are not reliably returned by a single combined query
//! - a channel: `in:<name>` with a leading `#` stripped
//!
//! The acting user is never a target.

use crate::api::ChatApi;
use crate::identity::{IdentityCache, IdentityRecord};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A search-operator token restricting a query to one conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScopeOperand {
    /// 1:1 conversation with a user
    Direct { user_id: String },
    /// Multi-party conversation, by name (or `<#id>` when unnamed)
    Group { conversation: String },
    /// Named channel, or an already-qualified `<#C..>` reference
    Channel { name: String },
}

impl ScopeOperand {
    /// Operand text placed after `in:`
    pub fn operand(&self) -> String {
        match self {
            ScopeOperand::Direct { user_id } => format!("<@{}>", user_id),
            ScopeOperand::Group { conversation } => conversation.clone(),
            ScopeOperand::Channel { name } => name.clone(),
        }
    }
}

/// Which participants a hit must involve to be kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetFilter {
    /// No participants requested; every hit passes
    Anyone,
    /// At least one of these user ids must be involved
    Participants(Vec<String>),
}

impl TargetFilter {
    pub fn target_ids(&self) -> &[String] {
        match self {
            TargetFilter::Anyone => &[],
            TargetFilter::Participants(ids) => ids,
        }
    }

    /// Number of targets found among `involved`
    pub fn overlap<'a>(&self, involved: impl IntoIterator<Item = &'a str>) -> usize {
        let involved: HashSet<&str> = involved.into_iter().collect();
        self.target_ids()
            .iter()
            .filter(|id| involved.contains(id.as_str()))
            .count()
    }

    pub fn passes<'a>(&self, involved: impl IntoIterator<Item = &'a str>) -> bool {
        match self {
            TargetFilter::Anyone => true,
            TargetFilter::Participants(_) => self.overlap(involved) >= 1,
        }
    }
}

/// Operands to search plus the participant filter to apply to hits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScopes {
    pub operands: Vec<ScopeOperand>,
    pub filter: TargetFilter,
}

/// Normalize a caller-supplied channel. Returns `None` for blank input.
pub fn normalize_channel(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('<') {
        return Some(trimmed.to_string());
    }

    let name = trimmed.strip_prefix('#').unwrap_or(trimmed).trim();
    (!name.is_empty()).then(|| name.to_string())
}

pub struct ScopeResolver<'a> {
    api: &'a dyn ChatApi,
    identities: &'a IdentityCache,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(api: &'a dyn ChatApi, identities: &'a IdentityCache) -> Self {
        Self { api, identities }
    }

    pub async fn resolve(
        &self,
        emails: &[String],
        channel: Option<&str>,
        me: &IdentityRecord,
    ) -> ResolvedScopes {
        let mut operands = Vec::new();

        let wanted: Vec<&String> = emails
            .iter()
            .filter(|email| !email.eq_ignore_ascii_case(&me.email))
            .collect();

        let filter = if wanted.is_empty() {
            TargetFilter::Anyone
        } else {
            let targets = self.resolve_targets(&wanted, me).await;
            operands.extend(self.participant_scopes(&targets).await);
            TargetFilter::Participants(targets)
        };

        if let Some(name) = channel.and_then(normalize_channel) {
            operands.push(ScopeOperand::Channel { name });
        }

        debug!("Resolved {} scope(s), filter {:?}", operands.len(), filter);
        ResolvedScopes { operands, filter }
    }

    /// User ids for `emails`, in request order, without the caller and
    /// without duplicates. Unknown emails are skipped.
    async fn resolve_targets(&self, emails: &[&String], me: &IdentityRecord) -> Vec<String> {
        let resolved = join_all(emails.iter().map(|email| self.identities.id_for_email(email))).await;

        let mut targets: Vec<String> = Vec::new();
        for (email, id) in emails.iter().zip(resolved) {
            match id {
                Some(id) if id == me.id => {}
                Some(id) => {
                    if !targets.contains(&id) {
                        targets.push(id);
                    }
                }
                None => warn!("No user found for {}; skipping it as a target", email),
            }
        }
        targets
    }

    async fn participant_scopes(&self, targets: &[String]) -> Vec<ScopeOperand> {
        match targets {
            [] => Vec::new(),
            [single] => vec![ScopeOperand::Direct {
                user_id: single.clone(),
            }],
            several => {
                let mut scopes = Vec::with_capacity(several.len() + 1);
                if let Some(conversation) = self.group_conversation(several).await {
                    scopes.push(ScopeOperand::Group { conversation });
                }
                scopes.extend(several.iter().map(|id| ScopeOperand::Direct {
                    user_id: id.clone(),
                }));
                scopes
            }
        }
    }

    /// Name of the multi-party conversation among `targets`, if it can be
    /// opened and described
    async fn group_conversation(&self, targets: &[String]) -> Option<String> {
        let id = match self.api.open_conversation(targets).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not open group conversation with {:?}: {}", targets, e);
                return None;
            }
        };

        match self.api.conversation_info(&id).await {
            Ok(info) => Some(info.name.unwrap_or_else(|| format!("<#{}>", id))),
            Err(e) => {
                warn!("Could not describe group conversation {}: {}", id, e);
                None
            }
        }
    }
}
