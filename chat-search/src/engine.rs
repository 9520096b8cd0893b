//! Search entry point
//!
//! [`ConversationSearch::search`] wires the stages together for one request:
//! scope resolution, scoped searches, enrichment and final ranking. Every
//! request gets its own identity cache.

use crate::api::{ChatApi, SlackClient};
use crate::config::{Config, SearchSettings};
use crate::enrich::Enricher;
use crate::error::{Result, SearchError};
use crate::executor::SearchExecutor;
use crate::identity::{IdentityCache, IdentityRecord};
use crate::rank;
use crate::scope::ScopeResolver;
use crate::types::{SearchRequest, SearchResult};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Conversational search over a chat workspace
pub struct ConversationSearch {
    api: Arc<dyn ChatApi>,
    settings: SearchSettings,
}

impl ConversationSearch {
    pub fn new(api: Arc<dyn ChatApi>, settings: SearchSettings) -> Self {
        Self { api, settings }
    }

    /// Engine backed by the Slack Web API. Fails when no token is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = SlackClient::new(&config.slack)?;
        Ok(Self::new(Arc::new(client), config.search.clone()))
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Run a search. Only a missing caller identity fails the request;
    /// every other failure shrinks the result instead.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResult> {
        self.search_at(request, Utc::now().date_naive()).await
    }

    /// Same as [`search`](Self::search), with relative time ranges anchored
    /// at `today`.
    pub async fn search_at(&self, request: SearchRequest, today: NaiveDate) -> Result<SearchResult> {
        let request = request.normalized(&self.settings);
        let limit = request.limit.unwrap_or(self.settings.default_limit);
        debug!("Search request: {:?}", request);

        let identities = IdentityCache::new(self.api.clone());
        let me = self.caller(&identities).await?;

        let scopes = ScopeResolver::new(self.api.as_ref(), &identities)
            .resolve(&request.emails, request.channel.as_deref(), &me)
            .await;

        let hits = SearchExecutor::new(self.api.as_ref(), today)
            .search_all(
                &scopes.operands,
                request.topic.as_deref(),
                request.time_range,
                limit,
            )
            .await;
        let raw_count = hits.len();

        let (messages, stats) = Enricher::new(self.api.as_ref(), &identities, &self.settings)
            .enrich(hits, &scopes.filter)
            .await;

        let result = rank::finalize(messages, me, limit);

        info!(
            "Search done: {} scope(s), {} raw hit(s), {} kept, {} filtered, {} failed, {} returned",
            scopes.operands.len(),
            raw_count,
            stats.kept,
            stats.filtered,
            stats.failed,
            result.messages.len()
        );
        Ok(result)
    }

    /// Identity of the token owner
    async fn caller(&self, identities: &IdentityCache) -> Result<IdentityRecord> {
        let id = self
            .api
            .whoami()
            .await
            .map_err(|e| SearchError::MissingIdentity(e.to_string()))?;

        identities
            .get(&id)
            .await
            .ok_or_else(|| SearchError::MissingIdentity(format!("no profile for {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockChatApi, MockWorkspace};

    #[tokio::test]
    async fn test_whoami_failure_is_fatal() {
        let mut api = MockChatApi::new();
        api.expect_whoami()
            .returning(|| Err(SearchError::api("auth.test", "invalid_auth")));
        api.expect_search_messages().never();

        let engine = ConversationSearch::new(Arc::new(api), SearchSettings::default());
        let err = engine
            .search(SearchRequest::default().with_topic("incident"))
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::MissingIdentity(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_empty_request_returns_caller_and_nothing_else() {
        let ws = Arc::new(MockWorkspace::new("UME", "Me", "me@x.com"));
        let engine = ConversationSearch::new(ws.clone(), SearchSettings::default());

        let result = engine.search(SearchRequest::default()).await.unwrap();

        assert_eq!(result.me.id, "UME");
        assert_eq!(result.me.email, "me@x.com");
        assert!(result.messages.is_empty());
        assert!(ws.calls().search_queries.is_empty());
    }

    #[test]
    fn test_from_config_requires_token() {
        let config = Config::default();
        assert!(matches!(
            ConversationSearch::from_config(&config),
            Err(SearchError::MissingToken)
        ));
    }
}
