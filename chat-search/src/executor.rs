//! Scoped search execution
//!
//! One remote search per scope plus one scope-free topic search. All calls run
//! concurrently and every call's hits are kept, so results from different
//! scopes can be merged downstream.

use crate::api::{ChatApi, RawHit};
use crate::error::Result;
use crate::query::{build_query, TimeRange};
use crate::scope::ScopeOperand;
use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{debug, warn};

pub struct SearchExecutor<'a> {
    api: &'a dyn ChatApi,
    today: NaiveDate,
}

impl<'a> SearchExecutor<'a> {
    /// `today` anchors relative time filters
    pub fn new(api: &'a dyn ChatApi, today: NaiveDate) -> Self {
        Self { api, today }
    }

    pub async fn search_scoped(
        &self,
        scope: &ScopeOperand,
        topic: Option<&str>,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<RawHit>> {
        let query = build_query(Some(scope), topic, range, self.today);
        self.run(&query, limit).await
    }

    pub async fn search_topic(
        &self,
        topic: Option<&str>,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<RawHit>> {
        let query = build_query(None, topic, range, self.today);
        self.run(&query, limit).await
    }

    async fn run(&self, query: &str, limit: usize) -> Result<Vec<RawHit>> {
        let hits = self.api.search_messages(query, limit).await?;
        debug!("Search {:?} returned {} hit(s)", query, hits.len());
        Ok(hits)
    }

    /// Run every scoped search and, when a topic is given, the topic-wide
    /// search. A failing call contributes no hits. Hits come back in scope
    /// order followed by topic hits.
    pub async fn search_all(
        &self,
        scopes: &[ScopeOperand],
        topic: Option<&str>,
        range: TimeRange,
        limit: usize,
    ) -> Vec<RawHit> {
        let topic = topic.map(str::trim).filter(|t| !t.is_empty());

        let scoped = join_all(
            scopes
                .iter()
                .map(|scope| self.search_scoped(scope, topic, range, limit)),
        );
        let topic_wide = async {
            match topic {
                Some(_) => Some(self.search_topic(topic, range, limit).await),
                None => None,
            }
        };
        let (scoped, topic_wide) = futures::join!(scoped, topic_wide);

        let mut hits = Vec::new();
        for (scope, result) in scopes.iter().zip(scoped) {
            match result {
                Ok(found) => hits.extend(found),
                Err(e) => warn!("Search in {} failed: {}", scope.operand(), e),
            }
        }
        match topic_wide {
            Some(Ok(found)) => hits.extend(found),
            Some(Err(e)) => warn!("Topic-wide search failed: {}", e),
            None => {}
        }

        hits
    }
}
