use std::sync::Arc;

use ahash::AHashSet;
use futures::future::join_all;
use itertools::Itertools;
use mapsearch_sources::{
    Candidate, GeometryCodec, JsonFetcher, SourceAdapter, SourceResponse, build_adapter,
    interleave::{group_in_order, round_robin},
};
use tracing::{debug, instrument, warn};

use crate::{
    config::{DedupScope, SearchOptions},
    error::{Result, SearchError},
};

/// Fans a query out to every enabled source and merges the answers.
///
/// All sources are awaited before anything is merged, so the result order depends on
/// source declaration order only, never on which backend answered first.
pub struct Aggregator {
    adapters: Vec<Box<dyn SourceAdapter>>,
    fetcher: Arc<dyn JsonFetcher>,
    options: Arc<SearchOptions>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field(
                "sources",
                &self.adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    pub fn new(
        options: Arc<SearchOptions>,
        fetcher: Arc<dyn JsonFetcher>,
        codec: &Arc<dyn GeometryCodec>,
    ) -> Result<Self> {
        let adapters = options
            .source_configs()?
            .into_iter()
            .filter(|config| config.enabled)
            .map(|config| build_adapter(config, Arc::clone(codec)))
            .collect();
        Ok(Self::with_adapters(adapters, fetcher, options))
    }

    pub fn with_adapters(
        adapters: Vec<Box<dyn SourceAdapter>>,
        fetcher: Arc<dyn JsonFetcher>,
        options: Arc<SearchOptions>,
    ) -> Self {
        Self {
            adapters,
            fetcher,
            options,
        }
    }

    pub fn source_count(&self) -> usize {
        self.adapters.len()
    }

    /// Query every source and merge the answers into at most `limit` candidates.
    ///
    /// Failing sources contribute nothing. Only when every source fails does the
    /// query itself fail, with [`SearchError::AggregateFailure`].
    #[instrument(name = "Aggregate query", skip(self), fields(sources = self.adapters.len()), level = "debug")]
    pub async fn query(&self, text: &str) -> Result<Vec<Candidate>> {
        let ctx = self.options.query_context(text);
        let fetcher = self.fetcher.as_ref();

        let responses: Vec<SourceResponse> =
            join_all(self.adapters.iter().map(|adapter| adapter.fetch(&ctx, fetcher))).await;

        let failed = responses.iter().filter(|r| r.is_failure()).count();
        if !responses.is_empty() && failed == responses.len() {
            let reasons = responses
                .iter()
                .filter_map(|r| r.diagnostic.as_ref().map(|e| format!("{}: {e}", r.source)))
                .join("; ");
            warn!(failed, "Every source failed");
            return Err(SearchError::AggregateFailure {
                failed,
                message: format!("Could not fetch data: {reasons}"),
            });
        }

        let mut candidates: Vec<Candidate> =
            responses.into_iter().flat_map(|r| r.candidates).collect();
        if self.options.dedup_scope == DedupScope::Global {
            candidates = dedup_by_source_id(candidates);
        }
        debug!(
            failed,
            merged = candidates.len(),
            "Merged source answers"
        );

        Ok(self.select(candidates))
    }

    fn select(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let limit = self.options.limit;
        match self.options.attributes.group_attribute() {
            Some(attribute) => {
                let groups = group_in_order(candidates, |c| {
                    c.attribute_text(attribute).unwrap_or_default()
                });
                round_robin(groups.into_iter().map(|(_, group)| group).collect(), limit)
            }
            None => candidates.into_iter().take(limit).collect(),
        }
    }
}

/// Keep the first candidate of every source id. Candidates without an id are kept.
fn dedup_by_source_id(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = AHashSet::new();
    candidates
        .into_iter()
        .filter(|c| c.source_id().is_none_or(|id| seen.insert(id.to_owned())))
        .collect()
}
