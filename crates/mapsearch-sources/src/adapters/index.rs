use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use super::{SourceAdapter, as_list};
use crate::{
    Result,
    candidate::{Candidate, value_text},
    geometry::GeometryCodec,
    matching::{QueryMatcher, prefix_then_substring},
    template::{QueryContext, SourceConfig, lookup},
    transport::JsonFetcher,
};

/// A generic text search index answering with a `hits.hits` envelope.
///
/// Hits are matched against every configured search field with the same
/// prefix-then-substring policy as localities. Hit geometry is GeoJSON and is
/// converted to WKT through the [`GeometryCodec`]. Credentials are taken from the
/// source configuration and sent as a basic-auth header.
#[derive(Clone)]
pub struct IndexAdapter {
    config: SourceConfig,
    codec: Arc<dyn GeometryCodec>,
}

impl std::fmt::Debug for IndexAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IndexAdapter {
    pub fn new(config: SourceConfig, codec: Arc<dyn GeometryCodec>) -> Self {
        Self { config, codec }
    }

    fn text_at(hit: &Value, path: &str) -> Option<String> {
        lookup(hit, path).and_then(value_text)
    }

    fn to_candidate(&self, hit: &Value) -> Result<Option<Candidate>> {
        let fields = &self.config.fields;
        let Some(name) = Self::text_at(hit, &fields.name) else {
            return Ok(None);
        };
        let id = fields.id.as_deref().and_then(|path| Self::text_at(hit, path));
        let geometry = fields
            .geometry
            .as_deref()
            .and_then(|path| lookup(hit, path))
            .filter(|g| !g.is_null());

        let builder = Candidate::builder(self.config.kind, name)
            .maybe_source_id(id)
            .layer(self.config.name.clone());
        let builder = match geometry {
            Some(geometry) => builder.wkt(self.codec.geojson_to_wkt(geometry)?),
            None => builder,
        };
        Ok(Some(builder.build()))
    }
}

#[async_trait]
impl SourceAdapter for IndexAdapter {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    #[instrument(name = "Index fetch", skip_all, fields(source = %self.config.name, query = %ctx.query), level = "debug")]
    async fn fetch_candidates(
        &self,
        ctx: &QueryContext,
        fetcher: &dyn JsonFetcher,
    ) -> Result<Vec<Candidate>> {
        let body = fetcher.get_json(&self.config.request(ctx)).await?;
        let hits = lookup(&body, "hits.hits").map_or(&[][..], |hits| as_list(hits, &self.config.name));
        let matcher = QueryMatcher::new(&ctx.query)?;
        let searchable = self.config.fields.searchable();

        let matched = prefix_then_substring(
            hits,
            &matcher,
            ctx.limit,
            |hit| {
                searchable
                    .iter()
                    .filter_map(|path| Self::text_at(hit, path))
                    .collect()
            },
            |hit| {
                self.config
                    .fields
                    .id
                    .as_deref()
                    .and_then(|path| Self::text_at(hit, path))
                    .or_else(|| Self::text_at(hit, &self.config.fields.name))
            },
        );

        let mut candidates = Vec::with_capacity(matched.len());
        for hit in matched {
            if let Some(candidate) = self.to_candidate(hit)? {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }
}
