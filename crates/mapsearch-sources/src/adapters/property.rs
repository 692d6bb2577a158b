use async_trait::async_trait;
use tracing::{instrument, trace};

use super::{SourceAdapter, as_list};
use crate::{
    Result,
    candidate::{Candidate, value_text},
    template::{QueryContext, SourceConfig, lookup},
    transport::JsonFetcher,
};

/// Cadastral properties by designation.
///
/// The backend answers with a list of features whose geometry is not usable for
/// display, so candidates carry a deferred geometry reference keyed by the object
/// identity. Results are ordered by plain designation compare.
#[derive(Debug, Clone)]
pub struct PropertyAdapter {
    config: SourceConfig,
}

impl PropertyAdapter {
    pub const fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceAdapter for PropertyAdapter {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    #[instrument(name = "Property fetch", skip_all, fields(query = %ctx.query), level = "debug")]
    async fn fetch_candidates(
        &self,
        ctx: &QueryContext,
        fetcher: &dyn JsonFetcher,
    ) -> Result<Vec<Candidate>> {
        let body = fetcher.get_json(&self.config.request(ctx)).await?;
        let fields = &self.config.fields;

        let mut candidates: Vec<Candidate> = as_list(&body, &self.config.name)
            .iter()
            .filter_map(|item| {
                let Some(name) = lookup(item, &fields.name).and_then(value_text) else {
                    trace!(?item, "Skipping property without designation");
                    return None;
                };
                let id = fields
                    .id
                    .as_deref()
                    .and_then(|path| lookup(item, path))
                    .and_then(value_text);
                let raw = item
                    .get("properties")
                    .and_then(|p| p.as_object())
                    .cloned()
                    .unwrap_or_default();

                let builder = Candidate::builder(self.config.kind, name)
                    .layer(self.config.name.clone())
                    .attributes(raw);
                let builder = match id {
                    Some(id) => builder.source_id(id.clone()).deferred(id),
                    None => builder,
                };
                Some(builder.build())
            })
            .collect();

        candidates.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        GeometryRef, SourceKind,
        test_data::{StaticFetcher, property_features},
    };

    fn adapter() -> PropertyAdapter {
        PropertyAdapter::new(
            SourceConfig::new(
                SourceKind::Property,
                "https://fastighet.example/search?q={municipalities} {q}",
            )
            .named("Fastighet"),
        )
    }

    #[tokio::test]
    async fn test_sorted_by_designation() {
        let fetcher = StaticFetcher::new().with_json(
            "fastighet.example",
            property_features(&[
                ("Hallstahammar Östanby 1:3", "c"),
                ("Hallstahammar Kolbäck 2:1", "a"),
                ("Hallstahammar Eldsbo 4:5", "b"),
            ]),
        );

        let candidates = adapter()
            .fetch_candidates(&QueryContext::new("hall", 9), &fetcher)
            .await
            .unwrap();
        let names: Vec<_> = candidates.iter().map(Candidate::display_name).collect();
        assert_eq!(
            names,
            vec![
                "Hallstahammar Eldsbo 4:5",
                "Hallstahammar Kolbäck 2:1",
                "Hallstahammar Östanby 1:3"
            ]
        );
    }

    #[tokio::test]
    async fn test_geometry_is_deferred_by_object_id() {
        let fetcher = StaticFetcher::new().with_json(
            "fastighet.example",
            property_features(&[("Hallstahammar Eldsbo 4:5", "909a6a80-d5e2")]),
        );

        let candidates = adapter()
            .fetch_candidates(&QueryContext::new("eldsbo", 9), &fetcher)
            .await
            .unwrap();
        let candidate = &candidates[0];
        assert_eq!(candidate.source_id(), Some("909a6a80-d5e2"));
        assert_eq!(
            candidate.geometry_ref(),
            &GeometryRef::Deferred {
                object_id: "909a6a80-d5e2".into()
            }
        );
        assert_eq!(candidate.layer().as_deref(), Some("Fastighet"));
        assert_eq!(candidate.source_kind(), SourceKind::Property);
    }

    #[tokio::test]
    async fn test_query_and_municipalities_are_sent() {
        let fetcher = StaticFetcher::new().with_json("fastighet.example", property_features(&[]));
        let ctx = QueryContext {
            query: "eldsbo".into(),
            municipalities: "Hallstahammar".into(),
            limit: 9,
            ..QueryContext::default()
        };

        adapter().fetch_candidates(&ctx, &fetcher).await.unwrap();
        assert_eq!(
            fetcher.calls()[0].url,
            "https://fastighet.example/search?q=Hallstahammar eldsbo"
        );
    }
}
