use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use super::{SourceAdapter, as_list};
use crate::{
    Result,
    candidate::{Candidate, value_text},
    matching::{QueryMatcher, prefix_then_substring},
    template::{QueryContext, SourceConfig, lookup},
    transport::JsonFetcher,
};

/// Localities (place names).
///
/// Answers are point features. Matching is done client side in two passes, prefix
/// matches first, and duplicates by id are removed. The backend lists point
/// coordinates northing first.
#[derive(Debug, Clone)]
pub struct LocalityAdapter {
    config: SourceConfig,
}

impl LocalityAdapter {
    pub const fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn name_of(&self, item: &Value) -> Option<String> {
        lookup(item, &self.config.fields.name).and_then(value_text)
    }

    fn id_of(&self, item: &Value) -> Option<String> {
        self.config
            .fields
            .id
            .as_deref()
            .and_then(|path| lookup(item, path))
            .and_then(value_text)
    }

    fn wkt_of(&self, item: &Value) -> Option<String> {
        let coordinates = lookup(item, self.config.fields.geometry.as_deref()?)?.as_array()?;
        let northing = coordinates.first()?.as_f64()?;
        let easting = coordinates.get(1)?.as_f64()?;
        Some(format!("POINT({easting} {northing})"))
    }
}

#[async_trait]
impl SourceAdapter for LocalityAdapter {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    #[instrument(name = "Locality fetch", skip_all, fields(query = %ctx.query), level = "debug")]
    async fn fetch_candidates(
        &self,
        ctx: &QueryContext,
        fetcher: &dyn JsonFetcher,
    ) -> Result<Vec<Candidate>> {
        let body = fetcher.get_json(&self.config.request(ctx)).await?;
        let items = as_list(&body, &self.config.name);
        let matcher = QueryMatcher::new(&ctx.query)?;

        let matched = prefix_then_substring(
            items,
            &matcher,
            ctx.limit,
            |item| self.name_of(item).into_iter().collect(),
            |item| self.id_of(item).or_else(|| self.name_of(item)),
        );

        Ok(matched
            .into_iter()
            .filter_map(|item| {
                let name = self.name_of(item)?;
                let builder = Candidate::builder(self.config.kind, name)
                    .maybe_source_id(self.id_of(item))
                    .layer(self.config.name.clone());
                Some(match self.wkt_of(item) {
                    Some(wkt) => builder.wkt(wkt),
                    None => builder,
                }
                .build())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        GEOMETRY_KEY, SourceKind,
        test_data::{StaticFetcher, locality_features},
    };

    fn adapter() -> LocalityAdapter {
        LocalityAdapter::new(
            SourceConfig::new(SourceKind::Locality, "https://ort.example/?kommunkod={codes}&q={q}")
                .named("Ort"),
        )
    }

    fn sample() -> Value {
        locality_features(&[
            ("1", "Storgatan", 6610000.0, 150000.0),
            ("2", "Haveristo", 6611000.0, 151000.0),
            ("3", "Stockholm", 6580000.0, 674000.0),
            ("4", "Kolbäck", 6600000.0, 140000.0),
        ])
    }

    #[tokio::test]
    async fn test_prefix_then_substring_order() {
        let fetcher = StaticFetcher::new().with_json("ort.example", sample());
        let candidates = adapter()
            .fetch_candidates(&QueryContext::new("sto", 9), &fetcher)
            .await
            .unwrap();
        let names: Vec<_> = candidates.iter().map(Candidate::display_name).collect();
        assert_eq!(names, vec!["Storgatan", "Stockholm", "Haveristo"]);
    }

    #[tokio::test]
    async fn test_no_duplicates_by_id() {
        let fetcher = StaticFetcher::new().with_json(
            "ort.example",
            locality_features(&[
                ("1", "Storvik", 1.0, 2.0),
                ("1", "Storvik", 1.0, 2.0),
                ("2", "Västra Storvik", 1.0, 2.0),
            ]),
        );
        let candidates = adapter()
            .fetch_candidates(&QueryContext::new("storvik", 9), &fetcher)
            .await
            .unwrap();
        let ids: Vec<_> = candidates.iter().filter_map(Candidate::source_id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_coordinates_are_swapped_to_easting_northing() {
        let fetcher = StaticFetcher::new().with_json(
            "ort.example",
            locality_features(&[("9", "Kolbäck", 6600000.0, 140000.0)]),
        );
        let candidates = adapter()
            .fetch_candidates(&QueryContext::new("kol", 9), &fetcher)
            .await
            .unwrap();
        assert_eq!(
            candidates[0].attribute_text(GEOMETRY_KEY).as_deref(),
            Some("POINT(140000 6600000)")
        );
    }

    #[tokio::test]
    async fn test_nothing_matches() {
        let fetcher = StaticFetcher::new().with_json("ort.example", sample());
        let candidates = adapter()
            .fetch_candidates(&QueryContext::new("xyz", 9), &fetcher)
            .await
            .unwrap();
        assert!(candidates.is_empty());

        let fetcher = StaticFetcher::new().with_json("ort.example", json!(null));
        let candidates = adapter()
            .fetch_candidates(&QueryContext::new("sto", 9), &fetcher)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }
}
