use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use super::{SourceAdapter, as_list, malformed};
use crate::{
    Result,
    candidate::{Candidate, value_text},
    interleave::{group_in_order, round_robin},
    matching::QueryMatcher,
    template::{QueryContext, SourceConfig},
    transport::JsonFetcher,
};

/// Street addresses.
///
/// The backend answers with `[id, name, x, y]` tuples and tends to return long runs
/// of the same street. Addresses are grouped by street name and interleaved across
/// streets before the limit is applied, so one long street cannot crowd out the rest.
#[derive(Debug, Clone)]
pub struct AddressAdapter {
    config: SourceConfig,
}

/// Street part of an address: the name without its first token (building prefix)
/// and its last token (house number).
///
/// ```rust
/// use mapsearch_sources::adapters::street_name;
///
/// assert_eq!(street_name("Hallstahammar Erik vallers väg 12a"), "Erik vallers väg");
/// assert_eq!(street_name("12"), "");
/// ```
pub fn street_name(name: &str) -> String {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    if tokens.len() <= 2 {
        return String::new();
    }
    tokens[1..tokens.len() - 1].join(" ")
}

struct AddressRow {
    id: Option<String>,
    name: String,
    x: f64,
    y: f64,
}

fn ordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl AddressAdapter {
    pub const fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn parse_row(&self, row: &Value) -> Result<AddressRow> {
        let Value::Array(cells) = row else {
            return Err(malformed(&self.config, "address row is not a tuple"));
        };
        let name = cells
            .get(1)
            .and_then(value_text)
            .ok_or_else(|| malformed(&self.config, "address row without name"))?;
        let (Some(x), Some(y)) = (ordinate(cells.get(2)), ordinate(cells.get(3))) else {
            return Err(malformed(
                &self.config,
                format!("address '{name}' without coordinates"),
            ));
        };
        Ok(AddressRow {
            id: cells.first().and_then(value_text),
            name,
            x,
            y,
        })
    }
}

#[async_trait]
impl SourceAdapter for AddressAdapter {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    #[instrument(name = "Address fetch", skip_all, fields(query = %ctx.query), level = "debug")]
    async fn fetch_candidates(
        &self,
        ctx: &QueryContext,
        fetcher: &dyn JsonFetcher,
    ) -> Result<Vec<Candidate>> {
        let body = fetcher.get_json(&self.config.request(ctx)).await?;
        let rows = as_list(&body, &self.config.name)
            .iter()
            .map(|row| self.parse_row(row))
            .collect::<Result<Vec<_>>>()?;

        let mut streets = group_in_order(rows, |row| street_name(&row.name));

        if self.config.filter_mismatched_streets {
            // The backend sometimes matches on other address components; keep only
            // streets that contain the first query token.
            let first_token = ctx.query.split_whitespace().next().unwrap_or_default();
            let matcher = QueryMatcher::new(first_token)?;
            let before = streets.len();
            streets.retain(|(street, _)| matcher.occurs_in(street));
            debug!(dropped = before - streets.len(), "Filtered mismatched streets");
        }
        trace!(streets = streets.len(), "Grouped addresses by street");

        let picked = round_robin(
            streets.into_iter().map(|(_, rows)| rows).collect(),
            ctx.limit,
        );

        let mut candidates: Vec<(String, Candidate)> = picked
            .into_iter()
            .map(|row| {
                let street = street_name(&row.name);
                let candidate = Candidate::builder(self.config.kind, row.name)
                    .maybe_source_id(row.id)
                    .layer(self.config.name.clone())
                    .attribute("street", street.clone())
                    .wkt(format!("POINT({} {})", row.x, row.y))
                    .build();
                (street, candidate)
            })
            .collect();
        candidates.sort_by(|(a, _), (b, _)| a.cmp(b));

        Ok(candidates.into_iter().map(|(_, c)| c).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        GEOMETRY_KEY, SourceKind,
        test_data::{StaticFetcher, address_rows},
    };

    fn adapter(filter: bool) -> AddressAdapter {
        AddressAdapter::new(
            SourceConfig::new(SourceKind::Address, "https://adress.example/?q={q}")
                .named("Adress")
                .filter_mismatched_streets(filter),
        )
    }

    fn rows() -> Value {
        address_rows(&[
            ("Hallstahammar Storgatan 1", 1.0, 1.0),
            ("Hallstahammar Storgatan 2", 1.0, 2.0),
            ("Hallstahammar Storgatan 3", 1.0, 3.0),
            ("Hallstahammar Storgatan 4", 1.0, 4.0),
            ("Hallstahammar Brunnsvägen 1", 2.0, 1.0),
            ("Hallstahammar Brunnsvägen 2", 2.0, 2.0),
            ("Hallstahammar Aspvägen 7", 3.0, 1.0),
        ])
    }

    #[tokio::test]
    async fn test_interleaves_streets_before_limit() {
        let fetcher = StaticFetcher::new().with_json("adress.example", rows());
        let candidates = adapter(false)
            .fetch_candidates(&QueryContext::new("stor", 4), &fetcher)
            .await
            .unwrap();

        let names: Vec<_> = candidates.iter().map(Candidate::display_name).collect();
        // Round robin picks Storgatan 1, Brunnsvägen 1, Aspvägen 7, Storgatan 2;
        // the picks are then ordered by street name.
        assert_eq!(
            names,
            vec![
                "Hallstahammar Aspvägen 7",
                "Hallstahammar Brunnsvägen 1",
                "Hallstahammar Storgatan 1",
                "Hallstahammar Storgatan 2",
            ]
        );
    }

    #[tokio::test]
    async fn test_sorted_by_street_not_full_name() {
        let fetcher = StaticFetcher::new().with_json(
            "adress.example",
            address_rows(&[("Aby Storgatan 1", 1.0, 1.0), ("Kolback Aspvagen 2", 2.0, 2.0)]),
        );
        let candidates = adapter(false)
            .fetch_candidates(&QueryContext::new("a", 9), &fetcher)
            .await
            .unwrap();

        let names: Vec<_> = candidates.iter().map(Candidate::display_name).collect();
        assert_eq!(names, vec!["Kolback Aspvagen 2", "Aby Storgatan 1"]);
    }

    #[tokio::test]
    async fn test_point_geometry_and_street_attribute() {
        let fetcher = StaticFetcher::new().with_json(
            "adress.example",
            address_rows(&[("Hallstahammar Erik vallers väg 12a", 134690.511, 6610941.918)]),
        );
        let candidates = adapter(false)
            .fetch_candidates(&QueryContext::new("erik", 9), &fetcher)
            .await
            .unwrap();
        let candidate = &candidates[0];
        assert_eq!(
            candidate.attribute_text(GEOMETRY_KEY).as_deref(),
            Some("POINT(134690.511 6610941.918)")
        );
        assert_eq!(candidate.attribute_text("street").as_deref(), Some("Erik vallers väg"));
        assert_eq!(candidate.source_id(), Some("1"));
    }

    #[tokio::test]
    async fn test_mismatched_street_filter_is_optional() {
        let fetcher = StaticFetcher::new().with_json("adress.example", rows());
        let ctx = QueryContext::new("stor", 9);

        let unfiltered = adapter(false).fetch_candidates(&ctx, &fetcher).await.unwrap();
        assert_eq!(unfiltered.len(), 7);

        let filtered = adapter(true).fetch_candidates(&ctx, &fetcher).await.unwrap();
        assert_eq!(filtered.len(), 4);
        assert!(filtered.iter().all(|c| c.display_name().contains("Storgatan")));
    }

    #[tokio::test]
    async fn test_malformed_row_fails_the_source() {
        let fetcher =
            StaticFetcher::new().with_json("adress.example", json!([[1, "Storgatan 1", "x", 2]]));
        let result = adapter(false)
            .fetch_candidates(&QueryContext::new("stor", 9), &fetcher)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_street_name() {
        assert_eq!(street_name("Kolbäck Gamla vägen 3"), "Gamla vägen");
        assert_eq!(street_name("Storgatan 1"), "");
    }
}
