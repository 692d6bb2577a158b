//! Search widget configuration.
//!
//! Options are loaded once, from JSON or through [`SearchOptionsBuilder`], validated,
//! and never changed afterwards. Per-source configuration is derived from them.

use std::{collections::BTreeMap, fmt, path::Path, time::Duration};

use mapsearch_sources::{
    FieldPaths, QueryContext, SourceConfig, SourceKind, UrlTemplate, strip_credentials,
    transport::Credentials,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SearchError};

/// How a resolved selection is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayMode {
    /// Draw the geometry in the search layer
    #[default]
    GeometryOnly,
    /// Open the feature-info popup on the geometry
    Popup,
}

/// Scope of duplicate removal across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DedupScope {
    /// Each adapter removes its own duplicates; the merged list is left alone
    #[default]
    PerSource,
    /// Additionally remove duplicates by source id across all adapters
    Global,
}

/// Names of candidate attributes that drive grouping and selection resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeMapping {
    /// Primary name attribute shown in the suggestion list
    pub search_attribute: String,
    pub title_attribute: Option<String>,
    pub content_attribute: Option<String>,
    pub geometry_attribute: Option<String>,
    /// Attribute holding the layer/type a candidate belongs to
    pub layer_name_attribute: Option<String>,
    /// Explicit layer name used for titles
    pub layer_name: Option<String>,
    pub id_attribute: Option<String>,
    pub easting: Option<String>,
    pub northing: Option<String>,
    /// Static title for selections
    pub title: Option<String>,
}

impl Default for AttributeMapping {
    fn default() -> Self {
        Self {
            search_attribute: mapsearch_sources::NAME_KEY.to_owned(),
            title_attribute: None,
            content_attribute: None,
            geometry_attribute: None,
            layer_name_attribute: None,
            layer_name: None,
            id_attribute: None,
            easting: None,
            northing: None,
            title: None,
        }
    }
}

impl AttributeMapping {
    /// Attribute results are grouped and interleaved by, when grouping applies.
    pub fn group_attribute(&self) -> Option<&str> {
        if self.search_attribute.is_empty() {
            return None;
        }
        self.layer_name_attribute.as_deref()
    }
}

/// Connection details of the generic search-index source.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSearchOptions {
    /// Display name, also used as the layer label of its candidates
    pub name: String,
    /// URL template; may embed `user:password@`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub search_in: Vec<String>,
    pub id: Option<String>,
    pub text: String,
    pub geometry: Option<String>,
}

impl fmt::Debug for IndexSearchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSearchOptions")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("search_in", &self.search_in)
            .field("id", &self.id)
            .field("text", &self.text)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

/// Every recognised widget option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub property_url: Option<String>,
    pub address_url: Option<String>,
    pub locality_url: Option<String>,
    pub index_search: Option<IndexSearchOptions>,
    /// Geometry-by-id lookup, `{objectId}` placeholder
    pub area_by_id_url: Option<String>,
    /// Geometry-by-coordinate lookup, `{easting}`/`{northing}` placeholders
    pub area_by_coordinate_url: Option<String>,
    /// Enabled municipalities; a comma-separated string is accepted too
    #[serde(deserialize_with = "comma_list")]
    pub municipalities: Vec<String>,
    /// Municipality name to backend code
    pub municipality_codes: BTreeMap<String, String>,
    pub address_status: Option<String>,
    pub limit: usize,
    pub min_length: usize,
    pub debounce_ms: u64,
    pub show_feature: DisplayMode,
    #[serde(flatten)]
    pub attributes: AttributeMapping,
    pub no_results_text: String,
    pub estate_lookup: bool,
    pub estate_lookup_active: bool,
    pub estate_report_url: Option<String>,
    pub estate_report_width: String,
    pub estate_report_height: String,
    /// Title of map-click selections
    pub click_title: String,
    pub dedup_scope: DedupScope,
    pub filter_mismatched_streets: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            property_url: None,
            address_url: None,
            locality_url: None,
            index_search: None,
            area_by_id_url: None,
            area_by_coordinate_url: None,
            municipalities: Vec::new(),
            municipality_codes: BTreeMap::new(),
            address_status: None,
            limit: 9,
            min_length: 4,
            debounce_ms: 500,
            show_feature: DisplayMode::default(),
            attributes: AttributeMapping::default(),
            no_results_text: "No results".to_owned(),
            estate_lookup: false,
            estate_lookup_active: false,
            estate_report_url: None,
            estate_report_width: "700px".to_owned(),
            estate_report_height: "500px".to_owned(),
            click_title: "Property".to_owned(),
            dedup_scope: DedupScope::default(),
            filter_mismatched_streets: false,
        }
    }
}

fn comma_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match ListOrString::deserialize(deserializer)? {
        ListOrString::List(items) => items,
        ListOrString::Joined(joined) => joined.split(',').map(str::to_owned).collect(),
    }
    .into_iter()
    .map(|s| s.trim().to_owned())
    .filter(|s| !s.is_empty())
    .collect())
}

impl SearchOptions {
    pub fn builder() -> SearchOptionsBuilder {
        SearchOptionsBuilder::new()
    }

    /// Parse and validate options from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Read, parse and validate options from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        debug!(path = ?path.as_ref(), "Loaded search options");
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(SearchError::Configuration("limit must be at least 1".into()));
        }
        if self.estate_lookup && self.area_by_coordinate_url.is_none() {
            return Err(SearchError::Configuration(
                "estate lookup needs areaByCoordinateUrl".into(),
            ));
        }
        if let Some(index) = &self.index_search {
            strip_credentials(&index.url)?;
        }
        Ok(())
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn municipality_code(&self, name: &str) -> Option<String> {
        if let Some(code) = self.municipality_codes.get(name) {
            return Some(code.clone());
        }
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
            return Some(name.to_owned());
        }
        warn!(municipality = name, "No backend code for municipality, skipping it");
        None
    }

    /// The per-query context shared by all adapters.
    pub fn query_context(&self, query: &str) -> QueryContext {
        QueryContext {
            query: query.to_owned(),
            municipalities: self.municipalities.join(","),
            codes: self
                .municipalities
                .iter()
                .filter_map(|m| self.municipality_code(m))
                .collect::<Vec<_>>()
                .join(","),
            limit: self.limit,
            status: self.address_status.clone(),
        }
    }

    /// Derive the configuration of every source that has a URL.
    pub fn source_configs(&self) -> Result<Vec<SourceConfig>> {
        let mut configs = Vec::new();
        if let Some(url) = &self.property_url {
            configs.push(SourceConfig::new(SourceKind::Property, url.clone()));
        }
        if let Some(url) = &self.address_url {
            configs.push(
                SourceConfig::new(SourceKind::Address, url.clone())
                    .filter_mismatched_streets(self.filter_mismatched_streets),
            );
        }
        if let Some(url) = &self.locality_url {
            configs.push(SourceConfig::new(SourceKind::Locality, url.clone()));
        }
        if let Some(index) = &self.index_search {
            let (url, embedded) = strip_credentials(&index.url)?;
            let credentials = embedded.or_else(|| {
                index.username.as_ref().map(|username| Credentials {
                    username: username.clone(),
                    password: index.password.clone(),
                })
            });
            configs.push(
                SourceConfig::new(SourceKind::Index, url)
                    .named(index.name.clone())
                    .with_credentials(credentials)
                    .with_fields(FieldPaths {
                        id: index.id.clone(),
                        name: index.text.clone(),
                        geometry: index.geometry.clone(),
                        search_in: index.search_in.clone(),
                    }),
            );
        }
        Ok(configs)
    }

    pub fn area_by_id_template(&self) -> Result<UrlTemplate> {
        self.area_by_id_url
            .as_ref()
            .map(UrlTemplate::new)
            .ok_or_else(|| SearchError::Configuration("areaByIdUrl is not configured".into()))
    }

    pub fn area_by_coordinate_template(&self) -> Result<UrlTemplate> {
        self.area_by_coordinate_url
            .as_ref()
            .map(UrlTemplate::new)
            .ok_or_else(|| {
                SearchError::Configuration("areaByCoordinateUrl is not configured".into())
            })
    }

    /// Report URL prefix, when estate reports are enabled.
    pub fn report_url(&self) -> Option<&str> {
        self.estate_report_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Builder for creating search options with ergonomic defaults
#[derive(Debug, Clone, Default)]
pub struct SearchOptionsBuilder {
    options: SearchOptions,
}

impl SearchOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: SearchOptions::default(),
        }
    }

    pub fn property_url(mut self, url: impl Into<String>) -> Self {
        self.options.property_url = Some(url.into());
        self
    }

    pub fn address_url(mut self, url: impl Into<String>) -> Self {
        self.options.address_url = Some(url.into());
        self
    }

    pub fn locality_url(mut self, url: impl Into<String>) -> Self {
        self.options.locality_url = Some(url.into());
        self
    }

    pub fn index_search(mut self, index: IndexSearchOptions) -> Self {
        self.options.index_search = Some(index);
        self
    }

    pub fn area_by_id_url(mut self, url: impl Into<String>) -> Self {
        self.options.area_by_id_url = Some(url.into());
        self
    }

    pub fn area_by_coordinate_url(mut self, url: impl Into<String>) -> Self {
        self.options.area_by_coordinate_url = Some(url.into());
        self
    }

    pub fn municipalities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.municipalities = names.into_iter().map(|s| s.into().trim().to_owned()).collect();
        self
    }

    pub fn municipality_code(mut self, name: impl Into<String>, code: impl Into<String>) -> Self {
        self.options
            .municipality_codes
            .insert(name.into(), code.into());
        self
    }

    pub fn address_status(mut self, status: impl Into<String>) -> Self {
        self.options.address_status = Some(status.into());
        self
    }

    /// Set the maximum number of suggestions shown
    pub const fn limit(mut self, limit: usize) -> Self {
        self.options.limit = limit;
        self
    }

    /// Set the number of characters typed before a query is sent
    pub const fn min_length(mut self, min_length: usize) -> Self {
        self.options.min_length = min_length;
        self
    }

    pub const fn debounce_ms(mut self, millis: u64) -> Self {
        self.options.debounce_ms = millis;
        self
    }

    pub const fn display_mode(mut self, mode: DisplayMode) -> Self {
        self.options.show_feature = mode;
        self
    }

    pub fn attributes(mut self, attributes: AttributeMapping) -> Self {
        self.options.attributes = attributes;
        self
    }

    pub fn search_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.options.attributes.search_attribute = attribute.into();
        self
    }

    pub fn title_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.options.attributes.title_attribute = Some(attribute.into());
        self
    }

    pub fn content_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.options.attributes.content_attribute = Some(attribute.into());
        self
    }

    pub fn geometry_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.options.attributes.geometry_attribute = Some(attribute.into());
        self
    }

    pub fn layer_name_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.options.attributes.layer_name_attribute = Some(attribute.into());
        self
    }

    pub fn layer_name(mut self, layer: impl Into<String>) -> Self {
        self.options.attributes.layer_name = Some(layer.into());
        self
    }

    pub fn id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.options.attributes.id_attribute = Some(attribute.into());
        self
    }

    pub fn coordinate_attributes(
        mut self,
        easting: impl Into<String>,
        northing: impl Into<String>,
    ) -> Self {
        self.options.attributes.easting = Some(easting.into());
        self.options.attributes.northing = Some(northing.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.options.attributes.title = Some(title.into());
        self
    }

    pub fn no_results_text(mut self, text: impl Into<String>) -> Self {
        self.options.no_results_text = text.into();
        self
    }

    /// Enable map-click estate lookup, initially active or not
    pub const fn estate_lookup(mut self, initially_active: bool) -> Self {
        self.options.estate_lookup = true;
        self.options.estate_lookup_active = initially_active;
        self
    }

    pub fn estate_report_url(mut self, url: impl Into<String>) -> Self {
        self.options.estate_report_url = Some(url.into());
        self
    }

    pub fn click_title(mut self, title: impl Into<String>) -> Self {
        self.options.click_title = title.into();
        self
    }

    pub const fn dedup_scope(mut self, scope: DedupScope) -> Self {
        self.options.dedup_scope = scope;
        self
    }

    pub const fn filter_mismatched_streets(mut self, enabled: bool) -> Self {
        self.options.filter_mismatched_streets = enabled;
        self
    }

    /// Validate and build the final options
    pub fn build(self) -> Result<SearchOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_options() {
        let options = SearchOptions::default();
        assert_eq!(options.limit, 9);
        assert_eq!(options.min_length, 4);
        assert_eq!(options.debounce(), Duration::from_millis(500));
        assert_eq!(options.show_feature, DisplayMode::GeometryOnly);
        assert_eq!(options.attributes.search_attribute, "name");
        assert_eq!(options.dedup_scope, DedupScope::PerSource);
        assert!(options.source_configs().unwrap().is_empty());
    }

    #[test]
    fn test_from_json_with_comma_separated_municipalities() {
        let options = SearchOptions::from_json(
            r#"{
                "addressUrl": "https://adress.example/?codes={codes}&q={q}",
                "municipalities": "Hallstahammar, Surahammar ,",
                "municipalityCodes": { "Hallstahammar": "1961" },
                "limit": 5,
                "showFeature": "popup",
                "layerNameAttribute": "layer",
                "titleAttribute": "name"
            }"#,
        )
        .unwrap();

        assert_eq!(options.municipalities, vec!["Hallstahammar", "Surahammar"]);
        assert_eq!(options.limit, 5);
        assert_eq!(options.show_feature, DisplayMode::Popup);
        assert_eq!(options.attributes.layer_name_attribute.as_deref(), Some("layer"));
        assert_eq!(options.attributes.search_attribute, "name");

        let ctx = options.query_context("stor");
        assert_eq!(ctx.municipalities, "Hallstahammar,Surahammar");
        // Surahammar has no code and is not numeric
        assert_eq!(ctx.codes, "1961");
    }

    #[test]
    fn test_numeric_municipality_passes_through() {
        let options = SearchOptions::builder()
            .municipalities(["1961", "1907"])
            .build()
            .unwrap();
        assert_eq!(options.query_context("x").codes, "1961,1907");
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "localityUrl": "https://ort.example/?q={{q}}", "minLength": 2 }}"#)
            .unwrap();

        let options = SearchOptions::from_path(file.path()).unwrap();
        assert_eq!(options.min_length, 2);
        assert_eq!(
            options.locality_url.as_deref(),
            Some("https://ort.example/?q={q}")
        );
    }

    #[test]
    fn test_validation() {
        assert!(SearchOptions::builder().limit(0).build().is_err());
        assert!(SearchOptions::builder().estate_lookup(true).build().is_err());
        assert!(
            SearchOptions::builder()
                .estate_lookup(true)
                .area_by_coordinate_url("https://yta.example/?e={easting}&n={northing}")
                .build()
                .is_ok()
        );
        assert!(SearchOptions::from_json("{ \"limit\": \"many\" }").is_err());
    }

    #[test]
    fn test_index_credentials_from_url_or_fields() {
        let index = IndexSearchOptions {
            name: "Detaljplaner".into(),
            url: "https://reader:pw@es.example/_search?q={q}".into(),
            username: Some("ignored".into()),
            password: None,
            search_in: vec!["_source.title".into()],
            id: Some("_source.id".into()),
            text: "_source.title".into(),
            geometry: Some("_source.geom".into()),
        };
        let options = SearchOptions::builder()
            .index_search(index.clone())
            .build()
            .unwrap();
        let config = options.source_configs().unwrap().remove(0);
        assert_eq!(config.kind, SourceKind::Index);
        assert_eq!(config.name, "Detaljplaner");
        assert_eq!(config.url.as_str(), "https://es.example/_search?q={q}");
        assert_eq!(config.credentials.unwrap().username, "reader");

        let options = SearchOptions::builder()
            .index_search(IndexSearchOptions {
                url: "https://es.example/_search?q={q}".into(),
                username: Some("svc".into()),
                password: Some("pw".into()),
                ..index
            })
            .build()
            .unwrap();
        let config = options.source_configs().unwrap().remove(0);
        assert_eq!(config.credentials.unwrap().username, "svc");
    }

    #[test]
    fn test_source_order_and_policy() {
        let options = SearchOptions::builder()
            .locality_url("https://ort.example/?q={q}")
            .property_url("https://fastighet.example/?q={q}")
            .address_url("https://adress.example/?q={q}")
            .filter_mismatched_streets(true)
            .build()
            .unwrap();
        let configs = options.source_configs().unwrap();
        let kinds: Vec<_> = configs.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![SourceKind::Property, SourceKind::Address, SourceKind::Locality]
        );
        assert!(configs[1].filter_mismatched_streets);
    }

    #[test]
    fn test_group_attribute_needs_both_names() {
        let mut attributes = AttributeMapping::default();
        assert_eq!(attributes.group_attribute(), None);
        attributes.layer_name_attribute = Some("layer".into());
        assert_eq!(attributes.group_attribute(), Some("layer"));
        attributes.search_attribute.clear();
        assert_eq!(attributes.group_attribute(), None);
    }
}
