//! Selection resolution.
//!
//! Which attributes are configured decides how a chosen suggestion becomes something
//! displayable. The rules are tried in a fixed order and the first one whose
//! predicate holds handles the selection; when none holds the configuration is
//! unusable and resolution fails loudly.

use std::sync::Arc;

use async_trait::async_trait;
use mapsearch_sources::{
    Attributes, Candidate, Feature, FeatureCollection, GEOMETRY_KEY, Geometry, GeometryCodec,
    GeometryRef, ID_KEY, JsonFetcher, Request, SourceKind,
};
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::{
    config::{AttributeMapping, DisplayMode, SearchOptions},
    error::{Result, SearchError},
};

mod click;
mod merge;
mod report;

pub use click::sub_unit_label;
pub use merge::merge_polygons;
pub use report::{EstateReport, ReportBody, build_report, designation};

/// A layer of the host map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: String,
    pub title: String,
}

/// What the engine needs from the embedding map viewer.
#[async_trait]
pub trait MapHost: Send + Sync {
    /// Look up a layer by name.
    fn layer(&self, name: &str) -> Option<LayerInfo>;

    /// Fetch the full features with `id` from `layer`.
    async fn features_by_id(&self, layer: &LayerInfo, id: &str) -> Result<Vec<Feature>>;
}

/// The resolution rules, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Fetch the feature by id from the candidate's layer
    FeatureById,
    /// Parse the candidate geometry, titled after a configured layer
    LayerGeometry,
    /// Title and content from attributes; properties fetch their area by id
    TitledContent,
    /// Parse the candidate geometry under a static title
    StaticTitleGeometry,
    /// Place a marker at the candidate's coordinates
    Coordinates,
}

struct Rule {
    strategy: Strategy,
    applies: fn(&AttributeMapping) -> bool,
}

fn is_set(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

fn layer_and_id(a: &AttributeMapping) -> bool {
    is_set(a.layer_name_attribute.as_ref()) && is_set(a.id_attribute.as_ref())
}

fn geometry_and_layer(a: &AttributeMapping) -> bool {
    is_set(a.geometry_attribute.as_ref()) && is_set(a.layer_name.as_ref())
}

fn title_content_geometry(a: &AttributeMapping) -> bool {
    is_set(a.title_attribute.as_ref())
        && is_set(a.content_attribute.as_ref())
        && is_set(a.geometry_attribute.as_ref())
}

fn geometry_and_title(a: &AttributeMapping) -> bool {
    is_set(a.geometry_attribute.as_ref()) && is_set(a.title.as_ref())
}

fn coordinates_and_title(a: &AttributeMapping) -> bool {
    is_set(a.easting.as_ref()) && is_set(a.northing.as_ref()) && is_set(a.title.as_ref())
}

const RULES: [Rule; 5] = [
    Rule {
        strategy: Strategy::FeatureById,
        applies: layer_and_id,
    },
    Rule {
        strategy: Strategy::LayerGeometry,
        applies: geometry_and_layer,
    },
    Rule {
        strategy: Strategy::TitledContent,
        applies: title_content_geometry,
    },
    Rule {
        strategy: Strategy::StaticTitleGeometry,
        applies: geometry_and_title,
    },
    Rule {
        strategy: Strategy::Coordinates,
        applies: coordinates_and_title,
    },
];

/// First rule that applies to `attributes`.
pub fn select_strategy(attributes: &AttributeMapping) -> Result<Strategy> {
    RULES
        .iter()
        .find(|rule| (rule.applies)(attributes))
        .map(|rule| rule.strategy)
        .ok_or_else(|| {
            error!(?attributes, "No resolution rule matches the configured attributes");
            SearchError::Configuration(
                "search options are missing: no attribute combination selects a resolution rule"
                    .into(),
            )
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum Content {
    Text(String),
    Attributes(Attributes),
    Empty,
}

/// How the selection goes on the map.
#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    /// Features drawn in the search layer, or shown in the info popup
    Features(Vec<Feature>),
    /// A feature shown as an overlay anchored at `position`
    Overlay { feature: Feature, position: [f64; 2] },
    /// A plain positional overlay
    Marker { position: [f64; 2] },
}

impl Presentation {
    /// Bounding box of everything presented.
    pub fn extent(&self) -> Option<[f64; 4]> {
        match self {
            Self::Features(features) => features
                .iter()
                .filter_map(|f| f.geometry.as_ref()?.extent())
                .reduce(|[a, b, c, d], [e, f, g, h]| [a.min(e), b.min(f), c.max(g), d.max(h)]),
            Self::Overlay { feature, .. } => feature.geometry.as_ref()?.extent(),
            Self::Marker { position: [x, y] } => Some([*x, *y, *x, *y]),
        }
    }
}

/// A text label placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartLabel {
    pub text: String,
    pub position: [f64; 2],
}

/// Everything needed to show a resolved selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSelection {
    pub title: String,
    pub content: Content,
    pub presentation: Presentation,
    pub report: Option<EstateReport>,
    pub labels: Vec<PartLabel>,
    pub mode: DisplayMode,
    /// The rule that produced this selection; `None` for map clicks
    pub strategy: Option<Strategy>,
}

impl ResolvedSelection {
    fn new(strategy: Strategy, title: String, content: Content, presentation: Presentation) -> Self {
        Self {
            title,
            content,
            presentation,
            report: None,
            labels: Vec::new(),
            mode: DisplayMode::GeometryOnly,
            strategy: Some(strategy),
        }
    }

    pub fn extent(&self) -> Option<[f64; 4]> {
        self.presentation.extent()
    }
}

/// Turns selected candidates and map clicks into [`ResolvedSelection`]s.
pub struct SelectionResolver {
    options: Arc<SearchOptions>,
    fetcher: Arc<dyn JsonFetcher>,
    host: Arc<dyn MapHost>,
    codec: Arc<dyn GeometryCodec>,
}

impl std::fmt::Debug for SelectionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionResolver")
            .field("attributes", &self.options.attributes)
            .finish_non_exhaustive()
    }
}

impl SelectionResolver {
    pub fn new(
        options: Arc<SearchOptions>,
        fetcher: Arc<dyn JsonFetcher>,
        host: Arc<dyn MapHost>,
        codec: Arc<dyn GeometryCodec>,
    ) -> Self {
        Self {
            options,
            fetcher,
            host,
            codec,
        }
    }

    pub fn strategy(&self) -> Result<Strategy> {
        select_strategy(&self.options.attributes)
    }

    #[instrument(name = "Resolve selection", skip_all, fields(candidate = candidate.display_name()), level = "debug")]
    pub async fn resolve(&self, candidate: &Candidate) -> Result<ResolvedSelection> {
        let strategy = self.strategy()?;
        debug!(?strategy, "Selected resolution rule");
        let mut selection = match strategy {
            Strategy::FeatureById => self.feature_by_id(candidate).await?,
            Strategy::LayerGeometry => self.layer_geometry(candidate)?,
            Strategy::TitledContent => self.titled_content(candidate).await?,
            Strategy::StaticTitleGeometry => self.static_title_geometry(candidate)?,
            Strategy::Coordinates => self.coordinates(candidate)?,
        };
        selection.mode = self.options.show_feature;
        Ok(selection)
    }

    fn attribute_name(value: Option<&String>, what: &str) -> Result<String> {
        value
            .cloned()
            .ok_or_else(|| SearchError::Configuration(format!("{what} is not configured")))
    }

    fn required(candidate: &Candidate, attribute: &str) -> Result<String> {
        candidate
            .attribute_text(attribute)
            .ok_or_else(|| SearchError::MissingAttribute(attribute.to_owned()))
    }

    fn parse_geometry(&self, candidate: &Candidate) -> Result<Feature> {
        let attribute =
            Self::attribute_name(self.options.attributes.geometry_attribute.as_ref(), "geometryAttribute")?;
        let wkt = Self::required(candidate, &attribute)?;
        Ok(Feature::new(self.codec.wkt_to_geometry(&wkt)?))
    }

    fn static_title(&self) -> Result<String> {
        Self::attribute_name(self.options.attributes.title.as_ref(), "title")
    }

    fn name_content(&self, candidate: &Candidate) -> Content {
        candidate
            .attribute_text(&self.options.attributes.search_attribute)
            .map_or_else(|| Content::Text(candidate.display_name().to_owned()), Content::Text)
    }

    async fn feature_by_id(&self, candidate: &Candidate) -> Result<ResolvedSelection> {
        let attributes = &self.options.attributes;
        let layer_attribute =
            Self::attribute_name(attributes.layer_name_attribute.as_ref(), "layerNameAttribute")?;
        let id_attribute = Self::attribute_name(attributes.id_attribute.as_ref(), "idAttribute")?;

        let layer_name = Self::required(candidate, &layer_attribute)?;
        let layer = self
            .host
            .layer(&layer_name)
            .ok_or(SearchError::UnknownLayer(layer_name))?;
        let id = Self::required(candidate, &id_attribute)?;

        let features = self.host.features_by_id(&layer, &id).await?;
        if let Some(first) = features.first() {
            let content = Content::Attributes(first.properties.clone());
            return Ok(ResolvedSelection::new(
                Strategy::FeatureById,
                layer.title,
                content,
                Presentation::Features(features),
            ));
        }

        let has_geometry = attributes
            .geometry_attribute
            .as_deref()
            .is_some_and(|a| candidate.attribute_text(a).is_some());
        if has_geometry {
            debug!(%id, layer = %layer.name, "No feature by id, falling back to candidate geometry");
            let feature = self.parse_geometry(candidate)?;
            let position = feature
                .geometry
                .as_ref()
                .and_then(Geometry::center)
                .ok_or_else(|| SearchError::MissingAttribute(GEOMETRY_KEY.to_owned()))?;
            return Ok(ResolvedSelection::new(
                Strategy::FeatureById,
                layer.title,
                self.name_content(candidate),
                Presentation::Overlay { feature, position },
            ));
        }

        Err(SearchError::NoData(format!(
            "no feature with id {id} in layer {}",
            layer.name
        )))
    }

    fn layer_geometry(&self, candidate: &Candidate) -> Result<ResolvedSelection> {
        let layer_name =
            Self::attribute_name(self.options.attributes.layer_name.as_ref(), "layerName")?;
        let layer = self
            .host
            .layer(&layer_name)
            .ok_or(SearchError::UnknownLayer(layer_name))?;

        let mut feature = self.parse_geometry(candidate)?;
        feature.properties = candidate.attributes().clone();
        feature.properties.remove(GEOMETRY_KEY);
        let content = Content::Attributes(feature.properties.clone());

        Ok(ResolvedSelection::new(
            Strategy::LayerGeometry,
            layer.title,
            content,
            Presentation::Features(vec![feature]),
        ))
    }

    async fn titled_content(&self, candidate: &Candidate) -> Result<ResolvedSelection> {
        let attributes = &self.options.attributes;
        let title = attributes
            .title_attribute
            .as_deref()
            .and_then(|a| candidate.attribute_text(a))
            .unwrap_or_else(|| candidate.display_name().to_owned());
        let content = attributes
            .content_attribute
            .as_deref()
            .and_then(|a| candidate.attribute_text(a))
            .map_or(Content::Empty, Content::Text);

        if candidate.source_kind() != SourceKind::Property {
            let feature = self.parse_geometry(candidate)?;
            return Ok(ResolvedSelection::new(
                Strategy::TitledContent,
                title,
                content,
                Presentation::Features(vec![feature]),
            ));
        }

        let object_id = match candidate.geometry_ref() {
            GeometryRef::Deferred { object_id } => object_id.clone(),
            GeometryRef::Inline(_) | GeometryRef::Missing => candidate
                .source_id()
                .map(str::to_owned)
                .ok_or_else(|| SearchError::MissingAttribute(ID_KEY.into()))?,
        };

        let url = self
            .options
            .area_by_id_template()?
            .render_with(&[("objectId", object_id.as_str())]);
        let features = self.fetch_features(&url).await?.unwrap_or_default();
        if features.is_empty() {
            return Err(SearchError::NoData(format!(
                "there is no data available for object {object_id}"
            )));
        }
        let features = merge_polygons(features);
        let report = features.first().and_then(|first| {
            let anchor = first.geometry.as_ref()?.center()?;
            build_report(first, &object_id, &self.options, anchor)
        });

        let mut selection = ResolvedSelection::new(
            Strategy::TitledContent,
            title,
            content,
            Presentation::Features(features),
        );
        selection.report = report;
        Ok(selection)
    }

    fn static_title_geometry(&self, candidate: &Candidate) -> Result<ResolvedSelection> {
        let feature = self.parse_geometry(candidate)?;
        Ok(ResolvedSelection::new(
            Strategy::StaticTitleGeometry,
            self.static_title()?,
            self.name_content(candidate),
            Presentation::Features(vec![feature]),
        ))
    }

    fn coordinates(&self, candidate: &Candidate) -> Result<ResolvedSelection> {
        let attributes = &self.options.attributes;
        let ordinate = |name: Option<&String>, what: &str| -> Result<f64> {
            let attribute = Self::attribute_name(name, what)?;
            let raw = Self::required(candidate, &attribute)?;
            raw.trim().parse().map_err(|_| {
                SearchError::Other(anyhow::anyhow!("'{raw}' in '{attribute}' is not a coordinate"))
            })
        };
        let position = [
            ordinate(attributes.easting.as_ref(), "easting")?,
            ordinate(attributes.northing.as_ref(), "northing")?,
        ];
        Ok(ResolvedSelection::new(
            Strategy::Coordinates,
            self.static_title()?,
            self.name_content(candidate),
            Presentation::Marker { position },
        ))
    }

    /// Features of a geometry lookup, `None` when the answer has no `features` member.
    #[instrument(name = "Area lookup", skip(self), level = "debug")]
    async fn fetch_features(&self, url: &str) -> Result<Option<Vec<Feature>>> {
        let body = self.fetcher.get_json(&Request::get(url)).await?;
        if body.get("features").is_none() {
            debug!("Area lookup answered without features");
            return Ok(None);
        }
        let collection: FeatureCollection = serde_json::from_value(body)?;
        Ok(Some(collection.features))
    }
}
