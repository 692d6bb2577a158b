use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw backend fields preserved on a candidate, keyed by attribute name.
pub type Attributes = Map<String, Value>;

/// Attribute holding the display name of every normalized candidate.
pub const NAME_KEY: &str = "name";
/// Attribute holding the backend identity, when the backend supplies one.
pub const ID_KEY: &str = "id";
/// Attribute holding the layer/type label used for grouping.
pub const LAYER_KEY: &str = "layer";
/// Attribute holding inline geometry as well-known text.
pub const GEOMETRY_KEY: &str = "geometry";

/// The backend family a candidate was normalized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// Cadastral property search by designation
    Property,
    /// Street address search
    Address,
    /// Locality (place name) search
    Locality,
    /// Generic text search index
    Index,
}

impl SourceKind {
    /// Default layer label written to [`LAYER_KEY`] for candidates of this kind.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Property => "Property",
            Self::Address => "Address",
            Self::Locality => "Locality",
            Self::Index => "Index",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the geometry of a candidate comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GeometryRef {
    /// Geometry delivered with the hit, as well-known text
    Inline(String),
    /// Geometry that must be fetched by object identity after selection
    Deferred { object_id: String },
    /// The backend supplied nothing usable
    Missing,
}

/// A normalized search hit.
///
/// Candidates are built once by an adapter and never mutated afterwards; the engine
/// shares them behind `Arc`s between the suggestion store and the resolver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    display_name: String,
    source_id: Option<String>,
    source_kind: SourceKind,
    geometry_ref: GeometryRef,
    attributes: Attributes,
}

impl Candidate {
    pub fn builder(kind: SourceKind, display_name: impl Into<String>) -> CandidateBuilder {
        CandidateBuilder::new(kind, display_name)
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub const fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub const fn geometry_ref(&self) -> &GeometryRef {
        &self.geometry_ref
    }

    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Attribute value rendered as text. Numbers and booleans are stringified,
    /// nulls, arrays and objects are treated as absent.
    pub fn attribute_text(&self, key: &str) -> Option<String> {
        self.attributes.get(key).and_then(value_text)
    }

    /// The layer/type label this candidate groups under.
    pub fn layer(&self) -> Option<String> {
        self.attribute_text(LAYER_KEY)
    }
}

/// Render a scalar JSON value as text.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[derive(Debug, Clone)]
pub struct CandidateBuilder {
    display_name: String,
    source_id: Option<String>,
    source_kind: SourceKind,
    geometry_ref: GeometryRef,
    layer: Option<String>,
    attributes: Attributes,
}

impl CandidateBuilder {
    fn new(kind: SourceKind, display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            source_id: None,
            source_kind: kind,
            geometry_ref: GeometryRef::Missing,
            layer: None,
            attributes: Attributes::new(),
        }
    }

    pub fn source_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    pub fn maybe_source_id(mut self, id: Option<String>) -> Self {
        self.source_id = id;
        self
    }

    pub fn wkt(mut self, wkt: impl Into<String>) -> Self {
        self.geometry_ref = GeometryRef::Inline(wkt.into());
        self
    }

    pub fn deferred(mut self, object_id: impl Into<String>) -> Self {
        self.geometry_ref = GeometryRef::Deferred {
            object_id: object_id.into(),
        };
        self
    }

    /// Override the layer label, which otherwise defaults to the kind's label.
    pub fn layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Merge raw backend fields. Normalized keys written by [`Self::build`] win.
    pub fn attributes(mut self, raw: Attributes) -> Self {
        self.attributes.extend(raw);
        self
    }

    pub fn build(self) -> Candidate {
        let Self {
            display_name,
            source_id,
            source_kind,
            geometry_ref,
            layer,
            mut attributes,
        } = self;

        attributes.insert(NAME_KEY.to_owned(), Value::from(display_name.clone()));
        if let Some(id) = &source_id {
            attributes.insert(ID_KEY.to_owned(), Value::from(id.clone()));
        }
        attributes.insert(
            LAYER_KEY.to_owned(),
            Value::from(layer.unwrap_or_else(|| source_kind.label().to_owned())),
        );
        if let GeometryRef::Inline(wkt) = &geometry_ref {
            attributes.insert(GEOMETRY_KEY.to_owned(), Value::from(wkt.clone()));
        }

        Candidate {
            display_name,
            source_id,
            source_kind,
            geometry_ref,
            attributes,
        }
    }
}
