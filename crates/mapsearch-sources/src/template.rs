//! Per-source configuration and URL templates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    candidate::SourceKind,
    transport::{Credentials, Request},
};

/// A backend URL with `{name}` substitution points.
///
/// Recognised query placeholders are `{q}`, `{municipalities}`, `{codes}`, `{limit}`
/// and `{status}`; secondary lookups use their own (`{objectId}`, `{easting}`,
/// `{northing}`). Substituted values are percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, ctx: &QueryContext) -> String {
        let limit = ctx.limit.to_string();
        self.render_with(&[
            ("q", ctx.query.as_str()),
            ("municipalities", ctx.municipalities.as_str()),
            ("codes", ctx.codes.as_str()),
            ("limit", limit.as_str()),
            ("status", ctx.status.as_deref().unwrap_or_default()),
        ])
    }

    pub fn render_with(&self, values: &[(&str, &str)]) -> String {
        values
            .iter()
            .fold(self.0.clone(), |url, (name, value)| {
                url.replace(&format!("{{{name}}}"), &urlencoding::encode(value))
            })
    }
}

/// Everything an adapter needs to know about one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// The typed text
    pub query: String,
    /// Enabled municipality names, trimmed and comma-joined
    pub municipalities: String,
    /// Backend codes for the enabled municipalities, comma-joined
    pub codes: String,
    /// Configured result limit
    pub limit: usize,
    /// Optional address status filter
    pub status: Option<String>,
}

impl QueryContext {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            ..Self::default()
        }
    }
}

/// Dotted paths into a backend record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPaths {
    pub id: Option<String>,
    pub name: String,
    pub geometry: Option<String>,
    /// Fields the query is matched against; empty means the name field only
    #[serde(default)]
    pub search_in: Vec<String>,
}

impl FieldPaths {
    pub fn property_defaults() -> Self {
        Self {
            id: Some("properties.objid".into()),
            name: "properties.name".into(),
            geometry: None,
            search_in: Vec::new(),
        }
    }

    pub fn locality_defaults() -> Self {
        Self {
            id: Some("properties.id".into()),
            name: "properties.name".into(),
            geometry: Some("geometry.coordinates".into()),
            search_in: Vec::new(),
        }
    }

    pub fn searchable(&self) -> Vec<&str> {
        if self.search_in.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.search_in.iter().map(String::as_str).collect()
        }
    }
}

/// Resolve a dotted path such as `_source.properties.name` inside a JSON value.
/// Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Immutable configuration of one source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Name used in diagnostics and as the layer label of produced candidates
    pub name: String,
    pub url: UrlTemplate,
    pub enabled: bool,
    pub credentials: Option<Credentials>,
    pub fields: FieldPaths,
    /// Drop address street groups that do not contain the first query token
    pub filter_mismatched_streets: bool,
}

impl SourceConfig {
    pub fn new(kind: SourceKind, url: impl Into<String>) -> Self {
        let fields = match kind {
            SourceKind::Property => FieldPaths::property_defaults(),
            SourceKind::Locality | SourceKind::Address | SourceKind::Index => {
                FieldPaths::locality_defaults()
            }
        };
        Self {
            kind,
            name: kind.label().to_owned(),
            url: UrlTemplate::new(url),
            enabled: true,
            credentials: None,
            fields,
            filter_mismatched_streets: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_fields(mut self, fields: FieldPaths) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub const fn filter_mismatched_streets(mut self, enabled: bool) -> Self {
        self.filter_mismatched_streets = enabled;
        self
    }

    /// The request for one query, credentials attached.
    pub fn request(&self, ctx: &QueryContext) -> Request {
        Request {
            url: self.url.render(ctx),
            credentials: self.credentials.clone(),
        }
    }
}
