//! Canned backend responses and an in-memory [`JsonFetcher`] for tests.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    Result, SourceError,
    transport::{JsonFetcher, Request},
};

#[derive(Debug, Clone)]
enum Reply {
    Json(Value),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Route {
    fragment: String,
    reply: Reply,
    delay: Option<Duration>,
}

/// Answers requests whose URL contains a registered fragment. Routes are tried in
/// registration order; unmatched requests fail as transport errors.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    routes: Vec<Route>,
    calls: Mutex<Vec<Request>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(mut self, fragment: impl Into<String>, body: Value) -> Self {
        self.routes.push(Route {
            fragment: fragment.into(),
            reply: Reply::Json(body),
            delay: None,
        });
        self
    }

    pub fn with_delayed_json(
        mut self,
        fragment: impl Into<String>,
        body: Value,
        delay: Duration,
    ) -> Self {
        self.routes.push(Route {
            fragment: fragment.into(),
            reply: Reply::Json(body),
            delay: Some(delay),
        });
        self
    }

    pub fn with_failure(mut self, fragment: impl Into<String>, message: impl Into<String>) -> Self {
        self.routes.push(Route {
            fragment: fragment.into(),
            reply: Reply::Fail(message.into()),
            delay: None,
        });
        self
    }

    /// Every request seen so far, in arrival order.
    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, fragment: &str) -> usize {
        self.calls()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl JsonFetcher for StaticFetcher {
    async fn get_json(&self, request: &Request) -> Result<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let Some(route) = self
            .routes
            .iter()
            .find(|route| request.url.contains(&route.fragment))
        else {
            return Err(SourceError::Transport(format!("no route for {}", request.url)));
        };
        debug!(url = %request.url, fragment = %route.fragment, "Static route matched");
        if let Some(delay) = route.delay {
            tokio::time::sleep(delay).await;
        }
        match &route.reply {
            Reply::Json(body) => Ok(body.clone()),
            Reply::Fail(message) => Err(SourceError::Transport(message.clone())),
        }
    }
}

/// Property search response: a list of features with `name`/`objid` properties.
pub fn property_features(entries: &[(&str, &str)]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|(name, objid)| {
                json!({
                    "type": "Feature",
                    "geometry": null,
                    "properties": { "name": name, "objid": objid }
                })
            })
            .collect(),
    )
}

/// Address search response: positional `[id, name, x, y]` tuples.
pub fn address_rows(entries: &[(&str, f64, f64)]) -> Value {
    Value::Array(
        entries
            .iter()
            .enumerate()
            .map(|(i, (name, x, y))| json!([i + 1, name, x, y]))
            .collect(),
    )
}

/// Locality search response: point features, coordinates listed northing first.
pub fn locality_features(entries: &[(&str, &str, f64, f64)]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|(id, name, northing, easting)| {
                json!({
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [northing, easting] },
                    "properties": { "id": id, "name": name }
                })
            })
            .collect(),
    )
}

/// Search-index response: `hits.hits` envelope with `_source.{id,title,geom}`.
pub fn index_hits(entries: &[(&str, &str, f64, f64)]) -> Value {
    let hits: Vec<Value> = entries
        .iter()
        .map(|(id, title, x, y)| {
            json!({
                "_id": id,
                "_source": {
                    "id": id,
                    "title": title,
                    "geom": { "type": "Point", "coordinates": [x, y] }
                }
            })
        })
        .collect();
    json!({ "hits": { "total": hits.len(), "hits": hits } })
}

/// A unit square polygon feature at `offset`.
pub fn square_feature(name: &str, offset: f64) -> Value {
    json!({
        "type": "Feature",
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [offset, offset],
                [offset + 1.0, offset],
                [offset + 1.0, offset + 1.0],
                [offset, offset + 1.0],
                [offset, offset]
            ]]
        },
        "properties": { "name": name }
    })
}

pub fn point_feature(name: &str, x: f64, y: f64) -> Value {
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [x, y] },
        "properties": { "name": name }
    })
}

pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({ "type": "FeatureCollection", "features": features })
}
