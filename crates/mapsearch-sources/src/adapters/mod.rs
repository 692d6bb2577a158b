//! Source adapters: one per backend kind, each normalizing its backend's response
//! shape into [`Candidate`]s.
//!
//! [`SourceAdapter::fetch_candidates`] is the fallible core of each adapter;
//! [`SourceAdapter::fetch`] wraps it so that a transport or decoding failure becomes
//! an empty [`SourceResponse`] with the error kept as a diagnostic.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    Result, SourceError,
    candidate::{Candidate, SourceKind},
    geometry::GeometryCodec,
    template::{QueryContext, SourceConfig},
    transport::JsonFetcher,
};

mod address;
mod index;
mod locality;
mod property;

pub use address::{AddressAdapter, street_name};
pub use index::IndexAdapter;
pub use locality::LocalityAdapter;
pub use property::PropertyAdapter;

/// Outcome of one adapter call. Always a success from the caller's point of view.
#[derive(Debug)]
pub struct SourceResponse {
    pub source: String,
    pub kind: SourceKind,
    pub candidates: Vec<Candidate>,
    /// Why the adapter produced nothing, if it failed
    pub diagnostic: Option<SourceError>,
}

impl SourceResponse {
    pub const fn is_failure(&self) -> bool {
        self.diagnostic.is_some()
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn config(&self) -> &SourceConfig;

    fn name(&self) -> &str {
        &self.config().name
    }

    fn kind(&self) -> SourceKind {
        self.config().kind
    }

    async fn fetch_candidates(
        &self,
        ctx: &QueryContext,
        fetcher: &dyn JsonFetcher,
    ) -> Result<Vec<Candidate>>;

    async fn fetch(&self, ctx: &QueryContext, fetcher: &dyn JsonFetcher) -> SourceResponse {
        match self.fetch_candidates(ctx, fetcher).await {
            Ok(candidates) => {
                debug!(source = self.name(), count = candidates.len(), "Source answered");
                SourceResponse {
                    source: self.name().to_owned(),
                    kind: self.kind(),
                    candidates,
                    diagnostic: None,
                }
            }
            Err(e) => {
                warn!(source = self.name(), error = %e, "Could not fetch from source");
                SourceResponse {
                    source: self.name().to_owned(),
                    kind: self.kind(),
                    candidates: Vec::new(),
                    diagnostic: Some(e),
                }
            }
        }
    }
}

/// Build the adapter matching `config.kind`.
pub fn build_adapter(
    config: SourceConfig,
    codec: Arc<dyn GeometryCodec>,
) -> Box<dyn SourceAdapter> {
    match config.kind {
        SourceKind::Property => Box::new(PropertyAdapter::new(config)),
        SourceKind::Address => Box::new(AddressAdapter::new(config)),
        SourceKind::Locality => Box::new(LocalityAdapter::new(config)),
        SourceKind::Index => Box::new(IndexAdapter::new(config, codec)),
    }
}

/// The list a backend answered with. Backends sometimes answer with an empty object
/// instead of an empty list; anything that is not a list normalizes to no items.
fn as_list<'a>(body: &'a Value, source: &str) -> &'a [Value] {
    if let Value::Array(items) = body {
        items
    } else {
        debug!(source, "Backend answered with a non-list value, treating as empty");
        &[]
    }
}

fn malformed(config: &SourceConfig, reason: impl Into<String>) -> SourceError {
    SourceError::Malformed {
        source_name: config.name.clone(),
        reason: reason.into(),
    }
}
