//! Backend plumbing for the mapsearch suggestion engine.
//!
//! Every geodata backend answers in its own shape: lists of GeoJSON features for
//! properties and localities, positional tuples for addresses, and a `hits.hits`
//! envelope for a search index. The adapters in this crate turn each of those into
//! the common [`Candidate`] record, and never fail the caller: a broken backend
//! becomes an empty [`SourceResponse`] carrying a diagnostic.
//!
//! ```rust
//! use mapsearch_sources::{Candidate, SourceKind};
//!
//! let candidate = Candidate::builder(SourceKind::Locality, "Storvik")
//!     .source_id("1234")
//!     .wkt("POINT(16.5 60.6)")
//!     .build();
//! assert_eq!(candidate.display_name(), "Storvik");
//! ```

pub mod adapters;
mod candidate;
pub mod geometry;
pub mod interleave;
pub mod matching;
pub mod template;
#[cfg(any(test, feature = "test-util"))]
pub mod test_data;
pub mod transport;

pub use adapters::{
    AddressAdapter, IndexAdapter, LocalityAdapter, PropertyAdapter, SourceAdapter,
    SourceResponse, build_adapter,
};
pub use candidate::{
    Attributes, Candidate, CandidateBuilder, GEOMETRY_KEY, GeometryRef, ID_KEY, LAYER_KEY,
    NAME_KEY, SourceKind,
};
pub use geometry::{Feature, FeatureCollection, Geometry, GeometryCodec, WktCodec};
pub use matching::highlight_ranges;
pub use template::{FieldPaths, QueryContext, SourceConfig, UrlTemplate};
#[cfg(feature = "http")]
pub use transport::HttpFetcher;
pub use transport::{Credentials, JsonFetcher, Request, strip_credentials};

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum SourceError {
        #[cfg(feature = "http")]
        #[error("HTTP error: {0}")]
        Http(#[from] reqwest::Error),
        #[error("Transport error: {0}")]
        Transport(String),
        #[error("Malformed response from {source_name}: {reason}")]
        Malformed { source_name: String, reason: String },
        #[error("Serialization error: {0}")]
        Serde(#[from] serde_json::Error),
        #[error("Invalid URL: {0}")]
        InvalidUrl(#[from] url::ParseError),
        #[error("Geometry error: {0}")]
        Geometry(String),
    }

    pub type Result<T> = std::result::Result<T, SourceError>;
}

pub use error::{Result, SourceError};
