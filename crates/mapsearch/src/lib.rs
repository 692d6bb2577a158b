//! Mapsearch - suggestion aggregation for map-viewer search
//!
//! Mapsearch sits between a search box and a handful of geodata backends: cadastral
//! properties, street addresses, localities and a generic search index. It queries
//! them all at once, normalizes their differently shaped answers into one suggestion
//! list, keeps that list balanced across result types, and resolves a chosen
//! suggestion to a geometry and content the host map can display.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mapsearch::{
//!     Feature, HttpFetcher, InputKey, LayerInfo, MapHost, SearchEvent, SearchOptions,
//!     SearchWidget,
//! };
//!
//! struct Viewer;
//!
//! #[async_trait::async_trait]
//! impl MapHost for Viewer {
//!     fn layer(&self, name: &str) -> Option<LayerInfo> {
//!         Some(LayerInfo { name: name.into(), title: name.into() })
//!     }
//!
//!     async fn features_by_id(&self, _: &LayerInfo, _: &str) -> mapsearch::Result<Vec<Feature>> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # async fn run() -> mapsearch::Result<()> {
//! let options = SearchOptions::builder()
//!     .locality_url("https://ort.example/search?q={q}&kommunkod={codes}")
//!     .address_url("https://adress.example/search?q={q}&kommunkod={codes}")
//!     .municipalities(["Hallstahammar"])
//!     .municipality_code("Hallstahammar", "1961")
//!     .geometry_attribute("geometry")
//!     .title("Sökresultat")
//!     .build()?;
//!
//! let widget = SearchWidget::new(options, Arc::new(HttpFetcher::new()), Arc::new(Viewer))?;
//! let mut events = widget.subscribe();
//! widget.start();
//! widget.on_input("storg", InputKey::Character('g'));
//!
//! if let Ok(SearchEvent::Render(list)) = events.recv().await {
//!     if let Some(first) = list.suggestions().next() {
//!         let selection = widget.select(first.id).await?;
//!         println!("{}: {:?}", selection.title, selection.extent());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Behaviour
//!
//! - **Partial failure**: a failing backend contributes nothing; only when every
//!   backend fails does the query fail
//! - **Balanced lists**: with a layer attribute configured, results are grouped by
//!   type and interleaved round robin up to the limit
//! - **Stale answers**: every query carries a sequence number and only the latest
//!   one is ever rendered
//! - **Resolution rules**: the configured attributes select one of five ordered
//!   resolution rules
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod aggregate;
pub mod config;
mod controller;
pub mod error;
mod events;
pub mod resolve;
mod store;
mod widget;

pub use aggregate::Aggregator;
pub use config::{
    AttributeMapping, DedupScope, DisplayMode, IndexSearchOptions, SearchOptions,
    SearchOptionsBuilder,
};
pub use controller::{InputKey, QueryController, RenderedList, SuggestionEntry};
pub use error::{Result, SearchError};
pub use events::{EventBus, SearchEvent};
pub use mapsearch_sources as sources;
#[cfg(feature = "http")]
pub use mapsearch_sources::HttpFetcher;
pub use mapsearch_sources::{
    Candidate, Feature, FeatureCollection, Geometry, GeometryCodec, JsonFetcher, SourceKind,
    WktCodec, highlight_ranges,
};
pub use resolve::{
    Content, EstateReport, LayerInfo, MapHost, PartLabel, Presentation, ReportBody,
    ResolvedSelection, SelectionResolver, Strategy,
};
pub use store::{CandidateId, Suggestion, SuggestionStore};
pub use widget::SearchWidget;

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the mapsearch library.
///
/// Installs a formatting subscriber filtered by `RUST_LOG` when set, or by `level`
/// otherwise. HTTP client internals are kept at `warn`. Calling it again is a no-op.
///
/// ```rust
/// use mapsearch::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// init_logging(Level::DEBUG)?;
/// # Ok::<(), mapsearch::SearchError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static ()> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("hyper_util=warn".parse()?)
            .add_directive("reqwest=warn".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
            .map_err(|e| SearchError::Other(anyhow::anyhow!(e)))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_env() {
        let _ = init_logging(tracing::Level::WARN);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        setup_test_env();
        assert!(init_logging(tracing::Level::DEBUG).is_ok());
    }

    #[test]
    fn test_reexported_highlighting() {
        setup_test_env();
        assert_eq!(highlight_ranges("Stora Sundby", "sund"), vec![6..10]);
    }
}
