use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use mapsearch_sources::{GeometryCodec, JsonFetcher, WktCodec};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    aggregate::Aggregator,
    config::SearchOptions,
    controller::{InputKey, QueryController, RenderedList},
    error::{Result, SearchError},
    events::{EventBus, SearchEvent},
    resolve::{MapHost, ResolvedSelection, SelectionResolver},
    store::{CandidateId, SuggestionStore},
};

/// The search engine as the embedding application drives it.
///
/// Construct it once from validated options, call [`SearchWidget::start`], feed it
/// input and map clicks, and render whatever arrives on [`SearchWidget::subscribe`].
pub struct SearchWidget {
    options: Arc<SearchOptions>,
    controller: QueryController,
    resolver: SelectionResolver,
    events: EventBus,
    running: AtomicBool,
    estate_lookup_active: AtomicBool,
}

impl std::fmt::Debug for SearchWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchWidget")
            .field("controller", &self.controller)
            .field("resolver", &self.resolver)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl SearchWidget {
    pub fn new(
        options: SearchOptions,
        fetcher: Arc<dyn JsonFetcher>,
        host: Arc<dyn MapHost>,
    ) -> Result<Self> {
        Self::with_codec(options, fetcher, host, Arc::new(WktCodec))
    }

    /// Like [`SearchWidget::new`], with the host's own geometry conversion.
    pub fn with_codec(
        options: SearchOptions,
        fetcher: Arc<dyn JsonFetcher>,
        host: Arc<dyn MapHost>,
        codec: Arc<dyn GeometryCodec>,
    ) -> Result<Self> {
        options.validate()?;
        let options = Arc::new(options);
        let events = EventBus::new();

        let aggregator = Aggregator::new(Arc::clone(&options), Arc::clone(&fetcher), &codec)?;
        debug!(sources = aggregator.source_count(), "Search sources configured");
        let controller = QueryController::new(aggregator, Arc::clone(&options), events.clone());
        let resolver = SelectionResolver::new(Arc::clone(&options), fetcher, host, codec);

        Ok(Self {
            estate_lookup_active: AtomicBool::new(options.estate_lookup_active),
            options,
            controller,
            resolver,
            events,
            running: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Search started");
        }
    }

    /// Stop reacting to input. Pending timers are cancelled; answers already in
    /// flight are still rendered.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.controller.cancel_pending();
            info!("Search stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
        self.events.subscribe()
    }

    /// Feed one input event to the debounced controller.
    pub fn on_input(&self, text: &str, key: InputKey) -> Option<JoinHandle<()>> {
        if !self.is_running() {
            debug!("Input ignored, search not started");
            return None;
        }
        self.controller.on_input(text, key)
    }

    /// Query right away, bypassing the debounce timer.
    pub async fn query_now(&self, text: &str) -> Option<RenderedList> {
        self.controller.run_query(text).await
    }

    pub fn suggestions(&self) -> Arc<SuggestionStore> {
        self.controller.store()
    }

    /// Resolve a visible suggestion and announce the result.
    ///
    /// A lookup that finds nothing is announced as a [`SearchEvent::Notice`]; a
    /// configuration that cannot resolve anything is logged as an error.
    #[instrument(name = "Select suggestion", skip(self), level = "debug")]
    pub async fn select(&self, id: CandidateId) -> Result<Arc<ResolvedSelection>> {
        let candidate = self
            .controller
            .candidate(id)
            .ok_or(SearchError::UnknownCandidate(id))?;

        match self.resolver.resolve(&candidate).await {
            Ok(selection) => {
                let selection = Arc::new(selection);
                self.events
                    .emit(SearchEvent::SelectionResolved(Arc::clone(&selection)));
                Ok(selection)
            }
            Err(e) => {
                self.report_failure(&e);
                Err(e)
            }
        }
    }

    /// Resolve the estate under a map click, when estate lookup is on.
    #[instrument(name = "Map click", skip(self), level = "debug")]
    pub async fn on_map_click(&self, coordinate: [f64; 2]) -> Result<Option<Arc<ResolvedSelection>>> {
        if !self.options.estate_lookup || !self.estate_lookup_active() {
            return Ok(None);
        }
        match self.resolver.resolve_click(coordinate).await {
            Ok(Some(selection)) => {
                let selection = Arc::new(selection);
                self.events
                    .emit(SearchEvent::SelectionResolved(Arc::clone(&selection)));
                Ok(Some(selection))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.report_failure(&e);
                Err(e)
            }
        }
    }

    pub fn estate_lookup_active(&self) -> bool {
        self.estate_lookup_active.load(Ordering::SeqCst)
    }

    /// Turn map-click estate lookup on or off. Turning it off clears the search.
    pub fn set_estate_lookup_active(&self, active: bool) {
        self.estate_lookup_active.store(active, Ordering::SeqCst);
        debug!(active, "Estate lookup toggled");
        if !active {
            self.clear();
        }
    }

    pub fn clear(&self) {
        self.controller.clear();
    }

    fn report_failure(&self, e: &SearchError) {
        match e {
            notice if notice.is_notice() => {
                self.events.emit(SearchEvent::Notice(notice.to_string()));
            }
            SearchError::Configuration(message) => {
                error!(%message, "Selection cannot be resolved with the current options");
            }
            other => warn!(error = %other, "Selection failed"),
        }
    }
}
