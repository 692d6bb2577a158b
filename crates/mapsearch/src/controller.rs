//! Debounced query controller.
//!
//! Keystrokes restart a single debounce timer; when it fires the aggregate query runs
//! and its answer replaces the visible suggestion list. Every issued query takes the
//! next sequence number and an answer is rendered only while its number is still the
//! latest, so a slow answer to an old query never overwrites a newer list. Superseded
//! requests are not aborted, their answers are ignored on arrival.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use mapsearch_sources::Candidate;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, instrument, trace, warn};

use crate::{
    aggregate::Aggregator,
    config::SearchOptions,
    events::{EventBus, SearchEvent},
    store::{CandidateId, Suggestion, SuggestionStore},
};

/// The key that produced an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKey {
    Character(char),
    Backspace,
    Delete,
    Tab,
    Escape,
    Left,
    Right,
    Up,
    Down,
    Enter,
    Other,
}

impl InputKey {
    /// Keys that move within the list instead of editing the query.
    pub const fn is_navigation(self) -> bool {
        matches!(
            self,
            Self::Tab | Self::Escape | Self::Left | Self::Right | Self::Up | Self::Down | Self::Enter
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionEntry {
    Suggestion(Suggestion),
    /// The query succeeded with nothing to show
    NoResults { message: String },
    /// The query failed as a whole
    Error { message: String },
}

/// A suggestion list ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedList {
    pub sequence: u64,
    pub query: String,
    pub entries: Vec<SuggestionEntry>,
}

impl RenderedList {
    /// The selectable entries, sentinels excluded.
    pub fn suggestions(&self) -> impl Iterator<Item = &Suggestion> {
        self.entries.iter().filter_map(|entry| match entry {
            SuggestionEntry::Suggestion(s) => Some(s),
            SuggestionEntry::NoResults { .. } | SuggestionEntry::Error { .. } => None,
        })
    }
}

struct Inner {
    aggregator: Aggregator,
    options: Arc<SearchOptions>,
    events: EventBus,
    timer_generation: AtomicU64,
    latest_sequence: AtomicU64,
    store: watch::Sender<Arc<SuggestionStore>>,
}

#[derive(Clone)]
pub struct QueryController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QueryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryController")
            .field("aggregator", &self.inner.aggregator)
            .field("latest_sequence", &self.latest_sequence())
            .finish_non_exhaustive()
    }
}

impl QueryController {
    pub fn new(aggregator: Aggregator, options: Arc<SearchOptions>, events: EventBus) -> Self {
        let (store, _) = watch::channel(Arc::new(SuggestionStore::empty()));
        Self {
            inner: Arc::new(Inner {
                aggregator,
                options,
                events,
                timer_generation: AtomicU64::new(0),
                latest_sequence: AtomicU64::new(0),
                store,
            }),
        }
    }

    /// Handle one input event.
    ///
    /// Qualifying input (long enough, not a navigation key) restarts the debounce
    /// timer and returns the handle of the scheduled query. Must be called from within
    /// a Tokio runtime; without one nothing is scheduled.
    pub fn on_input(&self, text: &str, key: InputKey) -> Option<JoinHandle<()>> {
        if key.is_navigation() {
            trace!(?key, "Navigation key, not querying");
            return None;
        }
        if text.chars().count() < self.inner.options.min_length {
            trace!(len = text.chars().count(), "Input shorter than minimum length");
            return None;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, input ignored");
            return None;
        };

        let generation = self.inner.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.inner.options.debounce();
        let controller = self.clone();
        let text = text.to_owned();

        Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if controller.inner.timer_generation.load(Ordering::SeqCst) != generation {
                trace!(generation, "Debounce timer superseded");
                return;
            }
            controller.run_query(&text).await;
        }))
    }

    /// Run one query right away and render its answer unless a newer query was
    /// issued in the meantime. Returns the rendered list, or `None` when discarded.
    #[instrument(name = "Run query", skip(self), level = "debug")]
    pub async fn run_query(&self, text: &str) -> Option<RenderedList> {
        let inner = &self.inner;
        let sequence = inner.latest_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let result = inner.aggregator.query(text).await;

        let (store, entries, failure) = match result {
            Ok(candidates) => {
                let store = SuggestionStore::from_candidates(
                    candidates,
                    inner.options.limit,
                    inner.options.attributes.group_attribute(),
                );
                let entries = if store.is_empty() {
                    vec![SuggestionEntry::NoResults {
                        message: inner.options.no_results_text.clone(),
                    }]
                } else {
                    store.iter().cloned().map(SuggestionEntry::Suggestion).collect()
                };
                (store, entries, None)
            }
            Err(e) => {
                let message = e.to_string();
                (
                    SuggestionStore::empty(),
                    vec![SuggestionEntry::Error {
                        message: message.clone(),
                    }],
                    Some(message),
                )
            }
        };

        let rendered = RenderedList {
            sequence,
            query: text.to_owned(),
            entries,
        };

        // Check and swap under the store lock so a stale answer cannot slip in
        // between a newer answer's swap and its render event.
        let applied = inner.store.send_if_modified(|current| {
            if inner.latest_sequence.load(Ordering::SeqCst) != sequence {
                return false;
            }
            *current = Arc::new(store);
            inner.events.emit(SearchEvent::Render(rendered.clone()));
            if let Some(message) = &failure {
                inner.events.emit(SearchEvent::QueryFailed {
                    sequence,
                    message: message.clone(),
                });
            }
            true
        });

        if applied {
            debug!(sequence, entries = rendered.entries.len(), "Rendered suggestions");
            Some(rendered)
        } else {
            debug!(sequence, "Discarding stale answer");
            None
        }
    }

    /// Cancel any pending timer without touching the visible list.
    pub fn cancel_pending(&self) {
        self.inner.timer_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop the visible suggestions, cancel pending work and render an empty list.
    pub fn clear(&self) {
        let inner = &self.inner;
        self.cancel_pending();
        let sequence = inner.latest_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        inner.store.send_modify(|current| {
            *current = Arc::new(SuggestionStore::empty());
            inner.events.emit(SearchEvent::Render(RenderedList {
                sequence,
                query: String::new(),
                entries: Vec::new(),
            }));
        });
        debug!(sequence, "Cleared suggestions");
    }

    /// The current suggestion store.
    pub fn store(&self) -> Arc<SuggestionStore> {
        Arc::clone(&self.inner.store.borrow())
    }

    pub fn watch_store(&self) -> watch::Receiver<Arc<SuggestionStore>> {
        self.inner.store.subscribe()
    }

    pub fn candidate(&self, id: CandidateId) -> Option<Arc<Candidate>> {
        self.inner.store.borrow().candidate(id)
    }

    pub fn latest_sequence(&self) -> u64 {
        self.inner.latest_sequence.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mapsearch_sources::{
        GeometryCodec, WktCodec,
        test_data::{StaticFetcher, locality_features},
    };

    use super::*;

    fn controller(fetcher: StaticFetcher) -> (QueryController, Arc<StaticFetcher>, EventBus) {
        let options = Arc::new(
            SearchOptions::builder()
                .locality_url("https://ort.example/?q={q}")
                .no_results_text("Ingen träff")
                .build()
                .unwrap(),
        );
        let fetcher = Arc::new(fetcher);
        let codec: Arc<dyn GeometryCodec> = Arc::new(WktCodec);
        let aggregator = Aggregator::new(Arc::clone(&options), fetcher.clone(), &codec).unwrap();
        let events = EventBus::new();
        (
            QueryController::new(aggregator, options, events.clone()),
            fetcher,
            events,
        )
    }

    #[test]
    fn test_navigation_keys() {
        for key in [
            InputKey::Tab,
            InputKey::Escape,
            InputKey::Left,
            InputKey::Right,
            InputKey::Up,
            InputKey::Down,
            InputKey::Enter,
        ] {
            assert!(key.is_navigation());
        }
        assert!(!InputKey::Character('a').is_navigation());
        assert!(!InputKey::Backspace.is_navigation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_input_and_navigation_do_not_query() {
        let (controller, fetcher, _) = controller(StaticFetcher::new());
        assert!(controller.on_input("sto", InputKey::Character('o')).is_none());
        assert!(controller.on_input("stor", InputKey::Down).is_none());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_fires_once_for_the_last_input() {
        let (controller, fetcher, _) = controller(StaticFetcher::new().with_json(
            "ort.example",
            locality_features(&[("1", "Storvik", 1.0, 2.0)]),
        ));

        let first = controller.on_input("stor", InputKey::Character('r')).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = controller.on_input("storv", InputKey::Character('v')).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let last = controller.on_input("storvi", InputKey::Character('i')).unwrap();

        for handle in [first, second, last] {
            handle.await.unwrap();
        }
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(fetcher.calls()[0].url, "https://ort.example/?q=storvi");
        assert_eq!(controller.store().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_answer_renders_no_results_sentinel() {
        let (controller, _, events) =
            controller(StaticFetcher::new().with_json("ort.example", locality_features(&[])));
        let mut receiver = events.subscribe();

        let rendered = controller.run_query("stor").await.unwrap();
        assert_eq!(
            rendered.entries,
            vec![SuggestionEntry::NoResults {
                message: "Ingen träff".into()
            }]
        );
        assert!(matches!(receiver.recv().await.unwrap(), SearchEvent::Render(_)));
    }

    #[tokio::test]
    async fn test_failure_renders_error_sentinel_and_empty_store() {
        let (controller, _, events) =
            controller(StaticFetcher::new().with_failure("ort.example", "timeout"));
        let mut receiver = events.subscribe();

        let rendered = controller.run_query("stor").await.unwrap();
        assert!(matches!(rendered.entries[..], [SuggestionEntry::Error { .. }]));
        assert!(controller.store().is_empty());

        assert!(matches!(receiver.recv().await.unwrap(), SearchEvent::Render(_)));
        match receiver.recv().await.unwrap() {
            SearchEvent::QueryFailed { sequence, message } => {
                assert_eq!(sequence, rendered.sequence);
                assert!(message.contains("timeout"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_answer_is_discarded() {
        let fetcher = StaticFetcher::new()
            .with_delayed_json(
                "q=stor&",
                locality_features(&[("1", "Storvik", 1.0, 2.0)]),
                Duration::from_secs(2),
            )
            .with_json(
                "ort.example",
                locality_features(&[("2", "Storgatan", 1.0, 2.0)]),
            );
        let options = Arc::new(
            SearchOptions::builder()
                .locality_url("https://ort.example/?q={q}&src=ort")
                .build()
                .unwrap(),
        );
        let fetcher = Arc::new(fetcher);
        let codec: Arc<dyn GeometryCodec> = Arc::new(WktCodec);
        let aggregator = Aggregator::new(Arc::clone(&options), fetcher, &codec).unwrap();
        let controller = QueryController::new(aggregator, options, EventBus::new());

        let slow = tokio::spawn({
            let controller = controller.clone();
            async move { controller.run_query("stor").await }
        });
        // Let the slow query take its sequence number first
        tokio::time::sleep(Duration::from_millis(10)).await;
        let fast = controller.run_query("storg").await;

        assert!(fast.is_some());
        assert!(slow.await.unwrap().is_none());
        let store = controller.store();
        let names: Vec<_> = store.iter().map(|s| s.candidate.display_name().to_owned()).collect();
        assert_eq!(names, vec!["Storgatan"]);
    }

    #[tokio::test]
    async fn test_clear_empties_store() {
        let (controller, _, _) = controller(StaticFetcher::new().with_json(
            "ort.example",
            locality_features(&[("1", "Storvik", 1.0, 2.0)]),
        ));
        controller.run_query("stor").await.unwrap();
        let id = controller.store().iter().next().unwrap().id;
        assert!(controller.candidate(id).is_some());

        let before = controller.latest_sequence();
        controller.clear();
        assert!(controller.store().is_empty());
        assert!(controller.candidate(id).is_none());
        assert!(controller.latest_sequence() > before);
    }
}
