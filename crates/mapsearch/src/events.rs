//! Typed outbound events.
//!
//! The embedding application subscribes once and renders suggestion lists, selected
//! geometries and notices from the payloads; nothing in the engine calls back into
//! the host for rendering.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use crate::{controller::RenderedList, resolve::ResolvedSelection};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum SearchEvent {
    /// The visible suggestion list changed
    Render(RenderedList),
    /// A selection (or map click) resolved to something displayable
    SelectionResolved(Arc<ResolvedSelection>),
    /// The aggregate query failed; the message is meant for the user
    QueryFailed { sequence: u64, message: String },
    /// Blocking notice, e.g. a lookup that found nothing
    Notice(String),
}

/// Fan-out of [`SearchEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SearchEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SearchEvent) {
        // Sending only fails when nobody listens
        if self.sender.send(event).is_err() {
            trace!("Event dropped, no subscribers");
        }
    }
}
