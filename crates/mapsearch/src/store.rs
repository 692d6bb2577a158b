use std::{fmt, sync::Arc};

use ahash::{AHashMap, AHashSet};
use mapsearch_sources::Candidate;
use serde::Serialize;
use uuid::Uuid;

/// Process-local label of one suggestion. Never derived from backend ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CandidateId(Uuid);

impl CandidateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CandidateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One visible suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub id: CandidateId,
    pub candidate: Arc<Candidate>,
    /// Group heading, set on the first suggestion of each group
    pub header: Option<String>,
}

/// The suggestions of one query cycle.
///
/// A store is built in one go and never mutated; a new query or a clear replaces it
/// as a whole.
#[derive(Debug, Clone, Default)]
pub struct SuggestionStore {
    order: Vec<CandidateId>,
    entries: AHashMap<CandidateId, Suggestion>,
}

impl SuggestionStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Label candidates and keep at most `limit` of them, in order.
    ///
    /// When `header_attribute` is given, the first suggestion of every group gets the
    /// group value as its header.
    pub fn from_candidates(
        candidates: Vec<Candidate>,
        limit: usize,
        header_attribute: Option<&str>,
    ) -> Self {
        let mut store = Self::default();
        let mut seen_groups = AHashSet::new();

        for candidate in candidates.into_iter().take(limit) {
            let header = header_attribute.and_then(|attribute| {
                let group = candidate.attribute_text(attribute)?;
                seen_groups.insert(group.clone()).then_some(group)
            });
            let id = CandidateId::new();
            store.order.push(id);
            store.entries.insert(
                id,
                Suggestion {
                    id,
                    candidate: Arc::new(candidate),
                    header,
                },
            );
        }
        store
    }

    pub fn get(&self, id: CandidateId) -> Option<&Suggestion> {
        self.entries.get(&id)
    }

    pub fn candidate(&self, id: CandidateId) -> Option<Arc<Candidate>> {
        self.get(id).map(|s| Arc::clone(&s.candidate))
    }

    /// Suggestions in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Suggestion> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use mapsearch_sources::SourceKind;

    use super::*;

    fn candidate(name: &str, layer: &str) -> Candidate {
        Candidate::builder(SourceKind::Index, name).layer(layer).build()
    }

    #[test]
    fn test_limit_and_unique_ids() {
        let store = SuggestionStore::from_candidates(
            vec![
                candidate("a", "A"),
                candidate("a", "A"),
                candidate("b", "B"),
            ],
            2,
            None,
        );
        assert_eq!(store.len(), 2);
        let ids: Vec<_> = store.iter().map(|s| s.id).collect();
        assert_ne!(ids[0], ids[1]);
        assert!(store.iter().all(|s| s.header.is_none()));
    }

    #[test]
    fn test_header_on_first_of_each_group() {
        let store = SuggestionStore::from_candidates(
            vec![
                candidate("a1", "Adress"),
                candidate("o1", "Ort"),
                candidate("a2", "Adress"),
            ],
            9,
            Some("layer"),
        );
        let headers: Vec<_> = store.iter().map(|s| s.header.clone()).collect();
        assert_eq!(headers, vec![Some("Adress".into()), Some("Ort".into()), None]);
    }

    #[test]
    fn test_lookup_by_id() {
        let store = SuggestionStore::from_candidates(vec![candidate("Kolbäck", "Ort")], 9, None);
        let id = store.iter().next().unwrap().id;
        assert_eq!(store.candidate(id).unwrap().display_name(), "Kolbäck");
        assert!(store.get(CandidateId::new()).is_none());
        assert!(SuggestionStore::empty().is_empty());
    }
}
