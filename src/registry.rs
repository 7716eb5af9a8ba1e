use std::sync::{PoisonError, RwLock};

use crate::query::Query;
use crate::sources::SharedContextSource;

/// Where context sources register the information they can provide.
///
/// The source list is append-only. Lookups iterate under the read lock while
/// registration takes the write lock; registrations never mutate after
/// insertion.
#[derive(Default)]
pub struct ContextRegistry {
    sources: RwLock<Vec<SharedContextSource>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: SharedContextSource) {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source);
    }

    /// Every source whose registration carries an id pattern matching the
    /// entity id.
    pub fn sources_for_entity(&self, entity_id: &str) -> Vec<SharedContextSource> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|source| source.provides_entities_with_matching_id(entity_id))
            .cloned()
            .collect()
    }

    pub fn sources_for_entity_type(&self, type_name: &str) -> Vec<SharedContextSource> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|source| source.provides_type(type_name))
            .cloned()
            .collect()
    }

    /// Every source able to contribute to the query: some requested type is
    /// unrestricted or served, and some requested attribute is unrestricted
    /// or served. A source is returned at most once per call, no matter how
    /// many of its advertised (type, attribute) pairs match.
    pub fn sources_for_query(&self, query: &Query) -> Vec<SharedContextSource> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|source| {
                query
                    .entity_types()
                    .iter()
                    .any(|t| t.is_empty() || source.provides_type(t))
                    && query
                        .entity_attributes()
                        .iter()
                        .any(|a| a.is_empty() || source.provides_attribute(a))
            })
            .cloned()
            .collect()
    }
}
