use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::engine::DetailLoader;
use crate::error::EngineError;
use crate::types::{ChangeAction, Entity, RowId, SingleChangeNotification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailMode {
    #[default]
    None,
    /// Expanding a row collapses the previously expanded one.
    Single,
    Multiple,
}

/// Expanded rows and their lazily fetched detail payloads.
///
/// Detail is fetched on first expand only; the payload then lives in a
/// bounded cache keyed by row id, so collapsing, re-expanding and reloading
/// the page never fetch it again until the entry expires or a point
/// notification refreshes it.
pub struct DetailController<T: Entity> {
    mode: DetailMode,
    loader: Option<Arc<dyn DetailLoader<T>>>,
    cache: Cache<RowId, Arc<T::Detail>>,
    expanded: BTreeSet<RowId>,
    pending: HashSet<RowId>,
}

impl<T: Entity> DetailController<T> {
    pub fn new(
        mode: DetailMode,
        loader: Option<Arc<dyn DetailLoader<T>>>,
        ttl: Duration,
        capacity: u64,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self {
            mode,
            loader,
            cache,
            expanded: BTreeSet::new(),
            pending: HashSet::new(),
        }
    }

    pub fn is_expanded(&self, id: &RowId) -> bool {
        self.expanded.contains(id)
    }

    pub fn expanded(&self) -> &BTreeSet<RowId> {
        &self.expanded
    }

    pub fn cached(&self, id: &RowId) -> Option<Arc<T::Detail>> {
        self.cache.get(id)
    }

    pub fn is_pending(&self, id: &RowId) -> bool {
        self.pending.contains(id)
    }

    /// Expand a row. Returns whether anything changed and, when the detail
    /// is neither cached nor already being fetched, the loader to fetch it
    /// with.
    pub fn expand(&mut self, id: RowId) -> (bool, Option<Arc<dyn DetailLoader<T>>>) {
        if self.mode == DetailMode::None || self.expanded.contains(&id) {
            return (false, None);
        }
        if self.mode == DetailMode::Single {
            self.expanded.clear();
        }
        let fetch = self.start_fetch(&id);
        self.expanded.insert(id);
        (true, fetch)
    }

    fn start_fetch(&mut self, id: &RowId) -> Option<Arc<dyn DetailLoader<T>>> {
        if self.cache.contains_key(id) || self.pending.contains(id) {
            return None;
        }
        let loader = self.loader.clone()?;
        self.pending.insert(id.clone());
        Some(loader)
    }

    pub fn collapse(&mut self, id: &RowId) -> bool {
        self.expanded.remove(id)
    }

    /// Whether a point notification can be applied to an open detail panel
    /// instead of reloading the whole page.
    pub fn can_patch(&self, change: &SingleChangeNotification) -> bool {
        change.action != ChangeAction::Delete
            && self.expanded.contains(&change.entity_id)
            && self.cache.contains_key(&change.entity_id)
            && self
                .loader
                .as_ref()
                .is_some_and(|l| l.supports_patch(change.entity))
    }

    /// Drop a cached payload made stale by a point notification that cannot
    /// be patched in place, so the next expand fetches it again. Open panels
    /// keep their payload unless the row was deleted.
    pub fn invalidate(&self, change: &SingleChangeNotification) -> bool {
        let id = &change.entity_id;
        let stale = change.action == ChangeAction::Delete || !self.expanded.contains(id);
        if stale && self.cache.contains_key(id) {
            self.cache.invalidate(id);
            return true;
        }
        false
    }

    /// Start refreshing a cached detail. The stale payload stays in the cache
    /// (and on screen) until the fresh one replaces it.
    pub fn begin_patch(&mut self, id: &RowId) -> Option<Arc<dyn DetailLoader<T>>> {
        if self.pending.contains(id) {
            return None;
        }
        let loader = self.loader.clone()?;
        self.pending.insert(id.clone());
        Some(loader)
    }

    /// Store a finished fetch. Returns whether the row is currently shown
    /// expanded (so the view needs republishing).
    pub fn finish(
        &mut self,
        id: &RowId,
        result: Result<T::Detail, EngineError>,
    ) -> Result<bool, EngineError> {
        self.pending.remove(id);
        let detail = result?;
        self.cache.insert(id.clone(), Arc::new(detail));
        Ok(self.expanded.contains(id))
    }

    /// Collapse rows that are no longer on the loaded page.
    pub fn retain_loaded(&mut self, loaded: &HashSet<RowId>) -> bool {
        let before = self.expanded.len();
        self.expanded.retain(|id| loaded.contains(id));
        self.expanded.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stub::StubDetails;
    use crate::types::{EntityType, Record};

    fn controller(mode: DetailMode) -> DetailController<Record> {
        let loader = StubDetails::echo().patching(EntityType::Site);
        DetailController::new(mode, Some(Arc::new(loader)), Duration::from_secs(600), 100)
    }

    fn id(s: &str) -> RowId {
        RowId::from(s)
    }

    #[test]
    fn first_expand_fetches_then_cache_is_reused() {
        let mut details = controller(DetailMode::Multiple);
        let (changed, fetch) = details.expand(id("a"));
        assert!(changed);
        assert!(fetch.is_some());
        assert!(details.finish(&id("a"), Ok(serde_json::json!({"id": "a"}))).unwrap());

        assert!(details.collapse(&id("a")));
        let (changed, fetch) = details.expand(id("a"));
        assert!(changed);
        assert!(fetch.is_none());
        assert!(details.cached(&id("a")).is_some());
    }

    #[test]
    fn concurrent_expands_share_one_fetch() {
        let mut details = controller(DetailMode::Multiple);
        assert!(details.expand(id("a")).1.is_some());
        details.collapse(&id("a"));
        assert!(details.expand(id("a")).1.is_none());
        assert!(details.is_pending(&id("a")));
    }

    #[test]
    fn single_mode_collapses_previous_row() {
        let mut details = controller(DetailMode::Single);
        details.expand(id("a"));
        details.expand(id("b"));
        assert!(!details.is_expanded(&id("a")));
        assert!(details.is_expanded(&id("b")));
    }

    #[test]
    fn none_mode_never_expands() {
        let mut details = controller(DetailMode::None);
        assert!(!details.expand(id("a")).0);
    }

    #[test]
    fn patch_requires_expanded_cached_row_and_supported_type() {
        let mut details = controller(DetailMode::Multiple);
        let change = SingleChangeNotification {
            entity: EntityType::Site,
            action: ChangeAction::Update,
            entity_id: id("a"),
        };
        assert!(!details.can_patch(&change));

        details.expand(id("a"));
        assert!(!details.can_patch(&change), "not cached yet");
        details.finish(&id("a"), Ok(serde_json::json!({}))).unwrap();
        assert!(details.can_patch(&change));

        let other_type = SingleChangeNotification {
            entity: EntityType::SiteArea,
            ..change.clone()
        };
        assert!(!details.can_patch(&other_type));

        let deleted = SingleChangeNotification {
            action: ChangeAction::Delete,
            ..change
        };
        assert!(!details.can_patch(&deleted));
    }

    #[test]
    fn failed_patch_keeps_previous_detail() {
        let mut details = controller(DetailMode::Multiple);
        details.expand(id("a"));
        details.finish(&id("a"), Ok(serde_json::json!({"v": 1}))).unwrap();
        assert!(details.begin_patch(&id("a")).is_some());
        assert!(
            details
                .finish(&id("a"), Err(EngineError::Network("reset".into())))
                .is_err()
        );
        assert_eq!(
            details.cached(&id("a")).as_deref(),
            Some(&serde_json::json!({"v": 1}))
        );
    }

    #[test]
    fn point_change_of_a_collapsed_row_drops_its_cached_detail() {
        let mut details = controller(DetailMode::Multiple);
        details.expand(id("a"));
        details.finish(&id("a"), Ok(serde_json::json!({"v": 1}))).unwrap();
        let change = SingleChangeNotification {
            entity: EntityType::Site,
            action: ChangeAction::Update,
            entity_id: id("a"),
        };
        assert!(!details.invalidate(&change), "open panels are patched instead");

        details.collapse(&id("a"));
        assert!(details.invalidate(&change));
        assert!(details.cached(&id("a")).is_none());
        assert!(details.expand(id("a")).1.is_some());
    }

    #[test]
    fn deleted_row_loses_its_detail_even_when_open() {
        let mut details = controller(DetailMode::Multiple);
        details.expand(id("a"));
        details.finish(&id("a"), Ok(serde_json::json!({}))).unwrap();
        let deleted = SingleChangeNotification {
            entity: EntityType::Site,
            action: ChangeAction::Delete,
            entity_id: id("a"),
        };
        assert!(details.invalidate(&deleted));
        assert!(details.cached(&id("a")).is_none());
    }

    #[test]
    fn rows_leaving_the_page_are_collapsed() {
        let mut details = controller(DetailMode::Multiple);
        details.expand(id("a"));
        details.expand(id("b"));
        let loaded: HashSet<RowId> = [id("b")].into_iter().collect();
        assert!(details.retain_loaded(&loaded));
        assert!(!details.is_expanded(&id("a")));
    }
}
