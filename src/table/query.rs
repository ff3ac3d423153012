use std::collections::HashSet;

use indexmap::IndexMap;

use crate::types::{FilterValue, Paging, QueryParams, SEARCH_KEY, SortDirection, Sorting};

use super::definition::{FilterDef, TableDefinitions};

// ---------------------------------------------------------------------------
// Query state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct DynamicFilter {
    query_key: String,
    value: FilterValue,
    default: FilterValue,
    /// Declared shape; ad-hoc filters accept any.
    multiple: Option<bool>,
}

/// Paging, sorting, search and filter values of one screen.
///
/// Every setter except [`set_page`](Self::set_page) moves back to the first
/// page: a re-filtered or re-sorted view always starts from page 0. Setters
/// return whether anything changed so callers can skip redundant loads.
#[derive(Debug, Clone)]
pub struct QueryState {
    limit: u32,
    offset: u64,
    sorting: Option<Sorting>,
    search: String,
    filters: IndexMap<String, DynamicFilter>,
    static_filters: IndexMap<String, FilterValue>,
    fixed_ids: HashSet<String>,
}

impl QueryState {
    pub fn new(page_size: u32) -> Self {
        Self {
            limit: page_size.max(1),
            offset: 0,
            sorting: None,
            search: String::new(),
            filters: IndexMap::new(),
            static_filters: IndexMap::new(),
            fixed_ids: HashSet::new(),
        }
    }

    /// Seed sorting and filters from the screen definitions.
    pub fn from_definitions<T: crate::types::Entity>(
        defs: &TableDefinitions<T>,
        page_size: u32,
    ) -> Self {
        let mut state = Self::new(page_size);
        state.sorting = defs.initial_sort();
        for filter in &defs.filters {
            state.declare_filter(filter);
        }
        state
    }

    fn declare_filter(&mut self, filter: &FilterDef) {
        if filter.static_only {
            self.fixed_ids.insert(filter.id.clone());
            if filter.current_value.is_set() {
                self.static_filters
                    .insert(filter.query_key.clone(), filter.current_value.clone());
            }
            return;
        }
        self.filters.insert(
            filter.id.clone(),
            DynamicFilter {
                query_key: filter.query_key.clone(),
                value: filter.current_value.clone(),
                default: filter.default_value.clone(),
                multiple: Some(filter.multiple),
            },
        );
    }

    pub fn page_size(&self) -> u32 {
        self.limit
    }

    pub fn page_index(&self) -> u64 {
        self.offset / u64::from(self.limit)
    }

    pub fn sorting(&self) -> Option<&Sorting> {
        self.sorting.as_ref()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn filter(&self, id: &str) -> Option<&FilterValue> {
        self.filters.get(id).map(|f| &f.value)
    }

    /// Number of pages needed to show `total` rows at the current page size.
    pub fn page_count(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }

    pub fn set_page(&mut self, index: u64) -> bool {
        let offset = index.saturating_mul(u64::from(self.limit));
        let changed = offset != self.offset;
        self.offset = offset;
        changed
    }

    pub fn set_page_size(&mut self, limit: u32) -> bool {
        let limit = limit.max(1);
        let changed = limit != self.limit || self.offset != 0;
        self.limit = limit;
        self.offset = 0;
        changed
    }

    pub fn set_sort(&mut self, field: impl Into<String>, direction: SortDirection) -> bool {
        let sorting = Sorting::new(field, direction);
        let changed = self.sorting.as_ref() != Some(&sorting) || self.offset != 0;
        self.sorting = Some(sorting);
        self.offset = 0;
        changed
    }

    pub fn clear_sort(&mut self) -> bool {
        let changed = self.sorting.is_some() || self.offset != 0;
        self.sorting = None;
        self.offset = 0;
        changed
    }

    pub fn set_search(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        let text = text.trim();
        let changed = self.search != text || self.offset != 0;
        text.clone_into(&mut self.search);
        self.offset = 0;
        changed
    }

    /// Set a user filter. Ids without a definition become ad-hoc filters
    /// keyed by their id. Static-only filters and values of the wrong shape
    /// are refused.
    pub fn set_filter(&mut self, id: &str, value: FilterValue) -> bool {
        if self.fixed_ids.contains(id) {
            tracing::warn!(id, "query: static filter cannot be changed");
            return false;
        }
        if let Some(multiple) = self.filters.get(id).and_then(|f| f.multiple)
            && !value.fits(multiple)
        {
            tracing::warn!(id, multiple, ?value, "query: filter value has the wrong shape");
            return false;
        }
        let entry = self
            .filters
            .entry(id.to_owned())
            .or_insert_with(|| DynamicFilter {
                query_key: id.to_owned(),
                value: FilterValue::Unset,
                default: FilterValue::Unset,
                multiple: None,
            });
        let changed = entry.value != value || self.offset != 0;
        entry.value = value;
        self.offset = 0;
        changed
    }

    /// Restore every user filter to its default and clear the search.
    pub fn reset_filters(&mut self) -> bool {
        let mut changed = self.offset != 0 || !self.search.is_empty();
        for filter in self.filters.values_mut() {
            if filter.value != filter.default {
                filter.value = filter.default.clone();
                changed = true;
            }
        }
        self.search.clear();
        self.offset = 0;
        changed
    }

    /// Merge static filters (keyed by query key). A `Unset` value removes the key.
    pub fn set_static_filters(&mut self, filters: IndexMap<String, FilterValue>) -> bool {
        let mut changed = self.offset != 0;
        for (key, value) in filters {
            if value.is_set() {
                if self.static_filters.get(&key) != Some(&value) {
                    self.static_filters.insert(key, value);
                    changed = true;
                }
            } else if self.static_filters.shift_remove(&key).is_some() {
                changed = true;
            }
        }
        self.offset = 0;
        changed
    }

    /// Flatten into the shape the remote query accepts.
    ///
    /// Static filters win over a user filter with the same query key.
    pub fn query_params(&self) -> QueryParams {
        let mut filters: IndexMap<String, String> = IndexMap::new();
        for (key, value) in &self.static_filters {
            if let Some(v) = value.to_query_value() {
                filters.insert(key.clone(), v);
            }
        }
        for filter in self.filters.values() {
            if let Some(v) = filter.value.to_query_value() {
                filters.entry(filter.query_key.clone()).or_insert(v);
            }
        }
        if !self.search.is_empty() {
            filters.insert(SEARCH_KEY.to_owned(), self.search.clone());
        }
        QueryParams {
            filters,
            paging: Paging {
                limit: self.limit,
                skip: self.offset,
            },
            sorting: self.sorting.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::definition::{FilterKind, TableDef};
    use crate::types::Record;

    fn state() -> QueryState {
        let mut state = QueryState::new(50);
        state.set_page(2);
        state
    }

    #[test]
    fn page_two_of_120_rows() {
        let mut state = QueryState::new(50);
        state.set_page(1);
        let params = state.query_params();
        assert_eq!(params.paging.skip, 50);
        assert_eq!(params.paging.limit, 50);
        assert_eq!(state.page_count(120), 3);
        assert_eq!(state.page_index(), 1);
    }

    #[test]
    fn page_count_of_empty_collection_is_zero() {
        assert_eq!(QueryState::new(50).page_count(0), 0);
        assert_eq!(QueryState::new(50).page_count(50), 1);
    }

    #[test]
    fn sort_resets_page() {
        let mut state = state();
        assert!(state.set_sort("name", SortDirection::Desc));
        assert_eq!(state.query_params().paging.skip, 0);
    }

    #[test]
    fn filter_resets_page() {
        let mut state = state();
        assert!(state.set_filter("Status", FilterValue::single("Faulted")));
        assert_eq!(state.query_params().paging.skip, 0);
    }

    #[test]
    fn search_resets_page_and_is_trimmed() {
        let mut state = state();
        assert!(state.set_search("  john "));
        let params = state.query_params();
        assert_eq!(params.paging.skip, 0);
        assert_eq!(params.search(), Some("john"));
    }

    #[test]
    fn page_size_change_resets_page() {
        let mut state = state();
        assert!(state.set_page_size(25));
        assert_eq!(state.page_index(), 0);
        assert_eq!(state.query_params().paging.limit, 25);
    }

    #[test]
    fn unchanged_input_on_first_page_reports_no_change() {
        let mut state = QueryState::new(50);
        state.set_filter("Status", FilterValue::single("Faulted"));
        assert!(!state.set_filter("Status", FilterValue::single("Faulted")));
        assert!(!state.set_page(0));
        assert!(!state.set_search(""));
    }

    #[test]
    fn set_page_keeps_filters() {
        let mut state = QueryState::new(10);
        state.set_filter("Status", FilterValue::single("Faulted"));
        state.set_page(3);
        let params = state.query_params();
        assert_eq!(params.paging.skip, 30);
        assert_eq!(params.filters.get("Status").map(String::as_str), Some("Faulted"));
    }

    #[test]
    fn static_filters_win_over_user_filters() {
        let mut state = QueryState::new(10);
        state.set_static_filters(IndexMap::from([(
            "SiteID".to_owned(),
            FilterValue::single("site-1"),
        )]));
        state.set_filter("SiteID", FilterValue::single("site-2"));
        let params = state.query_params();
        assert_eq!(params.filters.get("SiteID").map(String::as_str), Some("site-1"));
    }

    #[test]
    fn static_filter_can_be_removed_with_unset() {
        let mut state = QueryState::new(10);
        state.set_static_filters(IndexMap::from([("Issuer".to_owned(), FilterValue::single("true"))]));
        assert!(state.set_static_filters(IndexMap::from([("Issuer".to_owned(), FilterValue::Unset)])));
        assert!(state.query_params().filters.is_empty());
    }

    #[test]
    fn reset_filters_restores_defaults_and_clears_search() {
        let mut state = QueryState::new(10);
        state.filters.insert(
            "Status".to_owned(),
            DynamicFilter {
                query_key: "Status".to_owned(),
                value: FilterValue::single("Faulted"),
                default: FilterValue::single("Available"),
                multiple: Some(false),
            },
        );
        state.set_search("depot");
        assert!(state.reset_filters());
        assert_eq!(state.filter("Status"), Some(&FilterValue::single("Available")));
        assert_eq!(state.search(), "");
        assert!(!state.reset_filters());
    }

    fn declared() -> QueryState {
        let defs = TableDefinitions::<Record> {
            table: TableDef::default(),
            columns: Vec::new(),
            filters: vec![
                FilterDef::new("site", "Site", FilterKind::DialogCollection)
                    .query_key("SiteID")
                    .fixed(FilterValue::single("site-1")),
                FilterDef::new("Status", "Status", FilterKind::Dropdown { items: Vec::new() }),
                FilterDef::new("Connector", "Connector", FilterKind::Dropdown { items: Vec::new() })
                    .multiple(),
            ],
            actions: Vec::new(),
        };
        QueryState::from_definitions(&defs, 10)
    }

    #[test]
    fn static_only_filters_cannot_be_set_by_id() {
        let mut state = declared();
        assert!(!state.set_filter("site", FilterValue::single("site-2")));
        let params = state.query_params();
        assert_eq!(params.filters.get("SiteID").map(String::as_str), Some("site-1"));
        assert!(!params.filters.contains_key("site"));
    }

    #[test]
    fn filter_values_must_match_the_declared_multiplicity() {
        let mut state = declared();
        assert!(!state.set_filter("Status", FilterValue::multiple(["A", "B"])));
        assert!(state.set_filter("Status", FilterValue::single("A")));
        assert!(!state.set_filter("Connector", FilterValue::single("CCS")));
        assert!(state.set_filter("Connector", FilterValue::multiple(["CCS", "T2"])));

        let params = state.query_params();
        assert_eq!(params.filters.get("Status").map(String::as_str), Some("A"));
        assert_eq!(params.filters.get("Connector").map(String::as_str), Some("CCS|T2"));
    }

    #[test]
    fn sorting_flattens_to_single_entry() {
        let mut state = QueryState::new(10);
        state.set_sort("timestamp", SortDirection::Desc);
        let params = state.query_params();
        assert_eq!(params.sorting, vec![Sorting::new("timestamp", SortDirection::Desc)]);
        state.clear_sort();
        assert!(state.query_params().sorting.is_empty());
    }
}
