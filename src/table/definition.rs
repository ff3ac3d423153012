use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::types::{Entity, FilterValue, SortDirection, Sorting};

use super::action::ActionDef;
use super::detail::DetailMode;
use super::selection::SelectionMode;

/// Predicate evaluated against one row's record.
pub type RowPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// How a cell value is turned into display text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Renderer {
    #[default]
    Text,
    DateTime,
    Boolean,
    Number {
        unit: Option<String>,
    },
}

impl Renderer {
    pub fn render(&self, value: Option<&Value>) -> String {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return "-".to_owned();
        };
        match (self, value) {
            (Self::Boolean, Value::Bool(b)) => (if *b { "yes" } else { "no" }).to_owned(),
            (Self::DateTime, Value::String(s)) => s
                .parse::<DateTime<Utc>>()
                .map_or_else(|_| s.clone(), |dt| dt.format("%Y-%m-%d %H:%M").to_string()),
            (Self::Number { unit: Some(unit) }, Value::Number(n)) => format!("{n} {unit}"),
            (_, Value::String(s)) => s.clone(),
            (_, other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub id: String,
    pub header: String,
    pub sortable: bool,
    pub initially_sorted: bool,
    pub initial_direction: SortDirection,
    pub renderer: Renderer,
}

impl ColumnDef {
    pub fn new(id: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            header: header.into(),
            sortable: false,
            initially_sorted: false,
            initial_direction: SortDirection::Asc,
            renderer: Renderer::Text,
        }
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Mark as the default sort column. Implies `sortable`.
    pub fn sorted(mut self, direction: SortDirection) -> Self {
        self.sortable = true;
        self.initially_sorted = true;
        self.initial_direction = direction;
        self
    }

    pub fn renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterItem {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    /// Fixed list of choices.
    Dropdown { items: Vec<FilterItem> },
    /// Values picked from another collection in a dialog (sites, users, ...).
    DialogCollection,
    Date,
}

#[derive(Debug, Clone)]
pub struct FilterDef {
    pub id: String,
    /// Key sent to the backend; usually equal to `id`.
    pub query_key: String,
    pub label: String,
    pub kind: FilterKind,
    pub multiple: bool,
    pub current_value: FilterValue,
    pub default_value: FilterValue,
    /// Set once at construction, never shown to the user nor reset.
    pub static_only: bool,
}

impl FilterDef {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FilterKind) -> Self {
        let id = id.into();
        Self {
            query_key: id.clone(),
            id,
            label: label.into(),
            kind,
            multiple: false,
            current_value: FilterValue::Unset,
            default_value: FilterValue::Unset,
            static_only: false,
        }
    }

    pub fn query_key(mut self, key: impl Into<String>) -> Self {
        self.query_key = key.into();
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Default value, also used as the initial value.
    pub fn default_value(mut self, value: FilterValue) -> Self {
        self.current_value = value.clone();
        self.default_value = value;
        self
    }

    /// A fixed, hidden filter such as "only rows of site X".
    pub fn fixed(mut self, value: FilterValue) -> Self {
        self.static_only = true;
        self.current_value = value;
        self
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

pub struct TableDef<T: Entity> {
    pub selection: SelectionMode,
    pub detail: DetailMode,
    pub search: bool,
    /// Rows failing this predicate render without a selection box.
    pub row_selectable: Option<RowPredicate<T>>,
}

impl<T: Entity> Default for TableDef<T> {
    fn default() -> Self {
        Self {
            selection: SelectionMode::None,
            detail: DetailMode::None,
            search: true,
            row_selectable: None,
        }
    }
}

impl<T: Entity> Clone for TableDef<T> {
    fn clone(&self) -> Self {
        Self {
            selection: self.selection,
            detail: self.detail,
            search: self.search,
            row_selectable: self.row_selectable.clone(),
        }
    }
}

/// Per-screen configuration supplied by the host view.
pub trait TableBuilder<T: Entity> {
    fn build_table_def(&self) -> TableDef<T> {
        TableDef::default()
    }

    fn build_column_defs(&self) -> Vec<ColumnDef>;

    fn build_filter_defs(&self) -> Vec<FilterDef> {
        Vec::new()
    }

    fn build_action_defs(&self) -> Vec<ActionDef<T>> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("duplicate column id {0:?}")]
    DuplicateColumn(String),
    #[error("more than one initially sorted column: {0:?} and {1:?}")]
    MultipleInitialSorts(String, String),
    #[error("duplicate filter id {0:?}")]
    DuplicateFilter(String),
    #[error("filter {id:?}: value does not match its multiplicity")]
    FilterValueShape { id: String },
    #[error("duplicate action id {0:?}")]
    DuplicateAction(String),
}

/// Validated definitions of one screen.
pub struct TableDefinitions<T: Entity> {
    pub table: TableDef<T>,
    pub columns: Vec<ColumnDef>,
    pub filters: Vec<FilterDef>,
    pub actions: Vec<ActionDef<T>>,
}

impl<T: Entity> TableDefinitions<T> {
    pub fn build<B: TableBuilder<T> + ?Sized>(builder: &B) -> Result<Self, DefinitionError> {
        let defs = Self {
            table: builder.build_table_def(),
            columns: builder.build_column_defs(),
            filters: builder.build_filter_defs(),
            actions: builder.build_action_defs(),
        };
        defs.validate()?;
        Ok(defs)
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        let mut ids = HashSet::new();
        let mut sorted: Option<&str> = None;
        for column in &self.columns {
            if !ids.insert(column.id.as_str()) {
                return Err(DefinitionError::DuplicateColumn(column.id.clone()));
            }
            if column.initially_sorted {
                if let Some(first) = sorted {
                    return Err(DefinitionError::MultipleInitialSorts(
                        first.to_owned(),
                        column.id.clone(),
                    ));
                }
                sorted = Some(column.id.as_str());
            }
        }

        let mut ids = HashSet::new();
        for filter in &self.filters {
            if !ids.insert(filter.id.as_str()) {
                return Err(DefinitionError::DuplicateFilter(filter.id.clone()));
            }
            if !filter.current_value.fits(filter.multiple)
                || !filter.default_value.fits(filter.multiple)
            {
                return Err(DefinitionError::FilterValueShape {
                    id: filter.id.clone(),
                });
            }
        }

        let mut ids = HashSet::new();
        for action in self.actions.iter().flat_map(ActionDef::flatten) {
            if !ids.insert(action.id.as_str()) {
                return Err(DefinitionError::DuplicateAction(action.id.clone()));
            }
        }
        Ok(())
    }

    pub fn initial_sort(&self) -> Option<Sorting> {
        self.columns
            .iter()
            .find(|c| c.initially_sorted)
            .map(|c| Sorting::new(c.id.clone(), c.initial_direction))
    }

    pub fn column(&self, id: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Whether `field` may be sent as a sort key. Undeclared fields are
    /// allowed so schemaless screens can sort on anything.
    pub fn is_sortable(&self, field: &str) -> bool {
        self.column(field).is_none_or(|c| c.sortable)
    }

    pub fn is_selectable(&self, row: &T) -> bool {
        self.table.selection != SelectionMode::None
            && self.table.row_selectable.as_ref().is_none_or(|p| p(row))
    }

    /// Look up an action by id, including dropdown items.
    pub fn action(&self, id: &str) -> Option<&ActionDef<T>> {
        self.actions
            .iter()
            .flat_map(ActionDef::flatten)
            .find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    struct Sites {
        columns: Vec<ColumnDef>,
        filters: Vec<FilterDef>,
    }

    impl TableBuilder<Record> for Sites {
        fn build_column_defs(&self) -> Vec<ColumnDef> {
            self.columns.clone()
        }

        fn build_filter_defs(&self) -> Vec<FilterDef> {
            self.filters.clone()
        }
    }

    fn sites(columns: Vec<ColumnDef>) -> Sites {
        Sites {
            columns,
            filters: Vec::new(),
        }
    }

    #[test]
    fn initial_sort_comes_from_sorted_column() {
        let defs = TableDefinitions::build(&sites(vec![
            ColumnDef::new("name", "Name").sorted(SortDirection::Asc),
            ColumnDef::new("city", "City").sortable(),
        ]))
        .unwrap();
        assert_eq!(defs.initial_sort(), Some(Sorting::new("name", SortDirection::Asc)));
    }

    #[test]
    fn two_initially_sorted_columns_are_rejected() {
        let result = TableDefinitions::build(&sites(vec![
            ColumnDef::new("name", "Name").sorted(SortDirection::Asc),
            ColumnDef::new("city", "City").sorted(SortDirection::Desc),
        ]));
        assert_eq!(
            result.err(),
            Some(DefinitionError::MultipleInitialSorts("name".into(), "city".into()))
        );
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let result = TableDefinitions::build(&sites(vec![
            ColumnDef::new("name", "Name"),
            ColumnDef::new("name", "Name again"),
        ]));
        assert!(matches!(result, Err(DefinitionError::DuplicateColumn(_))));
    }

    #[test]
    fn scalar_filter_with_set_value_is_rejected() {
        let builder = Sites {
            columns: vec![ColumnDef::new("name", "Name")],
            filters: vec![
                FilterDef::new("Status", "Status", FilterKind::DialogCollection)
                    .default_value(FilterValue::multiple(["Faulted"])),
            ],
        };
        assert!(matches!(
            TableDefinitions::build(&builder),
            Err(DefinitionError::FilterValueShape { .. })
        ));
    }

    #[test]
    fn undeclared_fields_are_sortable_but_declared_ones_must_opt_in() {
        let defs = TableDefinitions::build(&sites(vec![ColumnDef::new("name", "Name")])).unwrap();
        assert!(!defs.is_sortable("name"));
        assert!(defs.is_sortable("createdOn"));
    }

    #[test]
    fn renderer_formats_values() {
        assert_eq!(Renderer::Boolean.render(Some(&Value::Bool(true))), "yes");
        assert_eq!(Renderer::Text.render(None), "-");
        assert_eq!(
            Renderer::Number {
                unit: Some("kW".into())
            }
            .render(Some(&serde_json::json!(22))),
            "22 kW"
        );
        assert_eq!(
            Renderer::DateTime.render(Some(&serde_json::json!("2024-03-01T08:30:00Z"))),
            "2024-03-01 08:30"
        );
    }
}
