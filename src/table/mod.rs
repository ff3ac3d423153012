// table module: the generic paginated, filterable, live-updating list engine
//
// Leaves first: query state, definitions, selection and actions, detail
// expansion and the change reconciler are plain synchronous state machines.
// `source` composes them into the per-screen actor.

pub mod action;
pub mod definition;
pub mod detail;
pub mod query;
pub mod reconciler;
pub mod selection;
pub mod source;

pub use action::{
    ActionDef, ActionHandler, ActionKind, ActionScope, Confirmation, RowAction, Visibility,
    compose_row_actions, compose_table_actions,
};
pub use definition::{
    ColumnDef, DefinitionError, FilterDef, FilterItem, FilterKind, Renderer, RowPredicate,
    TableBuilder, TableDef, TableDefinitions,
};
pub use detail::{DetailController, DetailMode};
pub use query::QueryState;
pub use reconciler::{ChangeReconciler, Reconcile};
pub use selection::{Selection, SelectionMode};
pub use source::{
    ActionTarget, LoadTrigger, Page, Row, TableDataSource, TableEvent, TableHandle, TableOptions,
};
