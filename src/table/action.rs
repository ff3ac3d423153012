use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::CapabilityChecker;
use crate::error::EngineResult;
use crate::types::{Entity, RowId};

use super::definition::RowPredicate;

// ---------------------------------------------------------------------------
// Action definitions
// ---------------------------------------------------------------------------

/// Remote mutation run when an action is dispatched.
///
/// Returns the success message to show.
#[async_trait]
pub trait ActionHandler<T: Entity>: Send + Sync {
    async fn execute(&self, rows: &[T]) -> EngineResult<String>;
}

pub enum ActionKind<T: Entity> {
    Button,
    /// On/off action; the predicate reports the current state of a row.
    Toggle { is_on: RowPredicate<T> },
    Dropdown { items: Vec<ActionDef<T>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    /// Shown on every row, applies to that row.
    Row,
    /// Shown once above the table.
    Table,
}

pub enum Visibility<T: Entity> {
    Always,
    /// Hidden entirely when the predicate fails.
    VisibleWhen(RowPredicate<T>),
    /// Always shown, disabled when the predicate fails.
    EnabledWhen(RowPredicate<T>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub title: String,
    pub body: String,
}

pub struct ActionDef<T: Entity> {
    pub id: String,
    pub label: String,
    pub kind: ActionKind<T>,
    pub scope: ActionScope,
    pub visibility: Visibility<T>,
    /// Capability passed to the checker; `None` means unrestricted.
    pub capability: Option<String>,
    pub confirm: Option<Confirmation>,
    /// Table actions with this flag only apply to the current selection.
    pub needs_selection: bool,
    /// Without a handler, dispatch is forwarded to the host as an event.
    pub handler: Option<Arc<dyn ActionHandler<T>>>,
}

impl<T: Entity> ActionDef<T> {
    fn with_kind(id: impl Into<String>, label: impl Into<String>, kind: ActionKind<T>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            scope: ActionScope::Row,
            visibility: Visibility::Always,
            capability: None,
            confirm: None,
            needs_selection: false,
            handler: None,
        }
    }

    pub fn button(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::with_kind(id, label, ActionKind::Button)
    }

    pub fn toggle(
        id: impl Into<String>,
        label: impl Into<String>,
        is_on: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::with_kind(
            id,
            label,
            ActionKind::Toggle {
                is_on: Arc::new(is_on),
            },
        )
    }

    pub fn dropdown(id: impl Into<String>, label: impl Into<String>, items: Vec<ActionDef<T>>) -> Self {
        Self::with_kind(id, label, ActionKind::Dropdown { items })
    }

    pub fn table(mut self) -> Self {
        self.scope = ActionScope::Table;
        self
    }

    /// Table action applying to the selected rows.
    pub fn on_selection(mut self) -> Self {
        self.scope = ActionScope::Table;
        self.needs_selection = true;
        self
    }

    pub fn visible_when(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.visibility = Visibility::VisibleWhen(Arc::new(predicate));
        self
    }

    pub fn enabled_when(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.visibility = Visibility::EnabledWhen(Arc::new(predicate));
        self
    }

    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn confirm(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.confirm = Some(Confirmation {
            title: title.into(),
            body: body.into(),
        });
        self
    }

    pub fn handler(mut self, handler: impl ActionHandler<T> + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: Arc<dyn ActionHandler<T>>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// This action followed by every nested dropdown item, depth first.
    pub fn flatten(&self) -> Vec<&ActionDef<T>> {
        let mut out = vec![self];
        if let ActionKind::Dropdown { items } = &self.kind {
            out.extend(items.iter().flat_map(ActionDef::flatten));
        }
        out
    }

    fn permitted(&self, caps: &dyn CapabilityChecker, context: Option<&str>) -> bool {
        self.capability
            .as_deref()
            .is_none_or(|cap| caps.can_perform(cap, context))
    }
}

// ---------------------------------------------------------------------------
// Composed action sets
// ---------------------------------------------------------------------------

/// An action as it should be rendered for one row (or for the table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowAction {
    pub id: String,
    pub label: String,
    pub enabled: bool,
    /// `Some` for toggles.
    pub toggled: Option<bool>,
    /// Non-empty for dropdowns.
    pub items: Vec<RowAction>,
}

/// Compute the visible row actions for one row.
///
/// Actions failing the capability check or a `VisibleWhen` predicate are
/// left out; `EnabledWhen` keeps the entry but disables it. Dropdowns with no
/// visible item are dropped.
pub fn compose_row_actions<T: Entity>(
    defs: &[ActionDef<T>],
    row: &T,
    row_id: &RowId,
    caps: &dyn CapabilityChecker,
) -> Vec<RowAction> {
    defs.iter()
        .filter(|def| def.scope == ActionScope::Row)
        .filter_map(|def| compose_one(def, row, row_id, caps))
        .collect()
}

fn compose_one<T: Entity>(
    def: &ActionDef<T>,
    row: &T,
    row_id: &RowId,
    caps: &dyn CapabilityChecker,
) -> Option<RowAction> {
    if !def.permitted(caps, Some(row_id.as_str())) {
        return None;
    }
    let enabled = match &def.visibility {
        Visibility::Always => true,
        Visibility::VisibleWhen(visible) => {
            if !visible(row) {
                return None;
            }
            true
        }
        Visibility::EnabledWhen(enabled) => enabled(row),
    };
    let (toggled, items) = match &def.kind {
        ActionKind::Button => (None, Vec::new()),
        ActionKind::Toggle { is_on } => (Some(is_on(row)), Vec::new()),
        ActionKind::Dropdown { items } => {
            let items: Vec<RowAction> = items
                .iter()
                .filter_map(|item| compose_one(item, row, row_id, caps))
                .collect();
            if items.is_empty() {
                return None;
            }
            (None, items)
        }
    };
    Some(RowAction {
        id: def.id.clone(),
        label: def.label.clone(),
        enabled,
        toggled,
        items,
    })
}

/// Compute the table-level actions. Row predicates do not apply here.
pub fn compose_table_actions<T: Entity>(
    defs: &[ActionDef<T>],
    selected: usize,
    caps: &dyn CapabilityChecker,
) -> Vec<RowAction> {
    defs.iter()
        .filter(|def| def.scope == ActionScope::Table && def.permitted(caps, None))
        .map(|def| RowAction {
            id: def.id.clone(),
            label: def.label.clone(),
            enabled: !def.needs_selection || selected > 0,
            toggled: None,
            items: Vec::new(),
        })
        .collect()
}

/// Whether `action` is currently offered and enabled for this row.
pub(crate) fn offered(actions: &[RowAction], action: &str) -> bool {
    actions
        .iter()
        .any(|a| (a.id == action && a.enabled) || offered(&a.items, action))
}
