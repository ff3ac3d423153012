use std::collections::BTreeSet;

use crate::types::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    #[default]
    None,
    Single,
    Multiple,
}

/// Selected row ids of the currently loaded page.
///
/// The owner is responsible for only passing ids of loaded, selectable rows;
/// the selection itself only enforces the mode.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    mode: SelectionMode,
    ids: BTreeSet<RowId>,
}

impl Selection {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            ids: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn ids(&self) -> &BTreeSet<RowId> {
        &self.ids
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn select(&mut self, id: RowId) -> bool {
        match self.mode {
            SelectionMode::None => false,
            SelectionMode::Single => {
                if self.ids.len() == 1 && self.ids.contains(&id) {
                    return false;
                }
                self.ids.clear();
                self.ids.insert(id);
                true
            }
            SelectionMode::Multiple => self.ids.insert(id),
        }
    }

    pub fn deselect(&mut self, id: &RowId) -> bool {
        self.ids.remove(id)
    }

    /// Select every given row. Only meaningful in `Multiple` mode and only
    /// ever covers the rows passed in: there is no "all pages" selection.
    pub fn select_all(&mut self, ids: impl IntoIterator<Item = RowId>) -> bool {
        if self.mode != SelectionMode::Multiple {
            return false;
        }
        let before = self.ids.len();
        self.ids.extend(ids);
        self.ids.len() != before
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.ids.is_empty();
        self.ids.clear();
        changed
    }
}
