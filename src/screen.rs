//! Screens described entirely by configuration.
//!
//! Compiled screens implement [`TableBuilder`] for their own record type;
//! the CLI has none, so it mounts every `[[screens]]` entry as a schemaless
//! [`Record`] table.

use std::sync::Arc;

use crate::config::types::{Defaults, ScreenSection};
use crate::engine::{
    BackendClient, Collaborators, DeleteAction, HttpDetails, HttpQuery, VerbAction,
};
use crate::table::{
    ActionDef, ColumnDef, DefinitionError, DetailMode, QueryState, SelectionMode, TableBuilder,
    TableDataSource, TableDef, TableDefinitions,
};
use crate::types::Record;

pub struct ConfiguredScreen<'a> {
    section: &'a ScreenSection,
    client: Option<BackendClient>,
}

impl<'a> ConfiguredScreen<'a> {
    /// `client` backs the delete action; without one the action is
    /// forwarded to the host as an event.
    pub fn new(section: &'a ScreenSection, client: Option<BackendClient>) -> Self {
        Self { section, client }
    }

    pub fn definitions(&self) -> Result<TableDefinitions<Record>, DefinitionError> {
        TableDefinitions::build(self)
    }

    /// Query state seeded from the screen's definitions and static filters.
    pub fn query_state(&self, defaults: &Defaults) -> Result<QueryState, DefinitionError> {
        let options = self.section.table_options(defaults);
        let mut query = QueryState::from_definitions(&self.definitions()?, options.page_size);
        query.set_static_filters(self.section.static_filters.clone());
        Ok(query)
    }

    /// Entity topic, or the endpoint for screens without an entity type.
    fn entity_name(&self) -> String {
        self.section
            .entity
            .map_or_else(|| self.section.endpoint.clone(), |e| e.to_string())
    }

    fn delete_capability(&self) -> String {
        format!("delete:{}", self.entity_name())
    }
}

impl TableBuilder<Record> for ConfiguredScreen<'_> {
    fn build_table_def(&self) -> TableDef<Record> {
        TableDef {
            selection: SelectionMode::Multiple,
            detail: DetailMode::Single,
            ..TableDef::default()
        }
    }

    fn build_column_defs(&self) -> Vec<ColumnDef> {
        let mut columns = vec![ColumnDef::new("id", "Id").sortable()];
        if let Ok(Some(sort)) = self.section.sorting() {
            if sort.field == "id" {
                columns[0] = ColumnDef::new("id", "Id").sorted(sort.direction);
            } else {
                columns.push(ColumnDef::new(sort.field.clone(), sort.field).sorted(sort.direction));
            }
        }
        columns
    }

    fn build_action_defs(&self) -> Vec<ActionDef<Record>> {
        let mut delete = ActionDef::button("delete", "Delete")
            .requires(self.delete_capability())
            .confirm(
                format!("Delete from {}", self.section.title),
                "The selected items will be permanently deleted.",
            );
        let mut delete_selected = ActionDef::button("delete-selected", "Delete selected")
            .on_selection()
            .requires(self.delete_capability())
            .confirm(
                format!("Delete from {}", self.section.title),
                "The selected items will be permanently deleted.",
            );
        if let Some(client) = &self.client {
            let handler: Arc<DeleteAction> =
                Arc::new(DeleteAction::new(client.clone(), self.section.endpoint.clone()));
            delete = delete.shared_handler(handler.clone());
            delete_selected = delete_selected.shared_handler(handler);
        }

        let mut actions = vec![delete, delete_selected];
        for verb in &self.section.verbs {
            let mut action = ActionDef::button(verb.clone(), verb.clone())
                .requires(format!("{verb}:{}", self.entity_name()))
                .confirm(verb.clone(), format!("Send {verb} to this item?"));
            if let Some(client) = &self.client {
                action = action.handler(VerbAction::new(
                    client.clone(),
                    self.section.endpoint.clone(),
                    verb.clone(),
                ));
            }
            actions.push(action);
        }
        actions
    }
}

/// Collaborators talking to the screen's REST endpoint.
pub fn http_collaborators(section: &ScreenSection, client: &BackendClient) -> Collaborators<Record> {
    let mut details = HttpDetails::<Record>::new(client.clone(), section.endpoint.clone());
    if let Some(entity) = section.entity {
        details = details.patching(entity);
    }
    Collaborators::new(Arc::new(HttpQuery::<Record>::new(client.clone(), section.endpoint.clone())))
        .details(Arc::new(details))
}

/// Build an unmounted data source for a configured screen.
pub fn data_source(
    section: &ScreenSection,
    defaults: &Defaults,
    collaborators: Collaborators<Record>,
    client: Option<BackendClient>,
) -> Result<TableDataSource<Record>, DefinitionError> {
    let screen = ConfiguredScreen::new(section, client);
    let source = TableDataSource::new(&screen, collaborators, section.table_options(defaults))?;
    Ok(source.with_static_filters(section.static_filters.clone()))
}
