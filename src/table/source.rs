//! The per-screen table actor.
//!
//! A [`TableDataSource`] is mounted into one tokio task that owns the query
//! state, the loaded rows, the selection and the expanded details of one
//! screen. Hosts talk to it through a cloneable [`TableHandle`]: commands go
//! in over an unbounded channel, snapshots come out through `watch` channels
//! and discrete outcomes through a `broadcast` of [`TableEvent`]s.
//!
//! Network calls, dialogs and action handlers run in spawned tasks that post
//! their results back to the actor. Once the actor ends those results have
//! nowhere to go, so nothing a late task produces can touch the screen.

use std::collections::{BTreeSet, HashSet};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::engine::{Collaborators, DetailLoader};
use crate::error::{EngineError, EngineResult};
use crate::notify::{NotificationHub, SubscriptionEvent, TopicSubscription};
use crate::types::{
    DEFAULT_PAGE_SIZE, DataResult, Entity, EntityType, FilterValue, Notification, QueryParams,
    RowId, SortDirection,
};

use super::action::{ActionHandler, RowAction, compose_row_actions, compose_table_actions, offered};
use super::definition::{DefinitionError, TableBuilder, TableDefinitions};
use super::detail::DetailController;
use super::query::QueryState;
use super::reconciler::{ChangeReconciler, Reconcile};
use super::selection::Selection;

const EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime tuning of one mounted table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOptions {
    pub page_size: u32,
    /// Silent reload period; `None` disables polling.
    pub poll_interval: Option<Duration>,
    /// Quiescence required after the last keystroke before searching.
    pub search_debounce: Duration,
    /// Notifications arriving within this window of the first produce one
    /// reload.
    pub coalesce_window: Duration,
    /// Show failures of silent loads to the user as well.
    pub report_silent_errors: bool,
    pub detail_cache_ttl: Duration,
    pub detail_cache_capacity: u64,
    /// Entity types whose notifications concern this table.
    pub topics: Vec<EntityType>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: None,
            search_debounce: Duration::from_millis(300),
            coalesce_window: Duration::from_millis(500),
            report_silent_errors: false,
            detail_cache_ttl: Duration::from_secs(10 * 60),
            detail_cache_capacity: 500,
            topics: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Published state
// ---------------------------------------------------------------------------

/// What caused a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTrigger {
    Mount,
    /// Paging, sorting, filtering or searching.
    User,
    Refresh { silent: bool },
    Poll,
    Notification,
    /// Reload after a successful action.
    Action,
}

impl LoadTrigger {
    /// Silent loads leave the loading flag down.
    pub fn is_silent(self) -> bool {
        match self {
            Self::Poll | Self::Notification => true,
            Self::Refresh { silent } => silent,
            Self::Mount | Self::User | Self::Action => false,
        }
    }

    /// Reloads that follow a known remote change must not reuse an identical
    /// request already in flight, its response may predate the change.
    fn supersedes_identical(self) -> bool {
        matches!(self, Self::Notification | Self::Action)
    }
}

/// One loaded row plus the engine's view of it.
#[derive(Clone)]
pub struct Row<T: Entity> {
    pub id: RowId,
    pub data: T,
    pub is_selected: bool,
    pub is_selectable: bool,
    pub is_expanded: bool,
    /// Cached detail, present while the row is expanded and fetched.
    pub detail: Option<Arc<T::Detail>>,
    pub actions: Vec<RowAction>,
}

/// Snapshot published on every change of the visible table.
#[derive(Clone)]
pub struct Page<T: Entity> {
    pub rows: Vec<Row<T>>,
    /// Total number of records matching the query, across all pages.
    pub count: u64,
    pub page_index: u64,
    pub page_size: u32,
    /// Parameters of the query these rows answer.
    pub query: QueryParams,
    /// Generation of the load that produced the rows; 0 before the first.
    pub generation: u64,
    pub table_actions: Vec<RowAction>,
}

impl<T: Entity> Page<T> {
    fn empty(page_size: u32) -> Self {
        Self {
            rows: Vec::new(),
            count: 0,
            page_index: 0,
            page_size,
            query: QueryParams::default(),
            generation: 0,
            table_actions: Vec::new(),
        }
    }

    pub fn page_count(&self) -> u64 {
        self.count.div_ceil(u64::from(self.page_size.max(1)))
    }

    pub fn row(&self, id: &RowId) -> Option<&Row<T>> {
        self.rows.iter().find(|r| &r.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableEvent {
    Loaded {
        generation: u64,
        count: u64,
        trigger: LoadTrigger,
    },
    LoadFailed {
        trigger: LoadTrigger,
        error: EngineError,
    },
    ActionSucceeded {
        action: String,
        message: String,
    },
    ActionFailed {
        action: String,
        error: EngineError,
    },
    /// The confirmation dialog was declined.
    ActionCancelled { action: String },
    /// An action without a handler was dispatched; the host performs it.
    ActionRequested { action: String, rows: Vec<RowId> },
    DetailFailed { id: RowId, error: EngineError },
}

/// Rows an action is dispatched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    Row(RowId),
    /// The currently selected rows.
    Selection,
    /// Every row on the current page.
    Table,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Command {
    SetPage(u64),
    SetPageSize(u32),
    SetSort(String, SortDirection),
    ClearSort,
    SetSearch(String),
    SetFilter(String, FilterValue),
    ResetFilters,
    SetStaticFilters(IndexMap<String, FilterValue>),
    Refresh { silent: bool },
    Select(RowId),
    Deselect(RowId),
    SelectAll,
    ClearSelection,
    Expand(RowId),
    Collapse(RowId),
    Dispatch { action: String, target: ActionTarget },
    Teardown,
}

/// Cheap, cloneable handle to a mounted table.
///
/// Commands are fire-and-forget: they are queued to the actor and silently
/// dropped once it has been torn down. Dropping every handle also tears the
/// table down.
pub struct TableHandle<T: Entity> {
    tx: mpsc::UnboundedSender<Command>,
    data: watch::Receiver<Arc<Page<T>>>,
    selection: watch::Receiver<BTreeSet<RowId>>,
    loading: watch::Receiver<bool>,
    events: broadcast::Sender<TableEvent>,
}

impl<T: Entity> Clone for TableHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            data: self.data.clone(),
            selection: self.selection.clone(),
            loading: self.loading.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T: Entity> TableHandle<T> {
    fn send(&self, command: Command) {
        let _ = self.tx.send(command);
    }

    /// Zero-based page index.
    pub fn set_page(&self, index: u64) {
        self.send(Command::SetPage(index));
    }

    pub fn set_page_size(&self, limit: u32) {
        self.send(Command::SetPageSize(limit));
    }

    pub fn set_sort(&self, field: impl Into<String>, direction: SortDirection) {
        self.send(Command::SetSort(field.into(), direction));
    }

    pub fn clear_sort(&self) {
        self.send(Command::ClearSort);
    }

    /// Debounced: only the last text of a burst of keystrokes is searched.
    pub fn set_search(&self, text: impl Into<String>) {
        self.send(Command::SetSearch(text.into()));
    }

    pub fn set_filter(&self, id: impl Into<String>, value: FilterValue) {
        self.send(Command::SetFilter(id.into(), value));
    }

    pub fn reset_filters(&self) {
        self.send(Command::ResetFilters);
    }

    pub fn set_static_filters(&self, filters: IndexMap<String, FilterValue>) {
        self.send(Command::SetStaticFilters(filters));
    }

    pub fn refresh(&self, silent: bool) {
        self.send(Command::Refresh { silent });
    }

    pub fn select(&self, id: impl Into<RowId>) {
        self.send(Command::Select(id.into()));
    }

    pub fn deselect(&self, id: impl Into<RowId>) {
        self.send(Command::Deselect(id.into()));
    }

    pub fn select_all(&self) {
        self.send(Command::SelectAll);
    }

    pub fn clear_selection(&self) {
        self.send(Command::ClearSelection);
    }

    pub fn expand(&self, id: impl Into<RowId>) {
        self.send(Command::Expand(id.into()));
    }

    pub fn collapse(&self, id: impl Into<RowId>) {
        self.send(Command::Collapse(id.into()));
    }

    pub fn dispatch(&self, action: impl Into<String>, target: ActionTarget) {
        self.send(Command::Dispatch {
            action: action.into(),
            target,
        });
    }

    pub fn teardown(&self) {
        self.send(Command::Teardown);
    }

    /// "Data changed" stream.
    pub fn data(&self) -> watch::Receiver<Arc<Page<T>>> {
        self.data.clone()
    }

    /// The page currently shown.
    pub fn page(&self) -> Arc<Page<T>> {
        Arc::clone(&self.data.borrow())
    }

    /// "Selection changed" stream.
    pub fn selection(&self) -> watch::Receiver<BTreeSet<RowId>> {
        self.selection.clone()
    }

    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<TableEvent> {
        self.events.subscribe()
    }

    /// Whether the actor has ended.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Data source
// ---------------------------------------------------------------------------

/// A configured but not yet mounted table.
pub struct TableDataSource<T: Entity> {
    defs: TableDefinitions<T>,
    collaborators: Collaborators<T>,
    options: TableOptions,
    query: QueryState,
    subscription: Option<TopicSubscription>,
}

impl<T: Entity> TableDataSource<T> {
    pub fn new<B: TableBuilder<T> + ?Sized>(
        builder: &B,
        collaborators: Collaborators<T>,
        options: TableOptions,
    ) -> Result<Self, DefinitionError> {
        let defs = TableDefinitions::build(builder)?;
        let query = QueryState::from_definitions(&defs, options.page_size);
        Ok(Self {
            defs,
            collaborators,
            options,
            query,
            subscription: None,
        })
    }

    /// Subscribe to the hub for this table's topics. A table without topics
    /// never subscribes.
    pub fn with_hub(mut self, hub: &NotificationHub) -> Self {
        if !self.options.topics.is_empty() {
            self.subscription = Some(hub.subscribe(&self.options.topics));
        }
        self
    }

    /// Filters fixed by the host (e.g. the site whose stations are listed).
    pub fn with_static_filters(mut self, filters: IndexMap<String, FilterValue>) -> Self {
        self.query.set_static_filters(filters);
        self
    }

    pub fn definitions(&self) -> &TableDefinitions<T> {
        &self.defs
    }

    /// Spawn the actor and issue the initial load. Must be called from
    /// within a tokio runtime.
    pub fn mount(self) -> TableHandle<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (data_tx, data) = watch::channel(Arc::new(Page::empty(self.query.page_size())));
        let (selection_tx, selection) = watch::channel(BTreeSet::new());
        let (loading_tx, loading) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let options = self.options;
        let details = DetailController::new(
            self.defs.table.detail,
            self.collaborators.details.clone(),
            options.detail_cache_ttl,
            options.detail_cache_capacity,
        );
        let actor = TableActor {
            selection: Selection::new(self.defs.table.selection),
            reconciler: ChangeReconciler::new(options.coalesce_window),
            defs: self.defs,
            collaborators: self.collaborators,
            query: self.query,
            details,
            rows: Vec::new(),
            count: 0,
            shown: QueryParams::default(),
            shown_generation: 0,
            generation: 0,
            in_flight: None,
            pending_search: None,
            data_tx,
            selection_tx,
            loading_tx,
            events: events.clone(),
            done_tx,
            options,
        };
        tokio::spawn(actor.run(rx, done_rx, self.subscription));

        TableHandle {
            tx,
            data,
            selection,
            loading,
            events,
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Results posted back by spawned tasks.
enum Completion<T: Entity> {
    Loaded {
        generation: u64,
        result: EngineResult<DataResult<T>>,
    },
    Detail {
        id: RowId,
        result: EngineResult<T::Detail>,
    },
    Confirmed {
        action: String,
        rows: Vec<T>,
        confirmed: bool,
    },
    ActionDone {
        action: String,
        result: EngineResult<String>,
    },
}

struct InFlight {
    generation: u64,
    params: QueryParams,
    trigger: LoadTrigger,
}

struct TableActor<T: Entity> {
    defs: TableDefinitions<T>,
    collaborators: Collaborators<T>,
    options: TableOptions,
    query: QueryState,
    selection: Selection,
    details: DetailController<T>,
    reconciler: ChangeReconciler,

    rows: Vec<T>,
    count: u64,
    /// Query answered by `rows`.
    shown: QueryParams,
    shown_generation: u64,

    generation: u64,
    in_flight: Option<InFlight>,
    /// Search text waiting for the debounce deadline.
    pending_search: Option<(String, Instant)>,

    data_tx: watch::Sender<Arc<Page<T>>>,
    selection_tx: watch::Sender<BTreeSet<RowId>>,
    loading_tx: watch::Sender<bool>,
    events: broadcast::Sender<TableEvent>,
    done_tx: mpsc::UnboundedSender<Completion<T>>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn next_notification(subscription: &mut Option<TopicSubscription>) -> Option<SubscriptionEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => pending().await,
    }
}

impl<T: Entity> TableActor<T> {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<Completion<T>>,
        mut subscription: Option<TopicSubscription>,
    ) {
        tracing::info!(topics = ?self.options.topics, "table: mounted");

        let mut poll = match self.options.poll_interval {
            Some(period) if !period.is_zero() => {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // Consume the first immediate tick so polling starts after one
                // full period.
                interval.tick().await;
                Some(interval)
            }
            _ => None,
        };

        self.load(LoadTrigger::Mount);

        loop {
            let search_at = self.pending_search.as_ref().map(|(_, at)| *at);
            let reload_at = self.reconciler.deadline();
            tokio::select! {
                biased;
                command = rx.recv() => match command {
                    None | Some(Command::Teardown) => break,
                    Some(command) => self.handle_command(command),
                },
                Some(done) = done_rx.recv() => self.handle_completion(done),
                event = next_notification(&mut subscription) => match event {
                    Some(event) => self.handle_notification(event),
                    None => {
                        tracing::debug!("table: notification hub closed");
                        subscription = None;
                    }
                },
                () = wait_until(search_at) => self.apply_search(),
                () = wait_until(reload_at) => {
                    if self.reconciler.take_due(Instant::now()) {
                        self.load(LoadTrigger::Notification);
                    }
                }
                () = next_tick(&mut poll) => self.load(LoadTrigger::Poll),
            }
        }

        self.reconciler.release();
        drop(subscription);
        drop(poll);
        tracing::info!(generation = self.generation, "table: torn down");
    }

    // -- commands -----------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        tracing::debug!(?command, "table: command");
        match command {
            Command::SetPage(index) => {
                if self.query.set_page(index) {
                    self.load(LoadTrigger::User);
                }
            }
            Command::SetPageSize(limit) => {
                if self.query.set_page_size(limit) {
                    self.load(LoadTrigger::User);
                }
            }
            Command::SetSort(field, direction) => {
                if !self.defs.is_sortable(&field) {
                    tracing::warn!(%field, "table: column is not sortable");
                    return;
                }
                if self.query.set_sort(field, direction) {
                    self.clear_selection();
                    self.load(LoadTrigger::User);
                }
            }
            Command::ClearSort => {
                if self.query.clear_sort() {
                    self.clear_selection();
                    self.load(LoadTrigger::User);
                }
            }
            Command::SetSearch(text) => {
                let at = Instant::now() + self.options.search_debounce;
                self.pending_search = Some((text, at));
            }
            Command::SetFilter(id, value) => {
                if self.query.set_filter(&id, value) {
                    self.load(LoadTrigger::User);
                }
            }
            Command::ResetFilters => {
                self.pending_search = None;
                if self.query.reset_filters() {
                    self.load(LoadTrigger::User);
                }
            }
            Command::SetStaticFilters(filters) => {
                if self.query.set_static_filters(filters) {
                    self.load(LoadTrigger::User);
                }
            }
            Command::Refresh { silent } => self.load(LoadTrigger::Refresh { silent }),
            Command::Select(id) => {
                let selectable = self
                    .loaded_row(&id)
                    .is_some_and(|row| self.defs.is_selectable(row));
                if selectable && self.selection.select(id) {
                    self.publish_selection();
                }
            }
            Command::Deselect(id) => {
                if self.selection.deselect(&id) {
                    self.publish_selection();
                }
            }
            Command::SelectAll => {
                let ids: Vec<RowId> = self
                    .rows
                    .iter()
                    .filter(|row| self.defs.is_selectable(row))
                    .map(Entity::row_id)
                    .collect();
                if self.selection.select_all(ids) {
                    self.publish_selection();
                }
            }
            Command::ClearSelection => self.clear_selection(),
            Command::Expand(id) => self.expand(id),
            Command::Collapse(id) => {
                if self.details.collapse(&id) {
                    self.publish_data();
                }
            }
            Command::Dispatch { action, target } => self.dispatch(action, target),
            Command::Teardown => {}
        }
    }

    fn apply_search(&mut self) {
        let Some((text, _)) = self.pending_search.take() else {
            return;
        };
        if self.query.set_search(text) {
            self.load(LoadTrigger::User);
        }
    }

    // -- loading ------------------------------------------------------------

    fn load(&mut self, trigger: LoadTrigger) {
        let params = self.query.query_params();
        if let Some(flight) = self.in_flight.as_mut()
            && flight.params == params
            && !trigger.supersedes_identical()
        {
            tracing::debug!(
                generation = flight.generation,
                ?trigger,
                "table: identical load in flight, coalesced"
            );
            if flight.trigger.is_silent() && !trigger.is_silent() {
                flight.trigger = trigger;
                self.publish_loading();
            }
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        tracing::debug!(generation, ?trigger, "table: load");
        self.in_flight = Some(InFlight {
            generation,
            params: params.clone(),
            trigger,
        });
        self.publish_loading();

        let backend = Arc::clone(&self.collaborators.backend);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = backend.query(&params).await;
            let _ = done.send(Completion::Loaded { generation, result });
        });
    }

    fn on_loaded(&mut self, generation: u64, result: EngineResult<DataResult<T>>) {
        let Some(flight) = self.in_flight.take_if(|f| f.generation == generation) else {
            tracing::debug!(generation, current = self.generation, "table: stale response dropped");
            return;
        };
        self.publish_loading();

        let data = match result {
            Ok(data) => data,
            Err(error) => {
                self.on_load_failed(flight.trigger, error);
                return;
            }
        };

        tracing::debug!(generation, count = data.count, rows = data.result.len(), "table: loaded");
        self.rows = data.result;
        self.count = data.count;
        self.shown = flight.params;
        self.shown_generation = generation;

        let loaded: HashSet<RowId> = self.rows.iter().map(Entity::row_id).collect();
        self.details.retain_loaded(&loaded);
        if self.selection.clear() {
            let _ = self.selection_tx.send_replace(self.selection.ids().clone());
        }
        self.publish_data();
        self.emit(TableEvent::Loaded {
            generation,
            count: self.count,
            trigger: flight.trigger,
        });
    }

    fn on_load_failed(&mut self, trigger: LoadTrigger, error: EngineError) {
        if trigger.is_silent() {
            tracing::warn!(?trigger, "table: silent load failed: {error}");
            if self.options.report_silent_errors || error == EngineError::AuthExpired {
                self.collaborators.messages.show_error(&error.user_message());
            }
        } else {
            tracing::debug!(?trigger, "table: load failed: {error}");
            self.collaborators.messages.show_error(&error.user_message());
        }
        self.emit(TableEvent::LoadFailed { trigger, error });
    }

    // -- notifications ------------------------------------------------------

    fn handle_notification(&mut self, event: SubscriptionEvent) {
        let now = Instant::now();
        let outcome = match event {
            SubscriptionEvent::Notification(notification) => {
                tracing::debug!(?notification, "table: notification");
                let details = &self.details;
                let outcome = self
                    .reconciler
                    .on_notification(&notification, now, |change| details.can_patch(change));
                if let Notification::Single(change) = &notification
                    && matches!(outcome, Reconcile::ReloadScheduled(_) | Reconcile::Coalesced)
                    && self.details.invalidate(change)
                {
                    tracing::debug!(id = %change.entity_id, "table: cached detail invalidated");
                }
                outcome
            }
            SubscriptionEvent::Lagged(missed) => {
                tracing::warn!(missed, "table: notifications missed");
                self.reconciler.on_missed(now)
            }
            SubscriptionEvent::Reconnected => self.reconciler.on_missed(now),
        };
        if let Reconcile::PatchDetail(id) = outcome {
            self.patch_detail(&id);
        }
    }

    // -- detail -------------------------------------------------------------

    fn expand(&mut self, id: RowId) {
        let Some(row) = self.loaded_row(&id).cloned() else {
            return;
        };
        let (changed, fetch) = self.details.expand(id.clone());
        if let Some(loader) = fetch {
            self.fetch_detail(id, row, loader);
        }
        if changed {
            self.publish_data();
        }
    }

    fn patch_detail(&mut self, id: &RowId) {
        let Some(row) = self.loaded_row(id).cloned() else {
            return;
        };
        if let Some(loader) = self.details.begin_patch(id) {
            tracing::debug!(%id, "table: patching detail in place");
            self.fetch_detail(id.clone(), row, loader);
        }
    }

    fn fetch_detail(&self, id: RowId, row: T, loader: Arc<dyn DetailLoader<T>>) {
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = loader.load_detail(&row).await;
            let _ = done.send(Completion::Detail { id, result });
        });
    }

    fn on_detail(&mut self, id: RowId, result: EngineResult<T::Detail>) {
        let first_fetch = self.details.cached(&id).is_none();
        match self.details.finish(&id, result) {
            Ok(true) => self.publish_data(),
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(%id, "table: detail fetch failed: {error}");
                if first_fetch {
                    self.collaborators.messages.show_error(&error.user_message());
                }
                self.emit(TableEvent::DetailFailed { id, error });
            }
        }
    }

    // -- actions ------------------------------------------------------------

    fn dispatch(&mut self, action: String, target: ActionTarget) {
        let caps = self.collaborators.capabilities.as_ref();
        let rows: Vec<T> = match &target {
            ActionTarget::Row(id) => {
                let Some(row) = self.loaded_row(id) else {
                    tracing::debug!(%id, %action, "table: action on a row not loaded");
                    return;
                };
                if !offered(&compose_row_actions(&self.defs.actions, row, id, caps), &action) {
                    tracing::warn!(%id, %action, "table: action not offered for row");
                    return;
                }
                vec![row.clone()]
            }
            ActionTarget::Selection | ActionTarget::Table => {
                let table_actions =
                    compose_table_actions(&self.defs.actions, self.selection.len(), caps);
                if !offered(&table_actions, &action) {
                    tracing::warn!(%action, "table: table action not offered");
                    return;
                }
                let selected_only = target == ActionTarget::Selection;
                self.rows
                    .iter()
                    .filter(|row| !selected_only || self.selection.contains(&row.row_id()))
                    .cloned()
                    .collect()
            }
        };
        let Some(def) = self.defs.action(&action) else {
            return;
        };

        if def.handler.is_none() {
            let rows = rows.iter().map(Entity::row_id).collect();
            self.emit(TableEvent::ActionRequested { action, rows });
            return;
        }

        match def.confirm.clone() {
            Some(confirmation) => {
                let dialogs = Arc::clone(&self.collaborators.dialogs);
                let done = self.done_tx.clone();
                tokio::spawn(async move {
                    let confirmed = dialogs.confirm(&confirmation.title, &confirmation.body).await;
                    let _ = done.send(Completion::Confirmed {
                        action,
                        rows,
                        confirmed,
                    });
                });
            }
            None => self.run_action(action, rows),
        }
    }

    fn run_action(&self, action: String, rows: Vec<T>) {
        let Some(handler) = self.handler(&action) else {
            return;
        };
        tracing::debug!(%action, rows = rows.len(), "table: running action");
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = handler.execute(&rows).await;
            let _ = done.send(Completion::ActionDone { action, result });
        });
    }

    fn handler(&self, action: &str) -> Option<Arc<dyn ActionHandler<T>>> {
        self.defs.action(action).and_then(|def| def.handler.clone())
    }

    fn on_action_done(&mut self, action: String, result: EngineResult<String>) {
        match result {
            Ok(message) => {
                self.collaborators.messages.show_success(&message);
                self.emit(TableEvent::ActionSucceeded { action, message });
                self.load(LoadTrigger::Action);
            }
            Err(error) => {
                tracing::warn!(%action, "table: action failed: {error}");
                self.collaborators.messages.show_error(&error.user_message());
                self.clear_selection();
                self.emit(TableEvent::ActionFailed { action, error });
            }
        }
    }

    // -- completions --------------------------------------------------------

    fn handle_completion(&mut self, done: Completion<T>) {
        match done {
            Completion::Loaded { generation, result } => self.on_loaded(generation, result),
            Completion::Detail { id, result } => self.on_detail(id, result),
            Completion::Confirmed {
                action,
                rows,
                confirmed,
            } => {
                if confirmed {
                    self.run_action(action, rows);
                } else {
                    tracing::debug!(%action, "table: action declined");
                    self.emit(TableEvent::ActionCancelled { action });
                }
            }
            Completion::ActionDone { action, result } => self.on_action_done(action, result),
        }
    }

    // -- publishing ---------------------------------------------------------

    fn loaded_row(&self, id: &RowId) -> Option<&T> {
        self.rows.iter().find(|row| &row.row_id() == id)
    }

    fn clear_selection(&mut self) {
        if self.selection.clear() {
            self.publish_selection();
        }
    }

    fn publish_selection(&self) {
        let _ = self.selection_tx.send_replace(self.selection.ids().clone());
        self.publish_data();
    }

    fn publish_loading(&self) {
        let loading = self
            .in_flight
            .as_ref()
            .is_some_and(|flight| !flight.trigger.is_silent());
        self.loading_tx.send_if_modified(|current| {
            let changed = *current != loading;
            *current = loading;
            changed
        });
    }

    fn publish_data(&self) {
        let caps = self.collaborators.capabilities.as_ref();
        let rows = self
            .rows
            .iter()
            .map(|data| {
                let id = data.row_id();
                let is_expanded = self.details.is_expanded(&id);
                Row {
                    is_selected: self.selection.contains(&id),
                    is_selectable: self.defs.is_selectable(data),
                    is_expanded,
                    detail: if is_expanded {
                        self.details.cached(&id)
                    } else {
                        None
                    },
                    actions: compose_row_actions(&self.defs.actions, data, &id, caps),
                    data: data.clone(),
                    id,
                }
            })
            .collect();
        let page_size = self.shown.paging.limit.max(1);
        let page = Page {
            rows,
            count: self.count,
            page_index: self.shown.paging.skip / u64::from(page_size),
            page_size,
            query: self.shown.clone(),
            generation: self.shown_generation,
            table_actions: compose_table_actions(&self.defs.actions, self.selection.len(), caps),
        };
        let _ = self.data_tx.send_replace(Arc::new(page));
    }

    fn emit(&self, event: TableEvent) {
        let _ = self.events.send(event);
    }
}
