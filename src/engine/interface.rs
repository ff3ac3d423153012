use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{DataResult, Entity, EntityType, QueryParams};

/// Remote paged query for one collection.
#[async_trait]
pub trait QueryBackend<T: Entity>: Send + Sync + 'static {
    async fn query(&self, params: &QueryParams) -> EngineResult<DataResult<T>>;
}

/// Fetches the payload shown in a row's expanded detail panel.
#[async_trait]
pub trait DetailLoader<T: Entity>: Send + Sync + 'static {
    async fn load_detail(&self, row: &T) -> EngineResult<T::Detail>;

    /// Whether point notifications for `entity` may refresh an open panel in
    /// place instead of reloading the page.
    fn supports_patch(&self, _entity: EntityType) -> bool {
        false
    }
}

/// Synchronous authorization predicate, called per row per render.
pub trait CapabilityChecker: Send + Sync + 'static {
    fn can_perform(&self, action: &str, context: Option<&str>) -> bool;
}

/// Grants everything; used when the host has no authorization layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CapabilityChecker for AllowAll {
    fn can_perform(&self, _action: &str, _context: Option<&str>) -> bool {
        true
    }
}

/// Toast-style message channel owned by the host.
pub trait MessageSink: Send + Sync + 'static {
    fn show_error(&self, message: &str);
    fn show_success(&self, message: &str);
    fn show_info(&self, message: &str);
}

/// Writes messages to the tracing log. Used by the CLI host.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMessages;

impl MessageSink for LogMessages {
    fn show_error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn show_success(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn show_info(&self, message: &str) {
        tracing::info!("{message}");
    }
}

/// Modal confirmation host.
#[async_trait]
pub trait DialogService: Send + Sync + 'static {
    async fn confirm(&self, title: &str, body: &str) -> bool;
}

/// Declines every confirmation; a host without dialogs cannot run
/// confirmable actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDialogs;

#[async_trait]
impl DialogService for NoDialogs {
    async fn confirm(&self, _title: &str, _body: &str) -> bool {
        false
    }
}

/// Everything a table needs from the outside world.
pub struct Collaborators<T: Entity> {
    pub backend: Arc<dyn QueryBackend<T>>,
    pub details: Option<Arc<dyn DetailLoader<T>>>,
    pub capabilities: Arc<dyn CapabilityChecker>,
    pub messages: Arc<dyn MessageSink>,
    pub dialogs: Arc<dyn DialogService>,
}

impl<T: Entity> Collaborators<T> {
    pub fn new(backend: Arc<dyn QueryBackend<T>>) -> Self {
        Self {
            backend,
            details: None,
            capabilities: Arc::new(AllowAll),
            messages: Arc::new(LogMessages),
            dialogs: Arc::new(NoDialogs),
        }
    }

    pub fn details(mut self, loader: Arc<dyn DetailLoader<T>>) -> Self {
        self.details = Some(loader);
        self
    }

    pub fn capabilities(mut self, checker: Arc<dyn CapabilityChecker>) -> Self {
        self.capabilities = checker;
        self
    }

    pub fn messages(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.messages = sink;
        self
    }

    pub fn dialogs(mut self, dialogs: Arc<dyn DialogService>) -> Self {
        self.dialogs = dialogs;
        self
    }
}

impl<T: Entity> Clone for Collaborators<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            details: self.details.clone(),
            capabilities: Arc::clone(&self.capabilities),
            messages: Arc::clone(&self.messages),
            dialogs: Arc::clone(&self.dialogs),
        }
    }
}
