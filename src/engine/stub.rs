//! In-memory collaborators serving fixture data without any network calls.
//!
//! Useful for integration tests and demos that must not require a backend.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::table::ActionHandler;
use crate::types::{DataResult, Entity, EntityType, QueryParams, Record, RowId};

use super::interface::{CapabilityChecker, DetailLoader, DialogService, MessageSink, QueryBackend};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Serves `rows` page by page and records every query it receives.
///
/// Each call consumes the next scripted delay and the next scripted failure,
/// if any.
pub struct StubBackend<T> {
    rows: Mutex<Vec<T>>,
    calls: Mutex<Vec<QueryParams>>,
    delays: Mutex<VecDeque<Duration>>,
    failures: Mutex<VecDeque<Option<EngineError>>>,
}

impl<T: Entity> StubBackend<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self {
            rows: Mutex::new(rows),
            calls: Mutex::new(Vec::new()),
            delays: Mutex::new(VecDeque::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Delay the next calls, in order.
    pub fn delay_next(&self, delays: impl IntoIterator<Item = Duration>) {
        lock(&self.delays).extend(delays);
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: EngineError) {
        lock(&self.failures).push_back(Some(error));
    }

    /// Let the next call succeed (used to interleave with `fail_next`).
    pub fn succeed_next(&self) {
        lock(&self.failures).push_back(None);
    }

    pub fn set_rows(&self, rows: Vec<T>) {
        *lock(&self.rows) = rows;
    }

    pub fn calls(&self) -> Vec<QueryParams> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl<T: Entity> QueryBackend<T> for StubBackend<T> {
    async fn query(&self, params: &QueryParams) -> EngineResult<DataResult<T>> {
        lock(&self.calls).push(params.clone());
        let delay = lock(&self.delays).pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(Some(error)) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        let rows = lock(&self.rows);
        let skip = usize::try_from(params.paging.skip).unwrap_or(usize::MAX);
        let limit = params.paging.limit as usize;
        Ok(DataResult {
            count: rows.len() as u64,
            result: rows.iter().skip(skip).take(limit).cloned().collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Details
// ---------------------------------------------------------------------------

/// Builds a detail payload from the row itself and counts fetches per row.
pub struct StubDetails<T: Entity> {
    make: Box<dyn Fn(&T) -> T::Detail + Send + Sync>,
    calls: Mutex<Vec<RowId>>,
    patchable: HashSet<EntityType>,
    delay: Duration,
}

impl<T: Entity> StubDetails<T> {
    pub fn new(make: impl Fn(&T) -> T::Detail + Send + Sync + 'static) -> Self {
        Self {
            make: Box::new(make),
            calls: Mutex::new(Vec::new()),
            patchable: HashSet::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn patching(mut self, entity: EntityType) -> Self {
        self.patchable.insert(entity);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls_for(&self, id: &RowId) -> usize {
        lock(&self.calls).iter().filter(|c| *c == id).count()
    }
}

impl StubDetails<Record> {
    /// Detail payload equal to the record itself.
    pub fn echo() -> Self {
        Self::new(|row: &Record| serde_json::Value::Object(row.0.clone()))
    }
}

#[async_trait]
impl<T: Entity> DetailLoader<T> for StubDetails<T> {
    async fn load_detail(&self, row: &T) -> EngineResult<T::Detail> {
        lock(&self.calls).push(row.row_id());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok((self.make)(row))
    }

    fn supports_patch(&self, entity: EntityType) -> bool {
        self.patchable.contains(&entity)
    }
}

// ---------------------------------------------------------------------------
// Host services
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Success,
    Info,
}

/// Records every message instead of displaying it.
#[derive(Debug, Default)]
pub struct RecordingMessages {
    messages: Mutex<Vec<(MessageKind, String)>>,
}

impl RecordingMessages {
    pub fn all(&self) -> Vec<(MessageKind, String)> {
        lock(&self.messages).clone()
    }

    pub fn of_kind(&self, kind: MessageKind) -> Vec<String> {
        lock(&self.messages)
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn push(&self, kind: MessageKind, message: &str) {
        lock(&self.messages).push((kind, message.to_owned()));
    }
}

impl MessageSink for RecordingMessages {
    fn show_error(&self, message: &str) {
        self.push(MessageKind::Error, message);
    }

    fn show_success(&self, message: &str) {
        self.push(MessageKind::Success, message);
    }

    fn show_info(&self, message: &str) {
        self.push(MessageKind::Info, message);
    }
}

/// Answers every confirmation with a fixed choice and records the titles.
#[derive(Debug)]
pub struct StubDialog {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl StubDialog {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }
}

#[async_trait]
impl DialogService for StubDialog {
    async fn confirm(&self, title: &str, _body: &str) -> bool {
        lock(&self.asked).push(title.to_owned());
        self.answer
    }
}

/// Grants everything except the listed capabilities.
#[derive(Debug, Default)]
pub struct DenyList(pub HashSet<String>);

impl CapabilityChecker for DenyList {
    fn can_perform(&self, action: &str, _context: Option<&str>) -> bool {
        !self.0.contains(action)
    }
}

/// Action handler returning scripted results and recording targeted rows.
#[derive(Debug, Default)]
pub struct StubAction {
    results: Mutex<VecDeque<EngineResult<String>>>,
    targets: Mutex<Vec<Vec<RowId>>>,
}

impl StubAction {
    pub fn returning(results: impl IntoIterator<Item = EngineResult<String>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            targets: Mutex::new(Vec::new()),
        }
    }

    pub fn targets(&self) -> Vec<Vec<RowId>> {
        lock(&self.targets).clone()
    }
}

#[async_trait]
impl<T: Entity> ActionHandler<T> for StubAction {
    async fn execute(&self, rows: &[T]) -> EngineResult<String> {
        lock(&self.targets).push(rows.iter().map(|r| r.row_id()).collect());
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| Ok("done".to_owned()))
    }
}
