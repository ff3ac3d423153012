use std::time::Duration;

use tokio::time::Instant;

use crate::types::{ChangeAction, Notification, RowId, SingleChangeNotification};

/// What the owning table should do about an incoming notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconcile {
    /// A silent reload is now scheduled at the returned deadline.
    ReloadScheduled(Instant),
    /// A reload was already scheduled; this notification is folded into it.
    Coalesced,
    /// Refresh the open detail panel of this row in place.
    PatchDetail(RowId),
    /// The reconciler has been released.
    Ignored,
}

/// Turns a stream of change notifications into as few reloads as possible.
///
/// The first collection-level notification opens a coalescing window; every
/// notification arriving before the window closes is folded into the one
/// reload fired at its end. Point notifications go to the detail patch path
/// when the table can apply them in place.
#[derive(Debug)]
pub struct ChangeReconciler {
    window: Duration,
    reload_at: Option<Instant>,
    released: bool,
}

impl ChangeReconciler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            reload_at: None,
            released: false,
        }
    }

    /// Classify a notification. `can_patch` tells whether the table can apply
    /// a point event to an open detail panel.
    pub fn on_notification(
        &mut self,
        notification: &Notification,
        now: Instant,
        can_patch: impl FnOnce(&SingleChangeNotification) -> bool,
    ) -> Reconcile {
        if self.released {
            return Reconcile::Ignored;
        }
        match notification {
            Notification::Single(change)
                if change.action != ChangeAction::Delete && can_patch(change) =>
            {
                Reconcile::PatchDetail(change.entity_id.clone())
            }
            _ => self.schedule(now),
        }
    }

    /// Missed notifications or a fresh connection: assume anything changed.
    pub fn on_missed(&mut self, now: Instant) -> Reconcile {
        if self.released {
            return Reconcile::Ignored;
        }
        self.schedule(now)
    }

    fn schedule(&mut self, now: Instant) -> Reconcile {
        match self.reload_at {
            Some(_) => Reconcile::Coalesced,
            None => {
                let at = now + self.window;
                self.reload_at = Some(at);
                Reconcile::ReloadScheduled(at)
            }
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.reload_at
    }

    /// Consume the pending reload if its window has closed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.reload_at {
            Some(at) if at <= now && !self.released => {
                self.reload_at = None;
                true
            }
            _ => false,
        }
    }

    /// Stop reacting for good; any pending reload is dropped.
    pub fn release(&mut self) {
        self.released = true;
        self.reload_at = None;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}
