use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::types::{ChangeAction, EntityType, EventShape, Notification, RawEvent, RowId};

/// Notifications buffered per subscriber before it starts lagging.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("malformed payload for event {event:?}: {reason}")]
    MalformedPayload { event: String, reason: String },
}

/// What travels over the hub's broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Notification(Notification),
    /// A new transport replaced a previous one; events may have been missed
    /// in between.
    Reconnected,
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Notification(Notification),
    /// The subscriber fell behind and this many messages were dropped.
    Lagged(u64),
    Reconnected,
}

#[derive(Default)]
struct Transport {
    pump: Option<JoinHandle<()>>,
    connections: u64,
}

struct Inner {
    tx: broadcast::Sender<HubMessage>,
    transport: Mutex<Transport>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let transport = self.transport.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(pump) = transport.pump.take() {
            pump.abort();
        }
    }
}

/// The session's push notification hub.
///
/// One hub per session, shared by cloning. A transport (websocket client,
/// test harness, stdin reader) hands it raw events over a channel with
/// [`connect`](Self::connect); tables subscribe to the entity types they
/// display and receive only those.
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<Inner>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                tx,
                transport: Mutex::new(Transport::default()),
            }),
        }
    }

    fn transport(&self) -> MutexGuard<'_, Transport> {
        self.inner
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start pumping events from a transport. Replaces (and stops) any
    /// previous transport; subscribers are told so they can resynchronise.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, mut events: mpsc::Receiver<RawEvent>) {
        let tx = self.inner.tx.clone();
        let pump = tokio::spawn(async move {
            while let Some(raw) = events.recv().await {
                match parse_event(&raw) {
                    Ok(notification) => {
                        let _ = tx.send(HubMessage::Notification(notification));
                    }
                    Err(e) => tracing::debug!("hub: dropping event: {e}"),
                }
            }
            tracing::info!("hub: transport closed");
        });

        let mut transport = self.transport();
        if let Some(previous) = transport.pump.replace(pump) {
            previous.abort();
        }
        transport.connections += 1;
        tracing::info!(connection = transport.connections, "hub: transport connected");
        if transport.connections > 1 {
            let _ = self.inner.tx.send(HubMessage::Reconnected);
        }
    }

    pub fn disconnect(&self) {
        if let Some(pump) = self.transport().pump.take() {
            pump.abort();
            tracing::info!("hub: transport disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport()
            .pump
            .as_ref()
            .is_some_and(|pump| !pump.is_finished())
    }

    /// Inject a notification directly, bypassing the transport.
    pub fn publish(&self, notification: Notification) {
        let _ = self.inner.tx.send(HubMessage::Notification(notification));
    }

    pub fn subscribe(&self, topics: &[EntityType]) -> TopicSubscription {
        TopicSubscription {
            rx: self.inner.tx.subscribe(),
            topics: topics.iter().copied().collect(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }
}

/// Receiving end of a topic-filtered subscription. Dropping it unsubscribes.
pub struct TopicSubscription {
    rx: broadcast::Receiver<HubMessage>,
    topics: HashSet<EntityType>,
}

impl TopicSubscription {
    pub fn topics(&self) -> &HashSet<EntityType> {
        &self.topics
    }

    /// Next event for one of the subscribed topics. `None` once the hub is
    /// gone.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(HubMessage::Notification(n)) if self.topics.contains(&n.entity()) => {
                    return Some(SubscriptionEvent::Notification(n));
                }
                Ok(HubMessage::Notification(_)) => {}
                Ok(HubMessage::Reconnected) => return Some(SubscriptionEvent::Reconnected),
                Err(RecvError::Lagged(missed)) => return Some(SubscriptionEvent::Lagged(missed)),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PointPayload {
    action: ChangeAction,
    data: PointData,
}

#[derive(Deserialize)]
struct PointData {
    id: Value,
}

/// Parse a raw transport event.
///
/// Collection events (`sites`) carry no payload; point events (`site`) carry
/// `{"action": "update", "data": {"id": "..", "type": ".."}}`.
pub fn parse_event(raw: &RawEvent) -> Result<Notification, HubError> {
    let (entity, shape) = EntityType::from_event_name(&raw.name)
        .ok_or_else(|| HubError::UnknownEvent(raw.name.clone()))?;
    if shape == EventShape::Collection {
        return Ok(Notification::collection(entity));
    }

    let malformed = |reason: String| HubError::MalformedPayload {
        event: raw.name.clone(),
        reason,
    };
    let payload = PointPayload::deserialize(&raw.payload).map_err(|e| malformed(e.to_string()))?;
    let id = match payload.data.id {
        Value::String(s) if !s.is_empty() => RowId::new(s),
        Value::Number(n) => RowId::new(n.to_string()),
        other => return Err(malformed(format!("unusable id {other}"))),
    };
    Ok(Notification::single(entity, payload.action, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_events_need_no_payload() {
        let n = parse_event(&RawEvent::new("charging-stations", Value::Null)).unwrap();
        assert_eq!(n, Notification::collection(EntityType::ChargingStation));
    }

    #[test]
    fn point_events_carry_action_and_id() {
        let raw = RawEvent::new(
            "site",
            json!({"action": "update", "data": {"id": "5be7", "type": "Site"}}),
        );
        assert_eq!(
            parse_event(&raw).unwrap(),
            Notification::single(EntityType::Site, ChangeAction::Update, "5be7")
        );

        let numeric = RawEvent::new("transaction", json!({"action": "delete", "data": {"id": 1042}}));
        assert_eq!(
            parse_event(&numeric).unwrap(),
            Notification::single(EntityType::Transaction, ChangeAction::Delete, "1042")
        );
    }

    #[test]
    fn bad_events_are_rejected() {
        assert_eq!(
            parse_event(&RawEvent::new("heartbeat", Value::Null)),
            Err(HubError::UnknownEvent("heartbeat".into()))
        );
        assert!(matches!(
            parse_event(&RawEvent::new("site", json!({"action": "explode", "data": {"id": "a"}}))),
            Err(HubError::MalformedPayload { .. })
        ));
        assert!(matches!(
            parse_event(&RawEvent::new("site", json!({"action": "create", "data": {"id": null}}))),
            Err(HubError::MalformedPayload { .. })
        ));
    }

    #[tokio::test]
    async fn subscribers_only_see_their_topics() {
        let hub = NotificationHub::default();
        let mut sites = hub.subscribe(&[EntityType::Site]);
        hub.publish(Notification::collection(EntityType::User));
        hub.publish(Notification::collection(EntityType::Site));
        assert_eq!(
            sites.recv().await,
            Some(SubscriptionEvent::Notification(Notification::collection(EntityType::Site)))
        );
    }

    #[tokio::test]
    async fn slow_subscribers_are_told_they_lagged() {
        let hub = NotificationHub::new(2);
        let mut sites = hub.subscribe(&[EntityType::Site]);
        for _ in 0..5 {
            hub.publish(Notification::collection(EntityType::Site));
        }
        assert_eq!(sites.recv().await, Some(SubscriptionEvent::Lagged(3)));
    }

    #[tokio::test]
    async fn transport_events_are_parsed_and_forwarded() {
        let hub = NotificationHub::default();
        let mut sites = hub.subscribe(&[EntityType::Site]);
        let (tx, rx) = mpsc::channel(8);
        hub.connect(rx);
        assert!(hub.is_connected());

        tx.send(RawEvent::new("heartbeat", Value::Null)).await.unwrap();
        tx.send(RawEvent::new("sites", Value::Null)).await.unwrap();
        assert_eq!(
            sites.recv().await,
            Some(SubscriptionEvent::Notification(Notification::collection(EntityType::Site)))
        );
    }

    #[tokio::test]
    async fn second_connection_announces_a_reconnect() {
        let hub = NotificationHub::default();
        let mut sub = hub.subscribe(&[EntityType::Site]);
        let (_first_tx, first) = mpsc::channel(1);
        hub.connect(first);
        let (_second_tx, second) = mpsc::channel(1);
        hub.connect(second);
        assert_eq!(sub.recv().await, Some(SubscriptionEvent::Reconnected));

        hub.disconnect();
        assert!(!hub.is_connected());
    }

    #[tokio::test]
    async fn dropping_a_subscription_unsubscribes() {
        let hub = NotificationHub::default();
        let sub = hub.subscribe(&[EntityType::Site]);
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
