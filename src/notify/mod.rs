// notify module: session-owned push notification hub with topic subscriptions

mod hub;

pub use hub::{
    DEFAULT_CAPACITY, HubError, HubMessage, NotificationHub, SubscriptionEvent, TopicSubscription,
    parse_event,
};
