use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::common::RowId;

// ---------------------------------------------------------------------------
// Entity types / topics
// ---------------------------------------------------------------------------

/// Entity types the back office receives push notifications for.
///
/// Each type has two topics: the plural collection topic (`"sites"`) fired
/// when anything in the collection changed, and the singular point topic
/// (`"site"`) fired with the id of the entity that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    Site,
    SiteArea,
    Company,
    ChargingStation,
    ChargingProfile,
    Transaction,
    User,
    Tag,
    Car,
    Asset,
    Tenant,
    Invoice,
    Log,
    OcpiEndpoint,
    RegistrationToken,
}

impl EntityType {
    pub const ALL: [EntityType; 15] = [
        Self::Site,
        Self::SiteArea,
        Self::Company,
        Self::ChargingStation,
        Self::ChargingProfile,
        Self::Transaction,
        Self::User,
        Self::Tag,
        Self::Car,
        Self::Asset,
        Self::Tenant,
        Self::Invoice,
        Self::Log,
        Self::OcpiEndpoint,
        Self::RegistrationToken,
    ];

    /// Point-event topic name.
    pub fn single_topic(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::SiteArea => "site-area",
            Self::Company => "company",
            Self::ChargingStation => "charging-station",
            Self::ChargingProfile => "charging-profile",
            Self::Transaction => "transaction",
            Self::User => "user",
            Self::Tag => "tag",
            Self::Car => "car",
            Self::Asset => "asset",
            Self::Tenant => "tenant",
            Self::Invoice => "invoice",
            Self::Log => "log",
            Self::OcpiEndpoint => "ocpi-endpoint",
            Self::RegistrationToken => "registration-token",
        }
    }

    /// Collection-event topic name.
    pub fn collection_topic(self) -> &'static str {
        match self {
            Self::Site => "sites",
            Self::SiteArea => "site-areas",
            Self::Company => "companies",
            Self::ChargingStation => "charging-stations",
            Self::ChargingProfile => "charging-profiles",
            Self::Transaction => "transactions",
            Self::User => "users",
            Self::Tag => "tags",
            Self::Car => "cars",
            Self::Asset => "assets",
            Self::Tenant => "tenants",
            Self::Invoice => "invoices",
            Self::Log => "logs",
            Self::OcpiEndpoint => "ocpi-endpoints",
            Self::RegistrationToken => "registration-tokens",
        }
    }

    /// Resolve an event name to its entity type and shape.
    pub fn from_event_name(name: &str) -> Option<(Self, EventShape)> {
        Self::ALL.into_iter().find_map(|entity| {
            if entity.collection_topic() == name {
                Some((entity, EventShape::Collection))
            } else if entity.single_topic() == name {
                Some((entity, EventShape::Single))
            } else {
                None
            }
        })
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.single_topic())
    }
}

/// Accepts either topic name, so config can say `"site"` or `"sites"`.
impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_event_name(s)
            .map(|(entity, _)| entity)
            .ok_or_else(|| format!("unknown entity type {s:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventShape {
    Collection,
    Single,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// "Something in this collection changed, reload."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotification {
    pub entity: EntityType,
}

/// A point event naming the entity that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleChangeNotification {
    pub entity: EntityType,
    pub action: ChangeAction,
    pub entity_id: RowId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Collection(ChangeNotification),
    Single(SingleChangeNotification),
}

impl Notification {
    pub fn collection(entity: EntityType) -> Self {
        Self::Collection(ChangeNotification { entity })
    }

    pub fn single(entity: EntityType, action: ChangeAction, entity_id: impl Into<RowId>) -> Self {
        Self::Single(SingleChangeNotification {
            entity,
            action,
            entity_id: entity_id.into(),
        })
    }

    pub fn entity(&self) -> EntityType {
        match self {
            Self::Collection(n) => n.entity,
            Self::Single(n) => n.entity,
        }
    }
}

/// An event as delivered by the push transport, before parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "event")]
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}
