use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{Entity, RowId};

/// A schemaless backend record, used by screens that are configured rather
/// than compiled (the CLI mounts every screen with this type).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Display text for a field: strings unquoted, `null`/missing empty.
    pub fn text(&self, field: &str) -> String {
        match self.0.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn flag(&self, field: &str) -> bool {
        self.0.get(field).and_then(Value::as_bool).unwrap_or(false)
    }
}

impl Entity for Record {
    type Detail = Value;

    /// Backends send ids as strings or numbers; both are accepted.
    fn row_id(&self) -> RowId {
        match self.0.get("id") {
            Some(Value::String(s)) => RowId::new(s.clone()),
            Some(Value::Number(n)) => RowId::new(n.to_string()),
            _ => RowId::new(String::new()),
        }
    }
}
