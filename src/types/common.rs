use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Query key carrying the free-text search string.
pub const SEARCH_KEY: &str = "Search";

/// Page size used when neither the screen nor the defaults specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

// ---------------------------------------------------------------------------
// Row identity
// ---------------------------------------------------------------------------

/// Stable identifier of a row, as assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An application record the engine can page through.
///
/// `Detail` is the payload fetched lazily when a row is expanded.
pub trait Entity: Clone + Send + Sync + 'static {
    type Detail: Clone + Send + Sync + 'static;

    fn row_id(&self) -> RowId;
}

// ---------------------------------------------------------------------------
// Sorting / paging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sorting {
    pub field: String,
    pub direction: SortDirection,
}

impl Sorting {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Parse `"field"` or `"field:desc"`.
impl FromStr for Sorting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.split_once(':') {
            Some((field, dir)) => (field, dir.parse()?),
            None => (s, SortDirection::Asc),
        };
        if field.is_empty() {
            return Err("empty sort field".to_owned());
        }
        Ok(Self::new(field, direction))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Paging {
    pub limit: u32,
    pub skip: u64,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Filter values
// ---------------------------------------------------------------------------

/// Current value of a filter.
///
/// Scalar filters hold `Single`/`Date`, multi-valued filters hold `Multiple`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    #[default]
    Unset,
    Date(DateTime<Utc>),
    Single(String),
    Multiple(BTreeSet<String>),
}

impl FilterValue {
    pub fn single(value: impl Into<String>) -> Self {
        Self::Single(value.into())
    }

    pub fn multiple<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Multiple(values.into_iter().map(Into::into).collect())
    }

    pub fn is_set(&self) -> bool {
        self.to_query_value().is_some()
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Multiple(_))
    }

    /// Whether this value has the shape a filter accepts: sets for
    /// multi-valued filters, scalars otherwise. `Unset` always fits.
    pub fn fits(&self, multiple: bool) -> bool {
        match self {
            Self::Unset => true,
            Self::Multiple(_) => multiple,
            Self::Single(_) | Self::Date(_) => !multiple,
        }
    }

    /// Render the value the way the backend expects it in a query string.
    ///
    /// Empty strings and empty sets count as unset. Sets are joined with `|`.
    pub fn to_query_value(&self) -> Option<String> {
        match self {
            Self::Unset => None,
            Self::Single(s) if s.is_empty() => None,
            Self::Single(s) => Some(s.clone()),
            Self::Multiple(set) if set.is_empty() => None,
            Self::Multiple(set) => Some(set.iter().map(String::as_str).collect::<Vec<_>>().join("|")),
            Self::Date(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote query shape
// ---------------------------------------------------------------------------

/// Flattened parameters of one outbound paged query.
///
/// Two loads with equal `QueryParams` are the same request and are coalesced.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QueryParams {
    pub filters: IndexMap<String, String>,
    pub paging: Paging,
    pub sorting: Vec<Sorting>,
}

impl QueryParams {
    pub fn search(&self) -> Option<&str> {
        self.filters.get(SEARCH_KEY).map(String::as_str)
    }

    /// Key/value pairs in wire order: filters, `Limit`, `Skip`, then the
    /// parallel `SortFields`/`SortDirs` arrays as repeated keys.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.push(("Limit".to_owned(), self.paging.limit.to_string()));
        pairs.push(("Skip".to_owned(), self.paging.skip.to_string()));
        for sort in &self.sorting {
            pairs.push(("SortFields".to_owned(), sort.field.clone()));
        }
        for sort in &self.sorting {
            pairs.push(("SortDirs".to_owned(), sort.direction.as_str().to_owned()));
        }
        pairs
    }
}

/// One page as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResult<T> {
    #[serde(default)]
    pub count: u64,
    pub result: Vec<T>,
}

impl<T> Default for DataResult<T> {
    fn default() -> Self {
        Self {
            count: 0,
            result: Vec::new(),
        }
    }
}
