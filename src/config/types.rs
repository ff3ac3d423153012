use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::table::TableOptions;
use crate::types::{DEFAULT_PAGE_SIZE, EntityType, FilterValue, Sorting};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub defaults: Defaults,
    #[serde(rename = "screens")]
    pub screens: Vec<ScreenSection>,
}

impl AppConfig {
    /// Look a screen up by title, ignoring case.
    pub fn screen(&self, title: &str) -> Option<&ScreenSection> {
        self.screens
            .iter()
            .find(|s| s.title.eq_ignore_ascii_case(title))
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Root of the REST API; screen endpoints are relative to it.
    pub base_url: String,
    /// Bearer token. Falls back to `$EV_BOARD_TOKEN` when absent.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1/api".to_owned(),
            token: None,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub page_size: u32,
    /// Background reload period; 0 disables polling.
    pub poll_interval_secs: u64,
    pub search_debounce_ms: u64,
    pub notification_coalesce_ms: u64,
    pub report_silent_errors: bool,
    pub detail_cache_ttl_minutes: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval_secs: 0,
            search_debounce_ms: 300,
            notification_coalesce_ms: 500,
            report_silent_errors: false,
            detail_cache_ttl_minutes: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Screens
// ---------------------------------------------------------------------------

/// One list screen served by a REST collection endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenSection {
    pub title: String,
    /// Collection path relative to `backend.base_url`, e.g. `"charging-stations"`.
    pub endpoint: String,
    /// Entity type listed by the screen; its topic is subscribed by default.
    pub entity: Option<EntityType>,
    /// Extra topics; replaces the entity topic when non-empty.
    #[serde(default)]
    pub topics: Vec<EntityType>,
    pub page_size: Option<u32>,
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub static_filters: IndexMap<String, FilterValue>,
    /// Initial sort, `"field"` or `"field:desc"`.
    pub sort: Option<String>,
    /// Remote commands offered on every row, sent as `PUT {endpoint}/{id}/{verb}`.
    #[serde(default)]
    pub verbs: Vec<String>,
}

impl ScreenSection {
    pub fn topics(&self) -> Vec<EntityType> {
        if self.topics.is_empty() {
            self.entity.into_iter().collect()
        } else {
            self.topics.clone()
        }
    }

    pub fn sorting(&self) -> Result<Option<Sorting>, String> {
        self.sort.as_deref().map(str::parse).transpose()
    }

    /// Table options for this screen, falling back to `defaults` for
    /// anything the screen does not override.
    pub fn table_options(&self, defaults: &Defaults) -> TableOptions {
        let poll_secs = self.poll_interval_secs.unwrap_or(defaults.poll_interval_secs);
        TableOptions {
            page_size: self.page_size.unwrap_or(defaults.page_size).max(1),
            poll_interval: (poll_secs > 0).then(|| Duration::from_secs(poll_secs)),
            search_debounce: Duration::from_millis(defaults.search_debounce_ms),
            coalesce_window: Duration::from_millis(defaults.notification_coalesce_ms),
            report_silent_errors: defaults.report_silent_errors,
            detail_cache_ttl: Duration::from_secs(defaults.detail_cache_ttl_minutes * 60),
            topics: self.topics(),
            ..TableOptions::default()
        }
    }
}
