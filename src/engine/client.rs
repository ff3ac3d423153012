use std::marker::PhantomData;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use http::{Method, StatusCode};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::types::BackendConfig;
use crate::error::{EngineError, EngineResult};
use crate::table::ActionHandler;
use crate::types::{DataResult, Entity, EntityType, QueryParams, RowId};

use super::interface::{DetailLoader, QueryBackend};

/// Environment variable consulted when the config carries no token.
pub const TOKEN_ENV: &str = "EV_BOARD_TOKEN";

const USER_AGENT_VALUE: &str = concat!("ev-board/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the back-office REST API.
///
/// Cheap to clone: the underlying `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            token: resolve_token(config),
        })
    }

    fn url(&self, path: &str) -> EngineResult<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| EngineError::Unexpected(format!("invalid URL {raw:?}: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// `GET {path}?{filters}&Limit=..&Skip=..&SortFields=..&SortDirs=..`
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> EngineResult<DataResult<T>> {
        let mut url = self.url(path)?;
        url.query_pairs_mut().extend_pairs(params.to_pairs());
        tracing::debug!("backend: GET {url}");
        let response = check_status(self.request(Method::GET, url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// `GET {path}/{id}`
    pub async fn get_one<D: DeserializeOwned>(&self, path: &str, id: &RowId) -> EngineResult<D> {
        let url = self.url(&format!("{}/{id}", path.trim_end_matches('/')))?;
        tracing::debug!("backend: GET {url}");
        let response = check_status(self.request(Method::GET, url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// `DELETE {path}/{id}`
    pub async fn delete(&self, path: &str, id: &RowId) -> EngineResult<()> {
        let url = self.url(&format!("{}/{id}", path.trim_end_matches('/')))?;
        tracing::debug!("backend: DELETE {url}");
        check_status(self.request(Method::DELETE, url).send().await?).await?;
        Ok(())
    }

    /// `PUT {path}/{id}/{verb}`, e.g. `charging-stations/CS-1/reset`.
    pub async fn put_verb(&self, path: &str, id: &RowId, verb: &str) -> EngineResult<()> {
        let url = self.url(&format!("{}/{id}/{verb}", path.trim_end_matches('/')))?;
        tracing::debug!("backend: PUT {url}");
        check_status(self.request(Method::PUT, url).send().await?).await?;
        Ok(())
    }
}

/// Resolve the bearer token.
///
/// Priority:
/// 1. `token` in the `[backend]` config section
/// 2. `EV_BOARD_TOKEN` environment variable
fn resolve_token(config: &BackendConfig) -> Option<String> {
    if let Some(token) = config.token.as_ref().filter(|t| !t.is_empty()) {
        return Some(token.clone());
    }
    std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_code: Option<u16>,
    message: Option<String>,
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: Response) -> EngineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(EngineError::AuthExpired);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            error_code: Some(code),
            message,
        }) => Err(EngineError::Domain {
            code,
            message: message.unwrap_or_else(|| status.to_string()),
        }),
        _ => Err(EngineError::Network(format!("HTTP {status}"))),
    }
}

// ---------------------------------------------------------------------------
// Seam implementations
// ---------------------------------------------------------------------------

/// Paged query against one REST collection endpoint.
pub struct HttpQuery<T> {
    client: BackendClient,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HttpQuery<T> {
    pub fn new(client: BackendClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T> QueryBackend<T> for HttpQuery<T>
where
    T: Entity + DeserializeOwned,
{
    async fn query(&self, params: &QueryParams) -> EngineResult<DataResult<T>> {
        self.client.get_page(&self.path, params).await
    }
}

/// Detail payload fetched from `{path}/{id}`.
pub struct HttpDetails<T> {
    client: BackendClient,
    path: String,
    patchable: Vec<EntityType>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HttpDetails<T> {
    pub fn new(client: BackendClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            patchable: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Allow point notifications for `entity` to refresh open panels in place.
    pub fn patching(mut self, entity: EntityType) -> Self {
        self.patchable.push(entity);
        self
    }
}

#[async_trait]
impl<T> DetailLoader<T> for HttpDetails<T>
where
    T: Entity,
    T::Detail: DeserializeOwned,
{
    async fn load_detail(&self, row: &T) -> EngineResult<T::Detail> {
        self.client.get_one(&self.path, &row.row_id()).await
    }

    fn supports_patch(&self, entity: EntityType) -> bool {
        self.patchable.contains(&entity)
    }
}

/// Deletes every targeted row, stopping at the first failure.
pub struct DeleteAction {
    client: BackendClient,
    path: String,
}

impl DeleteAction {
    pub fn new(client: BackendClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

#[async_trait]
impl<T: Entity> ActionHandler<T> for DeleteAction {
    async fn execute(&self, rows: &[T]) -> EngineResult<String> {
        for row in rows {
            self.client.delete(&self.path, &row.row_id()).await?;
        }
        Ok(match rows.len() {
            1 => "1 item deleted".to_owned(),
            n => format!("{n} items deleted"),
        })
    }
}

/// Applies a remote command (`PUT {path}/{id}/{verb}`) to every targeted row.
pub struct VerbAction {
    client: BackendClient,
    path: String,
    verb: String,
}

impl VerbAction {
    pub fn new(client: BackendClient, path: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            verb: verb.into(),
        }
    }
}

#[async_trait]
impl<T: Entity> ActionHandler<T> for VerbAction {
    async fn execute(&self, rows: &[T]) -> EngineResult<String> {
        for row in rows {
            self.client.put_verb(&self.path, &row.row_id(), &self.verb).await?;
        }
        Ok(format!("{} applied to {} item(s)", self.verb, rows.len()))
    }
}
