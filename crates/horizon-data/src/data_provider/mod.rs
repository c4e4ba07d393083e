//! Collections that fill themselves from an asynchronous query.
//!
//! A [`DataProvider`] wraps a [`Collection`] and adds fetch-on-demand with
//! pagination and sort hooks. At most one query runs at a time: callers that
//! ask for data while a fetch is in flight wait for that fetch and all
//! receive its result.
//!
//! # Example
//!
//! ```
//! use horizon_data::collection::{Collection, CollectionConfig};
//! use horizon_data::data_provider::{DataProvider, DataProviderConfig};
//! use horizon_data::schema::ModelSchema;
//! use futures_util::FutureExt;
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let schema = ModelSchema::builder("Article").attributes(["id", "title"]).primary_key(["id"]).build().unwrap();
//! let articles = Collection::new(CollectionConfig::with_schema(schema));
//! let provider = articles
//!     .create_data_provider(DataProviderConfig::default())
//!     .with_query(|_params| {
//!         async { Ok(json!({"totalCount": 1, "models": [{"id": 1, "title": "first"}]})) }.boxed()
//!     });
//!
//! provider.fetch(json!({}), false).await.unwrap();
//! assert_eq!(provider.len(), 1);
//! assert!(provider.is_fetched());
//! assert_eq!(provider.fetch(json!({}), false).await.unwrap(), None);
//! # });
//! ```

mod array;
mod pagination;

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use horizon_data_core::logging::{span_names, targets};
use horizon_data_core::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::collection::Collection;

pub use array::ArrayDataProvider;
pub use pagination::{DEFAULT_PAGE_SIZE, Pagination, Sort, SortDirection, SortOrder};

/// How fetched records are applied to the collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Upsert fetched records, keep everything else.
    #[default]
    Merge,
    /// Upsert fetched records and remove the ones not fetched.
    Set,
    /// Keep matching records untouched, add new ones, remove the rest.
    Reset,
}

/// Data provider configuration.
///
/// Deserializes from camelCase JSON:
///
/// ```
/// use horizon_data::data_provider::{DataProviderConfig, FetchMode};
///
/// let config: DataProviderConfig =
///     serde_json::from_str(r#"{"fetchMode": "reset", "pagination": {"pageSize": 10}}"#).unwrap();
/// assert_eq!(config.fetch_mode, FetchMode::Reset);
/// assert_eq!(config.pagination.map(|p| p.page_size), Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataProviderConfig {
    /// Identifies the provider among several on one screen.
    pub id: Option<String>,
    /// How fetched records are applied.
    pub fetch_mode: FetchMode,
    /// Page window; `None` disables pagination.
    pub pagination: Option<Pagination>,
    /// Sort definition forwarded to the query.
    pub sort: Option<Sort>,
}

impl Default for DataProviderConfig {
    fn default() -> Self {
        Self {
            id: None,
            fetch_mode: FetchMode::default(),
            pagination: Some(Pagination::default()),
            sort: None,
        }
    }
}

impl DataProviderConfig {
    /// Set the provider id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the fetch mode.
    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    /// Set (or with `None`, disable) pagination.
    pub fn with_pagination(mut self, pagination: Option<Pagination>) -> Self {
        self.pagination = pagination;
        self
    }

    /// Set the sort definition.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// What a query is asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParams {
    /// Caller-supplied parameters, passed through untouched.
    pub data: JsonValue,
    /// The page to load, `None` for everything.
    pub pagination: Option<Pagination>,
    /// Requested order.
    pub sort: Option<Sort>,
}

impl FetchParams {
    /// Index of the first requested record.
    pub fn offset(&self) -> usize {
        self.pagination.map_or(0, |p| p.offset())
    }

    /// Maximum number of requested records.
    pub fn limit(&self) -> Option<usize> {
        self.pagination.and_then(|p| p.limit())
    }
}

/// A validated query result.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Number of records available on the server side.
    pub total_count: usize,
    /// Raw records of the requested page.
    pub models: Vec<JsonValue>,
}

impl FetchResponse {
    /// Validate the `{"totalCount": n, "models": [...]}` shape.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] naming the offending part.
    pub fn from_json(data: &JsonValue) -> Result<Self> {
        let JsonValue::Object(map) = data else {
            return Err(Error::invalid_param("Result data is not object in DataProvider.fetch()."));
        };
        let total_count = map
            .get("totalCount")
            .and_then(JsonValue::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                Error::invalid_param("Result param \"totalCount\" must be number in DataProvider.fetch().")
            })?;
        let models = map
            .get("models")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| Error::invalid_param("Result param \"models\" must be array in DataProvider.fetch()."))?;
        Ok(Self {
            total_count,
            models: models.clone(),
        })
    }
}

/// The asynchronous data source of a provider.
pub type QueryFn = Arc<dyn Fn(FetchParams) -> BoxFuture<'static, Result<JsonValue>> + Send + Sync>;

type Waiter = oneshot::Sender<Result<FetchResponse>>;

#[derive(Default)]
struct ProviderState {
    pagination: Option<Pagination>,
    sort: Option<Sort>,
    total_count: Option<usize>,
    /// Page windows already loaded (`None` is the unpaginated window).
    fetched: HashSet<Option<Pagination>>,
    /// `Some` while a fetch is in flight; holds the callers waiting on it.
    waiters: Option<Vec<Waiter>>,
}

struct ProviderInner {
    id: Option<String>,
    fetch_mode: FetchMode,
    query: Option<QueryFn>,
    state: Mutex<ProviderState>,
}

/// A collection with asynchronous fetch-on-demand.
///
/// Dereferences to the wrapped [`Collection`]. Cloning the handle is cheap;
/// clones share fetch state.
#[derive(Clone)]
pub struct DataProvider {
    collection: Collection,
    inner: Arc<ProviderInner>,
}

impl Deref for DataProvider {
    type Target = Collection;

    fn deref(&self) -> &Collection {
        &self.collection
    }
}

impl fmt::Debug for DataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProvider")
            .field("id", &self.inner.id)
            .field("collection", &self.collection.label())
            .field("fetch_mode", &self.inner.fetch_mode)
            .field("has_query", &self.inner.query.is_some())
            .finish()
    }
}

/// Marks the fetch in flight. Dropping it unfinished (the fetching future
/// was cancelled) fails every waiting caller with [`Error::FetchInterrupted`].
struct InFlight<'a> {
    inner: &'a ProviderInner,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self, result: &Result<FetchResponse>) {
        self.finished = true;
        let waiters = self.inner.state.lock().waiters.take().unwrap_or_default();
        if !waiters.is_empty() {
            tracing::debug!(target: targets::DATA_PROVIDER, waiters = waiters.len(), "resolving coalesced fetches");
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let waiters = self.inner.state.lock().waiters.take().unwrap_or_default();
        tracing::debug!(target: targets::DATA_PROVIDER, waiters = waiters.len(), "fetch interrupted");
        for waiter in waiters {
            let _ = waiter.send(Err(Error::FetchInterrupted));
        }
    }
}

impl DataProvider {
    /// Wrap `collection`. Without a query (see
    /// [`with_query`](Self::with_query)) every fetch fails.
    pub fn new(collection: Collection, config: DataProviderConfig) -> Self {
        Self::build(collection, config, None)
    }

    fn build(collection: Collection, config: DataProviderConfig, query: Option<QueryFn>) -> Self {
        Self {
            collection,
            inner: Arc::new(ProviderInner {
                id: config.id,
                fetch_mode: config.fetch_mode,
                query,
                state: Mutex::new(ProviderState {
                    pagination: config.pagination,
                    sort: config.sort,
                    ..ProviderState::default()
                }),
            }),
        }
    }

    /// Install the query. Returns a new provider handle; fetch state starts
    /// empty.
    pub fn with_query<F>(self, query: F) -> Self
    where
        F: Fn(FetchParams) -> BoxFuture<'static, Result<JsonValue>> + Send + Sync + 'static,
    {
        self.with_query_fn(Arc::new(query))
    }

    /// Install an already shared query.
    pub fn with_query_fn(self, query: QueryFn) -> Self {
        let config = self.config();
        Self::build(self.collection, config, Some(query))
    }

    /// Current configuration.
    pub fn config(&self) -> DataProviderConfig {
        let state = self.inner.state.lock();
        DataProviderConfig {
            id: self.inner.id.clone(),
            fetch_mode: self.inner.fetch_mode,
            pagination: state.pagination,
            sort: state.sort.clone(),
        }
    }

    /// The provider id.
    pub fn id(&self) -> Option<&str> {
        self.inner.id.as_deref()
    }

    /// The wrapped collection.
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// The fetch mode.
    pub fn fetch_mode(&self) -> FetchMode {
        self.inner.fetch_mode
    }

    /// Load the current page.
    ///
    /// Returns `Ok(None)` without querying when the page was already fetched
    /// and `force` is false. While another fetch is in flight the call waits
    /// for it and returns its result instead of querying again.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] when no query is installed.
    /// - [`Error::InvalidParam`] for a malformed query result.
    /// - [`Error::FetchInterrupted`] when the fetch this call waited on was
    ///   dropped.
    /// - Errors of the query and of applying the records.
    pub async fn fetch(&self, data: JsonValue, force: bool) -> Result<Option<FetchResponse>> {
        let (params, waiter) = {
            let mut state = self.inner.state.lock();
            if !force && state.fetched.contains(&state.pagination) {
                return Ok(None);
            }
            let waiter = match &mut state.waiters {
                Some(waiters) => {
                    let (sender, receiver) = oneshot::channel();
                    waiters.push(sender);
                    Some(receiver)
                }
                None => {
                    state.waiters = Some(Vec::new());
                    None
                }
            };
            let params = FetchParams {
                data,
                pagination: state.pagination,
                sort: state.sort.clone(),
            };
            (params, waiter)
        };

        if let Some(receiver) = waiter {
            tracing::debug!(target: targets::DATA_PROVIDER, provider = ?self.inner.id, "fetch coalesced onto in-flight request");
            let result = receiver.await.map_err(|_| Error::FetchInterrupted)?;
            return result.map(Some);
        }

        let guard = InFlight {
            inner: &self.inner,
            finished: false,
        };
        let span = tracing::debug_span!(target: targets::DATA_PROVIDER, "fetch", operation = span_names::FETCH, provider = ?self.inner.id);
        let result = self.run_query(params).instrument(span).await;
        guard.finish(&result);
        result.map(Some)
    }

    async fn run_query(&self, params: FetchParams) -> Result<FetchResponse> {
        let query = self.inner.query.clone().ok_or_else(|| {
            tracing::error!(target: targets::DATA_PROVIDER, provider = ?self.inner.id, "no query configured");
            Error::invalid_config("Wrong query format in DataProvider.")
        })?;
        let window = params.pagination;
        tracing::debug!(target: targets::DATA_PROVIDER, offset = params.offset(), limit = ?params.limit(), "querying");

        let data = query(params).await?;
        let response = FetchResponse::from_json(&data)?;
        self.set_total_count(Some(response.total_count));

        let models = JsonValue::Array(response.models.clone());
        match self.inner.fetch_mode {
            FetchMode::Merge => {
                self.collection.merge(models)?;
            }
            FetchMode::Set => {
                self.collection.set(models)?;
            }
            FetchMode::Reset => {
                self.collection.reset(models)?;
            }
        }

        self.inner.state.lock().fetched.insert(window);
        tracing::debug!(
            target: targets::DATA_PROVIDER,
            total_count = response.total_count,
            received = response.models.len(),
            "fetch complete"
        );
        Ok(response)
    }

    /// Whether the current page was fetched.
    pub fn is_fetched(&self) -> bool {
        let state = self.inner.state.lock();
        state.fetched.contains(&state.pagination)
    }

    /// Whether a fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        self.inner.state.lock().waiters.is_some()
    }

    /// Total number of records: the collection length when pagination is
    /// disabled, otherwise the last reported total (the collection length
    /// until something was reported).
    pub fn total_count(&self) -> usize {
        let cached = {
            let state = self.inner.state.lock();
            state.pagination.and(state.total_count)
        };
        cached.unwrap_or_else(|| self.collection.len())
    }

    /// Override the cached total.
    pub fn set_total_count(&self, total_count: Option<usize>) {
        self.inner.state.lock().total_count = total_count;
    }

    /// Forget which pages were fetched and the cached total, so the next
    /// fetch queries again. Records already loaded stay.
    pub fn refresh(&self) {
        let mut state = self.inner.state.lock();
        state.fetched.clear();
        state.total_count = None;
        tracing::debug!(target: targets::DATA_PROVIDER, provider = ?self.inner.id, "fetch state invalidated");
    }

    /// The page window, `None` when pagination is disabled.
    pub fn pagination(&self) -> Option<Pagination> {
        self.inner.state.lock().pagination
    }

    /// Replace (or with `None`, disable) the page window.
    pub fn set_pagination(&self, pagination: Option<Pagination>) {
        self.inner.state.lock().pagination = pagination;
    }

    /// Move to `page`, enabling default pagination if it was disabled.
    pub fn set_page(&self, page: usize) {
        let mut state = self.inner.state.lock();
        state.pagination.get_or_insert_with(Pagination::default).set_page(page);
    }

    /// Number of pages for the current total.
    pub fn page_count(&self) -> usize {
        let total = self.total_count();
        self.pagination().map_or(1, |p| p.page_count(total))
    }

    /// The sort definition forwarded to queries.
    pub fn sort_order(&self) -> Option<Sort> {
        self.inner.state.lock().sort.clone()
    }

    /// Replace (or with `None`, disable) the sort definition. Pages fetched
    /// under the previous sort count as not fetched.
    pub fn set_sort_order(&self, sort: Option<Sort>) {
        let mut state = self.inner.state.lock();
        if state.sort != sort {
            state.sort = sort;
            state.fetched.clear();
        }
    }
}

static_assertions::assert_impl_all!(DataProvider: Send, Sync);

impl Collection {
    /// Create a data provider filling this collection.
    pub fn create_data_provider(&self, config: DataProviderConfig) -> DataProvider {
        DataProvider::new(self.clone(), config)
    }
}
