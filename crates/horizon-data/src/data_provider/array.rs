//! Data provider over an in-memory array.

use std::cmp::Ordering;
use std::ops::Deref;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;

use super::{DataProvider, DataProviderConfig, FetchParams, Sort, SortDirection};
use crate::collection::Collection;

/// A [`DataProvider`] whose query pages through an in-memory list of raw
/// records, sorted by the requested [`Sort`] and reporting the list length
/// as the total.
#[derive(Debug, Clone)]
pub struct ArrayDataProvider {
    provider: DataProvider,
    all_models: Arc<RwLock<Vec<JsonValue>>>,
}

impl ArrayDataProvider {
    /// Serve `all_models` into `collection`.
    pub fn new(collection: Collection, all_models: Vec<JsonValue>, config: DataProviderConfig) -> Self {
        let all_models = Arc::new(RwLock::new(all_models));
        let source = all_models.clone();
        let provider = DataProvider::new(collection, config).with_query(move |params| {
            let page = Self::page(&source.read(), &params);
            async move { Ok(page) }.boxed()
        });
        Self { provider, all_models }
    }

    /// Snapshot of the unpaginated records.
    pub fn all_models(&self) -> Vec<JsonValue> {
        self.all_models.read().clone()
    }

    /// Replace the unpaginated records and invalidate the fetch state.
    pub fn set_all_models(&self, all_models: Vec<JsonValue>) {
        *self.all_models.write() = all_models;
        self.provider.refresh();
    }

    fn page(all_models: &[JsonValue], params: &FetchParams) -> JsonValue {
        let mut models = all_models.to_vec();
        if let Some(sort) = params.sort.as_ref().filter(|s| !s.is_empty()) {
            models.sort_by(|a, b| compare_by(sort, a, b));
        }
        let total_count = models.len();
        let offset = params.offset().min(total_count);
        let end = params.limit().map_or(total_count, |limit| offset.saturating_add(limit).min(total_count));
        serde_json::json!({
            "totalCount": total_count,
            "models": models[offset..end].to_vec(),
        })
    }
}

fn compare_by(sort: &Sort, a: &JsonValue, b: &JsonValue) -> Ordering {
    for order in &sort.orders {
        let (x, y) = (a.get(&order.attribute), b.get(&order.attribute));
        let ordering = match (x, y) {
            (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
            (None | Some(JsonValue::Null), None | Some(JsonValue::Null)) => Ordering::Equal,
            (None | Some(JsonValue::Null), Some(_)) => Ordering::Less,
            (Some(_), None | Some(JsonValue::Null)) => Ordering::Greater,
            (x, y) => x.map(JsonValue::to_string).cmp(&y.map(JsonValue::to_string)),
        };
        let ordering = match order.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl Deref for ArrayDataProvider {
    type Target = DataProvider;

    fn deref(&self) -> &DataProvider {
        &self.provider
    }
}
