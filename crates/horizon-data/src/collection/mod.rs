//! Observable, identity-deduplicated collections.
//!
//! A [`Collection`] is an ordered list of [`Entry`] items: model records, or
//! raw values when coercion is disabled. Entries are matched by identity (see
//! [`IdentityKey`]), so removing `{"id": 5}` removes the record whose primary
//! key is 5 and upserting `{"id": 5, ...}` merges into it.
//!
//! Collections form trees. A child created with [`Collection::create_child`]
//! is a live, filtered projection of its parent: mutations on a child are
//! forwarded to the root, and every change the root commits is pushed down
//! through the tree. Observers see one batch of notifications per external
//! call at every level.
//!
//! # Example
//!
//! ```
//! use horizon_data::collection::{Collection, CollectionConfig, Filter};
//! use horizon_data::schema::ModelSchema;
//! use serde_json::json;
//!
//! let schema = ModelSchema::builder("Article").attributes(["id", "title"]).primary_key(["id"]).build().unwrap();
//! let articles = Collection::new(CollectionConfig::with_schema(schema));
//! articles
//!     .add(json!([{"id": 55, "title": "aaa bbb"}, {"id": 66, "title": "bbb ccc"}, {"id": 77, "title": "ccc"}]), None)
//!     .unwrap();
//!
//! let bbb = articles
//!     .create_child(Some(Filter::predicate(|entry| {
//!         entry.attribute("title").and_then(|t| t.as_str().map(|t| t.contains("bbb"))).unwrap_or(false)
//!     })))
//!     .unwrap();
//! assert_eq!(bbb.len(), 2);
//!
//! bbb.remove(json!({"id": 66})).unwrap();
//! assert_eq!(articles.len(), 2);
//! assert_eq!(bbb.len(), 1);
//! ```

mod array;
mod change;
mod config;
mod events;
mod filter;
mod proxy;
mod relay;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use horizon_data_core::logging::targets;
use horizon_data_core::{AttributePath, Error, EventBus, PathSegment, Result};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use slotmap::{SlotMap, new_key_type};

use crate::identity::{self, IdentityKey};
use crate::model::{self, ChangeEvent, Model, ModelId};
use crate::value::{Entry, IntoEntries, Value};

pub use change::CollectionEditScope;
pub use config::{CollectionConfig, ModelClass, MovePolicy};
pub use events::{CollectionEvent, CollectionSignals, EntryChange};
pub use filter::{Condition, ConditionFilterBuilder, Filter, FilterBuilder, FilterFn};
pub use proxy::{CollectionAdapter, CollectionProxy};

use filter::ActiveFilter;
use relay::Relay;

new_key_type! {
    /// Handle of a child collection inside its parent.
    pub struct ChildKey;
}

static NEXT_COLLECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(u64);

impl CollectionId {
    fn next() -> Self {
        Self(NEXT_COLLECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ParentLink {
    collection: Weak<CollectionInner>,
    key: ChildKey,
}

#[derive(Default)]
struct CollectionState {
    entries: Vec<Entry>,
    /// Records with a primary key, by stringified key. Several records may
    /// share a key after non-unique adds.
    by_id: HashMap<String, Vec<Model>>,
    filter: Option<ActiveFilter>,
    children: SlotMap<ChildKey, Collection>,
    relays: HashMap<ModelId, Relay>,
    edit_level: usize,
    pending: CollectionEvent,
}

impl CollectionState {
    fn position(&self, entry: &Entry) -> Option<usize> {
        self.entries.iter().position(|e| e == entry)
    }

    /// Current entries that `item` identifies: the same record instance if it
    /// is a member, otherwise every entry with the same identity key.
    fn matches(&self, item: &Entry, primary_key: &[String]) -> Vec<Entry> {
        if let Entry::Record(model) = item {
            if let Some(found) = self.entries.iter().find(|e| e.as_model().is_some_and(|m| m.ptr_eq(model))) {
                return vec![found.clone()];
            }
        }

        let key = identity::key_for_entry(primary_key, item);
        if let IdentityKey::Key(k) = &key {
            if let Some(models) = self.by_id.get(k).filter(|models| !models.is_empty()) {
                return models.iter().cloned().map(Entry::Record).collect();
            }
        }
        self.entries
            .iter()
            .filter(|e| identity::key_for_entry(primary_key, e) == key)
            .cloned()
            .collect()
    }

    fn insert(&mut self, index: usize, entry: Entry) -> usize {
        let index = index.min(self.entries.len());
        if let Entry::Record(model) = &entry {
            if let IdentityKey::Key(key) = model.identity() {
                self.by_id.entry(key).or_default().push(model.clone());
            }
        }
        self.entries.insert(index, entry);
        index
    }

    fn remove_at(&mut self, index: usize) -> Entry {
        let entry = self.entries.remove(index);
        if let Entry::Record(model) = &entry {
            let still_member = self.entries.iter().any(|e| e.as_model().is_some_and(|m| m.ptr_eq(model)));
            self.by_id.retain(|_, models| {
                if !still_member {
                    models.retain(|m| !m.ptr_eq(model));
                } else if let Some(position) = models.iter().position(|m| m.ptr_eq(model)) {
                    models.remove(position);
                }
                !models.is_empty()
            });
        }
        entry
    }
}

pub(crate) struct CollectionInner {
    id: CollectionId,
    config: CollectionConfig,
    parent: Mutex<Option<ParentLink>>,
    state: Mutex<CollectionState>,
    signals: CollectionSignals,
    attribute_bus: EventBus<AttributePath, ChangeEvent>,
    emit_depth: AtomicUsize,
}

impl Drop for CollectionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (_, relay) in state.relays.drain() {
            relay.detach();
        }
        if let Some(mut filter) = state.filter.take() {
            filter.unsubscribe();
        }
    }
}

/// Shared handle to an observable collection.
///
/// Cloning the handle is cheap; all clones refer to the same collection.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    /// Create an empty root collection.
    pub fn new(config: CollectionConfig) -> Self {
        Self::build(config, None, 0)
    }

    /// Create a root collection holding `models`.
    ///
    /// # Errors
    ///
    /// Every error of [`add`](Self::add).
    pub fn with_entries(config: CollectionConfig, models: impl IntoEntries) -> Result<Self> {
        let collection = Self::new(config);
        collection.add(models, None)?;
        Ok(collection)
    }

    fn build(config: CollectionConfig, parent: Option<ParentLink>, edit_level: usize) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                id: CollectionId::next(),
                config,
                parent: Mutex::new(parent),
                state: Mutex::new(CollectionState {
                    edit_level,
                    ..CollectionState::default()
                }),
                signals: CollectionSignals::new(),
                attribute_bus: EventBus::new(),
                emit_depth: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<CollectionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<CollectionInner>) -> Option<Collection> {
        weak.upgrade().map(|inner| Collection { inner })
    }

    /// The instance id.
    pub fn id(&self) -> CollectionId {
        self.inner.id
    }

    /// The configuration this collection was created with.
    pub fn config(&self) -> &CollectionConfig {
        &self.inner.config
    }

    /// Name used in diagnostics: the configured name, or the id.
    pub fn label(&self) -> String {
        match &self.inner.config.name {
            Some(name) => format!("{name}{}", self.inner.id),
            None => format!("Collection{}", self.inner.id),
        }
    }

    /// Membership and member-change signals.
    pub fn signals(&self) -> &CollectionSignals {
        &self.inner.signals
    }

    /// Whether both handles refer to the same collection.
    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn primary_key(&self) -> &[String] {
        self.inner.config.model_class.primary_key()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry at `index`; negative indices count from the end and clamp to
    /// the first entry.
    pub fn at(&self, index: isize) -> Option<Entry> {
        let state = self.inner.state.lock();
        let index = if index < 0 {
            state.entries.len().saturating_sub(index.unsigned_abs())
        } else {
            index.unsigned_abs()
        };
        state.entries.get(index).cloned()
    }

    /// Record at `index`, if that entry is a record.
    pub fn model_at(&self, index: usize) -> Option<Model> {
        self.inner.state.lock().entries.get(index).and_then(|e| e.as_model().cloned())
    }

    /// Snapshot of every entry, in order.
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.state.lock().entries.clone()
    }

    /// Snapshot of every entry (alias of [`entries`](Self::entries)).
    pub fn get_models(&self) -> Vec<Entry> {
        self.entries()
    }

    /// Snapshot of the record entries, in order.
    pub fn models(&self) -> Vec<Model> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .filter_map(|e| e.as_model().cloned())
            .collect()
    }

    /// First record whose primary key is `key` (a scalar for single keys,
    /// an object for composite ones).
    pub fn get_by_id(&self, key: &JsonValue) -> Option<Model> {
        self.get_all_by_id(key).into_iter().next()
    }

    /// Every record whose primary key is `key`.
    pub fn get_all_by_id(&self, key: &JsonValue) -> Vec<Model> {
        let key = identity::key_for_data(self.primary_key(), key);
        let state = self.inner.state.lock();
        key.as_key()
            .and_then(|k| state.by_id.get(k))
            .cloned()
            .unwrap_or_default()
    }

    /// Identity keys of every entry, in order.
    pub fn keys(&self) -> Vec<IdentityKey> {
        let state = self.inner.state.lock();
        state
            .entries
            .iter()
            .map(|e| identity::key_for_entry(self.primary_key(), e))
            .collect()
    }

    /// Position of `entry` (records by instance, raw values by value).
    pub fn index_of(&self, entry: &Entry) -> Option<usize> {
        self.inner.state.lock().position(entry)
    }

    /// Serialize every entry.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.entries().iter().map(Entry::to_json).collect())
    }

    /// Read by collection path: `"[0]"`, `"[0].name"`, or a primary key
    /// followed by a path (`"288.name"`). Missing entries read as `None`.
    pub fn get_path(&self, path: &str) -> Result<Option<Value>> {
        let path = AttributePath::parse(path)?;
        match self.get_at(&path) {
            Err(e) if e.is_unknown_property() => Ok(None),
            other => other,
        }
    }

    /// Read by parsed collection path.
    pub fn get_at(&self, path: &AttributePath) -> Result<Option<Value>> {
        let Some((head, rest)) = path.split_first() else {
            return Err(Error::invalid_param("Empty collection path"));
        };
        let entry = match head {
            PathSegment::Index(index) => self.inner.state.lock().entries.get(*index).cloned(),
            PathSegment::Name(key) => self.get_by_id(&JsonValue::String(key.clone())).map(Entry::Record),
        };
        let Some(entry) = entry else {
            return Ok(None);
        };

        match entry {
            Entry::Record(model) if rest.is_empty() => Ok(Some(Value::Model(model))),
            Entry::Record(model) => model.get_at(&rest),
            Entry::Scalar(value) if rest.is_empty() => Ok(Some(Value::Json(value))),
            Entry::Scalar(value) => Ok(model::json_descend(&value, &rest).map(Value::Json)),
        }
    }

    /// Write through a member: `"[3].name"` sets `name` on the fourth entry;
    /// `"[3]"` merges a JSON object into it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] when the index is out of range or the entry is
    /// not a record, plus every error of [`Model::set`].
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let path = AttributePath::parse(path)?;
        self.set_at(&path, value.into())
    }

    /// Write through a member by parsed path.
    pub fn set_at(&self, path: &AttributePath, value: Value) -> Result<bool> {
        let Some((PathSegment::Index(index), rest)) = path.split_first() else {
            return Err(Error::invalid_param(format!(
                "Collection paths must start with an index: `{path}`"
            )));
        };
        let model = self.model_at(*index).ok_or_else(|| {
            Error::invalid_param(format!(
                "Not found model with index `{index}` for set attribute `{rest}`."
            ))
        })?;
        if !rest.is_empty() {
            return model.set_at(&rest, value);
        }
        match value {
            Value::Json(values) => model.set_values(&values),
            other => Err(Error::invalid_param(format!(
                "Entry `[{index}]` can only be merged with an object, got {other:?}"
            ))),
        }
    }

    /// The collection this one is derived from.
    pub fn parent(&self) -> Option<Collection> {
        let parent = self.inner.parent.lock();
        parent.as_ref().and_then(|link| Self::upgrade(&link.collection))
    }

    /// The root of this collection's tree (itself for roots).
    pub fn root(&self) -> Collection {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether this is a derived collection.
    pub fn is_child(&self) -> bool {
        self.inner.parent.lock().is_some()
    }

    /// Derived collections, in creation order.
    pub fn children(&self) -> Vec<Collection> {
        self.inner.state.lock().children.values().cloned().collect()
    }

    /// Turn this child into an independent root holding its current
    /// entries. Its filter is dropped. Does nothing on a root.
    pub fn detach(&self) {
        let Some(link) = self.inner.parent.lock().take() else {
            return;
        };
        if let Some(parent) = Self::upgrade(&link.collection) {
            parent.inner.state.lock().children.remove(link.key);
        }
        let filter = self.inner.state.lock().filter.take();
        if let Some(mut filter) = filter {
            filter.unsubscribe();
        }
        while self.is_editing() {
            self.end_edit();
        }
        tracing::debug!(target: targets::COLLECTION, collection = %self.label(), "detached from parent");
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Collection");
        debug.field("id", &self.inner.id).field("name", &self.inner.config.name);
        match self.inner.state.try_lock() {
            Some(state) => debug
                .field("entries", &state.entries)
                .field("children", &state.children.len())
                .field("filtered", &state.filter.is_some()),
            None => debug.field("entries", &"<locked>"),
        };
        debug.finish()
    }
}

static_assertions::assert_impl_all!(Collection: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use serde_json::json;

    fn articles() -> Collection {
        let schema = ModelSchema::builder("Article")
            .attributes(["id", "title"])
            .primary_key(["id"])
            .build()
            .unwrap();
        Collection::with_entries(
            CollectionConfig::with_schema(schema),
            json!([{"id": 1, "title": "one"}, {"id": 2, "title": "two"}, {"id": 3, "title": "three"}]),
        )
        .unwrap()
    }

    #[test]
    fn test_at_supports_negative_indices() {
        let raw = Collection::with_entries(CollectionConfig::default(), [1i32, 2, 3]).unwrap();
        assert_eq!(raw.at(0), Some(Entry::from(1)));
        assert_eq!(raw.at(-1), Some(Entry::from(3)));
        assert_eq!(raw.at(-10), Some(Entry::from(1)));
        assert_eq!(raw.at(3), None);
    }

    #[test]
    fn test_get_by_id_and_keys() {
        let articles = articles();
        let second = articles.get_by_id(&json!(2)).unwrap();
        assert_eq!(second.get_json("title"), Some(json!("two")));
        assert_eq!(articles.get_by_id(&json!("2")).map(|m| m.id()), Some(second.id()));
        assert!(articles.get_by_id(&json!(9)).is_none());
        assert_eq!(
            articles.keys(),
            vec![IdentityKey::from("1"), IdentityKey::from("2"), IdentityKey::from("3")]
        );
    }

    #[test]
    fn test_paths() {
        let articles = articles();
        assert_eq!(articles.get_path("[1].title").unwrap(), Some(Value::from("two")));
        assert_eq!(articles.get_path("3.title").unwrap(), Some(Value::from("three")));
        assert_eq!(articles.get_path("[7].title").unwrap(), None);

        assert!(articles.set_path("[0].title", "first").unwrap());
        assert_eq!(articles.get_path("[0].title").unwrap(), Some(Value::from("first")));
        assert!(matches!(articles.set_path("[99].title", "x"), Err(Error::InvalidParam(_))));
        assert!(articles.set_path("[2]", json!({"title": "3"})).unwrap());
        assert_eq!(articles.get_path("[2].title").unwrap(), Some(Value::from("3")));
    }

    #[test]
    fn test_raw_entry_paths() {
        let raw = Collection::with_entries(CollectionConfig::raw(), json!([{"a": {"b": [5, 6]}}])).unwrap();
        assert_eq!(raw.get_path("[0].a.b[1]").unwrap(), Some(Value::from(6)));
        assert!(matches!(raw.set_path("[0].a", 1), Err(Error::InvalidParam(_))));
    }

    #[test]
    fn test_to_json() {
        let raw = Collection::with_entries(CollectionConfig::raw(), json!([1, "a", {"x": true}])).unwrap();
        assert_eq!(raw.to_json(), json!([1, "a", {"x": true}]));
    }
}
