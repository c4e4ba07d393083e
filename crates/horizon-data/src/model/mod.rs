//! Observable models with nested addressing and transactions.
//!
//! A [`Model`] is a shared handle to a fixed set of named attributes
//! described by a [`ModelSchema`]. Writes go through [`Model::set`], which
//! accepts dotted/indexed paths into linked sub-models and sub-collections,
//! and are batched into transactions: observers see one notification per
//! committed transaction, never intermediate states.
//!
//! # Events
//!
//! - [`ModelTopic::Change`] fires once per committed transaction.
//! - [`ModelTopic::Attribute`] fires per changed attribute (`change:name`)
//!   and for changes that bubble up from linked sub-models and collections
//!   (`change:user.email`, `change:links[0].url`, `change:links.url`).
//!
//! # Example
//!
//! ```
//! use horizon_data::model::{Model, ModelTopic};
//! use horizon_data::schema::ModelSchema;
//! use serde_json::json;
//!
//! let schema = ModelSchema::builder("User").attributes(["id", "name"]).build().unwrap();
//! let user = Model::new(schema);
//!
//! user.on(ModelTopic::attribute("name"), |event| {
//!     println!("name is now {:?}", event.new_value());
//! })
//! .unwrap();
//!
//! assert!(user.set("name", "Ivan").unwrap());
//! assert!(!user.set("name", "Ivan").unwrap());
//! assert_eq!(user.get_json("name"), Some(json!("Ivan")));
//! ```

mod edit;
mod events;
mod proxy;
mod relation;
mod validation;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use horizon_data_core::logging::targets;
use horizon_data_core::{AttributePath, Error, EventBus, PathSegment, Result, Signal, SubscriptionId};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value as JsonValue};

use crate::collection::{Collection, CollectionConfig};
use crate::identity::{self, IdentityKey};
use crate::reentrancy;
use crate::schema::{AttributeKind, DEFAULT_SCENARIO, ModelSchema};
use crate::value::Value;

pub use edit::EditScope;
pub use events::{AttributeChange, ChangeEvent, ModelTopic, NestedChange};
pub use proxy::{ModelAdapter, ModelProxy};

use edit::EditState;
use relation::Link;

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

impl ModelId {
    fn next() -> Self {
        Self(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ModelState {
    attributes: IndexMap<String, Value>,
    errors: IndexMap<String, Vec<String>>,
    scenario: String,
    edit: EditState,
    links: HashMap<String, Link>,
}

pub(crate) struct ModelInner {
    id: ModelId,
    schema: Arc<ModelSchema>,
    state: Mutex<ModelState>,
    events: EventBus<ModelTopic, ChangeEvent>,
    nested: Signal<NestedChange>,
    emit_depth: AtomicUsize,
}

impl Drop for ModelInner {
    fn drop(&mut self) {
        for (_, link) in self.state.get_mut().links.drain() {
            link.detach();
        }
    }
}

/// Shared handle to an observable model.
///
/// Cloning the handle is cheap; all clones refer to the same model.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Create a model with every attribute at its declared default.
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        let attributes = schema
            .attributes()
            .map(|a| {
                let value = match a.kind {
                    AttributeKind::Value => Value::Json(a.default.clone()),
                    AttributeKind::HasOne(_) | AttributeKind::HasMany(_) => Value::null(),
                };
                (a.name.clone(), value)
            })
            .collect();

        Self {
            inner: Arc::new(ModelInner {
                id: ModelId::next(),
                schema,
                state: Mutex::new(ModelState {
                    attributes,
                    errors: IndexMap::new(),
                    scenario: DEFAULT_SCENARIO.to_string(),
                    edit: EditState::default(),
                    links: HashMap::new(),
                }),
                events: EventBus::new(),
                nested: Signal::new(),
                emit_depth: AtomicUsize::new(0),
            }),
        }
    }

    /// Create a model populated from `data`.
    ///
    /// Keys that are not attributes of the schema are skipped. A scalar is
    /// accepted as the value of a single-attribute primary key.
    pub fn with_values(schema: Arc<ModelSchema>, data: &JsonValue) -> Result<Self> {
        let model = Self::new(schema);
        model.populate(data)?;
        Ok(model)
    }

    fn populate(&self, data: &JsonValue) -> Result<()> {
        match data {
            JsonValue::Null => Ok(()),
            JsonValue::Object(map) => {
                let _scope = self.edit()?;
                for (name, value) in map {
                    if self.has_attribute(name) {
                        self.set_at(&AttributePath::name(name.clone()), Value::Json(value.clone()))?;
                    } else {
                        tracing::trace!(target: targets::MODEL, model = %self, attribute = %name, "skipping unknown attribute");
                    }
                }
                Ok(())
            }
            scalar => match self.inner.schema.primary_key() {
                [key] => self.set_at(&AttributePath::name(key.clone()), Value::Json(scalar.clone())).map(|_| ()),
                _ => Err(Error::invalid_param(format!(
                    "Cannot populate `{}` from {scalar}",
                    self.inner.schema.name()
                ))),
            },
        }
    }

    /// The instance id.
    pub fn id(&self) -> ModelId {
        self.inner.id
    }

    /// The schema this model was built from.
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.inner.schema
    }

    /// Whether both handles refer to the same model.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ModelInner>) -> Option<Model> {
        weak.upgrade().map(|inner| Model { inner })
    }

    /// Attribute names in declaration order.
    pub fn attributes(&self) -> Vec<String> {
        self.inner.schema.attribute_names()
    }

    /// Whether `name` is an attribute of this model.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.schema.has_attribute(name)
    }

    /// Current value of a top-level attribute.
    pub fn attribute_value(&self, name: &str) -> Option<Value> {
        self.inner.state.lock().attributes.get(name).cloned()
    }

    /// Snapshot of every attribute value.
    pub fn attribute_values(&self) -> IndexMap<String, Value> {
        self.inner.state.lock().attributes.clone()
    }

    /// Read a value by path (`"name"`, `"user.email"`, `"links[0].url"`).
    ///
    /// Unknown attributes read as `None`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] for a malformed path.
    pub fn get(&self, path: &str) -> Result<Option<Value>> {
        let path = AttributePath::parse(path)?;
        match self.get_at(&path) {
            Err(e) if e.is_unknown_property() => Ok(None),
            other => other,
        }
    }

    /// Read a value by parsed path.
    pub fn get_at(&self, path: &AttributePath) -> Result<Option<Value>> {
        let Some((head, rest)) = path.split_first() else {
            return Err(Error::invalid_param("Empty attribute path"));
        };
        let name = head
            .as_name()
            .ok_or_else(|| Error::invalid_param(format!("Model paths must start with an attribute name: `{path}`")))?;
        let value = self
            .attribute_value(name)
            .ok_or_else(|| Error::unknown_property(format!("{}.{name}", self.inner.schema.name())))?;

        if rest.is_empty() {
            return Ok(Some(value));
        }
        match value {
            Value::Model(sub) => sub.get_at(&rest),
            Value::Collection(collection) => collection.get_at(&rest),
            Value::Json(json) => Ok(json_descend(&json, &rest).map(Value::Json)),
        }
    }

    /// Read a value by path as JSON. `None` for unknown attributes and
    /// malformed paths.
    pub fn get_json(&self, path: &str) -> Option<JsonValue> {
        self.get(path).ok().flatten().map(|v| v.to_json())
    }

    /// Write a value by path.
    ///
    /// Returns `true` if anything changed. Setting an attribute to its
    /// current value changes nothing and emits nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParam`] for malformed paths, undeclared attributes,
    ///   missing collection indices, or values a relation cannot hold.
    /// - [`Error::UnknownProperty`] when writing through a null sub-model.
    /// - [`Error::Reentrancy`] when called from too deep inside this model's
    ///   own change handlers.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let path = AttributePath::parse(path)?;
        self.set_at(&path, value.into())
    }

    /// Write a value by parsed path.
    pub fn set_at(&self, path: &AttributePath, value: Value) -> Result<bool> {
        let _scope = self.edit()?;
        self.write_path(path, value)
    }

    /// Write several attributes (keys may be paths) in one transaction.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] if `values` is not a JSON object, plus every
    /// error of [`set`](Self::set).
    pub fn set_values(&self, values: &JsonValue) -> Result<bool> {
        let JsonValue::Object(map) = values else {
            return Err(Error::invalid_param(format!("Expected an object of attribute values, got {values}")));
        };
        let _scope = self.edit()?;
        let mut changed = false;
        for (path, value) in map {
            changed |= self.set_at(&AttributePath::parse(path)?, Value::Json(value.clone()))?;
        }
        Ok(changed)
    }

    /// Mass assignment. With `safe_only`, names outside
    /// [`safe_attributes`](Self::safe_attributes) are skipped and reported
    /// through the schema's unsafe-attribute hook (a warning by default);
    /// otherwise names outside the attribute list are skipped silently.
    pub fn set_attributes(&self, values: &JsonValue, safe_only: bool) -> Result<bool> {
        let JsonValue::Object(map) = values else {
            return Err(Error::invalid_param(format!("Expected an object of attribute values, got {values}")));
        };
        let allowed = if safe_only {
            self.safe_attributes()
        } else {
            self.attributes()
        };

        let _scope = self.edit()?;
        let mut changed = false;
        for (name, value) in map {
            if allowed.iter().any(|a| a == name) {
                changed |= self.set_at(&AttributePath::name(name.clone()), Value::Json(value.clone()))?;
            } else if safe_only {
                self.on_unsafe_attribute(name, value);
            }
        }
        Ok(changed)
    }

    fn on_unsafe_attribute(&self, name: &str, value: &JsonValue) {
        match self.inner.schema.on_unsafe_attribute() {
            Some(hook) => hook(self, name, value),
            None => {
                tracing::warn!(target: targets::MODEL, model = %self, attribute = name, "Failed to set unsafe attribute");
            }
        }
    }

    fn write_path(&self, path: &AttributePath, value: Value) -> Result<bool> {
        match path.segments() {
            [] => Err(Error::invalid_param("Empty attribute path")),
            [PathSegment::Name(name)] => self.write_attribute(name, value),
            [PathSegment::Name(name), rest @ ..] => {
                let rest = AttributePath::from_segments(rest.iter().cloned());
                let current = self
                    .attribute_value(name)
                    .ok_or_else(|| Error::invalid_param(self.no_attribute_message(name)))?;
                match current {
                    Value::Model(sub) => {
                        self.enlist(&sub);
                        sub.set_at(&rest, value)
                    }
                    Value::Collection(collection) => self.write_member(name, &collection, &rest, value),
                    Value::Json(JsonValue::Null) => Err(Error::unknown_property(format!(
                        "Setting property of null sub-model `{name}`"
                    ))),
                    Value::Json(_) => Err(Error::invalid_param(format!(
                        "Attribute `{name}` is neither a model nor a collection"
                    ))),
                }
            }
            [PathSegment::Index(_), ..] => Err(Error::invalid_param(format!(
                "Model paths must start with an attribute name: `{path}`"
            ))),
        }
    }

    fn write_member(&self, name: &str, collection: &Collection, rest: &AttributePath, value: Value) -> Result<bool> {
        let Some((PathSegment::Index(index), tail)) = rest.split_first() else {
            return Err(Error::invalid_param(format!(
                "Try set property of array models: use `{name}[index].{rest}`"
            )));
        };
        let member = collection
            .model_at(*index)
            .ok_or_else(|| Error::invalid_param(format!("Not found model with index `{index}`")))?;
        self.enlist(&member);
        if tail.is_empty() {
            match value {
                Value::Json(values) => member.set_values(&values),
                _ => Err(Error::invalid_param(format!("Collection member `{name}[{index}]` can only be merged with an object"))),
            }
        } else {
            member.set_at(&tail, value)
        }
    }

    fn write_attribute(&self, name: &str, value: Value) -> Result<bool> {
        let schema = self.inner.schema.clone();
        let attribute = schema
            .attribute(name)
            .ok_or_else(|| Error::invalid_param(self.no_attribute_message(name)))?;

        match (&attribute.kind, value) {
            (AttributeKind::Value, Value::Json(json)) => self.store(name, Value::Json(attribute.ty.typecast(json))),
            (AttributeKind::Value, other) => self.store(name, other),
            (AttributeKind::HasOne(sub_schema), Value::Json(data @ JsonValue::Object(_))) => {
                match self.attribute_value(name) {
                    Some(Value::Model(sub)) => {
                        self.enlist(&sub);
                        sub.set_values(&data)
                    }
                    _ => {
                        let sub = Model::with_values(sub_schema.clone(), &data)?;
                        self.store(name, Value::Model(sub))
                    }
                }
            }
            (AttributeKind::HasMany(sub_schema), Value::Json(data @ (JsonValue::Array(_) | JsonValue::Object(_)))) => {
                match self.attribute_value(name) {
                    Some(Value::Collection(collection)) => collection.merge(data),
                    _ => {
                        let collection = Collection::new(CollectionConfig::with_schema(sub_schema.clone()));
                        collection.add(data, None)?;
                        self.store(name, Value::Collection(collection))
                    }
                }
            }
            (AttributeKind::HasOne(_), value @ (Value::Model(_) | Value::Json(JsonValue::Null))) => self.store(name, value),
            (AttributeKind::HasMany(_), value @ (Value::Collection(_) | Value::Json(JsonValue::Null))) => {
                self.store(name, value)
            }
            (_, value) => Err(Error::invalid_param(format!(
                "Attribute `{name}` of `{}` cannot hold {value:?}",
                schema.name()
            ))),
        }
    }

    /// Replace an attribute value, record the change and relink relations.
    fn store(&self, name: &str, value: Value) -> Result<bool> {
        {
            let mut state = self.inner.state.lock();
            let Some(slot) = state.attributes.get_mut(name) else {
                return Err(Error::invalid_param(self.no_attribute_message(name)));
            };
            if *slot == value {
                return Ok(false);
            }
            let old = std::mem::replace(slot, value.clone());
            state.edit.record(name, old, value.clone());
        }
        tracing::trace!(target: targets::MODEL, model = %self, attribute = name, "attribute written");
        self.relink(name, &value);
        Ok(true)
    }

    fn no_attribute_message(&self, name: &str) -> String {
        format!("Model `{}` has no attribute named `{name}`", self.inner.schema.name())
    }

    /// Serialize every attribute, expanding linked sub-models and collections.
    pub fn to_json(&self) -> JsonValue {
        let values = self.attribute_values();
        let map: Map<String, JsonValue> = values.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
        JsonValue::Object(map)
    }

    /// Primary key value: the single key attribute's value, or an object of
    /// the composite key's values. `None` for schemas without a key.
    pub fn primary_key(&self) -> Option<JsonValue> {
        let state = self.inner.state.lock();
        let value_of = |name: &String| state.attributes.get(name).map(Value::to_json).unwrap_or(JsonValue::Null);
        match self.inner.schema.primary_key() {
            [] => None,
            [single] => Some(value_of(single)),
            many => Some(JsonValue::Object(many.iter().map(|n| (n.clone(), value_of(n))).collect())),
        }
    }

    /// Identity used by collections to match this record.
    pub fn identity(&self) -> IdentityKey {
        let state = self.inner.state.lock();
        let key = identity::key_from_values(self.inner.schema.primary_key(), |name| {
            state.attributes.get(name).and_then(Value::as_json)
        });
        match key {
            Some(key) => IdentityKey::Key(key),
            None => IdentityKey::Instance(self.inner.id),
        }
    }

    /// Subscribe to a topic.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] for an indexed path whose collection or index
    /// does not currently exist.
    pub fn on<F>(&self, topic: ModelTopic, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        if let ModelTopic::Attribute(path) = &topic {
            if path.has_index() {
                self.check_indexed_path(path)?;
            }
        }
        Ok(self.inner.events.subscribe(topic, handler))
    }

    /// Subscribe by event name: `"change"` or `"change:<path>"`.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.on(ModelTopic::parse(event)?, handler)
    }

    /// Subscribe to committed transactions.
    pub fn on_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(ModelTopic::Change, handler)
    }

    /// Remove a subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    pub(crate) fn nested_signal(&self) -> &Signal<NestedChange> {
        &self.inner.nested
    }

    fn check_indexed_path(&self, path: &AttributePath) -> Result<()> {
        let mut prefix = AttributePath::root();
        for segment in path.segments() {
            if let PathSegment::Index(index) = segment {
                let target = self.get_at(&prefix).ok().flatten();
                let exists = match target {
                    Some(Value::Collection(collection)) => *index < collection.len(),
                    _ => false,
                };
                if !exists {
                    return Err(Error::invalid_param(format!("Not found model with index `{index}` at `{prefix}`")));
                }
            }
            prefix = prefix.child(segment.clone());
        }
        Ok(())
    }
}

/// Walk into plain JSON objects and arrays.
pub(crate) fn json_descend(value: &JsonValue, path: &AttributePath) -> Option<JsonValue> {
    let mut current = value;
    for segment in path.segments() {
        current = match (segment, current) {
            (PathSegment::Name(name), JsonValue::Object(map)) => map.get(name)?,
            (PathSegment::Index(index), JsonValue::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.inner.schema.name(), self.inner.id)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Model");
        debug.field("id", &self.inner.id).field("schema", &self.inner.schema.name());
        match self.inner.state.try_lock() {
            Some(state) => debug.field("attributes", &state.attributes),
            None => debug.field("attributes", &"<locked>"),
        };
        debug.finish()
    }
}

static_assertions::assert_impl_all!(Model: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> Arc<ModelSchema> {
        ModelSchema::builder("User")
            .attributes(["id", "name", "email"])
            .primary_key(["id"])
            .build()
            .unwrap()
    }

    fn recorder(model: &Model, topic: &str) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let label = topic.to_string();
        model
            .subscribe(topic, move |_| seen_clone.lock().push(label.clone()))
            .unwrap();
        seen
    }

    #[test]
    fn test_get_set_and_defaults() {
        let schema = ModelSchema::builder("Note")
            .attribute("id")
            .attribute_with_default("title", json!("Untitled"))
            .build()
            .unwrap();
        let note = Model::new(schema);

        assert_eq!(note.get_json("title"), Some(json!("Untitled")));
        assert!(note.set("title", "Groceries").unwrap());
        assert_eq!(note.get_json("title"), Some(json!("Groceries")));
        assert_eq!(note.get("missing").unwrap(), None);
        assert!(note.get("bad..path").is_err());
    }

    #[test]
    fn test_set_unknown_attribute_is_error() {
        let user = Model::new(user_schema());
        assert!(matches!(user.set("age", 3), Err(Error::InvalidParam(_))));
    }

    #[test]
    fn test_noop_set_emits_nothing() {
        let user = Model::with_values(user_schema(), &json!({"id": 1, "name": "Ivan"})).unwrap();
        let change = recorder(&user, "change");
        let name = recorder(&user, "change:name");

        assert!(!user.set("name", "Ivan").unwrap());
        assert!(change.lock().is_empty());
        assert!(name.lock().is_empty());

        assert!(user.set("name", "Petr").unwrap());
        assert_eq!(change.lock().len(), 1);
        assert_eq!(name.lock().len(), 1);
    }

    #[test]
    fn test_set_values_is_one_transaction() {
        let user = Model::new(user_schema());
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        user.on_change(move |event| {
            events_clone
                .lock()
                .push(event.changed_attributes().iter().map(|s| s.to_string()).collect::<Vec<_>>());
        });

        assert!(user.set_values(&json!({"name": "Ivan", "email": "ivan@example.com"})).unwrap());
        assert_eq!(*events.lock(), vec![vec!["name".to_string(), "email".to_string()]]);
    }

    #[test]
    fn test_attribute_event_carries_old_and_new() {
        let user = Model::with_values(user_schema(), &json!({"name": "Ivan"})).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        user.on(ModelTopic::attribute("name"), move |event| {
            *seen_clone.lock() = Some((event.old_value().cloned(), event.new_value().cloned()));
        })
        .unwrap();

        user.set("name", "Petr").unwrap();
        let (old, new) = seen.lock().clone().unwrap();
        assert_eq!(old, Some(Value::from("Ivan")));
        assert_eq!(new, Some(Value::from("Petr")));
    }

    #[test]
    fn test_identity_and_primary_key() {
        let user = Model::with_values(user_schema(), &json!({"id": 288})).unwrap();
        assert_eq!(user.primary_key(), Some(json!(288)));
        assert_eq!(user.identity(), IdentityKey::from("288"));

        let unsaved = Model::new(user_schema());
        assert_eq!(unsaved.identity(), IdentityKey::Instance(unsaved.id()));

        let from_scalar = Model::with_values(user_schema(), &json!(7)).unwrap();
        assert_eq!(from_scalar.get_json("id"), Some(json!(7)));
    }

    #[test]
    fn test_populate_skips_unknown_keys() {
        let user = Model::with_values(user_schema(), &json!({"id": 1, "nickname": "x"})).unwrap();
        assert_eq!(user.get_json("nickname"), None);
        assert!(user.set_values(&json!({"nickname": "x"})).is_err());
    }

    #[test]
    fn test_set_attributes_safe_only() {
        let schema = ModelSchema::builder("User")
            .attributes(["id", "name", "role"])
            .rule(["name"], "safe", json!({}))
            .rule(["!role"], "required", json!({}))
            .build()
            .unwrap();
        let user = Model::new(schema);

        assert!(user.set_attributes(&json!({"name": "Ivan", "role": "admin", "id": 5}), true).unwrap());
        assert_eq!(user.get_json("name"), Some(json!("Ivan")));
        assert_eq!(user.get_json("role"), Some(JsonValue::Null));
        assert_eq!(user.get_json("id"), Some(JsonValue::Null));

        assert!(user.set_attributes(&json!({"role": "admin", "unknown": 1}), false).unwrap());
        assert_eq!(user.get_json("role"), Some(json!("admin")));
    }

    #[test]
    fn test_to_json_and_json_descend() {
        let schema = ModelSchema::builder("Doc").attributes(["meta"]).build().unwrap();
        let doc = Model::with_values(schema, &json!({"meta": {"tags": ["a", "b"]}})).unwrap();
        assert_eq!(doc.get_json("meta.tags[1]"), Some(json!("b")));
        assert_eq!(doc.get_json("meta.missing"), None);
        assert_eq!(doc.to_json(), json!({"meta": {"tags": ["a", "b"]}}));
    }

    #[test]
    fn test_reentrant_handler_is_bounded() {
        let schema = ModelSchema::builder("Counter").attribute("n").build().unwrap();
        let counter = Model::with_values(schema, &json!({"n": 0})).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));

        let weak = counter.downgrade();
        let errors_clone = errors.clone();
        counter.on_change(move |_| {
            let Some(model) = Model::upgrade(&weak) else { return };
            let next = model.get_json("n").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
            if let Err(e) = model.set("n", next) {
                errors_clone.lock().push(e);
            }
        });

        counter.set("n", 1).unwrap();
        assert_eq!(*errors.lock(), vec![Error::Reentrancy { depth: crate::reentrancy::MAX_REENTRANT_DEPTH }]);
        assert_eq!(
            counter.get_json("n"),
            Some(json!(1 + crate::reentrancy::MAX_REENTRANT_DEPTH as i64 - 1))
        );
    }
}
