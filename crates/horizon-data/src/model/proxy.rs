//! Live projections of a model into a foreign representation.

use std::sync::{Arc, Weak};

use horizon_data_core::SubscriptionId;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use super::{Model, ModelInner};

/// Defines how a model projects into `Target` and how the projection is
/// updated when the model changes.
pub trait ModelAdapter: Send + Sync + 'static {
    /// The foreign representation.
    type Target: Send + Sync + 'static;

    /// Build the representation of `original` as it is now.
    fn instance(&self, original: &Model) -> Self::Target;

    /// Apply the attributes changed by one committed transaction.
    fn set_values(&self, original: &Model, target: &Self::Target, changed: &IndexMap<String, JsonValue>);
}

/// A representation kept in sync with its source model.
///
/// Dropping the proxy stops the synchronization.
pub struct ModelProxy<T> {
    target: Arc<T>,
    source: Weak<ModelInner>,
    subscription: SubscriptionId,
}

impl<T> ModelProxy<T> {
    /// The synchronized representation.
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// The source model, if it is still alive.
    pub fn source(&self) -> Option<Model> {
        Model::upgrade(&self.source)
    }
}

impl<T> std::ops::Deref for ModelProxy<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T> Drop for ModelProxy<T> {
    fn drop(&mut self) {
        if let Some(model) = Model::upgrade(&self.source) {
            model.off(self.subscription);
        }
    }
}

impl Model {
    /// Project this model through `adapter` and keep the projection updated.
    pub fn create_proxy<A: ModelAdapter>(&self, adapter: A) -> ModelProxy<A::Target> {
        let adapter = Arc::new(adapter);
        let target = Arc::new(adapter.instance(self));

        let source = self.downgrade();
        let synced = target.clone();
        let subscription = self.on_change(move |event| {
            let Some(model) = Model::upgrade(&source) else { return };
            let changed: IndexMap<String, JsonValue> = event
                .changes()
                .iter()
                .map(|(name, change)| (name.clone(), change.new.to_json()))
                .collect();
            adapter.set_values(&model, &synced, &changed);
        });

        ModelProxy {
            target,
            source: self.downgrade(),
            subscription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use parking_lot::Mutex;
    use serde_json::json;

    struct MapAdapter;

    impl ModelAdapter for MapAdapter {
        type Target = Mutex<IndexMap<String, JsonValue>>;

        fn instance(&self, original: &Model) -> Self::Target {
            let values = original
                .attribute_values()
                .into_iter()
                .map(|(name, value)| (name, value.to_json()))
                .collect();
            Mutex::new(values)
        }

        fn set_values(&self, _original: &Model, target: &Self::Target, changed: &IndexMap<String, JsonValue>) {
            let mut target = target.lock();
            for (name, value) in changed {
                target.insert(name.clone(), value.clone());
            }
        }
    }

    #[test]
    fn test_proxy_follows_changes() {
        let schema = ModelSchema::builder("User").attributes(["id", "name"]).build().unwrap();
        let user = Model::with_values(schema, &json!({"id": 1, "name": "Ivan"})).unwrap();

        let proxy = user.create_proxy(MapAdapter);
        assert_eq!(proxy.lock()["name"], json!("Ivan"));

        user.set("name", "Petr").unwrap();
        assert_eq!(proxy.lock()["name"], json!("Petr"));

        let snapshot = proxy.target().clone();
        drop(proxy);
        user.set("name", "Olga").unwrap();
        assert_eq!(snapshot.lock()["name"], json!("Petr"));
    }
}
