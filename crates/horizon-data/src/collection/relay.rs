//! Forwarding of member record changes to collection subscribers.
//!
//! Every record member gets one connection to its nested-change signal, no
//! matter how many times it appears in the collection. Passthrough
//! subscriptions made with [`Collection::on_attribute`] therefore cover all
//! current and future members without touching the members themselves.

use horizon_data_core::{AttributePath, ConnectionId, Result, SubscriptionId};

use super::{Collection, EntryChange};
use crate::model::{ChangeEvent, Model, NestedChange};
use crate::value::Entry;

pub(super) struct Relay {
    model: Model,
    connection: ConnectionId,
    count: usize,
}

impl Relay {
    pub(super) fn detach(self) {
        self.model.nested_signal().disconnect(self.connection);
    }
}

impl Collection {
    /// Subscribe to committed changes of `path` on any member, e.g. `"name"`
    /// or `"user.name"`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`](horizon_data_core::Error::InvalidParam) for a
    /// malformed path.
    pub fn on_attribute<F>(&self, path: &str, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        Ok(self.on_attribute_path(AttributePath::parse(path)?, handler))
    }

    /// Subscribe to committed changes of a parsed member path.
    pub fn on_attribute_path<F>(&self, path: AttributePath, handler: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.attribute_bus.subscribe(path, handler)
    }

    /// Remove a passthrough subscription.
    pub fn off_attribute(&self, id: SubscriptionId) -> bool {
        self.inner.attribute_bus.unsubscribe(id)
    }

    /// Start relaying the records of `added` and stop relaying `removed`.
    pub(super) fn rewire(&self, added: &[Entry], removed: &[Entry]) {
        let mut detached = Vec::new();
        {
            let mut state = self.inner.state.lock();
            for model in added.iter().filter_map(Entry::as_model) {
                if let Some(relay) = state.relays.get_mut(&model.id()) {
                    relay.count += 1;
                    continue;
                }
                let connection = self.connect_member(model);
                state.relays.insert(
                    model.id(),
                    Relay {
                        model: model.clone(),
                        connection,
                        count: 1,
                    },
                );
            }
            for model in removed.iter().filter_map(Entry::as_model) {
                let id = model.id();
                let last = match state.relays.get_mut(&id) {
                    Some(relay) => {
                        relay.count -= 1;
                        relay.count == 0
                    }
                    None => false,
                };
                if last && let Some(relay) = state.relays.remove(&id) {
                    detached.push(relay);
                }
            }
        }
        for relay in detached {
            relay.detach();
        }
    }

    fn connect_member(&self, model: &Model) -> ConnectionId {
        let collection = self.downgrade();
        let member = model.downgrade();
        model.nested_signal().connect(move |change: &NestedChange| {
            let (Some(collection), Some(member)) = (Collection::upgrade(&collection), Model::upgrade(&member)) else {
                return;
            };
            collection.relay(&member, change);
        })
    }

    fn relay(&self, member: &Model, change: &NestedChange) {
        let index = self
            .inner
            .state
            .lock()
            .entries
            .iter()
            .position(|e| e.as_model().is_some_and(|m| m.ptr_eq(member)));

        let bus = &self.inner.attribute_bus;
        for name in change.event.changes().keys() {
            bus.emit(&change.path.child(name.as_str()), change.event.for_attribute(name));
        }
        if !change.path.is_empty() {
            bus.emit(&change.path, change.event.clone());
        }
        self.inner.signals.entry_changed.emit(EntryChange {
            model: member.clone(),
            index,
            path: change.path.clone(),
            event: change.event.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::collection::CollectionConfig;
    use crate::schema::ModelSchema;

    fn users() -> Collection {
        let schema = ModelSchema::builder("User")
            .attributes(["id", "name"])
            .primary_key(["id"])
            .build()
            .unwrap();
        Collection::new(CollectionConfig::with_schema(schema))
    }

    #[test]
    fn test_attribute_passthrough_covers_new_members() {
        let users = users();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = users
            .on_attribute("name", move |event| {
                sink.lock().extend(event.changed_attributes().iter().map(|s| s.to_string()));
            })
            .unwrap();

        users.add(json!({"id": 288, "name": "Ivan"}), None).unwrap();
        users.model_at(0).unwrap().set("name", "John").unwrap();
        assert_eq!(*seen.lock(), vec!["name".to_string()]);

        assert!(users.off_attribute(id));
        users.model_at(0).unwrap().set("name", "Fred").unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_removed_members_stop_relaying() {
        let users = users();
        users.add(json!({"id": 1, "name": "a"}), None).unwrap();
        let member = users.model_at(0).unwrap();
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        users.signals().entry_changed.connect(move |change| {
            assert_eq!(change.index, Some(0));
            *sink.lock() += 1;
        });

        member.set("name", "b").unwrap();
        users.remove(json!({"id": 1})).unwrap();
        member.set("name", "c").unwrap();
        assert_eq!(*count.lock(), 1);
    }
}
