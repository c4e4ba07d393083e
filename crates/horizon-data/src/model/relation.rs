//! Links from a model to the sub-models and sub-collections it holds.
//!
//! A linked child forwards its committed changes to the owner, which
//! re-emits them under the attribute path the child is stored at.

use std::sync::Arc;

use horizon_data_core::{AttributePath, ConnectionId, PathSegment};
use indexmap::IndexMap;

use super::{AttributeChange, ChangeEvent, Model, ModelTopic, NestedChange};
use crate::collection::Collection;
use crate::value::Value;

pub(super) enum Link {
    Model {
        target: Model,
        nested: ConnectionId,
    },
    Collection {
        target: Collection,
        entries: ConnectionId,
        changes: ConnectionId,
    },
}

impl Link {
    pub(super) fn detach(self) {
        match self {
            Link::Model { target, nested } => {
                target.nested_signal().disconnect(nested);
            }
            Link::Collection {
                target,
                entries,
                changes,
            } => {
                target.signals().entry_changed.disconnect(entries);
                target.signals().change.disconnect(changes);
            }
        }
    }
}

impl Model {
    /// Replace the link for `name` to follow `value`.
    pub(super) fn relink(&self, name: &str, value: &Value) {
        let previous = self.inner.state.lock().links.remove(name);
        if let Some(link) = previous {
            link.detach();
        }

        let link = match value {
            Value::Model(sub) => Some(self.link_model(name, sub)),
            Value::Collection(collection) => Some(self.link_collection(name, collection)),
            Value::Json(_) => None,
        };
        if let Some(link) = link {
            self.inner.state.lock().links.insert(name.to_string(), link);
        }
    }

    fn link_model(&self, name: &str, sub: &Model) -> Link {
        let owner = self.downgrade();
        let attribute = AttributePath::name(name);
        let nested = sub.nested_signal().connect(move |change: &NestedChange| {
            let Some(owner) = Model::upgrade(&owner) else { return };
            owner.bubble(&attribute.join(&change.path), &change.event, true);
        });
        Link::Model {
            target: sub.clone(),
            nested,
        }
    }

    fn link_collection(&self, name: &str, collection: &Collection) -> Link {
        let owner = self.downgrade();
        let attribute = AttributePath::name(name);
        let entries = collection.signals().entry_changed.connect(move |change| {
            let Some(owner) = Model::upgrade(&owner) else { return };
            if let Some(index) = change.index {
                let indexed = attribute.child(PathSegment::Index(index)).join(&change.path);
                owner.bubble(&indexed, &change.event, true);
            }
            owner.bubble(&attribute.join(&change.path), &change.event, false);
        });

        let owner = self.downgrade();
        let attribute = name.to_string();
        let changes = collection.signals().change.connect(move |_| {
            let Some(owner) = Model::upgrade(&owner) else { return };
            owner.bubble_structure(&attribute);
        });

        Link::Collection {
            target: collection.clone(),
            entries,
            changes,
        }
    }

    /// Re-emit `event` below `path`: one event per changed attribute of the
    /// source, one for `path` itself, then (if `propagate`) onwards to this
    /// model's own owners.
    pub(super) fn bubble(&self, path: &AttributePath, event: &ChangeEvent, propagate: bool) {
        for name in event.changes().keys() {
            self.inner
                .events
                .emit(&ModelTopic::Attribute(path.child(name.as_str())), event.for_attribute(name));
        }
        if !path.is_empty() {
            self.inner.events.emit(&ModelTopic::Attribute(path.clone()), event.clone());
        }
        if propagate {
            self.inner.nested.emit(NestedChange {
                path: path.clone(),
                event: event.clone(),
            });
        }
    }

    /// Forward this model's own committed changes to its owners.
    pub(super) fn bubble_nested(&self, event: ChangeEvent) {
        self.inner.nested.emit(NestedChange {
            path: AttributePath::root(),
            event,
        });
    }

    /// Announce a membership change of the sub-collection stored at `name`.
    fn bubble_structure(&self, name: &str) {
        let Some(value) = self.attribute_value(name) else { return };
        let mut changes = IndexMap::new();
        changes.insert(
            name.to_string(),
            AttributeChange {
                old: value.clone(),
                new: value,
            },
        );
        let event = ChangeEvent::new(self.clone(), Some(name.to_string()), Arc::new(changes));
        self.bubble(&AttributePath::root(), &event, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use parking_lot::Mutex;
    use serde_json::json;

    fn schemas() -> Arc<ModelSchema> {
        let user = ModelSchema::builder("User").attributes(["id", "email"]).primary_key(["id"]).build().unwrap();
        let link = ModelSchema::builder("Link").attributes(["id", "url"]).primary_key(["id"]).build().unwrap();
        ModelSchema::builder("Article")
            .attributes(["id", "title"])
            .has_one("user", user)
            .has_many("links", link)
            .primary_key(["id"])
            .build()
            .unwrap()
    }

    fn record(model: &Model, topics: &[&str]) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for topic in topics {
            let seen = seen.clone();
            let label = topic.to_string();
            model.subscribe(topic, move |_| seen.lock().push(label.clone())).unwrap();
        }
        seen
    }

    #[test]
    fn test_sub_model_changes_bubble() {
        let article = Model::with_values(schemas(), &json!({"id": 1, "user": {"id": 5, "email": "a@b.c"}})).unwrap();
        let seen = record(&article, &["change:user", "change:user.email", "change"]);

        assert!(article.set("user.email", "x@y.z").unwrap());
        assert_eq!(*seen.lock(), vec!["change:user.email", "change:user"]);
        assert_eq!(article.get_json("user.email"), Some(json!("x@y.z")));
    }

    #[test]
    fn test_collection_member_changes_bubble() {
        let article = Model::with_values(
            schemas(),
            &json!({"id": 1, "links": [{"id": 1, "url": "a"}, {"id": 2, "url": "b"}]}),
        )
        .unwrap();
        let seen = record(&article, &["change:links[1].url", "change:links[1]", "change:links.url"]);

        assert!(article.set("links[1].url", "c").unwrap());
        assert_eq!(
            *seen.lock(),
            vec!["change:links[1].url", "change:links[1]", "change:links.url"]
        );
        assert!(matches!(article.set("links[9].url", "d"), Err(horizon_data_core::Error::InvalidParam(_))));
        assert!(article.subscribe("change:links[9]", |_| {}).is_err());
    }

    #[test]
    fn test_null_sub_model_write_is_unknown_property() {
        let article = Model::new(schemas());
        assert!(matches!(
            article.set("user.email", "x"),
            Err(horizon_data_core::Error::UnknownProperty(_))
        ));
        assert_eq!(article.get("user.email").unwrap(), None);
    }

    #[test]
    fn test_replaced_sub_model_is_unlinked() {
        let article = Model::with_values(schemas(), &json!({"user": {"id": 5}})).unwrap();
        let old = article.get("user").unwrap().and_then(|v| v.as_model().cloned()).unwrap();
        article.set("user", Value::null()).unwrap();

        let seen = record(&article, &["change:user.email"]);
        old.set("email", "ignored@example.com").unwrap();
        assert!(seen.lock().is_empty());
    }
}
