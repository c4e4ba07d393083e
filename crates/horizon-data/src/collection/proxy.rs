//! Live projections of a collection into a foreign representation.

use std::sync::{Arc, Weak};

use horizon_data_core::ConnectionId;

use super::{Collection, CollectionEvent, CollectionInner};
use crate::value::Entry;

/// Defines how a collection projects into `Target` and how the projection
/// follows membership changes.
pub trait CollectionAdapter: Send + Sync + 'static {
    /// The foreign representation.
    type Target: Send + Sync + 'static;

    /// Build the representation of `original` as it is now.
    fn instance(&self, original: &Collection) -> Self::Target;

    /// Entries joined `original`.
    fn add(&self, original: &Collection, target: &Self::Target, entries: &[Entry]);

    /// Entries left `original`.
    fn remove(&self, original: &Collection, target: &Self::Target, entries: &[Entry]);
}

/// A representation kept in sync with its source collection.
///
/// Dropping the proxy stops the synchronization.
pub struct CollectionProxy<T> {
    target: Arc<T>,
    source: Weak<CollectionInner>,
    connection: ConnectionId,
}

impl<T> CollectionProxy<T> {
    /// The synchronized representation.
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// The source collection, if it is still alive.
    pub fn source(&self) -> Option<Collection> {
        Collection::upgrade(&self.source)
    }
}

impl<T> std::ops::Deref for CollectionProxy<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T> Drop for CollectionProxy<T> {
    fn drop(&mut self) {
        if let Some(collection) = Collection::upgrade(&self.source) {
            collection.signals().change.disconnect(self.connection);
        }
    }
}

impl Collection {
    /// Project this collection through `adapter` and keep the projection
    /// updated with every committed membership change.
    pub fn create_proxy<A: CollectionAdapter>(&self, adapter: A) -> CollectionProxy<A::Target> {
        let adapter = Arc::new(adapter);
        let target = Arc::new(adapter.instance(self));

        let source = self.downgrade();
        let synced = target.clone();
        let connection = self.signals().change.connect(move |event: &CollectionEvent| {
            let Some(collection) = Collection::upgrade(&source) else { return };
            if !event.removed.is_empty() {
                adapter.remove(&collection, &synced, &event.removed);
            }
            if !event.added.is_empty() {
                adapter.add(&collection, &synced, &event.added);
            }
        });

        CollectionProxy {
            target,
            source: self.downgrade(),
            connection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionConfig;
    use parking_lot::Mutex;
    use serde_json::{Value as JsonValue, json};

    struct ListAdapter;

    impl CollectionAdapter for ListAdapter {
        type Target = Mutex<Vec<JsonValue>>;

        fn instance(&self, original: &Collection) -> Self::Target {
            Mutex::new(original.entries().iter().map(Entry::to_json).collect())
        }

        fn add(&self, _original: &Collection, target: &Self::Target, entries: &[Entry]) {
            target.lock().extend(entries.iter().map(Entry::to_json));
        }

        fn remove(&self, _original: &Collection, target: &Self::Target, entries: &[Entry]) {
            let gone: Vec<JsonValue> = entries.iter().map(Entry::to_json).collect();
            target.lock().retain(|v| !gone.contains(v));
        }
    }

    #[test]
    fn test_proxy_follows_membership() {
        let coll = Collection::with_entries(CollectionConfig::raw(), json!([1, 2])).unwrap();
        let proxy = coll.create_proxy(ListAdapter);
        assert_eq!(*proxy.lock(), vec![json!(1), json!(2)]);

        coll.push(json!([3, 4])).unwrap();
        coll.remove(1).unwrap();
        assert_eq!(*proxy.lock(), vec![json!(2), json!(3), json!(4)]);
        assert!(proxy.source().is_some_and(|s| s.ptr_eq(&coll)));

        let snapshot = proxy.target().clone();
        drop(proxy);
        coll.push(5).unwrap();
        assert_eq!(snapshot.lock().len(), 3);
        assert_eq!(coll.signals().change.connection_count(), 0);
    }
}
