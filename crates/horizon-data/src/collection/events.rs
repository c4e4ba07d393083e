//! Collection notifications.

use std::fmt;

use horizon_data_core::{AttributePath, Signal};

use crate::model::{ChangeEvent, Model};
use crate::value::Entry;

/// The net effect of one committed collection transaction.
///
/// Everything a single external call did to a collection (including the
/// nested calls it triggered) is merged into one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionEvent {
    /// Entries that became members.
    pub added: Vec<Entry>,
    /// Entries that stopped being members.
    pub removed: Vec<Entry>,
    /// Whether existing members were reordered or matched in place.
    pub is_sorted: bool,
}

impl CollectionEvent {
    /// An event that only reports a reorder.
    pub fn sorted() -> Self {
        Self {
            is_sorted: true,
            ..Self::default()
        }
    }

    /// Whether membership changed.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Whether there is anything to report at all.
    pub fn is_empty(&self) -> bool {
        !self.has_changes() && !self.is_sorted
    }

    /// Fold a later event into this one. An entry added and then removed
    /// within the same transaction cancels out, and vice versa.
    pub(super) fn merge(&mut self, other: CollectionEvent) {
        for entry in other.removed {
            match self.added.iter().position(|e| *e == entry) {
                Some(index) => {
                    self.added.remove(index);
                }
                None => self.removed.push(entry),
            }
        }
        for entry in other.added {
            match self.removed.iter().position(|e| *e == entry) {
                Some(index) => {
                    self.removed.remove(index);
                }
                None => self.added.push(entry),
            }
        }
        self.is_sorted |= other.is_sorted;
    }
}

/// A committed change inside one member record.
#[derive(Debug, Clone)]
pub struct EntryChange {
    /// The member that changed.
    pub model: Model,
    /// Position of the member at the time of the change.
    pub index: Option<usize>,
    /// Where inside the member the change happened (empty for the member's
    /// own attributes).
    pub path: AttributePath,
    /// The originating model event.
    pub event: ChangeEvent,
}

/// All signals emitted by a [`Collection`](super::Collection).
///
/// For one committed transaction the membership signals fire in the order
/// `add`, `remove`, `change`, `sort`, each at most once.
pub struct CollectionSignals {
    /// Emitted when entries were added.
    pub add: Signal<CollectionEvent>,
    /// Emitted when entries were removed.
    pub remove: Signal<CollectionEvent>,
    /// Emitted when entries were added or removed.
    pub change: Signal<CollectionEvent>,
    /// Emitted when members were reordered, or matched in place by an upsert.
    pub sort: Signal<CollectionEvent>,
    /// Emitted when a member record commits an attribute change.
    pub entry_changed: Signal<EntryChange>,
}

impl CollectionSignals {
    pub(super) fn new() -> Self {
        Self {
            add: Signal::new(),
            remove: Signal::new(),
            change: Signal::new(),
            sort: Signal::new(),
            entry_changed: Signal::new(),
        }
    }

    /// Emit `event` on the signals it concerns.
    pub(super) fn emit(&self, event: &CollectionEvent) {
        if !event.added.is_empty() {
            self.add.emit(event.clone());
        }
        if !event.removed.is_empty() {
            self.remove.emit(event.clone());
        }
        if event.has_changes() {
            self.change.emit(event.clone());
        }
        if event.is_sorted {
            self.sort.emit(event.clone());
        }
    }
}

impl fmt::Debug for CollectionSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSignals")
            .field("add", &self.add.connection_count())
            .field("remove", &self.remove.connection_count())
            .field("change", &self.change.connection_count())
            .field("sort", &self.sort.connection_count())
            .field("entry_changed", &self.entry_changed.connection_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_cancels_add_then_remove() {
        let mut event = CollectionEvent {
            added: vec![Entry::from(1), Entry::from(2)],
            ..CollectionEvent::default()
        };
        event.merge(CollectionEvent {
            removed: vec![Entry::from(2), Entry::from(3)],
            ..CollectionEvent::default()
        });
        assert_eq!(event.added, vec![Entry::from(1)]);
        assert_eq!(event.removed, vec![Entry::from(json!(3))]);
        assert!(!event.is_sorted);

        event.merge(CollectionEvent::sorted());
        assert!(event.is_sorted);
    }

    #[test]
    fn test_emit_order() {
        let signals = CollectionSignals::new();
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        for (name, signal) in [
            ("add", &signals.add),
            ("remove", &signals.remove),
            ("change", &signals.change),
            ("sort", &signals.sort),
        ] {
            let seen = seen.clone();
            signal.connect(move |_| seen.lock().push(name));
        }

        signals.emit(&CollectionEvent {
            added: vec![Entry::from(1)],
            removed: vec![Entry::from(2)],
            is_sorted: true,
        });
        assert_eq!(*seen.lock(), vec!["add", "remove", "change", "sort"]);

        seen.lock().clear();
        signals.emit(&CollectionEvent::sorted());
        assert_eq!(*seen.lock(), vec!["sort"]);
    }
}
