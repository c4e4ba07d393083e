//! Membership changes and collection transactions.
//!
//! Every mutation funnels into [`Collection::change`], which runs on the root
//! collection inside an edit transaction and pushes its net effect down to
//! every child. Notifications are queued per collection and emitted once the
//! outermost transaction closes.

use horizon_data_core::logging::{PerfSpan, span_names, targets};
use horizon_data_core::{Error, Result};
use serde_json::Value as JsonValue;

use super::{Collection, CollectionEvent, ModelClass, MovePolicy};
use crate::reentrancy::{self, DepthGuard};
use crate::value::{Entry, IntoEntries};

/// An open collection transaction. Dropping the scope closes it.
///
/// Obtained from [`Collection::edit`]. Cancelling (which happens when the
/// scope is dropped while panicking) discards the queued notifications.
#[must_use = "the transaction closes as soon as the scope is dropped"]
pub struct CollectionEditScope {
    collection: Collection,
}

impl Drop for CollectionEditScope {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.collection.cancel_edit();
        } else {
            self.collection.end_edit();
        }
    }
}

struct Batch {
    start: usize,
    event: CollectionEvent,
    updated: bool,
}

impl Collection {
    /// Add entries at `index` of this collection (the end by default).
    ///
    /// On a child the entries land in the root just before the entry the
    /// child shows at `index`, or at the end of the root when `index` is
    /// past the child's last entry.
    ///
    /// Raw objects are turned into records by the configured
    /// [`ModelClass`]. Entries are added even if an entry with the same
    /// identity exists; use [`merge`](Self::merge) to upsert. A filtered
    /// root silently drops entries its filter rejects.
    ///
    /// Returns the entries that were added.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] when a raw object is added to a collection
    ///   with [`ModelClass::Required`]. Nothing is added in that case.
    /// - Errors of the record factory.
    /// - [`Error::Reentrancy`] when called from too deep inside this
    ///   collection's own notification handlers.
    pub fn add(&self, models: impl IntoEntries, index: Option<usize>) -> Result<Vec<Entry>> {
        let root = self.root();
        let start = match index {
            Some(index) => self.root_position(index),
            None => root.len(),
        };
        Ok(root.change(start, models.into_entries(), Vec::new(), false)?.added)
    }

    /// Remove every entry matching `models` by identity: `{"id": 5}` (or
    /// just `5`) removes the record whose primary key is 5.
    ///
    /// Returns the removed entries.
    pub fn remove(&self, models: impl IntoEntries) -> Result<Vec<Entry>> {
        Ok(self.change(0, Vec::new(), models.into_entries(), false)?.removed)
    }

    /// Upsert: entries matching an input by identity get the input's
    /// attributes merged in, other inputs are appended. Nothing is removed.
    ///
    /// Returns whether anything changed, membership or member attributes.
    pub fn merge(&self, models: impl IntoEntries) -> Result<bool> {
        let root = self.root();
        let start = root.len();
        let (event, updated) = root.change_batch(start, models.into_entries(), Vec::new(), true)?;
        Ok(updated || event.has_changes())
    }

    /// Make the collection match `models`: matching entries are merged and
    /// kept, other inputs are appended, and entries with no corresponding
    /// input are removed. One notification batch covers the whole call.
    pub fn set(&self, models: impl IntoEntries) -> Result<CollectionEvent> {
        let root = self.root();
        let items = models.into_entries();
        let kept: Vec<Entry> = items.iter().flat_map(|item| root.matches_of(item)).collect();
        let stale: Vec<Entry> = root.entries().into_iter().filter(|e| !kept.contains(e)).collect();

        let _scope = root.edit()?;
        let mut event = root.change(0, Vec::new(), stale, false)?;
        let start = root.len();
        event.merge(root.change(start, items, Vec::new(), true)?);
        Ok(event)
    }

    /// Resynchronize with an authoritative snapshot. Existing entries that
    /// match an input are kept untouched and in place, new inputs are
    /// appended, the rest is removed. Resetting to the current entries does
    /// nothing and notifies nobody.
    pub fn reset(&self, models: impl IntoEntries) -> Result<CollectionEvent> {
        let root = self.root();
        let mut kept: Vec<Entry> = Vec::new();
        let mut fresh = Vec::new();
        for item in models.into_entries() {
            let found = root.matches_of(&item);
            if found.is_empty() {
                fresh.push(item);
            }
            for entry in found {
                if !kept.contains(&entry) {
                    kept.push(entry);
                }
            }
        }
        let stale: Vec<Entry> = root.entries().into_iter().filter(|e| !kept.contains(e)).collect();
        let start = root.len();
        root.change(start, fresh, stale, true)
    }

    /// Remove everything.
    pub fn clear(&self) -> Result<CollectionEvent> {
        self.reset(Vec::<Entry>::new())
    }

    /// The change primitive behind every mutation.
    ///
    /// Removes the entries matching `to_remove` (moving `start` back for
    /// each removal before it), then inserts `to_add` from `start` on.
    /// With `unique`, an input matching an existing entry is merged into it
    /// instead of inserted and the batch is flagged as sorted; under
    /// [`MovePolicy::Relocate`] the entry is also moved to the insertion
    /// point. Called on a child, runs on the root.
    ///
    /// Returns this call's effect on the root.
    pub fn change(
        &self,
        start: usize,
        to_add: Vec<Entry>,
        to_remove: Vec<Entry>,
        unique: bool,
    ) -> Result<CollectionEvent> {
        self.change_batch(start, to_add, to_remove, unique).map(|(event, _)| event)
    }

    fn change_batch(
        &self,
        start: usize,
        to_add: Vec<Entry>,
        to_remove: Vec<Entry>,
        unique: bool,
    ) -> Result<(CollectionEvent, bool)> {
        let root = self.root();
        if !root.ptr_eq(self) {
            return root.change_batch(start, to_add, to_remove, unique);
        }
        self.check_coercion(&to_add)?;

        let _scope = self.edit()?;
        let _perf = PerfSpan::new(span_names::COLLECTION_CHANGE);
        let mut batch = Batch {
            start,
            event: CollectionEvent::default(),
            updated: false,
        };
        let result = self.apply_change(&mut batch, to_add, to_remove, unique);

        tracing::trace!(
            target: targets::COLLECTION,
            collection = %self.label(),
            added = batch.event.added.len(),
            removed = batch.event.removed.len(),
            sorted = batch.event.is_sorted,
            "change batch"
        );
        self.commit(batch.event.clone());
        result.map(|()| (batch.event, batch.updated))
    }

    fn check_coercion(&self, to_add: &[Entry]) -> Result<()> {
        let needs_factory = to_add.iter().any(|e| matches!(e, Entry::Scalar(JsonValue::Object(_))));
        if needs_factory && matches!(self.inner.config.model_class, ModelClass::Required) {
            tracing::error!(target: targets::COLLECTION, collection = %self.label(), "no model class configured");
            return Err(Error::invalid_config(
                "Property `modelClass` in collection is required (or set false to force disable).",
            ));
        }
        Ok(())
    }

    fn apply_change(&self, batch: &mut Batch, to_add: Vec<Entry>, to_remove: Vec<Entry>, unique: bool) -> Result<()> {
        for item in &to_remove {
            for entry in self.matches_of(item) {
                let mut state = self.inner.state.lock();
                if let Some(index) = state.position(&entry) {
                    if index < batch.start {
                        batch.start -= 1;
                    }
                    batch.event.removed.push(state.remove_at(index));
                }
            }
        }

        let relocate = self.inner.config.move_policy == MovePolicy::Relocate;
        for item in to_add {
            let existing = if unique { self.matches_of(&item) } else { Vec::new() };
            if existing.is_empty() {
                let entry = self.create_entry(item)?;
                if !self.admits(&entry) {
                    continue;
                }
                let index = self.inner.state.lock().insert(batch.start, entry.clone());
                batch.start = index + 1;
                batch.event.added.push(entry);
                continue;
            }

            for entry in existing {
                if !self.admits(&entry) {
                    continue;
                }
                batch.event.is_sorted = true;
                if let (Entry::Record(model), Entry::Scalar(data @ JsonValue::Object(_))) = (&entry, &item) {
                    batch.updated |= model.set_attributes(data, false)?;
                }
                if relocate {
                    self.relocate(&entry, &mut batch.start);
                }
            }
        }
        Ok(())
    }

    fn create_entry(&self, item: Entry) -> Result<Entry> {
        match (&self.inner.config.model_class, item) {
            (_, record @ Entry::Record(_)) => Ok(record),
            (ModelClass::Factory(factory), Entry::Scalar(data)) => Ok(Entry::Record(factory.instantiate(&data)?)),
            (ModelClass::Required | ModelClass::Disabled, scalar) => Ok(scalar),
        }
    }

    fn relocate(&self, entry: &Entry, start: &mut usize) {
        let mut state = self.inner.state.lock();
        let Some(from) = state.position(entry) else {
            return;
        };
        let moved = state.entries.remove(from);
        if from < *start {
            *start -= 1;
        }
        let to = (*start).min(state.entries.len());
        state.entries.insert(to, moved);
        *start = to + 1;
    }

    pub(super) fn matches_of(&self, item: &Entry) -> Vec<Entry> {
        self.inner.state.lock().matches(item, self.primary_key())
    }

    /// Apply a batch computed elsewhere (a parent's change, a filter
    /// refresh) to this collection's own entries. New entries are placed in
    /// parent-relative order.
    pub(super) fn apply_local(&self, added: &[Entry], removed: &[Entry], gate: bool) {
        let admitted: Vec<Entry> = if gate {
            added.iter().filter(|e| self.admits(e)).cloned().collect()
        } else {
            added.to_vec()
        };
        if admitted.is_empty() && removed.is_empty() {
            return;
        }
        let order = self.parent().map(|parent| parent.entries());

        let _scope = self.open_scope();
        let mut event = CollectionEvent::default();
        {
            let mut state = self.inner.state.lock();
            for entry in removed {
                if let Some(index) = state.position(entry) {
                    event.removed.push(state.remove_at(index));
                }
            }
            for entry in admitted {
                let index = match &order {
                    Some(order) => parent_relative_position(&state.entries, order, &entry),
                    None => state.entries.len(),
                };
                state.insert(index, entry.clone());
                event.added.push(entry);
            }
        }
        self.commit(event);
    }

    /// Queue `event` for notification, rewire relays and push the change
    /// down to the children.
    fn commit(&self, event: CollectionEvent) {
        if event.is_empty() {
            return;
        }
        self.rewire(&event.added, &event.removed);
        let children = {
            let mut state = self.inner.state.lock();
            state.pending.merge(event.clone());
            state.children.values().cloned().collect::<Vec<_>>()
        };
        if event.has_changes() {
            for child in children {
                child.apply_local(&event.added, &event.removed, true);
            }
        }
    }

    /// Open a transaction closed by dropping the returned scope.
    ///
    /// Notifications of every change made while the scope lives are merged
    /// and emitted once, when the outermost transaction closes.
    ///
    /// # Errors
    ///
    /// [`Error::Reentrancy`] when this collection is already
    /// [`MAX_REENTRANT_DEPTH`](crate::reentrancy::MAX_REENTRANT_DEPTH)
    /// emissions deep.
    pub fn edit(&self) -> Result<CollectionEditScope> {
        self.begin_edit()?;
        Ok(CollectionEditScope {
            collection: self.clone(),
        })
    }

    fn open_scope(&self) -> CollectionEditScope {
        self.enter_level();
        CollectionEditScope {
            collection: self.clone(),
        }
    }

    /// Open (or deepen) a transaction on this collection and its children.
    /// Every successful call must be paired with [`end_edit`](Self::end_edit)
    /// or [`cancel_edit`](Self::cancel_edit).
    pub fn begin_edit(&self) -> Result<()> {
        let level = self.inner.state.lock().edit_level;
        if level == 0
            && let Err(e) = reentrancy::check(&self.inner.emit_depth)
        {
            tracing::error!(target: targets::COLLECTION, collection = %self.label(), error = %e, "refusing re-entrant transaction");
            return Err(e);
        }
        self.enter_level();
        Ok(())
    }

    fn enter_level(&self) {
        let children = {
            let mut state = self.inner.state.lock();
            state.edit_level += 1;
            state.children.values().cloned().collect::<Vec<_>>()
        };
        for child in children {
            child.enter_level();
        }
    }

    /// Whether a transaction is open.
    pub fn is_editing(&self) -> bool {
        self.inner.state.lock().edit_level > 0
    }

    /// Close one transaction level. Closing the outermost level emits the
    /// merged notifications, children first.
    pub fn end_edit(&self) {
        let Some((pending, children)) = self.leave_level() else {
            return;
        };
        for child in children {
            child.end_edit();
        }
        if let Some(event) = pending {
            self.flush(event);
        }
    }

    /// Close one transaction level. Closing the outermost level discards the
    /// queued notifications; membership changes already made stay.
    pub fn cancel_edit(&self) {
        let Some((pending, children)) = self.leave_level() else {
            return;
        };
        for child in children {
            child.cancel_edit();
        }
        if pending.is_some_and(|event| !event.is_empty()) {
            tracing::trace!(target: targets::COLLECTION, collection = %self.label(), "notifications discarded");
        }
    }

    fn leave_level(&self) -> Option<(Option<CollectionEvent>, Vec<Collection>)> {
        let mut state = self.inner.state.lock();
        if state.edit_level == 0 {
            return None;
        }
        state.edit_level -= 1;
        let pending = (state.edit_level == 0).then(|| std::mem::take(&mut state.pending));
        Some((pending, state.children.values().cloned().collect()))
    }

    fn flush(&self, event: CollectionEvent) {
        if event.is_empty() {
            return;
        }
        tracing::trace!(
            target: targets::COLLECTION,
            collection = %self.label(),
            added = event.added.len(),
            removed = event.removed.len(),
            sorted = event.is_sorted,
            "emitting collection event"
        );
        let _depth = DepthGuard::enter(&self.inner.emit_depth);
        self.inner.signals.emit(&event);
    }

    /// Mark the open transaction as reordering entries.
    pub(super) fn mark_sorted(&self) {
        self.inner.state.lock().pending.merge(CollectionEvent::sorted());
    }
}

/// Where `entry` goes in `current` so that `current` keeps the order of
/// `order`: before the first entry that comes after it in `order`.
fn parent_relative_position(current: &[Entry], order: &[Entry], entry: &Entry) -> usize {
    let Some(target) = order.iter().position(|e| e == entry) else {
        return current.len();
    };
    current
        .iter()
        .position(|e| order.iter().position(|o| o == e).is_some_and(|p| p > target))
        .unwrap_or(current.len())
}
