//! Array-like surface of [`Collection`].
//!
//! Mutators route through [`Collection::change`]; reorders are local to the
//! collection they are called on and report a `sort`.

use std::cmp::Ordering;
use std::hash::Hash;
use std::ops::{Bound, RangeBounds};

use horizon_data_core::logging::targets;
use horizon_data_core::{Error, Result};
use indexmap::IndexMap;
use rand::seq::SliceRandom;
use serde_json::Value as JsonValue;

use super::Collection;
use crate::identity;
use crate::value::{Entry, IntoEntries};

impl Collection {
    /// Append entries; returns the new length.
    pub fn push(&self, models: impl IntoEntries) -> Result<usize> {
        self.add(models, None)?;
        Ok(self.len())
    }

    /// Remove and return the last entry.
    pub fn pop(&self) -> Result<Option<Entry>> {
        let Some(last) = self.last() else {
            return Ok(None);
        };
        self.remove(last.clone())?;
        Ok(Some(last))
    }

    /// Remove and return the first entry.
    pub fn shift(&self) -> Result<Option<Entry>> {
        let Some(first) = self.first() else {
            return Ok(None);
        };
        self.remove(first.clone())?;
        Ok(Some(first))
    }

    /// Insert entries at the front; returns the new length.
    pub fn unshift(&self, models: impl IntoEntries) -> Result<usize> {
        self.add(models, Some(0))?;
        Ok(self.len())
    }

    /// Remove `delete_count` entries from `start` and insert `models` in
    /// their place, as one transaction. Returns the removed entries.
    ///
    /// Removal matches by identity, so deleting a raw value also deletes
    /// its duplicates.
    pub fn splice(&self, start: usize, delete_count: usize, models: impl IntoEntries) -> Result<Vec<Entry>> {
        let entries = self.entries();
        let start = start.min(entries.len());
        let end = start.saturating_add(delete_count).min(entries.len());
        let doomed = entries[start..end].to_vec();
        let position = self.root_position(start);
        Ok(self.change(position, models.into_entries(), doomed, false)?.removed)
    }

    /// Append entries; returns the added entries.
    pub fn concat(&self, models: impl IntoEntries) -> Result<Vec<Entry>> {
        self.add(models, None)
    }

    /// A new root collection with the same configuration holding the
    /// entries in `range`. Records are shared, not copied.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Result<Collection> {
        let entries = self.entries();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => entries.len(),
        };
        let end = end.min(entries.len());
        let start = start.min(end);
        Collection::with_entries(self.inner.config.clone(), entries[start..end].to_vec())
    }

    /// Position in the root where an insertion at `index` of this
    /// collection belongs.
    pub(super) fn root_position(&self, index: usize) -> usize {
        let root = self.root();
        if root.ptr_eq(self) {
            return index;
        }
        self.at(index as isize)
            .filter(|_| index < self.len())
            .and_then(|entry| root.index_of(&entry))
            .unwrap_or_else(|| root.len())
    }

    /// Reverse the entry order.
    pub fn reverse(&self) -> Result<()> {
        self.reorder(|entries| entries.reverse())
    }

    /// Sort by the string form of each entry, as untyped lists sort by
    /// default (`[1, 5, "a", "tw", "zz"]`).
    pub fn sort(&self) -> Result<()> {
        self.sort_by(|a, b| identity::stringify(&a.to_json()).cmp(&identity::stringify(&b.to_json())))
    }

    /// Stable sort with a comparator.
    pub fn sort_by<F>(&self, compare: F) -> Result<()>
    where
        F: FnMut(&Entry, &Entry) -> Ordering,
    {
        self.reorder(|entries| entries.sort_by(compare))
    }

    /// Stable sort on one attribute. Missing values sort first, numbers
    /// compare numerically.
    pub fn sort_by_attribute(&self, name: &str, descending: bool) -> Result<()> {
        self.sort_by(|a, b| {
            let ordering = compare_json(a.attribute(name).as_ref(), b.attribute(name).as_ref());
            if descending { ordering.reverse() } else { ordering }
        })
    }

    /// Put the entries in random order.
    pub fn shuffle(&self) -> Result<()> {
        self.reorder(|entries| entries.shuffle(&mut rand::thread_rng()))
    }

    fn reorder<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Entry>),
    {
        let _scope = self.edit()?;
        let before = self.entries();
        let mut after = before.clone();
        apply(&mut after);
        if after == before {
            return Ok(());
        }

        let mut state = self.inner.state.lock();
        if state.entries != before {
            tracing::debug!(target: targets::COLLECTION, collection = %self.label(), "entries changed while sorting; reorder skipped");
            return Ok(());
        }
        state.entries = after;
        drop(state);
        self.mark_sorted();
        Ok(())
    }

    /// First entry.
    pub fn first(&self) -> Option<Entry> {
        self.inner.state.lock().entries.first().cloned()
    }

    /// Last entry.
    pub fn last(&self) -> Option<Entry> {
        self.inner.state.lock().entries.last().cloned()
    }

    /// First entry matching `predicate`.
    pub fn find<F>(&self, predicate: F) -> Option<Entry>
    where
        F: Fn(&Entry) -> bool,
    {
        self.entries().into_iter().find(|e| predicate(e))
    }

    /// Index of the first entry matching `predicate`.
    pub fn find_index<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&Entry) -> bool,
    {
        self.entries().iter().position(predicate)
    }

    /// Index of the last entry matching `predicate`.
    pub fn find_last_index<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&Entry) -> bool,
    {
        self.entries().iter().rposition(predicate)
    }

    /// Entries matching `predicate`, as a plain list.
    pub fn filter<F>(&self, predicate: F) -> Vec<Entry>
    where
        F: Fn(&Entry) -> bool,
    {
        self.entries().into_iter().filter(|e| predicate(e)).collect()
    }

    /// Entries not matching `predicate`.
    pub fn reject<F>(&self, predicate: F) -> Vec<Entry>
    where
        F: Fn(&Entry) -> bool,
    {
        self.entries().into_iter().filter(|e| !predicate(e)).collect()
    }

    /// Whether every entry matches. True when empty.
    pub fn every<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Entry) -> bool,
    {
        self.entries().iter().all(predicate)
    }

    /// Whether any entry matches.
    pub fn some<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Entry) -> bool,
    {
        self.entries().iter().any(predicate)
    }

    /// Whether `entry` is a member (records by instance, raw values by value).
    pub fn contains(&self, entry: &Entry) -> bool {
        self.index_of(entry).is_some()
    }

    /// Position of the last occurrence of `entry`.
    pub fn last_index_of(&self, entry: &Entry) -> Option<usize> {
        self.inner.state.lock().entries.iter().rposition(|e| e == entry)
    }

    /// One attribute of every entry, `null` where it is missing.
    pub fn pluck(&self, name: &str) -> Vec<JsonValue> {
        self.entries()
            .iter()
            .map(|e| e.attribute(name).unwrap_or(JsonValue::Null))
            .collect()
    }

    /// Entries grouped by `key`, groups in order of first appearance.
    pub fn group_by<K, F>(&self, key: F) -> IndexMap<K, Vec<Entry>>
    where
        K: Hash + Eq,
        F: Fn(&Entry) -> K,
    {
        let mut groups: IndexMap<K, Vec<Entry>> = IndexMap::new();
        for entry in self.entries() {
            groups.entry(key(&entry)).or_default().push(entry);
        }
        groups
    }

    /// Number of entries per `key`.
    pub fn count_by<K, F>(&self, key: F) -> IndexMap<K, usize>
    where
        K: Hash + Eq,
        F: Fn(&Entry) -> K,
    {
        let mut counts: IndexMap<K, usize> = IndexMap::new();
        for entry in self.entries() {
            *counts.entry(key(&entry)).or_default() += 1;
        }
        counts
    }

    /// Not supported: a collection of records has no meaningful string form.
    pub fn join(&self, _separator: &str) -> Result<String> {
        Err(Error::not_supported("Collection::join() is not supported."))
    }

    /// Not supported, see [`join`](Self::join).
    pub fn to_string(&self) -> Result<String> {
        Err(Error::not_supported("Collection::to_string() is not supported."))
    }

    /// Not supported, see [`join`](Self::join).
    pub fn to_locale_string(&self) -> Result<String> {
        Err(Error::not_supported("Collection::to_locale_string() is not supported."))
    }
}

fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    let rank = |v: Option<&JsonValue>| match v {
        None | Some(JsonValue::Null) => 0,
        Some(JsonValue::Bool(_)) => 1,
        Some(JsonValue::Number(_)) => 2,
        Some(JsonValue::String(_)) => 3,
        Some(_) => 4,
    };
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (Some(x @ (JsonValue::Array(_) | JsonValue::Object(_))), Some(y @ (JsonValue::Array(_) | JsonValue::Object(_)))) => {
            x.to_string().cmp(&y.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::collection::{CollectionConfig, Filter};

    fn raw(values: JsonValue) -> Collection {
        Collection::with_entries(CollectionConfig::raw(), values).unwrap()
    }

    #[test]
    fn test_sort_uses_string_order() {
        let coll = raw(json!(["zz", 5, "a", 1, "tw"]));
        coll.sort().unwrap();
        assert_eq!(coll.to_json(), json!([1, 5, "a", "tw", "zz"]));
    }

    #[test]
    fn test_sort_by_attribute() {
        let coll = raw(json!([{"n": 10}, {"n": 2}, {}, {"n": 7}]));
        coll.sort_by_attribute("n", false).unwrap();
        assert_eq!(coll.pluck("n"), vec![json!(null), json!(2), json!(7), json!(10)]);
        coll.sort_by_attribute("n", true).unwrap();
        assert_eq!(coll.pluck("n"), vec![json!(10), json!(7), json!(2), json!(null)]);
    }

    #[test]
    fn test_reorder_emits_sort_only() {
        let coll = raw(json!([1, 2, 3]));
        let log = Arc::new(Mutex::new(Vec::new()));
        let sorts = log.clone();
        coll.signals().sort.connect(move |_| sorts.lock().push("sort"));
        let changes = log.clone();
        coll.signals().change.connect(move |_| changes.lock().push("change"));

        coll.reverse().unwrap();
        assert_eq!(coll.to_json(), json!([3, 2, 1]));
        assert_eq!(*log.lock(), vec!["sort"]);

        raw(json!([])).reverse().unwrap();
        coll.sort_by(|_, _| Ordering::Equal).unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_reorders_do_not_reach_children() {
        let coll = raw(json!([1, 2, 3]));
        let child = coll.create_child(None).unwrap();
        coll.reverse().unwrap();
        assert_eq!(child.to_json(), json!([1, 2, 3]));

        coll.push(4).unwrap();
        assert_eq!(child.to_json(), json!([1, 2, 3, 4]));
    }

    #[test]
    fn test_shuffle_keeps_members() {
        let coll = raw(json!([1, 2, 3, 4, 5, 6, 7, 8]));
        coll.shuffle().unwrap();
        let mut values: Vec<i64> = coll.to_json().as_array().unwrap().iter().filter_map(|v| v.as_i64()).collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_read_only_helpers() {
        let coll = raw(json!([{"k": "a", "v": 1}, {"k": "b", "v": 2}, {"k": "a", "v": 3}]));
        let is_a = |e: &Entry| e.attribute("k") == Some(json!("a"));

        assert_eq!(coll.find(is_a).map(|e| e.to_json()), Some(json!({"k": "a", "v": 1})));
        assert_eq!(coll.find_index(is_a), Some(0));
        assert_eq!(coll.find_last_index(is_a), Some(2));
        assert_eq!(coll.filter(is_a).len(), 2);
        assert_eq!(coll.reject(is_a).len(), 1);
        assert!(coll.some(is_a));
        assert!(!coll.every(is_a));
        assert_eq!(coll.pluck("v"), vec![json!(1), json!(2), json!(3)]);

        let groups = coll.group_by(|e| e.attribute("k").map(|k| k.to_string()).unwrap_or_default());
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["\"a\"", "\"b\""]);
        assert_eq!(groups["\"a\""].len(), 2);
        let counts = coll.count_by(|e| e.attribute("v").and_then(|v| v.as_i64()).unwrap_or(0) % 2);
        assert_eq!(counts[&1], 2);
        assert_eq!(counts[&0], 1);

        let first = coll.first().unwrap();
        assert!(coll.contains(&first));
        assert_eq!(coll.last_index_of(&first), Some(0));
        assert_eq!(coll.last().map(|e| e.to_json()), Some(json!({"k": "a", "v": 3})));
    }

    #[test]
    fn test_stringification_not_supported() {
        let coll = raw(json!([1]));
        assert!(matches!(coll.join(","), Err(Error::NotSupported(_))));
        assert!(matches!(coll.to_string(), Err(Error::NotSupported(_))));
        assert!(matches!(coll.to_locale_string(), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_child_push_lands_after_child_entries() {
        let coll = raw(json!([1, 20, 3, 40]));
        let big = coll
            .create_child(Some(Filter::predicate(|e| e.as_scalar().and_then(|v| v.as_i64()).is_some_and(|v| v >= 10))))
            .unwrap();
        assert_eq!(big.unshift(50).unwrap(), 3);
        assert_eq!(coll.to_json(), json!([1, 50, 20, 3, 40]));
        assert_eq!(big.to_json(), json!([50, 20, 40]));
        assert_eq!(big.push(60).unwrap(), 4);
        assert_eq!(coll.to_json(), json!([1, 50, 20, 3, 40, 60]));
    }
}
