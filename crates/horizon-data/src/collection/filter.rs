//! Filtered child collections.
//!
//! A child collection shows the entries of its parent that pass its filter,
//! in the parent's order. Filters are either plain predicates or declarative
//! [`Condition`]s evaluated through the collection's [`FilterBuilder`].
//!
//! A filter that declares which attributes it reads is re-evaluated when a
//! member of the parent changes one of them. Other filters are re-evaluated
//! on [`Collection::refresh_filter`].

use std::fmt;
use std::sync::{Arc, Weak};

use horizon_data_core::logging::targets;
use horizon_data_core::{AttributePath, Error, Result, SubscriptionId};
use serde_json::Value as JsonValue;

use super::{Collection, CollectionInner, ParentLink};
use crate::identity;
use crate::model::Model;
use crate::validators::{as_number, loose_eq};
use crate::value::Entry;

/// Type alias for a filter predicate.
///
/// Returns `true` if the entry should be included.
pub type FilterFn = Arc<dyn Fn(&Entry) -> bool + Send + Sync>;

/// The filter of a child collection.
#[derive(Clone)]
pub enum Filter {
    /// A predicate, optionally declaring the attributes it reads.
    Predicate {
        /// The test.
        test: FilterFn,
        /// Attributes whose changes trigger a refresh.
        depends_on: Vec<String>,
    },
    /// A declarative condition evaluated by the collection's
    /// [`FilterBuilder`].
    Query(Condition),
}

impl Filter {
    /// A predicate refreshed only on demand.
    pub fn predicate<F>(test: F) -> Self
    where
        F: Fn(&Entry) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            test: Arc::new(test),
            depends_on: Vec::new(),
        }
    }

    /// A predicate refreshed whenever a member changes one of `attributes`.
    pub fn predicate_on<I, S, F>(attributes: I, test: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Entry) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            test: Arc::new(test),
            depends_on: attributes.into_iter().map(Into::into).collect(),
        }
    }

    /// A declarative condition.
    pub fn query(condition: Condition) -> Self {
        Self::Query(condition)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate { depends_on, .. } => f
                .debug_struct("Predicate")
                .field("depends_on", depends_on)
                .finish_non_exhaustive(),
            Self::Query(condition) => f.debug_tuple("Query").field(condition).finish(),
        }
    }
}

/// A declarative filter condition over entry attributes.
///
/// Equality is loose: `5`, `5.0` and `"5"` are equal. A missing attribute
/// never equals anything.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `attribute == value`.
    Eq(String, JsonValue),
    /// `attribute` equals one of the values.
    In(String, Vec<JsonValue>),
    /// `attribute` is a string containing the needle.
    Contains(String, String),
    /// `low <= attribute <= high`, numerically or as strings.
    Between(String, JsonValue, JsonValue),
    /// Negation.
    Not(Box<Condition>),
    /// Every condition holds.
    And(Vec<Condition>),
    /// At least one condition holds.
    Or(Vec<Condition>),
}

impl Condition {
    /// Shorthand for [`Condition::Eq`].
    pub fn equals(attribute: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Eq(attribute.into(), value.into())
    }

    /// Shorthand for [`Condition::In`].
    pub fn any_of<I, V>(attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        Self::In(attribute.into(), values.into_iter().map(Into::into).collect())
    }

    /// Shorthand for [`Condition::Contains`].
    pub fn contains(attribute: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains(attribute.into(), needle.into())
    }

    /// Negate `self`.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Parse the JSON condition format.
    ///
    /// - `{"a": 1, "b": [1, 2]}`: equality per key (a list means "in"),
    ///   all of which must hold.
    /// - `["and", c1, c2, ...]`, `["or", c1, c2, ...]`, `["not", c]`.
    /// - `["=", "a", v]`, `["in", "a", [v, ...]]`, `["like", "a", "text"]`.
    /// - `["between", "a", low, high]`, `["not between", "a", low, high]`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] for anything else.
    pub fn parse(value: &JsonValue) -> Result<Self> {
        let malformed = || Error::invalid_param(format!("Malformed filter condition: {value}"));
        match value {
            JsonValue::Object(map) => {
                let mut conditions: Vec<Condition> = map
                    .iter()
                    .map(|(attribute, value)| match value {
                        JsonValue::Array(values) => Self::In(attribute.clone(), values.clone()),
                        other => Self::Eq(attribute.clone(), other.clone()),
                    })
                    .collect();
                Ok(match conditions.len() {
                    1 => conditions.remove(0),
                    _ => Self::And(conditions),
                })
            }
            JsonValue::Array(items) => {
                let (operator, operands) = items.split_first().ok_or_else(malformed)?;
                let operator = operator.as_str().ok_or_else(malformed)?.to_ascii_lowercase();
                let attribute = || operands.first().and_then(JsonValue::as_str).map(str::to_string).ok_or_else(malformed);
                match (operator.as_str(), operands) {
                    ("and", rest) => Ok(Self::And(rest.iter().map(Self::parse).collect::<Result<_>>()?)),
                    ("or", rest) => Ok(Self::Or(rest.iter().map(Self::parse).collect::<Result<_>>()?)),
                    ("not", [inner]) => Ok(Self::parse(inner)?.not()),
                    ("=", [_, value]) => Ok(Self::Eq(attribute()?, value.clone())),
                    ("in", [_, JsonValue::Array(values)]) => Ok(Self::In(attribute()?, values.clone())),
                    ("like", [_, JsonValue::String(needle)]) => Ok(Self::Contains(attribute()?, needle.clone())),
                    ("between", [_, low, high]) => Ok(Self::Between(attribute()?, low.clone(), high.clone())),
                    ("not between", [_, low, high]) => {
                        Ok(Self::Between(attribute()?, low.clone(), high.clone()).not())
                    }
                    _ => Err(malformed()),
                }
            }
            _ => Err(malformed()),
        }
    }

    /// Attributes read by the condition, in order of first appearance.
    pub fn attributes(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_attributes(&mut names);
        names
    }

    fn collect_attributes(&self, names: &mut Vec<String>) {
        match self {
            Self::Eq(attribute, _)
            | Self::In(attribute, _)
            | Self::Contains(attribute, _)
            | Self::Between(attribute, _, _) => {
                if !names.contains(attribute) {
                    names.push(attribute.clone());
                }
            }
            Self::Not(inner) => inner.collect_attributes(names),
            Self::And(all) | Self::Or(all) => {
                for condition in all {
                    condition.collect_attributes(names);
                }
            }
        }
    }

    /// Evaluate against an entry.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::Eq(attribute, expected) => entry.attribute(attribute).is_some_and(|v| loose_eq(&v, expected)),
            Self::In(attribute, values) => entry
                .attribute(attribute)
                .is_some_and(|v| values.iter().any(|expected| loose_eq(&v, expected))),
            Self::Contains(attribute, needle) => entry
                .attribute(attribute)
                .is_some_and(|v| v.as_str().is_some_and(|s| s.contains(needle.as_str()))),
            Self::Between(attribute, low, high) => entry.attribute(attribute).is_some_and(|v| between(&v, low, high)),
            Self::Not(inner) => !inner.matches(entry),
            Self::And(all) => all.iter().all(|c| c.matches(entry)),
            Self::Or(any) => any.iter().any(|c| c.matches(entry)),
        }
    }

    /// Stringified keys when the condition is an `In` on the single primary
    /// key, which lets a refresh look records up instead of scanning.
    fn key_lookup(&self, primary_key: &[String]) -> Option<Vec<String>> {
        match (self, primary_key) {
            (Self::In(attribute, values), [key]) if attribute == key => {
                Some(values.iter().map(identity::stringify).collect())
            }
            (Self::Eq(attribute, value), [key]) if attribute == key => Some(vec![identity::stringify(value)]),
            _ => None,
        }
    }
}

fn between(value: &JsonValue, low: &JsonValue, high: &JsonValue) -> bool {
    match (as_number(value), as_number(low), as_number(high)) {
        (Some(v), Some(lo), Some(hi)) => lo <= v && v <= hi,
        _ => {
            let (v, lo, hi) = (identity::stringify(value), identity::stringify(low), identity::stringify(high));
            lo <= v && v <= hi
        }
    }
}

/// Turns declarative conditions into predicates.
///
/// Collections configured with a builder accept [`Filter::Query`].
pub trait FilterBuilder: Send + Sync {
    /// Compile `condition` into a predicate.
    fn create_filter(&self, condition: &Condition) -> Result<FilterFn>;

    /// Attributes the compiled predicate reads.
    fn attributes(&self, condition: &Condition) -> Vec<String> {
        condition.attributes()
    }
}

/// In-memory [`FilterBuilder`] evaluating conditions directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionFilterBuilder;

impl ConditionFilterBuilder {
    /// Evaluate `condition` against raw data.
    pub fn filter(&self, data: &JsonValue, condition: &Condition) -> bool {
        condition.matches(&Entry::Scalar(data.clone()))
    }
}

impl FilterBuilder for ConditionFilterBuilder {
    fn create_filter(&self, condition: &Condition) -> Result<FilterFn> {
        let condition = condition.clone();
        Ok(Arc::new(move |entry: &Entry| condition.matches(entry)))
    }
}

/// The installed filter of a collection.
pub(super) struct ActiveFilter {
    test: FilterFn,
    fast_keys: Option<Vec<String>>,
    source: Weak<CollectionInner>,
    subscriptions: Vec<SubscriptionId>,
}

impl ActiveFilter {
    /// Drop the attribute subscriptions on the filter's source.
    pub(super) fn unsubscribe(&mut self) {
        let subscriptions = std::mem::take(&mut self.subscriptions);
        if let Some(source) = Collection::upgrade(&self.source) {
            for id in subscriptions {
                source.off_attribute(id);
            }
        }
    }

    pub(super) fn test(&self) -> &FilterFn {
        &self.test
    }
}

impl Collection {
    /// Create a live child collection showing the entries of `self` that
    /// pass `filter` (all of them without one).
    ///
    /// # Errors
    ///
    /// Every error of [`set_filter`](Self::set_filter).
    pub fn create_child(&self, filter: Option<Filter>) -> Result<Collection> {
        let child = {
            let mut state = self.inner.state.lock();
            let level = state.edit_level;
            let parent = self.downgrade();
            let config = self.inner.config.clone();
            let key = state.children.insert_with_key(|key| {
                Collection::build(
                    config,
                    Some(ParentLink {
                        collection: parent,
                        key,
                    }),
                    level,
                )
            });
            state.children[key].clone()
        };

        child.apply_local(&self.entries(), &[], false);
        if filter.is_some() {
            child.set_filter(filter)?;
        }
        tracing::debug!(
            target: targets::COLLECTION,
            parent = %self.label(),
            child = %child.label(),
            len = child.len(),
            "created child collection"
        );
        Ok(child)
    }

    /// Whether a filter is installed.
    pub fn has_filter(&self) -> bool {
        self.inner.state.lock().filter.is_some()
    }

    /// Install (or with `None`, remove) the filter and re-evaluate it. The
    /// previous filter's attribute subscriptions are dropped first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] for a [`Filter::Query`] without a
    ///   configured [`FilterBuilder`].
    /// - Any error of [`FilterBuilder::create_filter`].
    pub fn set_filter(&self, filter: Option<Filter>) -> Result<()> {
        let compiled = match filter {
            None => None,
            Some(Filter::Predicate { test, depends_on }) => Some((test, depends_on, None)),
            Some(Filter::Query(condition)) => {
                let builder = self.inner.config.filter_builder.as_ref().ok_or_else(|| {
                    Error::invalid_config(format!(
                        "Collection `{}` needs a filter builder to use query filters.",
                        self.label()
                    ))
                })?;
                let test = builder.create_filter(&condition)?;
                let attributes = builder.attributes(&condition);
                let fast_keys = condition.key_lookup(self.primary_key());
                Some((test, attributes, fast_keys))
            }
        };

        let previous = self.inner.state.lock().filter.take();
        if let Some(mut previous) = previous {
            previous.unsubscribe();
        }

        if let Some((test, attributes, fast_keys)) = compiled {
            let source = self.parent().unwrap_or_else(|| self.clone());
            let subscriptions = attributes
                .iter()
                .map(|attribute| {
                    let path = AttributePath::parse(attribute).unwrap_or_else(|_| AttributePath::name(attribute.clone()));
                    let this = self.downgrade();
                    source.on_attribute_path(path, move |_| {
                        if let Some(collection) = Collection::upgrade(&this) {
                            collection.refresh_filter();
                        }
                    })
                })
                .collect();
            self.inner.state.lock().filter = Some(ActiveFilter {
                test,
                fast_keys,
                source: source.downgrade(),
                subscriptions,
            });
        }

        self.refresh_filter();
        Ok(())
    }

    /// Re-evaluate the filter against the parent's entries (own entries for
    /// a root), apply the difference, then refresh every child.
    pub fn refresh_filter(&self) {
        let parent = self.parent();
        let (test, fast_keys) = {
            let state = self.inner.state.lock();
            match &state.filter {
                Some(filter) => (Some(filter.test.clone()), filter.fast_keys.clone()),
                None => (None, None),
            }
        };

        let candidates: Vec<Entry> = match fast_keys {
            Some(keys) => {
                let source = parent.unwrap_or_else(|| self.clone());
                keys.iter()
                    .flat_map(|key| source.records_by_key(key))
                    .map(Entry::Record)
                    .collect()
            }
            None => {
                let all = parent.map_or_else(|| self.entries(), |p| p.entries());
                match &test {
                    Some(test) => all.into_iter().filter(|entry| test(entry)).collect(),
                    None => all,
                }
            }
        };

        let current = self.entries();
        let removed: Vec<Entry> = current.iter().filter(|e| !candidates.contains(e)).cloned().collect();
        let added: Vec<Entry> = candidates.into_iter().filter(|e| !current.contains(e)).collect();
        if !added.is_empty() || !removed.is_empty() {
            tracing::debug!(
                target: targets::COLLECTION,
                collection = %self.label(),
                added = added.len(),
                removed = removed.len(),
                "filter refreshed"
            );
            self.apply_local(&added, &removed, false);
        }

        for child in self.children() {
            child.refresh_filter();
        }
    }

    /// Whether the installed filter (if any) admits `entry`. Runs the
    /// predicate outside the collection lock.
    pub(super) fn admits(&self, entry: &Entry) -> bool {
        let test = self.inner.state.lock().filter.as_ref().map(|f| f.test().clone());
        test.is_none_or(|test| test(entry))
    }

    fn records_by_key(&self, key: &str) -> Vec<Model> {
        self.inner.state.lock().by_id.get(key).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionConfig;
    use crate::schema::ModelSchema;
    use serde_json::json;

    fn condition(value: JsonValue) -> Condition {
        Condition::parse(&value).unwrap()
    }

    #[test]
    fn test_condition_hash() {
        let builder = ConditionFilterBuilder;
        let query = condition(json!({"foo": 5}));
        assert_eq!(builder.attributes(&query), vec!["foo"]);
        assert!(!builder.filter(&json!({"foo": 3}), &query));
        assert!(builder.filter(&json!({"foo": 5}), &query));
        assert!(!builder.filter(&json!({"bar": 5}), &query));
    }

    #[test]
    fn test_condition_and_or() {
        let builder = ConditionFilterBuilder;
        let query = condition(json!(["or", ["and", {"foo": 5}, {"bar": 2}], {"zaa": 10}]));
        assert_eq!(builder.attributes(&query), vec!["foo", "bar", "zaa"]);
        assert!(!builder.filter(&json!({"foo": 5}), &query));
        assert!(builder.filter(&json!({"foo": 5, "bar": 2}), &query));
        assert!(builder.filter(&json!({"zaa": 10}), &query));
        assert!(builder.filter(&json!({"foo": 3, "bar": 3, "zaa": 10}), &query));
    }

    #[test]
    fn test_condition_not() {
        let builder = ConditionFilterBuilder;
        let query = condition(json!(["and", {"foo": 5}, ["not", {"bar": 2}]]));
        assert_eq!(builder.attributes(&query), vec!["foo", "bar"]);
        assert!(builder.filter(&json!({"foo": 5}), &query));
        assert!(!builder.filter(&json!({"foo": 5, "bar": 2}), &query));
        assert!(builder.filter(&json!({"foo": 5, "bar": 3}), &query));
    }

    #[test]
    fn test_condition_between() {
        let builder = ConditionFilterBuilder;
        let query = condition(json!(["and", ["between", "foo", 10, 20], ["not between", "foo", 15, 25]]));
        assert_eq!(builder.attributes(&query), vec!["foo"]);
        assert!(builder.filter(&json!({"foo": 10}), &query));
        assert!(builder.filter(&json!({"foo": 13}), &query));
        assert!(!builder.filter(&json!({"foo": 15}), &query));
        assert!(!builder.filter(&json!({"foo": 20}), &query));
        assert!(!builder.filter(&json!({"foo": 25}), &query));
    }

    #[test]
    fn test_condition_in() {
        let builder = ConditionFilterBuilder;
        let query = condition(json!(["in", "foo", [1, 2, 3, 4]]));
        assert_eq!(builder.attributes(&query), vec!["foo"]);
        assert!(builder.filter(&json!({"foo": 3}), &query));
        assert!(!builder.filter(&json!({"foo": 13}), &query));
        assert!(builder.filter(&json!({"foo": "3"}), &query));
    }

    #[test]
    fn test_malformed_conditions() {
        for value in [json!(5), json!([]), json!(["in", "foo", 3]), json!(["nope", "a"])] {
            assert!(matches!(Condition::parse(&value), Err(Error::InvalidParam(_))));
        }
    }

    fn articles() -> Collection {
        let schema = ModelSchema::builder("Article")
            .attributes(["id", "title"])
            .primary_key(["id"])
            .build()
            .unwrap();
        let config = CollectionConfig::with_schema(schema).with_filter_builder(Arc::new(ConditionFilterBuilder));
        Collection::with_entries(
            config,
            json!([
                {"id": 55, "title": "aaa bbb"},
                {"id": 66, "title": "bbb ccc"},
                {"id": 77, "title": "ccc ddd"},
            ]),
        )
        .unwrap()
    }

    fn ids(collection: &Collection) -> Vec<JsonValue> {
        collection.models().iter().filter_map(|m| m.get_json("id")).collect()
    }

    #[test]
    fn test_query_filter_requires_builder() {
        let raw = Collection::new(CollectionConfig::raw());
        let result = raw.create_child(Some(Filter::query(Condition::equals("a", 1))));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_query_filter_follows_attribute_changes() {
        let root = articles();
        let child = root
            .create_child(Some(Filter::query(Condition::contains("title", "ccc"))))
            .unwrap();
        assert_eq!(ids(&child), vec![json!(66), json!(77)]);

        root.model_at(0).unwrap().set("title", "ccc first").unwrap();
        assert_eq!(ids(&child), vec![json!(55), json!(66), json!(77)]);

        root.model_at(2).unwrap().set("title", "zzz").unwrap();
        assert_eq!(ids(&child), vec![json!(55), json!(66)]);
    }

    #[test]
    fn test_primary_key_lookup() {
        let root = articles();
        let child = root
            .create_child(Some(Filter::query(Condition::any_of("id", [77, 55]))))
            .unwrap();
        assert_eq!(ids(&child), vec![json!(55), json!(77)]);
    }

    #[test]
    fn test_swapping_filters_drops_old_subscriptions() {
        let root = articles();
        let child = root
            .create_child(Some(Filter::predicate_on(["title"], |e: &Entry| {
                e.attribute("title").is_some_and(|t| t.as_str().is_some_and(|t| t.contains("bbb")))
            })))
            .unwrap();
        assert_eq!(root.inner.attribute_bus.subscriber_count(), 1);

        child.set_filter(Some(Filter::predicate(|_: &Entry| true))).unwrap();
        assert_eq!(root.inner.attribute_bus.subscriber_count(), 0);
        assert_eq!(child.len(), 3);

        child.set_filter(None).unwrap();
        assert!(!child.has_filter());
    }
}
