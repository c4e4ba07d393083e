//! Attribute values and collection entries.
//!
//! A model attribute holds a [`Value`]: plain JSON data, a nested [`Model`],
//! or a nested [`Collection`]. A collection holds [`Entry`] items: either raw
//! JSON (when model coercion is disabled) or model records.

use std::fmt;

use serde_json::Value as JsonValue;

use crate::collection::Collection;
use crate::model::Model;

/// The value of one model attribute.
#[derive(Clone)]
pub enum Value {
    /// Plain data.
    Json(JsonValue),
    /// A linked sub-model.
    Model(Model),
    /// A linked sub-collection.
    Collection(Collection),
}

impl Value {
    /// JSON `null`.
    pub fn null() -> Self {
        Self::Json(JsonValue::Null)
    }

    /// Whether this is JSON `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Json(JsonValue::Null))
    }

    /// The JSON payload, if this is plain data.
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The sub-model, if this attribute holds one.
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    /// The sub-collection, if this attribute holds one.
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    /// Serialize to JSON, expanding nested models and collections.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Json(value) => value.clone(),
            Self::Model(model) => model.to_json(),
            Self::Collection(collection) => collection.to_json(),
        }
    }

    /// Emptiness as used by validators: null, `""`, `[]`, and empty
    /// collections are empty; whitespace-only strings count when `trim` is set.
    pub fn is_empty(&self, trim: bool) -> bool {
        match self {
            Self::Json(value) => json_is_empty(value, trim),
            Self::Model(_) => false,
            Self::Collection(collection) => collection.is_empty(),
        }
    }
}

pub(crate) fn json_is_empty(value: &JsonValue, trim: bool) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty() || (trim && s.trim().is_empty()),
        JsonValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::null()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Model(a), Self::Model(b)) => a.ptr_eq(b),
            (Self::Collection(a), Self::Collection(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq<JsonValue> for Value {
    fn eq(&self, other: &JsonValue) -> bool {
        self.as_json() == Some(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Model(model) => fmt::Debug::fmt(model, f),
            Self::Collection(collection) => fmt::Debug::fmt(collection, f),
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Self::Json(value)
    }
}

impl From<Model> for Value {
    fn from(model: Model) -> Self {
        Self::Model(model)
    }
}

impl From<Collection> for Value {
    fn from(collection: Collection) -> Self {
        Self::Collection(collection)
    }
}

macro_rules! json_conversions {
    ($target:ident: $($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for $target {
                fn from(value: $ty) -> Self {
                    Self::from(JsonValue::from(value))
                }
            }
        )*
    };
}

json_conversions!(Value: &str, String, bool, i32, i64, u32, u64, f64);

/// One item of a collection.
#[derive(Clone)]
pub enum Entry {
    /// Raw data, kept as-is when model coercion is disabled. Also the input
    /// form for data that a collection coerces into records.
    Scalar(JsonValue),
    /// A model record.
    Record(Model),
}

impl Entry {
    /// The record, if this entry is one.
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Self::Record(model) => Some(model),
            Self::Scalar(_) => None,
        }
    }

    /// The raw data, if this entry is not a record.
    pub fn as_scalar(&self) -> Option<&JsonValue> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Record(_) => None,
        }
    }

    /// Whether this entry is a model record.
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Record(model) => model.to_json(),
        }
    }

    /// Read a single attribute: the record's attribute or the raw object's key.
    pub fn attribute(&self, name: &str) -> Option<JsonValue> {
        match self {
            Self::Record(model) => model.get_json(name),
            Self::Scalar(JsonValue::Object(map)) => map.get(name).cloned(),
            Self::Scalar(_) => None,
        }
    }
}

/// Records compare by identity, raw data by value.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Record(a), Self::Record(b)) => a.ptr_eq(b),
            (Self::Scalar(a), Self::Scalar(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::Record(model) => fmt::Debug::fmt(model, f),
        }
    }
}

impl From<JsonValue> for Entry {
    fn from(value: JsonValue) -> Self {
        Self::Scalar(value)
    }
}

impl From<Model> for Entry {
    fn from(model: Model) -> Self {
        Self::Record(model)
    }
}

impl From<&Model> for Entry {
    fn from(model: &Model) -> Self {
        Self::Record(model.clone())
    }
}

json_conversions!(Entry: &str, String, bool, i32, i64, u32, u64, f64);

/// Normalizes collection input into a sequence of entries.
///
/// A single item becomes a one-element sequence; a JSON array becomes one
/// entry per element.
pub trait IntoEntries {
    /// Convert into entries.
    fn into_entries(self) -> Vec<Entry>;
}

impl IntoEntries for Entry {
    fn into_entries(self) -> Vec<Entry> {
        vec![self]
    }
}

impl IntoEntries for Model {
    fn into_entries(self) -> Vec<Entry> {
        vec![Entry::Record(self)]
    }
}

impl IntoEntries for &Model {
    fn into_entries(self) -> Vec<Entry> {
        vec![Entry::Record(self.clone())]
    }
}

impl IntoEntries for JsonValue {
    fn into_entries(self) -> Vec<Entry> {
        match self {
            JsonValue::Array(items) => items.into_iter().map(Entry::Scalar).collect(),
            other => vec![Entry::Scalar(other)],
        }
    }
}

impl<T: Into<Entry>> IntoEntries for Vec<T> {
    fn into_entries(self) -> Vec<Entry> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Entry>, const N: usize> IntoEntries for [T; N] {
    fn into_entries(self) -> Vec<Entry> {
        self.into_iter().map(Into::into).collect()
    }
}

impl IntoEntries for &[Entry] {
    fn into_entries(self) -> Vec<Entry> {
        self.to_vec()
    }
}

macro_rules! single_entry {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoEntries for $ty {
                fn into_entries(self) -> Vec<Entry> {
                    vec![Entry::from(self)]
                }
            }
        )*
    };
}

single_entry!(&str, String, i32, i64, u32, u64);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_array_normalizes_to_entries() {
        let entries = json!([1, {"id": 2}, "x"]).into_entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1], Entry::Scalar(json!({"id": 2})));

        let single = json!({"id": 5}).into_entries();
        assert_eq!(single, vec![Entry::Scalar(json!({"id": 5}))]);

        assert_eq!(7i32.into_entries(), vec![Entry::Scalar(json!(7))]);
        assert_eq!(vec![1i32, 2].into_entries().len(), 2);
    }

    #[test]
    fn test_emptiness() {
        assert!(Value::null().is_empty(false));
        assert!(Value::from("").is_empty(false));
        assert!(!Value::from("  ").is_empty(false));
        assert!(Value::from("  ").is_empty(true));
        assert!(Value::from(json!([])).is_empty(false));
        assert!(!Value::from(0).is_empty(false));
        assert!(!Value::from(false).is_empty(false));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::from("a"), Value::from(json!("a")));
        assert_ne!(Value::from(1), Value::from("1"));
        assert_eq!(Value::from(3), json!(3));
    }

    #[test]
    fn test_entry_attribute_on_raw_object() {
        let entry = Entry::from(json!({"name": "Ivan"}));
        assert_eq!(entry.attribute("name"), Some(json!("Ivan")));
        assert_eq!(entry.attribute("missing"), None);
        assert_eq!(Entry::from(5).attribute("name"), None);
    }
}
