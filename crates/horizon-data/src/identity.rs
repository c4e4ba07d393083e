//! Identity keys for collection lookups.
//!
//! Two entries are "the same item" when their identity keys match. Records
//! with a primary key, and all raw data, derive a string key; records whose
//! schema has no primary key (or whose key is still unset) are identified by
//! instance.

use serde_json::{Map, Value as JsonValue};

use crate::model::ModelId;
use crate::value::Entry;

/// The identity of a collection entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// Stringified primary key (or stringified raw data).
    Key(String),
    /// A record without a usable primary key.
    Instance(ModelId),
}

impl IdentityKey {
    /// The string key, if there is one.
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key),
            Self::Instance(_) => None,
        }
    }
}

impl From<&str> for IdentityKey {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

/// Stringify a JSON value the way keys are compared: strings raw, everything
/// else as compact JSON.
pub(crate) fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Key for a set of primary-key values. `None` if every value is null.
pub(crate) fn key_from_values<'a>(
    primary_key: &[String],
    mut lookup: impl FnMut(&str) -> Option<&'a JsonValue>,
) -> Option<String> {
    match primary_key {
        [] => None,
        [single] => match lookup(single) {
            None | Some(JsonValue::Null) => None,
            Some(value) => Some(stringify(value)),
        },
        many => {
            let mut names: Vec<&String> = many.iter().collect();
            names.sort();
            let mut map = Map::new();
            let mut any_set = false;
            for name in names {
                let value = lookup(name).cloned().unwrap_or(JsonValue::Null);
                any_set |= !value.is_null();
                map.insert(name.clone(), value);
            }
            any_set.then(|| JsonValue::Object(map).to_string())
        }
    }
}

/// Identity of raw data as seen by a collection whose records use
/// `primary_key`.
pub(crate) fn key_for_data(primary_key: &[String], data: &JsonValue) -> IdentityKey {
    if let JsonValue::Object(map) = data {
        if let Some(key) = key_from_values(primary_key, |name| map.get(name)) {
            return IdentityKey::Key(key);
        }
    }
    IdentityKey::Key(stringify(data))
}

/// Identity of any entry.
pub(crate) fn key_for_entry(primary_key: &[String], entry: &Entry) -> IdentityKey {
    match entry {
        Entry::Record(model) => model.identity(),
        Entry::Scalar(data) => key_for_data(primary_key, data),
    }
}
