//! Model change events and subscription topics.

use std::fmt;
use std::sync::Arc;

use horizon_data_core::{AttributePath, Error, Result};
use indexmap::IndexMap;

use super::Model;
use crate::value::Value;

/// What a model subscriber listens to.
///
/// `Change` fires once per committed transaction; `Attribute(path)` fires for
/// one attribute (`change:name`) or for a nested path that bubbled up from a
/// linked sub-model or sub-collection (`change:user.email`, `change:links[0]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelTopic {
    /// Any committed change.
    Change,
    /// Changes of one attribute path.
    Attribute(AttributePath),
}

impl ModelTopic {
    /// Topic for a single attribute.
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(AttributePath::name(name))
    }

    /// Parse `"change"` or `"change:<path>"`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.split_once(':') {
            None if name == "change" => Ok(Self::Change),
            Some(("change", path)) => Ok(Self::Attribute(AttributePath::parse(path)?)),
            _ => Err(Error::invalid_param(format!("Unknown model event `{name}`"))),
        }
    }
}

impl fmt::Display for ModelTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Change => write!(f, "change"),
            Self::Attribute(path) => write!(f, "change:{path}"),
        }
    }
}

/// Old and new value of one attribute within a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    /// Value before the transaction.
    pub old: Value,
    /// Value after the transaction.
    pub new: Value,
}

/// Payload delivered to model subscribers.
#[derive(Clone)]
pub struct ChangeEvent {
    model: Model,
    attribute: Option<String>,
    changes: Arc<IndexMap<String, AttributeChange>>,
}

impl ChangeEvent {
    pub(crate) fn new(model: Model, attribute: Option<String>, changes: Arc<IndexMap<String, AttributeChange>>) -> Self {
        Self {
            model,
            attribute,
            changes,
        }
    }

    /// The model whose attributes changed. For bubbled events this is the
    /// sub-model, not the subscriber's model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The attribute this event is about, for per-attribute events.
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Every attribute changed in the transaction, in write order.
    pub fn changed_attributes(&self) -> Vec<&str> {
        self.changes.keys().map(String::as_str).collect()
    }

    /// All changes of the transaction.
    pub fn changes(&self) -> &IndexMap<String, AttributeChange> {
        &self.changes
    }

    /// The change of one attribute.
    pub fn change(&self, name: &str) -> Option<&AttributeChange> {
        self.changes.get(name)
    }

    /// Old value of [`attribute`](Self::attribute).
    pub fn old_value(&self) -> Option<&Value> {
        self.attribute.as_deref().and_then(|a| self.changes.get(a)).map(|c| &c.old)
    }

    /// New value of [`attribute`](Self::attribute).
    pub fn new_value(&self) -> Option<&Value> {
        self.attribute.as_deref().and_then(|a| self.changes.get(a)).map(|c| &c.new)
    }

    pub(crate) fn for_attribute(&self, name: &str) -> Self {
        Self {
            model: self.model.clone(),
            attribute: Some(name.to_string()),
            changes: self.changes.clone(),
        }
    }
}

impl fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("model", &self.model.id())
            .field("attribute", &self.attribute)
            .field("changes", &self.changes)
            .finish()
    }
}

/// A change that happened below a model: inside a linked sub-model or a
/// member of a linked sub-collection. `path` is relative to the model that
/// emits it and does not include the changed attribute names themselves.
#[derive(Debug, Clone)]
pub struct NestedChange {
    /// Where the change happened, e.g. `user` or `links[1]`.
    pub path: AttributePath,
    /// The originating event.
    pub event: ChangeEvent,
}
