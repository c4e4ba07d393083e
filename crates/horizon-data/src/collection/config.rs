//! Collection configuration.

use std::fmt;
use std::sync::Arc;

use super::filter::FilterBuilder;
use crate::schema::{ModelFactory, ModelSchema};

/// How a collection turns raw input into entries.
#[derive(Clone, Default)]
pub enum ModelClass {
    /// No factory configured: raw objects are rejected with
    /// [`Error::InvalidConfig`](horizon_data_core::Error::InvalidConfig),
    /// other raw values are kept as-is.
    #[default]
    Required,
    /// Coercion disabled: raw data is stored as scalar entries.
    Disabled,
    /// Raw objects become records built by the factory.
    Factory(Arc<dyn ModelFactory>),
}

impl ModelClass {
    /// Primary key of the produced records (empty without a factory).
    pub fn primary_key(&self) -> &[String] {
        match self {
            Self::Factory(factory) => factory.primary_key(),
            Self::Required | Self::Disabled => &[],
        }
    }
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "Required"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Factory(factory) => write!(f, "Factory({})", factory.name()),
        }
    }
}

/// What happens to an existing entry matched by an upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MovePolicy {
    /// Leave the entry where it is and report a `sort`.
    #[default]
    Flag,
    /// Move the entry to the position the upsert targeted, then report a `sort`.
    Relocate,
}

/// Configuration of a [`Collection`](super::Collection).
///
/// # Example
///
/// ```
/// use horizon_data::collection::{CollectionConfig, MovePolicy};
/// use horizon_data::schema::ModelSchema;
///
/// let schema = ModelSchema::builder("Article").attributes(["id", "title"]).primary_key(["id"]).build().unwrap();
/// let config = CollectionConfig::with_schema(schema)
///     .with_move_policy(MovePolicy::Relocate)
///     .with_name("articles");
/// assert_eq!(config.name.as_deref(), Some("articles"));
/// ```
#[derive(Clone, Default)]
pub struct CollectionConfig {
    /// Coercion of raw input.
    pub model_class: ModelClass,
    /// Engine for [`Filter::Query`](super::Filter::Query) filters.
    pub filter_builder: Option<Arc<dyn FilterBuilder>>,
    /// Handling of entries matched by an upsert.
    pub move_policy: MovePolicy,
    /// Name used in diagnostics.
    pub name: Option<String>,
}

impl CollectionConfig {
    /// Configuration with coercion disabled.
    pub fn raw() -> Self {
        Self {
            model_class: ModelClass::Disabled,
            ..Self::default()
        }
    }

    /// Configuration creating records of `schema`.
    pub fn with_schema(schema: Arc<ModelSchema>) -> Self {
        Self::with_factory(schema)
    }

    /// Configuration creating records through `factory`.
    pub fn with_factory(factory: Arc<dyn ModelFactory>) -> Self {
        Self {
            model_class: ModelClass::Factory(factory),
            ..Self::default()
        }
    }

    /// Set the query filter engine.
    pub fn with_filter_builder(mut self, builder: Arc<dyn FilterBuilder>) -> Self {
        self.filter_builder = Some(builder);
        self
    }

    /// Set the move policy.
    pub fn with_move_policy(mut self, policy: MovePolicy) -> Self {
        self.move_policy = policy;
        self
    }

    /// Set the diagnostic name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Debug for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConfig")
            .field("model_class", &self.model_class)
            .field("filter_builder", &self.filter_builder.is_some())
            .field("move_policy", &self.move_policy)
            .field("name", &self.name)
            .finish()
    }
}
