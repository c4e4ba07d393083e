//! Prelude module for Horizon Data.
//!
//! ```
//! use horizon_data::prelude::*;
//! ```

// ============================================================================
// Core
// ============================================================================

pub use horizon_data_core::{AttributePath, ConnectionId, Error, EventBus, PathSegment, Result, Signal, SubscriptionId};

// ============================================================================
// Records
// ============================================================================

pub use crate::model::{ChangeEvent, EditScope, Model, ModelAdapter, ModelProxy, ModelTopic};
pub use crate::schema::{AttributeSchema, AttributeType, ModelFactory, ModelSchema};
pub use crate::value::{Entry, IntoEntries, Value};

// ============================================================================
// Collections
// ============================================================================

pub use crate::collection::{
    Collection, CollectionAdapter, CollectionConfig, CollectionEvent, CollectionProxy, Condition, Filter,
    ModelClass, MovePolicy,
};

// ============================================================================
// Data providers
// ============================================================================

pub use crate::data_provider::{
    ArrayDataProvider, DataProvider, DataProviderConfig, FetchMode, FetchParams, Pagination, Sort,
};

// ============================================================================
// Validation
// ============================================================================

pub use crate::validators::{Validator, ValidatorOptions};
