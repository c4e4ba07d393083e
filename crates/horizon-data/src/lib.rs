//! Horizon Data - reactive models, collections and data providers.
//!
//! - [`model::Model`] - a schema-driven record with change events, edit
//!   transactions, relations and asynchronous validation
//! - [`collection::Collection`] - an ordered, identity-aware list of records
//!   with live filtered child collections and batched notifications
//! - [`data_provider::DataProvider`] - a collection that fills itself from an
//!   asynchronous query, one request at a time
//! - [`validators`] - built-in validators and the [`validators::Validator`]
//!   trait
//!
//! Signals, the event bus, attribute paths and the error type come from
//! `horizon-data-core` and are re-exported here.
//!
//! # Example
//!
//! ```
//! use horizon_data::prelude::*;
//! use serde_json::json;
//!
//! let schema = ModelSchema::builder("User").attributes(["id", "name"]).primary_key(["id"]).build().unwrap();
//! let users = Collection::new(CollectionConfig::with_schema(schema));
//! users.add(json!([{"id": 1, "name": "Ivan"}, {"id": 2, "name": "Olga"}]), None).unwrap();
//!
//! users.merge(json!({"id": 1, "name": "John"})).unwrap();
//! assert_eq!(users.len(), 2);
//! assert_eq!(users.get_path("[0].name").unwrap(), Some(Value::from("John")));
//! ```

pub use horizon_data_core::*;

pub mod collection;
pub mod data_provider;
pub mod debug;
pub mod identity;
pub mod model;
pub mod prelude;
pub mod reentrancy;
pub mod schema;
pub mod validators;
pub mod value;
