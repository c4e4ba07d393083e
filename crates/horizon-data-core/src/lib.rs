//! Core systems for Horizon Data.
//!
//! This crate holds the infrastructure every data type builds on:
//!
//! - [`Signal`] - type-safe observer primitive with re-entrant emission
//! - [`EventBus`] - keyed topics of signals with subscription handles
//! - [`AttributePath`] - structured `a.b[0].c` paths used for addressing and
//!   as subscription keys
//! - [`Error`] - the error taxonomy shared by models, collections and
//!   data providers
//! - [`logging`] - tracing targets and tree formatting options
//!
//! The model, collection and data provider types live in `horizon-data`.

mod error;
pub mod event_bus;
pub mod logging;
pub mod path;
pub mod signal;

pub use error::{Error, Result};
pub use event_bus::{EventBus, SubscriptionId};
pub use logging::{PerfSpan, TreeFormatOptions, TreeStyle};
pub use path::{AttributePath, PathSegment};
pub use signal::{ConnectionId, Signal};
