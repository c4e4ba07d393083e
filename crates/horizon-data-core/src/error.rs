//! Error types shared by every Horizon Data type.

/// Result type alias for data operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by models, collections, data providers and validators.
///
/// `Error` is `Clone` so one failure can be handed to every caller that was
/// waiting on the same operation (see coalesced fetches in `horizon-data`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A component was configured in a way that cannot work, such as a
    /// collection without a model factory receiving raw data.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An argument was malformed or out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// The operation is intentionally unavailable on this type.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A lookup or write addressed an attribute that does not exist.
    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    /// A change handler re-entered its source too many times.
    #[error("Re-entrant mutation exceeded depth {depth}")]
    Reentrancy { depth: usize },

    /// An in-flight fetch was dropped before it produced a result.
    #[error("Fetch was interrupted before completion")]
    FetchInterrupted,

    /// A data provider query reported failure.
    #[error("Query failed: {0}")]
    Query(String),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a parameter error.
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidParam(message.into())
    }

    /// Create a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Create an unknown-property error.
    pub fn unknown_property(name: impl Into<String>) -> Self {
        Self::UnknownProperty(name.into())
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Whether this is an unknown-property error.
    ///
    /// Attribute reads swallow this kind and report a missing value instead.
    pub fn is_unknown_property(&self) -> bool {
        matches!(self, Self::UnknownProperty(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::invalid_param("Not found model with index `3`").to_string(),
            "Invalid parameter: Not found model with index `3`"
        );
        assert_eq!(
            Error::Reentrancy { depth: 16 }.to_string(),
            "Re-entrant mutation exceeded depth 16"
        );
        assert_eq!(Error::unknown_property("title").to_string(), "Unknown property 'title'");
    }

    #[test]
    fn test_error_is_clone_for_shared_delivery() {
        let error = Error::query("timeout");
        let copies = vec![error.clone(), error.clone()];
        assert!(copies.iter().all(|e| *e == error));
        assert!(!error.is_unknown_property());
        assert!(Error::unknown_property("x").is_unknown_property());
    }
}
